// SPDX-License-Identifier: Apache-2.0

//! POS pipeline
//!
//! Thin orchestration over a cloud warehouse: load raw POS tables from an
//! external stage, build the flattened POS view with its change stream, and
//! validate connectivity. All heavy lifting runs inside the warehouse; this
//! crate renders SQL, sequences statements and reports outcomes.

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod pipeline;

pub use commands::AppContext;
pub use error::{ConfigError, PipelineError, PipelineResult};
