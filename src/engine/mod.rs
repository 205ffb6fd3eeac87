// SPDX-License-Identifier: Apache-2.0

// Data Engine Module
// Session and driver layer between the pipeline stages and the warehouse

pub mod drivers;
pub mod error;
pub mod registry;
pub mod session;
pub mod sql;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use registry::DriverRegistry;
pub use session::Session;
pub use traits::DataEngine;
pub use types::*;
