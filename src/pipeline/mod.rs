// SPDX-License-Identifier: Apache-2.0

//! Pipeline stages run against a warehouse [`Session`](crate::engine::Session)

pub mod loader;
pub mod relation;
pub mod validator;
pub mod view;

pub use loader::{load_all_raw_tables, load_raw_table, stage_location, LoadReport};
pub use validator::{build_session, test_session};
pub use view::{check_pos_view, create_pos_view, create_pos_view_stream, test_pos_view, ViewStats};
