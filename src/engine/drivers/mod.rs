// SPDX-License-Identifier: Apache-2.0

// Warehouse drivers module

pub mod dry_run;
pub mod snowflake;
