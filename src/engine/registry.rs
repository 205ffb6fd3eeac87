// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Maps the `driver` key of the connection file to a driver instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::drivers::dry_run::DryRunDriver;
use crate::engine::drivers::snowflake::SnowflakeDriver;
use crate::engine::traits::DataEngine;

/// Registry that holds all available warehouse drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DataEngine>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the Snowflake SQL API driver and the dry-run driver
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SnowflakeDriver::new()));
        registry.register(Arc::new(DryRunDriver::new()));
        registry
    }

    /// Registers a new driver
    ///
    /// The driver's `driver_id()` is used as the key.
    pub fn register(&mut self, driver: Arc<dyn DataEngine>) {
        let id = driver.driver_id().to_string();
        self.drivers.insert(id, driver);
    }

    /// Gets a driver by its ID
    pub fn get(&self, driver_id: &str) -> Option<Arc<dyn DataEngine>> {
        self.drivers.get(driver_id).cloned()
    }

    /// Lists all registered driver IDs, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered drivers
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
