// SPDX-License-Identifier: Apache-2.0

//! `pipeline` section of `config.json`: warehouse objects and the raw table
//! catalog

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::sql::validate_identifier;
use crate::error::ConfigError;

/// Partition values used for the year-partitioned POS tables
pub const ORDER_YEARS: [&str; 3] = ["2019", "2020", "2021"];

const POS_TABLES: [&str; 7] = [
    "country",
    "franchise",
    "location",
    "menu",
    "truck",
    "order_header",
    "order_detail",
];
const PARTITIONED_TABLES: [&str; 2] = ["order_header", "order_detail"];
const CUSTOMER_TABLES: [&str; 1] = ["customer_loyalty"];

/// Warehouse compute size, as accepted by `ALTER WAREHOUSE ... SET WAREHOUSE_SIZE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseSize {
    #[serde(rename = "XSMALL", alias = "X-SMALL")]
    XSmall,
    #[serde(rename = "SMALL")]
    Small,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LARGE")]
    Large,
    #[serde(rename = "XLARGE", alias = "X-LARGE")]
    XLarge,
    #[serde(rename = "XXLARGE", alias = "2X-LARGE")]
    XXLarge,
    #[serde(rename = "XXXLARGE", alias = "3X-LARGE")]
    XXXLarge,
    #[serde(rename = "X4LARGE", alias = "4X-LARGE")]
    X4Large,
    #[serde(rename = "X5LARGE", alias = "5X-LARGE")]
    X5Large,
    #[serde(rename = "X6LARGE", alias = "6X-LARGE")]
    X6Large,
}

impl fmt::Display for WarehouseSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::XSmall => "XSMALL",
            Self::Small => "SMALL",
            Self::Medium => "MEDIUM",
            Self::Large => "LARGE",
            Self::XLarge => "XLARGE",
            Self::XXLarge => "XXLARGE",
            Self::XXXLarge => "XXXLARGE",
            Self::X4Large => "X4LARGE",
            Self::X5Large => "X5LARGE",
            Self::X6Large => "X6LARGE",
        };
        f.write_str(keyword)
    }
}

/// One raw table to load from the external stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDeclaration {
    /// Table name, also the last stage path segment
    pub name: String,
    /// Destination schema
    pub schema: String,
    /// Stage directory the table lives under
    pub source_dir: String,
    /// Year partitions; empty means the table is loaded once, unpartitioned
    #[serde(default)]
    pub partition_values: Vec<String>,
}

impl TableDeclaration {
    pub fn new(name: &str, schema: &str, source_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: schema.to_string(),
            source_dir: source_dir.to_string(),
            partition_values: Vec::new(),
        }
    }

    pub fn partitioned_by(mut self, values: &[&str]) -> Self {
        self.partition_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_values.is_empty()
    }

    /// Number of copy operations a full load of this table issues
    pub fn copy_count(&self) -> usize {
        self.partition_values.len().max(1)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (what, value) in [("name", &self.name), ("schema", &self.schema)] {
            validate_identifier(value).map_err(|_| {
                ConfigError::invalid(format!("table {} '{}' is not a plain identifier", what, value))
            })?;
        }
        if self.source_dir.is_empty()
            || !self
                .source_dir
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::invalid(format!(
                "table '{}' has invalid source_dir '{}'",
                self.name, self.source_dir
            )));
        }
        for value in &self.partition_values {
            if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::invalid(format!(
                    "table '{}' has partition value '{}', expected a four-digit year",
                    self.name, value
                )));
            }
        }
        Ok(())
    }
}

/// Default catalog: seven POS tables and the customer loyalty table
pub fn default_tables() -> Vec<TableDeclaration> {
    let pos = POS_TABLES.iter().map(|name| {
        let table = TableDeclaration::new(name, "RAW_POS", "pos");
        if PARTITIONED_TABLES.contains(name) {
            table.partitioned_by(&ORDER_YEARS)
        } else {
            table
        }
    });
    let customer = CUSTOMER_TABLES
        .iter()
        .map(|name| TableDeclaration::new(name, "RAW_CUSTOMER", "customer"));
    pos.chain(customer).collect()
}

/// Warehouse objects and catalog the stages operate on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub role: String,
    pub database: String,
    pub warehouse: String,
    /// External stage, including the leading `@`
    pub stage_root: String,
    /// Size used while bulk loading
    pub load_size: WarehouseSize,
    /// Size restored once loading ends
    pub idle_size: WarehouseSize,
    /// Named Parquet file format created in each raw schema
    pub file_format: String,
    pub tables: Vec<TableDeclaration>,
    /// Run the row-count checks after building the view. They scan the whole
    /// view, so they are off unless asked for.
    pub verify_view: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            role: "HOL_ROLE".to_string(),
            database: "HOL_DB".to_string(),
            warehouse: "HOL_WH".to_string(),
            stage_root: "@external.frostbyte_raw_stage".to_string(),
            load_size: WarehouseSize::XLarge,
            idle_size: WarehouseSize::XSmall,
            file_format: "PARQUET_SNAPPY".to_string(),
            tables: default_tables(),
            verify_view: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, value) in [
            ("role", &self.role),
            ("database", &self.database),
            ("warehouse", &self.warehouse),
            ("file_format", &self.file_format),
        ] {
            validate_identifier(value).map_err(|_| {
                ConfigError::invalid(format!("pipeline.{} '{}' is not a plain identifier", what, value))
            })?;
        }

        let stage = self
            .stage_root
            .strip_prefix('@')
            .ok_or_else(|| ConfigError::invalid("pipeline.stage_root must start with '@'"))?;
        validate_identifier(stage).map_err(|_| {
            ConfigError::invalid(format!("pipeline.stage_root '{}' is not a stage name", self.stage_root))
        })?;

        if self.tables.is_empty() {
            return Err(ConfigError::invalid("pipeline.tables must declare at least one table"));
        }
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            let key = (table.schema.to_ascii_uppercase(), table.name.to_ascii_uppercase());
            if !seen.insert(key) {
                return Err(ConfigError::invalid(format!(
                    "table '{}.{}' is declared twice",
                    table.schema, table.name
                )));
            }
        }
        Ok(())
    }

    /// Total copy operations a full load issues
    pub fn total_copies(&self) -> usize {
        self.tables.iter().map(TableDeclaration::copy_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_matches_raw_layout() {
        let config = PipelineConfig::default();
        config.validate().expect("defaults must validate");

        let names: Vec<&str> = config.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "country",
                "franchise",
                "location",
                "menu",
                "truck",
                "order_header",
                "order_detail",
                "customer_loyalty"
            ]
        );

        let partitioned: Vec<&str> = config
            .tables
            .iter()
            .filter(|t| t.is_partitioned())
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(partitioned, vec!["order_header", "order_detail"]);

        let loyalty = config.tables.last().unwrap();
        assert_eq!(loyalty.schema, "RAW_CUSTOMER");
        assert_eq!(loyalty.source_dir, "customer");

        // six unpartitioned tables once, two partitioned tables three times
        assert_eq!(config.total_copies(), 6 + 2 * 3);
    }

    #[test]
    fn sizes_round_trip_as_sql_keywords() {
        let size: WarehouseSize = serde_json::from_str("\"X-LARGE\"").unwrap();
        assert_eq!(size, WarehouseSize::XLarge);
        assert_eq!(size.to_string(), "XLARGE");
        assert_eq!(serde_json::to_string(&WarehouseSize::XSmall).unwrap(), "\"XSMALL\"");
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"warehouse":"LOAD_WH","load_size":"LARGE"}"#).unwrap();
        assert_eq!(config.warehouse, "LOAD_WH");
        assert_eq!(config.load_size, WarehouseSize::Large);
        assert_eq!(config.idle_size, WarehouseSize::XSmall);
        assert_eq!(config.tables.len(), 8);
        assert!(!config.verify_view);
    }

    #[test]
    fn rejects_invalid_declarations() {
        let mut config = PipelineConfig::default();
        config.tables = vec![TableDeclaration::new("menu", "RAW_POS", "pos").partitioned_by(&["19"])];
        assert!(config.validate().is_err());

        config.tables = vec![TableDeclaration::new("menu; drop", "RAW_POS", "pos")];
        assert!(config.validate().is_err());

        config.tables = vec![
            TableDeclaration::new("menu", "RAW_POS", "pos"),
            TableDeclaration::new("MENU", "raw_pos", "pos"),
        ];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.stage_root = "external.stage".to_string();
        assert!(config.validate().is_err());
    }
}
