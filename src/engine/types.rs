// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the warehouse drivers and the pipeline stages

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::Sensitive;

/// Unique identifier for a warehouse session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver used when the connection file does not name one
pub const DEFAULT_DRIVER: &str = "snowflake";

const SECRET_KEYS: &[&str] = &["password", "token", "private_key", "private_key_passphrase"];

/// Connection parameters as read from the connection file
///
/// The map is passed through to the driver unchanged; only the driver knows
/// which keys it needs.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(serde_json::Map<String, serde_json::Value>);

impl ConnectionParams {
    pub fn new(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(values)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Driver id, `snowflake` when absent
    pub fn driver(&self) -> &str {
        self.get_str("driver").unwrap_or(DEFAULT_DRIVER)
    }

    /// Returns a non-empty string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Returns an unsigned value, accepting numbers or numeric strings
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            if SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                map.entry(key, &Sensitive::new(value));
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Role, warehouse, database and schema a statement runs under
///
/// Equivalent of `USE ROLE` / `USE DATABASE` / `USE SCHEMA`, tracked on the
/// client because each SQL API request carries its own context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

impl SessionContext {
    /// Initial context taken from the connection parameters
    pub fn from_params(params: &ConnectionParams) -> Self {
        Self {
            role: params.get_str("role").map(str::to_string),
            warehouse: params.get_str("warehouse").map(str::to_string),
            database: params.get_str("database").map(str::to_string),
            schema: params.get_str("schema").map(str::to_string),
        }
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Float(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// Query execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column information
    pub columns: Vec<ColumnInfo>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of affected rows (for DML and COPY)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
    /// Warehouse-side statement handle, when the driver has one
    pub statement_handle: Option<String>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            execution_time_ms: 0.0,
            statement_handle: None,
        }
    }

    /// Builds a result from column names and rows, typing every column as text
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|name| ColumnInfo {
                    name: name.to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                })
                .collect(),
            rows: rows.into_iter().map(|values| Row { values }).collect(),
            ..Self::empty()
        }
    }

    /// First column of the first row
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.values.first())
    }

    /// Index of a column, compared case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))
    }

    /// Sum of a numeric column over all rows, `None` if the column is absent
    pub fn sum_column(&self, name: &str) -> Option<u64> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.values.get(idx))
                .filter_map(Value::as_u64)
                .sum(),
        )
    }

    /// Renders rows as a fixed-width text table
    pub fn render_table(&self) -> String {
        if self.columns.is_empty() {
            return String::from("(no columns)\n");
        }

        let headers: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("\"{}\"", col.name))
            .collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..headers.len())
                    .map(|idx| row.values.get(idx).unwrap_or(&Value::Null).to_string())
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                cells
                    .iter()
                    .map(|row| row[idx].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |values: &[String]| {
            let mut out = String::from("|");
            for (value, width) in values.iter().zip(&widths) {
                out.push_str(&format!("{:<width$}  |", value, width = *width));
            }
            out.push('\n');
            out
        };
        let rule = "-".repeat(widths.iter().map(|w| w + 3).sum::<usize>() + 1) + "\n";

        let mut out = String::new();
        out.push_str(&rule);
        out.push_str(&line(&headers));
        out.push_str(&rule);
        for row in &cells {
            out.push_str(&line(row));
        }
        out.push_str(&rule);
        out
    }
}
