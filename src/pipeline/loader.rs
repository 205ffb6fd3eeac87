// SPDX-License-Identifier: Apache-2.0

//! Raw table loader
//!
//! Copies Parquet files from the external stage into the raw schemas. Each
//! table is created from the schema inferred from its files, filled with
//! `COPY INTO`, and tagged with the governance comment.

use tracing::{debug, error, info, instrument, Instrument};

use crate::config::{PipelineConfig, TableDeclaration, WarehouseSize};
use crate::engine::error::EngineResult;
use crate::engine::sql::{quote_literal, validate_identifier};
use crate::engine::Session;
use crate::observability::PipelineLogger;

/// Comment attached to every loaded table for ownership and lineage filters
pub const GOVERNANCE_COMMENT: &str = r#"{"origin":"sf_sit-is","name":"snowpark_101_de","version":{"major":1, "minor":0},"attributes":{"is_quickstart":1, "source":"sql"}}"#;

/// `<stage_root>/<source_dir>/<table>[/year=<YYYY>]`
pub fn stage_location(stage_root: &str, source_dir: &str, table: &str, partition: Option<&str>) -> String {
    match partition {
        Some(year) => format!("{}/{}/{}/year={}", stage_root, source_dir, table, year),
        None => format!("{}/{}/{}", stage_root, source_dir, table),
    }
}

pub fn resize_statement(warehouse: &str, size: WarehouseSize) -> String {
    format!(
        "ALTER WAREHOUSE {} SET WAREHOUSE_SIZE = {} WAIT_FOR_COMPLETION = TRUE",
        warehouse, size
    )
}

/// Statements issued for one copy, in order
pub fn load_statements(file_format: &str, table: &str, location: &str) -> [String; 4] {
    let location = quote_literal(location);
    [
        format!(
            "CREATE FILE FORMAT IF NOT EXISTS {} TYPE = PARQUET COMPRESSION = SNAPPY",
            file_format
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} USING TEMPLATE (\
             SELECT ARRAY_AGG(OBJECT_CONSTRUCT(*)) WITHIN GROUP (ORDER BY ORDER_ID) \
             FROM TABLE(INFER_SCHEMA(LOCATION => {}, FILE_FORMAT => {})))",
            table,
            location,
            quote_literal(file_format)
        ),
        format!(
            "COPY INTO {} FROM {} FILE_FORMAT = (FORMAT_NAME = {}) MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE",
            table,
            location,
            quote_literal(file_format)
        ),
        format!("COMMENT ON TABLE {} IS {}", table, quote_literal(GOVERNANCE_COMMENT)),
    ]
}

/// Outcome of one `COPY INTO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    pub schema: String,
    pub table: String,
    pub location: String,
    /// Rows reported by the warehouse; absent in dry runs
    pub rows_loaded: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub copies: Vec<CopyRecord>,
}

impl LoadReport {
    /// Copies issued for `table`
    pub fn copies_for(&self, table: &str) -> usize {
        self.copies
            .iter()
            .filter(|c| c.table.eq_ignore_ascii_case(table))
            .count()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.copies.iter().filter_map(|c| c.rows_loaded).sum()
    }
}

/// Sets the role and database every load and view statement runs under
pub fn apply_pipeline_context(session: &mut Session, config: &PipelineConfig) -> EngineResult<()> {
    session.use_role(&config.role)?;
    session.use_database(&config.database)?;
    session.use_warehouse(&config.warehouse)
}

pub async fn resize_warehouse(session: &Session, warehouse: &str, size: WarehouseSize) -> EngineResult<()> {
    let warehouse = validate_identifier(warehouse)?;
    info!("Resizing warehouse {} to {}", warehouse, size);
    session.sql(&resize_statement(warehouse, size)).await?;
    Ok(())
}

/// Loads one table, or one year partition of it
#[instrument(skip(session, config, table, partition), fields(table = %table.name, partition = ?partition))]
pub async fn load_raw_table(
    session: &mut Session,
    config: &PipelineConfig,
    table: &TableDeclaration,
    partition: Option<&str>,
) -> EngineResult<CopyRecord> {
    apply_pipeline_context(session, config)?;
    session.use_schema(&table.schema)?;
    let name = validate_identifier(&table.name)?;

    let location = stage_location(&config.stage_root, &table.source_dir, name, partition);
    if let Some(year) = partition {
        info!("Loading year {}", year);
    }

    let [file_format, create_table, copy, comment] =
        load_statements(&config.file_format, name, &location);
    session.sql(&file_format).await?;
    session.sql(&create_table).await?;
    let copied = session.sql(&copy).await?;
    session.sql(&comment).await?;

    let rows_loaded = copied
        .sum_column("rows_loaded")
        .or(copied.affected_rows);
    debug!(location = %location, rows_loaded = ?rows_loaded, "Copy finished");

    Ok(CopyRecord {
        schema: table.schema.clone(),
        table: table.name.clone(),
        location,
        rows_loaded,
    })
}

async fn load_catalog(session: &mut Session, config: &PipelineConfig) -> EngineResult<LoadReport> {
    let mut report = LoadReport::default();
    for table in &config.tables {
        info!("Loading {}", table.name);
        if table.is_partitioned() {
            for year in &table.partition_values {
                report
                    .copies
                    .push(load_raw_table(session, config, table, Some(year.as_str())).await?);
            }
        } else {
            report.copies.push(load_raw_table(session, config, table, None).await?);
        }
    }
    Ok(report)
}

async fn load_on_scaled_warehouse(
    session: &mut Session,
    config: &PipelineConfig,
) -> EngineResult<LoadReport> {
    apply_pipeline_context(session, config)?;
    resize_warehouse(session, &config.warehouse, config.load_size).await?;

    let loaded = load_catalog(session, config).await;
    let reset = resize_warehouse(session, &config.warehouse, config.idle_size).await;

    match (loaded, reset) {
        (Ok(report), Ok(())) => {
            info!(
                copies = report.copies.len(),
                rows_loaded = report.rows_loaded(),
                "Raw tables loaded"
            );
            Ok(report)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(reset_err)) => {
            error!(error = %reset_err, "Failed to scale warehouse down after a failed load");
            Err(e)
        }
    }
}

/// Loads the whole catalog on a scaled-up warehouse
///
/// The warehouse goes back to the idle size whether or not the loads
/// succeed. A load failure is reported in preference to a failed scale-down.
pub async fn load_all_raw_tables(
    session: &mut Session,
    config: &PipelineConfig,
    logger: &PipelineLogger,
) -> EngineResult<LoadReport> {
    load_on_scaled_warehouse(session, config)
        .instrument(logger.stage("load_raw"))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::LoggingConfig;
    use crate::engine::drivers::dry_run::DryRunDriver;
    use crate::engine::error::EngineError;
    use crate::engine::{ConnectionParams, QueryResult, Value};

    async fn session_on(driver: Arc<DryRunDriver>) -> Session {
        let params = ConnectionParams::default().with("driver", "dry_run");
        Session::open(driver, &params).await.expect("open failed")
    }

    fn logger() -> PipelineLogger {
        PipelineLogger::from_config(&LoggingConfig::default())
    }

    #[test]
    fn locations_with_and_without_partition() {
        assert_eq!(
            stage_location("@external.frostbyte_raw_stage", "pos", "menu", None),
            "@external.frostbyte_raw_stage/pos/menu"
        );
        assert_eq!(
            stage_location("@external.frostbyte_raw_stage", "pos", "order_header", Some("2019")),
            "@external.frostbyte_raw_stage/pos/order_header/year=2019"
        );
    }

    #[test]
    fn comment_embeds_governance_json() {
        let [_, _, _, comment] = load_statements("PARQUET_SNAPPY", "menu", "@s/pos/menu");
        assert_eq!(comment, format!("COMMENT ON TABLE menu IS '{}'", GOVERNANCE_COMMENT));
        let parsed: serde_json::Value = serde_json::from_str(GOVERNANCE_COMMENT).unwrap();
        assert_eq!(parsed["version"]["major"], 1);
        assert_eq!(parsed["attributes"]["source"], "sql");
    }

    #[tokio::test]
    async fn unpartitioned_table_copies_once() {
        let driver = Arc::new(DryRunDriver::new());
        let mut session = session_on(driver.clone()).await;
        let config = PipelineConfig::default();
        let menu = TableDeclaration::new("menu", "RAW_POS", "pos");

        let record = load_raw_table(&mut session, &config, &menu, None).await.unwrap();
        assert_eq!(record.location, "@external.frostbyte_raw_stage/pos/menu");
        assert_eq!(record.rows_loaded, None);

        let recorded = driver.statements();
        assert_eq!(recorded.len(), 4);
        assert_eq!(driver.count_matching("COPY INTO menu"), 1);
        assert!(recorded[3].statement.starts_with("COMMENT ON TABLE menu"));
        let context = &recorded[2].context;
        assert_eq!(context.role.as_deref(), Some("HOL_ROLE"));
        assert_eq!(context.database.as_deref(), Some("HOL_DB"));
        assert_eq!(context.schema.as_deref(), Some("RAW_POS"));
    }

    #[tokio::test]
    async fn full_load_resizes_around_copies() {
        let driver = Arc::new(DryRunDriver::new());
        let mut session = session_on(driver.clone()).await;
        let config = PipelineConfig::default();

        let report = load_all_raw_tables(&mut session, &config, &logger()).await.unwrap();
        assert_eq!(report.copies.len(), config.total_copies());
        assert_eq!(report.copies_for("menu"), 1);
        assert_eq!(report.copies_for("order_header"), 3);
        assert_eq!(report.copies_for("order_detail"), 3);
        assert_eq!(driver.count_matching("COPY INTO "), 12);

        let recorded = driver.statements();
        assert_eq!(
            recorded.first().unwrap().statement,
            "ALTER WAREHOUSE HOL_WH SET WAREHOUSE_SIZE = XLARGE WAIT_FOR_COMPLETION = TRUE"
        );
        assert_eq!(
            recorded.last().unwrap().statement,
            "ALTER WAREHOUSE HOL_WH SET WAREHOUSE_SIZE = XSMALL WAIT_FOR_COMPLETION = TRUE"
        );

        let loyalty = report.copies.last().unwrap();
        assert_eq!(loyalty.schema, "RAW_CUSTOMER");
        assert_eq!(loyalty.location, "@external.frostbyte_raw_stage/customer/customer_loyalty");
    }

    #[tokio::test]
    async fn rows_loaded_come_from_copy_result() {
        let copy_result = QueryResult::from_rows(
            &["file", "status", "rows_loaded"],
            vec![
                vec![Value::Text("a.parquet".into()), Value::Text("LOADED".into()), Value::Int(10)],
                vec![Value::Text("b.parquet".into()), Value::Text("LOADED".into()), Value::Int(5)],
            ],
        );
        let driver = Arc::new(DryRunDriver::new().respond_to("COPY INTO", copy_result));
        let mut session = session_on(driver).await;
        let mut config = PipelineConfig::default();
        config.tables = vec![TableDeclaration::new("order_header", "RAW_POS", "pos").partitioned_by(&["2019", "2020"])];

        let report = load_all_raw_tables(&mut session, &config, &logger()).await.unwrap();
        assert_eq!(report.copies.len(), 2);
        assert_eq!(report.rows_loaded(), 30);
    }

    #[tokio::test]
    async fn scale_down_runs_after_failed_copy() {
        let driver = Arc::new(
            DryRunDriver::new().fail_on("COPY INTO truck", EngineError::execution_error("no files")),
        );
        let mut session = session_on(driver.clone()).await;
        let config = PipelineConfig::default();

        let err = load_all_raw_tables(&mut session, &config, &logger()).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionError { .. }));

        // loading stopped at truck: nothing after it was copied
        assert_eq!(driver.count_matching("COPY INTO order_header"), 0);
        assert_eq!(driver.count_matching("WAREHOUSE_SIZE = XSMALL"), 1);
        assert!(driver
            .statements()
            .last()
            .unwrap()
            .statement
            .contains("WAREHOUSE_SIZE = XSMALL"));
    }

    #[tokio::test]
    async fn load_error_wins_over_scale_down_error() {
        let driver = Arc::new(
            DryRunDriver::new()
                .fail_on("WAREHOUSE_SIZE = XSMALL", EngineError::auth_failed("role revoked"))
                .fail_on("COPY INTO", EngineError::execution_error("no files")),
        );
        let mut session = session_on(driver).await;
        let err = load_all_raw_tables(&mut session, &PipelineConfig::default(), &logger())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ExecutionError { .. }));
    }

    #[tokio::test]
    async fn scale_down_error_after_success_is_reported() {
        let driver = Arc::new(
            DryRunDriver::new().fail_on("WAREHOUSE_SIZE = XSMALL", EngineError::auth_failed("role revoked")),
        );
        let mut session = session_on(driver).await;
        let err = load_all_raw_tables(&mut session, &PipelineConfig::default(), &logger())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AuthenticationFailed { .. }));
    }
}
