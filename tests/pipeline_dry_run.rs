// SPDX-License-Identifier: Apache-2.0

//! End-to-end runs of the three commands against the dry-run driver.

use std::io::Write;
use std::sync::Arc;

use pos_pipeline::commands::{self, AppContext};
use pos_pipeline::config::{AppConfig, ConfigPaths, TableDeclaration};
use pos_pipeline::engine::drivers::dry_run::DryRunDriver;
use pos_pipeline::engine::{ConnectionParams, DriverRegistry, EngineError, QueryResult, Value};
use pos_pipeline::PipelineError;
use tempfile::NamedTempFile;

fn dry_run_context(driver: Arc<DryRunDriver>, config: AppConfig) -> AppContext {
    let mut registry = DriverRegistry::new();
    registry.register(driver);
    let params = ConnectionParams::default()
        .with("driver", "dry_run")
        .with("role", "SYSADMIN")
        .with("warehouse", "COMPUTE_WH");
    AppContext::new(registry, config, params)
}

fn count(n: i64) -> QueryResult {
    QueryResult::from_rows(&["COUNT(*)"], vec![vec![Value::Int(n)]])
}

#[tokio::test]
async fn load_raw_issues_one_copy_per_partition() {
    let driver = Arc::new(DryRunDriver::new());
    let ctx = dry_run_context(driver.clone(), AppConfig::default());

    let report = commands::load_raw::run(&ctx).await.expect("load failed");
    assert_eq!(report.copies.len(), 12);

    for table in ["country", "franchise", "location", "menu", "truck", "customer_loyalty"] {
        assert_eq!(
            driver.count_matching(&format!("COPY INTO {} FROM", table)),
            1,
            "{} should be copied once",
            table
        );
    }
    for table in ["order_header", "order_detail"] {
        assert_eq!(driver.count_matching(&format!("COPY INTO {} FROM", table)), 3);
        for year in ["2019", "2020", "2021"] {
            assert_eq!(
                driver.count_matching(&format!("/pos/{}/year={}'", table, year)),
                2,
                "only the template and the copy reference {} {}",
                table,
                year
            );
        }
    }

    // config overrides the connection file's role and warehouse
    let statements = driver.statements();
    assert!(statements.iter().all(|s| s.context.role.as_deref() == Some("HOL_ROLE")));
    assert!(statements.iter().all(|s| s.context.warehouse.as_deref() == Some("HOL_WH")));
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test]
async fn load_raw_respects_custom_catalog() {
    let driver = Arc::new(DryRunDriver::new());
    let mut config = AppConfig::default();
    config.pipeline.warehouse = "LOAD_WH".to_string();
    config.pipeline.tables = vec![
        TableDeclaration::new("menu", "RAW_POS", "pos"),
        TableDeclaration::new("order_header", "RAW_POS", "pos").partitioned_by(&["2022"]),
    ];
    let ctx = dry_run_context(driver.clone(), config);

    let report = commands::load_raw::run(&ctx).await.unwrap();
    assert_eq!(report.copies.len(), 2);
    assert_eq!(
        report.copies[1].location,
        "@external.frostbyte_raw_stage/pos/order_header/year=2022"
    );
    assert_eq!(driver.count_matching("ALTER WAREHOUSE LOAD_WH"), 2);
}

#[tokio::test]
async fn failed_load_still_scales_down_and_closes() {
    let driver = Arc::new(
        DryRunDriver::new().fail_on("COPY INTO location", EngineError::execution_error("access denied")),
    );
    let ctx = dry_run_context(driver.clone(), AppConfig::default());

    let err = commands::load_raw::run(&ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Remote(EngineError::ExecutionError { .. })));
    assert_eq!(err.kind(), "remote");

    let last = driver.statements().pop().unwrap();
    assert_eq!(
        last.statement,
        "ALTER WAREHOUSE HOL_WH SET WAREHOUSE_SIZE = XSMALL WAIT_FOR_COMPLETION = TRUE"
    );
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test]
async fn create_pos_view_stops_after_sample_by_default() {
    let driver = Arc::new(DryRunDriver::new());
    let ctx = dry_run_context(driver.clone(), AppConfig::default());

    let stats = commands::create_pos_view::run(&ctx).await.expect("view failed");
    assert_eq!(stats, None);

    let statements: Vec<String> = driver.statements().into_iter().map(|s| s.statement).collect();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE OR REPLACE VIEW POS_FLATTENED_V AS"));
    assert!(statements[1].starts_with("CREATE OR REPLACE STREAM POS_FLATTENED_V_STREAM"));
    assert_eq!(statements[2], "SELECT * FROM POS_FLATTENED_V LIMIT 5");
    assert_eq!(driver.count_matching("COUNT(*)"), 0);
    assert_eq!(driver.open_sessions(), 0);
}

#[tokio::test]
async fn create_pos_view_checks_counts_when_enabled() {
    let driver = Arc::new(
        DryRunDriver::new()
            .respond_to("FROM POS_FLATTENED_V_STREAM", count(42))
            .respond_to("SELECT COUNT(*) FROM POS_FLATTENED_V", count(42))
            .respond_to("SELECT COUNT(*) FROM RAW_POS.ORDER_DETAIL", count(50)),
    );
    let mut config = AppConfig::default();
    config.pipeline.verify_view = true;
    let ctx = dry_run_context(driver.clone(), config);

    let stats = commands::create_pos_view::run(&ctx)
        .await
        .expect("view failed")
        .expect("checks should run");
    assert_eq!(stats.view_rows, 42);
    assert_eq!(stats.order_detail_rows, 50);
    assert_eq!(stats.stream_rows, 42);
    assert_eq!(driver.statements().len(), 6);
}

#[tokio::test]
async fn validate_connection_outcomes() {
    let ok = Arc::new(DryRunDriver::new());
    let ctx = dry_run_context(ok.clone(), AppConfig::default());
    commands::validate_connection::run(&ctx).await.expect("validation failed");
    assert_eq!(ok.count_matching("SELECT CURRENT_TIMESTAMP()"), 1);

    let failing = Arc::new(
        DryRunDriver::new().fail_on("CURRENT_TIMESTAMP", EngineError::auth_failed("bad token")),
    );
    let ctx = dry_run_context(failing, AppConfig::default());
    let err = commands::validate_connection::run(&ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Remote(EngineError::ConnectionFailed { .. })));

    // an unregistered driver is a construction error, not a failed test
    let ctx = AppContext::new(
        DriverRegistry::new(),
        AppConfig::default(),
        ConnectionParams::default().with("driver", "dry_run"),
    );
    let err = commands::validate_connection::run(&ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Remote(EngineError::DriverNotFound { .. })));
}

#[tokio::test]
async fn bootstrap_reads_both_files() {
    let mut connection = NamedTempFile::new().unwrap();
    connection
        .write_all(br#"{"driver":"dry_run","account":"xy12345","password":"secret"}"#)
        .unwrap();
    let mut config = NamedTempFile::new().unwrap();
    config
        .write_all(br#"{"logging":{"level":"WARNING"},"pipeline":{"idle_size":"SMALL"}}"#)
        .unwrap();

    let paths = ConfigPaths {
        connection: connection.path().to_path_buf(),
        config: config.path().to_path_buf(),
        config_explicit: true,
    };
    let ctx = AppContext::bootstrap(&paths).expect("bootstrap failed");
    assert_eq!(ctx.params.driver(), "dry_run");
    assert_eq!(ctx.logger.level(), tracing::Level::WARN);
    assert_eq!(ctx.config.pipeline.idle_size.to_string(), "SMALL");
    assert!(!format!("{:?}", ctx.params).contains("secret"));

    commands::validate_connection::run(&ctx).await.expect("dry run validation failed");
}

#[test]
fn bootstrap_fails_on_missing_connection_file() {
    let paths = ConfigPaths {
        connection: "/nonexistent/snowflake_connection.json".into(),
        config: "/nonexistent/config.json".into(),
        config_explicit: false,
    };
    let err = AppContext::bootstrap(&paths).err().expect("bootstrap should fail");
    assert_eq!(err.kind(), "configuration");
}
