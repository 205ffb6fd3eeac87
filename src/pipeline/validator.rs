// SPDX-License-Identifier: Apache-2.0

//! Connection validator

use tracing::{error, info, instrument};

use crate::engine::error::EngineResult;
use crate::engine::{ConnectionParams, DriverRegistry, Session};

pub const CONNECTION_TEST_QUERY: &str = "SELECT CURRENT_TIMESTAMP()";

/// Opens a session from the connection file contents. Failures are returned,
/// not swallowed.
#[instrument(skip(registry, params))]
pub async fn build_session(registry: &DriverRegistry, params: &ConnectionParams) -> EngineResult<Session> {
    Session::connect(registry, params).await.map_err(|e| {
        error!(error = %e, "Failed to create warehouse session");
        e
    })
}

/// Runs a trivial query; `false` if it fails for any reason
#[instrument(skip(session), fields(driver = session.driver_id()))]
pub async fn test_session(session: &Session) -> bool {
    match session.sql(CONNECTION_TEST_QUERY).await {
        Ok(result) => {
            let now = result
                .first_value()
                .map(|v| v.to_string())
                .unwrap_or_else(|| String::from("<no rows>"));
            info!("Connection test successful. Current timestamp: {}", now);
            true
        }
        Err(e) => {
            error!("Connection test failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::engine::drivers::dry_run::DryRunDriver;
    use crate::engine::error::EngineError;
    use crate::engine::{QueryResult, Value};

    #[tokio::test]
    async fn successful_query_validates() {
        let driver = Arc::new(DryRunDriver::new().respond_to(
            "CURRENT_TIMESTAMP",
            QueryResult::from_rows(
                &["CURRENT_TIMESTAMP()"],
                vec![vec![Value::Text("2024-05-01 12:00:00.000 -0700".into())]],
            ),
        ));
        let session = Session::open(driver.clone(), &ConnectionParams::default()).await.unwrap();

        assert!(test_session(&session).await);
        assert_eq!(driver.statements()[0].statement, CONNECTION_TEST_QUERY);
    }

    #[tokio::test]
    async fn failed_query_is_false_not_error() {
        let driver = Arc::new(
            DryRunDriver::new().fail_on("CURRENT_TIMESTAMP", EngineError::auth_failed("token expired")),
        );
        let session = Session::open(driver, &ConnectionParams::default()).await.unwrap();
        assert!(!test_session(&session).await);
    }

    #[tokio::test]
    async fn construction_failure_propagates() {
        let registry = DriverRegistry::with_defaults();
        let params = ConnectionParams::default().with("driver", "teradata");
        let result = build_session(&registry, &params).await;
        assert!(matches!(result, Err(EngineError::DriverNotFound { .. })));

        // the Snowflake driver refuses params without an account
        let params = ConnectionParams::default().with("user", "loader");
        assert!(build_session(&registry, &params).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_warehouse_fails_construction() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let params = ConnectionParams::default()
            .with("host", host)
            .with("token", "definitely-invalid");
        let result = build_session(&DriverRegistry::with_defaults(), &params).await;
        assert!(matches!(result, Err(EngineError::ConnectionFailed { .. })));
    }
}
