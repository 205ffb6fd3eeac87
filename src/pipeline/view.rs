// SPDX-License-Identifier: Apache-2.0

//! Flattened POS view and its change stream in the `HARMONIZED` schema

use tracing::{debug, info, instrument, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::{QueryResult, Session};
use crate::pipeline::relation::{col, to_date, Relation};

pub const HARMONIZED_SCHEMA: &str = "HARMONIZED";
pub const VIEW_NAME: &str = "POS_FLATTENED_V";
pub const STREAM_NAME: &str = "POS_FLATTENED_V_STREAM";
pub const SAMPLE_ROWS: u32 = 5;

/// Column order of `POS_FLATTENED_V`
pub const FLATTENED_COLUMNS: [&str; 25] = [
    "ORDER_ID",
    "TRUCK_ID",
    "ORDER_TS",
    "ORDER_TS_DATE",
    "ORDER_DETAIL_ID",
    "LINE_NUMBER",
    "TRUCK_BRAND_NAME",
    "MENU_TYPE",
    "PRIMARY_CITY",
    "REGION",
    "COUNTRY",
    "FRANCHISE_FLAG",
    "FRANCHISE_ID",
    "FRANCHISEE_FIRST_NAME",
    "FRANCHISEE_LAST_NAME",
    "LOCATION_ID",
    "MENU_ITEM_ID",
    "MENU_ITEM_NAME",
    "QUANTITY",
    "UNIT_PRICE",
    "PRICE",
    "ORDER_AMOUNT",
    "ORDER_TAX_AMOUNT",
    "ORDER_DISCOUNT_AMOUNT",
    "ORDER_TOTAL",
];

/// Join plan behind the view:
/// `order_detail ⋈ ((order_header ⋈ (truck ⋈ franchise)) ⋈ location) ⋈ menu`
pub fn pos_flattened_plan() -> EngineResult<Relation> {
    let order_detail = Relation::scan(
        "RAW_POS.ORDER_DETAIL",
        "od",
        vec![
            col("ORDER_DETAIL_ID"),
            col("LINE_NUMBER"),
            col("MENU_ITEM_ID"),
            col("QUANTITY"),
            col("UNIT_PRICE"),
            col("PRICE"),
            col("ORDER_ID"),
        ],
    )?;
    let order_header = Relation::scan(
        "RAW_POS.ORDER_HEADER",
        "oh",
        vec![
            col("ORDER_ID"),
            col("TRUCK_ID"),
            col("ORDER_TS"),
            to_date("ORDER_TS").alias("ORDER_TS_DATE"),
            col("ORDER_AMOUNT"),
            col("ORDER_TAX_AMOUNT"),
            col("ORDER_DISCOUNT_AMOUNT"),
            col("LOCATION_ID"),
            col("ORDER_TOTAL"),
        ],
    )?;
    let truck = Relation::scan(
        "RAW_POS.TRUCK",
        "t",
        vec![
            col("TRUCK_ID"),
            col("PRIMARY_CITY"),
            col("REGION"),
            col("COUNTRY"),
            col("FRANCHISE_FLAG"),
            col("FRANCHISE_ID"),
        ],
    )?;
    let franchise = Relation::scan(
        "RAW_POS.FRANCHISE",
        "f",
        vec![
            col("FRANCHISE_ID"),
            col("FIRST_NAME").alias("FRANCHISEE_FIRST_NAME"),
            col("LAST_NAME").alias("FRANCHISEE_LAST_NAME"),
        ],
    )?;
    let location = Relation::scan("RAW_POS.LOCATION", "l", vec![col("LOCATION_ID")])?;
    let menu = Relation::scan(
        "RAW_POS.MENU",
        "m",
        vec![
            col("MENU_ITEM_ID"),
            col("TRUCK_BRAND_NAME"),
            col("MENU_TYPE"),
            col("MENU_ITEM_NAME"),
        ],
    )?;

    let truck_with_franchise = truck.join(franchise, "FRANCHISE_ID", "FRANCHISE_ID")?;
    let header_with_truck_and_location = order_header
        .join(truck_with_franchise, "TRUCK_ID", "TRUCK_ID")?
        .join(location, "LOCATION_ID", "LOCATION_ID")?;

    order_detail
        .join(header_with_truck_and_location, "ORDER_ID", "ORDER_ID")?
        .join(menu, "MENU_ITEM_ID", "MENU_ITEM_ID")
}

/// The `SELECT` the view is defined by
pub fn pos_flattened_select() -> EngineResult<String> {
    pos_flattened_plan()?.select(&FLATTENED_COLUMNS)
}

pub fn create_view_statement() -> EngineResult<String> {
    Ok(format!(
        "CREATE OR REPLACE VIEW {} AS\n{}",
        VIEW_NAME,
        pos_flattened_select()?
    ))
}

pub fn create_stream_statement() -> String {
    format!(
        "CREATE OR REPLACE STREAM {} ON VIEW {} SHOW_INITIAL_ROWS = TRUE",
        STREAM_NAME, VIEW_NAME
    )
}

/// Creates or replaces `HARMONIZED.POS_FLATTENED_V`
#[instrument(skip(session))]
pub async fn create_pos_view(session: &mut Session) -> EngineResult<()> {
    // Render before touching the session so plan errors never reach the warehouse.
    let statement = create_view_statement()?;
    session.use_schema(HARMONIZED_SCHEMA)?;
    session.sql(&statement).await?;
    info!("Created view {}.{}", HARMONIZED_SCHEMA, VIEW_NAME);
    Ok(())
}

/// Creates or replaces the stream over the view. Replacing a stream drops
/// its pending changes.
#[instrument(skip(session))]
pub async fn create_pos_view_stream(session: &mut Session) -> EngineResult<()> {
    session.use_schema(HARMONIZED_SCHEMA)?;
    session.sql(&create_stream_statement()).await?;
    info!("Created stream {}.{}", HARMONIZED_SCHEMA, STREAM_NAME);
    Ok(())
}

/// Reads a small sample of the view
#[instrument(skip(session))]
pub async fn test_pos_view(session: &mut Session) -> EngineResult<QueryResult> {
    session.use_schema(HARMONIZED_SCHEMA)?;
    let sample = session
        .sql(&format!("SELECT * FROM {} LIMIT {}", VIEW_NAME, SAMPLE_ROWS))
        .await?;
    debug!(rows = sample.rows.len(), "Read view sample");
    Ok(sample)
}

/// Row counts gathered by [`check_pos_view`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewStats {
    pub view_rows: u64,
    pub order_detail_rows: u64,
    pub stream_rows: u64,
}

/// Compares the view against its driving table and the stream backlog
///
/// Every view row comes from one order_detail row, so a larger view means a
/// join fanned out. Reading the stream does not consume it.
#[instrument(skip(session))]
pub async fn check_pos_view(session: &mut Session) -> EngineResult<ViewStats> {
    session.use_schema(HARMONIZED_SCHEMA)?;
    let stats = ViewStats {
        view_rows: count_rows(session, VIEW_NAME).await?,
        order_detail_rows: count_rows(session, "RAW_POS.ORDER_DETAIL").await?,
        stream_rows: count_rows(session, STREAM_NAME).await?,
    };

    if stats.view_rows > stats.order_detail_rows {
        return Err(EngineError::validation(format!(
            "{} has {} rows but RAW_POS.ORDER_DETAIL only {}",
            VIEW_NAME, stats.view_rows, stats.order_detail_rows
        )));
    }
    if stats.stream_rows != stats.view_rows {
        warn!(
            view_rows = stats.view_rows,
            stream_rows = stats.stream_rows,
            "Stream backlog differs from view row count"
        );
    }

    info!(
        view_rows = stats.view_rows,
        order_detail_rows = stats.order_detail_rows,
        stream_rows = stats.stream_rows,
        "View checks passed"
    );
    Ok(stats)
}

async fn count_rows(session: &Session, relation: &str) -> EngineResult<u64> {
    let result = session
        .sql(&format!("SELECT COUNT(*) FROM {}", relation))
        .await?;
    result
        .first_value()
        .and_then(|value| value.as_u64())
        .ok_or_else(|| EngineError::internal(format!("row count of {} was not a number", relation)))
}
