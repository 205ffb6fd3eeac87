// SPDX-License-Identifier: Apache-2.0

//! In-process statement counters, logged as a summary when a stage ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct StatementMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static STATEMENT_METRICS: OnceLock<StatementMetrics> = OnceLock::new();

fn metrics() -> &'static StatementMetrics {
    STATEMENT_METRICS.get_or_init(StatementMetrics::default)
}

pub fn record_statement(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatementMetricsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub duration_total_ms: u64,
    pub duration_max_ms: u64,
}

pub fn snapshot() -> StatementMetricsSnapshot {
    let metrics = metrics();
    StatementMetricsSnapshot {
        total: metrics.total.load(Ordering::Relaxed),
        failed: metrics.failed.load(Ordering::Relaxed),
        duration_total_ms: metrics.duration_total_ms.load(Ordering::Relaxed),
        duration_max_ms: metrics.duration_max_ms.load(Ordering::Relaxed),
    }
}
