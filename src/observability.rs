// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.
//!
//! Each binary builds one [`PipelineLogger`] from the `logging` section of
//! `config.json`, installs it, and hands it to the stages it runs.
//!
//! - Pipeline records go to stdout as `[LEVEL] timestamp | message`,
//!   filtered by the configured level.
//! - With `propagate` enabled, records also reach the root handler: a JSON
//!   log under `logs/`, rotated daily, which additionally receives records
//!   from dependencies (HTTP client, runtime).

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing::{Event, Level, Span, Subscriber};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::LoggingConfig;

/// Target of every record emitted by this crate
pub const LOG_TARGET: &str = "pos_pipeline";
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "pos_pipeline.log";
const LOG_RETENTION_DAYS: u64 = 14;

/// Explicit logging handle, built once per process
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    level: Level,
    propagate: bool,
    log_dir: PathBuf,
}

impl PipelineLogger {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level(),
            propagate: config.propagate,
            log_dir: PathBuf::from(LOG_DIR),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn propagates(&self) -> bool {
        self.propagate
    }

    /// Span wrapping one stage; its name prefixes every record inside it
    pub fn stage(&self, name: &'static str) -> Span {
        tracing::info_span!(target: LOG_TARGET, "stage", name = %name)
    }

    /// Installs the global subscriber. Safe to call more than once; later
    /// calls are ignored.
    pub fn install(&self) {
        let stdout_filter = Targets::new().with_target(LOG_TARGET, LevelFilter::from_level(self.level));
        let stdout_layer = tracing_subscriber::fmt::layer()
            .event_format(BracketFormat)
            .with_writer(std::io::stdout)
            .with_filter(stdout_filter);

        let root_layer = if self.propagate {
            if let Err(e) = fs::create_dir_all(&self.log_dir) {
                eprintln!("Failed to create log directory {}: {}", self.log_dir.display(), e);
            }
            if let Err(e) = cleanup_old_logs(&self.log_dir, LOG_RETENTION_DAYS) {
                eprintln!("Failed to clean up old logs: {}", e);
            }
            let appender: RollingFileAppender =
                tracing_appender::rolling::daily(&self.log_dir, LOG_FILE_PREFIX);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_filter(LevelFilter::from_level(self.level)),
            )
        } else {
            None
        };

        let _ = tracing_subscriber::registry()
            .with(stdout_layer)
            .with(root_layer)
            .try_init();

        tracing::debug!(
            target: LOG_TARGET,
            level = %self.level,
            propagate = self.propagate,
            "Logging initialized"
        );
    }
}

/// `[INFO] 2024-05-01 12:00:00 | stage{name=load_raw}: Loading menu`
struct BracketFormat;

impl<S, N> FormatEvent<S, N> for BracketFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "[{}] {} | ",
            event.metadata().level(),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<tracing_subscriber::fmt::FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<()> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if matches!(age, Some(age) if age > retention) {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {}: {}", path.display(), e);
            }
        }
    }
    Ok(())
}
