//! Append-only build and parse event logs for grammar workflows.
//!
//! Every grammar build and every parse attempt is recorded as one JSON
//! object per line in a JSONL log, one file per event kind:
//!
//! - `logs/builds.jsonl` — [`BuildEvent`]s
//! - `logs/parses.jsonl` — [`ParseEvent`]s
//!
//! Records are never rewritten. All later consumption goes through
//! [`LogRepository`], which re-reads a log on every query.
//!
//! # Writing
//!
//! The workflow that ran an operation describes its result as a
//! [`BuildOutcome`] or [`ParseOutcome`] and hands it to a [`LogWriter`]. The
//! writer stamps the time, caps any stderr excerpt, and appends one line.
//! A failed write is reported as [`Error::LogWrite`], independently of
//! whether the operation itself succeeded.
//!
//! # Querying
//!
//! [`LogRepository`] decodes lines independently. Unknown fields are
//! ignored, so records from older and newer versions coexist in one file.
//! Queries cover recent-N listings, failures-only parses, [`SummaryMetrics`]
//! with latency percentiles, and the legacy success-rate and average-time
//! shapes.
//!
//! A parse whose tree contains `ERROR` nodes counts as a failure in every
//! success/failure report, even when the parser process succeeded.
//!
//! # Example
//!
//! ```no_run
//! use eventlog::{BuildOutcome, LogRepository, LogWriter, Status};
//!
//! let writer = LogWriter::new("logs");
//! writer.record_build(BuildOutcome::new("json", Status::Success, 1250))?;
//!
//! let repo = LogRepository::new(".");
//! let (metrics, _counts) = repo.build_metrics(Some("json"))?;
//! println!("p95 build time: {}ms", metrics.latency_ms.p95);
//! # Ok::<(), eventlog::Error>(())
//! ```

mod error;
mod event;
pub mod excerpt;
pub mod metrics;
mod repository;
pub mod tree;
mod writer;

pub use error::{Error, Result};
pub use event::{
    BuildEvent, Compiler, Diagnostic, DiagnosticLevel, Event, EventKind, LogEvent, ParseEvent,
    Status, Timestamp, encode_line,
};
pub use metrics::{Latency, StatusCounts, SummaryMetrics};
pub use repository::{GrammarStats, LOGS_DIR, LogRepository, SuccessCount, limit_from, load};
pub use tree::TreeStats;
pub use writer::{BuildOutcome, LogWriter, ParseOutcome, append_line};
