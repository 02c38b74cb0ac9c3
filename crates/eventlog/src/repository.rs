//! Typed reads and queries over the JSONL logs.
//!
//! Every query re-reads its log from disk. Lines are decoded independently,
//! so a file may mix records written by older and newer schema versions;
//! a single undecodable line fails the whole load with its line number.

use crate::event::decode_line;
use crate::metrics::{self, StatusCounts, SummaryMetrics, round2};
use crate::{BuildEvent, Error, Event, EventKind, LogEvent, ParseEvent, Result, Status};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Name of the logs directory under a repository root.
pub const LOGS_DIR: &str = "logs";

const UNKNOWN_COMMIT: &str = "unknown";

/// Loads every event in a JSONL log, oldest first.
///
/// A missing file is an empty log. Blank lines are skipped.
pub fn load<E: LogEvent>(path: &Path) -> Result<Vec<E>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::LogRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| {
            if source.kind() == io::ErrorKind::InvalidData {
                Error::LogDecode {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: "line is not valid UTF-8".to_string(),
                }
            } else {
                Error::LogRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let event = decode_line::<E>(&line).map_err(|message| Error::LogDecode {
            path: path.to_path_buf(),
            line: line_no,
            message,
        })?;
        events.push(event);
    }

    tracing::debug!(path = %path.display(), kind = %E::KIND, count = events.len(), "loaded log");
    Ok(events)
}

/// Validates a user-supplied limit.
pub fn limit_from(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::Validation(format!("limit must be non-negative, got {value}")))
}

/// One entry of the legacy build success-rate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuccessCount {
    pub success: bool,
    pub count: usize,
}

/// Per-grammar activity across both logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrammarStats {
    pub grammar: String,
    pub builds: usize,
    pub parses: usize,
    /// Percentage of successful builds, absent without builds.
    pub build_success_rate: Option<f64>,
    /// Percentage of failed parses (error trees included), absent without parses.
    pub parse_failure_rate: Option<f64>,
}

/// Read side of the build and parse logs.
#[derive(Debug, Clone)]
pub struct LogRepository {
    logs_dir: PathBuf,
}

impl LogRepository {
    /// Repository for the `logs/` directory under `repo_root`.
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self::with_logs_dir(repo_root.as_ref().join(LOGS_DIR))
    }

    pub fn with_logs_dir(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn path(&self, kind: EventKind) -> PathBuf {
        self.logs_dir.join(kind.file_name())
    }

    /// All events of kind `E`, in file order.
    pub fn events<E: LogEvent>(&self) -> Result<Vec<E>> {
        load(&self.path(E::KIND))
    }

    /// Events for `grammar` (all when `None`), in file order.
    pub fn filtered<E: LogEvent>(&self, grammar: Option<&str>) -> Result<Vec<E>> {
        let mut events = self.events::<E>()?;
        if let Some(grammar) = grammar {
            events.retain(|event| event.grammar() == grammar);
        }
        Ok(events)
    }

    /// The last `limit` matching builds (all when `None`), in file order.
    pub fn recent_builds(
        &self,
        limit: Option<usize>,
        grammar: Option<&str>,
    ) -> Result<Vec<BuildEvent>> {
        Ok(take_last(self.filtered(grammar)?, limit))
    }

    /// The last `limit` matching parses (all when `None`), in file order.
    ///
    /// With `failures_only`, keeps failed parses and parses whose tree has
    /// errors.
    pub fn recent_parses(
        &self,
        limit: Option<usize>,
        grammar: Option<&str>,
        failures_only: bool,
    ) -> Result<Vec<ParseEvent>> {
        let mut events: Vec<ParseEvent> = self.filtered(grammar)?;
        if failures_only {
            events.retain(|event| event.is_failure());
        }
        Ok(take_last(events, limit))
    }

    /// Summary metrics and status counts for events of kind `E`.
    pub fn metrics<E: LogEvent>(
        &self,
        grammar: Option<&str>,
    ) -> Result<(SummaryMetrics, StatusCounts)> {
        let events = self.filtered::<E>(grammar)?;
        Ok((
            SummaryMetrics::from_events(&events),
            metrics::status_counts(&events),
        ))
    }

    pub fn build_metrics(&self, grammar: Option<&str>) -> Result<(SummaryMetrics, StatusCounts)> {
        self.metrics::<BuildEvent>(grammar)
    }

    pub fn parse_metrics(&self, grammar: Option<&str>) -> Result<(SummaryMetrics, StatusCounts)> {
        self.metrics::<ParseEvent>(grammar)
    }

    /// Legacy `{success, count}` pairs; zero counts are omitted.
    pub fn build_success_rate_counts(&self, grammar: &str) -> Result<Vec<SuccessCount>> {
        let (_, counts) = self.build_metrics(Some(grammar))?;
        let entries = [Status::Success, Status::Failure]
            .into_iter()
            .filter_map(|status| {
                counts.get(&status).map(|&count| SuccessCount {
                    success: status == Status::Success,
                    count,
                })
            })
            .collect();
        Ok(entries)
    }

    /// Mean parse duration for `grammar` over every parse, whatever its status.
    pub fn average_parse_duration_ms(&self, grammar: &str) -> Result<f64> {
        let durations: Vec<u64> = self
            .filtered::<ParseEvent>(Some(grammar))?
            .iter()
            .map(|event| event.duration_ms)
            .collect();
        Ok(metrics::mean(&durations))
    }

    /// Commit of the most recent build of `grammar`, or `"unknown"`.
    ///
    /// Reads only the `grammar` and `commit` keys of each line, so partial
    /// records still count. Lines that are not JSON objects are skipped with
    /// a warning.
    pub fn latest_commit(&self, grammar: &str) -> Result<String> {
        let path = self.path(EventKind::Build);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(UNKNOWN_COMMIT.to_string()),
            Err(source) => return Err(Error::LogRead { path, source }),
        };

        let mut latest = UNKNOWN_COMMIT.to_string();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let Ok(line) = line else {
                tracing::warn!(path = %path.display(), line = index + 1, "skipping unreadable build log line");
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            let entry = match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(entry)) => entry,
                Ok(_) => {
                    tracing::warn!(path = %path.display(), line = index + 1, "skipping non-object build log line");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = index + 1, error = %e, "skipping invalid build log line");
                    continue;
                }
            };
            if entry.get("grammar").and_then(Value::as_str) == Some(grammar) {
                latest = match entry.get("commit") {
                    None | Some(Value::Null) => UNKNOWN_COMMIT.to_string(),
                    Some(Value::String(commit)) => commit.clone(),
                    Some(other) => other.to_string(),
                };
            }
        }
        Ok(latest)
    }

    /// Activity per grammar across both logs, sorted by grammar name.
    pub fn grammar_stats(&self) -> Result<Vec<GrammarStats>> {
        let mut builds: BTreeMap<String, Vec<BuildEvent>> = BTreeMap::new();
        for event in self.events::<BuildEvent>()? {
            builds.entry(event.grammar.clone()).or_default().push(event);
        }
        let mut parses: BTreeMap<String, Vec<ParseEvent>> = BTreeMap::new();
        for event in self.events::<ParseEvent>()? {
            parses.entry(event.grammar.clone()).or_default().push(event);
        }

        let mut grammars: Vec<&String> = builds.keys().chain(parses.keys()).collect();
        grammars.sort();
        grammars.dedup();

        let stats = grammars
            .into_iter()
            .map(|grammar| {
                let grammar_builds = builds.get(grammar).map(Vec::as_slice).unwrap_or_default();
                let grammar_parses = parses.get(grammar).map(Vec::as_slice).unwrap_or_default();
                GrammarStats {
                    grammar: grammar.clone(),
                    builds: grammar_builds.len(),
                    parses: grammar_parses.len(),
                    build_success_rate: rate(grammar_builds, |e| !e.is_failure()),
                    parse_failure_rate: rate(grammar_parses, |e| e.is_failure()),
                }
            })
            .collect();
        Ok(stats)
    }

    /// The last `limit` events across both logs, in chronological order.
    ///
    /// Sorting is stable; records whose timestamp does not parse sort first.
    pub fn timeline(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events::<BuildEvent>()?
            .into_iter()
            .map(Event::Build)
            .chain(self.events::<ParseEvent>()?.into_iter().map(Event::Parse))
            .collect();
        events.sort_by_key(|event| event.timestamp().to_utc());
        Ok(take_last(events, limit))
    }
}

fn take_last<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        let start = items.len().saturating_sub(limit);
        items.drain(..start);
    }
    items
}

fn rate<E>(events: &[E], counted: impl Fn(&E) -> bool) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    let hits = events.iter().filter(|e| counted(*e)).count();
    Some(round2(hits as f64 / events.len() as f64 * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn repo_with(builds: &[&str], parses: &[&str]) -> (TempDir, LogRepository) {
        let dir = tempdir().unwrap();
        let logs = dir.path().join(LOGS_DIR);
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("builds.jsonl"), builds.join("\n") + "\n").unwrap();
        fs::write(logs.join("parses.jsonl"), parses.join("\n") + "\n").unwrap();
        let repo = LogRepository::new(dir.path());
        (dir, repo)
    }

    const BUILDS: &[&str] = &[
        r#"{"event_type":"build","grammar":"a","status":"success","duration_ms":10,"timestamp":"2026-01-01T00:00:00","commit":"c1"}"#,
        r#"{"event_type":"build","grammar":"b","status":"failure","duration_ms":20,"timestamp":"2026-01-01T00:01:00","commit":"c2"}"#,
        r#"{"event_type":"build","grammar":"a","status":"success","duration_ms":30,"timestamp":"2026-01-01T00:02:00","commit":"c3"}"#,
    ];

    const PARSES: &[&str] = &[
        r#"{"event_type":"parse","grammar":"a","status":"success","has_errors":false,"duration_ms":5,"timestamp":"2026-01-01T00:03:00"}"#,
        r#"{"event_type":"parse","grammar":"a","status":"success","has_errors":true,"duration_ms":15,"timestamp":"2026-01-01T00:04:00"}"#,
        r#"{"event_type":"parse","grammar":"b","status":"failure","has_errors":false,"duration_ms":25,"timestamp":"2026-01-01T00:05:00"}"#,
    ];

    #[test]
    fn test_recent_and_filtered_queries() {
        let (_dir, repo) = repo_with(BUILDS, PARSES);

        let recent = repo.recent_builds(Some(2), None).unwrap();
        let grammars: Vec<&str> = recent.iter().map(|e| e.grammar.as_str()).collect();
        assert_eq!(grammars, ["b", "a"]);

        assert_eq!(repo.recent_builds(Some(10), Some("a")).unwrap().len(), 2);
        assert_eq!(repo.recent_builds(None, None).unwrap().len(), 3);
        assert!(repo.recent_builds(Some(0), None).unwrap().is_empty());

        let failures = repo.recent_parses(Some(10), None, true).unwrap();
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn test_summary_metrics() {
        let (_dir, repo) = repo_with(
            &[
                r#"{"event_type":"build","grammar":"a","status":"success","duration_ms":100,"timestamp":"2026-01-01T00:00:00"}"#,
                r#"{"event_type":"build","grammar":"a","status":"failure","duration_ms":300,"timestamp":"2026-01-01T00:01:00"}"#,
            ],
            &[
                r#"{"event_type":"parse","grammar":"a","status":"success","has_errors":false,"duration_ms":10,"timestamp":"2026-01-01T00:03:00"}"#,
                r#"{"event_type":"parse","grammar":"a","status":"success","has_errors":true,"duration_ms":30,"timestamp":"2026-01-01T00:04:00"}"#,
            ],
        );

        let (build_metrics, build_counts) = repo.build_metrics(Some("a")).unwrap();
        assert_eq!(build_metrics.total, 2);
        assert_eq!(build_metrics.success_rate, 50.0);
        assert_eq!(build_counts.get(&Status::Success), Some(&1));
        assert_eq!(build_counts.get(&Status::Failure), Some(&1));

        let (parse_metrics, parse_counts) = repo.parse_metrics(Some("a")).unwrap();
        assert_eq!(parse_metrics.total, 2);
        assert_eq!(parse_metrics.failure_count, 1);
        assert_eq!(parse_metrics.latency_ms.p50, 20.0);
        assert_eq!(parse_counts.get(&Status::Success), Some(&1));
        assert_eq!(parse_counts.get(&Status::Failure), Some(&1));
    }

    #[test]
    fn test_legacy_shims() {
        let (_dir, repo) = repo_with(BUILDS, PARSES);

        assert_eq!(
            repo.build_success_rate_counts("a").unwrap(),
            [SuccessCount { success: true, count: 2 }]
        );
        assert_eq!(
            repo.build_success_rate_counts("b").unwrap(),
            [SuccessCount { success: false, count: 1 }]
        );
        assert!(repo.build_success_rate_counts("zzz").unwrap().is_empty());

        // The error-tree parse still counts toward the mean.
        assert_eq!(repo.average_parse_duration_ms("a").unwrap(), 10.0);
        assert_eq!(repo.average_parse_duration_ms("zzz").unwrap(), 0.0);
    }

    #[test]
    fn test_missing_logs_are_empty() {
        let dir = tempdir().unwrap();
        let repo = LogRepository::new(dir.path());

        assert!(repo.recent_builds(None, None).unwrap().is_empty());
        let (metrics, counts) = repo.parse_metrics(Some("nonexistent")).unwrap();
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.success_rate, 0.0);
        assert!(counts.is_empty());
        assert_eq!(repo.latest_commit("a").unwrap(), "unknown");
        assert!(repo.timeline(Some(5)).unwrap().is_empty());
    }

    #[test]
    fn test_decode_error_reports_line_number() {
        let (_dir, repo) = repo_with(&[BUILDS[0], "", "{not json", BUILDS[1]], &[]);

        match repo.recent_builds(None, None).unwrap_err() {
            Error::LogDecode { path, line, .. } => {
                assert_eq!(line, 3);
                assert!(path.ends_with("builds.jsonl"));
            }
            other => panic!("expected LogDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_latest_commit_skips_bad_lines() {
        let (_dir, repo) = repo_with(&[BUILDS[0], "garbage", BUILDS[1], BUILDS[2]], &[]);
        assert_eq!(repo.latest_commit("a").unwrap(), "c3");
        assert_eq!(repo.latest_commit("b").unwrap(), "c2");
        assert_eq!(repo.latest_commit("c").unwrap(), "unknown");
    }

    #[test]
    fn test_latest_commit_reads_partial_records() {
        let (_dir, repo) = repo_with(
            &[
                BUILDS[0],
                r#"{"grammar":"a","commit":"def"}"#,
                r#"{"grammar":"b"}"#,
                "[1, 2]",
            ],
            &[],
        );
        assert_eq!(repo.latest_commit("a").unwrap(), "def");
        assert_eq!(repo.latest_commit("b").unwrap(), "unknown");
    }

    #[test]
    fn test_null_grammar_version_does_not_fail_load() {
        let (_dir, repo) = repo_with(
            &[],
            &[r#"{"grammar":"json","duration_ms":1,"timestamp":"t","grammar_version":null}"#],
        );
        let parses = repo.recent_parses(None, None, false).unwrap();
        assert_eq!(parses.len(), 1);
        assert_eq!(parses[0].grammar_version, "unknown");
    }

    #[test]
    fn test_invalid_utf8_line_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join(LOGS_DIR);
        fs::create_dir_all(&logs).unwrap();
        let mut content = BUILDS[0].as_bytes().to_vec();
        content.extend_from_slice(b"\n\xff\xfe\n");
        fs::write(logs.join("builds.jsonl"), content).unwrap();

        let repo = LogRepository::new(dir.path());
        match repo.recent_builds(None, None).unwrap_err() {
            Error::LogDecode { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("UTF-8"));
            }
            other => panic!("expected LogDecode, got {other:?}"),
        }
    }

    #[test]
    fn test_grammar_stats() {
        let (_dir, repo) = repo_with(BUILDS, PARSES);
        let stats = repo.grammar_stats().unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].grammar, "a");
        assert_eq!(stats[0].builds, 2);
        assert_eq!(stats[0].parses, 2);
        assert_eq!(stats[0].build_success_rate, Some(100.0));
        assert_eq!(stats[0].parse_failure_rate, Some(50.0));
        assert_eq!(stats[1].build_success_rate, Some(0.0));
        assert_eq!(stats[1].parse_failure_rate, Some(100.0));
    }

    #[test]
    fn test_timeline_sorts_across_logs() {
        let (_dir, repo) = repo_with(
            &[
                r#"{"grammar":"late","status":"success","duration_ms":1,"timestamp":"2026-01-03T00:00:00Z"}"#,
                r#"{"grammar":"early","status":"success","duration_ms":1,"timestamp":"2025-12-30T00:00:00Z"}"#,
            ],
            &[r#"{"grammar":"middle","duration_ms":1,"timestamp":"2026-01-01T12:00:00"}"#],
        );

        let timeline = repo.timeline(None).unwrap();
        let order: Vec<&str> = timeline.iter().map(|e| e.grammar()).collect();
        assert_eq!(order, ["early", "middle", "late"]);

        let last = repo.timeline(Some(1)).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].kind(), EventKind::Build);
        assert_eq!(last[0].grammar(), "late");
    }

    #[test]
    fn test_timeline_reads_naive_timestamps_as_local_time() {
        let legacy = "2026-06-01T12:00:00";
        let instant = Local
            .from_local_datetime(&legacy.parse::<NaiveDateTime>().unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        let utc_line = |grammar: &str, at: DateTime<Utc>| {
            format!(
                r#"{{"grammar":"{grammar}","status":"success","duration_ms":1,"timestamp":"{}"}}"#,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        };
        let before = utc_line("before", instant - Duration::minutes(1));
        let after = utc_line("after", instant + Duration::minutes(1));
        let parse = format!(r#"{{"grammar":"legacy","duration_ms":1,"timestamp":"{legacy}"}}"#);

        let (_dir, repo) = repo_with(&[after.as_str(), before.as_str()], &[parse.as_str()]);
        let order: Vec<String> = repo
            .timeline(None)
            .unwrap()
            .iter()
            .map(|e| e.grammar().to_string())
            .collect();
        assert_eq!(order, ["before", "legacy", "after"]);
    }

    #[test]
    fn test_limit_validation() {
        assert_eq!(limit_from(3).unwrap(), 3);
        assert!(matches!(limit_from(-1), Err(Error::Validation(_))));
    }
}
