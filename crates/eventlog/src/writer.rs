//! Append-only JSONL writer.
//!
//! Each event is encoded as one JSON object and appended to its kind's log
//! with a single write on a file opened in append mode. The OS keeps such
//! small appends from interleaving, so concurrent processes writing to the
//! same log never corrupt each other's lines. Their relative order is not
//! coordinated.

use crate::event::encode_line;
use crate::excerpt::{self, DEFAULT_EXCERPT_LIMIT};
use crate::{
    BuildEvent, Compiler, Diagnostic, Error, EventKind, LogEvent, ParseEvent, Result, Status,
    Timestamp,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Result of a build attempt, as reported by the workflow that ran it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub grammar: String,
    pub status: Status,
    pub duration_ms: u64,
    pub commit: String,
    pub repo_url: String,
    pub so_path: PathBuf,
    pub compiler: Compiler,
    pub tree_sitter_version: String,
    pub error_code: Option<String>,
    /// Raw tool output; capped to the writer's excerpt limit when recorded.
    pub stderr_excerpt: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutcome {
    pub fn new(grammar: impl Into<String>, status: Status, duration_ms: u64) -> Self {
        Self {
            grammar: grammar.into(),
            status,
            duration_ms,
            commit: "unknown".to_string(),
            repo_url: "unknown".to_string(),
            so_path: PathBuf::new(),
            compiler: Compiler::default(),
            tree_sitter_version: "unknown".to_string(),
            error_code: None,
            stderr_excerpt: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Result of a parse attempt, as reported by the workflow that ran it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub grammar: String,
    pub status: Status,
    pub duration_ms: u64,
    pub grammar_version: String,
    pub source_file: PathBuf,
    pub node_count: u64,
    pub has_errors: bool,
    pub root_node_type: String,
    pub error_code: Option<String>,
    /// Raw tool output; capped to the writer's excerpt limit when recorded.
    pub stderr_excerpt: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    pub fn new(grammar: impl Into<String>, status: Status, duration_ms: u64) -> Self {
        Self {
            grammar: grammar.into(),
            status,
            duration_ms,
            grammar_version: "unknown".to_string(),
            source_file: PathBuf::new(),
            node_count: 0,
            has_errors: false,
            root_node_type: "unknown".to_string(),
            error_code: None,
            stderr_excerpt: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Records build and parse events under a logs directory.
#[derive(Debug, Clone)]
pub struct LogWriter {
    logs_dir: PathBuf,
    excerpt_limit: usize,
}

impl LogWriter {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            excerpt_limit: DEFAULT_EXCERPT_LIMIT,
        }
    }

    /// Sets the maximum length of persisted stderr excerpts.
    pub fn with_excerpt_limit(mut self, limit: usize) -> Self {
        self.excerpt_limit = limit;
        self
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn path(&self, kind: EventKind) -> PathBuf {
        self.logs_dir.join(kind.file_name())
    }

    /// Stamps and appends a build event, returning what was written.
    pub fn record_build(&self, outcome: BuildOutcome) -> Result<BuildEvent> {
        require_grammar(&outcome.grammar)?;
        let event = BuildEvent {
            timestamp: Timestamp::now(),
            grammar: outcome.grammar,
            status: outcome.status,
            duration_ms: outcome.duration_ms,
            commit: outcome.commit,
            repo_url: outcome.repo_url,
            so_path: outcome.so_path,
            compiler: outcome.compiler,
            tree_sitter_version: outcome.tree_sitter_version,
            error_code: outcome.error_code,
            stderr_excerpt: self.cap(outcome.stderr_excerpt),
            diagnostics: outcome.diagnostics,
        };
        self.append(&event)?;
        Ok(event)
    }

    /// Stamps and appends a parse event, returning what was written.
    pub fn record_parse(&self, outcome: ParseOutcome) -> Result<ParseEvent> {
        require_grammar(&outcome.grammar)?;
        let event = ParseEvent {
            timestamp: Timestamp::now(),
            grammar: outcome.grammar,
            status: outcome.status,
            duration_ms: outcome.duration_ms,
            grammar_version: outcome.grammar_version,
            source_file: outcome.source_file,
            node_count: outcome.node_count,
            has_errors: outcome.has_errors,
            root_node_type: outcome.root_node_type,
            error_code: outcome.error_code,
            stderr_excerpt: self.cap(outcome.stderr_excerpt),
            diagnostics: outcome.diagnostics,
        };
        self.append(&event)?;
        Ok(event)
    }

    /// Appends an already-built event to its kind's log.
    pub fn append<E: LogEvent>(&self, event: &E) -> Result<()> {
        let path = self.path(E::KIND);
        append_line(&path, &encode_line(event)?)?;
        tracing::debug!(path = %path.display(), kind = %E::KIND, grammar = event.grammar(), "appended event");
        Ok(())
    }

    fn cap(&self, excerpt: Option<String>) -> Option<String> {
        excerpt.and_then(|text| excerpt::bounded(&text, self.excerpt_limit))
    }
}

/// Appends `line` plus a newline to `path` in one write, creating the file
/// and its parent directory if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let write_err = |source| Error::LogWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    file.write_all(record.as_bytes()).map_err(write_err)
}

fn require_grammar(grammar: &str) -> Result<()> {
    if grammar.is_empty() {
        return Err(Error::Validation("grammar name must not be empty".into()));
    }
    Ok(())
}
