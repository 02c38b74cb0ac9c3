//! Event types for the build and parse logs.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which log an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Build,
    Parse,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Build => "build",
            EventKind::Parse => "parse",
        }
    }

    /// File name of this kind's log inside the logs directory.
    pub fn file_name(self) -> &'static str {
        match self {
            EventKind::Build => "builds.jsonl",
            EventKind::Parse => "parses.jsonl",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary outcome of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Status::Success),
            "failure" => Ok(Status::Failure),
            other => Err(format!("unknown status '{other}' (expected success or failure)")),
        }
    }
}

/// Compiler used to build a grammar's shared library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compiler {
    #[default]
    #[serde(rename = "gcc")]
    Gcc,
    /// Selected when the grammar ships a C++ scanner.
    #[serde(rename = "g++")]
    Gxx,
}

impl Compiler {
    pub fn as_str(self) -> &'static str {
        match self {
            Compiler::Gcc => "gcc",
            Compiler::Gxx => "g++",
        }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gcc" => Ok(Compiler::Gcc),
            "g++" => Ok(Compiler::Gxx),
            other => Err(format!("unknown compiler '{other}' (expected gcc or g++)")),
        }
    }
}

/// Severity of a diagnostic produced during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// A message attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }
}

/// Parses `level:message`, e.g. `error:scanner.c not found`.
impl FromStr for Diagnostic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, message) = s
            .split_once(':')
            .ok_or_else(|| format!("diagnostic '{s}' must look like level:message"))?;
        let level = match level.trim() {
            "info" => DiagnosticLevel::Info,
            "warning" => DiagnosticLevel::Warning,
            "error" => DiagnosticLevel::Error,
            other => return Err(format!("unknown diagnostic level '{other}'")),
        };
        Ok(Self::new(level, message.trim()))
    }
}

/// When an event was recorded, kept in its persisted ISO-8601 text form.
///
/// Older records carry naive local timestamps, newer ones RFC 3339 with an
/// offset; both are preserved verbatim and only parsed when ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant in UTC, if the text parses.
    ///
    /// Text without an offset is a local wall-clock time.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = self.0.parse::<NaiveDateTime>().ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl From<&str> for Timestamp {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded grammar build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub timestamp: Timestamp,
    pub grammar: String,
    pub status: Status,
    pub duration_ms: u64,
    /// Resolved revision of the grammar sources.
    #[serde(default = "unknown", deserialize_with = "null_as_unknown")]
    pub commit: String,
    #[serde(default = "unknown", deserialize_with = "null_as_unknown")]
    pub repo_url: String,
    #[serde(default, serialize_with = "path_text")]
    pub so_path: PathBuf,
    #[serde(default)]
    pub compiler: Compiler,
    #[serde(default = "unknown", deserialize_with = "null_as_unknown")]
    pub tree_sitter_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// One recorded parse of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseEvent {
    pub timestamp: Timestamp,
    pub grammar: String,
    #[serde(default = "success")]
    pub status: Status,
    pub duration_ms: u64,
    /// Commit of the grammar build used, looked up from the build log.
    #[serde(default = "unknown", deserialize_with = "null_as_unknown")]
    pub grammar_version: String,
    #[serde(default, serialize_with = "path_text")]
    pub source_file: PathBuf,
    #[serde(default)]
    pub node_count: u64,
    /// The tree contains at least one `ERROR` node.
    #[serde(default)]
    pub has_errors: bool,
    #[serde(default = "unknown", deserialize_with = "null_as_unknown")]
    pub root_node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Behaviour shared by every record kind stored in a JSONL log.
pub trait LogEvent: Serialize + DeserializeOwned {
    const KIND: EventKind;

    fn grammar(&self) -> &str;
    fn status(&self) -> Status;
    fn duration_ms(&self) -> u64;
    fn timestamp(&self) -> &Timestamp;

    /// Status used for success/failure reporting.
    ///
    /// Defaults to the raw status; parse events override it.
    fn outcome(&self) -> Status {
        self.status()
    }

    fn is_failure(&self) -> bool {
        self.outcome() == Status::Failure
    }

    /// Checks invariants serde cannot express.
    fn validate(&self) -> Result<(), String> {
        if self.grammar().is_empty() {
            return Err("grammar must not be empty".to_string());
        }
        Ok(())
    }
}

impl LogEvent for BuildEvent {
    const KIND: EventKind = EventKind::Build;

    fn grammar(&self) -> &str {
        &self.grammar
    }

    fn status(&self) -> Status {
        self.status
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }
}

impl LogEvent for ParseEvent {
    const KIND: EventKind = EventKind::Parse;

    fn grammar(&self) -> &str {
        &self.grammar
    }

    fn status(&self) -> Status {
        self.status
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// A parse that ran but produced an erroneous tree is a failure.
    fn outcome(&self) -> Status {
        if self.has_errors {
            Status::Failure
        } else {
            self.status
        }
    }
}

/// Either kind of event, for views spanning both logs.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Build(BuildEvent),
    Parse(ParseEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Build(_) => EventKind::Build,
            Event::Parse(_) => EventKind::Parse,
        }
    }

    pub fn grammar(&self) -> &str {
        match self {
            Event::Build(e) => &e.grammar,
            Event::Parse(e) => &e.grammar,
        }
    }

    pub fn timestamp(&self) -> &Timestamp {
        match self {
            Event::Build(e) => &e.timestamp,
            Event::Parse(e) => &e.timestamp,
        }
    }

    pub fn outcome(&self) -> Status {
        match self {
            Event::Build(e) => e.outcome(),
            Event::Parse(e) => e.outcome(),
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, E> {
    event_type: EventKind,
    #[serde(flatten)]
    event: &'a E,
}

/// Encodes an event as a single JSON line (no trailing newline).
pub fn encode_line<E: LogEvent>(event: &E) -> serde_json::Result<String> {
    serde_json::to_string(&Tagged {
        event_type: E::KIND,
        event,
    })
}

/// Decodes one log line as an `E`.
///
/// Unknown fields are ignored. A missing `event_type` is taken to be
/// `E::KIND`; a present one must match it.
pub(crate) fn decode_line<E: LogEvent>(line: &str) -> Result<E, String> {
    let mut value: serde_json::Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let object = value.as_object_mut().ok_or("expected a JSON object")?;

    if let Some(tag) = object.remove("event_type") {
        let kind: EventKind =
            serde_json::from_value(tag).map_err(|e| format!("event_type: {e}"))?;
        if kind != E::KIND {
            return Err(format!(
                "expected event_type \"{}\", found \"{kind}\"",
                E::KIND
            ));
        }
    }

    let event: E = serde_json::from_value(value).map_err(|e| e.to_string())?;
    event.validate()?;
    Ok(event)
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Older writers recorded unresolved text fields as `null`.
fn null_as_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown))
}

fn success() -> Status {
    Status::Success
}

/// Paths are persisted as text; non-UTF-8 components are replaced lossily.
fn path_text<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}
