mod config;
mod error;

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use eventlog::{
    BuildOutcome, Compiler, Diagnostic, EventKind, LogEvent, LogRepository, LogWriter,
    ParseOutcome, Status, SummaryMetrics, Timestamp, TreeStats, excerpt,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use error::{Error, Result};

const DEFAULT_TIMELINE_LIMIT: &str = "20";

#[derive(Parser)]
#[command(name = "grammatic")]
#[command(about = "Record and query tree-sitter grammar build and parse logs", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository root containing the logs directory
    #[arg(long, global = true, default_value = ".")]
    repo_root: PathBuf,

    /// Config file (defaults to <repo-root>/grammatic.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a build or parse event
    Log {
        #[command(subcommand)]
        event: LogCommand,
    },
    /// Show recent build events
    Builds {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Show recent parse events
    Parses {
        #[command(flatten)]
        query: QueryArgs,
        /// Only failed parses and parses whose tree has errors
        #[arg(long)]
        failures_only: bool,
    },
    /// Show summary metrics and status counts as JSON
    Metrics {
        #[arg(value_enum)]
        kind: KindArg,
        /// Only events for this grammar
        #[arg(short, long)]
        grammar: Option<String>,
    },
    /// Build success/failure counts for a grammar (legacy output)
    BuildSuccessRate {
        grammar: String,
    },
    /// Mean parse time in milliseconds for a grammar (legacy output)
    AvgParseTime {
        grammar: String,
    },
    /// Print summary statistics across both logs
    Summary,
    /// Print per-grammar statistics
    GrammarStats,
    /// Print a combined chronological event timeline
    Timeline {
        /// Number of most recent events
        #[arg(short, long, default_value = DEFAULT_TIMELINE_LIMIT, allow_negative_numbers = true)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum LogCommand {
    /// Record a grammar build
    Build(BuildArgs),
    /// Record a source file parse
    Parse(ParseArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Build,
    Parse,
}

#[derive(Args)]
struct QueryArgs {
    /// Show only the last N matching events
    #[arg(short, long, allow_negative_numbers = true, conflicts_with = "all")]
    limit: Option<i64>,
    /// Show every matching event
    #[arg(long)]
    all: bool,
    /// Only events for this grammar (matched exactly)
    #[arg(short, long)]
    grammar: Option<String>,
    /// Print JSON lines instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct OutcomeArgs {
    #[arg(long)]
    grammar: String,
    #[arg(long, default_value = "success")]
    status: Status,
    #[arg(long)]
    duration_ms: u64,
    /// Stable machine-readable error code
    #[arg(long)]
    error_code: Option<String>,
    /// Captured tool output, capped to the configured excerpt limit
    #[arg(long)]
    stderr: Option<String>,
    /// Captured stdout, used when stderr is blank
    #[arg(long)]
    stdout: Option<String>,
    /// Diagnostic as level:message (repeatable)
    #[arg(long = "diagnostic")]
    diagnostics: Vec<Diagnostic>,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    outcome: OutcomeArgs,
    #[arg(long, default_value = "unknown")]
    commit: String,
    #[arg(long, default_value = "unknown")]
    repo_url: String,
    /// Shared library produced by the build
    #[arg(long)]
    so_path: PathBuf,
    #[arg(long, default_value = "gcc")]
    compiler: Compiler,
    #[arg(long, default_value = "unknown")]
    tree_sitter_version: String,
}

#[derive(Args)]
struct ParseArgs {
    #[command(flatten)]
    outcome: OutcomeArgs,
    /// Source file that was parsed
    #[arg(long)]
    source: PathBuf,
    /// tree-sitter JSON parse output to take node statistics from
    #[arg(long)]
    parse_result: Option<PathBuf>,
    /// Grammar commit; looked up from the build log when omitted
    #[arg(long)]
    grammar_version: Option<String>,
}

/// Log locations and settings resolved for one invocation.
struct Workspace {
    repo: LogRepository,
    writer: LogWriter,
    config: Config,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grammatic=warn,eventlog=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let ws = open_workspace(&cli.repo_root, cli.config.as_deref())?;

    match cli.command {
        Commands::Log { event } => match event {
            LogCommand::Build(args) => cmd_log_build(&ws, args),
            LogCommand::Parse(args) => cmd_log_parse(&ws, args),
        },
        Commands::Builds { query } => cmd_builds(&ws, &query),
        Commands::Parses {
            query,
            failures_only,
        } => cmd_parses(&ws, &query, failures_only),
        Commands::Metrics { kind, grammar } => cmd_metrics(&ws, kind, grammar.as_deref()),
        Commands::BuildSuccessRate { grammar } => cmd_build_success_rate(&ws, &grammar),
        Commands::AvgParseTime { grammar } => cmd_avg_parse_time(&ws, &grammar),
        Commands::Summary => cmd_summary(&ws),
        Commands::GrammarStats => cmd_grammar_stats(&ws),
        Commands::Timeline { limit } => cmd_timeline(&ws, limit),
    }
}

fn open_workspace(repo_root: &Path, config_path: Option<&Path>) -> Result<Workspace> {
    if !repo_root.is_dir() {
        return Err(Error::RepoRoot {
            path: repo_root.to_path_buf(),
        });
    }
    let config = Config::resolve(repo_root, config_path)?;
    let logs_dir = config.logs_dir(repo_root);
    tracing::debug!(logs_dir = %logs_dir.display(), "resolved logs directory");

    Ok(Workspace {
        repo: LogRepository::with_logs_dir(&logs_dir),
        writer: LogWriter::new(&logs_dir).with_excerpt_limit(config.logs.excerpt_limit),
        config,
    })
}

fn cmd_log_build(ws: &Workspace, args: BuildArgs) -> Result<()> {
    let OutcomeArgs {
        grammar,
        status,
        duration_ms,
        error_code,
        stderr,
        stdout,
        diagnostics,
    } = args.outcome;
    require_grammar(&grammar)?;

    let mut outcome = BuildOutcome::new(grammar, status, duration_ms);
    outcome.commit = args.commit;
    outcome.repo_url = args.repo_url;
    outcome.so_path = args.so_path;
    outcome.compiler = args.compiler;
    outcome.tree_sitter_version = args.tree_sitter_version;
    outcome.error_code = error_code;
    outcome.stderr_excerpt = output_excerpt(ws, stderr, stdout);
    outcome.diagnostics = diagnostics;

    let event = ws.writer.record_build(outcome)?;
    println!("{}", eventlog::encode_line(&event)?);
    Ok(())
}

fn cmd_log_parse(ws: &Workspace, args: ParseArgs) -> Result<()> {
    let OutcomeArgs {
        grammar,
        status,
        duration_ms,
        error_code,
        stderr,
        stdout,
        diagnostics,
    } = args.outcome;
    require_grammar(&grammar)?;

    let stats = args
        .parse_result
        .as_deref()
        .map(read_tree_stats)
        .transpose()?;
    let grammar_version = match args.grammar_version {
        Some(version) => version,
        None => ws.repo.latest_commit(&grammar)?,
    };

    let mut outcome = ParseOutcome::new(grammar, status, duration_ms);
    outcome.grammar_version = grammar_version;
    outcome.source_file = args.source;
    if let Some(stats) = stats {
        outcome.node_count = stats.node_count;
        outcome.has_errors = stats.has_errors;
        outcome.root_node_type = stats.root_node_type;
    }
    outcome.error_code = error_code;
    outcome.stderr_excerpt = output_excerpt(ws, stderr, stdout);
    outcome.diagnostics = diagnostics;

    let event = ws.writer.record_parse(outcome)?;
    println!("{}", eventlog::encode_line(&event)?);
    Ok(())
}

fn output_excerpt(ws: &Workspace, stderr: Option<String>, stdout: Option<String>) -> Option<String> {
    excerpt::from_output(
        stderr.as_deref().unwrap_or_default(),
        stdout.as_deref().unwrap_or_default(),
        ws.config.logs.excerpt_limit,
    )
}

fn read_tree_stats(path: &Path) -> Result<TreeStats> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ParseOutputRead {
        path: path.to_path_buf(),
        source,
    })?;
    let output: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| Error::ParseOutputJson {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(TreeStats::from_output(&output)?)
}

fn cmd_builds(ws: &Workspace, query: &QueryArgs) -> Result<()> {
    let (limit, grammar) = query_filters(ws, query)?;
    let events = ws.repo.recent_builds(limit, grammar)?;

    if query.json {
        return print_event_lines(&events);
    }
    if events.is_empty() {
        println!("No builds found.");
        return Ok(());
    }

    println!(
        "{:<19}  {:<20}  {:<8}  {:>10}  {:<8}  COMMIT",
        "TIME", "GRAMMAR", "STATUS", "DURATION", "COMPILER"
    );
    println!("{}", "-".repeat(90));
    for event in &events {
        println!(
            "{:<19}  {:<20}  {:<8}  {:>8}ms  {:<8}  {}",
            local_time(&event.timestamp),
            event.grammar,
            event.outcome(),
            event.duration_ms,
            event.compiler,
            short_commit(&event.commit)
        );
    }
    Ok(())
}

fn cmd_parses(ws: &Workspace, query: &QueryArgs, failures_only: bool) -> Result<()> {
    let (limit, grammar) = query_filters(ws, query)?;
    let events = ws.repo.recent_parses(limit, grammar, failures_only)?;

    if query.json {
        return print_event_lines(&events);
    }
    if events.is_empty() {
        println!("No parses found.");
        return Ok(());
    }

    println!(
        "{:<19}  {:<20}  {:<8}  {:>10}  {:>7}  SOURCE",
        "TIME", "GRAMMAR", "STATUS", "DURATION", "NODES"
    );
    println!("{}", "-".repeat(90));
    for event in &events {
        let status = if event.has_errors && event.status == Status::Success {
            "errors"
        } else {
            event.outcome().as_str()
        };
        println!(
            "{:<19}  {:<20}  {:<8}  {:>8}ms  {:>7}  {}",
            local_time(&event.timestamp),
            event.grammar,
            status,
            event.duration_ms,
            event.node_count,
            event.source_file.display()
        );
    }
    Ok(())
}

fn cmd_metrics(ws: &Workspace, kind: KindArg, grammar: Option<&str>) -> Result<()> {
    let grammar = grammar_filter(grammar)?;
    let (metrics, status_counts) = match kind {
        KindArg::Build => ws.repo.build_metrics(grammar)?,
        KindArg::Parse => ws.repo.parse_metrics(grammar)?,
    };
    let output = serde_json::json!({
        "metrics": metrics,
        "status_counts": status_counts,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_build_success_rate(ws: &Workspace, grammar: &str) -> Result<()> {
    require_grammar(grammar)?;
    let counts = ws.repo.build_success_rate_counts(grammar)?;
    print_json_lines(&counts)
}

fn cmd_avg_parse_time(ws: &Workspace, grammar: &str) -> Result<()> {
    require_grammar(grammar)?;
    let avg = ws.repo.average_parse_duration_ms(grammar)?;
    println!("{}", serde_json::json!({ "avg_ms": avg }));
    Ok(())
}

fn cmd_summary(ws: &Workspace) -> Result<()> {
    let (builds, _) = ws.repo.build_metrics(None)?;
    let (parses, _) = ws.repo.parse_metrics(None)?;

    println!("Total builds: {}", builds.total);
    println!("Total parses: {}", parses.total);
    if builds.total > 0 {
        println!("Build success rate: {:.1}%", builds.success_rate);
        print_latency("Build", &builds);
    }
    if parses.total > 0 {
        println!("Parse failure rate: {:.1}%", 100.0 - parses.success_rate);
        print_latency("Parse", &parses);
    }
    Ok(())
}

fn print_latency(label: &str, metrics: &SummaryMetrics) {
    let latency = metrics.latency_ms;
    println!(
        "{label} time p50/p95/p99: {:.1}ms / {:.1}ms / {:.1}ms",
        latency.p50, latency.p95, latency.p99
    );
}

fn cmd_grammar_stats(ws: &Workspace) -> Result<()> {
    let stats = ws.repo.grammar_stats()?;
    if stats.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    for entry in stats {
        println!("\n{}:", entry.grammar);
        println!("  Builds: {}", entry.builds);
        println!("  Parses: {}", entry.parses);
        if let Some(rate) = entry.build_success_rate {
            println!("  Build success rate: {rate:.1}%");
        }
        if let Some(rate) = entry.parse_failure_rate {
            println!("  Parse failure rate: {rate:.1}%");
        }
    }
    Ok(())
}

fn cmd_timeline(ws: &Workspace, limit: i64) -> Result<()> {
    let limit = eventlog::limit_from(limit)?;
    for event in ws.repo.timeline(Some(limit))? {
        let label = match event.kind() {
            EventKind::Build => "BUILD",
            EventKind::Parse => "PARSE",
        };
        println!(
            "{} | {label:6} | {} | {}",
            local_time(event.timestamp()),
            event.grammar(),
            event.outcome()
        );
    }
    Ok(())
}

fn query_filters<'a>(ws: &Workspace, query: &'a QueryArgs) -> Result<(Option<usize>, Option<&'a str>)> {
    let limit = match (query.all, query.limit) {
        (true, _) => None,
        (false, Some(limit)) => Some(eventlog::limit_from(limit)?),
        (false, None) => Some(ws.config.query.default_limit),
    };
    Ok((limit, grammar_filter(query.grammar.as_deref())?))
}

fn grammar_filter(grammar: Option<&str>) -> Result<Option<&str>> {
    if let Some(grammar) = grammar {
        require_grammar(grammar)?;
    }
    Ok(grammar)
}

fn require_grammar(grammar: &str) -> Result<()> {
    if grammar.is_empty() {
        return Err(Error::Validation("grammar name must not be empty".to_string()));
    }
    Ok(())
}

fn print_json_lines<T: serde::Serialize>(items: &[T]) -> Result<()> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

/// Events keep their `event_type` tag, as in the log files.
fn print_event_lines<E: LogEvent>(events: &[E]) -> Result<()> {
    for event in events {
        println!("{}", eventlog::encode_line(event)?);
    }
    Ok(())
}

fn local_time(timestamp: &Timestamp) -> String {
    match timestamp.to_utc() {
        Some(instant) => instant
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => timestamp.to_string(),
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}
