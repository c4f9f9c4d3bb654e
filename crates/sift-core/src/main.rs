//! Sift CLI
//!
//! Drives a session backed by a file store:
//! - `send`: append JSONL events to a stream and upload them
//! - `inspect`: print the persisted snapshot
//! - `config set` / `config show`: manage the persisted configuration
//!
//! Command payloads are JSON on stdout; logs go to stderr.
//!
//! Exit codes: 0 success, 10 configuration error, 11 queue or session
//! misuse, 20 store or I/O failure.

use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use sift_common::{Clock, Error, ErrorCategory, Event, Result, SystemClock};
use sift_config::{
    resolve_config, validate_session_config, Destination, PendingValue, SessionConfig,
};
use sift_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel};
use sift_core::session::keys;
use sift_core::{FileStore, KeyValueStore, QueueConfig, SessionOptions, Sift};
use sift_queue::QueueArchive;

/// Sift telemetry client
#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the session store file
    #[arg(long, global = true, env = "SIFT_STORE")]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append events from a JSONL file (or stdin) to a stream and upload them
    Send(SendArgs),

    /// Print the persisted session snapshot as JSON
    Inspect,

    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Stream to append to; created with a manual policy if unknown
    #[arg(long)]
    stream: String,

    /// User id for events that carry none
    #[arg(long)]
    user_id: Option<String>,

    #[command(flatten)]
    credentials: CredentialArgs,

    /// JSONL file of events (stdin if omitted)
    file: Option<PathBuf>,
}

/// Credentials for this run only; the persisted config is left untouched
/// and is used when these are absent.
#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long, env = "SIFT_ACCOUNT_ID")]
    account_id: Option<String>,

    #[arg(long, env = "SIFT_BEACON_KEY")]
    beacon_key: Option<String>,

    #[arg(long, env = "SIFT_SERVER_URL_FORMAT")]
    server_url_format: Option<String>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate and persist a session configuration
    Set(ConfigSetArgs),

    /// Print the configuration a session would start with
    Show,
}

#[derive(Args, Debug)]
struct ConfigSetArgs {
    #[arg(long, env = "SIFT_ACCOUNT_ID")]
    account_id: String,

    #[arg(long, env = "SIFT_BEACON_KEY")]
    beacon_key: String,

    /// URL template; the first `%s` is replaced by the account id
    #[arg(long, env = "SIFT_SERVER_URL_FORMAT")]
    server_url_format: Option<String>,

    #[arg(long)]
    disallow_location_collection: bool,

    /// Additional destination, repeatable
    #[arg(long = "destination", value_name = "ACCOUNT:KEY")]
    destinations: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let store_path = cli.global.store.clone().unwrap_or_else(default_store_path);
    let result = match cli.command {
        Commands::Send(args) => run_send(store_path, args),
        Commands::Inspect => run_inspect(store_path),
        Commands::Config(args) => match args.command {
            ConfigCommand::Set(args) => run_config_set(store_path, args),
            ConfigCommand::Show => run_config_show(store_path),
        },
    };

    match result.and_then(|payload| Ok(serde_json::to_string_pretty(&payload)?)) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sift: {} (code {})", e, e.code());
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &Error) -> u8 {
    match error.category() {
        ErrorCategory::Config => 10,
        ErrorCategory::Queue | ErrorCategory::Session => 11,
        ErrorCategory::Store | ErrorCategory::Io => 20,
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sift")
        .join("store.json")
}

// ============================================================================
// send
// ============================================================================

fn run_send(store_path: PathBuf, args: SendArgs) -> Result<Value> {
    let store = Arc::new(FileStore::open(store_path)?);
    let mut sift = Sift::new();
    // Credentials given here must not replace the stored config; it is put
    // back once the session has closed.
    let mut stored_config = None;

    match (&args.credentials.account_id, &args.credentials.beacon_key) {
        (Some(account_id), Some(beacon_key)) => {
            stored_config = Some(store.get(keys::CONFIG));
            let mut config = SessionConfig::new(account_id.as_str(), beacon_key.as_str());
            if let Some(format) = &args.credentials.server_url_format {
                config = config.with_server_url_format(format.as_str());
            }
            sift.set_config(config);
        }
        (None, None) => {}
        _ => {
            return Err(Error::Config(
                "--account-id and --beacon-key must be given together".to_string(),
            ))
        }
    }
    if let Some(user_id) = &args.user_id {
        sift.set_user_id(user_id.as_str());
    }

    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    sift.open(SessionOptions::new(Arc::clone(&store) as Arc<dyn KeyValueStore>))?;
    if !sift.session().is_some_and(|s| s.has_queue(&args.stream)) {
        sift.create_queue(&args.stream, QueueConfig::manual())?;
    }

    let fed = append_lines(&sift, &args.stream, reader);

    sift.upload(&args.stream)?;
    let destinations = sift
        .session()
        .and_then(|s| s.config())
        .filter(|c| validate_session_config(c).is_ok())
        .map(|c| c.destinations().len())
        .unwrap_or(0);
    if destinations == 0 {
        tracing::warn!(
            event = event_names::UPLOAD_ABANDONED,
            "no deliverable configuration; events are not uploaded"
        );
    }
    sift.close()?;
    match stored_config {
        Some(Some(json)) => store.put(keys::CONFIG, &json)?,
        Some(None) => store.remove(keys::CONFIG)?,
        None => {}
    }
    let (appended, skipped) = fed?;

    Ok(json!({
        "stream": args.stream,
        "appended": appended,
        "skipped": skipped,
        "destinations": destinations,
    }))
}

/// Append every JSONL line of `reader` to `stream`. Returns the appended
/// and skipped counts.
fn append_lines(sift: &Sift, stream: &str, reader: Box<dyn BufRead>) -> Result<(usize, usize)> {
    let clock = SystemClock;
    let mut appended = 0usize;
    let mut skipped = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_event(&line, clock.now_millis()) {
            Ok(event) => {
                sift.append(stream, event)?;
                appended += 1;
            }
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "skipping malformed event");
                skipped += 1;
            }
        }
    }
    Ok((appended, skipped))
}

/// Parse one JSONL event, stamping `time` when the line has none.
fn parse_event(line: &str, now_millis: u64) -> serde_json::Result<Event> {
    let mut value: Value = serde_json::from_str(line)?;
    if let Some(object) = value.as_object_mut() {
        object.entry("time").or_insert_with(|| json!(now_millis));
    }
    serde_json::from_value(value)
}

// ============================================================================
// inspect
// ============================================================================

fn run_inspect(store_path: PathBuf) -> Result<Value> {
    let store = FileStore::open(store_path)?;

    let config = store
        .get(keys::CONFIG)
        .and_then(|json| SessionConfig::from_json(&json).ok());

    let mut queues = serde_json::Map::new();
    for key in store.keys() {
        let Some(identifier) = key.strip_prefix(keys::QUEUE_PREFIX) else {
            continue;
        };
        let summary = match store.get(&key).map(|json| QueueArchive::parse(&json)) {
            Some(Ok(archive)) => json!({
                "pending": archive.queue.len(),
                "policy": archive.config,
                "last_upload_timestamp": archive.last_upload_timestamp,
                "last_upload_at": format_millis(archive.last_upload_timestamp),
            }),
            Some(Err(e)) => json!({ "error": e.to_string() }),
            None => continue,
        };
        queues.insert(identifier.to_string(), summary);
    }

    Ok(json!({
        "store": store.path().display().to_string(),
        "config": config,
        "user_id": store.get(keys::USER_ID),
        "installation_id": store.get(keys::INSTALLATION_ID),
        "queues": queues,
    }))
}

fn format_millis(millis: u64) -> Option<String> {
    if millis == 0 {
        return None;
    }
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|ts| ts.to_rfc3339())
}

// ============================================================================
// config
// ============================================================================

fn run_config_set(store_path: PathBuf, args: ConfigSetArgs) -> Result<Value> {
    let mut config = SessionConfig::new(args.account_id, args.beacon_key)
        .with_location_collection_disallowed(args.disallow_location_collection);
    if let Some(format) = args.server_url_format {
        config = config.with_server_url_format(format);
    }
    for spec in &args.destinations {
        config = config.with_destination(parse_destination(spec)?);
    }
    validate_session_config(&config).map_err(|e| Error::Config(e.to_string()))?;

    let store = FileStore::open(store_path)?;
    store.put(keys::CONFIG, &config.to_json()?)?;

    Ok(json!({ "saved": true, "config": config }))
}

fn parse_destination(spec: &str) -> Result<Destination> {
    spec.split_once(':')
        .map(|(account_id, beacon_key)| Destination::new(account_id, beacon_key))
        .ok_or_else(|| {
            Error::Config(format!(
                "invalid destination '{}', expected ACCOUNT:KEY",
                spec
            ))
        })
}

fn run_config_show(store_path: PathBuf) -> Result<Value> {
    let store = FileStore::open(store_path)?;
    let resolved = resolve_config(PendingValue::Absent, store.get(keys::CONFIG).as_deref());
    let valid = validate_session_config(&resolved.value).is_ok();

    Ok(json!({
        "source": resolved.source.to_string(),
        "valid": valid,
        "config": resolved.value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_stamps_missing_time() {
        let event = parse_event(r#"{"app_state":{"a":1}}"#, 42).unwrap();
        assert_eq!(event.time, 42);

        let event = parse_event(r#"{"time":7,"userId":"u"}"#, 42).unwrap();
        assert_eq!(event.time, 7);
        assert_eq!(event.user_id.as_deref(), Some("u"));

        assert!(parse_event("[1]", 42).is_err());
    }

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("acct:key").unwrap(),
            Destination::new("acct", "key")
        );
        assert!(parse_destination("acct").is_err());
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), None);
        assert_eq!(
            format_millis(1_000).as_deref(),
            Some("1970-01-01T00:00:01+00:00")
        );
    }
}
