//! gaflow command-line runner
//!
//! Runs one incremental Google Analytics extraction: reads a TOML job file,
//! merges the previous run's state, writes accepted rows as NDJSON and
//! persists the next state after a successful run.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gaflow_connectors::config::ConnectorConfig;
use gaflow_connectors::google_analytics::{
    GoogleAnalyticsConfig, GoogleAnalyticsSource, HttpReportingApi, OAuthTokenProvider,
    SystemClock, WatermarkState,
};
use gaflow_connectors::runtime::{run_extraction, RuntimeConfig};
use gaflow_connectors::serde::json::JsonLinesSink;

const CONNECTOR_TYPE: &str = "google-analytics";

/// gaflow - Incremental Google Analytics report extraction
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one extraction
    Run {
        /// Job configuration file (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// State file read before and written after a successful run
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// NDJSON output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch a single small page without the freshness filter
        #[arg(long)]
        preview: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout may carry NDJSON.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("gaflow={0},gaflow_connectors={0}", args.log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match args.command {
        Command::Run {
            config,
            state,
            output,
            preview,
        } => run(&config, state.as_deref(), output.as_deref(), preview).await,
    }
}

async fn run(
    config_path: &Path,
    state_path: Option<&Path>,
    output_path: Option<&Path>,
    preview: bool,
) -> Result<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(config = %config_path.display(), "loading job");

    let mut config = load_job_config(config_path)?;
    if let Some(path) = state_path {
        let previous = read_state(path)?;
        info!(
            state = %path.display(),
            start_date = ?previous.start_date,
            end_date = ?previous.end_date,
            last_record_time = ?previous.last_record_time,
            "merging previous state"
        );
        previous.apply_to(&mut config);
    }
    if preview {
        config.set("preview", "true");
    }

    let ga_config =
        GoogleAnalyticsConfig::from_config(&config).context("invalid job configuration")?;
    let tokens = OAuthTokenProvider::from_credentials(&ga_config.credentials)
        .await
        .context("failed to set up OAuth credentials")?;
    let api = HttpReportingApi::new(Arc::new(tokens));
    let mut source = GoogleAnalyticsSource::new(ga_config, Arc::new(api), Arc::new(SystemClock));

    let writer: Box<dyn Write + Send> = match output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut sink = JsonLinesSink::new(writer, Vec::new());

    // The config was already parsed above; an empty map keeps it.
    let outcome = run_extraction(
        &mut source,
        &mut sink,
        &ConnectorConfig::new(CONNECTOR_TYPE),
        &RuntimeConfig::default(),
    )
    .await
    .context("extraction failed")?;

    persist_state(state_path, preview, &outcome.state)?;
    info!(
        rows = sink.rows_written(),
        batches = outcome.metrics.batches_total,
        "done"
    );
    Ok(())
}

/// Reads a TOML job file into a flat [`ConnectorConfig`].
///
/// Scalars become their string form, arrays are joined with commas and
/// tables (filter clauses) are passed on as JSON.
fn load_job_config(path: &Path) -> Result<ConnectorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    parse_job_config(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse_job_config(text: &str) -> Result<ConnectorConfig> {
    let table: toml::Table = toml::from_str(text)?;
    let properties = table
        .iter()
        .map(|(key, value)| -> Result<(String, String)> {
            Ok((key.clone(), flatten_value(key, value)?))
        })
        .collect::<Result<HashMap<_, _>>>()?;
    Ok(ConnectorConfig::with_properties(CONNECTOR_TYPE, properties))
}

fn flatten_value(key: &str, value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(|item| flatten_value(key, item))
            .collect::<Result<Vec<_>>>()?
            .join(","),
        toml::Value::Array(_) | toml::Value::Table(_) => serde_json::to_string(value)
            .with_context(|| format!("cannot encode '{key}' as JSON"))?,
    })
}

fn is_scalar(value: &toml::Value) -> bool {
    !matches!(value, toml::Value::Array(_) | toml::Value::Table(_))
}

/// Reads the state of the previous run. A missing file is an empty state.
fn read_state(path: &Path) -> Result<WatermarkState> {
    if !path.exists() {
        return Ok(WatermarkState::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read state file {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(WatermarkState::default());
    }
    serde_json::from_str(&text).with_context(|| format!("invalid state file {}", path.display()))
}

/// Persists the next state unless this was a preview run. Returns `true`
/// if a file was written.
fn persist_state(path: Option<&Path>, preview: bool, state: &WatermarkState) -> Result<bool> {
    let Some(path) = path else {
        return Ok(false);
    };
    if preview {
        info!(state = %path.display(), "preview run, state left unchanged");
        return Ok(false);
    }
    write_state(path, state)?;
    info!(state = %path.display(), "state written");
    Ok(true)
}

/// Writes the state next to `path` and renames it into place.
fn write_state(path: &Path, state: &WatermarkState) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("state path {} has no file name", path.display());
    };
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&tmp, json + "\n")
        .with_context(|| format!("cannot write state file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("cannot replace state file {}", path.display()))?;
    Ok(())
}
