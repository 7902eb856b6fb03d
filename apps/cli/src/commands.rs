//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docpipe_core::{BatchProgress, BatchSummary, Pipeline, SourceUnit, TemplateRegistry, persist};
use docpipe_filters::build_stack;
use docpipe_shared::{
    AppConfig, FetchConfig, PipelineConfig, expand_home, init_config, load_config,
    load_config_from,
};
use docpipe_source::HttpSourceProvider;
use docpipe_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docpipe: versioned documentation resources behind `docs://` URIs.
#[derive(Parser)]
#[command(
    name = "docpipe",
    version,
    about = "Ingest documentation sources into a versioned resource index and resolve docs:// URIs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.docpipe/docpipe.toml).
    #[arg(long, global = true, env = "DOCPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Index database (overrides `defaults.database_path`).
    #[arg(long, global = true, env = "DOCPIPE_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every configured source, filter it, and index the results.
    Ingest {
        /// Maximum number of sources processed at once.
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Resolve a resource URI and print the matching entry.
    Resolve {
        /// Resource URI, e.g. docs://api/v1.2/endpoint.
        uri: String,

        /// Print entry metadata as JSON before the content.
        #[arg(long)]
        meta: bool,
    },

    /// List indexed entries.
    List,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docpipe=info",
        1 => "docpipe=debug",
        _ => "docpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `resolve` output can be piped.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let db_path = match cli.db {
        Some(path) => path,
        None => expand_home(&config.defaults.database_path)?,
    };

    match cli.command {
        Command::Ingest { concurrency } => cmd_ingest(&config, &db_path, concurrency).await,
        Command::Resolve { uri, meta } => cmd_resolve(&config, &db_path, &uri, meta).await,
        Command::List => cmd_list(&db_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(config: &AppConfig, db_path: &Path, concurrency: Option<usize>) -> Result<()> {
    let templates = TemplateRegistry::from_config(&config.templates)?;
    if templates.is_empty() {
        return Err(eyre!("no [[templates]] configured; nothing can be indexed"));
    }
    let units: Vec<SourceUnit> = config.sources.iter().map(SourceUnit::from).collect();
    if units.is_empty() {
        println!("No [[sources]] configured.");
        return Ok(());
    }

    let filters = build_stack(&config.filters.stages, config.filters.base_url.as_deref())?;
    let provider = HttpSourceProvider::new(&FetchConfig::from(config))?;
    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(n) = concurrency {
        pipeline_config.concurrency = n.max(1);
    }

    let storage = Arc::new(Storage::open(db_path).await?);
    let index = Arc::new(persist::restore(&storage).await?);
    info!(
        db = %db_path.display(),
        existing = index.len(),
        sources = units.len(),
        "starting ingest"
    );

    let stop_mirror = CancellationToken::new();
    let mirror = tokio::spawn(persist::mirror_events(
        Arc::clone(&index),
        Arc::clone(&storage),
        stop_mirror.clone(),
    ));

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight sources");
            on_ctrl_c.cancel();
        }
    });

    let pipeline = Pipeline::new(provider, filters, templates, Arc::clone(&index), pipeline_config);
    let reporter = CliProgress::new();
    let result = pipeline.run(units, cancel, &reporter).await;

    // Stop the mirror even if the batch aborted.
    stop_mirror.cancel();
    let mirrored = mirror.await??;
    let summary = result?;
    info!(mirrored, "index changes persisted");

    println!();
    println!("  Ingest finished.");
    println!("  Indexed:  {}", summary.succeeded);
    println!("  Failed:   {}", summary.failed);
    if summary.skipped > 0 {
        println!("  Skipped:  {}", summary.skipped);
    }
    println!("  Entries:  {}", index.len());
    println!("  Database: {}", db_path.display());
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    if !summary.failures.is_empty() {
        println!();
        println!("  Failures:");
        for failure in &summary.failures {
            println!(
                "    [{}] {} ({}): {}",
                failure.stage, failure.uri, failure.source_ref, failure.error
            );
        }
    }
    println!();

    Ok(())
}

async fn cmd_resolve(config: &AppConfig, db_path: &Path, uri: &str, meta: bool) -> Result<()> {
    let templates = TemplateRegistry::from_config(&config.templates)?;
    let storage = Storage::open_readonly(db_path).await?;
    let index = persist::restore(&storage).await?;

    let (template, (path, _params)) = match templates.resolve_in(uri, &index) {
        Ok(found) => found,
        Err(e) if e.is_not_found() => return Err(eyre!("not found: {e}")),
        Err(e) if e.is_bad_parameter() => return Err(eyre!("bad parameter: {e}")),
        Err(e) => return Err(e.into()),
    };
    let entry = index
        .find_by_path(&path)
        .ok_or_else(|| eyre!("not found: {path} resolved but is not indexed"))?;
    info!(uri, template = template.template(), path = %entry.path, "resolved");

    if meta {
        println!("{}", serde_json::to_string_pretty(&entry.metadata)?);
        println!();
    }
    print!("{}", entry.content);

    Ok(())
}

async fn cmd_list(db_path: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let entries = storage.list_entries().await?;

    if entries.is_empty() {
        println!("No entries indexed.");
        return Ok(());
    }

    for entry in &entries {
        println!("{}  {}", entry.id, entry.path);
    }
    println!();
    println!("{} entries", entries.len());

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Batch progress bar using indicatif.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message("fetching");
    }

    fn unit_finished(&self, uri: &str, ok: bool, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
        if ok {
            self.bar.set_message(uri.to_string());
        } else {
            self.bar.set_message(format!("failed: {uri}"));
        }
    }

    fn done(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docpipe",
            "resolve",
            "docs://api/v1/endpoint",
            "--db",
            "/tmp/x.db",
            "-vv",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db.as_deref(), Some(Path::new("/tmp/x.db")));
        match cli.command {
            Command::Resolve { uri, meta } => {
                assert_eq!(uri, "docs://api/v1/endpoint");
                assert!(!meta);
            }
            _ => panic!("expected resolve"),
        }
    }
}
