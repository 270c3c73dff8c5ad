//! configcheck CLI entrypoint.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use logship_configcheck::cli::{Cli, Commands, OutputFormatter};
use logship_configcheck::cluster::KubeClient;
use logship_configcheck::config::{
    CheckConfig, ConfigParser, ConfigValidator, Fingerprint, find_config_file,
};
use logship_configcheck::error::Result;
use logship_configcheck::reconciler::{Reconciler, WaitOptions};
use logship_configcheck::render::Renderer;
use logship_configcheck::state::{LocalResultStore, ResultStore};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so stdout stays
/// parseable.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Render { fingerprint } => cmd_render(config_path, fingerprint, &formatter),
        Commands::Fingerprint => cmd_fingerprint(config_path, &formatter),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Check {
            wait,
            interval,
            timeout,
            no_cleanup,
        } => {
            let options = wait.then(|| WaitOptions {
                interval: Duration::from_secs(interval.max(1)),
                timeout: Duration::from_secs(timeout),
            });
            cmd_check(config_path, options, !no_cleanup, &formatter).await
        }
        Commands::Cleanup { keep } => cmd_cleanup(config_path, keep, &formatter).await,
        Commands::Status => cmd_status(config_path, &formatter).await,
    }
}

/// Render the agent configuration.
fn cmd_render(
    config_path: Option<&PathBuf>,
    show_fingerprint: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let rendered = Renderer::new().render(&config.agent)?;
    emit(&formatter.format_rendered(&rendered, show_fingerprint))?;
    Ok(ExitCode::SUCCESS)
}

/// Print the fingerprint.
fn cmd_fingerprint(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let rendered = Renderer::new().render(&config.agent)?;
    emit(&formatter.format_fingerprint(&rendered))?;
    Ok(ExitCode::SUCCESS)
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let result = ConfigValidator::new().inspect(&config);

    emit(&formatter.format_validation(&result, show_warnings))?;

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run validation passes.
async fn cmd_check(
    config_path: Option<&PathBuf>,
    wait: Option<WaitOptions>,
    cleanup: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let cluster = create_cluster_client(&config)?;
    let store = create_result_store(&config)?;
    let reconciler = Reconciler::new(&config, &store, &cluster).with_cleanup(cleanup);

    let result = match wait {
        Some(options) => reconciler.wait_for_verdict(options).await?,
        None => reconciler.reconcile().await?,
    };

    emit(&formatter.format_reconciliation(&result))?;

    if result.is_ready() && !result.record.valid {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Remove validation artifacts.
async fn cmd_cleanup(
    config_path: Option<&PathBuf>,
    keep: Vec<Fingerprint>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let cluster = create_cluster_client(&config)?;
    let store = create_result_store(&config)?;
    let reconciler = Reconciler::new(&config, &store, &cluster);

    let keep: BTreeSet<Fingerprint> = keep.into_iter().collect();
    info!("Removing artifacts of every fingerprint except {} kept", keep.len());

    let report = reconciler.cleanup(&keep).await?;
    emit(&formatter.format_cleanup(&report))?;

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Show status.
async fn cmd_status(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let cluster = create_cluster_client(&config)?;
    let store = create_result_store(&config)?;

    let status = Reconciler::new(&config, &store, &cluster).status().await?;
    emit(&formatter.format_status(&status))?;
    Ok(ExitCode::SUCCESS)
}

// Helper functions

fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads the configuration with `.env` and environment overrides applied.
fn load_config(config_path: Option<&PathBuf>) -> Result<CheckConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser =
        ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    parser.load_with_env(&config_file)
}

fn create_cluster_client(config: &CheckConfig) -> Result<KubeClient> {
    let token = ConfigParser::cluster_token(config)?;
    Ok(KubeClient::from_settings(&config.checker.cluster, &token)?)
}

fn create_result_store(config: &CheckConfig) -> Result<LocalResultStore> {
    let store = match config.checker.results_path.as_deref() {
        Some(path) if !path.is_empty() => LocalResultStore::with_base_dir(path),
        _ => LocalResultStore::new()?,
    };
    debug!("Using {} result store", store.backend_type());
    Ok(store)
}
