//! OTA update agent daemon.
//!
//! Usage:
//!   ota-client -c /etc/ota-client/ota-client.conf
//!   ota-client -c /etc/ota-client/ota-client.conf --stderr --once   # one cycle, log to stderr

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use reqwest::Client;

use ota_client::api;
use ota_client::config::{self, AgentConfig};
use ota_client::device;
use ota_client::error::Result;
use ota_client::sink::LimitedSink;
use ota_client::update::client::UpdateClient;
use ota_client::update::response::UpdateResponse;
use ota_client::update::UpdateError;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ota-client", about = "OTA update agent for managed devices")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/ota-client/ota-client.conf")]
    config: PathBuf,

    /// Log to stderr instead of syslog (useful for debugging).
    #[arg(long)]
    stderr: bool,

    /// Run a single check/fetch cycle and exit.
    #[arg(long)]
    once: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ota-client: config error: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config::validate_config(&cfg) {
        eprintln!("ota-client: config validation: {e}");
        process::exit(1);
    }

    let use_syslog = cfg.log_syslog && !cli.stderr;
    setup_logging(use_syslog).expect("failed to set up logging");

    if let Err(e) = write_pid_file(&cfg.pid_file) {
        warn!("cannot write PID file {}: {e}", cfg.pid_file.display());
    }

    let http = match api::new_api_client() {
        Ok(c) => c,
        Err(e) => {
            error!("cannot build HTTP client: {e}");
            process::exit(1);
        }
    };
    let updater = UpdateClient::with_min_artifact_size(cfg.min_artifact_size);

    info!(
        "ota-client starting, checking {} every {}s",
        cfg.server_url, cfg.update_interval
    );

    if cli.once {
        if let Err(e) = run_cycle(&http, &updater, &cfg).await {
            error!("update cycle failed: {e}");
            process::exit(1);
        }
        return;
    }

    loop {
        if let Err(e) = run_cycle(&http, &updater, &cfg).await {
            error!("update cycle failed: {e}");
        }
        tokio::time::sleep(Duration::from_secs(cfg.update_interval)).await;
    }
}

// ── Update cycle ──────────────────────────────────────────────────────────────

/// One cycle: load the device identity, ask for a deployment, and download
/// its artifact into the store when one is scheduled.
async fn run_cycle(http: &Client, updater: &UpdateClient, cfg: &AgentConfig) -> Result<()> {
    let current = device::load_current_update(cfg)?;
    debug!(
        "checking for a deployment as {} running {}",
        current.device_type, current.artifact_name
    );

    let response = match updater
        .get_scheduled_update(http, &cfg.server_url, &current)
        .await
    {
        Ok(Some(response)) => response,
        Ok(None) => {
            debug!("no deployment scheduled");
            return Ok(());
        }
        Err(UpdateError::NotAuthorized) => {
            warn!("not authorized by the deployment server; waiting for re-authorization");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "deployment {} schedules artifact {}",
        response.info.id, response.info.artifact.artifact_name
    );
    if response.update_control_map.is_some() {
        debug!("deployment carries an update control map");
    }

    download_artifact(http, updater, cfg, &response).await
}

/// Stream the artifact into `{store_dir}/{deployment id}.artifact` through
/// a sink budgeted to the declared size.
async fn download_artifact(
    http: &Client,
    updater: &UpdateClient,
    cfg: &AgentConfig,
    response: &UpdateResponse,
) -> Result<()> {
    let uri = &response.info.artifact.source.uri;
    let max_wait = Duration::from_secs(cfg.fetch_max_wait);
    let (mut stream, size) = updater.fetch_update(http.clone(), uri, max_wait).await?;

    tokio::fs::create_dir_all(&cfg.store_dir).await?;
    let path = cfg.store_dir.join(format!("{}.artifact", response.info.id));
    let file = tokio::fs::File::create(&path).await?;
    let mut sink = LimitedSink::new(file, size);

    info!("downloading {size} bytes to {}", path.display());
    while let Some(chunk) = stream.chunk().await? {
        sink.write(&chunk).await?;
    }
    sink.close().await?;

    info!(
        "artifact for deployment {} stored at {}",
        response.info.id,
        path.display()
    );
    Ok(())
}

// ── Process helpers ───────────────────────────────────────────────────────────

/// Write the current process PID to `path`.
fn write_pid_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", process::id()))
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process:  "ota-client".into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }
    Ok(())
}
