//! hubstats daemon — Docker Hub statistics → InfluxDB v2, forever.
//!
//! No flags. Configuration comes from `config.json` beside the binary and
//! the environment. Any fault exits non-zero; restarts are the
//! supervisor's job (systemd, Docker restart policy).

use anyhow::{Context, Result};
use tracing::{error, info};

use hubstats::config::Config;
use hubstats::poller;
use hubstats::registry::DockerHubClient;
use hubstats::store::influx::InfluxConnector;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    info!("📦 hubstats v{}", env!("CARGO_PKG_VERSION"));

    let result = run().await;
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}

async fn run() -> Result<()> {
    // ── Config ──────────────────────────────────────────────────────
    let config = Config::resolve().context("Failed to resolve configuration")?;

    // ── Bucket ──────────────────────────────────────────────────────
    let connector = InfluxConnector;
    poller::startup(&config, &connector)
        .await
        .with_context(|| format!("Failed to provision bucket '{}'", config.bucket))?;

    // ── Poll loop ───────────────────────────────────────────────────
    let registry = DockerHubClient::new(&config.registry_url)
        .context("Failed to build registry client")?;

    poller::run(&config, &registry, &connector)
        .await
        .context("Poll loop aborted")?;

    Ok(())
}

/// Structured logs to stdout; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hubstats=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stdout);

    if std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}
