//! Poll loop — STARTUP once, then RUNNING ↔ WAITING until the process dies.
//!
//! Users are always processed before images; each list in configured
//! order, each user's repositories in the order the registry returned
//! them. Any fault ends the loop and is handed back to `main`, which exits
//! non-zero and leaves the restart to the process supervisor.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::provision::{ensure_bucket, BucketStatus};
use crate::publisher::publish;
use crate::registry::RegistrySource;
use crate::store::StoreConnector;

const RETRY_INITIAL: Duration = Duration::from_secs(1);
const RETRY_MAX: Duration = Duration::from_secs(60);

/// Counts from one RUNNING pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub users: usize,
    pub images: usize,
    pub points: usize,
}

/// STARTUP: announce what will be polled and make sure the bucket exists.
pub async fn startup(config: &Config, connector: &dyn StoreConnector) -> Result<BucketStatus> {
    info!("Querying {} dockerhub users: {:?}", config.users.len(), config.users);
    info!("Querying {} dockerhub images: {:?}", config.images.len(), config.images);
    info!("Logging to InfluxDB server {}", config.influx_url);

    let store = connector.connect(config)?;
    ensure_bucket(store.as_ref(), &config.bucket, &config.influx_org).await
}

/// RUNNING: one full pass over users, then images.
pub async fn run_cycle(
    config: &Config,
    registry: &dyn RegistrySource,
    connector: &dyn StoreConnector,
    retries: u32,
) -> Result<CycleSummary> {
    let mut summary = CycleSummary::default();

    for user in &config.users {
        let stats = with_retry(retries, user, || registry.user_repositories(user)).await?;
        info!(user = %user, repositories = stats.len(), "Fetched user repositories");
        for stat in &stats {
            with_retry(retries, &stat.image, || publish(connector, config, stat)).await?;
            summary.points += 1;
        }
        summary.users += 1;
    }

    for image in &config.images {
        let stat = with_retry(retries, image, || registry.image(image)).await?;
        info!(image = %image, pull_count = stat.pull_count, star_count = stat.star_count, "Fetched image");
        with_retry(retries, image, || publish(connector, config, &stat)).await?;
        summary.points += 1;
        summary.images += 1;
    }

    Ok(summary)
}

/// Cycle forever. Only returns on a fault.
pub async fn run(config: &Config, registry: &dyn RegistrySource, connector: &dyn StoreConnector) -> Result<()> {
    let retries = config.retry_attempts()?;
    if retries > 0 {
        info!(retries, "Per-entity retry enabled");
    }

    loop {
        let started = Instant::now();
        let summary = run_cycle(config, registry, connector, retries).await?;
        info!(
            users = summary.users,
            images = summary.images,
            points = summary.points,
            duration_ms = started.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );

        // WAITING: parsed on every pass, never cached.
        let delay = config.delay()?;
        info!("Waiting {}", config.delay);
        time::sleep(delay).await;
    }
}

/// Run `op`, retrying up to `attempts` more times with exponential backoff.
/// With `attempts == 0` the first fault is returned unchanged.
async fn with_retry<T, F, Fut>(attempts: u32, entity: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(RETRY_INITIAL, RETRY_MAX);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                attempt += 1;
                let wait = backoff.next_delay();
                warn!(
                    entity = %entity,
                    attempt,
                    of = attempts,
                    kind = e.kind(),
                    wait_secs = wait.as_secs(),
                    "Step failed, retrying: {}", e
                );
                time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Doubling delay, capped.
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max: max.max(initial),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let d = self.current;
        self.current = (self.current * 2).min(self.max);
        d
    }
}
