//! Metric publisher — one stat in, one point out, one synchronous write.

use chrono::Utc;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::registry::RepositoryStat;
use crate::store::{MetricPoint, StoreConnector};

pub const MEASUREMENT_PREFIX: &str = "dockerhubstats.";

/// `dockerhubstats.<image>` with dots swapped for underscores, since the
/// store treats `.` as a namespace separator.
pub fn measurement_name(image: &str) -> String {
    format!("{}{}", MEASUREMENT_PREFIX, image.replace('.', "_"))
}

impl From<&RepositoryStat> for MetricPoint {
    fn from(stat: &RepositoryStat) -> Self {
        MetricPoint::new(measurement_name(&stat.image))
            .tag("image", stat.image.clone())
            .field("user", stat.user.clone())
            .field("name", stat.name.clone())
            .field("pull_count", stat.pull_count)
            .field("star_count", stat.star_count)
            .field_opt("last_updated", stat.last_updated.clone().map(Into::into))
            .field_opt("status", stat.status.clone())
    }
}

/// Write `stat` to the configured bucket over a connection opened for this
/// call alone. The connection is dropped before returning, on success or fault.
pub async fn publish(connector: &dyn StoreConnector, config: &Config, stat: &RepositoryStat) -> Result<()> {
    let point = MetricPoint::from(stat).at(Utc::now());
    debug!(image = %stat.image, point = ?point, "Publishing");

    let store = connector.connect(config)?;
    store.write_point(&config.bucket, &config.influx_org, &point).await
}
