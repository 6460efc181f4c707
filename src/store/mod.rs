//! Metrics store interface — bucket listing/creation and point writes.
//!
//! The poller only ever talks to a [`MetricStore`] obtained from a
//! [`StoreConnector`]. Each call site opens its own connection and drops it
//! when done; nothing is pooled across writes.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

pub mod influx;
pub mod point;

pub use point::{FieldValue, MetricPoint};

/// Operations the poller needs from a time-series store.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Names of all buckets visible to `org`.
    async fn list_buckets(&self, org: &str) -> Result<Vec<String>>;

    /// Create `name` under `org` with no expiry.
    async fn create_bucket(&self, name: &str, org: &str) -> Result<()>;

    /// Write one point and wait for the store to acknowledge it.
    async fn write_point(&self, bucket: &str, org: &str, point: &MetricPoint) -> Result<()>;
}

/// Opens fresh store connections from the resolved configuration.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, config: &Config) -> Result<Box<dyn MetricStore>>;
}
