//! Bucket provisioning — make sure the target bucket exists before polling.

use tracing::{debug, info};

use crate::error::Result;
use crate::store::MetricStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// Already present; nothing was done.
    Found,
    /// Missing and created with infinite retention.
    Created,
}

/// Linear scan of the org's buckets by name; create on miss.
///
/// Not atomic: a concurrent creator between list and create makes the
/// create call fail, and that failure propagates.
pub async fn ensure_bucket(store: &dyn MetricStore, bucket: &str, org: &str) -> Result<BucketStatus> {
    let names = store.list_buckets(org).await?;
    debug!(org = %org, count = names.len(), "Listed buckets");

    if names.iter().any(|n| n == bucket) {
        info!("Found existing bucket {}.", bucket);
        return Ok(BucketStatus::Found);
    }

    info!("Bucket {} not found. Will attempt to create it.", bucket);
    store.create_bucket(bucket, org).await?;
    info!(bucket = %bucket, org = %org, "Bucket created (infinite retention)");
    Ok(BucketStatus::Created)
}
