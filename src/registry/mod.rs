//! Registry statistics — what the poller fetches and how it is decoded.
//!
//! Any registry implementing [`RegistrySource`] can feed the loop. The
//! decode step lives here so that missing or mistyped fields fail at a
//! single boundary instead of leaking an undefined value into a point.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::{HubStatsError, Result};
use crate::store::FieldValue;

pub mod dockerhub;

pub use dockerhub::DockerHubClient;

/// One repository's statistics at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryStat {
    pub user: String,
    pub name: String,
    /// Fully-qualified `user/name`.
    pub image: String,
    pub pull_count: i64,
    pub star_count: i64,
    /// Passed through as sent; `None` when the registry reports null.
    pub last_updated: Option<String>,
    pub status: Option<FieldValue>,
}

#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Every repository listed under `user` (first page only).
    async fn user_repositories(&self, user: &str) -> Result<Vec<RepositoryStat>>;

    /// The single repository `image` (`namespace/name`).
    async fn image(&self, image: &str) -> Result<RepositoryStat>;
}

// ── Wire schema ─────────────────────────────────────────────────────

/// `GET /v2/repositories/{namespace}`
#[derive(Debug, Deserialize)]
pub(crate) struct NamespaceListing {
    pub count: u64,
    pub results: Vec<NamespaceRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamespaceRecord {
    pub namespace: String,
    pub name: String,
    #[serde(deserialize_with = "count")]
    pub pull_count: i64,
    #[serde(deserialize_with = "count")]
    pub star_count: i64,
    #[serde(deserialize_with = "nullable")]
    pub last_updated: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub status: Option<FieldValue>,
}

/// `GET /v2/repositories/{namespace}/{name}`
#[derive(Debug, Deserialize)]
pub(crate) struct ImageRecord {
    pub user: String,
    pub name: String,
    #[serde(deserialize_with = "count")]
    pub pull_count: i64,
    #[serde(deserialize_with = "count")]
    pub star_count: i64,
    #[serde(deserialize_with = "nullable")]
    pub last_updated: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub status: Option<FieldValue>,
}

impl NamespaceRecord {
    /// The record's own namespace is authoritative for the owner.
    pub fn into_stat(self) -> RepositoryStat {
        RepositoryStat {
            image: format!("{}/{}", self.namespace, self.name),
            user: self.namespace,
            name: self.name,
            pull_count: self.pull_count,
            star_count: self.star_count,
            last_updated: self.last_updated,
            status: self.status,
        }
    }
}

impl ImageRecord {
    pub fn into_stat(self, image: &str) -> RepositoryStat {
        RepositoryStat {
            user: self.user,
            name: self.name,
            image: image.to_string(),
            pull_count: self.pull_count,
            star_count: self.star_count,
            last_updated: self.last_updated,
            status: self.status,
        }
    }
}

/// Decode a user listing body. `count` is required but only `results` is walked.
pub fn decode_user_listing(user: &str, body: &[u8]) -> Result<Vec<RepositoryStat>> {
    let listing: NamespaceListing =
        serde_json::from_slice(body).map_err(|e| HubStatsError::schema(user, e))?;
    if listing.count > listing.results.len() as u64 {
        tracing::debug!(
            user = %user,
            count = listing.count,
            returned = listing.results.len(),
            "Listing is paginated; only the first page is consumed"
        );
    }
    Ok(listing.results.into_iter().map(NamespaceRecord::into_stat).collect())
}

pub fn decode_image(image: &str, body: &[u8]) -> Result<RepositoryStat> {
    let record: ImageRecord =
        serde_json::from_slice(body).map_err(|e| HubStatsError::schema(image, e))?;
    Ok(record.into_stat(image))
}

/// Pull and star counts arrive as integers, or occasionally as numeric strings.
fn count<'de, D>(de: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Int(n) => Ok(n),
        Raw::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        Raw::Float(f) => Err(serde::de::Error::custom(format!("count {} is not an integer", f))),
        Raw::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("count {:?} is not an integer", s))),
    }
}

/// Field must be present; JSON null is allowed and maps to `None`.
fn nullable<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "count": 2,
        "next": null,
        "results": [
            {"namespace": "alice", "name": "repoA", "pull_count": 10, "star_count": 1,
             "last_updated": "2024-01-02T03:04:05.000000Z", "status": 1},
            {"namespace": "alice", "name": "repoB", "pull_count": 20, "star_count": 0,
             "last_updated": null, "status": 1}
        ]
    }"#;

    #[test]
    fn test_decode_user_listing_in_response_order() {
        let stats = decode_user_listing("alice", LISTING.as_bytes()).unwrap();
        let images: Vec<_> = stats.iter().map(|s| s.image.as_str()).collect();
        assert_eq!(images, vec!["alice/repoA", "alice/repoB"]);
        assert_eq!(stats[0].last_updated.as_deref(), Some("2024-01-02T03:04:05.000000Z"));
        assert_eq!(stats[1].last_updated, None);
        assert_eq!(stats[0].status, Some(FieldValue::Integer(1)));
    }

    #[test]
    fn test_namespace_overrides_requested_user() {
        let body = r#"{"count": 1, "results": [
            {"namespace": "library", "name": "nginx", "pull_count": 5, "star_count": 2,
             "last_updated": "x", "status": "active"}]}"#;
        let stats = decode_user_listing("Library", body.as_bytes()).unwrap();
        assert_eq!(stats[0].user, "library");
        assert_eq!(stats[0].image, "library/nginx");
        assert_eq!(stats[0].status, Some(FieldValue::Text("active".into())));
    }

    #[test]
    fn test_first_page_only() {
        let body = r#"{"count": 57, "results": [
            {"namespace": "a", "name": "one", "pull_count": 1, "star_count": 0,
             "last_updated": null, "status": 1}]}"#;
        let stats = decode_user_listing("a", body.as_bytes()).unwrap();
        assert_eq!(stats.len(), 1);
    }

    #[test]
    fn test_decode_image_coerces_string_count() {
        let body = r#"{"user": "bob", "name": "tool", "namespace": "bob",
            "pull_count": "1042", "star_count": 3, "last_updated": "2023-05-01", "status": 1}"#;
        let stat = decode_image("bob/tool", body.as_bytes()).unwrap();
        assert_eq!(stat.pull_count, 1042);
        assert_eq!(stat.star_count, 3);
        assert_eq!(stat.image, "bob/tool");
        assert_eq!(stat.user, "bob");
    }

    #[test]
    fn test_missing_field_is_schema_fault() {
        let body = r#"{"user": "bob", "name": "tool", "star_count": 3,
            "last_updated": "2023-05-01", "status": 1}"#;
        let err = decode_image("bob/tool", body.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(err.to_string().contains("pull_count"));

        // null is not the same as absent
        let body = r#"{"user": "bob", "name": "tool", "pull_count": 1, "star_count": 3, "status": 1}"#;
        assert!(decode_image("bob/tool", body.as_bytes()).is_err());
    }

    #[test]
    fn test_wrong_type_is_schema_fault() {
        let body = r#"{"user": "bob", "name": "tool", "pull_count": "lots", "star_count": 3,
            "last_updated": null, "status": 1}"#;
        assert_eq!(decode_image("bob/tool", body.as_bytes()).unwrap_err().kind(), "schema");

        let body = r#"{"count": 1, "results": "nope"}"#;
        assert_eq!(decode_user_listing("bob", body.as_bytes()).unwrap_err().kind(), "schema");
    }

    #[test]
    fn test_malformed_json_is_schema_fault() {
        assert!(decode_user_listing("bob", b"<html>rate limited</html>").is_err());
    }
}
