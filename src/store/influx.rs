//! InfluxDB v2 HTTP API client.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{MetricPoint, MetricStore, StoreConnector};
use crate::config::Config;
use crate::error::{HubStatsError, Result};

const BUCKET_PAGE_LIMIT: u32 = 100;

/// One connection to an InfluxDB v2 server.
pub struct InfluxStore {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<OrgEntry>,
}

#[derive(Debug, Deserialize)]
struct OrgEntry {
    id: String,
}

impl InfluxStore {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| HubStatsError::from_reqwest(base_url, e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    /// Turn a non-success response into a store fault, keeping the body for the log.
    async fn check(operation: &'static str, url: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| HubStatsError::from_reqwest(url, e))?;
        Err(HubStatsError::Store {
            operation,
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn org_id(&self, org: &str) -> Result<String> {
        let url = self.url("/api/v2/orgs");
        let resp = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.auth())
            .query(&[("org", org)])
            .send()
            .await
            .map_err(|e| HubStatsError::from_reqwest(&url, e))?;
        let resp = Self::check("find org", &url, resp).await?;
        let list: OrgList = resp
            .json()
            .await
            .map_err(|e| HubStatsError::from_reqwest(&url, e))?;

        list.orgs.into_iter().next().map(|o| o.id).ok_or_else(|| HubStatsError::Store {
            operation: "find org",
            status: 404,
            body: format!("organization '{}' not found", org),
        })
    }
}

#[async_trait]
impl MetricStore for InfluxStore {
    async fn list_buckets(&self, org: &str) -> Result<Vec<String>> {
        let url = self.url("/api/v2/buckets");
        let limit = BUCKET_PAGE_LIMIT.to_string();
        let mut names: Vec<String> = Vec::new();

        // Paged by offset until a short page comes back.
        loop {
            let offset = names.len().to_string();
            let resp = self
                .client
                .get(&url)
                .header(header::AUTHORIZATION, self.auth())
                .query(&[("org", org), ("limit", limit.as_str()), ("offset", offset.as_str())])
                .send()
                .await
                .map_err(|e| HubStatsError::from_reqwest(&url, e))?;
            let resp = Self::check("list buckets", &url, resp).await?;
            let page: BucketList = resp
                .json()
                .await
                .map_err(|e| HubStatsError::from_reqwest(&url, e))?;

            let returned = page.buckets.len();
            names.extend(page.buckets.into_iter().map(|b| b.name));
            if returned < BUCKET_PAGE_LIMIT as usize {
                return Ok(names);
            }
        }
    }

    async fn create_bucket(&self, name: &str, org: &str) -> Result<()> {
        let org_id = self.org_id(org).await?;
        let url = self.url("/api/v2/buckets");
        // An empty rule set means infinite retention.
        let body = json!({
            "name": name,
            "orgID": org_id,
            "retentionRules": [],
        });
        let resp = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await
            .map_err(|e| HubStatsError::from_reqwest(&url, e))?;
        Self::check("create bucket", &url, resp).await?;
        Ok(())
    }

    async fn write_point(&self, bucket: &str, org: &str, point: &MetricPoint) -> Result<()> {
        let url = self.url("/api/v2/write");
        let line = point.to_line_protocol();
        debug!(bucket = %bucket, line = %line, "Writing point");
        let resp = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.auth())
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .query(&[("org", org), ("bucket", bucket), ("precision", "ns")])
            .body(line)
            .send()
            .await
            .map_err(|e| HubStatsError::from_reqwest(&url, e))?;
        Self::check("write", &url, resp).await?;
        Ok(())
    }
}

/// Builds a new [`InfluxStore`] for every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InfluxConnector;

impl StoreConnector for InfluxConnector {
    fn connect(&self, config: &Config) -> Result<Box<dyn MetricStore>> {
        debug!(url = %config.influx_url, "Connecting to InfluxDB");
        Ok(Box::new(InfluxStore::new(&config.influx_url, &config.influx_token)?))
    }
}
