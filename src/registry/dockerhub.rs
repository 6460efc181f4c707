//! Docker Hub adapter — public, unauthenticated repository endpoints.

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::{decode_image, decode_user_listing, RegistrySource, RepositoryStat};
use crate::error::{HubStatsError, Result};

pub const DEFAULT_API_URL: &str = "https://hub.docker.com";

pub struct DockerHubClient {
    client: Client,
    api_url: String,
}

impl DockerHubClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hubstats/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HubStatsError::from_reqwest(api_url, e))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn repository_url(&self, path: &str) -> String {
        format!("{}/v2/repositories/{}", self.api_url, path)
    }

    /// GET `url` and return the body; any non-2xx status is a network fault.
    async fn fetch(&self, entity: &str, url: &str) -> Result<Vec<u8>> {
        info!("Attempting to contact {} with URL {}", entity, url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HubStatsError::from_reqwest(url, e))?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| HubStatsError::from_reqwest(url, e))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl RegistrySource for DockerHubClient {
    async fn user_repositories(&self, user: &str) -> Result<Vec<RepositoryStat>> {
        let url = self.repository_url(user);
        let body = self.fetch(user, &url).await?;
        decode_user_listing(user, &body)
    }

    async fn image(&self, image: &str) -> Result<RepositoryStat> {
        let url = self.repository_url(image);
        let body = self.fetch(image, &url).await?;
        decode_image(image, &body)
    }
}
