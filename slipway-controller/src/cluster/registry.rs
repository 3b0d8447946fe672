//! Image registry client (Docker Registry HTTP API v2)

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ClusterError, ClusterResult};

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Deserialize)]
struct TagList {
    // The registry returns `null` for repositories without tags
    tags: Option<Vec<String>>,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn catalog(&self) -> ClusterResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/v2/_catalog", self.base_url))
            .send()
            .await?;
        let catalog: Catalog = Self::check(response).await?.json().await?;
        Ok(catalog.repositories)
    }

    pub async fn tags(&self, repository: &str) -> ClusterResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/v2/{}/tags/list", self.base_url, repository))
            .send()
            .await?;
        let tags: TagList = Self::check(response).await?.json().await?;
        Ok(tags.tags.unwrap_or_default())
    }

    /// Content digest of `repository:tag`, read from the manifest headers
    pub async fn manifest_digest(&self, repository: &str, tag: &str) -> ClusterResult<String> {
        let response = self
            .client
            .head(format!("{}/v2/{}/manifests/{}", self.base_url, repository, tag))
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let digest = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ClusterError::Parse(format!("no digest header for {}:{}", repository, tag))
            })?;

        debug!("Resolved {}:{} to {}", repository, tag, digest);
        Ok(digest)
    }

    async fn check(response: reqwest::Response) -> ClusterResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(response.url().path().to_string()));
        }
        Err(ClusterError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}
