use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog api error ({status}) at {url}")]
    Api { status: StatusCode, url: String },
    #[error("no library named {0} on the catalog server")]
    LibraryNotFound(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Connection settings for the catalog server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub url: String,
    pub token: String,
}

/// One catalog library plus where its files live on disk.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub server: ServerConfig,
    pub name: String,
    /// Root of the published share this library indexes.
    pub share: PathBuf,
}

pub struct CatalogClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    videos: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    #[serde(default)]
    directory: String,
    filename: String,
}

impl CatalogClient {
    pub fn new(config: ServerConfig) -> CatalogResult<Self> {
        let client = Client::builder().user_agent("vodsync/0.1").build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> CatalogResult<T> {
        let response = self
            .client
            .get(&url)
            .header("X-Catalog-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Api { status, url });
        }
        Ok(response.json().await?)
    }

    /// Looks up a library by title and binds a handle to it.
    pub async fn find_library(&self, name: &str) -> CatalogResult<Library> {
        let listing: SectionsResponse = self
            .get_json(format!("{}/library/sections", self.base_url))
            .await?;
        let section = listing
            .sections
            .into_iter()
            .find(|section| section.title == name)
            .ok_or_else(|| CatalogError::LibraryNotFound(name.to_string()))?;
        debug!(library = %section.title, key = %section.key, "bound catalog library");
        Ok(Library {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            key: section.key,
            title: section.title,
        })
    }
}

/// A bound reference to one catalog library. Read-only for the duration of a
/// pipeline run.
#[derive(Debug, Clone)]
pub struct Library {
    client: Client,
    base_url: String,
    token: String,
    pub key: String,
    pub title: String,
}

impl Library {
    fn section_url(&self, tail: &str) -> String {
        format!("{}/library/sections/{}/{}", self.base_url, self.key, tail)
    }

    async fn get(&self, url: &str) -> CatalogResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header("X-Catalog-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Api {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// The two catalog operations the publish pipeline needs. `Library` is the
/// HTTP implementation; tests drive the pipeline with a stub.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Whether an entry for `directory`/`filename` is in the library index.
    async fn has_video(&self, directory: &str, filename: &str) -> CatalogResult<bool>;
    /// Asks the server to re-index the library. Returns once the request is
    /// accepted; indexing itself is asynchronous on the server side.
    async fn update(&self) -> CatalogResult<()>;
}

#[async_trait]
impl VideoCatalog for Library {
    async fn has_video(&self, directory: &str, filename: &str) -> CatalogResult<bool> {
        let url = self.section_url("all");
        let listing: VideosResponse = self.get(&url).await?.json().await?;
        Ok(listing
            .videos
            .iter()
            .any(|video| video.directory == directory && video.filename == filename))
    }

    async fn update(&self) -> CatalogResult<()> {
        let url = self.section_url("refresh");
        self.get(&url).await?;
        Ok(())
    }
}
