//! Upstream storage of configuration templates.

use crate::error::StorageError;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};
use parking_lot::RwLock;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Named blob storage holding configuration templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Names of the stored templates, in storage order.
    async fn list(&self) -> Result<Vec<String>, StorageError>;
    /// Raw bytes of the template called `name`.
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError>;
    /// Create or replace `name`.
    async fn store(&self, name: &str, content: &[u8]) -> Result<(), StorageError>;
}

/// Repository coordinates for [`GithubStore`].
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// `owner/name` of the repository.
    pub repo: String,
    pub branch: String,
    pub token: String,
}

impl GithubConfig {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    sha: String,
}

/// Templates kept in a GitHub repository, accessed through the contents API.
pub struct GithubStore {
    client: Client,
    config: GithubConfig,
    api_base: String,
}

impl GithubStore {
    pub fn new(config: GithubConfig) -> Result<Self, StorageError> {
        Self::with_api_base(config, "https://api.github.com")
    }

    /// Use a different API root, e.g. a GitHub Enterprise host.
    pub fn with_api_base(config: GithubConfig, api_base: impl Into<String>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, name: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, self.config.repo, name)
    }

    fn auth(&self) -> String {
        format!("token {}", self.config.token)
    }

    async fn get_file(&self, name: &str) -> Result<Option<FileContent>, StorageError> {
        let response = self
            .client
            .get(self.contents_url(name))
            .query(&[("ref", &self.config.branch)])
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StorageError::Status(status)),
        }
    }
}

#[async_trait]
impl TemplateStore for GithubStore {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let response = self
            .client
            .get(self.contents_url(""))
            .query(&[("ref", &self.config.branch)])
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(StorageError::Status(response.status()));
        }
        let entries: Vec<ContentEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .map(|e| e.name)
            .collect())
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let file = self
            .get_file(name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        // The API wraps base64 content at 60 columns.
        let packed: String = file.content.split_whitespace().collect();
        Ok(STANDARD.decode(packed)?)
    }

    async fn store(&self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        let existing = self.get_file(name).await?;
        let mut body = json!({
            "message": "Update via API",
            "content": STANDARD.encode(content),
            "branch": self.config.branch,
        });
        if let Some(file) = existing {
            body["sha"] = json!(file.sha);
        }

        let response = self
            .client
            .put(self.contents_url(name))
            .header(header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                info!("Stored {} on {}@{}", name, self.config.repo, self.config.branch);
                Ok(())
            }
            status => {
                warn!("Storing {} failed with {}", name, status);
                Err(StorageError::Status(status))
            }
        }
    }
}

/// In-process store, handy for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.write().insert(name.into(), content.into());
        self
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.files.read().keys().cloned().collect())
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn store(&self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        self.files.write().insert(name.to_string(), content.to_vec());
        Ok(())
    }
}
