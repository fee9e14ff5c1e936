//! Remote drive tree client
//!
//! Lists the children of a remote folder one page at a time. The Microsoft Graph
//! implementation talks to `/me/drive/items/{id}/children`; the orchestrator only
//! sees the [`RemoteTree`] trait so it can be driven by in-memory trees in tests.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::IgnoredAny;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::rate_limiter::{RateLimitConfig, RateLimitedClient, is_transient_status};
use crate::config::Config;

/// Properties requested for every listed child
const SELECT_FIELDS: &str = "id,name,file,folder,size,mimeType,@microsoft.graph.downloadUrl";

/// One child of a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntry {
    Folder {
        id: String,
        name: String,
    },
    File {
        id: String,
        name: String,
        size: u64,
        mime_type: String,
        download_url: Option<String>,
    },
}

/// A bounded slice of a folder listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub entries: Vec<RemoteEntry>,
    /// Opaque continuation; `None` once the listing is exhausted
    pub next_cursor: Option<String>,
}

/// Listing failures, classified by what the caller should do about them
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriveError {
    /// The access token was rejected; nothing further will succeed with it
    #[error("access token rejected by provider")]
    AuthExpired,

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

impl DriveError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriveError::Transient(_))
    }
}

#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// List one page of `folder_id`'s children. Pass the previous page's
    /// `next_cursor` to continue a listing.
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page, DriveError>;
}

/// Microsoft Graph (OneDrive) implementation of [`RemoteTree`]
pub struct GraphDriveClient {
    http: RateLimitedClient,
    base_url: String,
}

impl GraphDriveClient {
    pub fn new(base_url: &str, limits: RateLimitConfig) -> Result<Self> {
        Ok(Self {
            http: RateLimitedClient::new("graph", limits)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.graph_api_base,
            RateLimitConfig {
                requests_per_second: config.graph_requests_per_second,
                burst_size: config.graph_burst_size,
                timeout: config.graph_timeout,
            },
        )
    }

    /// URL of the first page of a folder listing
    pub fn children_url(&self, folder_id: &str) -> Result<String, DriveError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DriveError::Protocol(format!("invalid Graph base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DriveError::Protocol("Graph base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["me", "drive", "items", folder_id, "children"]);
        url.set_query(Some(&format!("$select={}", SELECT_FIELDS)));
        Ok(url.into())
    }
}

#[async_trait]
impl RemoteTree for GraphDriveClient {
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page, DriveError> {
        // nextLink already carries the query, so it is requested verbatim
        let url = match cursor {
            Some(next_link) => next_link.to_string(),
            None => self.children_url(folder_id)?,
        };

        let response = self
            .http
            .get_with_bearer(&url, access_token)
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DriveError::Transient(format!("failed to read body: {}", e)))?;

        let listing: ChildrenResponse = serde_json::from_slice(&body)
            .map_err(|e| DriveError::Protocol(format!("undecodable listing: {}", e)))?;

        let page = listing.into_page();
        debug!(
            folder_id = %folder_id,
            entries = page.entries.len(),
            has_more = page.next_cursor.is_some(),
            "Listed drive folder page"
        );
        Ok(page)
    }
}

fn classify_status(status: StatusCode) -> DriveError {
    if status == StatusCode::UNAUTHORIZED {
        DriveError::AuthExpired
    } else if is_transient_status(status) {
        DriveError::Transient(format!("HTTP {}", status))
    } else {
        DriveError::Protocol(format!("HTTP {}", status))
    }
}

fn classify_transport_error(err: reqwest::Error) -> DriveError {
    if err.is_builder() {
        DriveError::Protocol(format!("invalid request: {}", err))
    } else {
        DriveError::Transient(format!("request failed: {}", err))
    }
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    file: Option<FileFacet>,
    folder: Option<IgnoredAny>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileFacet {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

impl ChildrenResponse {
    fn into_page(self) -> Page {
        Page {
            entries: self.value.into_iter().filter_map(DriveItem::into_entry).collect(),
            next_cursor: self.next_link.filter(|link| !link.is_empty()),
        }
    }
}

impl DriveItem {
    /// Notebooks, bundles and other facets are neither file nor folder and are skipped
    fn into_entry(self) -> Option<RemoteEntry> {
        if self.folder.is_some() {
            return Some(RemoteEntry::Folder { id: self.id, name: self.name });
        }

        let file = self.file?;
        Some(RemoteEntry::File {
            id: self.id,
            name: self.name,
            size: self.size.unwrap_or(0),
            mime_type: file.mime_type.or(self.mime_type).unwrap_or_default(),
            download_url: self.download_url,
        })
    }
}
