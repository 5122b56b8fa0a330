//! Remote tile authority: wire types, the client trait and its HTTP client.
//!
//! The authority owns the versioned copy of every tile. Images travel as
//! base64-encoded PNG inside JSON bodies.

use crate::geometry::TileCoord;
use crate::surface::SurfaceError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default connect and read timeout for remote calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Failed to start task: {0}")]
    Spawn(String),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

impl From<SurfaceError> for SyncError {
    fn from(e: SurfaceError) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else if e.is_decode() {
            SyncError::Malformed(e.to_string())
        } else {
            SyncError::Http(e.to_string())
        }
    }
}

/// A versioned tile image: the push request and response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePayload {
    pub version: i64,
    /// Base64-encoded PNG.
    pub data: String,
}

impl TilePayload {
    /// Wrap PNG bytes.
    pub fn new(version: i64, png: &[u8]) -> Self {
        Self {
            version,
            data: STANDARD.encode(png),
        }
    }

    /// PNG bytes carried by this payload.
    pub fn png(&self) -> SyncResult<Vec<u8>> {
        decode_data(&self.data)
    }
}

/// Pull request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub version: i64,
}

/// Pull response body. `data` is present only when `version` is newer than
/// the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl PullResponse {
    /// PNG bytes, if the response carries an image.
    pub fn png(&self) -> SyncResult<Option<Vec<u8>>> {
        self.data.as_deref().map(decode_data).transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCanvasResponse {
    pub key: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCanvasResponse {
    #[serde(rename = "ID")]
    pub id: i64,
}

fn decode_data(data: &str) -> SyncResult<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| SyncError::Decode(format!("invalid base64: {}", e)))
}

/// Trait for remote tile authorities.
///
/// Calls block; they are only ever made from background tasks.
pub trait RemoteAuthority: Send + Sync {
    /// Push local edits; returns the authority's merged state.
    fn push(
        &self,
        canvas_id: i64,
        coord: TileCoord,
        request: &TilePayload,
    ) -> SyncResult<TilePayload>;

    /// Ask for anything newer than `request.version`.
    fn pull(
        &self,
        canvas_id: i64,
        coord: TileCoord,
        request: &PullRequest,
    ) -> SyncResult<PullResponse>;

    /// Create a canvas and return its id.
    fn create_canvas(&self, name: &str) -> SyncResult<i64>;

    /// Find a canvas by name and return its id.
    fn search_canvas(&self, query: &str) -> SyncResult<i64>;
}

/// Blocking HTTP client for the tile authority.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    base: Url,
    client: Client,
}

impl HttpAuthority {
    /// Create a client for the authority at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let base =
            Url::parse(base_url).map_err(|e| SyncError::Http(format!("Invalid URL: {}", e)))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(SyncError::Http(format!(
                "Invalid authority URL scheme: {}",
                base.scheme()
            )));
        }
        if base.cannot_be_a_base() {
            return Err(SyncError::Http(format!("Not a base URL: {}", base_url)));
        }

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Http(format!("Not a base URL: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn tile_endpoint(&self, prefix: &[&str], canvas_id: i64, coord: TileCoord) -> SyncResult<Url> {
        let canvas = canvas_id.to_string();
        let x = coord.x.to_string();
        let y = coord.y.to_string();
        let mut segments = prefix.to_vec();
        segments.extend([canvas.as_str(), x.as_str(), y.as_str()]);
        self.endpoint(&segments)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

impl RemoteAuthority for HttpAuthority {
    fn push(
        &self,
        canvas_id: i64,
        coord: TileCoord,
        request: &TilePayload,
    ) -> SyncResult<TilePayload> {
        let url = self.tile_endpoint(&["tile"], canvas_id, coord)?;
        log::debug!("Pushing tile v{} to {}", request.version, url);
        self.send(self.client.post(url).json(request))
    }

    fn pull(
        &self,
        canvas_id: i64,
        coord: TileCoord,
        request: &PullRequest,
    ) -> SyncResult<PullResponse> {
        let url = self.tile_endpoint(&["update", "tile"], canvas_id, coord)?;
        log::debug!("Pulling tile newer than v{} from {}", request.version, url);
        self.send(self.client.post(url).json(request))
    }

    fn create_canvas(&self, name: &str) -> SyncResult<i64> {
        let url = self.endpoint(&["create", "canvas", name])?;
        let response: CreateCanvasResponse = self.send(self.client.post(url))?;
        log::info!("Created canvas {:?} with id {}", name, response.key);
        Ok(response.key)
    }

    fn search_canvas(&self, query: &str) -> SyncResult<i64> {
        let url = self.endpoint(&["search", "canvas", query])?;
        let response: SearchCanvasResponse = self.send(self.client.get(url))?;
        Ok(response.id)
    }
}
