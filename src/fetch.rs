//! Artifact source resolution: the `image_url`/`audio_url` field accepts a
//! remote URL, a local path, a `file://` URL, or a base64 `data:` URL.

use std::path::PathBuf;

use base64::Engine;

use crate::{config::AppConfig, error::ServiceError};

/// Some image hosts reject requests without a browser-like agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Remote(String),
    Local(PathBuf),
    Data(String),
}

pub fn classify(raw: &str) -> ArtifactSource {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:") {
        ArtifactSource::Data(trimmed.to_string())
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        ArtifactSource::Remote(trimmed.to_string())
    } else if let Some(rest) = trimmed.strip_prefix("file://") {
        // file:///abs/path and file://host/abs/path both resolve to /abs/path.
        let path = match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => rest,
        };
        ArtifactSource::Local(PathBuf::from(path))
    } else {
        ArtifactSource::Local(PathBuf::from(trimmed))
    }
}

pub fn build_client(config: &AppConfig) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(config.fetch_timeout)
        .build()
        .map_err(|e| ServiceError::Fetch(format!("failed to build HTTP client: {e}")))
}

/// Resolve a source string to raw bytes.
pub async fn resolve(client: &reqwest::Client, raw: &str) -> Result<Vec<u8>, ServiceError> {
    match classify(raw) {
        ArtifactSource::Data(url) => decode_data_url(&url),
        ArtifactSource::Local(path) => tokio::fs::read(&path).await.map_err(|e| {
            ServiceError::Fetch(format!("local file not found: {}: {e}", path.display()))
        }),
        ArtifactSource::Remote(url) => {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| ServiceError::Fetch(format!("{url}: {e}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ServiceError::Fetch(format!("HTTP {status} for {url}")));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ServiceError::Fetch(format!("failed to read body of {url}: {e}")))?;
            tracing::debug!(bytes = bytes.len(), %url, "fetched remote artifact");
            Ok(bytes.to_vec())
        }
    }
}

/// Decode a `data:` URL payload. A bare base64 string (no header) is accepted
/// too; whitespace inside the payload is ignored.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, ServiceError> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, b64)| b64).unwrap_or(data)
    } else {
        data
    };

    let normalized: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| ServiceError::Decode(format!("invalid base64 payload: {e}")))
}

/// Wrap raw bytes into a `data:` URL, the shape clients use to inline
/// uploads and recordings into the string-typed source field.
pub fn to_data_url(bytes: &[u8], mime: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}
