//! Retrieving the bytes behind a sound identifier.

use crate::error::{Error, Result};

/// Fetches the encoded bytes for an identifier.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http://` and `https://` URLs with reqwest and everything else
/// (plain paths, `file://` URLs) from the local filesystem.
///
/// Non-success HTTP statuses are fetch failures.
#[derive(Clone, Debug, Default)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetch for Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fail = |reason: String| Error::Fetch { url: url.to_owned(), reason };

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| fail(e.to_string()))?;
            let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read(path).await.map_err(|e| fail(e.to_string()))
        }
    }
}

/// The file extension of the last path segment, ignoring query and fragment.
pub fn extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}
