//! Fetch-to-disk transport
//!
//! The `Fetcher` trait is the seam between the download executor and the
//! network. `HttpFetcher` is the production implementation; tests plug in
//! scripted fetchers instead.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::config::ClientConfig;
use super::http::HttpHandler;
use crate::errors::{ConfigResult, DownloadError, DownloadResult};

/// Writes the body of a remote resource to a local path
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Primary fetch: stream the body to `destination`, verifying its length
    ///
    /// Returns the number of bytes written. A body that disagrees with the
    /// advertised Content-Length fails with `ContentLengthMismatch`.
    async fn fetch(&self, url: &str, destination: &Path) -> DownloadResult<u64>;

    /// Fallback fetch used after a `ContentLengthMismatch`
    ///
    /// Writes whatever body the server sends without length verification.
    async fn fetch_plain(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        self.fetch(url, destination).await
    }
}

/// Production fetcher backed by a rate-limited reqwest client
#[derive(Debug)]
pub struct HttpFetcher {
    http_handler: HttpHandler,
}

impl HttpFetcher {
    /// Build a fetcher from client configuration
    pub fn new(config: &ClientConfig) -> ConfigResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps)?;
        tracing::debug!("Created HTTP fetcher ({} req/s)", config.rate_limit_rps);
        Ok(Self { http_handler })
    }

    async fn stream_to_file(
        &self,
        url: &str,
        destination: &Path,
        verify_length: bool,
    ) -> DownloadResult<u64> {
        let parsed_url = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.http_handler.get_response(&parsed_url).await?;
        let expected = response.content_length();

        let mut file = File::create(destination)
            .await
            .map_err(|e| DownloadError::write(destination, e))?;

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                // The transport rejects a body shorter than its Content-Length
                Err(e) => match expected.filter(|&n| verify_length && received < n) {
                    Some(expected) => {
                        tracing::debug!("Body of {} ended early: {}", url, e);
                        return Err(DownloadError::ContentLengthMismatch {
                            url: url.to_string(),
                            expected,
                            received,
                        });
                    }
                    None => return Err(DownloadError::network(url, e)),
                },
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::write(destination, e))?;
            received += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::write(destination, e))?;

        if verify_length {
            if let Some(expected) = expected {
                if expected != received {
                    return Err(DownloadError::ContentLengthMismatch {
                        url: url.to_string(),
                        expected,
                        received,
                    });
                }
            }
        }

        Ok(received)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        self.stream_to_file(url, destination, true).await
    }

    async fn fetch_plain(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        self.stream_to_file(url, destination, false).await
    }
}
