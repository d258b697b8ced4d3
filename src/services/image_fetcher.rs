//! HTTP retrieval of source images
//!
//! Validation rule: a source is accepted when the upstream answers with a
//! 2xx status and a `Content-Type` whose media type equals the configured
//! one (parameters ignored, case-insensitive). The URL suffix is never
//! consulted. Payloads are counted while streaming and rejected as soon as
//! they pass the size limit.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ResizerConfig;
use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::services::traits::SourceFetcher;
use crate::utils::{UrlUtils, format_bytes};

/// Fetches source images over HTTP(S) with time, size and type bounds
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    timeout: Duration,
    size_limit: u64,
    required_content_type: String,
}

impl HttpImageFetcher {
    /// Build a fetcher with its own connection pool
    pub fn new(config: &ResizerConfig) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.fetch_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, config))
    }

    /// Build a fetcher around an existing client
    pub fn with_client(client: Client, config: &ResizerConfig) -> Self {
        Self {
            client,
            timeout: config.fetch_timeout,
            size_limit: config.fetch_size_limit,
            required_content_type: media_type(&config.required_content_type),
        }
    }

    async fn fetch_bounded(&self, url: Url, display_url: &str) -> FetchResult<Bytes> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(display_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: display_url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if media_type(&content_type) != self.required_content_type {
            return Err(FetchError::ContentType {
                url: display_url.to_string(),
                content_type,
                expected: self.required_content_type.clone(),
            });
        }

        if let Some(declared) = response.content_length()
            && declared > self.size_limit
        {
            return Err(self.size_limit_error(display_url));
        }

        let capacity = response
            .content_length()
            .unwrap_or_default()
            .min(self.size_limit);
        let mut body = BytesMut::with_capacity(capacity as usize);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(display_url, e))?
        {
            if (body.len() + chunk.len()) as u64 > self.size_limit {
                return Err(self.size_limit_error(display_url));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            url = %display_url,
            size = %format_bytes(body.len() as u64),
            "Fetched source image"
        );

        Ok(body.freeze())
    }

    fn transport_error(&self, display_url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: display_url.to_string(),
                timeout: self.timeout,
            };
        }

        FetchError::Network {
            url: display_url.to_string(),
            message: UrlUtils::obfuscate_credentials(&error.without_url().to_string()),
        }
    }

    fn size_limit_error(&self, display_url: &str) -> FetchError {
        FetchError::SizeLimit {
            url: display_url.to_string(),
            limit: self.size_limit,
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpImageFetcher {
    async fn fetch(&self, location: &str) -> FetchResult<Bytes> {
        let display_url = UrlUtils::obfuscate_credentials(location);

        let url = UrlUtils::parse_source(location).map_err(|message| FetchError::InvalidUrl {
            url: display_url.clone(),
            message,
        })?;

        debug!(url = %display_url, timeout = ?self.timeout, "Fetching source image");

        match tokio::time::timeout(self.timeout, self.fetch_bounded(url, &display_url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: display_url,
                timeout: self.timeout,
            }),
        }
    }
}

/// Media type essence of a Content-Type value: parameters dropped, lowercased
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("image/jpeg", "image/jpeg")]
    #[case("IMAGE/JPEG", "image/jpeg")]
    #[case("image/jpeg; charset=binary", "image/jpeg")]
    #[case("  image/jpeg  ;q=1", "image/jpeg")]
    #[case("", "")]
    #[case("text/html", "text/html")]
    fn test_media_type(#[case] header: &str, #[case] expected: &str) {
        assert_eq!(media_type(header), expected);
    }

    #[tokio::test]
    async fn test_invalid_location_fails_without_network() {
        let fetcher = HttpImageFetcher::new(&ResizerConfig::default()).unwrap();

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));

        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let fetcher = HttpImageFetcher::new(&ResizerConfig::default()).unwrap();

        // Port 9 on loopback is the discard port; nothing listens there in CI
        let err = fetcher.fetch("http://127.0.0.1:9/a.jpeg").await.unwrap_err();
        assert!(
            matches!(err, FetchError::Network { .. } | FetchError::Timeout { .. }),
            "unexpected error: {err}"
        );
    }
}
