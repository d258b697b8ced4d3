//! Service seams
//!
//! The pipeline only depends on these traits, so tests and alternative
//! transports can stand in for the HTTP fetcher.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::FetchResult;

/// Retrieves the raw bytes of a source image
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `location`, enforcing the fetcher's time, size and type bounds
    async fn fetch(&self, location: &str) -> FetchResult<Bytes>;
}
