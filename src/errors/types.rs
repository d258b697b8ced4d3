//! Error type definitions for the JPEG resizer
//!
//! `AppError` is the top-level type returned across module boundaries;
//! `FetchError` and `TransformError` describe why a single source location
//! could not be turned into a cached entry.

use std::time::Duration;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Malformed batch request; aborts the whole batch
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Source retrieval failed for one item
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Decode/resize/encode failed for one item
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while retrieving a source image
///
/// Every variant is terminal for the source location it concerns; nothing is
/// retried by the fetcher itself.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Location is not an http(s) URL
    #[error("Invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Connection or transport failure
    #[error("Network error fetching '{url}': {message}")]
    Network { url: String, message: String },

    /// Upstream answered with a non-success status
    #[error("Unexpected status {status} fetching '{url}'")]
    Status { url: String, status: u16 },

    /// Declared content type is missing or not the required one
    #[error("Unsupported content type '{content_type}' from '{url}' (expected {expected})")]
    ContentType {
        url: String,
        content_type: String,
        expected: String,
    },

    /// Payload exceeded the configured ceiling
    #[error("Payload from '{url}' exceeds limit of {limit} bytes")]
    SizeLimit { url: String, limit: u64 },

    /// Fetch did not complete within the configured bound
    #[error("Timed out after {timeout:?} fetching '{url}'")]
    Timeout { url: String, timeout: Duration },
}

/// Errors raised while transforming JPEG bytes
#[derive(Error, Debug, Clone)]
pub enum TransformError {
    /// Input bytes are not a decodable JPEG
    #[error("Failed to decode JPEG: {0}")]
    Decode(String),

    /// Encoder rejected the resized image
    #[error("Failed to encode JPEG: {0}")]
    Encode(String),

    /// The blocking worker running the transform panicked or was aborted
    #[error("Transform worker failed: {0}")]
    Worker(String),

    /// Source or output dimensions exceed the configured bounds
    #[error("Image exceeds processing limits: {0}")]
    Limits(String),
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error concerns a single item rather than the whole batch
    pub fn is_item_failure(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Transform(_))
    }

    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Fetch(e) => e.kind(),
            Self::Transform(e) => e.kind(),
            Self::NotFound { .. } => "not_found",
            Self::Configuration { .. } => "configuration",
            Self::Internal { .. } => "internal",
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Network { .. } => "network",
            Self::Status { .. } => "status",
            Self::ContentType { .. } => "content_type",
            Self::SizeLimit { .. } => "size_limit",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl TransformError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Worker(_) => "worker",
            Self::Limits(_) => "limits",
        }
    }
}
