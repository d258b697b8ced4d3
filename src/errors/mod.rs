//! Centralized error handling for the JPEG resizer
//!
//! Errors are split by pipeline stage so that the orchestrator can tell an
//! item-level failure (fetch or transform) apart from a batch-level one
//! (validation).
//!
//! # Error Categories
//!
//! - **Fetch Errors**: retrieving the source image (transport, status, type, size, time)
//! - **Transform Errors**: decoding, resampling and re-encoding the JPEG
//! - **Validation Errors**: malformed batch requests, rejected before any work
//!
//! # Usage
//!
//! ```rust
//! use jpeg_resizer::errors::{AppError, AppResult};
//!
//! fn check(urls: &[String]) -> AppResult<()> {
//!     if urls.is_empty() {
//!         return Err(AppError::validation("at least one url is required"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(&[]).is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for fetch Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for transform Results
pub type TransformResult<T> = Result<T, TransformError>;
