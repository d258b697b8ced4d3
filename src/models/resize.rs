use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// A batch of source images to resize to the same target dimensions
///
/// A dimension of 0 means "derive from the other one, keeping the aspect
/// ratio". When both are 0 the source dimensions are kept and the image is
/// only re-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl ResizeRequest {
    pub fn new<I, S>(urls: I, width: u32, height: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            width,
            height,
        }
    }

    /// Batch-level checks; item-level problems are reported per result instead
    pub fn validate(&self, max_dimension: u32) -> AppResult<()> {
        if self.urls.is_empty() {
            return Err(AppError::validation("at least one url is required"));
        }

        if let Some(index) = self.urls.iter().position(|u| u.trim().is_empty()) {
            return Err(AppError::validation(format!("url at index {index} is empty")));
        }

        if self.width > max_dimension || self.height > max_dimension {
            return Err(AppError::validation(format!(
                "requested size {}x{} exceeds the maximum dimension of {max_dimension}",
                self.width, self.height
            )));
        }

        Ok(())
    }
}

/// How a batch is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResizeMode {
    /// Block until every item has been fetched, transformed and cached
    #[default]
    Sync,
    /// Answer immediately and produce cache misses in the background
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeStatus {
    Success,
    Failure,
}

/// Outcome for one source location of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeResult {
    #[serde(rename = "result")]
    pub status: ResizeStatus,
    /// Dereferenceable handle URL, present iff the status is success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether the image was already cached when the request was processed
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResizeResult {
    pub fn success(url: String, cached: bool) -> Self {
        Self {
            status: ResizeStatus::Success,
            url: Some(url),
            cached,
            error: None,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            status: ResizeStatus::Failure,
            url: None,
            cached: false,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResizeStatus::Success
    }
}
