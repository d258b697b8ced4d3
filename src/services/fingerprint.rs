//! Content fingerprints and the handles derived from them
//!
//! A fingerprint identifies one transformation: the same
//! (width, height, location) triple always maps to the same key, and the
//! key is safe to embed in a URL path.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::utils::UrlUtils;

/// Length of an encoded fingerprint: 32 digest bytes in unpadded base64
const ENCODED_LEN: usize = 43;

/// Route prefix under which cached images are served
pub const IMAGE_PATH_PREFIX: &str = "/v1/image/";

/// File suffix of every handle
pub const IMAGE_SUFFIX: &str = ".jpeg";

/// Opaque cache key for one (width, height, location) transformation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint of a transformation
    ///
    /// SHA-256 over `"{width}:{height}:{location}"`, encoded as unpadded
    /// URL-safe base64. Width and height are both part of the key.
    pub fn generate(width: u32, height: u32, location: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(width.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(height.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(location.as_bytes());
        let digest = hasher.finalize();

        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Accept an encoded fingerprint coming back from a client
    pub fn parse(encoded: &str) -> Option<Self> {
        let well_formed = encoded.len() == ENCODED_LEN
            && encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        well_formed.then(|| Self(encoded.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally dereferenceable reference to a cached image
///
/// Rendered as `/v1/image/<fingerprint>.jpeg`; the retrieval side strips the
/// prefix and suffix again to recover the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    fingerprint: Fingerprint,
}

impl ImageHandle {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self { fingerprint }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Path relative to the service root
    pub fn path(&self) -> String {
        format!("{IMAGE_PATH_PREFIX}{}{IMAGE_SUFFIX}", self.fingerprint)
    }

    /// Absolute URL under the given public base URL
    pub fn url(&self, base_url: &str) -> String {
        UrlUtils::join_path(base_url, &self.path())
    }

    /// Resolve the last path segment (`<fingerprint>.jpeg`)
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        file_name
            .strip_suffix(IMAGE_SUFFIX)
            .and_then(Fingerprint::parse)
            .map(Self::new)
    }

    /// Resolve a full handle path (`/v1/image/<fingerprint>.jpeg`)
    pub fn from_path(path: &str) -> Option<Self> {
        path.strip_prefix(IMAGE_PATH_PREFIX)
            .and_then(Self::from_file_name)
    }
}

impl From<Fingerprint> for ImageHandle {
    fn from(fingerprint: Fingerprint) -> Self {
        Self::new(fingerprint)
    }
}
