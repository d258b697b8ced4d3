//! Small helpers shared across services and the web layer

pub mod human_format;
pub mod url;

pub use human_format::{format_bytes, parse_byte_size};
pub use url::UrlUtils;
