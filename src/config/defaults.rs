/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "10s";
pub const DEFAULT_MAX_REQUEST_SIZE: u64 = 8 * 1024; // 8KiB

// Resize pipeline defaults
pub const DEFAULT_FETCH_TIMEOUT: &str = "1s";
pub const DEFAULT_FETCH_SIZE_LIMIT: u64 = 15 * 1024 * 1024; // 15MiB
pub const DEFAULT_REQUIRED_CONTENT_TYPE: &str = "image/jpeg";
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;
pub const DEFAULT_MAX_SOURCE_DIMENSION: u32 = 16384;
pub const DEFAULT_MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024; // 512MiB
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;
pub const DEFAULT_USER_AGENT: &str = concat!("jpeg-resizer/", env!("CARGO_PKG_VERSION"));

// Background task defaults
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 32;
pub const DEFAULT_MAX_QUEUED_TASKS: usize = 256;
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: &str = "30s";
