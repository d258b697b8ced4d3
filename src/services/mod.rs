//! Resizing services
//!
//! Leaf services (fetcher, transformer, cache, background tasks) are
//! composed by [`ResizePipeline`], which is the only type the web layer talks to.

pub mod background_tasks;
pub mod fingerprint;
pub mod image_fetcher;
pub mod image_transformer;
pub mod resize_cache;
pub mod resize_pipeline;
pub mod traits;

pub use background_tasks::{BackgroundTaskStats, BackgroundTasks, SpawnRejection};
pub use fingerprint::{Fingerprint, ImageHandle};
pub use image_fetcher::HttpImageFetcher;
pub use image_transformer::ImageTransformer;
pub use resize_cache::{ResizeCache, ResizeCacheStats};
pub use resize_pipeline::{Production, ResizePipeline};
pub use traits::SourceFetcher;
