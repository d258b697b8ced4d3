//! Resize orchestration
//!
//! For every source location of a batch the pipeline derives the
//! fingerprint, answers cache hits directly and produces misses through
//! fetch -> transform -> cache. Misses are produced inline in synchronous
//! mode and on the background task group in asynchronous mode.
//!
//! Concurrent misses for the same fingerprint are coalesced: one caller
//! produces the entry and every caller that joined meanwhile receives its
//! outcome, failure included. Outcomes are not remembered once the last
//! caller has left, so a later request retries a failed source.
//! Item failures never fail the batch; only an invalid request does.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::AppResult;
use crate::models::{ResizeMode, ResizeRequest, ResizeResult};
use crate::services::background_tasks::BackgroundTasks;
use crate::services::fingerprint::{Fingerprint, ImageHandle};
use crate::services::image_fetcher::HttpImageFetcher;
use crate::services::image_transformer::ImageTransformer;
use crate::services::resize_cache::ResizeCache;
use crate::services::traits::SourceFetcher;
use crate::utils::UrlUtils;

type Outcome = OnceCell<AppResult<Production>>;
type InFlightMap = HashMap<Fingerprint, Arc<Outcome>>;

/// How a miss was resolved by [`ResizePipeline::produce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    /// This caller fetched, transformed and stored the entry
    Produced,
    /// Another caller produced the entry while this one waited
    Coalesced,
}

#[derive(Clone)]
pub struct ResizePipeline {
    cache: Arc<ResizeCache>,
    fetcher: Arc<dyn SourceFetcher>,
    transformer: ImageTransformer,
    tasks: BackgroundTasks,
    in_flight: Arc<Mutex<InFlightMap>>,
    base_url: Arc<str>,
    max_dimension: u32,
    batch_concurrency: usize,
}

impl ResizePipeline {
    /// Assemble a pipeline from explicitly constructed collaborators
    pub fn new(
        cache: Arc<ResizeCache>,
        fetcher: Arc<dyn SourceFetcher>,
        tasks: BackgroundTasks,
        config: &Config,
    ) -> Self {
        Self {
            cache,
            fetcher,
            transformer: ImageTransformer::new(&config.resizer),
            tasks,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            base_url: Arc::from(config.web.base_url.as_str()),
            max_dimension: config.resizer.max_dimension,
            batch_concurrency: config.resizer.batch_concurrency.max(1),
        }
    }

    /// Build the production pipeline: HTTP fetcher, LRU cache and task group
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let cache = Arc::new(ResizeCache::new(config.resizer.cache_capacity)?);
        let fetcher = Arc::new(HttpImageFetcher::new(&config.resizer)?);
        let tasks = BackgroundTasks::new(
            config.background.max_concurrent_tasks,
            config.background.max_queued_tasks,
        );

        Ok(Self::new(cache, fetcher, tasks, config))
    }

    pub fn cache(&self) -> &Arc<ResizeCache> {
        &self.cache
    }

    pub fn background_tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Resolve a handle to the cached bytes, if produced
    pub async fn get(&self, handle: &ImageHandle) -> Option<Bytes> {
        self.cache.get(handle.fingerprint()).await
    }

    pub async fn process(
        &self,
        request: &ResizeRequest,
        mode: ResizeMode,
    ) -> AppResult<Vec<ResizeResult>> {
        match mode {
            ResizeMode::Sync => self.process_resizes(request).await,
            ResizeMode::Async => self.process_resizes_async(request).await,
        }
    }

    /// Resize every item of the batch before returning
    ///
    /// Results follow input order. A failing item yields a failure result and
    /// does not affect its siblings.
    pub async fn process_resizes(&self, request: &ResizeRequest) -> AppResult<Vec<ResizeResult>> {
        request.validate(self.max_dimension)?;

        let (width, height) = (request.width, request.height);
        let results: Vec<ResizeResult> = stream::iter(request.urls.iter().cloned())
            .map(|location| {
                let pipeline = self.clone();
                async move { pipeline.resize_item(&location, width, height).await }
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Processed resize batch of {} item(s) at {}x{} ({} failed)",
            results.len(),
            width,
            height,
            failed
        );

        Ok(results)
    }

    /// Answer immediately and produce cache misses in the background
    ///
    /// A miss is reported as success with `cached = false`; its handle
    /// resolves once the background task has stored the entry, and never if
    /// that task fails.
    pub async fn process_resizes_async(
        &self,
        request: &ResizeRequest,
    ) -> AppResult<Vec<ResizeResult>> {
        request.validate(self.max_dimension)?;

        let (width, height) = (request.width, request.height);
        let mut results = Vec::with_capacity(request.urls.len());

        for location in &request.urls {
            let fingerprint = Fingerprint::generate(width, height, location);
            let url = ImageHandle::new(fingerprint.clone()).url(&self.base_url);

            if self.cache.contains(&fingerprint).await {
                debug!(fingerprint = %fingerprint, "Cache hit");
                results.push(ResizeResult::success(url, true));
                continue;
            }

            let pipeline = self.clone();
            let location = location.clone();
            let task_name = format!(
                "resize {} ({}x{})",
                UrlUtils::obfuscate_credentials(&location),
                width,
                height
            );
            let scheduled = self.tasks.spawn(task_name, async move {
                pipeline.produce(&fingerprint, &location, width, height).await
            });

            match scheduled {
                Ok(()) => results.push(ResizeResult::success(url, false)),
                Err(rejection) => results.push(ResizeResult::failure(rejection.to_string())),
            }
        }

        Ok(results)
    }

    async fn resize_item(&self, location: &str, width: u32, height: u32) -> ResizeResult {
        let fingerprint = Fingerprint::generate(width, height, location);
        let url = ImageHandle::new(fingerprint.clone()).url(&self.base_url);

        if self.cache.contains(&fingerprint).await {
            debug!(fingerprint = %fingerprint, "Cache hit");
            return ResizeResult::success(url, true);
        }

        match self.produce(&fingerprint, location, width, height).await {
            Ok(_) => ResizeResult::success(url, false),
            Err(e) => {
                let url = UrlUtils::obfuscate_credentials(location);
                if e.is_item_failure() {
                    warn!(url = %url, fingerprint = %fingerprint, kind = e.kind(), error = %e, "Failed to resize image");
                } else {
                    error!(url = %url, fingerprint = %fingerprint, kind = e.kind(), error = %e, "Unexpected resize error");
                }
                ResizeResult::failure(e.to_string())
            }
        }
    }

    /// Produce the cache entry for `fingerprint`, coalescing with concurrent producers
    pub async fn produce(
        &self,
        fingerprint: &Fingerprint,
        location: &str,
        width: u32,
        height: u32,
    ) -> AppResult<Production> {
        let flight = self.join_flight(fingerprint);
        let mut leader = false;

        let outcome = flight
            .outcome
            .get_or_init(|| {
                leader = true;
                self.produce_entry(fingerprint, location, width, height)
            })
            .await;

        if leader {
            return outcome.clone();
        }

        debug!(
            fingerprint = %fingerprint,
            success = outcome.is_ok(),
            "Coalesced with in-flight resize"
        );
        outcome.clone().map(|_| Production::Coalesced)
    }

    async fn produce_entry(
        &self,
        fingerprint: &Fingerprint,
        location: &str,
        width: u32,
        height: u32,
    ) -> AppResult<Production> {
        // A flight that finished just before this one was created
        if self.cache.contains(fingerprint).await {
            return Ok(Production::Coalesced);
        }

        let source = self.fetcher.fetch(location).await?;
        let resized = self
            .transformer
            .transform_blocking(source, width, height)
            .await?;

        debug!(
            fingerprint = %fingerprint,
            bytes = resized.len(),
            "Caching resized image"
        );
        self.cache.put(fingerprint.clone(), resized).await;

        Ok(Production::Produced)
    }

    /// Number of fingerprints currently being produced
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn join_flight(&self, fingerprint: &Fingerprint) -> InFlight {
        let outcome = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        InFlight {
            map: self.in_flight.clone(),
            fingerprint: fingerprint.clone(),
            outcome,
        }
    }
}

/// Membership in the single-flight group of one fingerprint
///
/// Dropping the last membership removes the fingerprint from the map, also
/// when the producing future is cancelled. A cancelled leader leaves the
/// outcome unset and one of the remaining members takes over.
struct InFlight {
    map: Arc<Mutex<InFlightMap>>,
    fingerprint: Fingerprint,
    outcome: Arc<Outcome>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);

        // One reference in the map plus ours means nobody else is waiting
        if Arc::strong_count(&self.outcome) == 2
            && map
                .get(&self.fingerprint)
                .is_some_and(|current| Arc::ptr_eq(current, &self.outcome))
        {
            map.remove(&self.fingerprint);
        }
    }
}
