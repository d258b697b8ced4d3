//! Shared fixtures: an in-process upstream image server and test configuration
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jpeg_resizer::config::Config;

pub const BASE_URL: &str = "http://resizer.test";

/// Upper bound the test configuration puts on source payloads
pub const SIZE_LIMIT: u64 = 256 * 1024;

pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
        .unwrap();
    out
}

pub struct Upstream {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    /// Requests received so far, across all routes
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serve fixtures on 127.0.0.1 at an ephemeral port
///
/// - `photo.jpeg`: 400x300 JPEG
/// - `photo-params.jpeg`: same, with a parameterised content type
/// - `text.jpeg`: text/plain body
/// - `missing.jpeg`: 404
/// - `corrupt.jpeg`: image/jpeg header on garbage bytes
/// - `slow.jpeg`: JPEG after two seconds
/// - `huge.jpeg`: declared body larger than [`SIZE_LIMIT`]
/// - `streamed.jpeg`: chunked body larger than [`SIZE_LIMIT`], no length
pub async fn spawn_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/{name}", get(serve_fixture))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        base: format!("http://{addr}"),
        hits,
    }
}

async fn serve_fixture(State(hits): State<Arc<AtomicUsize>>, Path(name): Path<String>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);

    let jpeg = |content_type: &'static str| {
        ([(header::CONTENT_TYPE, content_type)], jpeg_fixture(400, 300)).into_response()
    };

    match name.as_str() {
        "photo.jpeg" => jpeg("image/jpeg"),
        "photo-params.jpeg" => jpeg("Image/JPEG; charset=binary"),
        "text.jpeg" => ([(header::CONTENT_TYPE, "text/plain")], "hello").into_response(),
        "corrupt.jpeg" => {
            ([(header::CONTENT_TYPE, "image/jpeg")], vec![0x42u8; 512]).into_response()
        }
        "slow.jpeg" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            jpeg("image/jpeg")
        }
        "huge.jpeg" => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            vec![0xFFu8; SIZE_LIMIT as usize + 1],
        )
            .into_response(),
        "streamed.jpeg" => {
            let chunks = (0..8).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![0xFFu8; 64 * 1024])));
            let body = Body::from_stream(futures::stream::iter(chunks));
            ([(header::CONTENT_TYPE, "image/jpeg")], body).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.web.base_url = BASE_URL.to_string();
    config.web.request_timeout = Duration::from_secs(5);
    config.resizer.fetch_timeout = Duration::from_millis(500);
    config.resizer.fetch_size_limit = SIZE_LIMIT;
    config.resizer.cache_capacity = 8;
    config.background.max_concurrent_tasks = 4;
    config
}

/// Path component of a handle URL returned by the service
pub fn handle_path(url: &str) -> String {
    url.strip_prefix(BASE_URL)
        .unwrap_or_else(|| panic!("unexpected handle url {url}"))
        .to_string()
}
