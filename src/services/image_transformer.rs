//! JPEG decode, resample and re-encode

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use tracing::debug;

use crate::config::ResizerConfig;
use crate::errors::{TransformError, TransformResult};

/// Resizes JPEG images with a fixed filter and encoder quality
///
/// Decoding is bounded by the source dimension and allocation limits, and a
/// resize never produces an image wider or taller than `max_dimension`.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransformer {
    filter: FilterType,
    quality: u8,
    max_dimension: u32,
    max_source_dimension: u32,
    max_decode_alloc: u64,
}

impl ImageTransformer {
    pub fn new(config: &ResizerConfig) -> Self {
        Self {
            filter: config.filter.into(),
            quality: config.jpeg_quality,
            max_dimension: config.max_dimension,
            max_source_dimension: config.max_source_dimension,
            max_decode_alloc: config.max_decode_alloc,
        }
    }

    fn decode(&self, data: &[u8]) -> TransformResult<DynamicImage> {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_source_dimension);
        limits.max_image_height = Some(self.max_source_dimension);
        limits.max_alloc = Some(self.max_decode_alloc);

        let mut reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
        reader.limits(limits);

        reader.decode().map_err(|e| match e {
            ImageError::Limits(limits) => TransformError::Limits(limits.to_string()),
            other => TransformError::Decode(other.to_string()),
        })
    }

    /// Decode `data` as JPEG, resize it and encode it back to JPEG
    ///
    /// A zero width or height is derived from the other dimension keeping the
    /// source aspect ratio; when both are set the output has exactly those
    /// dimensions.
    pub fn transform(&self, data: &[u8], width: u32, height: u32) -> TransformResult<Bytes> {
        let source = self.decode(data)?;

        let (source_width, source_height) = source.dimensions();
        let (target_width, target_height) =
            target_dimensions(source_width, source_height, width, height);

        let resized = if (target_width, target_height) == (source_width, source_height) {
            source
        } else {
            if target_width > self.max_dimension || target_height > self.max_dimension {
                return Err(TransformError::Limits(format!(
                    "resizing {source_width}x{source_height} to {target_width}x{target_height} \
                     exceeds the maximum dimension of {}",
                    self.max_dimension
                )));
            }
            source.resize_exact(target_width, target_height, self.filter)
        };

        // The JPEG encoder has no alpha support; keep grayscale as is
        let encodable = match resized {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => resized,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };

        let mut encoded = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut encoded, self.quality);
        encodable
            .write_with_encoder(encoder)
            .map_err(|e| TransformError::Encode(e.to_string()))?;

        debug!(
            "Resized {}x{} -> {}x{} ({} -> {} bytes)",
            source_width,
            source_height,
            target_width,
            target_height,
            data.len(),
            encoded.len()
        );

        Ok(Bytes::from(encoded))
    }

    /// Run [`transform`](Self::transform) on the blocking thread pool
    pub async fn transform_blocking(
        &self,
        data: Bytes,
        width: u32,
        height: u32,
    ) -> TransformResult<Bytes> {
        let transformer = *self;
        tokio::task::spawn_blocking(move || transformer.transform(&data, width, height))
            .await
            .map_err(|e| TransformError::Worker(e.to_string()))?
    }
}

/// Output dimensions for a request, never smaller than 1x1
///
/// A derived dimension that does not fit in `u32` saturates at `u32::MAX`.
fn target_dimensions(source_width: u32, source_height: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = |value: u32, numerator: u32, denominator: u32| -> u32 {
        let scaled = (f64::from(value) * f64::from(numerator) / f64::from(denominator)).round();
        (scaled as u32).max(1)
    };

    match (width, height) {
        (0, 0) => (source_width, source_height),
        (w, 0) => (w, scale(source_height, w, source_width)),
        (0, h) => (scale(source_width, h, source_height), h),
        (w, h) => (w, h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
            .unwrap();
        out
    }

    fn decode(data: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(data, ImageFormat::Jpeg).unwrap()
    }

    fn transformer() -> ImageTransformer {
        ImageTransformer::new(&ResizerConfig::default())
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions(400, 200, 100, 0), (100, 50));
        assert_eq!(target_dimensions(400, 200, 0, 50), (100, 50));
        assert_eq!(target_dimensions(400, 200, 30, 30), (30, 30));
        assert_eq!(target_dimensions(400, 200, 0, 0), (400, 200));
        assert_eq!(target_dimensions(1000, 3, 10, 0), (10, 1));
        assert_eq!(target_dimensions(333, 100, 100, 0), (100, 30));
    }

    #[test]
    fn test_width_only_preserves_aspect_ratio() {
        let output = transformer().transform(&jpeg_fixture(300, 200), 150, 0).unwrap();
        let img = decode(&output);

        assert_eq!(img.width(), 150);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_height_only_preserves_aspect_ratio() {
        let output = transformer().transform(&jpeg_fixture(300, 200), 0, 50).unwrap();
        let img = decode(&output);

        assert_eq!(img.height(), 50);
        let ratio = img.width() as f64 / img.height() as f64;
        assert!((ratio - 1.5).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_both_dimensions_resize_exactly() {
        let output = transformer().transform(&jpeg_fixture(300, 200), 64, 64).unwrap();
        assert_eq!(decode(&output).dimensions(), (64, 64));
    }

    #[test]
    fn test_zero_dimensions_keep_source_size() {
        let output = transformer().transform(&jpeg_fixture(120, 80), 0, 0).unwrap();
        assert_eq!(decode(&output).dimensions(), (120, 80));
    }

    #[test]
    fn test_grayscale_stays_grayscale() {
        let img = GrayImage::from_fn(40, 40, |x, _| Luma([(x * 6) as u8]));
        let mut data = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_with_encoder(JpegEncoder::new(&mut data))
            .unwrap();

        let output = transformer().transform(&data, 20, 0).unwrap();
        assert!(matches!(decode(&output), DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_malformed_input_is_a_decode_error() {
        let err = transformer().transform(b"definitely not a jpeg", 10, 10).unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));

        let mut truncated = jpeg_fixture(64, 64);
        truncated.truncate(20);
        let err = transformer().transform(&truncated, 10, 10).unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[test]
    fn test_derived_dimension_is_bounded() {
        // 1x2000 at width 8192 would derive a height of 16,384,000
        let sliver = jpeg_fixture(1, 2000);
        let err = transformer().transform(&sliver, 8192, 0).unwrap_err();

        assert!(matches!(err, TransformError::Limits(_)), "unexpected error: {err}");
        assert_eq!(target_dimensions(1, 2000, 8192, 0), (8192, 16_384_000));
        assert_eq!(target_dimensions(1, u32::MAX, u32::MAX, 0).1, u32::MAX);
    }

    #[test]
    fn test_requests_within_bounds_still_resize() {
        let output = transformer().transform(&jpeg_fixture(1, 2000), 4, 0).unwrap();
        assert_eq!(decode(&output).dimensions(), (4, 8000));
    }

    #[test]
    fn test_decode_limits_reject_large_sources() {
        let mut config = ResizerConfig::default();
        config.max_source_dimension = 64;
        let bounded = ImageTransformer::new(&config);

        let err = bounded.transform(&jpeg_fixture(100, 50), 10, 10).unwrap_err();
        assert!(matches!(err, TransformError::Limits(_)), "unexpected error: {err}");
        assert!(bounded.transform(&jpeg_fixture(64, 32), 10, 10).is_ok());

        let mut config = ResizerConfig::default();
        config.max_decode_alloc = 1024;
        let starved = ImageTransformer::new(&config);
        let err = starved.transform(&jpeg_fixture(100, 100), 10, 10).unwrap_err();
        assert!(matches!(err, TransformError::Limits(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_transform_blocking() {
        let data = Bytes::from(jpeg_fixture(200, 100));
        let output = transformer().transform_blocking(data, 100, 0).await.unwrap();
        assert_eq!(decode(&output).dimensions(), (100, 50));
    }
}
