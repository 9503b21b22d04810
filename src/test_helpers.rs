//! Shared test utilities for the imager test suite.
//!
//! Synthetic images, a PNG fixture writer, and [`MockCodec`], a codec double
//! that reads plain-text fixtures and records every call.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! std::fs::write(&path, "800x600").unwrap();
//! let codec = MockCodec::new();
//! let info = codec.probe(&path).unwrap();
//! assert_eq!((info.width, info.height), (800, 600));
//! assert_eq!(codec.get_operations(), vec![RecordedOp::Probe(path)]);
//! ```

use crate::imaging::{CodecError, ImageCodec, ImageInfo, OutputFormat, Quality};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient test image; every pixel differs from its neighbours.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16 % 256) as u8, (y * 16 % 256) as u8, 128])
    }))
}

/// Create a small valid PNG file with the given dimensions.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    PngEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Recording codec
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Probe(PathBuf),
    Decode(PathBuf),
    Encode {
        width: u32,
        height: u32,
        format: OutputFormat,
        quality: u32,
    },
}

/// Codec that reads plain-text fixtures and records every call.
///
/// A fixture file holds `WIDTHxHEIGHT` (optionally prefixed by
/// `ext:`, which is what [`MockCodec::encode`] writes). Anything else
/// fails to probe and decode, so `std::fs::write(p, "corrupt")` is a
/// corrupt image.
#[derive(Default)]
pub struct MockCodec {
    pub operations: Mutex<Vec<RecordedOp>>,
}

impl MockCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_operations(&self) -> Vec<RecordedOp> {
        self.operations.lock().unwrap().clone()
    }

    fn read_fixture(path: &Path) -> Result<(Option<OutputFormat>, u32, u32), CodecError> {
        let text = std::fs::read_to_string(path)?;
        let text = text.trim();
        let (format, dims) = match text.split_once(':') {
            Some((ext, dims)) => (ext.parse::<OutputFormat>().ok(), dims),
            None => (None, text),
        };
        let parsed = dims
            .split_once('x')
            .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
        match parsed {
            Some((w, h)) => Ok((format, w, h)),
            None => Err(CodecError::Decode(format!(
                "not an image: {}",
                path.display()
            ))),
        }
    }
}

impl ImageCodec for MockCodec {
    fn probe(&self, path: &Path) -> Result<ImageInfo, CodecError> {
        self.operations
            .lock()
            .unwrap()
            .push(RecordedOp::Probe(path.to_path_buf()));
        let (format, width, height) = Self::read_fixture(path)?;
        Ok(ImageInfo {
            width,
            height,
            mime_type: format.map(OutputFormat::mime_type),
        })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError> {
        self.operations
            .lock()
            .unwrap()
            .push(RecordedOp::Decode(path.to_path_buf()));
        let (_, width, height) = Self::read_fixture(path)?;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(
            width,
            height,
            |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 64]),
        )))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        self.operations.lock().unwrap().push(RecordedOp::Encode {
            width: image.width(),
            height: image.height(),
            format,
            quality: quality.value(),
        });
        Ok(format!("{format}:{}x{}", image.width(), image.height()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // MockCodec
    // =========================================================================

    #[test]
    fn mock_reads_fixture_and_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        std::fs::write(&path, "40x30").unwrap();

        let codec = MockCodec::new();
        let img = codec.decode(&path).unwrap();
        let bytes = codec.encode(&img, OutputFormat::Png, Quality::new(90)).unwrap();
        assert_eq!(bytes, b"png:40x30");

        assert_eq!(
            codec.get_operations(),
            vec![
                RecordedOp::Decode(path.clone()),
                RecordedOp::Encode {
                    width: 40,
                    height: 30,
                    format: OutputFormat::Png,
                    quality: 90
                },
            ]
        );
    }

    #[test]
    fn mock_corrupt_fixture_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.jpg");
        std::fs::write(&path, "corrupt").unwrap();
        assert!(matches!(
            MockCodec::new().probe(&path),
            Err(CodecError::Decode(_))
        ));
    }
}
