//! Decode and encode collaborator.
//!
//! Pixel-level codec work is kept behind [`ImageCodec`] so the rest of the
//! crate (geometry, effects, cache, bulk jobs) can be tested with the
//! recording `MockCodec` test double instead of real image files.
//!
//! ## Crate mapping ([`RustCodec`])
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe (dimensions, mime type) | `image::ImageReader::with_guessed_format` + `into_dimensions` (header only) |
//! | Probe (AVIF) | `avif-parse` container metadata, detected by `ftyp` brand or extension |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::params::{OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// What a header probe reveals without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// `None` when the container format could not be recognized.
    pub mime_type: Option<&'static str>,
}

/// Probe, decode and encode images.
///
/// `Sync` so one codec can be shared across rayon workers.
pub trait ImageCodec: Sync {
    /// Read dimensions (and, when recognizable, the mime type) from the header.
    fn probe(&self, path: &Path) -> Result<ImageInfo, CodecError>;

    /// Decode the whole file into memory.
    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError>;

    /// Encode to the given format.
    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Extensions whose decoders are compiled in.
///
/// AVIF is an output format only: the `image` crate's `"avif"` feature
/// enables the rav1e encoder, not a decoder.
const INPUT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Returns the set of source file extensions that can be decoded.
pub fn supported_input_extensions() -> &'static [&'static str] {
    INPUT_EXTENSIONS
}

pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| INPUT_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

/// Pure Rust codec using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default)]
pub struct RustCodec;

impl RustCodec {
    pub fn new() -> Self {
        Self
    }
}

fn mime_of(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Avif => Some("image/avif"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

/// AVIF brands of the ISO-BMFF `ftyp` box.
const AVIF_BRANDS: &[&[u8; 4]] = &[b"avif", b"avis"];

/// AVIF by extension, or by an `ftyp` box with an AVIF major brand (stored
/// artifacts carry no extension).
fn is_avif(path: &Path) -> Result<bool, CodecError> {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
    {
        return Ok(true);
    }
    let mut header = [0u8; 12];
    let mut file = std::fs::File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header[4..8] == b"ftyp" && AVIF_BRANDS.iter().any(|b| &header[8..12] == *b)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Dimensions from an AVIF file's container metadata (no pixel decode).
fn identify_avif(path: &Path) -> Result<ImageInfo, CodecError> {
    let data = std::fs::read(path)?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&data)).map_err(|e| {
        CodecError::Decode(format!("Failed to parse AVIF {}: {e:?}", path.display()))
    })?;
    let meta = avif.primary_item_metadata().map_err(|e| {
        CodecError::Decode(format!("Failed to read AVIF metadata {}: {e:?}", path.display()))
    })?;
    Ok(ImageInfo {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
        mime_type: Some("image/avif"),
    })
}

impl ImageCodec for RustCodec {
    fn probe(&self, path: &Path) -> Result<ImageInfo, CodecError> {
        if is_avif(path)? {
            return identify_avif(path);
        }
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let mime_type = reader.format().and_then(mime_of);
        let (width, height) = reader.into_dimensions().map_err(|e| {
            CodecError::Decode(format!("Failed to read dimensions of {}: {e}", path.display()))
        })?;
        Ok(ImageInfo {
            width,
            height,
            mime_type,
        })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, CodecError> {
        ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| CodecError::Decode(format!("Failed to decode {}: {e}", path.display())))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        let q = quality.value() as u8;
        let result = match format {
            // JPEG has no alpha channel
            OutputFormat::Jpg => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, q)),
            OutputFormat::Png => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(PngEncoder::new(&mut bytes)),
            OutputFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut bytes)),
            OutputFormat::Avif => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut bytes, 6, q)),
        };
        result.map_err(|e| CodecError::Encode(format!("{format} encode failed: {e}")))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_png;
    use image::RgbImage;

    // =========================================================================
    // RustCodec
    // =========================================================================

    #[test]
    fn supported_extensions_exclude_avif_input() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp"] {
            assert!(exts.contains(expected), "expected {expected}");
        }
        assert!(!exts.contains(&"avif"));
        assert!(is_supported_input(Path::new("a/B.JPG")));
        assert!(!is_supported_input(Path::new("a/b.txt")));
    }

    #[test]
    fn probe_synthetic_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.png");
        create_test_png(&path, 200, 150);

        let info = RustCodec::new().probe(&path).unwrap();
        assert_eq!((info.width, info.height), (200, 150));
        assert_eq!(info.mime_type, Some("image/png"));
    }

    #[test]
    fn probe_ignores_misleading_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("actually-png.jpg");
        create_test_png(&path, 10, 20);

        let info = RustCodec::new().probe(&path).unwrap();
        assert_eq!(info.mime_type, Some("image/png"));
    }

    #[test]
    fn probe_nonexistent_file_errors() {
        let result = RustCodec::new().probe(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(CodecError::Io(_))));
    }

    #[test]
    fn decode_garbage_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(RustCodec::new().decode(&path).is_err());
    }

    #[test]
    fn encode_each_format_and_probe_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let codec = RustCodec::new();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(32, 24, |x, y| {
            image::Rgb([x as u8 * 8, y as u8 * 8, 0])
        }));
        for format in [
            OutputFormat::Jpg,
            OutputFormat::Png,
            OutputFormat::Webp,
            OutputFormat::Avif,
        ] {
            let bytes = codec.encode(&img, format, Quality::new(70)).unwrap();
            assert!(!bytes.is_empty(), "{format} produced no bytes");
            let path = tmp.path().join(format!("out.{}", format.extension()));
            std::fs::write(&path, &bytes).unwrap();
            let info = codec.probe(&path).unwrap();
            assert_eq!((info.width, info.height), (32, 24));
            assert_eq!(info.mime_type, Some(format.mime_type()));
        }
    }

    #[test]
    fn avif_dimensions_without_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let codec = RustCodec::new();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 12, |x, y| {
            image::Rgb([x as u8 * 16, y as u8 * 16, 0])
        }));
        let path = tmp.path().join("3f2a9c");
        std::fs::write(&path, codec.encode(&img, OutputFormat::Avif, Quality::new(60)).unwrap()).unwrap();

        let info = codec.probe(&path).unwrap();
        assert_eq!((info.width, info.height), (16, 12));
        assert_eq!(info.mime_type, Some("image/avif"));
    }

    #[test]
    fn tiny_non_image_is_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("stub");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(RustCodec::new().probe(&path), Err(CodecError::Decode(_))));
    }
}
