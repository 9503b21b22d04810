//! Source images and transform artifacts.
//!
//! A [`SourceRef`] names an image inside a volume; a [`SourceImage`] is a
//! probed, readable source; a [`TransformArtifact`] describes one
//! transformed output, either already stored or about to be.

use crate::imaging::{CodecError, GeometryError, ImageCodec, ResolvedTransform, TargetGeometry, resolve};
use crate::volumes::SourceError;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use url::Url;

/// Where the bytes of a source come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(String),
}

/// Identity of a source image: volume plus a volume-relative key.
///
/// Keys use `/` separators regardless of platform. Remote sources get a
/// synthetic key `remote/<url-hash>/<filename>` so they never collide with
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRef {
    pub volume: String,
    pub key: String,
    pub location: SourceLocation,
}

impl SourceRef {
    pub fn local(volume: &str, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            volume: volume.to_string(),
            key: key.into(),
            location: SourceLocation::Local(path.into()),
        }
    }

    /// Reference a remote `http(s)` image.
    pub fn remote(volume: &str, url: &str) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("image")
            .to_string();
        let digest = format!("{:x}", Sha256::digest(parsed.as_str().as_bytes()));
        Ok(Self {
            volume: volume.to_string(),
            key: format!("remote/{}/{}", &digest[..16], name),
            location: SourceLocation::Remote(parsed.into()),
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.location, SourceLocation::Remote(_))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.volume, self.key)
    }
}

/// Unit for human-readable file sizes.
///
/// Parses case-insensitively; `k`, `m` and `g` are accepted for the
/// multi-byte units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    Kb,
    Mb,
    Gb,
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "b" => Ok(SizeUnit::B),
            "k" | "kb" => Ok(SizeUnit::Kb),
            "m" | "mb" => Ok(SizeUnit::Mb),
            "g" | "gb" => Ok(SizeUnit::Gb),
            other => Err(format!("unknown size unit '{other}'")),
        }
    }
}

impl SizeUnit {
    /// Parse `s`, treating anything unrecognized as plain bytes.
    pub fn parse_or_bytes(s: &str) -> Self {
        s.parse().unwrap_or(SizeUnit::B)
    }
}

/// `bytes` in `unit` (1024-based), rounded to `precision` decimals.
///
/// Bytes are returned as-is.
pub fn size_in(bytes: u64, unit: SizeUnit, precision: u32) -> f64 {
    let divisor = match unit {
        SizeUnit::B => return bytes as f64,
        SizeUnit::Kb => 1024f64,
        SizeUnit::Mb => 1024f64.powi(2),
        SizeUnit::Gb => 1024f64.powi(3),
    };
    let scale = 10f64.powi(precision.min(15) as i32);
    (bytes as f64 / divisor * scale).round() / scale
}

/// A readable, decodable source image.
///
/// Dimensions come from probing the file header, never from stored
/// metadata. Construction fails if the file is missing, not a regular file,
/// or not an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceImage {
    pub reference: SourceRef,
    /// Local file holding the bytes (for remote sources, the runtime cache copy).
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    /// `None` when the format is not recognized from the header; callers
    /// fall back to the extension.
    pub mime_type: Option<String>,
}

impl SourceImage {
    pub fn open(reference: SourceRef, path: &Path, codec: &dyn ImageCodec) -> Result<Self, SourceError> {
        let unreadable = |source: std::io::Error| SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let meta = std::fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(std::io::Error::other("not a regular file")));
        }
        let info = codec.probe(path).map_err(|source| match source {
            CodecError::Io(e) => unreadable(e),
            other => SourceError::Decode {
                path: path.to_path_buf(),
                source: other,
            },
        })?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(Self {
            reference,
            path: path.to_path_buf(),
            filename,
            extension,
            byte_size: meta.len(),
            width: info.width,
            height: info.height,
            mime_type: info.mime_type.map(String::from),
        })
    }

    pub fn size_in(&self, unit: SizeUnit, precision: u32) -> f64 {
        size_in(self.byte_size, unit, precision)
    }

    /// The file's bytes, standard base64 with padding.
    pub fn base64_encoded(&self) -> Result<String, SourceError> {
        let bytes = std::fs::read(&self.path).map_err(|source| SourceError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(BASE64_STANDARD.encode(bytes))
    }

    /// `data:` URI embedding the file. The media type is the probed mime
    /// type, or `image/<extension>` when the header was not recognized.
    pub fn data_uri(&self) -> Result<String, SourceError> {
        let mime = match &self.mime_type {
            Some(mime) => mime.clone(),
            None => format!("image/{}", self.extension),
        };
        Ok(format!("data:{mime};base64,{}", self.base64_encoded()?))
    }

    /// Output box this source would get under `transform`.
    pub fn geometry_for(&self, transform: &ResolvedTransform) -> Result<TargetGeometry, GeometryError> {
        resolve(self.width, self.height, &transform.spec, transform.allow_upscale)
    }
}

/// One transformed output of a (source, spec) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformArtifact {
    pub source: SourceRef,
    pub spec_hash: String,
    pub geometry: TargetGeometry,
    /// `None` until the artifact has been written to a store.
    pub stored_path: Option<PathBuf>,
    pub byte_size: u64,
    pub mime_type: Option<String>,
    pub created_at: SystemTime,
}

impl TransformArtifact {
    /// An artifact about to be written: everything but storage details.
    pub fn pending(source: SourceRef, transform: &ResolvedTransform, geometry: TargetGeometry) -> Self {
        Self {
            source,
            spec_hash: transform.hash(),
            geometry,
            stored_path: None,
            byte_size: 0,
            mime_type: Some(transform.format.mime_type().to_string()),
            created_at: SystemTime::now(),
        }
    }

    pub fn size_in(&self, unit: SizeUnit, precision: u32) -> f64 {
        size_in(self.byte_size, unit, precision)
    }
}

/// Describe the output of `transform` for `source` without rendering it.
///
/// Geometry comes from the probed source dimensions; the size is the
/// source's own size, as nothing has been encoded yet. Fails when the
/// source dimensions cannot produce a geometry.
pub fn describe_noop(
    source: &SourceImage,
    transform: &ResolvedTransform,
) -> Result<TransformArtifact, GeometryError> {
    let geometry = source.geometry_for(transform)?;
    Ok(TransformArtifact {
        byte_size: source.byte_size,
        ..TransformArtifact::pending(source.reference.clone(), transform, geometry)
    })
}
