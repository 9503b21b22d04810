//! Parameter types for image transforms.
//!
//! These structs describe *what* to produce, not *how* to produce it. A
//! [`TransformSpec`] is the user-facing recipe (as written in `imager.toml`);
//! a [`ResolvedTransform`] is that recipe with every default filled in from
//! the global config, which is what gets hashed into the cache key.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`CropMode`]: How a width+height box is applied: `crop`, `fit` or `stretch`.
//! - [`OutputFormat`]: Encoded artifact format.
//! - [`TransformSpec`]: Geometry + effects recipe for a named preset.
//! - [`ResolvedTransform`]: A spec with format, quality and upscale policy pinned.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// How a transform with both width and height maps onto the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// Cover the box exactly, cropping whatever overflows.
    #[default]
    Crop,
    /// Scale the whole source to fit inside the box, keeping source aspect.
    Fit,
    /// Scale to the exact box, distorting if the aspect differs.
    Stretch,
}

impl CropMode {
    fn tag(self) -> &'static str {
        match self {
            CropMode::Crop => "crop",
            CropMode::Fit => "fit",
            CropMode::Stretch => "stretch",
        }
    }
}

/// Encoded format of a transform artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpeg")]
    Jpg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "avif" => Ok(OutputFormat::Avif),
            other => Err(format!("unsupported output format '{other}'")),
        }
    }
}

/// A named transform preset as written in config.
///
/// Every field is optional. A spec with neither `width` nor `height` keeps
/// the source dimensions and only re-encodes (and applies effects).
/// `effects` is an ordered table of effect name to loosely-typed parameter;
/// [`effects`](super::effects) turns each entry into a typed effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Width / height ratio used when only one side is given.
    pub ratio: Option<f64>,
    pub mode: CropMode,
    pub format: Option<OutputFormat>,
    pub quality: Option<u32>,
    /// Per-preset override of the global `allow_upscale`.
    pub allow_upscale: Option<bool>,
    #[serde(skip_serializing_if = "toml::Table::is_empty")]
    pub effects: toml::Table,
}

impl TransformSpec {
    pub fn sized(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

/// A transform spec with every default pinned, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTransform {
    pub name: String,
    pub spec: TransformSpec,
    pub format: OutputFormat,
    pub quality: Quality,
    pub allow_upscale: bool,
}

impl ResolvedTransform {
    /// SHA-256 of the normalized fields, hex encoded.
    ///
    /// The preset name is not part of the hash: two presets with identical
    /// settings share artifacts. Effects are hashed in application order.
    pub fn hash(&self) -> String {
        let spec = &self.spec;
        let mut hasher = Sha256::new();
        hasher.update(b"transform\0");
        hash_opt_u32(&mut hasher, spec.width);
        hash_opt_u32(&mut hasher, spec.height);
        match spec.ratio {
            Some(r) => {
                hasher.update(b"\x01");
                hasher.update(r.to_le_bytes());
            }
            None => hasher.update(b"\x00"),
        }
        hasher.update(spec.mode.tag().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.format.extension().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.quality.value().to_le_bytes());
        hasher.update([u8::from(self.allow_upscale)]);
        for (name, value) in &spec.effects {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b"\0");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn hash_opt_u32(hasher: &mut Sha256, value: Option<u32>) {
    match value {
        Some(v) => {
            hasher.update(b"\x01");
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update(b"\x00"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(spec: TransformSpec) -> ResolvedTransform {
        ResolvedTransform {
            name: "thumb".into(),
            spec,
            format: OutputFormat::Jpg,
            quality: Quality::default(),
            allow_upscale: true,
        }
    }

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn output_format_parses_aliases() {
        assert_eq!("JPEG".parse::<OutputFormat>(), Ok(OutputFormat::Jpg));
        assert_eq!("webp".parse::<OutputFormat>(), Ok(OutputFormat::Webp));
        assert!("gif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn spec_parses_from_toml() {
        let spec: TransformSpec = toml::from_str(
            r#"
width = 300
mode = "fit"
format = "webp"

[effects]
grayscale = true
blur = 1.5
"#,
        )
        .unwrap();
        assert_eq!(spec.width, Some(300));
        assert_eq!(spec.height, None);
        assert_eq!(spec.mode, CropMode::Fit);
        assert_eq!(spec.format, Some(OutputFormat::Webp));
        let names: Vec<&str> = spec.effects.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["grayscale", "blur"]);
    }

    #[test]
    fn spec_rejects_unknown_keys() {
        let result: Result<TransformSpec, _> = toml::from_str("widht = 300");
        assert!(result.is_err());
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    #[test]
    fn hash_is_deterministic() {
        let a = resolved(TransformSpec::sized(Some(200), Some(100)));
        let b = resolved(TransformSpec::sized(Some(200), Some(100)));
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn hash_ignores_preset_name() {
        let a = resolved(TransformSpec::sized(Some(200), None));
        let mut b = a.clone();
        b.name = "other".into();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_varies_with_geometry() {
        let a = resolved(TransformSpec::sized(Some(200), None));
        let b = resolved(TransformSpec::sized(None, Some(200)));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_varies_with_upscale_and_quality() {
        let a = resolved(TransformSpec::sized(Some(200), None));
        let mut b = a.clone();
        b.allow_upscale = false;
        assert_ne!(a.hash(), b.hash());

        let mut c = a.clone();
        c.quality = Quality::new(60);
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn hash_varies_with_effect_order() {
        let first: TransformSpec = toml::from_str(
            r#"
[effects]
grayscale = true
blur = 2
"#,
        )
        .unwrap();
        let second: TransformSpec = toml::from_str(
            r#"
[effects]
blur = 2
grayscale = true
"#,
        )
        .unwrap();
        assert_ne!(resolved(first).hash(), resolved(second).hash());
    }
}
