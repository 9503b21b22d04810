//! Configuration module.
//!
//! Handles loading, validating, and merging `imager.toml`. There is exactly
//! one [`Config`] per process: it is built once by [`load_config`] and passed
//! by reference to every component that needs it. Nothing reads settings
//! from global state.
//!
//! ## Config File Location
//!
//! `imager.toml` lives in the config directory (`--config-dir`, default the
//! current directory). Relative paths inside it are resolved against that
//! directory.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! allow_upscale = true      # May transforms exceed the source size?
//! engine = "standard"       # "standard" or "extended" (more effects)
//!
//! [cache]
//! transforms = "imager/transforms"  # Persisted transform output
//! runtime = "imager/runtime"        # Copies of remotely-sourced images
//!
//! [output]
//! format = "jpg"            # jpg, png, webp or avif
//! quality = 80              # Lossy quality (1-100)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [transforms.thumb]        # A named preset
//! width = 300
//! height = 300
//! mode = "crop"             # crop, fit or stretch
//! effects = { grayscale = true }
//!
//! [volumes.photos]          # A volume and its configured presets
//! path = "content/photos"
//! remote = ["https://cdn.example.com/banner.jpg"]
//! transforms = ["thumb"]
//! ```
//!
//! ## Partial Configuration
//!
//! The file is sparse: stock defaults are merged key-by-key with whatever
//! the file sets. Unknown keys are rejected to catch typos early.

use crate::artifact::SourceRef;
use crate::imaging::{BackendKind, OutputFormat, Quality, ResolvedTransform, TransformSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the config file inside the config directory.
pub const CONFIG_FILENAME: &str = "imager.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `imager.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Global upscale policy; presets may override it.
    pub allow_upscale: bool,
    /// Which imaging engine renders transforms.
    pub engine: BackendKind,
    /// Roots of the two cache tiers.
    pub cache: CacheConfig,
    /// Encoding defaults for presets that don't set their own.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Named transform presets.
    pub transforms: BTreeMap<String, TransformSpec>,
    /// Volumes by id.
    pub volumes: BTreeMap<String, VolumeConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_upscale: true,
            engine: BackendKind::default(),
            cache: CacheConfig::default(),
            output: OutputConfig::default(),
            processing: ProcessingConfig::default(),
            transforms: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validate config values and cross references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        if !(1..=100).contains(&self.output.quality) {
            return invalid("output.quality must be 1-100".into());
        }
        let (t, r) = (
            normalize_lexically(&self.cache.transforms),
            normalize_lexically(&self.cache.runtime),
        );
        if t.starts_with(&r) || r.starts_with(&t) {
            return invalid("cache.transforms and cache.runtime must be separate directories".into());
        }

        for (name, spec) in &self.transforms {
            if spec.width == Some(0) || spec.height == Some(0) {
                return invalid(format!("transforms.{name}: width and height must be positive"));
            }
            if let Some(ratio) = spec.ratio
                && !(ratio.is_finite() && ratio > 0.0)
            {
                return invalid(format!("transforms.{name}.ratio must be positive"));
            }
            if let Some(q) = spec.quality
                && !(1..=100).contains(&q)
            {
                return invalid(format!("transforms.{name}.quality must be 1-100"));
            }
        }

        for (id, volume) in &self.volumes {
            if matches!(id.as_str(), "" | "." | "..") || id.contains(['/', '\\']) {
                return invalid(format!("volumes.{id}: volume ids must be a plain name"));
            }
            if volume.path.is_none() && volume.remote.is_empty() {
                return invalid(format!("volumes.{id} needs a path or remote URLs"));
            }
            for preset in &volume.transforms {
                if !self.transforms.contains_key(preset) {
                    return invalid(format!("volumes.{id} references unknown transform '{preset}'"));
                }
            }
            for url in &volume.remote {
                if let Err(e) = SourceRef::remote(id, url) {
                    return invalid(format!("volumes.{id}: {e}"));
                }
            }
        }
        Ok(())
    }

    /// A named preset with every default pinned, or `None` if unknown.
    pub fn resolve_transform(&self, name: &str) -> Option<ResolvedTransform> {
        let spec = self.transforms.get(name)?;
        Some(ResolvedTransform {
            name: name.to_string(),
            spec: spec.clone(),
            format: spec.format.unwrap_or(self.output.format),
            quality: Quality::new(spec.quality.unwrap_or(self.output.quality)),
            allow_upscale: spec.allow_upscale.unwrap_or(self.allow_upscale),
        })
    }

    /// Make relative paths relative to `base`.
    fn resolve_paths(&mut self, base: &Path) {
        let absolute = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        absolute(&mut self.cache.transforms);
        absolute(&mut self.cache.runtime);
        for volume in self.volumes.values_mut() {
            if let Some(path) = volume.path.as_mut() {
                absolute(path);
            }
        }
    }
}

/// Roots of the two cache tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Persisted transform output.
    pub transforms: PathBuf,
    /// Ephemeral copies of remotely-sourced images.
    pub runtime: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            transforms: PathBuf::from("imager/transforms"),
            runtime: PathBuf::from("imager/runtime"),
        }
    }
}

/// Encoding defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Lossy encoding quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default().value(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// One volume: local directory and/or remote URLs, plus its presets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeConfig {
    pub path: Option<PathBuf>,
    pub remote: Vec<String>,
    /// Preset names generated when a run uses per-volume configuration.
    pub transforms: Vec<String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `imager.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    Ok(Some(toml::from_str(&content)?))
}

fn merge_into_config(base: toml::Value, overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(base: toml::Value, overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let config = merge_into_config(base, overlay)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `imager.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// resolves relative paths against `dir`, then validates the resolved paths.
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    let mut config = merge_into_config(base, overlay)?;
    config.resolve_paths(dir);
    config.validate()?;
    Ok(config)
}

/// Drop `.` components and fold `..` into its parent, without touching the
/// filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Returns a fully-commented stock `imager.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Imager Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Relative paths are resolved against the directory holding this file.
# Unknown keys will cause an error.

# May a transform produce an image larger than its source?
# Presets can override this with their own `allow_upscale`.
allow_upscale = true

# Imaging engine: "standard" or "extended".
# Only the extended engine renders sepia, posterize and oilpaint.
engine = "standard"

# ---------------------------------------------------------------------------
# Cache tiers
# ---------------------------------------------------------------------------
[cache]
# Persisted transform output.
transforms = "imager/transforms"

# Copies of remotely-sourced images. Must not overlap with `transforms`.
runtime = "imager/runtime"

# ---------------------------------------------------------------------------
# Encoding defaults
# ---------------------------------------------------------------------------
[output]
# jpg, png, webp (lossless) or avif.
format = "jpg"

# Lossy encoding quality (1 = worst, 100 = best).
quality = 80

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Transform presets
# ---------------------------------------------------------------------------
# [transforms.thumb]
# width = 300
# height = 300
# mode = "crop"             # crop (cover), fit (inside box) or stretch
# ratio = 1.5               # width/height, used when only one side is set
# format = "webp"           # overrides [output] format
# quality = 70              # overrides [output] quality
# allow_upscale = false     # overrides the global setting
#
# [transforms.thumb.effects]  # applied in the order written
# grayscale = true
# sharpen = [0.5, 2]        # sigma, threshold

# ---------------------------------------------------------------------------
# Volumes
# ---------------------------------------------------------------------------
# [volumes.photos]
# path = "content/photos"
# remote = ["https://cdn.example.com/banner.jpg"]
# transforms = ["thumb"]    # presets generated with --configured
"##
}
