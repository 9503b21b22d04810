//! Volume listing and per-volume preset lookup.
//!
//! A volume is a named collection of source images: a local directory tree,
//! a list of remote URLs, or both. [`Volumes`] is the seam the bulk job
//! lists through; [`FsVolumes`] is the config-backed implementation.
//!
//! Remote bytes come through [`RemoteFetcher`], an opaque and possibly
//! blocking collaborator. The bulk job keeps fetched copies in the runtime
//! cache tier.

use crate::artifact::SourceRef;
use crate::config::Config;
use crate::imaging::CodecError;
use crate::imaging::codec::is_supported_input;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Unknown volume '{0}'")]
    UnknownVolume(String),
    #[error("Cannot list volume '{volume}': {reason}")]
    Listing { volume: String, reason: String },
    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("Invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },
}

/// Source discovery and preset configuration per volume.
pub trait Volumes: Sync {
    /// Every source image in the volume, in a stable order.
    fn list_images(&self, volume: &str) -> Result<Vec<SourceRef>, SourceError>;

    /// Names of the presets configured for the volume.
    fn configured_presets(&self, volume: &str) -> Result<Vec<String>, SourceError>;
}

/// Fetches the bytes of a remote source.
pub trait RemoteFetcher: Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// Fetcher for setups without network access: every fetch fails.
#[derive(Debug, Default)]
pub struct NoRemoteFetcher;

impl RemoteFetcher for NoRemoteFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::Fetch {
            url: url.to_string(),
            reason: "remote fetching is not enabled".into(),
        })
    }
}

/// Volumes described by `[volumes.<id>]` config sections.
///
/// Local images are discovered by walking `path` (sorted by file name,
/// hidden entries skipped, only decodable extensions); remote URLs follow in
/// config order.
pub struct FsVolumes<'a> {
    config: &'a Config,
}

impl<'a> FsVolumes<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Volume-relative key with `/` separators.
fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl Volumes for FsVolumes<'_> {
    fn list_images(&self, volume: &str) -> Result<Vec<SourceRef>, SourceError> {
        let cfg = self
            .config
            .volumes
            .get(volume)
            .ok_or_else(|| SourceError::UnknownVolume(volume.to_string()))?;
        let listing = |reason: String| SourceError::Listing {
            volume: volume.to_string(),
            reason,
        };

        let mut sources = Vec::new();
        if let Some(root) = &cfg.path {
            if !root.is_dir() {
                return Err(listing(format!("{} is not a directory", root.display())));
            }
            let walker = WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
            for entry in walker {
                let entry = entry.map_err(|e| listing(e.to_string()))?;
                if entry.file_type().is_file() && is_supported_input(entry.path()) {
                    sources.push(SourceRef::local(
                        volume,
                        relative_key(root, entry.path()),
                        entry.path(),
                    ));
                }
            }
        }
        for url in &cfg.remote {
            sources.push(SourceRef::remote(volume, url)?);
        }
        Ok(sources)
    }

    fn configured_presets(&self, volume: &str) -> Result<Vec<String>, SourceError> {
        self.config
            .volumes
            .get(volume)
            .map(|cfg| cfg.transforms.clone())
            .ok_or_else(|| SourceError::UnknownVolume(volume.to_string()))
    }
}
