//! Filesystem-backed artifact stores.
//!
//! Two independent [`CacheStore`]s exist per configuration, bundled as
//! [`CacheStores`]:
//!
//! - **transforms**: persisted transform output, one file per
//!   (source, spec hash) pair.
//! - **runtime**: ephemeral copies of remotely-sourced images, one file per
//!   remote source.
//!
//! They never share a root (enforced by config validation), so they never
//! share paths.
//!
//! # Layout
//!
//! There is no index beyond the filesystem. An artifact lives at
//!
//! ```text
//! <root>/<volume>/<source key components…>/<spec hash>
//! ```
//!
//! which is a pure function of `(source, spec hash)`. Re-generating the same
//! pair overwrites in place. Key components that could escape the root
//! (`..`, `.`, empty) are dropped; a volume id made of one becomes `_`.
//!
//! # Concurrency
//!
//! Writes go to a sibling temporary file and are renamed into place, so
//! concurrent writers of the same path are last-writer-wins and readers never
//! see a torn file. Each store carries an `RwLock<()>`: writes take the
//! shared side, [`CacheStore::clear`] takes the exclusive side for the whole
//! delete sweep, so a clear never interleaves with a write.

use crate::artifact::{SourceRef, TransformArtifact};
use crate::config::CacheConfig;
use crate::imaging::{ImageCodec, TargetGeometry};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const TRANSFORMS_HANDLE: &str = "transforms";
pub const RUNTIME_HANDLE: &str = "runtime";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cached file {} is unreadable: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn walk(root: &Path, err: walkdir::Error) -> Self {
        let path = err.path().unwrap_or(root).to_path_buf();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("filesystem loop"));
        CacheError::Io { path, source }
    }
}

/// Distinguishes concurrent temp files from the same process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A content-addressed directory of cached files.
#[derive(Debug)]
pub struct CacheStore {
    handle: &'static str,
    root: PathBuf,
    lock: RwLock<()>,
}

impl CacheStore {
    pub fn new(handle: &'static str, root: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            root: root.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn handle(&self) -> &'static str {
        self.handle
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a source's files: `<root>/<volume>/<key components…>`.
    fn source_dir(&self, source: &SourceRef) -> PathBuf {
        let volume = path_component(&source.volume).unwrap_or_else(|| "_".to_string());
        let mut dir = self.root.join(volume);
        for part in source.key.split('/').filter_map(path_component) {
            dir.push(part);
        }
        dir
    }

    /// Deterministic path of the artifact for `(source, spec_hash)`.
    pub fn artifact_path(&self, source: &SourceRef, spec_hash: &str) -> PathBuf {
        self.source_dir(source).join(sanitize_component(spec_hash))
    }

    /// Write `bytes` as the stored form of `artifact`, replacing any
    /// previous file at the same path.
    pub fn put(&self, artifact: TransformArtifact, bytes: &[u8]) -> Result<TransformArtifact, CacheError> {
        let path = self.artifact_path(&artifact.source, &artifact.spec_hash);
        {
            let _shared = self.lock.read().unwrap_or_else(PoisonError::into_inner);
            write_atomic(&path, bytes)?;
        }
        debug!(store = self.handle, path = %path.display(), bytes = bytes.len(), "stored artifact");
        Ok(TransformArtifact {
            stored_path: Some(path),
            byte_size: bytes.len() as u64,
            created_at: SystemTime::now(),
            ..artifact
        })
    }

    /// Look up the artifact for `(source, spec_hash)`.
    ///
    /// Geometry and mime type are probed from the stored file.
    pub fn get(
        &self,
        source: &SourceRef,
        spec_hash: &str,
        codec: &dyn ImageCodec,
    ) -> Result<Option<TransformArtifact>, CacheError> {
        let path = self.artifact_path(source, spec_hash);
        let meta = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let info = codec.probe(&path).map_err(|e| CacheError::Unreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(TransformArtifact {
            source: source.clone(),
            spec_hash: spec_hash.to_string(),
            geometry: TargetGeometry {
                width: info.width,
                height: info.height,
            },
            byte_size: meta.len(),
            mime_type: info.mime_type.map(String::from),
            created_at: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            stored_path: Some(path),
        }))
    }

    /// Stored bytes for `(source, spec_hash)`, if present.
    pub fn load(&self, source: &SourceRef, spec_hash: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.artifact_path(source, spec_hash);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Path a source's own bytes are kept at (runtime tier).
    pub fn source_path(&self, source: &SourceRef) -> PathBuf {
        self.source_dir(source)
    }

    /// Keep a copy of a source's bytes, e.g. a fetched remote image.
    pub fn store_source(&self, source: &SourceRef, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.source_path(source);
        {
            let _shared = self.lock.read().unwrap_or_else(PoisonError::into_inner);
            write_atomic(&path, bytes)?;
        }
        debug!(store = self.handle, source = %source, bytes = bytes.len(), "stored source copy");
        Ok(path)
    }

    /// Previously stored copy of a source, if still on disk.
    pub fn cached_source(&self, source: &SourceRef) -> Option<PathBuf> {
        let path = self.source_path(source);
        path.is_file().then_some(path)
    }

    /// Whether the root exists. A root that exists but is not a directory is
    /// an error, not an empty store.
    fn root_is_dir(&self) -> Result<bool, CacheError> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(CacheError::io(
                &self.root,
                io::Error::new(io::ErrorKind::NotADirectory, "cache root is not a directory"),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&self.root, e)),
        }
    }

    /// Number of regular files under the root, recursively.
    ///
    /// A missing root counts as empty.
    pub fn count(&self) -> Result<usize, CacheError> {
        if !self.root_is_dir()? {
            return Ok(0);
        }
        let mut files = 0;
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| CacheError::walk(&self.root, e))?;
            if entry.file_type().is_file() {
                files += 1;
            }
        }
        Ok(files)
    }

    /// Delete everything under the root and return how many regular files
    /// were removed. The root itself stays.
    ///
    /// A missing root removes nothing. Filesystem errors, including a root
    /// that is not a directory, abort the sweep and propagate.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let _exclusive = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        if !self.root_is_dir()? {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let entry = entry.map_err(|e| CacheError::walk(&self.root, e))?;
            let path = entry.path();
            let file_type = entry.file_type();
            if file_type.is_dir() {
                std::fs::remove_dir(path).map_err(|e| CacheError::io(path, e))?;
            } else {
                std::fs::remove_file(path).map_err(|e| CacheError::io(path, e))?;
                if file_type.is_file() {
                    removed += 1;
                }
            }
        }
        info!(store = self.handle, removed, "cache cleared");
        Ok(removed)
    }
}

/// The two cache tiers of one configuration.
#[derive(Debug)]
pub struct CacheStores {
    pub transforms: CacheStore,
    pub runtime: CacheStore,
}

impl CacheStores {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            transforms: CacheStore::new(TRANSFORMS_HANDLE, &config.transforms),
            runtime: CacheStore::new(RUNTIME_HANDLE, &config.runtime),
        }
    }
}

/// `part` as a single safe path component, or `None` for `""`, `.` and `..`.
fn path_component(part: &str) -> Option<String> {
    match part {
        "" | "." | ".." => None,
        part => Some(sanitize_component(part)),
    }
}

/// Replace characters that are unsafe in a single path component.
fn sanitize_component(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Write via a sibling temp file and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(
        ".{name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(CacheError::io(&tmp, e));
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        CacheError::io(path, e)
    })
}
