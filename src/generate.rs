//! Bulk transform generation.
//!
//! A run renders every applicable (volume × preset × source image) item and
//! stores the result in the transforms cache tier.
//!
//! ## Phases
//!
//! 1. **Validate**: at least one volume, and either per-volume presets or
//!    at least one explicit preset name. Failing here touches nothing.
//! 2. **Plan**: list every volume up front. A volume that cannot be listed
//!    aborts the whole run. Unknown preset names are recorded as errors and
//!    skipped.
//! 3. **Execute**: items run in parallel on the rayon pool. Each item
//!    probes and decodes a fresh copy of its source, renders, and writes to
//!    the store. A failing item is recorded with its volume, preset, and
//!    source, and the run moves on.
//!
//! Errors come back in plan order (volume, then preset, then discovery
//! order), since rayon's indexed `collect` preserves it.
//!
//! ## Cancellation
//!
//! A [`CancellationToken`] is checked before each item. Items not yet
//! started are skipped; the result keeps everything done so far, reports
//! `succeeded = false`, and ends with [`CANCELLED`].
//!
//! ## Remote sources
//!
//! Remote images are fetched once through the [`RemoteFetcher`] and kept in
//! the runtime cache tier; later items and later runs reuse that copy.

use crate::artifact::{SourceImage, SourceLocation, SourceRef, TransformArtifact};
use crate::cache::{CacheError, CacheStores};
use crate::config::Config;
use crate::imaging::{ImageCodec, RenderError, ResolvedTransform, render};
use crate::volumes::{RemoteFetcher, SourceError, Volumes};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{info, warn};

pub const NO_VOLUMES: &str = "No volumes selected.";
pub const NO_TRANSFORMS: &str = "No transforms selected.";
pub const CANCELLED: &str = "Generation cancelled.";

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("{}", .0.join(" "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Failure of a single item; recorded, never propagated.
#[derive(Error, Debug)]
enum ItemError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What to generate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    pub volumes: Vec<String>,
    /// Use each volume's own configured presets instead of `transforms`.
    pub use_configured: bool,
    pub transforms: Vec<String>,
}

impl GenerateRequest {
    /// Every problem with the request; both messages when both inputs are
    /// missing.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.volumes.is_empty() {
            errors.push(NO_VOLUMES.to_string());
        }
        if !self.use_configured && self.transforms.is_empty() {
            errors.push(NO_TRANSFORMS.to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Outcome of a run that got past validation and planning.
///
/// `succeeded` is true only when every item was generated: any item error
/// makes it false, even though the other items' artifacts are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkGenerationResult {
    pub succeeded: bool,
    pub errors: Vec<String>,
    /// Artifacts written during this run.
    pub generated: usize,
}

/// Shared flag to stop a run between items.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress reported while a run executes.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateEvent {
    VolumePlanned {
        volume: String,
        images: usize,
        transforms: Vec<String>,
    },
    ItemGenerated {
        volume: String,
        transform: String,
        source: String,
        width: u32,
        height: u32,
        bytes: u64,
    },
    ItemFailed {
        volume: String,
        transform: String,
        source: String,
        error: String,
    },
}

struct WorkItem {
    transform: Arc<ResolvedTransform>,
    source: SourceRef,
}

enum ItemOutcome {
    Generated,
    Failed(String),
    Cancelled,
}

/// One bulk generation over borrowed collaborators.
pub struct BulkGenerationJob<'a> {
    config: &'a Config,
    volumes: &'a dyn Volumes,
    codec: &'a dyn ImageCodec,
    fetcher: &'a dyn RemoteFetcher,
    stores: &'a CacheStores,
    cancel: CancellationToken,
    events: Option<Sender<GenerateEvent>>,
}

impl<'a> BulkGenerationJob<'a> {
    pub fn new(
        config: &'a Config,
        volumes: &'a dyn Volumes,
        codec: &'a dyn ImageCodec,
        fetcher: &'a dyn RemoteFetcher,
        stores: &'a CacheStores,
    ) -> Self {
        Self {
            config,
            volumes,
            codec,
            fetcher,
            stores,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, events: Sender<GenerateEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: GenerateEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub fn run(&self, request: &GenerateRequest) -> Result<BulkGenerationResult, GenerateError> {
        request.validate().map_err(GenerateError::Validation)?;

        let (items, mut errors) = self.plan(request)?;
        info!(items = items.len(), volumes = request.volumes.len(), "generating transforms");

        let outcomes: Vec<ItemOutcome> = items
            .par_iter()
            .map(|item| {
                if self.cancel.is_cancelled() {
                    return ItemOutcome::Cancelled;
                }
                match self.run_item(item) {
                    Ok(_) => ItemOutcome::Generated,
                    Err(e) => ItemOutcome::Failed(format!(
                        "Volume '{}', transform '{}', source '{}': {e}",
                        item.source.volume, item.transform.name, item.source.key
                    )),
                }
            })
            .collect();

        let mut generated = 0;
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Generated => generated += 1,
                ItemOutcome::Failed(message) => errors.push(message),
                ItemOutcome::Cancelled => cancelled = true,
            }
        }
        if cancelled || self.cancel.is_cancelled() {
            errors.push(CANCELLED.to_string());
        }

        info!(generated, failed = errors.len(), cancelled, "generation finished");
        Ok(BulkGenerationResult {
            succeeded: errors.is_empty(),
            errors,
            generated,
        })
    }

    /// List every volume and expand presets into work items.
    fn plan(&self, request: &GenerateRequest) -> Result<(Vec<WorkItem>, Vec<String>), GenerateError> {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        let mut seen = Vec::new();

        for volume in &request.volumes {
            if seen.contains(&volume) {
                continue;
            }
            seen.push(volume);

            let sources = self.volumes.list_images(volume)?;
            let names = if request.use_configured {
                self.volumes.configured_presets(volume)?
            } else {
                request.transforms.clone()
            };

            let mut planned = Vec::new();
            for name in &names {
                let Some(transform) = self.config.resolve_transform(name) else {
                    errors.push(format!("Volume '{volume}': unknown transform '{name}'."));
                    continue;
                };
                let transform = Arc::new(transform);
                items.extend(sources.iter().map(|source| WorkItem {
                    transform: Arc::clone(&transform),
                    source: source.clone(),
                }));
                planned.push(name.clone());
            }

            self.emit(GenerateEvent::VolumePlanned {
                volume: volume.clone(),
                images: sources.len(),
                transforms: planned,
            });
        }
        Ok((items, errors))
    }

    fn run_item(&self, item: &WorkItem) -> Result<TransformArtifact, ItemError> {
        let result = self.render_item(item);
        let (volume, transform, source) = (
            item.source.volume.clone(),
            item.transform.name.clone(),
            item.source.key.clone(),
        );
        match &result {
            Ok(artifact) => self.emit(GenerateEvent::ItemGenerated {
                volume,
                transform,
                source,
                width: artifact.geometry.width,
                height: artifact.geometry.height,
                bytes: artifact.byte_size,
            }),
            Err(e) => {
                warn!(volume = %volume, transform = %transform, source = %source, error = %e, "transform failed");
                self.emit(GenerateEvent::ItemFailed {
                    volume,
                    transform,
                    source,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn render_item(&self, item: &WorkItem) -> Result<TransformArtifact, ItemError> {
        let path = self.materialize(&item.source)?;
        let image = SourceImage::open(item.source.clone(), &path, self.codec)?;
        let rendered = render(self.codec, &image.path, &item.transform, self.config.engine)?;
        let artifact = TransformArtifact::pending(image.reference, &item.transform, rendered.geometry);
        Ok(self.stores.transforms.put(artifact, &rendered.bytes)?)
    }

    /// Local path holding the source's bytes, fetching remote sources into
    /// the runtime tier on first use.
    fn materialize(&self, source: &SourceRef) -> Result<PathBuf, ItemError> {
        match &source.location {
            SourceLocation::Local(path) => Ok(path.clone()),
            SourceLocation::Remote(url) => {
                if let Some(path) = self.stores.runtime.cached_source(source) {
                    return Ok(path);
                }
                let bytes = self.fetcher.fetch(url)?;
                Ok(self.stores.runtime.store_source(source, &bytes)?)
            }
        }
    }
}
