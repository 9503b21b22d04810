//! # Imager
//!
//! Pre-generation and cache management for image transforms. A transform is a
//! named preset (target size, aspect ratio, crop mode, output format, quality
//! and an ordered list of effects) applied to every source image of a volume.
//! Results are cached on disk so a request layer can serve them without
//! rendering on demand.
//!
//! # Architecture
//!
//! ```text
//! UtilityFacade ──► BulkGenerationJob ──► plan (volume × preset × source)
//!       │                                    │
//!       │                                    ▼  rayon, per item
//!       │                    SourceImage::open ─► render ─► CacheStore::put
//!       │                                          │
//!       │                          resolve (geometry) + apply_effects
//!       ▼
//!   clear_cache / cache_counts ──► CacheStores { transforms, runtime }
//! ```
//!
//! Item failures never abort a run: they are collected, reported in plan
//! order, and turn the response's `success` flag off.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`utility`] | Operator entry point: generate transforms, clear caches, report counts |
//! | [`generate`] | Bulk job: request validation, planning, parallel execution, progress events |
//! | [`imaging`] | Geometry resolution, effect dispatch, engines, codec and the render pipeline |
//! | [`artifact`] | Source references, decoded source metadata, transform artifact descriptors |
//! | [`cache`] | Two-tier on-disk store: rendered transforms and runtime (fetched sources) |
//! | [`volumes`] | Volume listing (local directories, remote URLs) and per-volume presets |
//! | [`config`] | `imager.toml` loading, stock defaults, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content-Addressed Transforms
//!
//! A rendered transform is stored under its source's volume and key plus the
//! SHA-256 of the resolved preset. Renaming a preset does not invalidate its
//! outputs; changing any parameter does.
//!
//! ## Two Engines
//!
//! The standard engine covers the common effects. The extended engine adds
//! sepia, posterize and oil paint. An effect the selected engine cannot render
//! is skipped and logged, never an error.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Lanczos3) and encoding go through the `image` crate.
//! The binary has no system library dependencies.

pub mod artifact;
pub mod cache;
pub mod config;
pub mod generate;
pub mod imaging;
pub mod output;
pub mod utility;
pub mod volumes;

#[cfg(test)]
pub(crate) mod test_helpers;
