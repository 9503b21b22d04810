//! Image processing: geometry, effects, codecs and rendering.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Probe** | `image::ImageReader` header read |
//! | **Resize** | `resize_to_fill` (crop) / `resize_exact` (fit, stretch), Lanczos3 |
//! | **Effects** | `image` built-ins ([`StandardEngine`]) or RGBA kernels ([`ExtendedEngine`]) |
//! | **Encode** | JPEG, PNG, lossless WebP, AVIF (rav1e) |
//!
//! The module is split into:
//! - **Geometry**: Pure target-box resolution (unit testable)
//! - **Parameters**: Transform specs and their cache hash
//! - **Engine**: [`ImageEngineHandle`] trait + the two engines
//! - **Effects**: Typed effects dispatched per engine
//! - **Codec**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Operations**: The render pipeline combining all of the above

pub mod codec;
pub mod effects;
pub mod engine;
mod geometry;
pub mod operations;
mod params;

pub use codec::{CodecError, ImageCodec, ImageInfo, RustCodec, supported_input_extensions};
pub use effects::{Effect, EffectError, EffectOutcome, SkipReason, apply_effect, apply_effects};
pub use engine::{BackendKind, ExtendedEngine, ImageEngineHandle, RawOp, StandardEngine};
pub use geometry::{GeometryError, TargetGeometry, resolve};
pub use operations::{RenderError, Rendered, render};
pub use params::{CropMode, OutputFormat, Quality, ResolvedTransform, TransformSpec};
