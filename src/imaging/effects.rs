//! Named visual effects.
//!
//! Effects arrive from config as an ordered table of name to loosely-typed
//! value (`blur = 1.5`, `grayscale = true`, `sharpen = [1.0, 2]`). Each entry
//! is parsed into an [`Effect`] with a typed parameter struct, then applied
//! to an [`ImageEngineHandle`]. Dispatch is two-level: name → variant, then
//! variant × [`BackendKind`] → raw operation.
//!
//! Effects are cosmetic, so problems degrade to [`EffectOutcome::Skipped`]
//! rather than failing the transform:
//!
//! | Situation | Outcome |
//! |---|---|
//! | unknown effect name | `Skipped(UnknownEffect)` |
//! | wrong parameter type or out of range | `Skipped(InvalidParameter)` |
//! | flag effect set to `false` | `Skipped(Disabled)` |
//! | effect not available on the active engine | `Skipped(UnsupportedBackend)` |
//!
//! | Effect | Parameter | Standard | Extended |
//! |---|---|---|---|
//! | `grayscale` | `true` | ✓ | ✓ |
//! | `negative` | `true` | ✓ | ✓ |
//! | `blur` | sigma `0 < s <= 100`, or `true` (1.0) | ✓ | ✓ |
//! | `sharpen` | sigma, `[sigma, threshold]`, or `true` | ✓ | ✓ |
//! | `brightness` | integer `-255..=255` | ✓ | ✓ |
//! | `contrast` | number `-100..=100` | ✓ | ✓ |
//! | `hue` | integer degrees | ✓ | ✓ |
//! | `sepia` | percent `0..=100`, or `true` (80) | – | ✓ |
//! | `posterize` | integer levels `2..=255` | – | ✓ |
//! | `oilpaint` | integer radius `1..=20` | – | ✓ |

use super::engine::{BackendKind, EngineError, ImageEngineHandle, RawOp};
use thiserror::Error;
use toml::Value;
use tracing::debug;

/// Engine failure while applying a parsed, supported effect.
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("effect '{effect}' failed: {source}")]
    Engine {
        effect: &'static str,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownEffect,
    InvalidParameter,
    Disabled,
    UnsupportedBackend(BackendKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    Applied,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    pub sigma: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpenParams {
    pub sigma: f32,
    pub threshold: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessParams {
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastParams {
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueParams {
    /// Normalized to `0..360`.
    pub degrees: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SepiaParams {
    /// 0.0–1.0
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosterizeParams {
    pub levels: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OilPaintParams {
    pub radius: u32,
}

/// Intensity buckets used by the oil-paint kernel.
const OIL_PAINT_LEVELS: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Grayscale,
    Negative,
    Blur(BlurParams),
    Sharpen(SharpenParams),
    Brightness(BrightnessParams),
    Contrast(ContrastParams),
    Hue(HueParams),
    Sepia(SepiaParams),
    Posterize(PosterizeParams),
    OilPaint(OilPaintParams),
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        _ => None,
    }
}

fn integer_in(value: &Value, min: i64, max: i64) -> Option<i64> {
    value.as_integer().filter(|i| (min..=max).contains(i))
}

fn flag(value: &Value) -> Result<(), SkipReason> {
    match value {
        Value::Boolean(true) => Ok(()),
        Value::Boolean(false) => Err(SkipReason::Disabled),
        _ => Err(SkipReason::InvalidParameter),
    }
}

impl Effect {
    /// Parse one config entry. The error side says why it will be skipped.
    pub fn parse(name: &str, value: &Value) -> Result<Effect, SkipReason> {
        use SkipReason::InvalidParameter;

        match name.to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" => flag(value).map(|_| Effect::Grayscale),
            "negative" => flag(value).map(|_| Effect::Negative),
            "blur" => {
                let sigma = match value {
                    Value::Boolean(false) => return Err(SkipReason::Disabled),
                    Value::Boolean(true) => 1.0,
                    v => number(v)
                        .filter(|s| *s > 0.0 && *s <= 100.0)
                        .ok_or(InvalidParameter)?,
                };
                Ok(Effect::Blur(BlurParams {
                    sigma: sigma as f32,
                }))
            }
            "sharpen" => {
                let (sigma, threshold) = match value {
                    Value::Boolean(false) => return Err(SkipReason::Disabled),
                    Value::Boolean(true) => (1.0, 0),
                    Value::Array(items) if items.len() == 2 => {
                        let sigma = number(&items[0]).ok_or(InvalidParameter)?;
                        let threshold = integer_in(&items[1], 0, 255).ok_or(InvalidParameter)?;
                        (sigma, threshold as i32)
                    }
                    v => (number(v).ok_or(InvalidParameter)?, 0),
                };
                if !(sigma > 0.0 && sigma <= 100.0) {
                    return Err(InvalidParameter);
                }
                Ok(Effect::Sharpen(SharpenParams {
                    sigma: sigma as f32,
                    threshold,
                }))
            }
            "brightness" => integer_in(value, -255, 255)
                .map(|v| Effect::Brightness(BrightnessParams { value: v as i32 }))
                .ok_or(InvalidParameter),
            "contrast" => number(value)
                .filter(|v| (-100.0..=100.0).contains(v))
                .map(|v| Effect::Contrast(ContrastParams { value: v as f32 }))
                .ok_or(InvalidParameter),
            "hue" => value
                .as_integer()
                .map(|d| {
                    Effect::Hue(HueParams {
                        degrees: d.rem_euclid(360) as i32,
                    })
                })
                .ok_or(InvalidParameter),
            "sepia" => {
                let percent = match value {
                    Value::Boolean(false) => return Err(SkipReason::Disabled),
                    Value::Boolean(true) => 80.0,
                    v => number(v)
                        .filter(|p| (0.0..=100.0).contains(p))
                        .ok_or(InvalidParameter)?,
                };
                Ok(Effect::Sepia(SepiaParams {
                    intensity: (percent / 100.0) as f32,
                }))
            }
            "posterize" => integer_in(value, 2, 255)
                .map(|l| Effect::Posterize(PosterizeParams { levels: l as u8 }))
                .ok_or(InvalidParameter),
            // Only whole-number radii are accepted; `oilpaint = 2.5` is ignored.
            "oilpaint" => integer_in(value, 1, 20)
                .map(|r| Effect::OilPaint(OilPaintParams { radius: r as u32 }))
                .ok_or(InvalidParameter),
            _ => Err(SkipReason::UnknownEffect),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Effect::Grayscale => "grayscale",
            Effect::Negative => "negative",
            Effect::Blur(_) => "blur",
            Effect::Sharpen(_) => "sharpen",
            Effect::Brightness(_) => "brightness",
            Effect::Contrast(_) => "contrast",
            Effect::Hue(_) => "hue",
            Effect::Sepia(_) => "sepia",
            Effect::Posterize(_) => "posterize",
            Effect::OilPaint(_) => "oilpaint",
        }
    }

    pub fn supports(&self, backend: BackendKind) -> bool {
        self.raw_op(backend).is_some()
    }

    /// The raw operation that realizes this effect on `backend`, if any.
    fn raw_op(&self, backend: BackendKind) -> Option<RawOp> {
        match (*self, backend) {
            (Effect::Grayscale, _) => Some(RawOp::Grayscale),
            (Effect::Negative, _) => Some(RawOp::Invert),
            (Effect::Blur(p), _) => Some(RawOp::Blur { sigma: p.sigma }),
            (Effect::Sharpen(p), _) => Some(RawOp::Unsharpen {
                sigma: p.sigma,
                threshold: p.threshold,
            }),
            (Effect::Brightness(p), _) => Some(RawOp::Brighten(p.value)),
            (Effect::Contrast(p), _) => Some(RawOp::Contrast(p.value)),
            (Effect::Hue(p), _) => Some(RawOp::HueRotate(p.degrees)),
            (Effect::Sepia(p), BackendKind::Extended) => Some(RawOp::Sepia {
                intensity: p.intensity,
            }),
            (Effect::Posterize(p), BackendKind::Extended) => {
                Some(RawOp::Posterize { levels: p.levels })
            }
            (Effect::OilPaint(p), BackendKind::Extended) => Some(RawOp::OilPaint {
                radius: p.radius,
                levels: OIL_PAINT_LEVELS,
            }),
            (Effect::Sepia(_) | Effect::Posterize(_) | Effect::OilPaint(_), BackendKind::Standard) => {
                None
            }
        }
    }

    /// Apply to the engine. Unsupported backends are a no-op.
    pub fn apply(&self, engine: &mut dyn ImageEngineHandle) -> Result<EffectOutcome, EffectError> {
        let backend = engine.kind();
        let Some(op) = self.raw_op(backend) else {
            return Ok(EffectOutcome::Skipped(SkipReason::UnsupportedBackend(
                backend,
            )));
        };
        engine.apply(op).map_err(|source| EffectError::Engine {
            effect: self.name(),
            source,
        })?;
        Ok(EffectOutcome::Applied)
    }
}

/// Parse and apply one named effect.
pub fn apply_effect(
    engine: &mut dyn ImageEngineHandle,
    name: &str,
    params: &Value,
) -> Result<EffectOutcome, EffectError> {
    let outcome = match Effect::parse(name, params) {
        Ok(effect) => effect.apply(engine)?,
        Err(reason) => EffectOutcome::Skipped(reason),
    };
    if let EffectOutcome::Skipped(reason) = outcome {
        debug!(effect = name, ?reason, backend = %engine.kind(), "effect skipped");
    }
    Ok(outcome)
}

/// Apply every entry of an effects table, in table order.
pub fn apply_effects(
    engine: &mut dyn ImageEngineHandle,
    effects: &toml::Table,
) -> Result<Vec<(String, EffectOutcome)>, EffectError> {
    effects
        .iter()
        .map(|(name, params)| Ok((name.clone(), apply_effect(engine, name, params)?)))
        .collect()
}
