//! CLI output formatting.
//!
//! Every `format_*` function is pure and returns display lines; the matching
//! `print_*` wrapper writes them to stdout. Diagnostics go through `tracing`
//! to stderr and never through here.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! photos (12 images × thumb, hero)
//!     thumb: trips/dawn.jpg → 300x300 (18.4 KB)
//!     hero: trips/dawn.jpg FAILED
//!         Cannot decode …
//! Generated transforms.
//! ```
//!
//! ## Clear / status
//!
//! ```text
//! Cache cleared.
//!     transforms: 0 files
//!     runtime: 0 files
//! ```

use crate::artifact::{SizeUnit, size_in};
use crate::generate::GenerateEvent;
use crate::utility::{CacheCount, UtilityResponse};

/// Indentation for nesting level `depth`.
pub fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Generate progress
// ============================================================================

/// Format a single generation progress event as display lines.
pub fn format_generate_event(event: &GenerateEvent) -> Vec<String> {
    match event {
        GenerateEvent::VolumePlanned {
            volume,
            images,
            transforms,
        } => {
            let images = plural(*images, "image", "images");
            if transforms.is_empty() {
                vec![format!("{volume} ({images}, no transforms)")]
            } else {
                vec![format!("{volume} ({images} \u{00d7} {})", transforms.join(", "))]
            }
        }
        GenerateEvent::ItemGenerated {
            transform,
            source,
            width,
            height,
            bytes,
            ..
        } => vec![format!(
            "{}{transform}: {source} \u{2192} {width}x{height} ({} KB)",
            indent(1),
            size_in(*bytes, SizeUnit::Kb, 1)
        )],
        GenerateEvent::ItemFailed {
            transform,
            source,
            error,
            ..
        } => vec![
            format!("{}{transform}: {source} FAILED", indent(1)),
            format!("{}{error}", indent(2)),
        ],
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Format cache counts, one tier per line.
pub fn format_counts(counts: &[CacheCount]) -> Vec<String> {
    counts
        .iter()
        .map(|c| format!("{}{}: {}", indent(1), c.handle, plural(c.file_count, "file", "files")))
        .collect()
}

/// Format a facade response under a headline for the successful case.
pub fn format_response(response: &UtilityResponse, success_headline: &str) -> Vec<String> {
    let mut lines = Vec::new();
    if response.success {
        lines.push(success_headline.to_string());
    } else {
        lines.push(format!("Failed ({}):", plural(response.errors.len(), "error", "errors")));
    }
    lines.extend(response.errors.iter().map(|e| format!("{}{e}", indent(1))));
    if let Some(counts) = &response.counts {
        lines.extend(format_counts(counts));
    }
    lines
}

/// Print a facade response to stdout.
pub fn print_response(response: &UtilityResponse, success_headline: &str) {
    for line in format_response(response, success_headline) {
        println!("{}", line);
    }
}

/// Print cache counts to stdout.
pub fn print_counts(counts: &[CacheCount]) {
    println!("Cache");
    for line in format_counts(counts) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(t: usize, r: usize) -> Vec<CacheCount> {
        vec![
            CacheCount {
                handle: "transforms".into(),
                file_count: t,
            },
            CacheCount {
                handle: "runtime".into(),
                file_count: r,
            },
        ]
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    // =========================================================================
    // Generate event formatting tests
    // =========================================================================

    #[test]
    fn format_volume_planned() {
        let event = GenerateEvent::VolumePlanned {
            volume: "photos".into(),
            images: 12,
            transforms: vec!["thumb".into(), "hero".into()],
        };
        assert_eq!(
            format_generate_event(&event),
            vec!["photos (12 images \u{00d7} thumb, hero)"]
        );
    }

    #[test]
    fn format_volume_planned_without_transforms() {
        let event = GenerateEvent::VolumePlanned {
            volume: "photos".into(),
            images: 1,
            transforms: vec![],
        };
        assert_eq!(
            format_generate_event(&event),
            vec!["photos (1 image, no transforms)"]
        );
    }

    #[test]
    fn format_item_generated() {
        let event = GenerateEvent::ItemGenerated {
            volume: "photos".into(),
            transform: "thumb".into(),
            source: "trips/dawn.jpg".into(),
            width: 300,
            height: 200,
            bytes: 1536,
        };
        assert_eq!(
            format_generate_event(&event),
            vec!["    thumb: trips/dawn.jpg \u{2192} 300x200 (1.5 KB)"]
        );
    }

    #[test]
    fn format_item_failed() {
        let event = GenerateEvent::ItemFailed {
            volume: "photos".into(),
            transform: "hero".into(),
            source: "bad.jpg".into(),
            error: "Cannot decode bad.jpg".into(),
        };
        assert_eq!(
            format_generate_event(&event),
            vec!["    hero: bad.jpg FAILED", "        Cannot decode bad.jpg"]
        );
    }

    // =========================================================================
    // Response formatting tests
    // =========================================================================

    #[test]
    fn format_successful_clear() {
        let response = UtilityResponse {
            success: true,
            errors: vec![],
            counts: Some(counts(0, 1)),
        };
        assert_eq!(
            format_response(&response, "Cache cleared."),
            vec!["Cache cleared.", "    transforms: 0 files", "    runtime: 1 file"]
        );
    }

    #[test]
    fn format_failed_response() {
        let response = UtilityResponse {
            success: false,
            errors: vec!["No volumes selected.".into(), "No transforms selected.".into()],
            counts: None,
        };
        assert_eq!(
            format_response(&response, "unused"),
            vec![
                "Failed (2 errors):",
                "    No volumes selected.",
                "    No transforms selected."
            ]
        );
    }
}
