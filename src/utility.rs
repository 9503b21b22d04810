//! Operator-facing entry point.
//!
//! [`UtilityFacade`] is what callers outside the core talk to. Both
//! operations return a [`UtilityResponse`] and never an `Err`: every failure
//! becomes `success = false` plus messages. The response serializes to the
//! JSON shape request layers hand back:
//!
//! ```text
//! {"success": false, "errors": ["No volumes selected."]}
//! {"success": true, "counts": [{"handle": "transforms", "fileCount": 0},
//!                              {"handle": "runtime", "fileCount": 0}]}
//! ```

use crate::cache::{CacheError, CacheStores, RUNTIME_HANDLE, TRANSFORMS_HANDLE};
use crate::config::Config;
use crate::generate::{BulkGenerationJob, CancellationToken, GenerateError, GenerateEvent, GenerateRequest};
use crate::imaging::ImageCodec;
use crate::volumes::{RemoteFetcher, Volumes};
use serde::Serialize;
use std::str::FromStr;
use std::sync::mpsc::Sender;

pub const UNKNOWN_CLEAR_TYPE: &str = "Unknown cache clear type.";

/// File count of one cache tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheCount {
    pub handle: String,
    #[serde(rename = "fileCount")]
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtilityResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Vec<CacheCount>>,
}

impl UtilityResponse {
    fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            counts: None,
        }
    }
}

/// Which tiers a clear request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClearKind {
    All,
    Transforms,
    Runtime,
}

impl CacheClearKind {
    fn clears_transforms(self) -> bool {
        matches!(self, CacheClearKind::All | CacheClearKind::Transforms)
    }

    fn clears_runtime(self) -> bool {
        matches!(self, CacheClearKind::All | CacheClearKind::Runtime)
    }
}

impl FromStr for CacheClearKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CacheClearKind::All),
            "transforms" => Ok(CacheClearKind::Transforms),
            "runtime" => Ok(CacheClearKind::Runtime),
            _ => Err(UNKNOWN_CLEAR_TYPE.to_string()),
        }
    }
}

pub struct UtilityFacade<'a> {
    config: &'a Config,
    volumes: &'a dyn Volumes,
    codec: &'a dyn ImageCodec,
    fetcher: &'a dyn RemoteFetcher,
    stores: &'a CacheStores,
    cancel: CancellationToken,
    events: Option<Sender<GenerateEvent>>,
}

impl<'a> UtilityFacade<'a> {
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

    /// Token checked between items of every generation run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, events: Sender<GenerateEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Generate transforms for `volumes`, using either each volume's
    /// configured presets or the named ones.
    pub fn generate_transforms(
        &self,
        volumes: &[String],
        use_configured: bool,
        transforms: &[String],
    ) -> UtilityResponse {
        let request = GenerateRequest {
            volumes: volumes.to_vec(),
            use_configured,
            // Per-volume configuration replaces any named presets.
            transforms: if use_configured { Vec::new() } else { transforms.to_vec() },
        };

        let mut job = BulkGenerationJob::new(self.config, self.volumes, self.codec, self.fetcher, self.stores)
            .with_cancellation(self.cancel.clone());
        if let Some(tx) = &self.events {
            job = job.with_events(tx.clone());
        }

        match job.run(&request) {
            Ok(result) => UtilityResponse {
                success: result.succeeded,
                errors: result.errors,
                counts: None,
            },
            Err(GenerateError::Validation(errors)) => UtilityResponse::failed(errors),
            Err(e @ GenerateError::Source(_)) => UtilityResponse::failed(vec![e.to_string()]),
        }
    }

    /// Clear one or both cache tiers, then report both tiers' file counts.
    ///
    /// `kind` is `"all"`, `"transforms"` or `"runtime"`.
    pub fn clear_cache(&self, kind: &str) -> UtilityResponse {
        let kind = match kind.parse::<CacheClearKind>() {
            Ok(kind) => kind,
            Err(message) => return UtilityResponse::failed(vec![message]),
        };

        match self.clear_and_count(kind) {
            Ok(counts) => UtilityResponse {
                success: true,
                errors: Vec::new(),
                counts: Some(counts),
            },
            Err(e) => UtilityResponse::failed(vec![e.to_string()]),
        }
    }

    fn clear_and_count(&self, kind: CacheClearKind) -> Result<Vec<CacheCount>, CacheError> {
        if kind.clears_transforms() {
            self.stores.transforms.clear()?;
        }
        if kind.clears_runtime() {
            self.stores.runtime.clear()?;
        }
        self.cache_counts()
    }

    /// Current file counts, transforms first, then runtime.
    pub fn cache_counts(&self) -> Result<Vec<CacheCount>, CacheError> {
        Ok(vec![
            CacheCount {
                handle: TRANSFORMS_HANDLE.to_string(),
                file_count: self.stores.transforms.count()?,
            },
            CacheCount {
                handle: RUNTIME_HANDLE.to_string(),
                file_count: self.stores.runtime.count()?,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, VolumeConfig};
    use crate::imaging::TransformSpec;
    use crate::test_helpers::MockCodec;
    use crate::volumes::{FsVolumes, NoRemoteFetcher};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(tmp: &TempDir) -> Config {
        write(&tmp.path().join("v1/a.jpg"), "50x50");
        let mut config = Config {
            cache: CacheConfig {
                transforms: tmp.path().join("t"),
                runtime: tmp.path().join("r"),
            },
            ..Config::default()
        };
        config
            .transforms
            .insert("thumb".into(), TransformSpec::sized(Some(10), Some(10)));
        config.volumes.insert(
            "v1".into(),
            VolumeConfig {
                path: Some(tmp.path().join("v1")),
                transforms: vec!["thumb".into()],
                ..VolumeConfig::default()
            },
        );
        config
    }

    fn fill(stores: &CacheStores, transforms: usize, runtime: usize) {
        for i in 0..transforms {
            write(&stores.transforms.root().join(format!("v/{}/h{i}", i % 2)), "x");
        }
        for i in 0..runtime {
            write(&stores.runtime.root().join(format!("v/remote/{i}/a.jpg")), "x");
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // =========================================================================
    // generate_transforms
    // =========================================================================

    #[test]
    fn generate_without_volumes() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.generate_transforms(&[], true, &[]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "errors": ["No volumes selected."]})
        );
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn generate_without_transforms() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.generate_transforms(&strings(&["v1"]), false, &[]);
        assert_eq!(response.errors, vec!["No transforms selected."]);
        assert!(!response.success);
    }

    #[test]
    fn generate_configured_succeeds() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.generate_transforms(&strings(&["v1"]), true, &strings(&["ignored"]));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": true})
        );
        assert_eq!(stores.transforms.count().unwrap(), 1);
    }

    #[test]
    fn generate_unknown_volume_is_sole_error() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.generate_transforms(&strings(&["v1", "ghost"]), true, &[]);
        assert!(!response.success);
        assert_eq!(response.errors, vec!["Unknown volume 'ghost'"]);
        assert_eq!(response.counts, None);
    }

    // =========================================================================
    // clear_cache
    // =========================================================================

    #[test]
    fn clear_unknown_kind() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        fill(&stores, 2, 2);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.clear_cache("bogus");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": false, "errors": ["Unknown cache clear type."]})
        );
        assert_eq!(stores.transforms.count().unwrap(), 2, "nothing cleared");
    }

    #[test]
    fn clear_all_reports_both_tiers_empty() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        fill(&stores, 3, 5);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.clear_cache("all");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": true,
                "counts": [
                    {"handle": "transforms", "fileCount": 0},
                    {"handle": "runtime", "fileCount": 0}
                ]
            })
        );
    }

    #[test]
    fn clear_one_tier_reports_the_other_untouched() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        fill(&stores, 3, 5);
        let counts = facade.clear_cache("transforms").counts.unwrap();
        assert_eq!(
            counts.iter().map(|c| c.file_count).collect::<Vec<_>>(),
            vec![0, 5]
        );

        fill(&stores, 3, 0);
        let counts = facade.clear_cache("runtime").counts.unwrap();
        assert_eq!(
            counts.iter().map(|c| c.file_count).collect::<Vec<_>>(),
            vec![3, 0]
        );
    }

    #[test]
    fn clear_on_missing_roots_succeeds() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.clear_cache("all");
        assert!(response.success);
        assert_eq!(response.counts.unwrap().len(), 2);
    }

    #[test]
    fn clear_failure_is_reported_without_counts() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let stores = CacheStores::from_config(&config.cache);
        fill(&stores, 0, 2);
        // A regular file where the transforms tier's directory belongs.
        write(stores.transforms.root(), "not a directory");
        let (codec, volumes) = (MockCodec::new(), FsVolumes::new(&config));
        let facade = UtilityFacade::new(&config, &volumes, &codec, &NoRemoteFetcher, &stores);

        let response = facade.clear_cache("all");
        assert!(!response.success);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].contains("Cache I/O error"), "{}", response.errors[0]);
        assert!(response.counts.is_none());
        // The sweep stopped before the runtime tier.
        assert_eq!(stores.runtime.count().unwrap(), 2);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn clear_kind_parse() {
        assert_eq!("all".parse::<CacheClearKind>(), Ok(CacheClearKind::All));
        assert_eq!("runtime".parse::<CacheClearKind>(), Ok(CacheClearKind::Runtime));
        assert_eq!(
            "ALL".parse::<CacheClearKind>(),
            Err(UNKNOWN_CLEAR_TYPE.to_string())
        );
    }
}
