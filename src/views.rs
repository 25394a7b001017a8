//! Read-only projections over the analysis cache
//!
//! Input validation happens here, before the cache is consulted.

use crate::analysis::{project_layer, ImageAnalysis, LayerDetail};
use crate::cache::{Entry, JobCoordinator, Resolution};
use crate::error::{StrataError, StrataResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of a summary request
#[derive(Debug, Clone)]
pub enum Summary {
    /// Analysis scheduled or running; retry later
    Accepted,
    Ready(Arc<ImageAnalysis>),
}

/// Parse the `layer` query parameter
pub fn parse_layer_index(raw: Option<&str>) -> StrataResult<usize> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(StrataError::LayerMissing);
    }
    raw.parse::<usize>()
        .map_err(|_| StrataError::LayerInvalid {
            value: raw.to_string(),
        })
}

/// Normalize an image name taken from a URL path
///
/// The name ends up as an engine CLI argument, so anything that could be
/// read as an option is rejected.
pub fn parse_image_name(raw: &str) -> StrataResult<&str> {
    let name = raw.trim_matches('/');
    if name.is_empty() {
        return Err(StrataError::ImageNameMissing);
    }
    if name.starts_with('-') {
        return Err(StrataError::ImageNameInvalid {
            name: name.to_string(),
            reason: "must not start with '-'",
        });
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(StrataError::ImageNameInvalid {
            name: name.to_string(),
            reason: "must not contain whitespace",
        });
    }
    Ok(name)
}

/// Query views over a [`JobCoordinator`]
#[derive(Clone)]
pub struct ImageViews {
    coordinator: JobCoordinator,
}

impl ImageViews {
    pub fn new(coordinator: JobCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &JobCoordinator {
        &self.coordinator
    }

    /// Summary of an image, scheduling its analysis when needed
    pub fn summary(&self, image: &str) -> StrataResult<Summary> {
        match self.coordinator.resolve(image) {
            Resolution::Pending => Ok(Summary::Accepted),
            Resolution::Failed(error) => Err(StrataError::analysis_failed(image, error)),
            Resolution::Ready(analysis) => Ok(Summary::Ready(analysis)),
        }
    }

    /// Detail of one layer of an already analyzed image
    ///
    /// Never schedules an analysis.
    pub fn layer(&self, image: &str, index: usize) -> StrataResult<LayerDetail> {
        match self.coordinator.lookup(image) {
            None => Err(StrataError::AnalysisUnknown(image.to_string())),
            Some(Resolution::Pending) => Err(StrataError::AnalysisPending(image.to_string())),
            Some(Resolution::Failed(error)) => Err(StrataError::analysis_failed(image, error)),
            Some(Resolution::Ready(analysis)) => project_layer(&analysis, index),
        }
    }

    /// All fresh entries, keyed by image
    pub fn caches(&self) -> BTreeMap<String, Entry> {
        self.coordinator.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, FileKind, FileRecord, ImageMeta, LayerAnalysis};
    use crate::cache::{EntryStatus, ManualClock};
    use crate::config::schema::CacheConfig;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct TwoLayers;

    #[async_trait]
    impl Analyzer for TwoLayers {
        async fn analyze(&self, name: &str) -> StrataResult<ImageAnalysis> {
            if name.starts_with("broken") {
                return Err(StrataError::ImagePull {
                    image: name.to_string(),
                    reason: "manifest unknown".to_string(),
                });
            }
            let file = FileRecord {
                path: "srv/index.html".to_string(),
                size: 512,
                mode: 0o644,
                kind: FileKind::File,
                link_target: None,
            };
            let layers = vec![
                LayerAnalysis::new(0, "sha256:base".into(), "ADD rootfs".into(), vec![], vec![]),
                LayerAnalysis::new(1, "sha256:site".into(), "COPY site".into(), vec![file], vec![]),
            ];
            Ok(ImageAnalysis::assemble(name, ImageMeta::default(), layers, 10))
        }
    }

    fn views() -> (ImageViews, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let coordinator =
            JobCoordinator::with_clock(Arc::new(TwoLayers), &CacheConfig::default(), clock.clone());
        (ImageViews::new(coordinator), clock)
    }

    #[test]
    fn layer_index_validation() {
        assert_eq!(parse_layer_index(Some("3")).unwrap(), 3);
        assert_eq!(parse_layer_index(Some(" 0 ")).unwrap(), 0);
        assert!(matches!(
            parse_layer_index(None),
            Err(StrataError::LayerMissing)
        ));
        assert!(matches!(
            parse_layer_index(Some("")),
            Err(StrataError::LayerMissing)
        ));
        assert!(matches!(
            parse_layer_index(Some("-1")),
            Err(StrataError::LayerInvalid { .. })
        ));
        assert!(matches!(
            parse_layer_index(Some("two")),
            Err(StrataError::LayerInvalid { .. })
        ));
    }

    #[test]
    fn image_name_validation() {
        assert_eq!(parse_image_name("library/redis:7").unwrap(), "library/redis:7");
        assert_eq!(parse_image_name("/redis/").unwrap(), "redis");
        assert!(matches!(
            parse_image_name("/"),
            Err(StrataError::ImageNameMissing)
        ));
    }

    #[test]
    fn image_name_cannot_look_like_an_option() {
        for raw in ["--output=/tmp/owned", "-q", "/--help", "redis 7", "a\tb"] {
            let err = parse_image_name(raw).unwrap_err();
            assert!(
                matches!(err, StrataError::ImageNameInvalid { .. }),
                "{raw:?} accepted"
            );
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(parse_image_name("quay.io/a-b/c-d:1-2").unwrap(), "quay.io/a-b/c-d:1-2");
    }

    #[tokio::test]
    async fn summary_then_layer() {
        let (views, _) = views();

        assert!(matches!(views.summary("site:1").unwrap(), Summary::Accepted));
        let err = views.layer("site:1", 0).unwrap_err();
        assert!(matches!(err, StrataError::AnalysisPending(_)));

        views.coordinator().wait("site:1").await;

        match views.summary("site:1").unwrap() {
            Summary::Ready(analysis) => assert_eq!(analysis.layer_count, 2),
            other => panic!("unexpected {other:?}"),
        }

        let detail = views.layer("site:1", 1).unwrap();
        assert_eq!(detail.command, "COPY site");
        assert_eq!(detail.tree.size, 512);

        let err = views.layer("site:1", 2).unwrap_err();
        assert!(matches!(
            err,
            StrataError::LayerOutOfRange { index: 2, count: 2 }
        ));
    }

    #[tokio::test]
    async fn layer_of_unknown_image_does_not_schedule() {
        let (views, _) = views();

        let err = views.layer("never-seen", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(views.caches().is_empty());
        assert_eq!(views.coordinator().in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_analysis_surfaces_everywhere() {
        let (views, _) = views();

        views.summary("broken:1").unwrap();
        views.coordinator().wait("broken:1").await;

        let err = views.summary("broken:1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Analysis);
        assert!(err.to_string().contains("manifest unknown"));

        let err = views.layer("broken:1", 0).unwrap_err();
        assert!(matches!(err, StrataError::AnalysisFailed { .. }));
    }

    #[tokio::test]
    async fn caches_lists_fresh_entries_only() {
        let (views, clock) = views();

        views.summary("a").unwrap();
        views.coordinator().wait("a").await;
        clock.advance(Duration::from_secs(601));
        views.summary("b").unwrap();

        let caches = views.caches();
        assert_eq!(caches.len(), 1);
        assert_eq!(caches["b"].status(), EntryStatus::InProgress);
    }
}
