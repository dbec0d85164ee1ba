//! Analysis orchestration
//!
//! Selects a backend from an ordered candidate list (first available wins,
//! the simulation is the implicit last resort), invokes it under a timeout,
//! normalizes and post-processes the result, and persists it. Health and
//! readiness are cached flags; selection never blocks on a network probe.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::backend::AnalysisBackend;
use crate::error::AnalysisError;
use crate::simulation::SimulatedAnalyzer;
use crate::storage::{AnalysisRecord, ResultStore};
use crate::types::{
    AnalysisOptions, AnalysisResult, BackendKind, BackendPreference, BackendStatus, ImagePayload,
    Quality,
};

type Result<T> = std::result::Result<T, AnalysisError>;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

const LOW_CONFIDENCE_WARNING: &str = "Low confidence - retake the photo with better lighting";

/// Real-backend priority per caller preference; the simulation always closes
/// the chain and is not listed.
fn candidate_order(preference: BackendPreference) -> [BackendKind; 2] {
    match preference {
        BackendPreference::Remote => [BackendKind::Remote, BackendKind::Local],
        BackendPreference::Local => [BackendKind::Local, BackendKind::Remote],
        BackendPreference::Auto => [BackendKind::Remote, BackendKind::Local],
    }
}

pub struct AnalysisOrchestrator {
    backends: Vec<Arc<dyn AnalysisBackend>>,
    simulated: SimulatedAnalyzer,
    store: Option<Arc<dyn ResultStore>>,
    fallback_enabled: bool,
    call_timeout: Duration,
}

impl AnalysisOrchestrator {
    /// Backends are registered in any order; selection is by kind. The
    /// persistence collaborator is optional; without one, `persist` requests
    /// are no-ops.
    pub fn new(
        backends: Vec<Arc<dyn AnalysisBackend>>,
        store: Option<Arc<dyn ResultStore>>,
    ) -> Self {
        Self {
            backends,
            simulated: SimulatedAnalyzer::new(),
            store,
            fallback_enabled: true,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn backend_of(&self, kind: BackendKind) -> Option<&Arc<dyn AnalysisBackend>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// First available backend in preference order, else the simulation.
    fn select_backend(&self, preference: BackendPreference) -> &dyn AnalysisBackend {
        for kind in candidate_order(preference) {
            if let Some(backend) = self.backend_of(kind) {
                if backend.is_available() {
                    return backend.as_ref();
                }
            }
        }
        &self.simulated
    }

    /// Analyze one image, degrading to the simulation when the selected
    /// backend fails and fallback is enabled.
    pub async fn analyze(
        &self,
        image: &ImagePayload,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if image.is_empty() {
            crate::metrics::ANALYSIS_FAILURES
                .with_label_values(&["invalid_input"])
                .inc();
            return Err(AnalysisError::InvalidInput(
                "no image data provided".to_string(),
            ));
        }

        let start = Instant::now();

        let backend = self.select_backend(options.preferred_backend);
        let selected = backend.kind();
        debug!(backend = %selected, "Selected analysis backend");

        let invocation = match timeout(self.call_timeout, backend.analyze(image, options)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AnalysisError::BackendError(format!(
                "{} backend timed out after {}ms",
                selected,
                self.call_timeout.as_millis()
            ))),
        };

        let mut result = match invocation {
            Ok(result) => result,
            Err(e) if self.fallback_enabled && e.is_recoverable() => {
                warn!(backend = %selected, error = %e, "Backend failed, falling back to simulation");
                crate::metrics::FALLBACKS_TOTAL.inc();
                self.simulated.analyze(image, options).await?
            }
            Err(e) => {
                crate::metrics::ANALYSIS_FAILURES
                    .with_label_values(&[e.kind()])
                    .inc();
                return Err(e);
            }
        };

        post_process(&mut result, options);

        if options.persist {
            self.persist(&mut result, image, options);
        }

        // Total wall-clock overwrites whatever the backend reported
        let elapsed = start.elapsed().as_secs_f64();
        result.processing_time_ms = elapsed * 1000.0;

        crate::metrics::ANALYSES_TOTAL
            .with_label_values(&[result.backend_used.as_str()])
            .inc();
        crate::metrics::ANALYSIS_LATENCY
            .with_label_values(&[result.backend_used.as_str()])
            .observe(elapsed);

        info!(
            backend = %result.backend_used,
            detected = result.detected,
            confidence = result.confidence,
            elapsed_ms = result.processing_time_ms,
            "Analysis complete"
        );

        Ok(result)
    }

    /// Analyze several images. A partial batch is not an overall failure:
    /// per-image errors on the sequential path are logged and skipped.
    pub async fn batch_analyze(
        &self,
        images: &[ImagePayload],
        options: &AnalysisOptions,
    ) -> Result<Vec<AnalysisResult>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        crate::metrics::BATCH_REQUESTS.inc();

        if images.len() == 1 {
            return Ok(vec![self.analyze(&images[0], options).await?]);
        }

        // One batched remote round trip when the remote analyzer is up
        if let Some(remote) = self
            .backend_of(BackendKind::Remote)
            .filter(|b| b.is_available())
        {
            match timeout(self.call_timeout * 2, remote.analyze_batch(images, options)).await {
                Ok(Ok(results)) => {
                    info!(count = results.len(), "Batch analyzed remotely");
                    return Ok(results);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Batch analysis failed, falling back to individual processing");
                }
                Err(_) => {
                    warn!("Batch analysis timed out, falling back to individual processing");
                }
            }
        }

        let mut results = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            match self.analyze(image, options).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(index, error = %e, "Individual analysis failed, skipping image");
                }
            }
        }

        Ok(results)
    }

    /// Pure read of cached health/init flags, no I/O.
    pub fn backend_status(&self) -> BackendStatus {
        let remote_healthy = self
            .backend_of(BackendKind::Remote)
            .map(|b| b.is_available())
            .unwrap_or(false);
        let local_ready = self
            .backend_of(BackendKind::Local)
            .map(|b| b.is_available())
            .unwrap_or(false);

        let preferred = if remote_healthy {
            BackendKind::Remote
        } else if local_ready {
            BackendKind::Local
        } else {
            BackendKind::Simulated
        };

        BackendStatus {
            remote_healthy,
            local_ready,
            preferred,
        }
    }

    fn persist(&self, result: &mut AnalysisResult, image: &ImagePayload, options: &AnalysisOptions) {
        let Some(store) = &self.store else {
            return;
        };

        let record =
            AnalysisRecord::from_result(result, options.session_id.as_deref(), image.fingerprint());

        match store.save(&record) {
            Ok(id) => {
                debug!(id = %id, "Analysis saved");
                result.analysis_id = Some(id);
            }
            Err(e) => {
                // Non-fatal by contract: the caller still gets the result
                warn!(error = %e, "Failed to persist analysis, returning result without id");
                crate::metrics::PERSISTENCE_FAILURES.inc();
            }
        }
    }
}

/// Deterministic, backend-independent post-processing: threshold enforcement
/// first, then recommendation enrichment in fixed order.
fn post_process(result: &mut AnalysisResult, options: &AnalysisOptions) {
    if result.confidence < options.confidence_threshold {
        result.detected = false;
        result.quality = Quality::Poor;
        if options.include_recommendations {
            result
                .recommendations
                .insert(0, LOW_CONFIDENCE_WARNING.to_string());
        }
    }

    if options.include_recommendations {
        enrich_recommendations(result);
    }
}

fn enrich_recommendations(result: &mut AnalysisResult) {
    result.recommendations.push(quality_message(result.quality).to_string());

    if let Some(dims) = &result.dimensions {
        result
            .recommendations
            .push(dimension_message(dims.width, dims.height).to_string());
    }

    if let Some(window_type) = &result.window_type {
        result
            .recommendations
            .push(window_type_message(window_type).to_string());
    }
}

fn quality_message(quality: Quality) -> &'static str {
    match quality {
        Quality::Excellent => "Excellent capture - ready to order",
        Quality::Good => "Good capture - compatible with standard kits",
        Quality::Fair => "Fair capture - double-check the measurements",
        Quality::Poor => "Poor capture - retake the photo",
    }
}

fn dimension_message(width: f64, height: f64) -> &'static str {
    if width < 60.0 || height < 80.0 {
        "Small window - check kit compatibility"
    } else if width > 250.0 || height > 300.0 {
        "Large window - installation may need assistance"
    } else {
        "Standard dimensions - straightforward installation"
    }
}

fn window_type_message(window_type: &str) -> &'static str {
    match window_type {
        "Arched Window" => "Arched window - precise measurements required",
        "Bay Window" => "Bay window - an installation consultation is recommended",
        "Sliding Window" => "Sliding window - check the rail clearance",
        _ => "Standard window - simple installation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendInfo, DimensionEstimate};

    fn base_result(confidence: f64) -> AnalysisResult {
        AnalysisResult {
            detected: true,
            confidence,
            bounding_box: None,
            dimensions: None,
            window_type: None,
            quality: Quality::from_confidence(confidence),
            recommendations: Vec::new(),
            processing_time_ms: 10.0,
            backend_used: BackendKind::Remote,
            backend_info: Some(BackendInfo {
                model: "window-analyzer".to_string(),
                version: "2.1.0".to_string(),
                processing_time_ms: 10.0,
            }),
            analysis_id: None,
        }
    }

    #[test]
    fn test_candidate_order_per_preference() {
        assert_eq!(
            candidate_order(BackendPreference::Remote),
            [BackendKind::Remote, BackendKind::Local]
        );
        assert_eq!(
            candidate_order(BackendPreference::Local),
            [BackendKind::Local, BackendKind::Remote]
        );
        assert_eq!(
            candidate_order(BackendPreference::Auto),
            [BackendKind::Remote, BackendKind::Local]
        );
    }

    #[test]
    fn test_threshold_forces_non_detection() {
        let mut result = base_result(0.4);
        post_process(&mut result, &AnalysisOptions::default());

        assert!(!result.detected);
        assert_eq!(result.quality, Quality::Poor);
        assert_eq!(result.recommendations[0], LOW_CONFIDENCE_WARNING);
    }

    #[test]
    fn test_threshold_leaves_other_fields_untouched() {
        let mut result = base_result(0.4);
        result.dimensions = Some(DimensionEstimate {
            width: 120.0,
            height: 150.0,
            confidence: 0.4,
        });
        result.window_type = Some("Bay Window".to_string());
        post_process(&mut result, &AnalysisOptions::default());

        // Advisory fields survive; only detected/quality are wiped
        assert!(result.dimensions.is_some());
        assert_eq!(result.window_type.as_deref(), Some("Bay Window"));
    }

    #[test]
    fn test_enrichment_order_and_content() {
        let mut result = base_result(0.95);
        result.dimensions = Some(DimensionEstimate {
            width: 120.0,
            height: 150.0,
            confidence: 0.9,
        });
        result.window_type = Some("Sliding Window".to_string());
        result.recommendations = vec!["from backend".to_string()];

        post_process(&mut result, &AnalysisOptions::default());

        assert_eq!(result.recommendations.len(), 4);
        assert_eq!(result.recommendations[0], "from backend");
        assert!(result.recommendations[1].contains("Excellent"));
        assert!(result.recommendations[2].contains("Standard dimensions"));
        assert!(result.recommendations[3].contains("rail"));
    }

    #[test]
    fn test_dimension_buckets() {
        assert!(dimension_message(50.0, 150.0).contains("Small"));
        assert!(dimension_message(120.0, 70.0).contains("Small"));
        assert!(dimension_message(260.0, 150.0).contains("Large"));
        assert!(dimension_message(120.0, 320.0).contains("Large"));
        assert!(dimension_message(120.0, 150.0).contains("Standard"));
        // Boundary values count as standard
        assert!(dimension_message(60.0, 80.0).contains("Standard"));
        assert!(dimension_message(250.0, 300.0).contains("Standard"));
    }

    #[test]
    fn test_unknown_window_type_gets_default_note() {
        assert!(window_type_message("Round Porthole").contains("Standard window"));
    }

    #[test]
    fn test_recommendations_can_be_disabled() {
        let mut result = base_result(0.4);
        let options = AnalysisOptions {
            include_recommendations: false,
            ..Default::default()
        };
        post_process(&mut result, &options);

        assert!(!result.detected);
        assert_eq!(result.quality, Quality::Poor);
        assert!(result.recommendations.is_empty());
    }
}
