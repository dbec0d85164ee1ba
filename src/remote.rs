//! Remote analyzer HTTP client
//!
//! Consumes the analyzer service contract: `POST /analyze` and
//! `POST /batch-analyze` with base64 image payloads, `GET /health` for the
//! periodic probe. Availability reads the cached [`HealthState`]; the client
//! never probes synchronously from the analysis path.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::AnalysisBackend;
use crate::config::RemoteConfig;
use crate::error::AnalysisError;
use crate::health::{HealthSnapshot, HealthState};
use crate::types::{
    AnalysisOptions, AnalysisResult, BackendInfo, BackendKind, BoundingBox, DimensionEstimate,
    ImagePayload, Quality,
};

type Result<T> = std::result::Result<T, AnalysisError>;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    image: String,
    options: AnalyzeRequestOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequestOptions {
    include_classification: bool,
    include_dimensions: bool,
    confidence_threshold: f64,
}

#[derive(Debug, Serialize)]
struct BatchAnalyzeRequest {
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteAnalyzeResponse {
    pub window_detected: bool,
    pub confidence: f64,
    pub bounding_box: Option<WireBoundingBox>,
    pub dimensions: Option<WireDimensions>,
    pub window_type: Option<String>,
    #[allow(dead_code)]
    pub quality: Option<String>,
    pub recommendations: Option<Vec<String>>,
    pub processing_time: Option<f64>,
    pub model_info: Option<WireModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct WireBoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
pub struct WireDimensions {
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct WireModelInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct BatchAnalyzeResponse {
    results: Vec<RemoteAnalyzeResponse>,
    summary: Option<BatchSummary>,
}

#[derive(Debug, Deserialize)]
struct BatchSummary {
    total: usize,
    successful: usize,
    failed: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoteHealthResponse {
    pub status: String,
    pub version: Option<String>,
    #[allow(dead_code)]
    pub models: Option<serde_json::Value>,
    pub uptime: Option<f64>,
}

// ============================================================================
// Client
// ============================================================================

pub struct RemoteAnalyzer {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    health: Arc<HealthState>,
}

impl RemoteAnalyzer {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Self::with_health_state(config, Arc::new(HealthState::new()))
    }

    /// Inject a pre-built health state (tests wire a fixed one).
    pub fn with_health_state(config: &RemoteConfig, health: Arc<HealthState>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AnalysisError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_millis(config.timeout_ms),
            health,
        })
    }

    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    /// One `GET /health` round trip, updating the cached state. Called by the
    /// periodic monitor, never by the analysis path.
    pub async fn probe_health(&self) {
        let _timer = crate::metrics::Timer::new(crate::metrics::HEALTH_PROBE_LATENCY.clone());

        match self.check_health().await {
            Ok(response) => {
                let healthy = matches!(response.status.as_str(), "healthy" | "ok");
                if healthy {
                    self.health
                        .mark_healthy(HealthSnapshot {
                            status: response.status,
                            version: response.version,
                            uptime_secs: response.uptime,
                            checked_at: Utc::now(),
                            error: None,
                        })
                        .await;
                } else {
                    self.health
                        .mark_unhealthy(format!("analyzer reported status {}", response.status))
                        .await;
                }
            }
            Err(e) => {
                self.health.mark_unhealthy(e.to_string()).await;
            }
        }
    }

    pub async fn check_health(&self) -> Result<RemoteHealthResponse> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AnalysisError::BackendUnavailable(e.to_string()))?;

        Ok(response.json::<RemoteHealthResponse>().await?)
    }

    /// One batched call covering all images, bounded by a doubled timeout.
    pub async fn batch_analyze(&self, images: &[ImagePayload]) -> Result<Vec<AnalysisResult>> {
        let request = BatchAnalyzeRequest {
            images: images.iter().map(|i| i.to_base64()).collect(),
        };

        let response = self
            .client
            .post(format!("{}/batch-analyze", self.base_url))
            .timeout(self.timeout * 2)
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AnalysisError::BackendError(e.to_string()))?;

        let batch: BatchAnalyzeResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::BackendError(format!("batch decode failed: {}", e)))?;

        if let Some(summary) = &batch.summary {
            debug!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "Batch analysis summary"
            );
            if summary.failed > 0 {
                warn!("{} of {} batch images failed remotely", summary.failed, summary.total);
            }
        }

        Ok(batch.results.into_iter().map(map_response).collect())
    }
}

/// Field renaming only; the quality tier is re-derived from confidence so a
/// backend-reported tier can never disagree with it.
fn map_response(response: RemoteAnalyzeResponse) -> AnalysisResult {
    let processing_time_ms = response.processing_time.unwrap_or(0.0);

    AnalysisResult {
        detected: response.window_detected,
        confidence: response.confidence,
        bounding_box: response.bounding_box.map(|b| BoundingBox {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }),
        dimensions: response.dimensions.map(|d| DimensionEstimate {
            width: d.width,
            height: d.height,
            confidence: d.confidence,
        }),
        window_type: response.window_type,
        quality: Quality::from_confidence(response.confidence),
        recommendations: response.recommendations.unwrap_or_default(),
        processing_time_ms,
        backend_used: BackendKind::Remote,
        backend_info: response.model_info.map(|m| BackendInfo {
            model: m.name,
            version: m.version,
            processing_time_ms,
        }),
        analysis_id: None,
    }
}

#[async_trait]
impl AnalysisBackend for RemoteAnalyzer {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn is_available(&self) -> bool {
        self.health.is_healthy()
    }

    async fn analyze(
        &self,
        image: &ImagePayload,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        let request = AnalyzeRequest {
            image: image.to_base64(),
            options: AnalyzeRequestOptions {
                include_classification: true,
                include_dimensions: true,
                confidence_threshold: options.confidence_threshold,
            },
        };

        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AnalysisError::BackendError(e.to_string()))?;

        let decoded: RemoteAnalyzeResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::BackendError(format!("response decode failed: {}", e)))?;

        Ok(map_response(decoded))
    }

    async fn analyze_batch(
        &self,
        images: &[ImagePayload],
        _options: &AnalysisOptions,
    ) -> Result<Vec<AnalysisResult>> {
        self.batch_analyze(images).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mapping() {
        let json = r#"{
            "window_detected": true,
            "confidence": 0.92,
            "bounding_box": {"x": 0.1, "y": 0.2, "width": 0.6, "height": 0.5},
            "dimensions": {"width": 120.0, "height": 150.0, "confidence": 0.88},
            "window_type": "Standard Rectangle",
            "quality": "fair",
            "recommendations": ["from analyzer"],
            "processing_time": 412.0,
            "model_info": {"name": "window-analyzer", "version": "2.1.0"}
        }"#;

        let decoded: RemoteAnalyzeResponse = serde_json::from_str(json).unwrap();
        let result = map_response(decoded);

        assert!(result.detected);
        assert_eq!(result.backend_used, BackendKind::Remote);
        // Tier derived from confidence, not the wire value
        assert_eq!(result.quality, Quality::Excellent);
        assert_eq!(result.bounding_box.unwrap().width, 0.6);
        assert_eq!(result.dimensions.unwrap().width, 120.0);
        assert_eq!(result.backend_info.unwrap().model, "window-analyzer");
        assert_eq!(result.recommendations, vec!["from analyzer".to_string()]);
    }

    #[test]
    fn test_sparse_response_mapping() {
        let json = r#"{"window_detected": false, "confidence": 0.2}"#;
        let decoded: RemoteAnalyzeResponse = serde_json::from_str(json).unwrap();
        let result = map_response(decoded);

        assert!(!result.detected);
        assert_eq!(result.quality, Quality::Poor);
        assert!(result.bounding_box.is_none());
        assert!(result.dimensions.is_none());
        assert!(result.backend_info.is_none());
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_request_options_are_camel_case() {
        let options = AnalyzeRequestOptions {
            include_classification: true,
            include_dimensions: true,
            confidence_threshold: 0.5,
        };
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("includeClassification"));
        assert!(json.contains("confidenceThreshold"));
    }

    #[test]
    fn test_health_response_decodes() {
        let json = r#"{"status": "healthy", "version": "2.1.0", "models": {"detector": true}, "uptime": 3600.5}"#;
        let decoded: RemoteHealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.status, "healthy");
        assert_eq!(decoded.version.as_deref(), Some("2.1.0"));
    }
}
