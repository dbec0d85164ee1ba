//! Unified analysis data model
//!
//! Every backend adapter maps its native output into [`AnalysisResult`], so
//! callers never see backend-specific shapes. The quality tier is derived from
//! confidence alone; adapters must not carry a backend-reported tier through.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AnalysisError;

/// Which analysis strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
    Simulated,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
            BackendKind::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller preference for backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    Remote,
    Local,
    #[default]
    Auto,
}

/// Four-level capture quality bucket, derived solely from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Quality {
    /// Fixed thresholds: >=0.9 excellent, >=0.75 good, >=0.6 fair, else poor.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Quality::Excellent
        } else if confidence >= 0.75 {
            Quality::Good
        } else if confidence >= 0.6 {
            Quality::Fair
        } else {
            Quality::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Fair => "fair",
            Quality::Poor => "poor",
        }
    }
}

/// Detection rectangle, normalized to the image (all fields in 0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Physical size estimate in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionEstimate {
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

/// Identity of the model that produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub model: String,
    pub version: String,
    pub processing_time_ms: f64,
}

/// Unified output of one analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub detected: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<DimensionEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_type: Option<String>,
    pub quality: Quality,
    pub recommendations: Vec<String>,
    pub processing_time_ms: f64,
    pub backend_used: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_info: Option<BackendInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
}

/// Options for one analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub preferred_backend: BackendPreference,
    pub persist: bool,
    pub session_id: Option<String>,
    pub confidence_threshold: f64,
    pub include_recommendations: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            preferred_backend: BackendPreference::Auto,
            persist: true,
            session_id: None,
            confidence_threshold: 0.5,
            include_recommendations: true,
        }
    }
}

/// Opaque image handle passed to backends. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    data: Vec<u8>,
}

impl ImagePayload {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, AnalysisError> {
        // Data-URL prefixes ("data:image/png;base64,...") are tolerated
        let raw = encoded.rsplit(',').next().unwrap_or(encoded);
        let data = BASE64
            .decode(raw.trim())
            .map_err(|e| AnalysisError::InvalidInput(format!("base64 decode failed: {}", e)))?;
        Ok(Self { data })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// Content fingerprint used as the stored image reference.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        hex::encode(hasher.finalize())
    }
}

/// Snapshot of backend availability, read without I/O.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub remote_healthy: bool,
    pub local_ready: bool,
    pub preferred: BackendKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(Quality::from_confidence(0.95), Quality::Excellent);
        assert_eq!(Quality::from_confidence(0.9), Quality::Excellent);
        assert_eq!(Quality::from_confidence(0.80), Quality::Good);
        assert_eq!(Quality::from_confidence(0.75), Quality::Good);
        assert_eq!(Quality::from_confidence(0.65), Quality::Fair);
        assert_eq!(Quality::from_confidence(0.6), Quality::Fair);
        assert_eq!(Quality::from_confidence(0.3), Quality::Poor);
        assert_eq!(Quality::from_confidence(0.0), Quality::Poor);
    }

    #[test]
    fn test_payload_base64_roundtrip() {
        let payload = ImagePayload::from_bytes(vec![1, 2, 3, 4]);
        let decoded = ImagePayload::from_base64(&payload.to_base64()).unwrap();
        assert_eq!(decoded.bytes(), payload.bytes());
    }

    #[test]
    fn test_payload_data_url_prefix() {
        let encoded = format!("data:image/png;base64,{}", BASE64.encode([9u8, 8, 7]));
        let payload = ImagePayload::from_base64(&encoded).unwrap();
        assert_eq!(payload.bytes(), &[9, 8, 7]);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = ImagePayload::from_bytes(vec![5; 32]);
        let b = ImagePayload::from_bytes(vec![5; 32]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_backend_kind_serde_tags() {
        assert_eq!(
            serde_json::to_string(&BackendKind::Simulated).unwrap(),
            "\"simulated\""
        );
        assert_eq!(serde_json::to_string(&Quality::Poor).unwrap(), "\"poor\"");
    }
}
