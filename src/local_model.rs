//! In-process model runner
//!
//! ONNX Runtime backed window detector. Initialization runs once at startup
//! and is memoized: Uninitialized -> Initializing -> Ready/Failed. When the
//! model file is missing locally it is downloaded first (size-capped, retried
//! with exponential backoff).
//!
//! The model contract is positional outputs; trailing heads are optional:
//! - output 0: detection score, sigmoid [1]
//! - output 1: bounding box, normalized [4] (x, y, w, h)
//! - output 2: window type probabilities [4]
//! - output 3: normalized dimension estimate [2] (w, h)

use async_trait::async_trait;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::backend::AnalysisBackend;
use crate::config::ModelConfig;
use crate::error::AnalysisError;
use crate::retry::retry_with_exponential_backoff;
use crate::types::{
    AnalysisOptions, AnalysisResult, BackendInfo, BackendKind, BoundingBox, DimensionEstimate,
    ImagePayload, Quality,
};

type Result<T> = std::result::Result<T, AnalysisError>;

const MODEL_VERSION: &str = "1.0.0";

/// Maximum model size to auto-download (50MB)
const MAX_AUTO_DOWNLOAD_SIZE: usize = 50 * 1024 * 1024;

const WINDOW_CLASSES: [&str; 4] = [
    "Standard Rectangle",
    "Arched Window",
    "Bay Window",
    "Sliding Window",
];

// Normalized dimension outputs are scaled into these physical ranges (cm)
const MIN_WIDTH_CM: f64 = 50.0;
const MAX_WIDTH_CM: f64 = 300.0;
const MIN_HEIGHT_CM: f64 = 60.0;
const MAX_HEIGHT_CM: f64 = 350.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

pub struct LocalModelRunner {
    config: ModelConfig,
    state: RwLock<ModelState>,
    session: Mutex<Option<Session>>,
    ready: AtomicBool,
}

impl LocalModelRunner {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ModelState::Uninitialized),
            session: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> ModelState {
        self.state.read().await.clone()
    }

    fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.config.models_dir).join(format!("{}.onnx", self.config.model_name))
    }

    /// Load (downloading if necessary) and build the session. Memoized: a
    /// second call returns the outcome of the first without re-running it.
    pub async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match &*state {
            ModelState::Ready => return Ok(()),
            ModelState::Failed(reason) => {
                return Err(AnalysisError::BackendUnavailable(reason.clone()))
            }
            ModelState::Initializing => {
                // Only reachable if initialize() is re-entered from the same
                // task; the write lock serializes distinct callers.
                return Err(AnalysisError::BackendUnavailable(
                    "model initialization already in progress".to_string(),
                ));
            }
            ModelState::Uninitialized => {}
        }
        *state = ModelState::Initializing;

        match self.load_session().await {
            Ok(session) => {
                *self.session.lock().await = Some(session);
                *state = ModelState::Ready;
                self.ready.store(true, Ordering::Relaxed);
                crate::metrics::LOCAL_MODEL_READY.set(1);
                info!(model = %self.config.model_name, "Local model ready");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                *state = ModelState::Failed(reason.clone());
                crate::metrics::LOCAL_MODEL_READY.set(0);
                warn!(model = %self.config.model_name, error = %reason, "Local model initialization failed");
                Err(AnalysisError::BackendUnavailable(reason))
            }
        }
    }

    async fn load_session(&self) -> Result<Session> {
        let path = self.model_path();

        if !path.exists() {
            self.download_model(&path).await?;
        }

        Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(2))
            .and_then(|b| b.commit_from_file(&path))
            .map_err(|e| AnalysisError::BackendUnavailable(format!("session build failed: {}", e)))
    }

    async fn download_model(&self, path: &PathBuf) -> Result<()> {
        let url = self.config.model_url.clone().ok_or_else(|| {
            AnalysisError::Config(format!(
                "model file {} missing and MODEL_URL not set",
                path.display()
            ))
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AnalysisError::Config(format!("create models dir: {}", e)))?;
        }

        info!(url = %url, path = %path.display(), "Downloading model");

        let bytes = retry_with_exponential_backoff(
            || async {
                let response = reqwest::get(&url)
                    .await
                    .map_err(|e| AnalysisError::BackendUnavailable(format!("model download: {}", e)))?
                    .error_for_status()
                    .map_err(|e| AnalysisError::BackendUnavailable(format!("model download: {}", e)))?;

                response
                    .bytes()
                    .await
                    .map_err(|e| AnalysisError::BackendError(format!("model download read: {}", e)))
            },
            3,
            500,
        )
        .await?;

        if bytes.len() > MAX_AUTO_DOWNLOAD_SIZE {
            return Err(AnalysisError::Config(format!(
                "model exceeds max auto-download size ({} bytes)",
                bytes.len()
            )));
        }

        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| AnalysisError::Config(format!("write model file: {}", e)))?;

        info!(size = bytes.len(), "Model downloaded");
        Ok(())
    }

    /// Decode, resize and normalize into an NHWC f32 tensor in [0,1].
    fn preprocess(&self, image: &ImagePayload) -> Result<Array4<f32>> {
        let size = self.config.input_size;

        let decoded = image::load_from_memory(image.bytes())
            .map_err(|e| AnalysisError::InvalidInput(format!("image decode failed: {}", e)))?;

        let resized = decoded.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        let mut input = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
            }
        }

        Ok(input)
    }

    async fn run_inference(&self, input: Array4<f32>) -> Result<Vec<Vec<f32>>> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| AnalysisError::BackendUnavailable("model not initialized".to_string()))?;

        let input_name = session.inputs[0].name.clone();
        // Keep the model-declared output order; the head contract is positional
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let value = ort::value::Value::from_array(input)
            .map_err(|e| AnalysisError::BackendError(format!("input tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![input_name.as_str() => value])
            .map_err(|e| AnalysisError::BackendError(format!("inference failed: {}", e)))?;

        // Extract synchronously; outputs borrow the session and must not
        // cross an await point.
        let mut raw = Vec::with_capacity(output_names.len());
        for name in &output_names {
            let view = outputs[name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| AnalysisError::BackendError(format!("output tensor: {}", e)))?;
            raw.push(view.1.iter().copied().collect::<Vec<f32>>());
        }

        Ok(raw)
    }
}

/// Interpreted model heads. Missing trailing outputs leave fields `None`.
#[derive(Debug, Default)]
struct InterpretedOutputs {
    confidence: f64,
    bounding_box: Option<BoundingBox>,
    window_type: Option<String>,
    dimensions: Option<DimensionEstimate>,
}

fn interpret_outputs(raw: &[Vec<f32>]) -> InterpretedOutputs {
    let mut interpreted = InterpretedOutputs::default();

    let Some(detection) = raw.first().and_then(|o| o.first()) else {
        return interpreted;
    };
    interpreted.confidence = (*detection as f64).clamp(0.0, 1.0);

    if let Some(bbox) = raw.get(1).filter(|o| o.len() >= 4) {
        interpreted.bounding_box = Some(BoundingBox {
            x: (bbox[0] as f64).clamp(0.0, 1.0),
            y: (bbox[1] as f64).clamp(0.0, 1.0),
            width: (bbox[2] as f64).clamp(0.0, 1.0),
            height: (bbox[3] as f64).clamp(0.0, 1.0),
        });
    }

    if let Some(classes) = raw.get(2).filter(|o| !o.is_empty()) {
        let best = classes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        interpreted.window_type = WINDOW_CLASSES.get(best).map(|s| s.to_string());
    }

    if let Some(dims) = raw.get(3).filter(|o| o.len() >= 2) {
        let w_norm = (dims[0] as f64).clamp(0.0, 1.0);
        let h_norm = (dims[1] as f64).clamp(0.0, 1.0);
        interpreted.dimensions = Some(DimensionEstimate {
            width: (MIN_WIDTH_CM + w_norm * (MAX_WIDTH_CM - MIN_WIDTH_CM)).round(),
            height: (MIN_HEIGHT_CM + h_norm * (MAX_HEIGHT_CM - MIN_HEIGHT_CM)).round(),
            confidence: interpreted.confidence * 0.85,
        });
    }

    interpreted
}

#[async_trait]
impl AnalysisBackend for LocalModelRunner {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn is_available(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    async fn analyze(
        &self,
        image: &ImagePayload,
        _options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        let start = Instant::now();

        let input = self.preprocess(image)?;
        let raw = self.run_inference(input).await?;
        let interpreted = interpret_outputs(&raw);

        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        Ok(AnalysisResult {
            detected: interpreted.confidence > 0.5,
            confidence: interpreted.confidence,
            bounding_box: interpreted.bounding_box,
            dimensions: interpreted.dimensions,
            window_type: interpreted.window_type,
            quality: Quality::from_confidence(interpreted.confidence),
            recommendations: Vec::new(),
            processing_time_ms: elapsed,
            backend_used: BackendKind::Local,
            backend_info: Some(BackendInfo {
                model: self.config.model_name.clone(),
                version: MODEL_VERSION.to_string(),
                processing_time_ms: elapsed,
            }),
            analysis_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ModelConfig {
        ModelConfig {
            models_dir: "/nonexistent".to_string(),
            model_name: "window-detector".to_string(),
            model_url: None,
            input_size: 224,
        }
    }

    #[test]
    fn test_interpret_full_outputs() {
        let raw = vec![
            vec![0.92],
            vec![0.1, 0.2, 0.6, 0.5],
            vec![0.05, 0.85, 0.05, 0.05],
            vec![0.5, 0.5],
        ];
        let out = interpret_outputs(&raw);

        assert!((out.confidence - 0.92).abs() < 1e-6);
        let bbox = out.bounding_box.unwrap();
        assert!((bbox.width - 0.6).abs() < 1e-6);
        assert_eq!(out.window_type.as_deref(), Some("Arched Window"));
        let dims = out.dimensions.unwrap();
        assert_eq!(dims.width, 175.0);
        assert_eq!(dims.height, 205.0);
    }

    #[test]
    fn test_interpret_detection_only() {
        let raw = vec![vec![0.4]];
        let out = interpret_outputs(&raw);

        assert!((out.confidence - 0.4).abs() < 1e-6);
        assert!(out.bounding_box.is_none());
        assert!(out.window_type.is_none());
        assert!(out.dimensions.is_none());
    }

    #[test]
    fn test_interpret_empty_outputs() {
        let out = interpret_outputs(&[]);
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn test_interpret_clamps_out_of_range() {
        let raw = vec![vec![1.7], vec![-0.5, 0.2, 1.3, 0.5]];
        let out = interpret_outputs(&raw);
        assert_eq!(out.confidence, 1.0);
        let bbox = out.bounding_box.unwrap();
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.width, 1.0);
    }

    #[tokio::test]
    async fn test_unavailable_before_initialization() {
        let runner = LocalModelRunner::new(test_config());
        assert!(!runner.is_available());
        assert_eq!(runner.state().await, ModelState::Uninitialized);
    }

    #[tokio::test]
    async fn test_initialization_failure_is_memoized() {
        let runner = LocalModelRunner::new(test_config());

        // No model file and no MODEL_URL: init fails and is remembered
        assert!(runner.initialize().await.is_err());
        assert!(matches!(runner.state().await, ModelState::Failed(_)));
        assert!(!runner.is_available());

        // Second call returns the memoized failure without re-running
        assert!(runner.initialize().await.is_err());
    }
}
