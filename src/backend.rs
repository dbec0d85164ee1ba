use async_trait::async_trait;

use crate::error::AnalysisError;
use crate::types::{AnalysisOptions, AnalysisResult, BackendKind, ImagePayload};

/// One interchangeable analysis strategy.
///
/// Adapters map their native output into the unified [`AnalysisResult`] shape
/// (field renaming only) and tag it with their [`BackendKind`]; thresholding
/// and recommendation enrichment stay in the orchestrator.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cached availability flag. Must not perform I/O: remote health comes
    /// from the periodic monitor, local readiness from the memoized init.
    fn is_available(&self) -> bool;

    async fn analyze(
        &self,
        image: &ImagePayload,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult, AnalysisError>;

    /// One round trip covering all images. Only the remote analyzer supports
    /// this; everything else reports unsupported and the orchestrator falls
    /// back to per-image processing.
    async fn analyze_batch(
        &self,
        _images: &[ImagePayload],
        _options: &AnalysisOptions,
    ) -> Result<Vec<AnalysisResult>, AnalysisError> {
        Err(AnalysisError::BackendError(format!(
            "{} backend does not support batched analysis",
            self.kind()
        )))
    }
}
