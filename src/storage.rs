//! Analysis record persistence
//!
//! Sled-backed store of completed analyses. The orchestrator talks to the
//! [`ResultStore`] trait so failure injection in tests needs no real database;
//! a save failure is by contract non-fatal to the analysis call that caused it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Db as SledDb;
use tracing::debug;
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::types::{AnalysisResult, BackendKind, BoundingBox, DimensionEstimate, Quality};

type Result<T> = std::result::Result<T, AnalysisError>;

/// Everything worth keeping about one completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub session_id: String,
    pub image_ref: String,
    pub detected: bool,
    pub confidence: f64,
    pub bounding_box: Option<BoundingBox>,
    pub dimensions: Option<DimensionEstimate>,
    pub window_type: Option<String>,
    pub quality: Quality,
    pub recommendations: Vec<String>,
    pub processing_time_ms: f64,
    pub backend_used: BackendKind,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Mirror a result plus request metadata into a storable record.
    pub fn from_result(
        result: &AnalysisResult,
        session_id: Option<&str>,
        image_ref: String,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("analysis_{}", Uuid::new_v4().simple()),
            session_id: session_id
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("session_{}", created_at.timestamp_millis())),
            image_ref,
            detected: result.detected,
            confidence: result.confidence,
            bounding_box: result.bounding_box,
            dimensions: result.dimensions,
            window_type: result.window_type.clone(),
            quality: result.quality,
            recommendations: result.recommendations.clone(),
            processing_time_ms: result.processing_time_ms,
            backend_used: result.backend_used,
            created_at,
        }
    }
}

/// Persistence collaborator consumed by the orchestrator.
pub trait ResultStore: Send + Sync {
    /// Persist a record, returning its identifier.
    fn save(&self, record: &AnalysisRecord) -> Result<String>;
}

/// Default `ResultStore` over an embedded sled tree, records keyed by a
/// timestamp-prefixed id so `recent` is a reverse scan.
pub struct AnalysisStore {
    db: SledDb,
    tree: sled::Tree,
}

impl AnalysisStore {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| AnalysisError::Persistence(format!("open store: {}", e)))?;
        let tree = db
            .open_tree("analyses")
            .map_err(|e| AnalysisError::Persistence(format!("open tree: {}", e)))?;

        Ok(Self { db, tree })
    }

    fn key_for(record: &AnalysisRecord) -> Vec<u8> {
        format!("{:020}:{}", record.created_at.timestamp_millis(), record.id).into_bytes()
    }

    pub fn get(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        for entry in self.tree.iter() {
            let (_, value) =
                entry.map_err(|e| AnalysisError::Persistence(format!("scan: {}", e)))?;
            let record: AnalysisRecord = serde_json::from_slice(&value)
                .map_err(|e| AnalysisError::Persistence(format!("decode record: {}", e)))?;
            if record.id == id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let mut records = Vec::with_capacity(limit);
        for entry in self.tree.iter().rev().take(limit) {
            let (_, value) =
                entry.map_err(|e| AnalysisError::Persistence(format!("scan: {}", e)))?;
            let record = serde_json::from_slice(&value)
                .map_err(|e| AnalysisError::Persistence(format!("decode record: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn count(&self) -> usize {
        self.tree.len()
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| AnalysisError::Persistence(format!("flush: {}", e)))
    }
}

impl ResultStore for AnalysisStore {
    fn save(&self, record: &AnalysisRecord) -> Result<String> {
        let value = serde_json::to_vec(record)
            .map_err(|e| AnalysisError::Persistence(format!("encode record: {}", e)))?;

        self.tree
            .insert(Self::key_for(record), value)
            .map_err(|e| AnalysisError::Persistence(format!("insert: {}", e)))?;

        crate::metrics::STORED_ANALYSES.inc();
        debug!(id = %record.id, backend = %record.backend_used, "Analysis persisted");

        Ok(record.id.clone())
    }
}
