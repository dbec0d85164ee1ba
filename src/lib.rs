pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod local_model;
pub mod metrics;
pub mod orchestrator;
pub mod remote;
pub mod retry;
pub mod simulation;
pub mod storage;
pub mod types;

// Re-export commonly used types for easier testing
pub use crate::backend::AnalysisBackend;
pub use crate::error::AnalysisError;
pub use crate::health::{HealthMonitor, HealthSnapshot, HealthState};
pub use crate::local_model::{LocalModelRunner, ModelState};
pub use crate::orchestrator::AnalysisOrchestrator;
pub use crate::remote::RemoteAnalyzer;
pub use crate::simulation::SimulatedAnalyzer;
pub use crate::storage::{AnalysisRecord, AnalysisStore, ResultStore};
pub use crate::types::{
    AnalysisOptions, AnalysisResult, BackendInfo, BackendKind, BackendPreference, BackendStatus,
    BoundingBox, DimensionEstimate, ImagePayload, Quality,
};
