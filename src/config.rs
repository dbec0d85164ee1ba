use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub remote_config: RemoteConfig,
    pub model_config: ModelConfig,
    pub storage_config: StorageConfig,
    pub fallback_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub health_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub models_dir: String,
    pub model_name: String,
    pub model_url: Option<String>,
    pub input_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub data_dir: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let remote_base_url =
            env::var("REMOTE_ANALYZER_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());

        let remote_timeout_ms = env::var("REMOTE_ANALYZER_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30_000);

        let health_interval_secs = env::var("REMOTE_HEALTH_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let models_dir = env::var("MODELS_DIR").unwrap_or_else(|_| "./data/models".to_string());

        let model_name = env::var("MODEL_NAME").unwrap_or_else(|_| "window-detector".to_string());

        // Optional: where to fetch the ONNX model from when missing locally
        let model_url = env::var("MODEL_URL").ok().filter(|s| !s.is_empty());

        let input_size = env::var("MODEL_INPUT_SIZE")
            .unwrap_or_else(|_| "224".to_string())
            .parse()
            .unwrap_or(224);

        let storage_enabled = env::var("STORAGE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data/analyses".to_string());

        let fallback_enabled = env::var("FALLBACK_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            api_host,
            api_port,
            remote_config: RemoteConfig {
                base_url: remote_base_url,
                timeout_ms: remote_timeout_ms,
                health_interval_secs,
            },
            model_config: ModelConfig {
                models_dir,
                model_name,
                model_url,
                input_size,
            },
            storage_config: StorageConfig {
                enabled: storage_enabled,
                data_dir,
            },
            fallback_enabled,
        })
    }
}
