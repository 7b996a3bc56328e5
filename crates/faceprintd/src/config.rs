use faceprint_core::detector::DEFAULT_DET_SIZE;
use faceprint_core::{ExecutionBackend, SessionOptions, DEFAULT_THRESHOLD};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (default: 0.0.0.0:3001).
    pub bind_addr: SocketAddr,
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Path to the user snapshot file.
    pub store_path: PathBuf,
    /// Similarity threshold used when a compare request does not set one.
    pub default_threshold: f32,
    /// Square detector input resolution, fixed when the model is loaded.
    pub det_size: usize,
    /// ONNX Runtime compute backend.
    pub execution_backend: ExecutionBackend,
    /// ONNX Runtime intra-op thread count.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `FACEPRINT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("faceprint");

        let model_dir = std::env::var("FACEPRINT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let store_path = std::env::var("FACEPRINT_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("users.json"));

        let execution_backend = match std::env::var("FACEPRINT_EXECUTION_PROVIDER") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "ignoring FACEPRINT_EXECUTION_PROVIDER");
                ExecutionBackend::Auto
            }),
            Err(_) => ExecutionBackend::Auto,
        };

        Self {
            bind_addr: env_parse("FACEPRINT_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001))),
            model_dir,
            store_path,
            default_threshold: env_parse("FACEPRINT_THRESHOLD", DEFAULT_THRESHOLD),
            det_size: env_parse("FACEPRINT_DET_SIZE", DEFAULT_DET_SIZE),
            execution_backend,
            intra_threads: env_parse("FACEPRINT_INTRA_THREADS", 2),
        }
    }

    /// ONNX session options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            backend: self.execution_backend,
            intra_threads: self.intra_threads,
            det_size: self.det_size,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
