//! The face model capability and its ONNX Runtime implementation.
//!
//! Everything above this module only sees [`FaceModel::detect_faces`]:
//! zero or more faces, each with a bounding box and an embedding.

use crate::detector::{DetectorError, FaceDetector, DEFAULT_DET_SIZE};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceCandidate;
use image::RgbImage;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

/// Detector model file inside the model directory (InsightFace buffalo_l).
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// Recognizer model file inside the model directory (InsightFace buffalo_l).
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("model session lock poisoned")]
    Poisoned,
}

/// Source of face candidates for an image.
///
/// Output order must be stable for a fixed input.
pub trait FaceModel: Send + Sync {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceCandidate>, ModelError>;

    /// Whether the model can serve requests.
    fn is_ready(&self) -> bool {
        true
    }

    /// Short identifier for logs and health output.
    fn name(&self) -> &str;
}

/// Compute backend for ONNX Runtime sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionBackend {
    /// CUDA when available, CPU otherwise.
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl FromStr for ExecutionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown execution provider '{other}' (expected auto, cuda or cpu)")),
        }
    }
}

/// Options shared by the detector and recognizer sessions.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub backend: ExecutionBackend,
    pub intra_threads: usize,
    /// Square detector input resolution.
    pub det_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            backend: ExecutionBackend::Auto,
            intra_threads: 2,
            det_size: DEFAULT_DET_SIZE,
        }
    }
}

pub(crate) fn session_builder(options: &SessionOptions) -> Result<SessionBuilder, ort::Error> {
    #[allow(unused_mut)]
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(options.intra_threads.max(1))?;

    match options.backend {
        ExecutionBackend::Cpu => {}
        #[cfg(feature = "cuda")]
        ExecutionBackend::Auto | ExecutionBackend::Cuda => {
            use ort::ep::{self, ExecutionProvider};

            let cuda = ep::CUDA::default();
            if cuda.is_available()? {
                cuda.register(&mut builder)?;
                tracing::info!("using CUDA execution provider");
            } else {
                tracing::warn!("CUDA execution provider unavailable, falling back to CPU");
            }
        }
        #[cfg(not(feature = "cuda"))]
        ExecutionBackend::Auto => {}
        #[cfg(not(feature = "cuda"))]
        ExecutionBackend::Cuda => {
            tracing::warn!("CUDA requested but faceprint was built without the `cuda` feature; using CPU");
        }
    }

    Ok(builder)
}

/// SCRFD detection + ArcFace recognition, the InsightFace `buffalo_l` pair.
///
/// Sessions need exclusive access to run, so each sits behind a mutex.
pub struct OnnxFaceModel {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl OnnxFaceModel {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path, options: &SessionOptions) -> Result<Self, ModelError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE), options)?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE), options)?;
        tracing::info!(
            dir = %model_dir.display(),
            backend = ?options.backend,
            det_size = options.det_size,
            "face model ready"
        );
        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }
}

impl FaceModel for OnnxFaceModel {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceCandidate>, ModelError> {
        let boxes = self.detector.lock().map_err(|_| ModelError::Poisoned)?.detect(image)?;

        let mut recognizer = self.recognizer.lock().map_err(|_| ModelError::Poisoned)?;
        let mut candidates = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            if bbox.landmarks.is_none() {
                tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                continue;
            }
            let embedding = recognizer.extract(image, &bbox)?;
            candidates.push(FaceCandidate { bbox, embedding });
        }
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "buffalo_l"
    }
}
