//! faceprint-core: face extraction and matching.
//!
//! Decodes client image payloads, finds faces with SCRFD and embeds them with
//! ArcFace (both via ONNX Runtime), and scores embeddings against each other.

pub mod alignment;
pub mod decoder;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod model;
pub mod recognizer;
pub mod types;

pub use decoder::{decode, DecodeError};
pub use extractor::{ExtractedFace, FaceExtractor};
pub use matcher::{decide, similarity, Decision, DEFAULT_THRESHOLD};
pub use model::{ExecutionBackend, FaceModel, ModelError, OnnxFaceModel, SessionOptions};
pub use types::{BoundingBox, Embedding, FaceCandidate, FaceCrop, ImageSize};
