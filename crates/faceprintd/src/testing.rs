//! Deterministic face model and payload builders for unit tests.

use crate::service::FaceService;
use crate::store::EmbeddingStore;
use faceprint_core::decoder::encode_base64;
use faceprint_core::{BoundingBox, Embedding, FaceCandidate, FaceModel, ModelError};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

/// Side length of the square test images.
pub const FACE_SIZE: u32 = 64;

/// Finds one face in the centre of any image that is not entirely black.
/// The embedding is the mean RGB colour, so equal colours match exactly.
pub struct StubModel;

impl FaceModel for StubModel {
    fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceCandidate>, ModelError> {
        if image.pixels().all(|p| p.0 == [0, 0, 0]) {
            return Ok(Vec::new());
        }

        let (w, h) = (image.width() as f32, image.height() as f32);
        let mut sum = [0f32; 3];
        for p in image.pixels() {
            for (acc, c) in sum.iter_mut().zip(p.0) {
                *acc += c as f32;
            }
        }
        let n = (image.width() * image.height()) as f32;

        let mut bbox = BoundingBox::from_corners(w / 4.0, h / 4.0, w * 3.0 / 4.0, h * 3.0 / 4.0);
        bbox.confidence = 0.99;
        Ok(vec![FaceCandidate {
            bbox,
            embedding: Embedding::new(sum.iter().map(|s| s / n).collect()),
        }])
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Fails every inference and reports itself unready.
pub struct BrokenModel;

impl FaceModel for BrokenModel {
    fn detect_faces(&self, _image: &RgbImage) -> Result<Vec<FaceCandidate>, ModelError> {
        Err(ModelError::Poisoned)
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "broken"
    }
}

pub fn service_with(model: Arc<dyn FaceModel>, store_path: PathBuf) -> FaceService {
    let store = EmbeddingStore::open(store_path).unwrap();
    FaceService::new(model, store, faceprint_core::DEFAULT_THRESHOLD)
}

/// PNG data URL of a solid-colour square.
pub fn face_payload(color: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(FACE_SIZE, FACE_SIZE, Rgb(color));
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", encode_base64(&png))
}

/// A valid image the stub finds no face in.
pub fn blank_payload() -> String {
    face_payload([0, 0, 0])
}
