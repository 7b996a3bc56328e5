//! Picks the most prominent face out of a model's candidates.

use crate::model::{FaceModel, ModelError};
use crate::types::{BoundingBox, Embedding, FaceCandidate};
use image::{imageops, RgbImage};
use std::sync::Arc;

/// The selected face: its pixel region and embedding.
#[derive(Debug, Clone)]
pub struct ExtractedFace {
    pub bbox: BoundingBox,
    pub crop: RgbImage,
    pub embedding: Embedding,
}

/// Wraps a [`FaceModel`] and reduces its output to a single face.
#[derive(Clone)]
pub struct FaceExtractor {
    model: Arc<dyn FaceModel>,
}

impl FaceExtractor {
    pub fn new(model: Arc<dyn FaceModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn FaceModel {
        self.model.as_ref()
    }

    /// Detect faces and return the largest one, or `None` if there are none.
    pub fn extract(&self, image: &RgbImage) -> Result<Option<ExtractedFace>, ModelError> {
        let candidates = self.model.detect_faces(image)?;
        let total = candidates.len();

        let Some(face) = select_largest(candidates) else {
            tracing::warn!(model = self.model.name(), "no face detected");
            return Ok(None);
        };

        let crop = crop_region(image, &face.bbox);
        tracing::info!(
            candidates = total,
            crop_width = crop.width(),
            crop_height = crop.height(),
            "face extracted"
        );

        Ok(Some(ExtractedFace {
            bbox: face.bbox,
            crop,
            embedding: face.embedding,
        }))
    }
}

/// Largest box area wins; on ties the earliest candidate is kept.
fn select_largest(candidates: Vec<FaceCandidate>) -> Option<FaceCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(b) if b.bbox.area() >= candidate.bbox.area() => Some(b),
        _ => Some(candidate),
    })
}

/// Cut out the box with corners rounded to whole pixels, clamped to the image.
fn crop_region(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    let clamp_x = |v: f32| v.round().clamp(0.0, image.width() as f32) as u32;
    let clamp_y = |v: f32| v.round().clamp(0.0, image.height() as f32) as u32;

    let (x1, y1) = (clamp_x(bbox.x), clamp_y(bbox.y));
    let (x2, y2) = (clamp_x(bbox.x2()), clamp_y(bbox.y2()));

    imageops::crop_imm(image, x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1)).to_image()
}
