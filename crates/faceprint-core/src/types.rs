use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Build a box from corner coordinates `(x1, y1)`–`(x2, y2)`.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: 1.0,
            landmarks: None,
        }
    }

    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    /// Box area (width × height). Degenerate boxes have zero area.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace w600k_r50).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) norm of the vector.
    ///
    /// Accumulated in `f64`, which cannot overflow or underflow for any finite
    /// `f32` components.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }
}

/// One face reported by a [`FaceModel`](crate::model::FaceModel).
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Shape of a stored face crop as `(height, width, channels)`.
///
/// Serialized as a three-element array `[h, w, c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl From<[u32; 3]> for ImageSize {
    fn from([height, width, channels]: [u32; 3]) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

impl From<ImageSize> for [u32; 3] {
    fn from(size: ImageSize) -> Self {
        [size.height, size.width, size.channels]
    }
}

/// Raw RGB pixels of a detected face region.
///
/// Kept for inspection only; comparisons use the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceCrop {
    pub width: u32,
    pub height: u32,
    #[serde(with = "crate::decoder::base64_bytes")]
    pub pixels: Vec<u8>,
}

impl FaceCrop {
    pub fn size(&self) -> ImageSize {
        ImageSize {
            height: self.height,
            width: self.width,
            channels: 3,
        }
    }
}

impl From<RgbImage> for FaceCrop {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }
}
