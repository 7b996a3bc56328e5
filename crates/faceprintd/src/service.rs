//! Registration and comparison use cases.
//!
//! `FaceService` owns the extractor and the store and is shared by all request
//! handlers. Every operation returns a typed result; nothing here panics on
//! bad input.

use crate::store::{EmbeddingStore, StoreError, UserRecord, UserSummary};
use chrono::{DateTime, Utc};
use faceprint_core::{
    decide, decoder, similarity, DecodeError, Embedding, FaceCrop, FaceExtractor, FaceModel, ModelError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid image data: {0}")]
    InvalidImage(#[from] DecodeError),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("user '{0}' not found, register first")]
    UserNotFound(String),
    #[error("user '{0}' already exists, choose a different user id")]
    UserAlreadyExists(String),
    #[error("face model failed: {0}")]
    Model(#[from] ModelError),
    #[error("face model not ready")]
    ModelUnavailable,
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(id) => Self::UserAlreadyExists(id),
            StoreError::NotFound(id) => Self::UserNotFound(id),
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub user_id: String,
    pub face_data: &'static str,
    pub face_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub similarity: f32,
    pub is_match: bool,
    pub confidence: f32,
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchComparison {
    pub results: Vec<BatchItem>,
    pub errors: Vec<BatchFailure>,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub users: Vec<UserSummary>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub user_count: usize,
    pub model_loaded: bool,
    pub model: String,
}

pub struct FaceService {
    extractor: FaceExtractor,
    store: EmbeddingStore,
    default_threshold: f32,
}

impl FaceService {
    pub fn new(model: Arc<dyn FaceModel>, store: EmbeddingStore, default_threshold: f32) -> Self {
        Self {
            extractor: FaceExtractor::new(model),
            store,
            default_threshold,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.extractor.model().is_ready()
    }

    /// Detect a face in `payload` and store it under `user_id`.
    pub fn register(&self, user_id: &str, payload: &str) -> Result<Registration, ServiceError> {
        let image = decoder::decode(payload)?;
        let face = self.extractor.extract(&image)?.ok_or(ServiceError::NoFaceDetected)?;

        let crop = FaceCrop::from(face.crop);
        let record = UserRecord {
            user_id: user_id.to_string(),
            embedding: face.embedding,
            image_size: crop.size(),
            face_crop: crop,
            created_at: Utc::now(),
        };
        let face_count = self.store.put(record)?;

        tracing::info!(user_id, face_count, "face registered");
        Ok(Registration {
            user_id: user_id.to_string(),
            face_data: "registered",
            face_count,
        })
    }

    /// Compare the face in `payload` against `user_id`'s stored face.
    pub fn compare(&self, user_id: &str, payload: &str, threshold: Option<f32>) -> Result<Comparison, ServiceError> {
        let stored = self.store.embedding(user_id);
        self.compare_payload(user_id, stored.as_ref(), payload, threshold.unwrap_or(self.default_threshold))
    }

    /// The user lookup is checked before the payload is decoded.
    fn compare_payload(
        &self,
        user_id: &str,
        stored: Option<&Embedding>,
        payload: &str,
        threshold: f32,
    ) -> Result<Comparison, ServiceError> {
        let stored = stored.ok_or_else(|| ServiceError::UserNotFound(user_id.to_string()))?;
        let image = decoder::decode(payload)?;
        let face = self.extractor.extract(&image)?.ok_or(ServiceError::NoFaceDetected)?;

        let score = similarity(&face.embedding, stored);
        let decision = decide(score, threshold);

        tracing::info!(
            user_id,
            similarity = score,
            threshold,
            is_match = decision.is_match,
            "face compared"
        );
        Ok(Comparison {
            similarity: score,
            is_match: decision.is_match,
            confidence: decision.confidence,
            threshold,
        })
    }

    /// Compare each payload independently; one failure never aborts the batch.
    pub fn compare_batch(&self, user_id: &str, payloads: &[String], threshold: Option<f32>) -> BatchComparison {
        let stored = self.store.embedding(user_id);
        let threshold = threshold.unwrap_or(self.default_threshold);
        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (index, payload) in payloads.iter().enumerate() {
            match self.compare_payload(user_id, stored.as_ref(), payload, threshold) {
                Ok(comparison) => results.push(BatchItem { index, comparison }),
                Err(e) => {
                    tracing::warn!(user_id, index, error = %e, "batch item failed");
                    errors.push(BatchFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            user_id,
            total = payloads.len(),
            succeeded = results.len(),
            failed = errors.len(),
            "batch comparison complete"
        );
        BatchComparison {
            total: payloads.len(),
            success_count: results.len(),
            error_count: errors.len(),
            results,
            errors,
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<UserSummary, ServiceError> {
        self.store
            .get(user_id)
            .map(|record| record.summary())
            .ok_or_else(|| ServiceError::UserNotFound(user_id.to_string()))
    }

    pub fn list_users(&self) -> UserList {
        let users = self.store.list();
        UserList {
            total_count: users.len(),
            users,
        }
    }

    pub fn delete_user(&self, user_id: &str) -> Result<(), ServiceError> {
        self.store.delete(user_id)?;
        Ok(())
    }

    pub fn health(&self) -> Health {
        let ready = self.is_ready();
        Health {
            status: if ready { "healthy" } else { "unavailable" },
            timestamp: Utc::now(),
            user_count: self.store.len(),
            model_loaded: ready,
            model: self.extractor.model().name().to_string(),
        }
    }

    /// Final best-effort snapshot at shutdown.
    pub fn shutdown(&self) {
        match self.store.persist() {
            Ok(()) => tracing::info!(
                path = %self.store.path().display(),
                users = self.store.len(),
                "store persisted at shutdown"
            ),
            Err(e) => tracing::error!(error = %e, "failed to persist store at shutdown"),
        }
    }
}
