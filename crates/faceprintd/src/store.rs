//! User id → face embedding store, mirrored to a JSON snapshot on disk.
//!
//! The whole map is rewritten after every successful mutation while the
//! write lock is still held, so snapshots never interleave. A failed write is
//! logged and the in-memory change stands.

use chrono::{DateTime, Utc};
use faceprint_core::{Embedding, FaceCrop, ImageSize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),
    #[error("user '{0}' not found")]
    NotFound(String),
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A registered user's face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub embedding: Embedding,
    pub face_crop: FaceCrop,
    pub created_at: DateTime<Utc>,
    pub image_size: ImageSize,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            image_size: self.image_size,
        }
    }
}

/// Public metadata of a record, without embedding or pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub image_size: ImageSize,
}

#[derive(Deserialize)]
struct Snapshot {
    users: Vec<UserRecord>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    users: Vec<&'a UserRecord>,
}

#[derive(Default)]
struct Users {
    records: HashMap<String, UserRecord>,
    /// Insertion order of `records` keys.
    order: Vec<String>,
}

impl Users {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut users = Users::default();
        for record in snapshot.users {
            if users.records.contains_key(&record.user_id) {
                tracing::warn!(user_id = %record.user_id, "duplicate user in snapshot, keeping first");
                continue;
            }
            users.order.push(record.user_id.clone());
            users.records.insert(record.user_id.clone(), record);
        }
        users
    }

    fn ordered(&self) -> impl Iterator<Item = &UserRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

/// Process-wide embedding store.
pub struct EmbeddingStore {
    path: PathBuf,
    users: RwLock<Users>,
}

impl EmbeddingStore {
    /// Open the store at `path`, loading an existing snapshot if there is one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            users: RwLock::new(Users::default()),
        };
        let count = store.load()?;
        tracing::info!(path = %store.path.display(), users = count, "embedding store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory map with the snapshot on disk.
    ///
    /// A missing snapshot file loads as an empty store.
    pub fn load(&self) -> Result<usize, StoreError> {
        let users = match std::fs::read(&self.path) {
            Ok(bytes) => Users::from_snapshot(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no snapshot found, starting empty");
                Users::default()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let count = users.order.len();
        *self.write() = users;
        Ok(count)
    }

    /// Write the full current map to disk.
    pub fn persist(&self) -> Result<(), StoreError> {
        let users = self.read();
        write_snapshot(&self.path, &users)
    }

    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.read().records.get(user_id).cloned()
    }

    /// The stored embedding alone, without cloning the face crop.
    pub fn embedding(&self, user_id: &str) -> Option<Embedding> {
        self.read().records.get(user_id).map(|record| record.embedding.clone())
    }

    /// Insert a new record. Never overwrites; returns the new user count.
    pub fn put(&self, record: UserRecord) -> Result<usize, StoreError> {
        let mut users = self.write();
        if users.records.contains_key(&record.user_id) {
            return Err(StoreError::AlreadyExists(record.user_id));
        }

        let user_id = record.user_id.clone();
        users.order.push(user_id.clone());
        users.records.insert(user_id.clone(), record);
        self.persist_locked(&users);

        tracing::info!(user_id = %user_id, users = users.order.len(), "user stored");
        Ok(users.order.len())
    }

    /// Remove a record, returning it.
    pub fn delete(&self, user_id: &str) -> Result<UserRecord, StoreError> {
        let mut users = self.write();
        let record = users
            .records
            .remove(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        users.order.retain(|id| id != user_id);
        self.persist_locked(&users);

        tracing::info!(user_id, users = users.order.len(), "user deleted");
        Ok(record)
    }

    /// Summaries of all records in insertion order.
    pub fn list(&self) -> Vec<UserSummary> {
        self.read().ordered().map(UserRecord::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    fn persist_locked(&self, users: &Users) {
        if let Err(e) = write_snapshot(&self.path, users) {
            tracing::error!(error = %e, path = %self.path.display(), "failed to persist snapshot; in-memory state kept");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Users> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Users> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serialize to a sibling temp file, then rename over the snapshot.
fn write_snapshot(path: &Path, users: &Users) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let snapshot = SnapshotRef {
        users: users.ordered().collect(),
    };
    let bytes = serde_json::to_vec(&snapshot)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;

    tracing::debug!(path = %path.display(), users = snapshot.users.len(), "snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, values: &[f32]) -> UserRecord {
        let face_crop = FaceCrop {
            width: 2,
            height: 1,
            pixels: vec![1, 2, 3, 4, 5, 6],
        };
        UserRecord {
            user_id: id.to_string(),
            embedding: Embedding::new(values.to_vec()),
            image_size: face_crop.size(),
            face_crop,
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_open_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path().join("users.json")).unwrap();
        assert_eq!(store.len(), 0);
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_put_get_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path().join("users.json")).unwrap();
        assert_eq!(store.put(record("alice", &[1.0, 0.0])).unwrap(), 1);
        assert_eq!(store.put(record("bob", &[0.0, 1.0])).unwrap(), 2);
        assert_eq!(store.get("alice").unwrap().embedding.values, vec![1.0, 0.0]);
        assert!(store.get("carol").is_none());
        assert!(store.get("bob").is_some());
    }

    #[test]
    fn test_embedding_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path().join("users.json")).unwrap();
        store.put(record("alice", &[0.5, 0.25])).unwrap();
        assert_eq!(store.embedding("alice").unwrap().values, vec![0.5, 0.25]);
        assert!(store.embedding("bob").is_none());
    }

    #[test]
    fn test_put_duplicate_fails_and_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path().join("users.json")).unwrap();
        store.put(record("alice", &[1.0, 0.0])).unwrap();

        let err = store.put(record("alice", &[0.0, 1.0])).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref id) if id == "alice"));
        assert_eq!(store.get("alice").unwrap().embedding.values, vec![1.0, 0.0]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_missing_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path().join("users.json")).unwrap();
        store.put(record("alice", &[1.0])).unwrap();

        assert!(matches!(store.delete("bob"), Err(StoreError::NotFound(_))));
        assert_eq!(store.len(), 1);
        assert!(store.get("alice").is_some());
    }

    #[test]
    fn test_delete_removes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        store.put(record("alice", &[1.0])).unwrap();
        store.put(record("bob", &[2.0])).unwrap();

        let removed = store.delete("alice").unwrap();
        assert_eq!(removed.user_id, "alice");

        let reopened = EmbeddingStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get("alice").is_none());
        assert!(reopened.get("bob").is_some());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        for id in ["zed", "amy", "mia", "bo"] {
            store.put(record(id, &[1.0])).unwrap();
        }
        store.delete("mia").unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|s| s.user_id).collect();
        assert_eq!(ids, ["zed", "amy", "bo"]);

        let reopened = EmbeddingStore::open(&path).unwrap();
        let ids: Vec<String> = reopened.list().into_iter().map(|s| s.user_id).collect();
        assert_eq!(ids, ["zed", "amy", "bo"]);
    }

    #[test]
    fn test_persist_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        let alice = record("alice", &[0.25, -0.5, 0.125]);
        let bob = record("bob", &[3.0, 4.0, 5.0]);
        store.put(alice.clone()).unwrap();
        store.put(bob.clone()).unwrap();
        store.persist().unwrap();

        let fresh = EmbeddingStore::open(&path).unwrap();
        assert_eq!(fresh.get("alice"), Some(alice));
        assert_eq!(fresh.get("bob"), Some(bob));
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_load_replaces_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        store.put(record("alice", &[1.0])).unwrap();

        let other = EmbeddingStore::open(&path).unwrap();
        other.put(record("bob", &[1.0])).unwrap();

        assert_eq!(store.load().unwrap(), 2);
        assert!(store.get("bob").is_some());
    }

    #[test]
    fn test_persist_failure_keeps_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        // A directory squatting on the temp file name makes every write fail
        std::fs::create_dir(dir.path().join(".users.json.tmp")).unwrap();

        assert_eq!(store.put(record("alice", &[1.0])).unwrap(), 1);
        assert!(store.get("alice").is_some());
        assert!(matches!(store.persist(), Err(StoreError::Io { .. })));
        assert!(!path.exists());
        store.delete("alice").unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(EmbeddingStore::open(&path), Err(StoreError::Encoding(_))));
    }

    #[test]
    fn test_snapshot_stores_crop_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = EmbeddingStore::open(&path).unwrap();
        store.put(record("alice", &[1.0])).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let user = &raw["users"][0];
        assert_eq!(user["face_crop"]["pixels"], "AQIDBAUG");
        assert_eq!(user["image_size"], serde_json::json!([1, 2, 3]));
    }
}
