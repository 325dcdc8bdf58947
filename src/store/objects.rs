//! The commit object: one immutable snapshot of a blueprint on a branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;
use crate::hash::ObjectHash;

/// A single commit in a blueprint's history.
///
/// The commit's [`ObjectHash`] is computed from every field below except
/// `id` itself, so identical (parent, blueprint, message, timestamp) tuples
/// always hash the same way — the same content-addressing rule git applies
/// to its own objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    #[serde(skip)]
    pub id: ObjectHash,
    pub parent: Option<ObjectHash>,
    pub blueprint_name: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub blueprint: Blueprint,
}

impl Commit {
    pub fn new(
        parent: Option<ObjectHash>,
        blueprint_name: String,
        timestamp: DateTime<Utc>,
        message: String,
        blueprint: Blueprint,
    ) -> Commit {
        let mut commit = Commit {
            id: ObjectHash::of("commit", b""),
            parent,
            blueprint_name,
            timestamp,
            message,
            blueprint,
        };
        let payload = serde_json::to_vec(&commit).expect("commit content is always serializable");
        commit.id = ObjectHash::of("commit", &payload);
        commit
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("commit content is always serializable")
    }

    pub fn from_bytes(id: ObjectHash, bytes: &[u8]) -> crate::errors::Result<Commit> {
        let mut commit: Commit = serde_json::from_slice(bytes)
            .map_err(|e| crate::errors::ComposerError::StorageError(e.to_string()))?;
        commit.id = id;
        Ok(commit)
    }
}

/// A commit annotated with its revision number, if any tag points at it.
/// Returned by [`crate::store::BlueprintStore::list_commits`].
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub commit: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}
