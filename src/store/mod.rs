//! The blueprint store (C2): content-addressed persistence of blueprint
//! commits, with branches, tags, and a workspace overlay.
//!
//! Every public method here runs under a single exclusive `lock`, matching
//! the base spec's concurrency contract: callers never hold this lock
//! across I/O outside the store, and readers that need both the workspace
//! and the committed view acquire the lock once and release after both
//! reads.

pub mod objects;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;

use crate::blueprint::Blueprint;
use crate::errors::{ComposerError, Result};
use crate::hash::ObjectHash;

use objects::{Commit, CommitInfo};

/// Versioned repository of TOML blueprints, rooted at a directory that this
/// store owns exclusively.
pub struct BlueprintStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl BlueprintStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<BlueprintStore> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("refs").join("heads"))?;
        fs::create_dir_all(root.join("refs").join("tags"))?;
        fs::create_dir_all(root.join("workspace"))?;
        Ok(BlueprintStore {
            root,
            lock: Mutex::new(()),
        })
    }

    fn object_path(&self, id: ObjectHash) -> PathBuf {
        self.root.join("objects").join(id.shard()).join(id.rest())
    }

    fn head_path(&self, branch: &str, name: &str) -> PathBuf {
        self.root.join("refs").join("heads").join(branch).join(name)
    }

    fn tags_dir(&self, branch: &str, name: &str) -> PathBuf {
        self.root.join("refs").join("tags").join(branch).join(name)
    }

    fn workspace_path(&self, branch: &str, name: &str) -> PathBuf {
        self.root.join("workspace").join(branch).join(format!("{name}.toml"))
    }

    fn write_object(&self, commit: &Commit) -> Result<()> {
        let path = self.object_path(commit.id);
        if path.exists() {
            return Ok(());
        }
        fs::create_dir_all(path.parent().expect("object path has a parent"))?;
        fs::write(&path, commit.to_bytes())?;
        Ok(())
    }

    fn read_object(&self, id: ObjectHash) -> Result<Commit> {
        let path = self.object_path(id);
        let bytes = fs::read(&path)
            .map_err(|_| ComposerError::NotFound(format!("commit {id} not found")))?;
        Commit::from_bytes(id, &bytes)
    }

    fn read_head(&self, branch: &str, name: &str) -> Result<ObjectHash> {
        let bytes = fs::read_to_string(self.head_path(branch, name)).map_err(|_| {
            ComposerError::NotFound(format!("unknown blueprint '{name}' on branch '{branch}'"))
        })?;
        ObjectHash::from_str(bytes.trim()).map_err(ComposerError::StorageError)
    }

    fn write_head(&self, branch: &str, name: &str, id: ObjectHash) -> Result<()> {
        let path = self.head_path(branch, name);
        fs::create_dir_all(path.parent().expect("head path has a parent"))?;
        fs::write(&path, id.to_string())?;
        Ok(())
    }

    /// Names of all blueprints with at least one commit on `branch`.
    pub fn list(&self, branch: &str) -> Result<Vec<String>> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.root.join("refs").join("heads").join(branch);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// The branch tip's commit hash, for callers (e.g. compose submission)
    /// that need to pin which commit a snapshot was taken from.
    pub fn head_commit(&self, branch: &str, name: &str) -> Result<String> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.read_head(branch, name)?.to_string())
    }

    /// Read a blueprint at `commit`, or at the branch tip if `commit` is
    /// `None`.
    pub fn read_commit(&self, branch: &str, name: &str, commit: Option<&str>) -> Result<Blueprint> {
        let _guard = self.lock.lock().unwrap();
        let id = match commit {
            Some(hash) => ObjectHash::from_str(hash).map_err(ComposerError::StorageError)?,
            None => self.read_head(branch, name)?,
        };
        Ok(self.read_object(id)?.blueprint)
    }

    /// Read the workspace draft for `(branch, name)`, if one exists.
    pub fn read_workspace(&self, branch: &str, name: &str) -> Result<Option<Blueprint>> {
        let _guard = self.lock.lock().unwrap();
        self.read_workspace_locked(branch, name)
    }

    fn read_workspace_locked(&self, branch: &str, name: &str) -> Result<Option<Blueprint>> {
        let path = self.workspace_path(branch, name);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(Blueprint::parse_toml(&bytes)?))
    }

    /// Like [`Self::read_commit`] and [`Self::read_workspace`] together,
    /// under a single lock acquisition. Returns `(workspace, committed)`.
    pub fn read_both(&self, branch: &str, name: &str) -> (Result<Blueprint>, Result<Option<Blueprint>>) {
        let _guard = self.lock.lock().unwrap();
        let committed = self
            .read_head(branch, name)
            .and_then(|id| self.read_object(id))
            .map(|c| c.blueprint);
        let workspace = self.read_workspace_locked(branch, name);
        (committed, workspace)
    }

    /// Commit `blueprint` under `<name>.toml` on `branch`, bumping its
    /// version against the previous tip (if any), and refresh the
    /// workspace entry to match.
    pub fn commit(&self, branch: &str, name: &str, mut blueprint: Blueprint) -> Result<String> {
        let _guard = self.lock.lock().unwrap();

        let parent = self.read_head(branch, name).ok();
        let parent_blueprint = match parent {
            Some(id) => Some(self.read_object(id)?.blueprint),
            None => None,
        };
        let old_version = parent_blueprint.as_ref().and_then(|b| b.version.as_deref());
        blueprint.version = Some(crate::blueprint::version::bump_version(
            old_version,
            blueprint.version.as_deref(),
        )?);
        blueprint.validate()?;

        let message = format!(
            "Blueprint {name}, version {} saved.",
            blueprint.version.as_deref().unwrap_or_default()
        );
        let commit = Commit::new(parent, name.to_string(), Utc::now(), message, blueprint.clone());
        self.write_object(&commit)?;
        self.write_head(branch, name, commit.id)?;

        let ws_path = self.workspace_path(branch, name);
        fs::create_dir_all(ws_path.parent().expect("workspace path has a parent"))?;
        fs::write(&ws_path, blueprint.to_toml()?)?;

        Ok(commit.id.to_string())
    }

    /// Upsert the workspace draft, independent of commit history.
    pub fn workspace_write(&self, branch: &str, name: &str, blueprint: &Blueprint) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.workspace_path(branch, name);
        fs::create_dir_all(path.parent().expect("workspace path has a parent"))?;
        fs::write(&path, blueprint.to_toml()?)?;
        Ok(())
    }

    /// Remove the workspace draft; committed history is untouched.
    pub fn workspace_delete(&self, branch: &str, name: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.workspace_path(branch, name);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Remove `name` from the branch tip (recoverable via [`Self::revert`]
    /// against an earlier commit hash) and clear its workspace entry.
    pub fn delete(&self, branch: &str, name: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let head = self.head_path(branch, name);
        if head.is_file() {
            fs::remove_file(head)?;
        }
        let ws_path = self.workspace_path(branch, name);
        if ws_path.is_file() {
            fs::remove_file(ws_path)?;
        }
        Ok(())
    }

    /// Create a new commit whose content equals the blueprint at `commit`.
    pub fn revert(&self, branch: &str, name: &str, commit: &str) -> Result<String> {
        let _guard = self.lock.lock().unwrap();
        let target_id = ObjectHash::from_str(commit).map_err(ComposerError::StorageError)?;
        let target = self.read_object(target_id)?;

        let parent = self.read_head(branch, name).ok();
        let message = format!("{name}.toml reverted to commit {commit}");
        let new_commit = Commit::new(parent, name.to_string(), Utc::now(), message, target.blueprint.clone());
        self.write_object(&new_commit)?;
        self.write_head(branch, name, new_commit.id)?;

        let ws_path = self.workspace_path(branch, name);
        fs::create_dir_all(ws_path.parent().expect("workspace path has a parent"))?;
        fs::write(&ws_path, target.blueprint.to_toml()?)?;

        Ok(new_commit.id.to_string())
    }

    /// Walk the commit chain from the tip backward, newest first, applying
    /// `offset`/`limit`. Commits carrying a tagged revision include it.
    pub fn list_commits(&self, branch: &str, name: &str, offset: usize, limit: usize) -> Result<Vec<CommitInfo>> {
        let _guard = self.lock.lock().unwrap();
        let revisions = self.revision_map_locked(branch, name)?;

        let mut out = Vec::new();
        let mut cursor = self.read_head(branch, name).ok();
        while let Some(id) = cursor {
            let commit = self.read_object(id)?;
            out.push(CommitInfo {
                commit: commit.id.to_string(),
                message: commit.message.clone(),
                timestamp: commit.timestamp,
                revision: revisions.get(&commit.id.to_string()).copied(),
            });
            cursor = commit.parent;
        }

        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    /// Assign the next per-blueprint revision to the tip commit. Returns
    /// `false`, without creating a new tag, if the tip is already tagged.
    pub fn tag(&self, branch: &str, name: &str) -> Result<bool> {
        let _guard = self.lock.lock().unwrap();
        let tip = self.read_head(branch, name)?;
        let revisions = self.revision_map_locked(branch, name)?;
        if revisions.contains_key(&tip.to_string()) {
            return Ok(false);
        }

        let next = revisions.values().copied().max().unwrap_or(0) + 1;
        let tags_dir = self.tags_dir(branch, name);
        fs::create_dir_all(&tags_dir)?;
        fs::write(tags_dir.join(format!("r{next}")), tip.to_string())?;
        Ok(true)
    }

    fn revision_map_locked(&self, branch: &str, name: &str) -> Result<std::collections::HashMap<String, u64>> {
        let dir = self.tags_dir(branch, name);
        let mut map = std::collections::HashMap::new();
        if !dir.is_dir() {
            return Ok(map);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(rev_str) = file_name.strip_prefix('r') else {
                continue;
            };
            let Ok(rev) = rev_str.parse::<u64>() else {
                continue;
            };
            let target = fs::read_to_string(entry.path())?.trim().to_string();
            map.insert(target, rev);
        }
        Ok(map)
    }

    /// Every branch name with at least one blueprint committed.
    pub fn branches(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().unwrap();
        let dir = self.root.join("refs").join("heads");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut branches: HashSet<String> = HashSet::new();
        for entry in fs::read_dir(&dir)? {
            if let Ok(name) = entry?.file_name().into_string() {
                branches.insert(name);
            }
        }
        let mut branches: Vec<String> = branches.into_iter().collect();
        branches.sort();
        Ok(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Dependency;

    fn store() -> (tempfile::TempDir, BlueprintStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlueprintStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn bp(name: &str, version: Option<&str>) -> Blueprint {
        Blueprint {
            name: name.to_string(),
            description: "d".to_string(),
            version: version.map(str::to_string),
            modules: vec![],
            packages: vec![Dependency {
                name: "python".to_string(),
                version: "2.7.*".to_string(),
            }],
        }
    }

    #[test]
    fn commit_bumps_version_and_lists_name() {
        let (_dir, store) = store();
        store.commit("master", "glusterfs", bp("glusterfs", Some("0.2.0"))).unwrap();
        let b = store.read_commit("master", "glusterfs", None).unwrap();
        assert_eq!(b.version.as_deref(), Some("0.2.1"));
        assert_eq!(store.list("master").unwrap(), vec!["glusterfs".to_string()]);
    }

    #[test]
    fn workspace_shadows_commit_until_cleared() {
        let (_dir, store) = store();
        store.commit("master", "x", bp("x", Some("0.0.1"))).unwrap();
        assert!(store.read_workspace("master", "x").unwrap().is_none());

        let mut draft = bp("x", Some("0.0.1"));
        draft.description = "changed".to_string();
        store.workspace_write("master", "x", &draft).unwrap();
        assert_eq!(store.read_workspace("master", "x").unwrap().unwrap().description, "changed");

        store.workspace_delete("master", "x").unwrap();
        assert!(store.read_workspace("master", "x").unwrap().is_none());
    }

    #[test]
    fn tag_is_idempotent() {
        let (_dir, store) = store();
        store.commit("master", "x", bp("x", Some("0.0.1"))).unwrap();
        assert!(store.tag("master", "x").unwrap());
        assert!(!store.tag("master", "x").unwrap());
    }

    #[test]
    fn revert_creates_new_commit_with_old_content() {
        let (_dir, store) = store();
        let first = store.commit("master", "x", bp("x", Some("0.0.1"))).unwrap();
        store.commit("master", "x", bp("x", Some("0.5.0"))).unwrap();

        let reverted = store.revert("master", "x", &first).unwrap();
        assert_ne!(reverted, first);
        let b = store.read_commit("master", "x", None).unwrap();
        assert_eq!(b.version.as_deref(), Some("0.0.1"));
    }

    #[test]
    fn list_commits_is_newest_first_and_paged() {
        let (_dir, store) = store();
        store.commit("master", "x", bp("x", Some("0.0.1"))).unwrap();
        store.commit("master", "x", bp("x", Some("0.2.0"))).unwrap();
        store.commit("master", "x", bp("x", Some("0.3.0"))).unwrap();

        let commits = store.list_commits("master", "x", 0, 20).unwrap();
        assert_eq!(commits.len(), 3);
        assert!(commits[0].message.contains("0.3.0"));
        assert!(commits[2].message.contains("0.0.1"));

        let page = store.list_commits("master", "x", 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].message.contains("0.2.0"));
    }

    #[test]
    fn delete_then_recommit_starts_fresh_history() {
        let (_dir, store) = store();
        store.commit("master", "x", bp("x", Some("0.0.1"))).unwrap();
        store.delete("master", "x").unwrap();
        assert!(store.list("master").unwrap().is_empty());
        assert!(store.read_commit("master", "x", None).is_err());
    }
}
