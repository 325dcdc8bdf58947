//! The compose queue (C4): a crash-safe, directory-as-state-machine image
//! build queue.
//!
//! A build's directory lives in exactly one of `queue/new/`, `queue/run/`,
//! or `results/` at any instant; moving it between them (a single atomic
//! rename) IS the state transition. In-memory state (the [`BuildMeta`]
//! index and cancellation flags) is a cache rebuilt from disk at startup;
//! the directory tree is the durable truth.

pub mod worker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::blueprint::Blueprint;
use crate::config::Config;
use crate::errors::{ComposerError, Result};

/// The four states a build passes through. Serializes to the uppercase
/// strings the `STATUS` marker file and the JSON API both use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Waiting,
    Running,
    Finished,
    Failed,
}

impl Status {
    fn as_marker(&self) -> &'static str {
        match self {
            Status::Waiting => "WAITING",
            Status::Running => "RUNNING",
            Status::Finished => "FINISHED",
            Status::Failed => "FAILED",
        }
    }

    fn parse_marker(s: &str) -> Result<Status> {
        match s.trim() {
            "WAITING" => Ok(Status::Waiting),
            "RUNNING" => Ok(Status::Running),
            "FINISHED" => Ok(Status::Finished),
            "FAILED" => Ok(Status::Failed),
            other => Err(ComposerError::QueueError(format!("unknown STATUS value '{other}'"))),
        }
    }
}

/// The request body of `POST /compose`, plus the 0/1/2 test mode that lets
/// the worker skip the real image builder entirely.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub blueprint_name: String,
    pub branch: String,
    pub compose_type: String,
    pub test_mode: u8,
}

/// Submission-time metadata, persisted as `compose.json` inside the build
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeMeta {
    pub blueprint_name: String,
    pub branch: String,
    pub compose_type: String,
    pub source_commit: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub test_mode: u8,
    pub image_name: String,
}

/// The output artifact's filename for a given blueprint/compose type pair.
pub fn image_file_name(blueprint_name: &str, compose_type: &str) -> String {
    let ext = match compose_type {
        "tar" => "tar",
        "live-iso" => "iso",
        "qcow2" => "qcow2",
        "vhd" => "vhd",
        "vmdk" => "vmdk",
        "ami" | "partitioned-disk" => "img",
        _ => "bin",
    };
    format!("{blueprint_name}.{ext}")
}

/// Render the installer kickstart for a frozen blueprint. The real
/// kickstart-templating toolchain is an external collaborator (out of
/// scope, per SPEC_FULL.md §1); this renders the minimal `%packages`
/// section a kickstart needs, which is all the queue itself depends on.
fn render_kickstart(blueprint: &Blueprint, nevras: &[crate::catalog::Nevra]) -> String {
    let mut ks = String::new();
    ks.push_str("# generated by composer for blueprint \"");
    ks.push_str(&blueprint.name);
    ks.push_str("\"\n");
    ks.push_str("lang en_US.UTF-8\n");
    ks.push_str("keyboard us\n");
    ks.push_str("timezone UTC\n");
    ks.push_str("\n%packages\n");
    for n in nevras {
        ks.push_str(&n.name);
        ks.push('\n');
    }
    ks.push_str("%end\n");
    ks
}

/// In-memory summary of one build, kept current from disk at submit time,
/// on every state transition, and by startup reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct BuildMeta {
    pub uuid: Uuid,
    pub status: Status,
    pub compose_type: String,
    pub blueprint_name: String,
    pub branch: String,
    pub submitted_at: DateTime<Utc>,
}

/// The on-disk queue plus its in-memory index, cancellation flags, and the
/// notifier that wakes the worker loop.
pub struct ComposeQueue {
    config: Arc<Config>,
    index: Mutex<HashMap<Uuid, BuildMeta>>,
    cancel_flags: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
    pub(crate) notify: Arc<Notify>,
    /// Guards `new/` -> `run/` renames; never held across subprocess I/O.
    run_lock: Mutex<()>,
}

const KNOWN_COMPOSE_TYPES: &[&str] =
    &["tar", "live-iso", "partitioned-disk", "qcow2", "ami", "vhd", "vmdk"];

impl ComposeQueue {
    /// Open the queue rooted at `config`'s directories, creating them if
    /// absent, and perform startup reconciliation: any build left in
    /// `queue/run/` from a prior crash is reclassified FAILED and moved to
    /// `results/`.
    pub fn open(config: Arc<Config>) -> Result<ComposeQueue> {
        std::fs::create_dir_all(config.queue_new_dir())?;
        std::fs::create_dir_all(config.queue_run_dir())?;
        std::fs::create_dir_all(config.results_dir())?;

        let queue = ComposeQueue {
            config,
            index: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
            notify: Arc::new(Notify::new()),
            run_lock: Mutex::new(()),
        };
        queue.reconcile_startup()?;
        queue.rebuild_index()?;
        Ok(queue)
    }

    fn reconcile_startup(&self) -> Result<()> {
        let run_dir = self.config.queue_run_dir();
        for entry in std::fs::read_dir(&run_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let uuid = entry.file_name();
            tracing::warn!(uuid = ?uuid, "reclassifying build left in run/ at startup as FAILED");
            write_status(&entry.path(), Status::Failed, Some("interrupted by daemon restart"))?;
            let dest = self.config.results_dir().join(&uuid);
            std::fs::rename(entry.path(), dest)?;
        }
        Ok(())
    }

    fn rebuild_index(&self) -> Result<()> {
        let mut index = self.index.lock().unwrap();
        for (dir, status) in [
            (self.config.queue_new_dir(), Status::Waiting),
            (self.config.queue_run_dir(), Status::Running),
        ] {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let Ok(meta) = read_compose_meta(&entry.path()) else {
                    continue;
                };
                let Some(uuid) = entry.file_name().to_str().and_then(|s| Uuid::parse_str(s).ok()) else {
                    continue;
                };
                index.insert(
                    uuid,
                    BuildMeta {
                        uuid,
                        status,
                        compose_type: meta.compose_type,
                        blueprint_name: meta.blueprint_name,
                        branch: meta.branch,
                        submitted_at: meta.submitted_at,
                    },
                );
            }
        }
        for entry in std::fs::read_dir(self.config.results_dir())? {
            let entry = entry?;
            let Ok(meta) = read_compose_meta(&entry.path()) else {
                continue;
            };
            let Some(uuid) = entry.file_name().to_str().and_then(|s| Uuid::parse_str(s).ok()) else {
                continue;
            };
            let status = read_status(&entry.path()).unwrap_or(Status::Failed);
            index.insert(
                uuid,
                BuildMeta {
                    uuid,
                    status,
                    compose_type: meta.compose_type,
                    blueprint_name: meta.blueprint_name,
                    branch: meta.branch,
                    submitted_at: meta.submitted_at,
                },
            );
        }
        Ok(())
    }

    fn build_dir(&self, uuid: Uuid) -> Result<PathBuf> {
        let index = self.index.lock().unwrap();
        let meta = index
            .get(&uuid)
            .ok_or_else(|| ComposerError::NotFound(format!("unknown build {uuid}")))?;
        Ok(self.location_dir(meta.status).join(uuid.to_string()))
    }

    fn location_dir(&self, status: Status) -> PathBuf {
        match status {
            Status::Waiting => self.config.queue_new_dir(),
            Status::Running => self.config.queue_run_dir(),
            Status::Finished | Status::Failed => self.config.results_dir(),
        }
    }

    /// Create a new build directory in `queue/new/`, write its fixed
    /// contents (blueprint, compose metadata, NEVRA manifest), and wake the
    /// worker. Not idempotent: a retried submission creates a second build.
    pub fn submit(
        &self,
        request: ComposeRequest,
        blueprint: &Blueprint,
        source_commit: Option<String>,
        nevras: &[crate::catalog::Nevra],
    ) -> Result<Uuid> {
        if !KNOWN_COMPOSE_TYPES.contains(&request.compose_type.as_str()) {
            return Err(ComposerError::QueueError(format!(
                "unknown compose type '{}'",
                request.compose_type
            )));
        }

        let uuid = Uuid::new_v4();
        let dir = self.config.queue_new_dir().join(uuid.to_string());
        std::fs::create_dir_all(dir.join("logs"))?;
        std::fs::write(dir.join("blueprint.toml"), blueprint.to_toml()?)?;

        let image_name = image_file_name(&request.blueprint_name, &request.compose_type);
        let meta = ComposeMeta {
            blueprint_name: request.blueprint_name.clone(),
            branch: request.branch.clone(),
            compose_type: request.compose_type.clone(),
            source_commit,
            submitted_at: Utc::now(),
            test_mode: request.test_mode,
            image_name,
        };
        std::fs::write(
            dir.join("compose.json"),
            serde_json::to_vec_pretty(&meta).map_err(|e| ComposerError::QueueError(e.to_string()))?,
        )?;
        std::fs::write(
            dir.join("deps.json"),
            serde_json::to_vec_pretty(nevras).map_err(|e| ComposerError::QueueError(e.to_string()))?,
        )?;
        std::fs::write(dir.join("final-kickstart.ks"), render_kickstart(blueprint, nevras))?;
        write_status(&dir, Status::Waiting, None)?;

        self.index.lock().unwrap().insert(
            uuid,
            BuildMeta {
                uuid,
                status: Status::Waiting,
                compose_type: meta.compose_type,
                blueprint_name: meta.blueprint_name,
                branch: meta.branch,
                submitted_at: meta.submitted_at,
            },
        );

        self.notify.notify_one();
        Ok(uuid)
    }

    /// A snapshot of every non-terminal build, new first then running.
    pub fn queue_status(&self) -> (Vec<BuildMeta>, Vec<BuildMeta>) {
        let index = self.index.lock().unwrap();
        let mut new: Vec<BuildMeta> = index.values().filter(|b| b.status == Status::Waiting).cloned().collect();
        let mut running: Vec<BuildMeta> =
            index.values().filter(|b| b.status == Status::Running).cloned().collect();
        new.sort_by_key(|b| b.submitted_at);
        running.sort_by_key(|b| b.submitted_at);
        (new, running)
    }

    /// Every build whose terminal status matches `status`.
    pub fn build_status(&self, status: Status) -> Vec<BuildMeta> {
        let index = self.index.lock().unwrap();
        let mut out: Vec<BuildMeta> = index.values().filter(|b| b.status == status).cloned().collect();
        out.sort_by_key(|b| b.submitted_at);
        out
    }

    pub fn uuid_status(&self, uuid: Uuid) -> Result<BuildMeta> {
        let index = self.index.lock().unwrap();
        index
            .get(&uuid)
            .cloned()
            .ok_or_else(|| ComposerError::NotFound(format!("unknown build {uuid}")))
    }

    /// Full `compose.json` + `deps.json` + status for one build.
    pub fn uuid_info(&self, uuid: Uuid) -> Result<(ComposeMeta, Vec<crate::catalog::Nevra>, Status)> {
        let dir = self.build_dir(uuid)?;
        let meta = read_compose_meta(&dir)?;
        let deps_bytes = std::fs::read(dir.join("deps.json"))?;
        let deps: Vec<crate::catalog::Nevra> =
            serde_json::from_slice(&deps_bytes).map_err(|e| ComposerError::QueueError(e.to_string()))?;
        let status = read_status(&dir)?;
        Ok((meta, deps, status))
    }

    /// Request cooperative cancellation of a WAITING or RUNNING build.
    pub fn uuid_cancel(&self, uuid: Uuid) -> Result<()> {
        let status = self.uuid_status(uuid)?.status;
        if status != Status::Waiting && status != Status::Running {
            return Err(ComposerError::CancelError(format!(
                "build {uuid} is not cancellable in state {status:?}"
            )));
        }
        if let Some(flag) = self.cancel_flags.lock().unwrap().get(&uuid) {
            flag.store(true, Ordering::SeqCst);
        }
        if status == Status::Waiting {
            let _guard = self.run_lock.lock().unwrap();
            let dir = self.build_dir(uuid)?;
            write_status(&dir, Status::Failed, Some("cancelled before running"))?;
            let dest = self.config.results_dir().join(uuid.to_string());
            std::fs::rename(&dir, &dest)?;
            self.index.lock().unwrap().get_mut(&uuid).unwrap().status = Status::Failed;
        }
        Ok(())
    }

    /// Remove a terminal build's result directory and forget it.
    pub fn uuid_delete(&self, uuid: Uuid) -> Result<()> {
        let status = self.uuid_status(uuid)?.status;
        if status != Status::Finished && status != Status::Failed {
            return Err(ComposerError::QueueError(format!(
                "cannot delete build {uuid} in state {status:?}"
            )));
        }
        let dir = self.build_dir(uuid)?;
        std::fs::remove_dir_all(dir)?;
        self.index.lock().unwrap().remove(&uuid);
        self.cancel_flags.lock().unwrap().remove(&uuid);
        Ok(())
    }

    /// Tail the raw installer log, truncated to the last `size` kilobytes
    /// and then cut forward to the next line boundary so the returned
    /// stream never starts mid-line.
    pub fn uuid_log(&self, uuid: Uuid, size_kb: u64) -> Result<Vec<u8>> {
        let dir = self.build_dir(uuid)?;
        let path = dir.join("logs").join("installer.log");
        let bytes = std::fs::read(&path)
            .map_err(|_| ComposerError::LogUnavailable(uuid.to_string()))?;
        let limit = (size_kb.max(1) * 1024) as usize;
        if bytes.len() <= limit {
            return Ok(bytes);
        }
        let cut = bytes.len() - limit;
        let start = bytes[cut..].iter().position(|&b| b == b'\n').map(|p| cut + p + 1).unwrap_or(cut);
        Ok(bytes[start..].to_vec())
    }

    /// Build directory path, for tar/image streaming handlers.
    pub fn uuid_dir(&self, uuid: Uuid) -> Result<PathBuf> {
        self.build_dir(uuid)
    }

    /// Stream a tar of the selected subset of a build directory:
    /// `blueprint.toml`/`compose.json`/`deps.json`/`final-kickstart.ks`/
    /// `STATUS` (metadata), the output image, and/or `logs/`.
    pub fn uuid_tar(&self, uuid: Uuid, include_metadata: bool, include_image: bool, include_logs: bool) -> Result<Vec<u8>> {
        let dir = self.build_dir(uuid)?;
        let meta = read_compose_meta(&dir)?;

        let mut buf = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut buf);

            if include_metadata {
                for file in [
                    "blueprint.toml",
                    "compose.json",
                    "deps.json",
                    "final-kickstart.ks",
                    "STATUS",
                    "FAIL_REASON",
                ] {
                    let path = dir.join(file);
                    if path.is_file() {
                        builder.append_path_with_name(&path, file)?;
                    }
                }
            }
            if include_image {
                let path = dir.join(&meta.image_name);
                if path.is_file() {
                    builder.append_path_with_name(&path, &meta.image_name)?;
                }
            }
            if include_logs {
                let logs_dir = dir.join("logs");
                if logs_dir.is_dir() {
                    builder.append_dir_all("logs", &logs_dir)?;
                }
            }

            builder.finish()?;
        }
        Ok(buf)
    }

    /// The output artifact's declared filename and its path on disk. Fails
    /// with `NotFound` if the build has not reached `FINISHED`, or if the
    /// declared artifact is missing despite that status.
    pub fn uuid_image(&self, uuid: Uuid) -> Result<(String, PathBuf)> {
        let status = self.uuid_status(uuid)?.status;
        if status != Status::Finished {
            return Err(ComposerError::NotFound(format!(
                "build {uuid} has no image in state {status:?}"
            )));
        }
        let dir = self.build_dir(uuid)?;
        let meta = read_compose_meta(&dir)?;
        let path = dir.join(&meta.image_name);
        if !path.is_file() {
            return Err(ComposerError::NotFound(format!("image for build {uuid} is missing on disk")));
        }
        Ok((meta.image_name, path))
    }

    /// Names discovered under `share_dir` recognized as supported compose
    /// types, intersected with the closed set this project knows how to
    /// invoke the builder for.
    pub fn compose_types(&self) -> Vec<String> {
        let share = &self.config.share_dir;
        KNOWN_COMPOSE_TYPES
            .iter()
            .filter(|t| share.join(t).exists() || !share.is_dir())
            .map(|s| s.to_string())
            .collect()
    }

    /// Pick up any directory under `queue/new/` not yet in the in-memory
    /// index — e.g. one injected directly by another process rather than
    /// through [`Self::submit`] — and wake the worker.
    pub fn rescan_new(&self) -> Result<()> {
        let dir = self.config.queue_new_dir();
        let mut index = self.index.lock().unwrap();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(uuid) = entry.file_name().to_str().and_then(|s| Uuid::parse_str(s).ok()) else {
                continue;
            };
            if index.contains_key(&uuid) {
                continue;
            }
            let Ok(meta) = read_compose_meta(&entry.path()) else {
                continue;
            };
            tracing::info!(%uuid, "discovered externally injected build in queue/new/");
            index.insert(
                uuid,
                BuildMeta {
                    uuid,
                    status: Status::Waiting,
                    compose_type: meta.compose_type,
                    blueprint_name: meta.blueprint_name,
                    branch: meta.branch,
                    submitted_at: meta.submitted_at,
                },
            );
        }
        Ok(())
    }

    /// Wake the worker loop, e.g. after [`Self::rescan_new`] finds new work.
    pub fn wake_worker(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn cancel_flag_for(&self, uuid: Uuid) -> Arc<AtomicBool> {
        self.cancel_flags
            .lock()
            .unwrap()
            .entry(uuid)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn run_lock(&self) -> &Mutex<()> {
        &self.run_lock
    }

    pub(crate) fn set_status_in_index(&self, uuid: Uuid, status: Status) {
        if let Some(meta) = self.index.lock().unwrap().get_mut(&uuid) {
            meta.status = status;
        }
    }

    /// Oldest WAITING build's uuid and directory, if any.
    pub(crate) fn oldest_waiting(&self) -> Option<Uuid> {
        let index = self.index.lock().unwrap();
        index
            .values()
            .filter(|b| b.status == Status::Waiting)
            .min_by_key(|b| b.submitted_at)
            .map(|b| b.uuid)
    }
}

fn write_status(dir: &Path, status: Status, fail_reason: Option<&str>) -> Result<()> {
    std::fs::write(dir.join("STATUS"), status.as_marker())?;
    if let Some(reason) = fail_reason {
        std::fs::write(dir.join("FAIL_REASON"), reason)?;
    }
    Ok(())
}

fn read_status(dir: &Path) -> Result<Status> {
    let contents = std::fs::read_to_string(dir.join("STATUS"))?;
    Status::parse_marker(&contents)
}

fn read_compose_meta(dir: &Path) -> Result<ComposeMeta> {
    let bytes = std::fs::read(dir.join("compose.json"))?;
    serde_json::from_slice(&bytes).map_err(|e| ComposerError::QueueError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;

    fn cfg(root: &Path) -> Arc<Config> {
        Arc::new(Config {
            blueprints_dir: root.join("blueprints"),
            queue_dir: root.to_path_buf(),
            share_dir: root.join("share"),
            socket_path: root.join("socket"),
            allowed_users: vec!["root".to_string()],
            use_system_repos: true,
            enabled_repos: vec!["*".to_string()],
        })
    }

    fn bp() -> Blueprint {
        Blueprint {
            name: "base".to_string(),
            description: "d".to_string(),
            version: Some("0.0.1".to_string()),
            modules: vec![],
            packages: vec![],
        }
    }

    #[test]
    fn submit_places_build_in_new_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 2,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(queue.uuid_status(uuid).unwrap().status, Status::Waiting);
        let (new, running) = queue.queue_status();
        assert_eq!(new.len(), 1);
        assert!(running.is_empty());
    }

    #[test]
    fn submit_rejects_unknown_compose_type() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let err = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "floppy".to_string(),
                    test_mode: 2,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap_err();
        assert_eq!(err.kind(), "QueueError");
    }

    #[test]
    fn cancel_of_waiting_build_moves_it_to_results_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 1,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();

        queue.uuid_cancel(uuid).unwrap();
        assert_eq!(queue.uuid_status(uuid).unwrap().status, Status::Failed);
        assert!(queue.config().results_dir().join(uuid.to_string()).is_dir());
    }

    #[test]
    fn cancel_of_terminal_build_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 1,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();
        queue.uuid_cancel(uuid).unwrap();
        let err = queue.uuid_cancel(uuid).unwrap_err();
        assert_eq!(err.kind(), "CancelError");
    }

    #[test]
    fn startup_reconciliation_fails_builds_left_in_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = cfg(dir.path());
        std::fs::create_dir_all(config.queue_new_dir()).unwrap();
        std::fs::create_dir_all(config.queue_run_dir()).unwrap();
        std::fs::create_dir_all(config.results_dir()).unwrap();

        let uuid = Uuid::new_v4();
        let stuck = config.queue_run_dir().join(uuid.to_string());
        std::fs::create_dir_all(&stuck).unwrap();
        std::fs::write(
            stuck.join("compose.json"),
            serde_json::to_vec(&ComposeMeta {
                blueprint_name: "base".to_string(),
                branch: "master".to_string(),
                compose_type: "tar".to_string(),
                source_commit: None,
                submitted_at: Utc::now(),
                test_mode: 1,
                image_name: "base.tar".to_string(),
            })
            .unwrap(),
        )
        .unwrap();
        std::fs::write(stuck.join("STATUS"), "RUNNING").unwrap();

        let queue = ComposeQueue::open(config.clone()).unwrap();
        assert_eq!(queue.uuid_status(uuid).unwrap().status, Status::Failed);
        assert!(config.results_dir().join(uuid.to_string()).is_dir());
        assert!(!config.queue_run_dir().join(uuid.to_string()).exists());
    }

    #[test]
    fn uuid_delete_requires_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 1,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();
        assert_eq!(queue.uuid_delete(uuid).unwrap_err().kind(), "QueueError");
        queue.uuid_cancel(uuid).unwrap();
        queue.uuid_delete(uuid).unwrap();
        assert!(queue.uuid_status(uuid).is_err());
    }

    async fn poll_until_terminal(queue: &ComposeQueue, uuid: Uuid) -> Status {
        for _ in 0..200 {
            let status = queue.uuid_status(uuid).unwrap().status;
            if status == Status::Finished || status == Status::Failed {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("build {uuid} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_mode_2_runs_to_finished_with_placeholder_image() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(ComposeQueue::open(cfg(dir.path())).unwrap());
        tokio::spawn(super::worker::run(queue.clone()));

        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 2,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(poll_until_terminal(&queue, uuid).await, Status::Finished);
        let (filename, path) = queue.uuid_image(uuid).unwrap();
        assert_eq!(filename, "base.tar");
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_mode_1_runs_to_failed_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(ComposeQueue::open(cfg(dir.path())).unwrap());
        tokio::spawn(super::worker::run(queue.clone()));

        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 1,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(poll_until_terminal(&queue, uuid).await, Status::Failed);
        assert!(queue.uuid_image(uuid).is_err());
        assert!(queue.build_status(Status::Failed).iter().any(|b| b.uuid == uuid));
    }

    #[test]
    fn uuid_tar_includes_requested_subsets_only() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ComposeQueue::open(cfg(dir.path())).unwrap();
        let uuid = queue
            .submit(
                ComposeRequest {
                    blueprint_name: "base".to_string(),
                    branch: "master".to_string(),
                    compose_type: "tar".to_string(),
                    test_mode: 1,
                },
                &bp(),
                None,
                &[],
            )
            .unwrap();

        let metadata_only = queue.uuid_tar(uuid, true, false, false).unwrap();
        assert!(!metadata_only.is_empty());
        let logs_only = queue.uuid_tar(uuid, false, false, true).unwrap();
        assert!(!logs_only.is_empty());
    }
}
