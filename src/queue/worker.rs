//! The single background task that drains `queue/new/` into `queue/run/`
//! and on to `results/`.
//!
//! Only one builder subprocess ever runs at a time; the worker owns
//! `run_lock` for the duration of a build's directory moves (never across
//! the subprocess's own execution, per the base spec's lock-ordering rule).

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use uuid::Uuid;

use super::{read_compose_meta, write_status, ComposeQueue, Status};
use crate::errors::Result;

const CANCEL_GRACE: Duration = Duration::from_secs(30);

/// Run forever, sleeping on `queue.notify` while `queue/new/` is empty.
pub async fn run(queue: Arc<ComposeQueue>) {
    loop {
        let Some(uuid) = queue.oldest_waiting() else {
            queue.notify.notified().await;
            continue;
        };

        if let Err(e) = run_one(&queue, uuid).await {
            tracing::error!(%uuid, error = %e, "build worker iteration failed");
        }
    }
}

async fn run_one(queue: &ComposeQueue, uuid: Uuid) -> Result<()> {
    let config = queue.config();
    let src = config.queue_new_dir().join(uuid.to_string());
    let dst = config.queue_run_dir().join(uuid.to_string());

    {
        let _guard = queue.run_lock().lock().unwrap();
        std::fs::rename(&src, &dst)?;
        write_status(&dst, Status::Running, None)?;
    }
    queue.set_status_in_index(uuid, Status::Running);
    tracing::info!(%uuid, "build started");

    let meta = read_compose_meta(&dst)?;
    let cancel_flag = queue.cancel_flag_for(uuid);

    let outcome = match meta.test_mode {
        1 => {
            tracing::info!(%uuid, "test=1: forcing FAILED without invoking builder");
            Outcome::Failed("test=1 forces failure".to_string())
        }
        2 => {
            tracing::info!(%uuid, "test=2: writing placeholder image, forcing FINISHED");
            std::fs::write(dst.join(&meta.image_name), b"placeholder image")?;
            Outcome::Finished
        }
        _ => run_builder(config, &dst, &meta.image_name, &cancel_flag).await?,
    };

    match &outcome {
        Outcome::Finished => write_status(&dst, Status::Finished, None)?,
        Outcome::Failed(reason) => write_status(&dst, Status::Failed, Some(reason))?,
    }

    let final_status = match outcome {
        Outcome::Finished => Status::Finished,
        Outcome::Failed(_) => Status::Failed,
    };
    let results_dst = config.results_dir().join(uuid.to_string());
    {
        let _guard = queue.run_lock().lock().unwrap();
        std::fs::rename(&dst, &results_dst)?;
    }
    queue.set_status_in_index(uuid, final_status);
    tracing::info!(%uuid, status = ?final_status, "build finished");
    Ok(())
}

enum Outcome {
    Finished,
    Failed(String),
}

/// Invoke the configured builder, streaming its stdout into the installer
/// log and its stderr into a separate log, and honor cooperative
/// cancellation: SIGTERM first, then SIGKILL after a 30s grace period if
/// the process has not exited.
async fn run_builder(
    config: &crate::config::Config,
    build_dir: &Path,
    image_name: &str,
    cancel_flag: &Arc<std::sync::atomic::AtomicBool>,
) -> Result<Outcome> {
    let builder_command = config.share_dir.join("builder").join("compose.sh");

    let mut child = match Command::new(&builder_command)
        .arg(build_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return Ok(Outcome::Failed(format!("failed to start builder: {e}"))),
    };

    let mut stdout_log = tokio::fs::File::create(build_dir.join("logs").join("installer.log")).await?;
    let mut stderr_log = tokio::fs::File::create(build_dir.join("logs").join("stderr.log")).await?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let pid = child.id();
    let mut cancelled = false;
    let mut cancel_deadline: Option<tokio::time::Instant> = None;

    loop {
        if cancel_deadline.is_none() && cancel_flag.load(Ordering::SeqCst) {
            cancelled = true;
            if let Some(pid) = pid {
                let _ = Command::new("kill").arg("-TERM").arg(pid.to_string()).status().await;
            }
            cancel_deadline = Some(tokio::time::Instant::now() + CANCEL_GRACE);
        }

        let mut buf = [0u8; 4096];
        tokio::select! {
            biased;

            status = child.wait() => {
                let status = status?;
                if let Some(mut out) = stdout.take() {
                    let mut rest = Vec::new();
                    out.read_to_end(&mut rest).await?;
                    stdout_log.write_all(&rest).await?;
                }
                if let Some(mut err) = stderr.take() {
                    let mut rest = Vec::new();
                    err.read_to_end(&mut rest).await?;
                    stderr_log.write_all(&rest).await?;
                }
                if cancelled {
                    return Ok(Outcome::Failed("build cancelled".to_string()));
                }
                return Ok(if status.success() && build_dir.join(image_name).is_file() {
                    Outcome::Finished
                } else if status.success() {
                    Outcome::Failed("builder exited 0 but did not produce the declared image".to_string())
                } else {
                    Outcome::Failed(format!("builder exited with {status}"))
                });
            }

            n = async { stdout.as_mut().unwrap().read(&mut buf).await }, if stdout.is_some() => {
                match n? {
                    0 => stdout = None,
                    n => stdout_log.write_all(&buf[..n]).await?,
                }
            }

            n = async { stderr.as_mut().unwrap().read(&mut buf).await }, if stderr.is_some() => {
                match n? {
                    0 => stderr = None,
                    n => stderr_log.write_all(&buf[..n]).await?,
                }
            }

            _ = tokio::time::sleep_until(cancel_deadline.unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600))), if cancel_deadline.is_some() => {
                tracing::warn!("cancellation grace period elapsed, sending SIGKILL");
                let _ = child.start_kill();
                cancel_deadline = None;
            }
        }
    }
}
