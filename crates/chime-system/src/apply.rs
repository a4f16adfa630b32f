//! The "apply changes" job.
//!
//! After a successful save the device restarts networking and then the
//! doorbell service. At most one job is in flight: a start request while a
//! job is pending or running returns that job's status instead of starting
//! another. The background task re-checks its job id under the lock before
//! every transition so a superseded task can never overwrite a newer job.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use std::os::unix::process::ExitStatusExt;

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info};

use chime_core::{ApplyState, ApplyStatus};

/// Commands the job runs, each through `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub network_restart_cmd: String,
    pub chime_restart_cmd: String,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            network_restart_cmd: "/etc/init.d/S40network restart >/dev/null 2>&1".to_string(),
            chime_restart_cmd: "/etc/init.d/S99chime restart >/dev/null 2>&1".to_string(),
        }
    }
}

/// Owns the apply status for the lifetime of the process.
///
/// Cheap to clone; all clones share one status.
#[derive(Debug, Clone)]
pub struct ApplyManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ApplyConfig,
    status: Mutex<ApplyStatus>,
    next_job_id: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl ApplyManager {
    pub fn new(config: ApplyConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                status: Mutex::new(ApplyStatus::default()),
                next_job_id: AtomicU64::new(1),
                handle: Mutex::new(None),
            }),
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, ApplyStatus> {
        self.inner.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a job unless one is already pending or running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_apply(&self) -> ApplyStatus {
        let mut status = self.lock_status();
        if status.state.is_in_flight() {
            info!(job_id = status.job_id, "apply already in flight");
            return status.clone();
        }

        let job_id = self.inner.next_job_id.fetch_add(1, Ordering::Relaxed);
        *status = ApplyStatus {
            job_id,
            state: ApplyState::Pending,
            started_at_utc: now_utc(),
            finished_at_utc: String::new(),
            error: String::new(),
        };
        let started = status.clone();
        drop(status);

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run_job(job_id).await });
        *self.inner.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        started
    }

    /// A copy of the live status.
    pub fn current_status(&self) -> ApplyStatus {
        self.lock_status().clone()
    }

    /// Wait for the most recently started job to finish.
    pub async fn join(&self) {
        let handle = self
            .inner
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "apply task panicked");
            }
        }
    }

    /// Apply `update` only if `job_id` is still the live job.
    fn update_if_current(&self, job_id: u64, update: impl FnOnce(&mut ApplyStatus)) -> bool {
        let mut status = self.lock_status();
        if status.job_id != job_id {
            return false;
        }
        update(&mut status);
        true
    }

    fn fail(&self, job_id: u64, message: String) {
        error!(job_id, error = %message, "apply job failed");
        self.update_if_current(job_id, |status| {
            status.state = ApplyState::Failed;
            status.finished_at_utc = now_utc();
            status.error = message;
        });
    }

    async fn run_job(&self, job_id: u64) {
        let started = self.update_if_current(job_id, |status| {
            status.state = ApplyState::Running;
        });
        if !started {
            return;
        }
        info!(job_id, "apply job started");

        if let Err(reason) = run_shell(&self.inner.config.network_restart_cmd).await {
            self.fail(job_id, format!("network restart failed: {}", reason));
            return;
        }

        if let Err(reason) = run_shell(&self.inner.config.chime_restart_cmd).await {
            self.fail(job_id, format!("chime restart failed: {}", reason));
            return;
        }

        self.update_if_current(job_id, |status| {
            status.state = ApplyState::Succeeded;
            status.finished_at_utc = now_utc();
            status.error.clear();
        });
        info!(job_id, "apply job succeeded");
    }
}

/// Run `command` through the shell; `Err` describes how it failed.
async fn run_shell(command: &str) -> Result<(), String> {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| format!("failed to start shell: {}", e))?;

    match (status.code(), status.signal()) {
        (Some(0), _) => Ok(()),
        (Some(code), _) => Err(format!("exit code {}", code)),
        (None, Some(signal)) => Err(format!("signal {}", signal)),
        (None, None) => Err("unknown failure".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn manager(network: &str, chime: &str) -> ApplyManager {
        ApplyManager::new(ApplyConfig {
            network_restart_cmd: network.to_string(),
            chime_restart_cmd: chime.to_string(),
        })
    }

    #[test]
    fn test_initial_status_is_idle() {
        let status = manager("true", "true").current_status();
        assert_eq!(status, ApplyStatus::default());
        assert_eq!(status.state, ApplyState::Idle);
        assert_eq!(status.job_id, 0);
    }

    #[tokio::test]
    async fn test_single_flight_returns_same_job() {
        let apply = manager("sleep 1", "true");

        let first = apply.start_apply();
        let second = apply.start_apply();
        assert_eq!(first.job_id, 1);
        assert_eq!(second.job_id, first.job_id);
        assert!(second.state.is_in_flight());

        apply.join().await;
        let done = apply.current_status();
        assert_eq!(done.job_id, 1);
        assert_eq!(done.state, ApplyState::Succeeded);
        assert!(done.error.is_empty());
        assert_eq!(done.finished_at_utc.len(), "2024-01-01T00:00:00Z".len());

        let next = apply.start_apply();
        assert_eq!(next.job_id, 2);
        assert_eq!(next.state, ApplyState::Pending);
        assert!(next.finished_at_utc.is_empty());
        apply.join().await;
    }

    #[tokio::test]
    async fn test_start_while_running_returns_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let runs = dir.path().join("runs.log");
        let apply = manager(&format!("echo run >> '{}'; sleep 1", runs.display()), "true");

        let first = apply.start_apply();
        let mut status = apply.current_status();
        for _ in 0..200 {
            if status.state == ApplyState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = apply.current_status();
        }
        assert_eq!(status.state, ApplyState::Running);
        assert_eq!(status.started_at_utc, first.started_at_utc);

        let again = apply.start_apply();
        assert_eq!(again.job_id, first.job_id);
        assert_eq!(again.state, ApplyState::Running);

        apply.join().await;
        assert_eq!(apply.current_status().state, ApplyState::Succeeded);
        assert_eq!(apply.current_status().started_at_utc, first.started_at_utc);
        assert_eq!(std::fs::read_to_string(&runs).unwrap(), "run\n");
    }

    #[tokio::test]
    async fn test_network_failure_stops_job() {
        let apply = manager("exit 3", "touch /nonexistent-dir/should-not-run");
        apply.start_apply();
        apply.join().await;

        let status = apply.current_status();
        assert_eq!(status.state, ApplyState::Failed);
        assert_eq!(status.error, "network restart failed: exit code 3");
        assert!(!status.finished_at_utc.is_empty());
    }

    #[tokio::test]
    async fn test_chime_failure_by_signal() {
        let apply = manager("true", "kill -9 $$");
        apply.start_apply();
        apply.join().await;

        let status = apply.current_status();
        assert_eq!(status.state, ApplyState::Failed);
        assert_eq!(status.error, "chime restart failed: signal 9");
    }

    #[test]
    fn test_stale_job_cannot_update() {
        let apply = manager("true", "true");
        apply.lock_status().job_id = 5;

        assert!(!apply.update_if_current(4, |status| status.state = ApplyState::Failed));
        assert_eq!(apply.current_status().state, ApplyState::Idle);

        assert!(apply.update_if_current(5, |status| status.state = ApplyState::Running));
        assert_eq!(apply.current_status().state, ApplyState::Running);
    }

    #[test]
    fn test_timestamp_format() {
        let now = now_utc();
        assert_eq!(now.len(), 20);
        assert!(now.ends_with('Z'));
        assert_eq!(&now[10..11], "T");
    }
}
