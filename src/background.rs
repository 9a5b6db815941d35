//! Background Supervisor: spawns a command as a detached subprocess under a
//! Session, streams its stdout/stderr into bounded buffers, tracks exit, and
//! supports graceful-then-forceful termination.
//!
//! Mirrors the teacher's `process::run`/`registry::ProcessRegistry` shape
//! (spawn, two line-reader tasks, a waiter task) but scoped per-Session
//! rather than held in a flat global map, and with ring-buffer output
//! truncation instead of a line-count cap.

use crate::error::ServerError;
use crate::output::BoundedBuffer;
use crate::procutil;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Duration;
use uuid::Uuid;

const GRACE_PERIOD: Duration = Duration::from_secs(5);

struct BgBuffers {
    output: BoundedBuffer,
    error_output: BoundedBuffer,
}

/// A command spawned asynchronously under a Session, tracked independently
/// of the foreground executor.
pub struct BackgroundProcess {
    pub id: Uuid,
    pub session_id: Uuid,
    pub session_name: String,
    pub project_id: String,
    pub command: String,
    pub working_dir: PathBuf,
    pub start_time: DateTime<Utc>,
    pid: AtomicU32,
    is_running: AtomicBool,
    exit_code: AtomicI32,
    buffers: Mutex<BgBuffers>,
    end_time: Mutex<Option<DateTime<Utc>>>,
}

/// Read-only view of a Background Process for `check`/`list`.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundSnapshot {
    pub id: Uuid,
    pub session_id: Uuid,
    pub session_name: String,
    pub project_id: String,
    pub command: String,
    pub working_dir: String,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error_output: String,
    pub output_len: usize,
    pub error_output_len: usize,
}

impl BackgroundProcess {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot(&self) -> BackgroundSnapshot {
        let buffers = self.buffers.lock().unwrap();
        let end_time = *self.end_time.lock().unwrap();
        let duration_seconds = match end_time {
            Some(end) => (end - self.start_time).num_milliseconds().max(0) as f64 / 1000.0,
            None => (Utc::now() - self.start_time).num_milliseconds().max(0) as f64 / 1000.0,
        };
        let is_running = self.is_running();
        BackgroundSnapshot {
            id: self.id,
            session_id: self.session_id,
            session_name: self.session_name.clone(),
            project_id: self.project_id.clone(),
            command: self.command.clone(),
            working_dir: self.working_dir.to_string_lossy().into_owned(),
            pid: self.pid(),
            start_time: self.start_time,
            duration_seconds,
            is_running,
            exit_code: if is_running {
                None
            } else {
                Some(self.exit_code.load(Ordering::SeqCst))
            },
            output: buffers.output.as_str().to_string(),
            error_output: buffers.error_output.as_str().to_string(),
            output_len: buffers.output.len_chars(),
            error_output_len: buffers.error_output.len_chars(),
        }
    }

    /// Send SIGTERM, then SIGKILL after a grace period if still running.
    /// `force` skips straight to SIGKILL. A no-op success if already exited.
    pub async fn terminate(&self, force: bool) -> Result<(), ServerError> {
        if !self.is_running() {
            return Ok(());
        }
        let pid = self.pid();
        if force {
            procutil::signal_group(pid, nix::sys::signal::Signal::SIGKILL)
                .map_err(ServerError::Internal)?;
        } else {
            procutil::terminate_graceful(pid, GRACE_PERIOD, || self.is_running()).await;
        }
        Ok(())
    }
}

/// Spawn a background command. Admission (capacity check) has already been
/// performed by the caller via `Session::add_background`; this function only
/// builds and launches the subprocess and its reader/waiter tasks.
pub fn start(
    session_id: Uuid,
    session_name: String,
    project_id: String,
    command: String,
    working_dir: PathBuf,
    environment: std::collections::HashMap<String, String>,
    shell: &str,
    background_output_limit: usize,
    on_complete: impl FnOnce(i32, String, String, DateTime<Utc>) + Send + 'static,
) -> Result<std::sync::Arc<BackgroundProcess>, ServerError> {
    let mut cmd = procutil::build_command(shell, &working_dir, &command, &environment);
    let mut child = cmd
        .spawn()
        .map_err(|e| ServerError::SpawnFailed(e.to_string()))?;

    let pid = child.id().unwrap_or(0);
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let process = std::sync::Arc::new(BackgroundProcess {
        id: Uuid::new_v4(),
        session_id,
        session_name,
        project_id,
        command: command.clone(),
        working_dir,
        start_time: Utc::now(),
        pid: AtomicU32::new(pid),
        is_running: AtomicBool::new(true),
        exit_code: AtomicI32::new(0),
        buffers: Mutex::new(BgBuffers {
            output: BoundedBuffer::new(background_output_limit),
            error_output: BoundedBuffer::new(background_output_limit),
        }),
        end_time: Mutex::new(None),
    });

    use tokio::io::{AsyncBufReadExt, BufReader};

    let stdout_proc = process.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            stdout_proc.buffers.lock().unwrap().output.push_line(&line);
        }
    });

    let stderr_proc = process.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            stderr_proc
                .buffers
                .lock()
                .unwrap()
                .error_output
                .push_line(&line);
        }
    });

    let waiter_proc = process.clone();
    tokio::spawn(async move {
        let status = child.wait().await;
        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        waiter_proc.exit_code.store(exit_code, Ordering::SeqCst);
        let ended_at = Utc::now();
        *waiter_proc.end_time.lock().unwrap() = Some(ended_at);
        waiter_proc.is_running.store(false, Ordering::SeqCst);

        let (output, error_output) = {
            let buffers = waiter_proc.buffers.lock().unwrap();
            (
                buffers.output.as_str().to_string(),
                buffers.error_output.as_str().to_string(),
            )
        };
        on_complete(exit_code, output, error_output, ended_at);
    });

    Ok(process)
}
