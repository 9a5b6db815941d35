//! Foreground Executor: runs one command synchronously in a Session's
//! context with a deadline, captures combined output, updates session
//! state, and appends a Command Record.
//!
//! Generalizes the teacher's `process::run`: same spawn / stdout+stderr
//! reader / timeout / kill shape, driven by the Session's `current_dir` and
//! `environment` instead of a one-shot config's own fields.

use crate::history::{CommandRecord, HistoryStore};
use crate::procutil;
use crate::session::Session;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

const KILL_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one foreground command.
pub struct ExecOutcome {
    pub output: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
    pub working_dir: String,
    pub command_count: u64,
}

/// Execute `command` in `session`, serialized by the session's `exec_lock`
/// for the whole call (including the subprocess wait) so at most one
/// foreground command runs per session at a time. Different sessions run
/// concurrently since each has its own lock.
pub async fn execute(
    session: &Arc<Session>,
    command: String,
    timeout_secs: Option<u64>,
    shell: &str,
    default_timeout_secs: u64,
    max_timeout_secs: u64,
    history: &HistoryStore,
) -> ExecOutcome {
    let _guard = session.exec_lock.lock().await;

    let deadline = match timeout_secs {
        None | Some(0) => default_timeout_secs,
        Some(t) => t.min(max_timeout_secs),
    };

    let (current_dir, environment) = session.snapshot_for_exec();
    let started_at = Utc::now();
    let start = Instant::now();

    let mut cmd = procutil::build_command(shell, &current_dir, &command, &environment);
    let spawned = cmd.spawn();

    let (exit_code, output, timed_out) = match spawned {
        Err(e) => (-1, format!("failed to spawn process: {e}"), false),
        Ok(mut child) => {
            let pid = child.id().unwrap_or(0);
            let stdout = child.stdout.take().expect("stdout was piped");
            let stderr = child.stderr.take().expect("stderr was piped");
            let lines = Arc::new(tokio::sync::Mutex::new(Vec::<String>::new()));

            let lines_out = lines.clone();
            let stdout_task = tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    lines_out.lock().await.push(line);
                }
            });

            let lines_err = lines.clone();
            let stderr_task = tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    lines_err.lock().await.push(line);
                }
            });

            let wait_result =
                tokio::time::timeout(Duration::from_secs(deadline), child.wait()).await;

            let (exit_code, timed_out) = match wait_result {
                Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
                Ok(Err(_)) => (-1, false),
                Err(_) => {
                    procutil::terminate_graceful(pid, KILL_GRACE, || procutil::group_alive(pid))
                        .await;
                    let _ = child.wait().await;
                    (124, true)
                }
            };

            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let mut output = lines.lock().await.join("\n");
            if timed_out {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&format!("command timed out after {deadline}s"));
            }

            (exit_code, output, timed_out)
        }
    };

    let duration = start.elapsed();
    let success = exit_code == 0;
    let ended_at = Utc::now();

    session.note_command(success, duration);
    session.maybe_update_cwd(&command, success);

    let working_dir = session.current_dir().to_string_lossy().into_owned();
    let command_count = session.command_count();

    let record = CommandRecord::new(
        session.id,
        session.project_id.clone(),
        command,
        output.clone(),
        exit_code,
        started_at,
        ended_at,
        working_dir.clone(),
    );
    if let Err(e) = history.append(record).await {
        tracing::warn!(error = %e, "failed to append command record to history");
    }

    ExecOutcome {
        output,
        exit_code,
        duration,
        timed_out,
        working_dir,
        command_count,
    }
}
