//! Shared subprocess plumbing used by both the Foreground Executor and the
//! Background Supervisor: building a `shell -c "cd <dir> && <command>"`
//! invocation against a session's environment, and killing the resulting
//! process group gracefully then forcefully.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Single-quote a path/argument for inclusion in a shell command line,
/// escaping embedded single quotes the POSIX way: `'...'\''...'`.
#[must_use]
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Build (but do not spawn) a `<shell> -c "cd <dir> && <command>"` process,
/// replacing the child's environment with exactly `env`, piping stdout and
/// stderr, and placing it in its own process group so the whole tree can be
/// killed by signalling `-pid`.
#[must_use]
pub fn build_command(
    shell: &str,
    working_dir: &Path,
    command: &str,
    env: &HashMap<String, String>,
) -> Command {
    let script = format!(
        "cd {} && {command}",
        shell_escape(&working_dir.to_string_lossy())
    );

    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(script);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd.env_clear();
    cmd.envs(env);

    // SAFETY: pre_exec runs after fork, before exec, in the child only.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    cmd
}

/// Send a signal to the process group of a spawned child (its pid is also
/// its process group id, since `build_command` calls `setsid`).
pub fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), String> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(-(pid as i32)), signal)
        .map_err(|e| format!("failed to signal process group {pid}: {e}"))
}

/// Check whether a process group is still alive by sending the null signal
/// (`kill -0`), which performs no-op error checking but still reports
/// `ESRCH` once every process in the group has exited.
#[must_use]
pub fn group_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(-(pid as i32)), None).is_ok()
}

/// Terminate a process group: SIGTERM now, SIGKILL after `grace` if it is
/// still running by then. `still_running` is polled once after the grace
/// period; callers pass a closure reading their own liveness flag.
pub async fn terminate_graceful(
    pid: u32,
    grace: std::time::Duration,
    still_running: impl Fn() -> bool,
) {
    let _ = signal_group(pid, nix::sys::signal::Signal::SIGTERM);
    tokio::time::sleep(grace).await;
    if still_running() {
        let _ = signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    }
}
