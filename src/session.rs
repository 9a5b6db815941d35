//! A Session: one long-lived shell context owning a persistent working
//! directory, a mutable environment map, execution counters, and a bounded
//! set of Background Processes.
//!
//! Lock hierarchy (Registry -> Session -> Background Process): `state`
//! guards the Session's own fields and its background-process map; `exec_lock`
//! is a separate async mutex that serializes foreground command execution
//! within the session without being held across the subprocess wait (see
//! `foreground.rs`).

use crate::background::BackgroundProcess;
use crate::error::ServerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

struct SessionState {
    current_dir: PathBuf,
    environment: HashMap<String, String>,
    last_used_at: DateTime<Utc>,
    is_active: bool,
    command_count: u64,
    success_count: u64,
    total_duration: Duration,
    background: HashMap<Uuid, Arc<BackgroundProcess>>,
}

/// A deep-copy, pointer-free view of a Session for `list_sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub name: String,
    pub project_id: String,
    pub working_dir: String,
    pub current_dir: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub is_active: bool,
    pub command_count: u64,
    pub success_count: u64,
    pub total_duration_seconds: f64,
    pub background_process_count: usize,
}

pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub project_id: String,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    /// Serializes foreground `execute` calls within this session. Held for
    /// the whole foreground call (including the subprocess wait), unlike
    /// `state`, which is only ever taken for brief synchronous sections.
    pub exec_lock: tokio::sync::Mutex<()>,
}

impl Session {
    #[must_use]
    pub fn new(
        name: String,
        project_id: String,
        working_dir: PathBuf,
        environment: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            project_id,
            working_dir: working_dir.clone(),
            created_at: now,
            state: RwLock::new(SessionState {
                current_dir: working_dir,
                environment,
                last_used_at: now,
                is_active: true,
                command_count: 0,
                success_count: 0,
                total_duration: Duration::ZERO,
                background: HashMap::new(),
            }),
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn current_dir(&self) -> PathBuf {
        self.state.read().unwrap().current_dir.clone()
    }

    #[must_use]
    pub fn environment_snapshot(&self) -> HashMap<String, String> {
        self.state.read().unwrap().environment.clone()
    }

    /// Snapshot of `(current_dir, environment)` for a spawn, taken under one
    /// read-lock acquisition so the two stay consistent with each other.
    #[must_use]
    pub fn snapshot_for_exec(&self) -> (PathBuf, HashMap<String, String>) {
        let state = self.state.read().unwrap();
        (state.current_dir.clone(), state.environment.clone())
    }

    pub fn set_env(&self, vars: HashMap<String, String>) {
        let mut state = self.state.write().unwrap();
        state.environment.extend(vars);
        state.last_used_at = Utc::now();
    }

    pub fn unset_env(&self, keys: &[String]) {
        let mut state = self.state.write().unwrap();
        for key in keys {
            state.environment.remove(key);
        }
        state.last_used_at = Utc::now();
    }

    /// Record the outcome of a completed foreground command.
    pub fn note_command(&self, success: bool, duration: Duration) {
        let mut state = self.state.write().unwrap();
        state.command_count += 1;
        if success {
            state.success_count += 1;
        }
        state.total_duration += duration;
        state.last_used_at = Utc::now();
    }

    #[must_use]
    pub fn command_count(&self) -> u64 {
        self.state.read().unwrap().command_count
    }

    /// Heuristically track `cd` across commands. Only applied when the
    /// command succeeded, and either the whole command is `cd <target>` or
    /// the command is a chain of `&&`-separated steps whose last step is
    /// `cd <target>` and which contains no other compound shell operator.
    /// Anything more complex (e.g. `;`/`|` chains, subshells, pushd/popd) is
    /// deliberately left untracked.
    pub fn maybe_update_cwd(&self, command: &str, success: bool) {
        if !success {
            return;
        }
        let Some(target) = parse_cd_target(command) else {
            return;
        };
        let mut state = self.state.write().unwrap();
        let resolved = resolve_against(&state.current_dir, &target);
        if resolved.is_dir() {
            state.current_dir = resolved;
        }
    }

    /// Admission check only, no insert: refuses if the session already holds
    /// `max` running Background Processes. Meant to be called *before*
    /// spawning the subprocess, so a command that should be refused never
    /// gets a real OS process started; `add_background` re-checks and
    /// inserts atomically afterwards to close the race against a
    /// concurrent admission.
    pub fn check_background_capacity(&self, max: usize) -> Result<(), ServerError> {
        let state = self.state.read().unwrap();
        let running = state.background.values().filter(|p| p.is_running()).count();
        if running >= max {
            return Err(ServerError::CapacityExceeded(format!(
                "session already has {running}/{max} running background processes"
            )));
        }
        Ok(())
    }

    /// Insert a Background Process, refusing if it would exceed `max`.
    /// Runs as a single write-lock acquisition so the capacity check and
    /// the insert are atomic.
    pub fn add_background(
        &self,
        process: Arc<BackgroundProcess>,
        max: usize,
    ) -> Result<(), ServerError> {
        let mut state = self.state.write().unwrap();
        let running = state.background.values().filter(|p| p.is_running()).count();
        if running >= max {
            return Err(ServerError::CapacityExceeded(format!(
                "session already has {running}/{max} running background processes"
            )));
        }
        state.background.insert(process.id, process);
        state.last_used_at = Utc::now();
        Ok(())
    }

    #[must_use]
    pub fn get_background(&self, id: Uuid) -> Option<Arc<BackgroundProcess>> {
        self.state.read().unwrap().background.get(&id).cloned()
    }

    #[must_use]
    pub fn list_background(&self) -> Vec<Arc<BackgroundProcess>> {
        self.state
            .read()
            .unwrap()
            .background
            .values()
            .cloned()
            .collect()
    }

    pub fn remove_background(&self, id: Uuid) {
        self.state.write().unwrap().background.remove(&id);
    }

    pub fn close(&self) {
        self.state.write().unwrap().is_active = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.read().unwrap().is_active
    }

    #[must_use]
    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.state.read().unwrap().last_used_at
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().unwrap();
        SessionSnapshot {
            id: self.id,
            name: self.name.clone(),
            project_id: self.project_id.clone(),
            working_dir: self.working_dir.to_string_lossy().into_owned(),
            current_dir: state.current_dir.to_string_lossy().into_owned(),
            created_at: self.created_at,
            last_used_at: state.last_used_at,
            is_active: state.is_active,
            command_count: state.command_count,
            success_count: state.success_count,
            total_duration_seconds: state.total_duration.as_secs_f64(),
            background_process_count: state.background.len(),
        }
    }
}

/// Validate a session name: 3-100 chars, `[A-Za-z0-9 _-]`.
#[must_use]
pub fn validate_name(name: &str) -> bool {
    let len = name.len();
    (3..=100).contains(&len)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
}

fn parse_cd_target(command: &str) -> Option<String> {
    let trimmed = command.trim();
    // Disallow any compound operator other than `&&` itself: strip `&&`
    // tokens first so a lone leftover `&`, `|`, `;`, or subshell paren means
    // the command is more complex than a plain chain of `&&` steps.
    if trimmed
        .replace("&&", "")
        .contains(['&', '|', ';', '(', ')'])
    {
        return None;
    }
    let last_step = trimmed.rsplit("&&").next()?.trim();
    parse_single_cd(last_step)
}

fn parse_single_cd(step: &str) -> Option<String> {
    let mut parts = step.split_whitespace();
    if parts.next()? != "cd" {
        return None;
    }
    match (parts.next(), parts.next()) {
        (None, _) => Some("~".to_string()),
        (Some(target), None) => Some(target.to_string()),
        _ => None,
    }
}

fn resolve_against(current: &Path, target: &str) -> PathBuf {
    let expanded = if target == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
    } else if let Some(rest) = target.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/"))
            .join(rest)
    } else {
        PathBuf::from(target)
    };

    let joined = if expanded.is_absolute() {
        expanded
    } else {
        current.join(expanded)
    };

    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rejects_too_short() {
        assert!(!validate_name("ab"));
        assert!(validate_name("abc"));
    }

    #[test]
    fn validate_name_rejects_bad_chars() {
        assert!(!validate_name("bad/name"));
        assert!(validate_name("good_name-1"));
    }

    #[test]
    fn parse_cd_target_plain() {
        assert_eq!(parse_cd_target("cd foo"), Some("foo".to_string()));
        assert_eq!(parse_cd_target("cd"), Some("~".to_string()));
        assert_eq!(parse_cd_target("cd foo bar"), None);
        assert_eq!(parse_cd_target("cd foo && rm -rf /"), None);
        assert_eq!(parse_cd_target("ls"), None);
    }

    #[test]
    fn parse_cd_target_trailing_and_chain() {
        assert_eq!(
            parse_cd_target("mkdir -p /tmp/x/sub && cd /tmp/x/sub"),
            Some("/tmp/x/sub".to_string())
        );
        assert_eq!(parse_cd_target("cd a && cd b"), Some("b".to_string()));
        assert_eq!(parse_cd_target("cd a && echo hi; rm -rf /"), None);
        assert_eq!(parse_cd_target("cd a && (echo hi)"), None);
        assert_eq!(parse_cd_target("echo hi && true"), None);
    }

    #[test]
    fn normalize_collapses_parent_dirs() {
        assert_eq!(normalize(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn session_note_command_tracks_counters() {
        let session = Session::new(
            "test session".to_string(),
            "proj_abc123".to_string(),
            PathBuf::from("/tmp"),
            HashMap::new(),
        );
        session.note_command(true, Duration::from_secs(1));
        session.note_command(false, Duration::from_secs(2));
        let snap = session.snapshot();
        assert_eq!(snap.command_count, 2);
        assert_eq!(snap.success_count, 1);
        assert!((snap.total_duration_seconds - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn maybe_update_cwd_ignores_failed_commands() {
        let session = Session::new(
            "test session".to_string(),
            "proj_abc123".to_string(),
            PathBuf::from("/tmp"),
            HashMap::new(),
        );
        session.maybe_update_cwd("cd /", false);
        assert_eq!(session.current_dir(), PathBuf::from("/tmp"));
    }

    #[test]
    fn maybe_update_cwd_follows_successful_cd() {
        let session = Session::new(
            "test session".to_string(),
            "proj_abc123".to_string(),
            PathBuf::from("/tmp"),
            HashMap::new(),
        );
        session.maybe_update_cwd("cd /", true);
        assert_eq!(session.current_dir(), PathBuf::from("/"));
    }
}
