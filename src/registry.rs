//! Session Registry: owns every live Session, keyed by UUID.
//!
//! Generalizes the teacher's flat `ProcessRegistry`/`SessionManager` map into
//! a registry of `Arc<Session>`, each owning its own lock (see `session.rs`).
//! A single coarse read/write lock guards the id -> Session map itself; the
//! registry never reaches into a Session's internals while holding that
//! lock for longer than the lookup/insert/remove.

use crate::error::ServerError;
use crate::session::{Session, SessionSnapshot, validate_name};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Make `path` absolute without requiring it to exist yet: an already
/// absolute path is returned as-is; a relative one is joined onto the
/// process's current directory. Enforces spec.md's "`working_dir` is an
/// absolute path" invariant regardless of what the caller supplied.
fn absolutize(path: &std::path::Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    max_sessions: usize,
    inactive_timeout: Duration,
    default_working_dir: Option<PathBuf>,
    sweeper: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(
        max_sessions: usize,
        inactive_timeout: Duration,
        default_working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            inactive_timeout,
            default_working_dir,
            sweeper: std::sync::Mutex::new(None),
        }
    }

    /// Start the background inactivity sweeper. Idempotent no-op if already
    /// running.
    pub fn spawn_sweeper(self: &Arc<Self>, cleanup_interval: Duration) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let registry = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                interval.tick().await;
                registry.sweep_inactive().await;
            }
        });
        *guard = Some(handle);
    }

    /// Scan for inactive Sessions and delete them. Snapshots the set of ids
    /// under the registry's read lock, then deletes each without holding it
    /// -- the canonical snapshot-then-act sweeper shape.
    async fn sweep_inactive(&self) {
        let expired: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| {
                    s.is_active()
                        && (chrono::Utc::now() - s.last_used_at())
                            .to_std()
                            .map(|elapsed| elapsed > self.inactive_timeout)
                            .unwrap_or(false)
                })
                .map(|s| s.id)
                .collect()
        };
        for id in expired {
            tracing::info!(session_id = %id, "sweeping inactive session");
            let _ = self.delete(id).await;
        }
    }

    pub async fn create(
        &self,
        name: String,
        project_id: Option<String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Arc<Session>, ServerError> {
        if !validate_name(&name) {
            return Err(ServerError::InvalidArgument(format!(
                "session name '{name}' must be 3-100 chars of [A-Za-z0-9 _-]"
            )));
        }

        // Resolution order: supplied | config default | process cwd | HOME.
        let resolved_dir = match working_dir
            .or_else(|| self.default_working_dir.clone())
            .or_else(|| std::env::current_dir().ok())
            .or_else(dirs::home_dir)
        {
            Some(dir) => absolutize(&dir)
                .map_err(|e| ServerError::InvalidArgument(format!("bad working_dir: {e}")))?,
            None => {
                return Err(ServerError::Internal(
                    "cannot resolve a working_dir: no cwd and no HOME".to_string(),
                ));
            }
        };
        tokio::fs::create_dir_all(&resolved_dir)
            .await
            .map_err(|e| ServerError::InvalidArgument(format!("cannot create working_dir: {e}")))?;

        let project_id = match project_id {
            Some(id) if crate::project_id::validate(&id) => id,
            Some(id) => {
                return Err(ServerError::InvalidArgument(format!(
                    "invalid project_id '{id}'"
                )));
            }
            None => crate::project_id::derive(&resolved_dir),
        };

        let environment: HashMap<String, String> = std::env::vars().collect();

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(ServerError::CapacityExceeded(format!(
                "already at max_sessions limit ({}/{})",
                sessions.len(),
                self.max_sessions
            )));
        }

        let session = Arc::new(Session::new(name, project_id, resolved_dir, environment));
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>, ServerError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("no session with id '{id}'")))
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.snapshot())
            .collect()
    }

    /// Close and remove one Session, terminating every background process it
    /// owns (graceful, then forceful after a grace period).
    pub async fn delete(&self, id: Uuid) -> Result<(), ServerError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&id)
                .ok_or_else(|| ServerError::NotFound(format!("no session with id '{id}'")))?
        };
        session.close();
        for bp in session.list_background() {
            let _ = bp.terminate(false).await;
        }
        Ok(())
    }

    pub async fn delete_by_project(&self, project_id: &str) -> Vec<Uuid> {
        let ids: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.project_id == project_id)
                .map(|s| s.id)
                .collect()
        };
        let mut deleted = Vec::new();
        for id in ids {
            if self.delete(id).await.is_ok() {
                deleted.push(id);
            }
        }
        deleted
    }

    /// Stop the sweeper and delete every Session, terminating their
    /// background processes.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        let ids: Vec<Uuid> = self.sessions.read().await.keys().copied().collect();
        for id in ids {
            let _ = self.delete(id).await;
        }
    }
}
