//! MCP server: tool definitions using rmcp macros.
//!
//! Defines `GoTermServer`, wiring the Security Gate, Rate Limiter, Session
//! Registry, Foreground Executor, Background Supervisor, and History Store
//! into the tool surface of the specification's external interface.

use crate::background;
use crate::config::Config;
use crate::error::ServerError;
use crate::foreground;
use crate::history::{CommandRecord, HistoryStore, SearchFilters, SortDir, SortField};
use crate::rate_limit::RateLimiter;
use crate::registry::SessionRegistry;
use crate::security::{self, Policy};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::tool;
use rmcp::tool_handler;
use rmcp::tool_router;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Parameter structs (deserialized from MCP tool call arguments)
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct CreateSessionParams {
    /// Human label for the session (3-100 chars).
    pub name: String,
    /// Optional explicit project id; derived from working_dir if omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Initial working directory. Defaults to the server's own cwd.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct RunCommandParams {
    /// ID of the session to execute in.
    pub session_id: String,
    /// The shell command to run.
    pub command: String,
    /// Timeout in seconds. 0 or omitted means the server default; capped at
    /// the configured maximum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct RunBackgroundProcessParams {
    pub session_id: String,
    pub command: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct CheckBackgroundProcessParams {
    pub session_id: String,
    /// Process to check. If omitted and the session has exactly one
    /// background process, that one is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ListBackgroundProcessesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct TerminateBackgroundProcessParams {
    pub session_id: String,
    pub process_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

#[derive(Debug, Default, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchHistoryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Sort column: `time` (default), `duration`, or `command`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    /// Sort direction: `asc` or `desc` (default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_dir: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DeleteSessionParams {
    /// Must be true; a safety interlock against accidental deletion.
    pub confirm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SetSessionEnvironmentParams {
    pub session_id: String,
    pub variables: std::collections::HashMap<String, String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct GetSessionEnvironmentParams {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct UnsetSessionEnvironmentParams {
    pub session_id: String,
    pub keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Result structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct CreateSessionResult {
    session_id: Uuid,
    name: String,
    project_id: String,
    working_dir: String,
}

#[derive(Debug, Clone, Serialize)]
struct ListSessionsResult {
    sessions: Vec<crate::session::SessionSnapshot>,
    total: usize,
    active: usize,
}

#[derive(Debug, Clone, Serialize)]
struct RunCommandResult {
    output: String,
    exit_code: i32,
    success: bool,
    duration_seconds: f64,
    timed_out: bool,
    working_dir: String,
    command_count: u64,
}

#[derive(Debug, Clone, Serialize)]
struct RunBackgroundProcessResult {
    process_id: Uuid,
    start_time: chrono::DateTime<chrono::Utc>,
    background_count: usize,
    max_background: usize,
}

#[derive(Debug, Clone, Serialize)]
struct ListBackgroundProcessesResult {
    processes: Vec<background::BackgroundSnapshot>,
    total: usize,
    running: usize,
}

#[derive(Debug, Clone, Serialize)]
struct TerminateBackgroundProcessResult {
    was_running: bool,
    terminated: bool,
    force: bool,
    message: String,
    final_output: String,
}

#[derive(Debug, Clone, Serialize)]
struct SearchHistoryResult {
    results: Vec<CommandRecord>,
    total_found: usize,
    search_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
struct DeleteSessionResult {
    sessions_deleted: usize,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
struct EnvironmentResult {
    variables: std::collections::HashMap<String, String>,
    count: usize,
    success: bool,
}

// ---------------------------------------------------------------------------
// MCP server
// ---------------------------------------------------------------------------

/// The go-term MCP server: session/process supervisor over stdio.
#[derive(Clone)]
pub struct GoTermServer {
    registry: Arc<SessionRegistry>,
    history: HistoryStore,
    rate_limiter: Arc<RateLimiter>,
    policy: Policy,
    config: Arc<Config>,
    tool_router: ToolRouter<GoTermServer>,
}

impl GoTermServer {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, history: HistoryStore, config: Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_burst,
            config.rate_limit_per_minute,
        ));
        let policy = config.security_policy();
        Self {
            registry,
            history,
            rate_limiter,
            policy,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Consult the rate limiter; every mutating tool calls this first.
    fn admit(&self) -> Result<(), ServerError> {
        if self.rate_limiter.allow() {
            Ok(())
        } else {
            Err(ServerError::RateLimited)
        }
    }

    async fn resolve_session(
        &self,
        session_id: &str,
    ) -> Result<Arc<crate::session::Session>, ServerError> {
        let id = Uuid::parse_str(session_id).map_err(|_| {
            ServerError::InvalidArgument(format!("'{session_id}' is not a valid session id"))
        })?;
        self.registry.get(id).await
    }
}

fn json_content<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("JSON serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn err_result(err: ServerError) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(err.to_message())]))
}

fn parse_sort_field(value: Option<&str>) -> SortField {
    match value {
        Some("duration") => SortField::Duration,
        Some("command") => SortField::Command,
        _ => SortField::Time,
    }
}

fn parse_sort_dir(value: Option<&str>) -> SortDir {
    match value {
        Some("asc") => SortDir::Asc,
        _ => SortDir::Desc,
    }
}

#[tool_router]
impl GoTermServer {
    #[tool(
        description = "Create a persistent shell session: a long-lived working directory and environment that later run_command calls reuse. Set working_dir to anchor it to a project; project_id is derived from that directory's name if omitted."
    )]
    async fn create_session(
        &self,
        Parameters(params): Parameters<CreateSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        tracing::info!(name = %params.name, "create_session");
        let working_dir = params.working_dir.map(PathBuf::from);
        match self
            .registry
            .create(params.name, params.project_id, working_dir)
            .await
        {
            Ok(session) => json_content(&CreateSessionResult {
                session_id: session.id,
                name: session.name.clone(),
                project_id: session.project_id.clone(),
                working_dir: session.working_dir.to_string_lossy().into_owned(),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "List all active sessions with their working directory, counters, and background-process count."
    )]
    async fn list_sessions(&self) -> Result<CallToolResult, McpError> {
        let sessions = self.registry.list().await;
        let active = sessions.iter().filter(|s| s.is_active).count();
        json_content(&ListSessionsResult {
            total: sessions.len(),
            active,
            sessions,
        })
    }

    #[tool(
        description = "Run a command to completion in a session (cwd and environment persist across calls within the session). Blocks until the command exits or the timeout elapses (default 60s, max 300s)."
    )]
    async fn run_command(
        &self,
        Parameters(params): Parameters<RunCommandParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        if let Err(e) = security::validate(&params.command, &self.policy) {
            return err_result(ServerError::PolicyBlocked(e.to_string()));
        }

        tracing::info!(session_id = %session.id, command = %params.command, "run_command");
        let outcome = foreground::execute(
            &session,
            params.command,
            params.timeout,
            &self.config.shell,
            self.config.default_timeout_secs,
            self.config.max_timeout_secs,
            &self.history,
        )
        .await;

        json_content(&RunCommandResult {
            output: outcome.output,
            exit_code: outcome.exit_code,
            success: outcome.exit_code == 0,
            duration_seconds: outcome.duration.as_secs_f64(),
            timed_out: outcome.timed_out,
            working_dir: outcome.working_dir,
            command_count: outcome.command_count,
        })
    }

    #[tool(
        description = "Start a command as a detached background process under a session. Returns immediately with a process_id; use check_background_process to poll it and terminate_background_process to stop it. Capped at max_background_processes concurrently running per session."
    )]
    async fn run_background_process(
        &self,
        Parameters(params): Parameters<RunBackgroundProcessParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        if let Err(e) = security::validate(&params.command, &self.policy) {
            return err_result(ServerError::PolicyBlocked(e.to_string()));
        }

        if let Err(e) = session.check_background_capacity(self.config.max_background_processes) {
            return err_result(e);
        }

        let (current_dir, environment) = session.snapshot_for_exec();
        let history = self.history.clone();
        let session_id = session.id;
        let project_id = session.project_id.clone();
        let command = params.command.clone();
        let started_at = chrono::Utc::now();

        let process = match background::start(
            session_id,
            session.name.clone(),
            project_id.clone(),
            command.clone(),
            current_dir.clone(),
            environment,
            &self.config.shell,
            self.config.background_output_limit,
            move |exit_code, output, _error_output, ended_at| {
                let record = CommandRecord::new(
                    session_id,
                    project_id,
                    command,
                    output,
                    exit_code,
                    started_at,
                    ended_at,
                    current_dir.to_string_lossy().into_owned(),
                );
                tokio::spawn(async move {
                    if let Err(e) = history.append(record).await {
                        tracing::warn!(error = %e, "failed to append background command record");
                    }
                });
            },
        ) {
            Ok(p) => p,
            Err(e) => return err_result(e),
        };

        if let Err(e) =
            session.add_background(process.clone(), self.config.max_background_processes)
        {
            let _ = process.terminate(true).await;
            return err_result(e);
        }

        tracing::info!(session_id = %session.id, process_id = %process.id, "run_background_process");

        json_content(&RunBackgroundProcessResult {
            process_id: process.id,
            start_time: process.start_time,
            background_count: session.list_background().len(),
            max_background: self.config.max_background_processes,
        })
    }

    #[tool(
        description = "Check a background process without blocking: status, exit code (if finished), elapsed time, and captured output. Omit process_id if the session only has one background process."
    )]
    async fn check_background_process(
        &self,
        Parameters(params): Parameters<CheckBackgroundProcessParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        let process = match resolve_process(&session, params.process_id.as_deref()) {
            Ok(p) => p,
            Err(e) => return err_result(e),
        };
        json_content(&process.snapshot())
    }

    #[tool(
        description = "List background processes, optionally filtered by session_id or project_id. With no filters, lists across every active session."
    )]
    async fn list_background_processes(
        &self,
        Parameters(params): Parameters<ListBackgroundProcessesParams>,
    ) -> Result<CallToolResult, McpError> {
        let sessions = if let Some(session_id) = &params.session_id {
            match self.resolve_session(session_id).await {
                Ok(s) => vec![s],
                Err(e) => return err_result(e),
            }
        } else {
            let ids: Vec<Uuid> = self.registry.list().await.iter().map(|s| s.id).collect();
            let mut out = Vec::new();
            for id in ids {
                if let Ok(s) = self.registry.get(id).await {
                    out.push(s);
                }
            }
            out
        };

        let processes: Vec<background::BackgroundSnapshot> = sessions
            .iter()
            .filter(|s| {
                params
                    .project_id
                    .as_deref()
                    .is_none_or(|p| p == s.project_id)
            })
            .flat_map(|s| s.list_background())
            .map(|p| p.snapshot())
            .collect();

        let running = processes.iter().filter(|p| p.is_running).count();
        json_content(&ListBackgroundProcessesResult {
            total: processes.len(),
            running,
            processes,
        })
    }

    #[tool(
        description = "Terminate a background process: SIGTERM, escalating to SIGKILL after a 5s grace period, or force=true for an immediate SIGKILL. A no-op success if the process already exited."
    )]
    async fn terminate_background_process(
        &self,
        Parameters(params): Parameters<TerminateBackgroundProcessParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        let process = match resolve_process(&session, Some(params.process_id.as_str())) {
            Ok(p) => p,
            Err(e) => return err_result(e),
        };

        let was_running = process.is_running();
        let force = params.force.unwrap_or(false);
        tracing::info!(session_id = %session.id, process_id = %process.id, force, "terminate_background_process");
        if let Err(e) = process.terminate(force).await {
            return err_result(e);
        }

        let snapshot = process.snapshot();
        json_content(&TerminateBackgroundProcessResult {
            was_running,
            terminated: true,
            force,
            message: if was_running {
                "process terminated".to_string()
            } else {
                "process had already exited".to_string()
            },
            final_output: snapshot.output,
        })
    }

    #[tool(
        description = "Search the durable command history. Combine any of: session_id, project_id, command/output substring, success flag, start_time/end_time (RFC 3339), working_dir substring. Sort by time (default), duration, or command; limit defaults to 100, max 1000."
    )]
    async fn search_history(
        &self,
        Parameters(params): Parameters<SearchHistoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let start = std::time::Instant::now();

        let session_id = match params.session_id.as_deref().map(Uuid::parse_str) {
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                return err_result(ServerError::InvalidArgument(
                    "session_id is not a valid UUID".to_string(),
                ));
            }
            None => None,
        };
        let parse_time = |s: &str| -> Result<chrono::DateTime<chrono::Utc>, ServerError> {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|_| ServerError::InvalidArgument(format!("'{s}' is not RFC 3339")))
        };
        let start_time = match params.start_time.as_deref().map(parse_time) {
            Some(Ok(t)) => Some(t),
            Some(Err(e)) => return err_result(e),
            None => None,
        };
        let end_time = match params.end_time.as_deref().map(parse_time) {
            Some(Ok(t)) => Some(t),
            Some(Err(e)) => return err_result(e),
            None => None,
        };

        let filters = SearchFilters {
            session_id,
            project_id: params.project_id,
            command_substr: params.command,
            output_substr: params.output,
            success: params.success,
            start_time,
            end_time,
            working_dir_substr: params.working_dir,
            limit: params.limit.unwrap_or(crate::history::DEFAULT_SEARCH_LIMIT),
            sort_by: parse_sort_field(params.sort_by.as_deref()),
            sort_dir: parse_sort_dir(params.sort_dir.as_deref()),
        };

        match self.history.query(filters).await {
            Ok(results) => json_content(&SearchHistoryResult {
                total_found: results.len(),
                results,
                search_time_seconds: start.elapsed().as_secs_f64(),
            }),
            Err(e) => err_result(ServerError::Internal(e.to_string())),
        }
    }

    #[tool(
        description = "Delete one session (session_id) or every session in a project (project_id). Requires confirm=true as a safety interlock. Running background processes are terminated first."
    )]
    async fn delete_session(
        &self,
        Parameters(params): Parameters<DeleteSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        if !params.confirm {
            return err_result(ServerError::InvalidArgument(
                "confirm must be true to delete a session".to_string(),
            ));
        }
        match (params.session_id.as_deref(), params.project_id.as_deref()) {
            (Some(_), Some(_)) | (None, None) => err_result(ServerError::InvalidArgument(
                "exactly one of session_id or project_id must be provided".to_string(),
            )),
            (Some(session_id), None) => {
                let id = match Uuid::parse_str(session_id) {
                    Ok(id) => id,
                    Err(_) => {
                        return err_result(ServerError::InvalidArgument(
                            "session_id is not a valid UUID".to_string(),
                        ));
                    }
                };
                tracing::info!(session_id = %id, "delete_session");
                match self.registry.delete(id).await {
                    Ok(()) => json_content(&DeleteSessionResult {
                        sessions_deleted: 1,
                        message: format!("session {id} deleted"),
                    }),
                    Err(e) => err_result(e),
                }
            }
            (None, Some(project_id)) => {
                tracing::info!(project_id = %project_id, "delete_session (by project)");
                let deleted = self.registry.delete_by_project(project_id).await;
                json_content(&DeleteSessionResult {
                    sessions_deleted: deleted.len(),
                    message: format!(
                        "{} session(s) deleted for project '{project_id}'",
                        deleted.len()
                    ),
                })
            }
        }
    }

    #[tool(
        description = "Set one or more environment variables in a session, merged into the existing environment."
    )]
    async fn set_session_environment(
        &self,
        Parameters(params): Parameters<SetSessionEnvironmentParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        let count = params.variables.len();
        session.set_env(params.variables);
        json_content(&EnvironmentResult {
            variables: session.environment_snapshot(),
            count,
            success: true,
        })
    }

    #[tool(description = "Read a session's environment, or a single variable if key is given.")]
    async fn get_session_environment(
        &self,
        Parameters(params): Parameters<GetSessionEnvironmentParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        let all = session.environment_snapshot();
        let variables = match params.key {
            Some(key) => match all.get(&key) {
                Some(value) => std::collections::HashMap::from([(key, value.clone())]),
                None => std::collections::HashMap::new(),
            },
            None => all,
        };
        let count = variables.len();
        json_content(&EnvironmentResult {
            variables,
            count,
            success: true,
        })
    }

    #[tool(description = "Unset one or more environment variables in a session.")]
    async fn unset_session_environment(
        &self,
        Parameters(params): Parameters<UnsetSessionEnvironmentParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.admit() {
            return err_result(e);
        }
        let session = match self.resolve_session(&params.session_id).await {
            Ok(s) => s,
            Err(e) => return err_result(e),
        };
        let count = params.keys.len();
        session.unset_env(&params.keys);
        json_content(&EnvironmentResult {
            variables: session.environment_snapshot(),
            count,
            success: true,
        })
    }
}

fn resolve_process(
    session: &crate::session::Session,
    process_id: Option<&str>,
) -> Result<Arc<background::BackgroundProcess>, ServerError> {
    match process_id {
        Some(raw) => {
            let id = Uuid::parse_str(raw).map_err(|_| {
                ServerError::InvalidArgument(format!("'{raw}' is not a valid process id"))
            })?;
            session.get_background(id).ok_or_else(|| {
                ServerError::NotFound(format!("no background process '{id}' in this session"))
            })
        }
        None => {
            let mut processes = session.list_background();
            match processes.len() {
                1 => Ok(processes.remove(0)),
                0 => Err(ServerError::NotFound(
                    "session has no background processes".to_string(),
                )),
                _ => Err(ServerError::InvalidArgument(
                    "session has multiple background processes; specify process_id".to_string(),
                )),
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for GoTermServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "go-term".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "go-term supervises shell sessions and background processes on the local host.\n\n\
                 SESSIONS: create_session starts a persistent working directory + environment. \
                 run_command runs to completion in that context (cwd changes via `cd` persist; \
                 default timeout 60s, max 300s). set/get/unset_session_environment manage its env.\n\n\
                 BACKGROUND PROCESSES: run_background_process starts a detached command under a \
                 session (max 3 running at once by default). check_background_process polls it \
                 without blocking; terminate_background_process stops it (graceful, then forceful).\n\n\
                 HISTORY: every run_command and completed background process is recorded durably; \
                 search_history queries by session, project, substring, success, or time window.\n\n\
                 Mutating calls (run_command, run_background_process, terminate_background_process, \
                 set/unset_session_environment) are rate-limited; reads are not."
                    .to_string(),
            ),
        }
    }
}
