//! Configuration surface: defaults, a JSON config file, environment
//! variable overrides, and the two CLI flags the server accepts.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `go-term` -- stdio MCP server exposing shell sessions and background
/// process supervision.
#[derive(Debug, Parser)]
#[command(name = "go-term", version, about)]
pub struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Force debug-level logging regardless of config/env.
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_sessions: usize,
    pub session_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_command_length: usize,
    pub max_background_processes: usize,
    pub background_output_limit: usize,
    /// Fallback working directory for `create_session` when the caller
    /// supplies none: `supplied | default_working_dir | cwd | HOME`.
    pub default_working_dir: Option<PathBuf>,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub shell: String,
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
    pub data_dir: PathBuf,
    pub enable_wal: bool,
    pub enable_sandbox: bool,
    pub blocked_commands: Vec<String>,
    pub allow_network: bool,
    pub allow_filesystem_write: bool,
    pub log_level: String,
    pub log_format: String,
    pub log_output: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_timeout_secs: 60 * 60,
            cleanup_interval_secs: 5 * 60,
            max_command_length: 50_000,
            max_background_processes: 3,
            background_output_limit: 2_000,
            default_working_dir: None,
            default_timeout_secs: 60,
            max_timeout_secs: 300,
            shell: "/bin/bash".to_string(),
            rate_limit_per_minute: 60,
            rate_limit_burst: 10,
            data_dir: default_data_dir(),
            enable_wal: true,
            enable_sandbox: true,
            blocked_commands: Vec::new(),
            allow_network: true,
            allow_filesystem_write: true,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_output: "stderr".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("go-term")
}

impl Config {
    /// Resolve configuration from defaults, an optional file, environment
    /// variables, and CLI flags, in that precedence order (later wins).
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Some(path) = &cli.config
            && path.exists()
        {
            let text = std::fs::read_to_string(path)?;
            config = serde_json::from_str(&text)?;
        }

        config.apply_env_overrides();

        if cli.debug {
            config.log_level = "debug".to_string();
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_parse {
            ($field:expr, $var:literal) => {
                if let Ok(val) = std::env::var($var) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        env_parse!(self.max_sessions, "GOTERM_MAX_SESSIONS");
        env_parse!(self.session_timeout_secs, "GOTERM_SESSION_TIMEOUT");
        env_parse!(self.cleanup_interval_secs, "GOTERM_CLEANUP_INTERVAL");
        env_parse!(self.max_command_length, "GOTERM_MAX_COMMAND_LENGTH");
        env_parse!(
            self.max_background_processes,
            "GOTERM_MAX_BACKGROUND_PROCESSES"
        );
        env_parse!(
            self.background_output_limit,
            "GOTERM_BACKGROUND_OUTPUT_LIMIT"
        );
        env_parse!(self.default_timeout_secs, "GOTERM_DEFAULT_TIMEOUT");
        env_parse!(self.max_timeout_secs, "GOTERM_MAX_TIMEOUT");
        env_parse!(self.rate_limit_per_minute, "GOTERM_RATE_LIMIT_PER_MINUTE");
        env_parse!(self.rate_limit_burst, "GOTERM_RATE_LIMIT_BURST");
        env_parse!(self.enable_wal, "GOTERM_ENABLE_WAL");
        env_parse!(self.enable_sandbox, "GOTERM_ENABLE_SANDBOX");
        env_parse!(self.allow_network, "GOTERM_ALLOW_NETWORK");
        env_parse!(self.allow_filesystem_write, "GOTERM_ALLOW_FILESYSTEM_WRITE");

        if let Ok(shell) = std::env::var("GOTERM_SHELL") {
            self.shell = shell;
        }
        if let Ok(dir) = std::env::var("GOTERM_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("GOTERM_DEFAULT_WORKING_DIR") {
            self.default_working_dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var("GOTERM_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(format) = std::env::var("GOTERM_LOG_FORMAT") {
            self.log_format = format;
        }
        if let Ok(output) = std::env::var("GOTERM_LOG_OUTPUT") {
            self.log_output = output;
        }
        if let Ok(blocked) = std::env::var("GOTERM_BLOCKED_COMMANDS") {
            self.blocked_commands = blocked
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Build the Security Gate policy from the relevant subset of fields.
    #[must_use]
    pub fn security_policy(&self) -> crate::security::Policy {
        crate::security::Policy {
            max_length: self.max_command_length,
            blocked_commands: self.blocked_commands.clone(),
            enable_sandbox: self.enable_sandbox,
            allow_network: self.allow_network,
            allow_filesystem_write: self.allow_filesystem_write,
        }
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sessions.db")
    }
}
