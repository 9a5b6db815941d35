//! Security Gate: a stateless, advisory evaluator applied to every command
//! string before it is allowed to run. It catches casual mistakes and policy
//! violations, not a hostile adversary -- there is no OS-level confinement.

use serde::{Deserialize, Serialize};

/// Characters stripped from the edges of a token before comparing it against
/// a blocklist entry or a standalone-command list.
const SHELL_METACHARS: &[char] = &[
    ';', '&', '|', '(', ')', '{', '}', '[', ']', '<', '>', '"', '\'', '`', '=', ':',
];

const SANDBOX_PATTERNS: &[&str] = &[
    "rm -rf /",
    "dd if=/dev",
    "mkfs",
    "fdisk",
    ":(){ :|:& };:",
    "> /dev/",
    "chmod 777",
    "chown root",
];

const NETWORK_COMMANDS: &[&str] = &[
    "wget", "curl", "ssh", "scp", "rsync", "nc", "netcat", "telnet",
];

const FILESYSTEM_WRITE_COMMANDS: &[&str] = &["rm", "mv", "cp", "touch", "mkdir", "rmdir"];

/// Security policy, configurable per server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub max_length: usize,
    pub blocked_commands: Vec<String>,
    pub enable_sandbox: bool,
    pub allow_network: bool,
    pub allow_filesystem_write: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_length: 50_000,
            blocked_commands: Vec::new(),
            enable_sandbox: true,
            allow_network: true,
            allow_filesystem_write: true,
        }
    }
}

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked(pub String);

impl std::fmt::Display for Blocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate `command` against `policy`. Pure function, no side effects.
pub fn validate(command: &str, policy: &Policy) -> Result<(), Blocked> {
    if command.trim().is_empty() {
        return Err(Blocked("empty command is not allowed".to_string()));
    }

    if command.len() > policy.max_length {
        return Err(Blocked(format!(
            "command length {} exceeds max_length {}",
            command.len(),
            policy.max_length
        )));
    }

    let tokens: Vec<String> = command
        .split_whitespace()
        .map(strip_shell_metachars)
        .collect();

    for entry in &policy.blocked_commands {
        let is_single_token = !entry.contains(char::is_whitespace) && !entry.contains('/');
        if is_single_token {
            if tokens.iter().any(|t| t == entry) {
                return Err(Blocked(format!("command contains blocked entry '{entry}'")));
            }
        } else if command.contains(entry.as_str()) {
            return Err(Blocked(format!("command contains blocked entry '{entry}'")));
        }
    }

    if policy.enable_sandbox {
        for pattern in SANDBOX_PATTERNS {
            if command.contains(pattern) {
                return Err(Blocked(format!(
                    "command matches a dangerous sandbox pattern ('{pattern}')"
                )));
            }
        }
    }

    if !policy.allow_network {
        for name in NETWORK_COMMANDS {
            if tokens.iter().any(|t| t == name) {
                return Err(Blocked(format!(
                    "network access is disabled; command uses '{name}'"
                )));
            }
        }
    }

    if !policy.allow_filesystem_write {
        for name in FILESYSTEM_WRITE_COMMANDS {
            if tokens.iter().any(|t| t == name) {
                return Err(Blocked(format!(
                    "filesystem writes are disabled; command uses '{name}'"
                )));
            }
        }
    }

    Ok(())
}

fn strip_shell_metachars(token: &str) -> String {
    token
        .trim_matches(|c| SHELL_METACHARS.contains(&c))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        assert!(validate("   ", &Policy::default()).is_err());
    }

    #[test]
    fn rejects_over_length_command() {
        let policy = Policy {
            max_length: 10,
            ..Policy::default()
        };
        assert!(validate(&"a".repeat(11), &policy).is_err());
        assert!(validate(&"a".repeat(10), &policy).is_ok());
    }

    #[test]
    fn blocks_single_token_command_whole_word() {
        let policy = Policy {
            blocked_commands: vec!["rm".to_string()],
            ..Policy::default()
        };
        assert!(validate("rm -rf build", &policy).is_err());
        assert!(validate("rmdir build", &policy).is_ok());
    }

    #[test]
    fn blocks_multi_word_entry_by_substring() {
        let policy = Policy {
            blocked_commands: vec!["curl -X POST".to_string()],
            ..Policy::default()
        };
        assert!(validate("curl -X POST https://example.com", &policy).is_err());
        assert!(validate("curl https://example.com", &policy).is_ok());
    }

    #[test]
    fn sandbox_patterns_blocked_when_enabled() {
        let policy = Policy::default();
        assert!(validate("rm -rf /", &policy).is_err());
    }

    #[test]
    fn sandbox_patterns_allowed_when_disabled() {
        let policy = Policy {
            enable_sandbox: false,
            ..Policy::default()
        };
        assert!(validate("rm -rf /", &policy).is_ok());
    }

    #[test]
    fn network_commands_blocked_when_disallowed() {
        let policy = Policy {
            allow_network: false,
            ..Policy::default()
        };
        assert!(validate("curl https://example.com", &policy).is_err());
        assert!(validate("echo curling", &policy).is_ok());
    }

    #[test]
    fn filesystem_writes_blocked_when_disallowed() {
        let policy = Policy {
            allow_filesystem_write: false,
            ..Policy::default()
        };
        assert!(validate("touch file.txt", &policy).is_err());
    }

    #[test]
    fn shell_metachars_stripped_before_blocklist_match() {
        let policy = Policy {
            blocked_commands: vec!["rm".to_string()],
            ..Policy::default()
        };
        assert!(validate("echo a; rm file", &policy).is_err());
    }
}
