//! Project-ID derivation: a pure, deterministic-up-to-suffix function from a
//! filesystem path to a stable, human-readable identifier.

use rand::Rng;
use std::path::Path;

const MAX_SLUG_LEN: usize = 50;
const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Derive a project id from a directory path.
///
/// 1. Take the last path component.
/// 2. Lowercase; spaces/hyphens become underscores; everything outside
///    `[a-z0-9_]` is deleted; runs of `_` collapse; leading/trailing `_` are
///    trimmed; an empty result becomes `project`; truncate to 50 chars.
/// 3. Append `_` followed by 6 random lowercase alphanumerics.
#[must_use]
pub fn derive(path: &Path) -> String {
    let component = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let slug = slugify(&component);
    format!("{slug}_{}", random_suffix())
}

fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        if ch == ' ' || ch == '-' {
            cleaned.push('_');
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            cleaned.push(ch);
        }
        // everything else is deleted
    }

    let collapsed = collapse_underscores(&cleaned);
    let trimmed = collapsed.trim_matches('_');
    let slug = if trimmed.is_empty() {
        "project"
    } else {
        trimmed
    };
    slug.chars().take(MAX_SLUG_LEN).collect()
}

fn collapse_underscores(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for ch in s.chars() {
        if ch == '_' {
            if !prev_underscore {
                out.push(ch);
            }
            prev_underscore = true;
        } else {
            out.push(ch);
            prev_underscore = false;
        }
    }
    out
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

/// Validate a caller-supplied project id: `[A-Za-z0-9_-]+`, length 3-100,
/// containing at least one underscore.
#[must_use]
pub fn validate(project_id: &str) -> bool {
    let len = project_id.len();
    if !(3..=100).contains(&len) {
        return false;
    }
    if !project_id.contains('_') {
        return false;
    }
    project_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_idempotent_under_validate() {
        let id = derive(Path::new("/home/user/My Cool Project"));
        assert!(validate(&id));
        assert!(id.starts_with("my_cool_project_"));
    }

    #[test]
    fn slugify_strips_non_ascii_and_collapses_underscores() {
        assert_eq!(slugify("My  Cool--Project!!"), "my_cool_project");
    }

    #[test]
    fn slugify_empty_component_falls_back_to_project() {
        assert_eq!(slugify("!!!"), "project");
    }

    #[test]
    fn slugify_truncates_to_max_len() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn validate_rejects_missing_underscore() {
        assert!(!validate("noseparator"));
    }

    #[test]
    fn validate_rejects_bad_chars() {
        assert!(!validate("my_project!"));
    }

    #[test]
    fn validate_rejects_out_of_range_length() {
        assert!(!validate("a_"));
        assert!(!validate(&format!("a_{}", "b".repeat(100))));
    }
}
