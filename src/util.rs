use std::env;

use crate::MapError;

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_required(name: &str) -> Result<String, MapError> {
    env_optional(name).ok_or_else(|| MapError::Config(format!("{name} is not set")))
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64, MapError> {
    match env_optional(name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| MapError::Config(format!("invalid {name}"))),
        None => Ok(default),
    }
}

pub(crate) fn env_usize(name: &str, default: usize) -> Result<usize, MapError> {
    match env_optional(name) {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| MapError::Config(format!("invalid {name}"))),
        None => Ok(default),
    }
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match env_optional(name) {
        Some(value) => {
            let v = value.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "yes" | "y" | "on")
        }
        None => default,
    }
}

/// Char-safe prefix truncation (Slack snippets and prompts are not byte-safe
/// slice points).
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Drop a markdown code-fence wrapper if the model added one despite
/// instructions. Tolerance measure only; well-formed responses pass through.
pub(crate) fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() <= 1 {
        return String::new();
    }
    let body = if lines.last().map(|line| line.trim()) == Some("```") {
        &lines[1..lines.len() - 1]
    } else {
        &lines[1..]
    };
    body.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_plain_passthrough() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  [1, 2]  "), "[1, 2]");
    }

    #[test]
    fn strip_code_fence_full_wrapper() {
        let wrapped = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(wrapped), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fence_missing_closer() {
        let wrapped = "```\n[\"x\"]";
        assert_eq!(strip_code_fence(wrapped), "[\"x\"]");
    }

    #[test]
    fn strip_code_fence_fence_only() {
        assert_eq!(strip_code_fence("```"), "");
    }

    #[test]
    fn truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
