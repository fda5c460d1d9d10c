//! Environment lookups shared by the agent and the panel so both sides agree
//! on the session id and the socket location.

use std::path::PathBuf;
use std::time::Duration;

pub const SOCKET_ENV: &str = "RLAUNCH_SOCK";
pub const SESSION_ENV: &str = "RLAUNCH_SESSION_ID";
pub const DEFAULT_SESSION: &str = "default";

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

pub fn resolve_session_id() -> String {
    non_empty_env(SESSION_ENV).unwrap_or_else(|| DEFAULT_SESSION.to_string())
}

pub fn resolve_socket_path(session_id: &str) -> PathBuf {
    if let Some(value) = non_empty_env(SOCKET_ENV) {
        return PathBuf::from(value);
    }
    let runtime_dir = if let Some(value) = non_empty_env("XDG_RUNTIME_DIR") {
        PathBuf::from(value)
    } else if let Some(uid) = non_empty_env("UID") {
        PathBuf::from(format!("/run/user/{uid}"))
    } else {
        PathBuf::from("/tmp")
    };
    socket_path_in(&runtime_dir, session_id)
}

pub fn socket_path_in(runtime_dir: &std::path::Path, session_id: &str) -> PathBuf {
    runtime_dir
        .join("rlaunch")
        .join(session_slug(session_id))
        .join("agent.sock")
}

/// Filesystem-safe session name with a short hash suffix so that distinct
/// ids never collapse onto the same directory.
pub fn session_slug(session_id: &str) -> String {
    let mut slug = String::with_capacity(session_id.len());
    for ch in session_id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            slug.push(ch);
        } else {
            slug.push('-');
        }
    }
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    let base = if slug.is_empty() { "session" } else { slug };
    let short: String = base.chars().take(48).collect();
    format!("{short}-{}", stable_hash_hex(session_id))
}

fn stable_hash_hex(input: &str) -> String {
    let mut hash: u32 = 2166136261;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16777619);
    }
    format!("{hash:08x}")
}

/// Reconnect delay: doubles per failure, capped at ten seconds.
pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn slug_replaces_unsafe_characters_and_keeps_hash() {
        let slug = session_slug("robot lab/ws 1");
        assert!(slug.starts_with("robot-lab-ws-1-"));
        assert_eq!(slug.len(), "robot-lab-ws-1-".len() + 8);
        assert_ne!(session_slug("a b"), session_slug("a/b"));
    }

    #[test]
    fn slug_falls_back_for_symbol_only_ids() {
        assert!(session_slug("///").starts_with("session-"));
    }

    #[test]
    fn socket_path_is_namespaced_by_session() {
        let path = socket_path_in(Path::new("/run/user/1000"), "default");
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/run/user/1000/rlaunch/{}/agent.sock",
                session_slug("default")
            ))
        );
    }

    #[test]
    fn backoff_doubles_up_to_ten_seconds() {
        let mut delay = Duration::from_secs(1);
        let mut seen = Vec::new();
        for _ in 0..5 {
            delay = next_backoff(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 10, 10]);
    }
}
