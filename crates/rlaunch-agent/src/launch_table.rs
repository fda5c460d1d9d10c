use anyhow::{Context, Result};
use rlaunch_core::LaunchEntry;
use serde::Deserialize;
use std::io;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct LaunchFile {
    #[serde(default)]
    launch: Vec<LaunchSpec>,
}

#[derive(Debug, Deserialize)]
struct LaunchSpec {
    name: String,
    command: String,
    #[serde(default = "default_working_directory")]
    working_directory: String,
}

fn default_working_directory() -> String {
    ".".to_string()
}

/// Loads the launch table. Ids follow file order starting at 0. A missing or
/// unreadable file yields an empty table; malformed TOML is an error.
pub fn load(path: &Path) -> Result<Vec<LaunchEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            let reason = if err.kind() == io::ErrorKind::NotFound {
                "missing"
            } else {
                "unreadable"
            };
            warn!(
                event = "launch_table_unavailable",
                path = %path.display(),
                reason,
                error = %err
            );
            return Ok(Vec::new());
        }
    };
    let entries = parse(&raw).with_context(|| format!("invalid launch table {}", path.display()))?;
    info!(
        event = "launch_table_loaded",
        path = %path.display(),
        entries = entries.len()
    );
    Ok(entries)
}

pub fn parse(raw: &str) -> Result<Vec<LaunchEntry>> {
    let file: LaunchFile = toml::from_str(raw)?;
    let mut entries = Vec::with_capacity(file.launch.len());
    for (index, spec) in file.launch.into_iter().enumerate() {
        let id = u32::try_from(index).context("launch table too large")?;
        entries.push(LaunchEntry {
            id,
            name: spec.name,
            command: spec.command,
            working_directory: spec.working_directory,
            running: false,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_file_order() {
        let entries = parse(
            r#"
            [[launch]]
            name = "nav"
            command = "ros2 launch nav2_bringup navigation_launch.py"
            working_directory = "/opt/robot"

            [[launch]]
            name = "map"
            command = "ros2 launch slam_toolbox online_async_launch.py"
            "#,
        )
        .expect("parse");

        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].id, entries[0].name.as_str()), (0, "nav"));
        assert_eq!((entries[1].id, entries[1].name.as_str()), (1, "map"));
        assert_eq!(entries[1].working_directory, ".");
        assert!(entries.iter().all(|entry| !entry.running));
    }

    #[test]
    fn empty_file_is_an_empty_table() {
        assert!(parse("").expect("parse").is_empty());
    }

    #[test]
    fn missing_command_is_rejected() {
        assert!(parse("[[launch]]\nname = \"nav\"\n").is_err());
    }

    #[test]
    fn missing_file_yields_empty_table() {
        let path = std::env::temp_dir().join(format!(
            "rlaunch-missing-{}-table.toml",
            std::process::id()
        ));
        assert!(load(&path).expect("load").is_empty());
    }
}
