use anyhow::{Context, Result};
use rlaunch_core::runtime::{resolve_session_id, resolve_socket_path};
use rlaunch_core::{LayoutConfig, PanelConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

pub const PANEL_CONFIG_ENV: &str = "RLAUNCH_PANEL_CONFIG";

/// Control geometry in terminal cells.
pub const CELL_LAYOUT: LayoutConfig = LayoutConfig {
    columns: 3,
    control_width: 26,
    control_height: 5,
    spacing: 1,
    margin: 1,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub session_id: String,
    pub client_id: String,
    pub socket_path: PathBuf,
    pub panel: PanelConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PanelFile {
    columns: Option<u16>,
    control_width: Option<u16>,
    control_height: Option<u16>,
    only_these: Option<Vec<u32>>,
    tooltips: HashMap<String, String>,
}

pub fn load_config() -> Result<Config> {
    let session_id = resolve_session_id();
    let socket_path = resolve_socket_path(&session_id);
    let panel = match resolve_panel_config_path() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading panel config {}", path.display()))?;
            let panel = parse_panel_config(&raw)
                .with_context(|| format!("invalid panel config {}", path.display()))?;
            info!(event = "panel_config_loaded", path = %path.display());
            panel
        }
        None => parse_panel_config("")?,
    };
    Ok(Config {
        session_id,
        client_id: format!("rlaunch-panel-{}", std::process::id()),
        socket_path,
        panel,
    })
}

pub fn parse_panel_config(raw: &str) -> Result<PanelConfig> {
    let file: PanelFile = toml::from_str(raw)?;
    let layout = LayoutConfig {
        columns: file.columns.unwrap_or(CELL_LAYOUT.columns).max(1),
        control_width: file
            .control_width
            .unwrap_or(CELL_LAYOUT.control_width)
            .max(12),
        control_height: file
            .control_height
            .unwrap_or(CELL_LAYOUT.control_height)
            .max(4),
        ..CELL_LAYOUT
    };
    Ok(PanelConfig {
        layout,
        only_these: file.only_these,
        tooltips: file.tooltips,
    })
}

/// An explicit path must exist; the default location is optional.
fn resolve_panel_config_path() -> Option<PathBuf> {
    if let Ok(value) = std::env::var(PANEL_CONFIG_ENV) {
        if !value.trim().is_empty() {
            return Some(PathBuf::from(value));
        }
    }
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    let path = base.join("rlaunch").join("panel.toml");
    path.exists().then_some(path)
}
