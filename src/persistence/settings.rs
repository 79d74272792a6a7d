use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::graph_utils::history::{DEFAULT_HISTORY_DEPTH, MAX_HISTORY_DEPTH};
use crate::graph_utils::registry::PlanTier;
use crate::gui::controller::EditorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // If None, use OS default projects directory
    #[serde(default)]
    pub projects_override: Option<PathBuf>,
    // Plan of the signed-in user; billing lives elsewhere
    #[serde(default)]
    pub plan_tier: PlanTier,
    #[serde(default = "AppSettings::default_history_depth")]
    pub history_depth: usize,
    // Clamp dragged nodes onto alignment guides
    #[serde(default)]
    pub snap_to_guides: bool,
    // Open projects read-only
    #[serde(default)]
    pub presentation_on_open: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            projects_override: None,
            plan_tier: PlanTier::Free,
            history_depth: Self::default_history_depth(),
            snap_to_guides: false,
            presentation_on_open: false,
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Flow-Loom
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join("Flow-Loom");
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Flow-Loom
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join("Flow-Loom");
            }
            return PathBuf::from("Flow-Loom");
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Flow-Loom or ~/.config/Flow-Loom
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join("Flow-Loom");
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join("Flow-Loom");
        }
    }

    fn projects_default_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            // %LOCALAPPDATA%\Flow-Loom\Projects
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join("Flow-Loom").join("Projects");
            }
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_DATA_HOME/flow-loom or ~/.local/share/flow-loom
            if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
                return PathBuf::from(xdg).join("flow-loom");
            }
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(".local").join("share").join("flow-loom");
            }
        }
        Self::config_dir().join("projects")
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_dir().join("settings.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut f = std::fs::File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        let v: Self = serde_json::from_str(&s)?;
        Ok(v)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        let s = serde_json::to_string_pretty(self)?;
        let mut f = std::fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Return the directory where the settings file (settings.json) is stored.
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    /// Effective projects directory honoring user override.
    pub fn projects_dir(&self) -> PathBuf {
        if let Some(p) = &self.projects_override { return p.clone(); }
        Self::projects_default_dir()
    }

    pub(crate) fn default_history_depth() -> usize { DEFAULT_HISTORY_DEPTH }

    /// Engine configuration derived from these settings.
    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            plan_tier: self.plan_tier,
            history_depth: self.history_depth.clamp(1, MAX_HISTORY_DEPTH),
            snap_to_guides: self.snap_to_guides,
            presentation: self.presentation_on_open,
        }
    }
}
