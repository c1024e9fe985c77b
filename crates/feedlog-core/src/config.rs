//! Application settings.
//!
//! Settings hold the spreadsheet id, the daily volume goal and the UI
//! preferences (formula types, quick-volume presets, haptics, drag speed).
//! List settings are stored comma-joined.
//!
//! Settings are stored at `~/.config/feedlog/settings.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the settings directory
const APP_NAME: &str = "feedlog";

/// Settings file name
const SETTINGS_FILE: &str = "settings.json";

/// Environment variable that overrides the stored spreadsheet id
const SPREADSHEET_ID_ENV: &str = "FEEDLOG_SPREADSHEET_ID";

const DEFAULT_DAILY_GOAL_ML: i32 = 800;
const DEFAULT_FORMULA_TYPES: &str = "Breast milk,Similac 360";
const DEFAULT_QUICK_VOLUMES: &str = "60,90,120,150";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DragSpeed {
    Slow,
    #[default]
    Default,
    Fast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub spreadsheet_id: Option<String>,
    pub daily_goal_ml: i32,
    pub formula_types: String,
    pub quick_volumes: String,
    pub haptics_enabled: bool,
    pub drag_speed: DragSpeed,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            daily_goal_ml: DEFAULT_DAILY_GOAL_ML,
            formula_types: DEFAULT_FORMULA_TYPES.to_string(),
            quick_volumes: DEFAULT_QUICK_VOLUMES.to_string(),
            haptics_enabled: true,
            drag_speed: DragSpeed::Default,
        }
    }
}

impl Settings {
    /// Load from the default location, falling back to defaults when no
    /// file exists, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::settings_path()?)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(SETTINGS_FILE))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(SPREADSHEET_ID_ENV) {
            if !id.trim().is_empty() {
                self.spreadsheet_id = Some(id.trim().to_string());
            }
        }
    }

    /// Configured spreadsheet id, if it is non-blank.
    pub fn store_id(&self) -> Option<&str> {
        self.spreadsheet_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn formula_type_list(&self) -> Vec<String> {
        split_list(&self.formula_types)
            .map(str::to_string)
            .collect()
    }

    pub fn set_formula_type_list(&mut self, types: &[String]) {
        self.formula_types = join_list(types.iter().map(String::as_str));
    }

    /// Quick-volume presets in mL; entries that aren't positive integers
    /// are skipped.
    pub fn quick_volume_list(&self) -> Vec<u32> {
        split_list(&self.quick_volumes)
            .filter_map(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .collect()
    }

    pub fn set_quick_volume_list(&mut self, volumes: &[u32]) {
        let volumes: Vec<String> = volumes.iter().map(u32::to_string).collect();
        self.quick_volumes = join_list(volumes.iter().map(String::as_str));
    }
}

fn split_list(joined: &str) -> impl Iterator<Item = &str> {
    joined.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn join_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| item.trim().replace(',', " "))
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
