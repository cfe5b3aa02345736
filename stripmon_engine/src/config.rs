//! Engine settings: load/save a simple JSON document under the XDG config
//! dir ($XDG_CONFIG_HOME/stripmon/settings.json, fallback
//! ~/.config/stripmon/settings.json).
//!
//! The engine reads settings through a shared handle at update time, so an
//! edit takes effect on the next tick — buffer sizes resize, the interface
//! filter switches, feeds re-fetch — without a restart.

use std::sync::{Arc, RwLock};
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

/// Per-module display/enable flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleFlags {
    pub cpu: bool,
    pub memory: bool,
    pub network: bool,
    pub disk: bool,
    pub battery: bool,
    pub gpu: bool,
    pub temperature: bool,
    pub weather: bool,
    pub stock: bool,
}

impl Default for ModuleFlags {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            network: true,
            disk: true,
            battery: true,
            gpu: true,
            temperature: true,
            weather: false,
            stock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Width of the displayed time window, seconds.
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,
    /// Seconds between graph ticks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: f64,
    #[serde(default)]
    pub modules: ModuleFlags,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    #[serde(default)]
    pub distance_unit: DistanceUnit,
    /// "All" or a concrete interface name.
    #[serde(default = "default_interface")]
    pub network_interface: String,
    /// ICAO station code for the weather feed, e.g. "KSFO".
    #[serde(default)]
    pub weather_station: String,
    #[serde(default)]
    pub stock_symbols: Vec<String>,
    #[serde(default)]
    pub version: u32,
}

fn default_time_window() -> u64 {
    300
}

fn default_refresh_interval() -> f64 {
    1.0
}

fn default_interface() -> String {
    crate::miners::net::ALL_INTERFACES.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_window_secs: default_time_window(),
            refresh_interval_secs: default_refresh_interval(),
            modules: ModuleFlags::default(),
            temperature_unit: TemperatureUnit::default(),
            distance_unit: DistanceUnit::default(),
            network_interface: default_interface(),
            weather_station: String::new(),
            stock_symbols: Vec::new(),
            version: 0,
        }
    }
}

impl Settings {
    /// Ring capacity implied by the window and refresh interval: one slot
    /// per graph tick across the displayed window, never zero.
    pub fn sample_capacity(&self) -> usize {
        let interval = self.refresh_interval_secs.max(0.1);
        ((self.time_window_secs as f64 / interval).round() as usize).max(1)
    }
}

/// Shared read-at-update-time handle; the frontend holds the other clone.
pub type SettingsHandle = Arc<RwLock<Settings>>;

pub fn shared(settings: Settings) -> SettingsHandle {
    Arc::new(RwLock::new(settings))
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("stripmon")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stripmon")
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Missing or unreadable settings fall back to defaults; a monitor should
/// come up even when its config is gone.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &std::path::Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => Settings::default(),
    }
}

pub fn save_settings(settings: &Settings) -> std::io::Result<()> {
    let path = settings_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_capacity_derives_from_window_and_interval() {
        let mut s = Settings::default();
        s.time_window_secs = 300;
        s.refresh_interval_secs = 1.0;
        assert_eq!(s.sample_capacity(), 300);
        s.refresh_interval_secs = 0.5;
        assert_eq!(s.sample_capacity(), 600);
        s.time_window_secs = 0;
        assert_eq!(s.sample_capacity(), 1);
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let s = load_settings_from(&path);
        assert_eq!(s.time_window_secs, 300);
        assert_eq!(s.network_interface, "All");
    }

    #[test]
    fn partial_settings_fill_missing_fields() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("settings.json");
        fs::write(&path, r#"{"weather_station":"KSFO"}"#).unwrap();
        let s = load_settings_from(&path);
        assert_eq!(s.weather_station, "KSFO");
        assert!(s.modules.cpu);
        assert_eq!(s.refresh_interval_secs, 1.0);
    }
}
