// Copyright 2025 BikeFlow Desktop Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Persistent configuration stored as TOML via confy. Every field carries a
//! serde default so config files written by older builds keep loading.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default map center: Boston/Cambridge, where the Bluebikes network lives.
pub const DEFAULT_CENTER_LAT: f64 = 42.36027;
pub const DEFAULT_CENTER_LON: f64 = -71.09415;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Initial map center latitude
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,

    /// Initial map center longitude
    #[serde(default = "default_center_lon")]
    pub center_lon: f64,

    /// Default map zoom level (clamped to 5.0 - 18.0 in the UI)
    #[serde(default = "default_zoom")]
    pub default_zoom: f32,

    /// Station feed URL (JSON)
    #[serde(default = "default_stations_url")]
    pub stations_url: String,

    /// Trip log URL (CSV)
    #[serde(default = "default_trips_url")]
    pub trips_url: String,

    /// Override directory for downloaded data files
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Show the traffic-flow legend window
    #[serde(default = "default_true")]
    pub show_legend: bool,
}

// Default value functions for serde
fn default_center_lat() -> f64 {
    DEFAULT_CENTER_LAT
}

fn default_center_lon() -> f64 {
    DEFAULT_CENTER_LON
}

fn default_zoom() -> f32 {
    12.0
}

fn default_stations_url() -> String {
    crate::station_data::STATIONS_URL.to_owned()
}

fn default_trips_url() -> String {
    crate::station_data::TRIPS_URL.to_owned()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            default_zoom: default_zoom(),
            stations_url: default_stations_url(),
            trips_url: default_trips_url(),
            data_dir: None,
            show_legend: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load("bikeflow-desktop", "config")
    }

    /// Save configuration to disk
    #[allow(dead_code)]
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store("bikeflow-desktop", "config", self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path("bikeflow-desktop", "config")
    }

    /// Directory the data feeds are downloaded into
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".data"));
        path.push("bikeflow-desktop");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_center_on_boston() {
        let config = AppConfig::default();
        assert!((config.center_lat - 42.36027).abs() < 1e-9);
        assert!((config.center_lon + 71.09415).abs() < 1e-9);
        assert_eq!(config.default_zoom, 12.0);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{ "center_lat": 40.0 }"#).unwrap();
        assert!((config.center_lat - 40.0).abs() < 1e-9);
        assert_eq!(config.default_zoom, 12.0);
        assert!(config.show_legend);
        assert!(config.data_dir.is_none());
    }
}
