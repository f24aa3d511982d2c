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

//! Station and trip data loading.
//!
//! Two feeds back the visualization: a station list (JSON, nested under
//! `data.stations`) and a month of trip records (CSV). Both are fetched once
//! at startup if not already cached on disk, then loaded fully into memory.
//! Trips are immutable after load; all traffic numbers are derived from them
//! at view time.

use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::bike_lanes::{self, BikeLaneNetwork};

/// Default station feed (Bluebikes station list).
pub const STATIONS_URL: &str = "https://dsc106.com/labs/lab07/data/bluebikes-stations.json";

/// Default trip feed (Bluebikes trips, March 2024).
pub const TRIPS_URL: &str = "https://dsc106.com/labs/lab07/data/bluebikes-traffic-2024-03.csv";

const STATIONS_FILE: &str = "bluebikes-stations.json";
const TRIPS_FILE: &str = "bluebikes-traffic.csv";

/// A bike-share station from the station feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    /// Stable station key; trips reference stations by this id.
    pub short_name: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(deserialize_with = "de_lenient_f64")]
    pub lat: f64,

    #[serde(deserialize_with = "de_lenient_f64")]
    pub lon: f64,
}

/// A single ride from the trip log. Never mutated after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Trip {
    #[serde(deserialize_with = "de_trip_timestamp")]
    pub started_at: NaiveDateTime,

    #[serde(deserialize_with = "de_trip_timestamp")]
    pub ended_at: NaiveDateTime,

    pub start_station_id: String,

    pub end_station_id: String,
}

/// The station feed wraps its payload in `{ "data": { "stations": [...] } }`.
#[derive(Debug, Deserialize)]
struct StationFeed {
    data: StationFeedData,
}

#[derive(Debug, Deserialize)]
struct StationFeedData {
    stations: Vec<Station>,
}

/// The feed serializes coordinates inconsistently, sometimes as numbers and
/// sometimes as numeric strings. Accept both.
fn de_lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(value) => Ok(value),
        NumberOrString::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Trip timestamps look like `2024-03-01 00:04:16` with occasional fractional
/// seconds.
fn de_trip_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .map_err(serde::de::Error::custom)
}

/// Container for all loaded feed data.
#[derive(Debug, Default)]
pub struct StationData {
    pub stations: Vec<Station>,
    pub trips: Vec<Trip>,
    pub bike_lanes: Vec<BikeLaneNetwork>,
}

impl StationData {
    /// Load the station list from a JSON file.
    pub fn load_stations<P: AsRef<Path>>(path: P) -> Result<Vec<Station>, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let feed: StationFeed = serde_json::from_reader(reader)?;

        info!("Loaded {} stations", feed.data.stations.len());
        Ok(feed.data.stations)
    }

    /// Load the trip log from a CSV file.
    pub fn load_trips<P: AsRef<Path>>(path: P) -> Result<Vec<Trip>, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut csv_reader = csv::Reader::from_reader(reader);

        let mut trips = Vec::new();
        for result in csv_reader.deserialize() {
            let trip: Trip = result?;
            trips.push(trip);
        }

        info!("Loaded {} trips", trips.len());
        Ok(trips)
    }

    /// Download the two data files if they don't exist yet.
    pub async fn download_data_files(
        data_dir: &Path,
        stations_url: &str,
        trips_url: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(data_dir)?;

        let files = [(STATIONS_FILE, stations_url), (TRIPS_FILE, trips_url)];

        for (filename, url) in &files {
            let file_path = data_dir.join(filename);

            if file_path.exists() {
                info!("{} already exists, skipping download", filename);
                continue;
            }

            info!("Downloading {} from {}...", filename, url);

            let response = reqwest::get(*url).await?.error_for_status()?;
            let bytes = response.bytes().await?;

            std::fs::write(&file_path, &bytes)?;
            info!("Downloaded {} ({} bytes)", filename, bytes.len());
        }

        Ok(())
    }

    /// Fetch the feeds if needed, then load both into memory.
    pub async fn load_or_download(
        data_dir: PathBuf,
        stations_url: &str,
        trips_url: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::download_data_files(&data_dir, stations_url, trips_url).await?;

        let stations = Self::load_stations(data_dir.join(STATIONS_FILE))?;
        let trips = Self::load_trips(data_dir.join(TRIPS_FILE))?;

        // Overlay feeds are best-effort; a failure there is logged inside
        // and must not take down the station visualization.
        let bike_lanes = bike_lanes::load_or_download(&data_dir).await;

        Ok(Self {
            stations,
            trips,
            bike_lanes,
        })
    }
}
