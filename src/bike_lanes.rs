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

//! Bike-lane overlay data.
//!
//! Two municipal GeoJSON feeds (Boston's existing bike network and
//! Cambridge's bike facilities) are drawn as colored polylines under the
//! station markers. The documents are parsed minimally: only `LineString`
//! and `MultiLineString` geometries are kept, everything else is ignored.
//! The overlays are decoration, so a missing or broken feed is logged and
//! skipped rather than failing the whole data load.

use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const BOSTON_BIKE_LANES_URL: &str =
    "https://bostonopendata-boston.opendata.arcgis.com/datasets/boston::existing-bike-network-2022.geojson";

pub const CAMBRIDGE_BIKE_LANES_URL: &str =
    "https://raw.githubusercontent.com/cambridgegis/cambridgegis_data/main/Recreation/Bike_Facilities/RECREATION_BikeFacilities.geojson";

const BOSTON_FILE: &str = "boston-bike-lanes.geojson";
const CAMBRIDGE_FILE: &str = "cambridge-bike-lanes.geojson";

/// Overlay colors: green for Boston, orange for Cambridge.
const BOSTON_COLOR: (u8, u8, u8) = (50, 212, 0);
const CAMBRIDGE_COLOR: (u8, u8, u8) = (255, 165, 0);

/// A polyline in (lat, lon) order, ready for projection.
pub type Polyline = Vec<(f64, f64)>;

/// One municipality's bike-lane network.
#[derive(Debug, Clone)]
pub struct BikeLaneNetwork {
    pub name: String,
    pub color: (u8, u8, u8),
    pub polylines: Vec<Polyline>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Unsupported,
}

/// GeoJSON positions are `[lon, lat, ...]`; flip to (lat, lon) and drop
/// degenerate lines.
fn to_polyline(coordinates: &[Vec<f64>]) -> Option<Polyline> {
    let line: Polyline = coordinates
        .iter()
        .filter_map(|position| match position.as_slice() {
            [lon, lat, ..] => Some((*lat, *lon)),
            _ => None,
        })
        .collect();
    (line.len() >= 2).then_some(line)
}

/// Extract every line geometry from a GeoJSON document.
pub fn parse_geojson_lines(text: &str) -> Result<Vec<Polyline>, Box<dyn std::error::Error>> {
    let collection: FeatureCollection = serde_json::from_str(text)?;

    let mut polylines = Vec::new();
    for feature in &collection.features {
        match &feature.geometry {
            Some(Geometry::LineString { coordinates }) => {
                polylines.extend(to_polyline(coordinates));
            }
            Some(Geometry::MultiLineString { coordinates }) => {
                polylines.extend(coordinates.iter().filter_map(|line| to_polyline(line)));
            }
            Some(Geometry::Unsupported) | None => {}
        }
    }

    Ok(polylines)
}

/// Load both overlay networks, downloading any feed not yet on disk.
pub async fn load_or_download(data_dir: &Path) -> Vec<BikeLaneNetwork> {
    let feeds = [
        ("Boston", BOSTON_FILE, BOSTON_BIKE_LANES_URL, BOSTON_COLOR),
        (
            "Cambridge",
            CAMBRIDGE_FILE,
            CAMBRIDGE_BIKE_LANES_URL,
            CAMBRIDGE_COLOR,
        ),
    ];

    let mut networks = Vec::new();
    for (name, filename, url, color) in feeds {
        match load_network(data_dir, name, filename, url, color).await {
            Ok(network) => {
                info!(
                    "Loaded {} bike-lane polylines for {}",
                    network.polylines.len(),
                    name
                );
                networks.push(network);
            }
            Err(e) => warn!("Skipping {} bike lanes: {}", name, e),
        }
    }
    networks
}

async fn load_network(
    data_dir: &Path,
    name: &str,
    filename: &str,
    url: &str,
    color: (u8, u8, u8),
) -> Result<BikeLaneNetwork, Box<dyn std::error::Error>> {
    let path = data_dir.join(filename);

    if !path.exists() {
        info!("Downloading {} from {}...", filename, url);
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        fs::write(&path, &bytes)?;
        info!("Downloaded {} ({} bytes)", filename, bytes.len());
    }

    let text = fs::read_to_string(&path)?;
    Ok(BikeLaneNetwork {
        name: name.to_owned(),
        color,
        polylines: parse_geojson_lines(&text)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_string_flips_to_lat_lon() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[-71.09, 42.36, 5.0], [-71.10, 42.37]]
                    }
                }
            ]
        }"#;

        let polylines = parse_geojson_lines(json).unwrap();
        assert_eq!(polylines.len(), 1);
        assert_eq!(polylines[0], vec![(42.36, -71.09), (42.37, -71.10)]);
    }

    #[test]
    fn test_parse_multi_line_string_and_skips_other_geometries() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "MultiLineString",
                        "coordinates": [
                            [[-71.09, 42.36], [-71.10, 42.37]],
                            [[-71.11, 42.38], [-71.12, 42.39], [-71.13, 42.40]]
                        ]
                    }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-71.09, 42.36] }
                },
                { "type": "Feature", "geometry": null }
            ]
        }"#;

        let polylines = parse_geojson_lines(json).unwrap();
        assert_eq!(polylines.len(), 2);
        assert_eq!(polylines[1].len(), 3);
    }

    #[test]
    fn test_degenerate_lines_are_dropped() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[-71.09, 42.36]] }
                }
            ]
        }"#;

        let polylines = parse_geojson_lines(json).unwrap();
        assert!(polylines.is_empty());
    }

    #[test]
    fn test_empty_collection_parses() {
        let polylines = parse_geojson_lines(r#"{ "type": "FeatureCollection" }"#).unwrap();
        assert!(polylines.is_empty());
    }
}
