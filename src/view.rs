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

//! Derived view assembly.
//!
//! [`recompute`] is the single pipeline the UI calls on every slider change:
//! filter trips, aggregate per-station traffic, then derive a marker style
//! for every station. It is a pure function of (stations, trips, filter,
//! radius domain); the UI owns the slider value and all drawing state.

use crate::scales::{station_flow, RadiusScale, ScaleMode};
use crate::station_data::{Station, Trip};
use crate::traffic::{compute_station_traffic, filter_trips_by_time, StationTraffic, TimeFilter};

/// Visual attributes for one station marker, parallel to
/// [`TrafficView::stations`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    /// Circle radius in pixels.
    pub radius: f32,
    /// Quantized flow position in {0.0, 0.5, 1.0}.
    pub flow: f64,
}

/// Everything the map layer needs to draw the current frame's markers.
#[derive(Debug, Clone, Default)]
pub struct TrafficView {
    pub stations: Vec<StationTraffic>,
    pub markers: Vec<MarkerStyle>,
    /// Radius scale domain: the busiest station's traffic over the full,
    /// unfiltered trip set.
    pub max_traffic: u32,
}

/// Maximum per-station traffic over the full, unfiltered trip set.
///
/// Computed once at load and reused as the radius scale domain for every
/// subsequent filter setting, so a filtered view's markers shrink relative
/// to the unfiltered picture instead of being restretched to fill the
/// range. The filtered mode's raised minimum and widened maximum exist
/// precisely because filtered counts are small fractions of this domain.
pub fn unfiltered_max_traffic(stations: &[Station], trips: &[Trip]) -> u32 {
    let all: Vec<&Trip> = trips.iter().collect();
    compute_station_traffic(stations, &all)
        .iter()
        .map(|station| station.total_traffic)
        .max()
        .unwrap_or(0)
}

/// Run the full filter → aggregate → style pipeline for one filter setting.
///
/// `max_traffic` is the precomputed unfiltered domain from
/// [`unfiltered_max_traffic`]; only the mode-dependent radius range varies
/// per filter, never the domain.
pub fn recompute(
    stations: &[Station],
    trips: &[Trip],
    filter: TimeFilter,
    max_traffic: u32,
) -> TrafficView {
    let filtered = filter_trips_by_time(trips, filter);
    let traffic = compute_station_traffic(stations, &filtered);

    let scale = RadiusScale::new(max_traffic, ScaleMode::for_filter(filter));

    let markers = traffic
        .iter()
        .map(|station| MarkerStyle {
            radius: scale.radius(station.total_traffic),
            flow: station_flow(station.departure_ratio()),
        })
        .collect();

    TrafficView {
        stations: traffic,
        markers,
        max_traffic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn timestamp(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn trip(start: &str, end: &str, hour: u32) -> Trip {
        Trip {
            started_at: timestamp(hour, 0),
            ended_at: timestamp(hour, 20),
            start_station_id: start.to_owned(),
            end_station_id: end.to_owned(),
        }
    }

    fn station(short_name: &str) -> Station {
        Station {
            short_name: short_name.to_owned(),
            name: None,
            lat: 42.36,
            lon: -71.09,
        }
    }

    #[test]
    fn test_end_to_end_unfiltered_view() {
        let stations = vec![station("A"), station("B")];
        let trips = vec![trip("A", "B", 8), trip("A", "A", 9)];

        let max = unfiltered_max_traffic(&stations, &trips);
        assert_eq!(max, 3);

        let view = recompute(&stations, &trips, TimeFilter::Any, max);

        assert_eq!(view.stations.len(), 2);
        assert_eq!(view.markers.len(), 2);
        assert_eq!(view.max_traffic, 3);

        // A: 2 departures, 1 arrival; B: 0 departures, 1 arrival.
        assert_eq!(view.stations[0].total_traffic, 3);
        assert_eq!(view.stations[1].total_traffic, 1);

        // A is at the top of the unfiltered range; flow 2/3 quantizes to 1.0.
        assert_eq!(view.markers[0].radius, 25.0);
        assert_eq!(view.markers[0].flow, 1.0);
        // B is arrivals-only.
        assert_eq!(view.markers[1].flow, 0.0);
        assert!(view.markers[1].radius < view.markers[0].radius);
    }

    #[test]
    fn test_filtered_view_keeps_unfiltered_domain() {
        let stations = vec![station("A")];
        // Nine early-morning round trips plus one at noon: unfiltered A
        // traffic is 20, of which only 2 survive a noon filter.
        let mut trips: Vec<Trip> = (0..9).map(|_| trip("A", "A", 3)).collect();
        trips.push(trip("A", "A", 12));

        let max = unfiltered_max_traffic(&stations, &trips);
        assert_eq!(max, 20);

        let view = recompute(&stations, &trips, TimeFilter::Minute(720), max);
        assert_eq!(view.stations[0].total_traffic, 2);

        // The radius comes from the filtered range over the unfiltered
        // domain: 3 + 47 * sqrt(2/20). The busiest station must not be
        // restretched to the top of the range just because a filter is on.
        let expected = 3.0 + 47.0 * (2.0_f32 / 20.0).sqrt();
        assert!((view.markers[0].radius - expected).abs() < 1e-4);
        assert!(view.markers[0].radius < 50.0);
    }

    #[test]
    fn test_filtered_survivors_use_widened_range() {
        let stations = vec![station("A"), station("B")];
        // Both trips survive an 08:00 filter, so filtered counts equal the
        // unfiltered domain and markers sit at the top of the wider range.
        let trips = vec![trip("A", "B", 8), trip("B", "A", 8)];

        let max = unfiltered_max_traffic(&stations, &trips);
        assert_eq!(max, 2);

        let view = recompute(&stations, &trips, TimeFilter::Minute(480), max);
        assert_eq!(view.markers[0].radius, 50.0);
        assert_eq!(view.markers[1].radius, 50.0);
    }

    #[test]
    fn test_empty_view_has_zero_radii_and_balanced_flow() {
        let stations = vec![station("A")];
        let view = recompute(&stations, &[], TimeFilter::Minute(720), 0);

        assert_eq!(view.max_traffic, 0);
        assert_eq!(view.markers[0].radius, 0.0);
        assert_eq!(view.markers[0].flow, 0.5);
    }

    #[test]
    fn test_latest_recompute_fully_replaces_view() {
        let stations = vec![station("A"), station("B")];
        let trips = vec![trip("A", "B", 8)];
        let max = unfiltered_max_traffic(&stations, &trips);

        let filtered = recompute(&stations, &trips, TimeFilter::Minute(480), max);
        let unfiltered = recompute(&stations, &trips, TimeFilter::Any, max);

        // Same counts either way here, but the scale mode differs.
        assert_eq!(filtered.stations[0].total_traffic, 1);
        assert_eq!(unfiltered.stations[0].total_traffic, 1);
        assert!(filtered.markers[0].radius > unfiltered.markers[0].radius);
    }
}
