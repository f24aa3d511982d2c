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

//! Trip filtering and per-station traffic aggregation.
//!
//! This is the data core of the app: given the loaded station list and trip
//! log, it selects the trips relevant to a time-of-day window and counts
//! departures and arrivals per station. Everything here is pure; the UI layer
//! calls back into it on every slider change.

use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;

use crate::station_data::{Station, Trip};

/// Half-width of the time window in minutes, inclusive on both ends.
pub const FILTER_WINDOW_MINUTES: i64 = 60;

/// Slider sentinel meaning "no time filter".
pub const NO_FILTER: i64 = -1;

/// Display name used when a station record has no name.
pub const UNKNOWN_STATION_NAME: &str = "Unknown Station";

/// Time-of-day filter selected by the slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// No filtering; every trip counts.
    Any,
    /// Only trips that start or end within an hour of this minute-of-day count.
    Minute(u16),
}

impl TimeFilter {
    /// Convert a raw slider value into a filter. `-1` (and anything outside
    /// `0..=1439`) means no filter.
    pub fn from_slider(value: i64) -> Self {
        if (0..=1439).contains(&value) {
            TimeFilter::Minute(value as u16)
        } else {
            TimeFilter::Any
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, TimeFilter::Any)
    }
}

/// Wall-clock minutes since midnight, ignoring date and seconds.
pub fn minutes_since_midnight(timestamp: NaiveDateTime) -> i64 {
    i64::from(timestamp.hour()) * 60 + i64::from(timestamp.minute())
}

/// Select the trips relevant to a time filter.
///
/// A trip matches when either its start or its end falls within
/// [`FILTER_WINDOW_MINUTES`] of the target minute, inclusive. Distances are
/// literal minute differences: times just before midnight are not considered
/// close to times just after it. That gap matches the upstream data pipeline
/// and is kept as-is.
pub fn filter_trips_by_time(trips: &[Trip], filter: TimeFilter) -> Vec<&Trip> {
    match filter {
        TimeFilter::Any => trips.iter().collect(),
        TimeFilter::Minute(target) => {
            let target = i64::from(target);
            trips
                .iter()
                .filter(|trip| {
                    let started = minutes_since_midnight(trip.started_at);
                    let ended = minutes_since_midnight(trip.ended_at);
                    (started - target).abs() <= FILTER_WINDOW_MINUTES
                        || (ended - target).abs() <= FILTER_WINDOW_MINUTES
                })
                .collect()
        }
    }
}

/// A station annotated with traffic counts derived from the current trip set.
///
/// Counts are a view-dependent annotation, recomputed from scratch on every
/// filter change; they are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StationTraffic {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub departures: u32,
    pub arrivals: u32,
    pub total_traffic: u32,
}

impl StationTraffic {
    /// Fraction of this station's traffic that is outbound, or `None` when
    /// the station saw no traffic at all.
    pub fn departure_ratio(&self) -> Option<f64> {
        if self.total_traffic == 0 {
            None
        } else {
            Some(f64::from(self.departures) / f64::from(self.total_traffic))
        }
    }
}

/// Count departures and arrivals per station over the given trip set.
///
/// Output contains every input station exactly once, in input order. A
/// station with no matching trips gets zero counts; trip station ids that
/// don't appear in the station list are ignored.
pub fn compute_station_traffic(stations: &[Station], trips: &[&Trip]) -> Vec<StationTraffic> {
    let mut departures: HashMap<&str, u32> = HashMap::new();
    let mut arrivals: HashMap<&str, u32> = HashMap::new();

    for trip in trips {
        *departures.entry(trip.start_station_id.as_str()).or_insert(0) += 1;
        *arrivals.entry(trip.end_station_id.as_str()).or_insert(0) += 1;
    }

    stations
        .iter()
        .map(|station| {
            let id = station.short_name.as_str();
            let departures = departures.get(id).copied().unwrap_or(0);
            let arrivals = arrivals.get(id).copied().unwrap_or(0);

            StationTraffic {
                id: station.short_name.clone(),
                name: station
                    .name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_STATION_NAME.to_owned()),
                lat: station.lat,
                lon: station.lon,
                departures,
                arrivals,
                total_traffic: departures + arrivals,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn trip(start: &str, end: &str, started: NaiveDateTime, ended: NaiveDateTime) -> Trip {
        Trip {
            started_at: started,
            ended_at: ended,
            start_station_id: start.to_owned(),
            end_station_id: end.to_owned(),
        }
    }

    fn station(short_name: &str, name: Option<&str>) -> Station {
        Station {
            short_name: short_name.to_owned(),
            name: name.map(str::to_owned),
            lat: 42.36,
            lon: -71.09,
        }
    }

    #[test]
    fn test_no_filter_returns_all_trips_in_order() {
        let trips = vec![
            trip("A", "B", timestamp(8, 0), timestamp(8, 20)),
            trip("B", "C", timestamp(17, 30), timestamp(17, 55)),
            trip("C", "A", timestamp(23, 59), timestamp(0, 10)),
        ];

        let filtered = filter_trips_by_time(&trips, TimeFilter::Any);
        assert_eq!(filtered.len(), 3);
        for (kept, original) in filtered.iter().zip(trips.iter()) {
            assert!(std::ptr::eq(*kept, original));
        }
    }

    #[test]
    fn test_from_slider_sentinel() {
        assert_eq!(TimeFilter::from_slider(NO_FILTER), TimeFilter::Any);
        assert_eq!(TimeFilter::from_slider(0), TimeFilter::Minute(0));
        assert_eq!(TimeFilter::from_slider(1439), TimeFilter::Minute(1439));
        assert_eq!(TimeFilter::from_slider(1440), TimeFilter::Any);
    }

    #[test]
    fn test_window_is_inclusive_at_sixty_minutes() {
        // Target 12:00; trip starting 11:00 is exactly 60 minutes out.
        let on_edge = vec![trip("A", "B", timestamp(11, 0), timestamp(11, 1))];
        let filtered = filter_trips_by_time(&on_edge, TimeFilter::Minute(720));
        assert_eq!(filtered.len(), 1);

        // 61 minutes out on both endpoints is excluded.
        let past_edge = vec![trip("A", "B", timestamp(10, 59), timestamp(10, 59))];
        let filtered = filter_trips_by_time(&past_edge, TimeFilter::Minute(720));
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_trip_matches_on_end_time_alone() {
        // Starts well before the window but ends inside it.
        let trips = vec![trip("A", "B", timestamp(6, 0), timestamp(11, 30))];
        let filtered = filter_trips_by_time(&trips, TimeFilter::Minute(720));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_no_wraparound_at_midnight() {
        // Target 00:05; a 23:50 trip is 1425 minutes away by literal distance.
        let trips = vec![trip("A", "B", timestamp(23, 50), timestamp(23, 55))];
        let filtered = filter_trips_by_time(&trips, TimeFilter::Minute(5));
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_aggregation_counts_and_conservation() {
        let stations = vec![station("A", Some("Alpha")), station("B", Some("Beta"))];
        let trips = vec![
            trip("A", "B", timestamp(8, 0), timestamp(8, 10)),
            trip("A", "A", timestamp(9, 0), timestamp(9, 5)),
        ];
        let refs: Vec<&Trip> = trips.iter().collect();

        let traffic = compute_station_traffic(&stations, &refs);
        assert_eq!(traffic.len(), 2);

        assert_eq!(traffic[0].id, "A");
        assert_eq!(traffic[0].departures, 2);
        assert_eq!(traffic[0].arrivals, 1);
        assert_eq!(traffic[0].total_traffic, 3);

        assert_eq!(traffic[1].id, "B");
        assert_eq!(traffic[1].departures, 0);
        assert_eq!(traffic[1].arrivals, 1);
        assert_eq!(traffic[1].total_traffic, 1);

        for entry in &traffic {
            assert_eq!(entry.total_traffic, entry.departures + entry.arrivals);
        }
    }

    #[test]
    fn test_station_with_no_trips_gets_zero_counts() {
        let stations = vec![station("LONELY", Some("Lonely"))];
        let trips = vec![trip("A", "B", timestamp(8, 0), timestamp(8, 10))];
        let refs: Vec<&Trip> = trips.iter().collect();

        let traffic = compute_station_traffic(&stations, &refs);
        assert_eq!(traffic[0].departures, 0);
        assert_eq!(traffic[0].arrivals, 0);
        assert_eq!(traffic[0].total_traffic, 0);
        assert_eq!(traffic[0].departure_ratio(), None);
    }

    #[test]
    fn test_output_preserves_station_order() {
        let stations = vec![
            station("C", None),
            station("A", None),
            station("B", None),
        ];
        let traffic = compute_station_traffic(&stations, &[]);
        let ids: Vec<&str> = traffic.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_unnamed_station_gets_placeholder_name() {
        let stations = vec![station("X", None)];
        let traffic = compute_station_traffic(&stations, &[]);
        assert_eq!(traffic[0].name, UNKNOWN_STATION_NAME);
    }

    #[test]
    fn test_trips_referencing_unknown_stations_are_dropped() {
        let stations = vec![station("A", Some("Alpha"))];
        let trips = vec![trip("GHOST", "PHANTOM", timestamp(8, 0), timestamp(8, 10))];
        let refs: Vec<&Trip> = trips.iter().collect();

        let traffic = compute_station_traffic(&stations, &refs);
        assert_eq!(traffic.len(), 1);
        assert_eq!(traffic[0].total_traffic, 0);
    }

    #[test]
    fn test_minutes_since_midnight_ignores_seconds() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(13, 45, 59)
            .unwrap();
        assert_eq!(minutes_since_midnight(ts), 13 * 60 + 45);
    }
}
