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

//! Derived visual scales: traffic volume to marker radius, departure ratio
//! to a quantized flow position, and flow position to marker color.

use chrono::NaiveTime;

use crate::traffic::TimeFilter;

/// Marker color at flow position 0.0 (all arrivals) - steel blue.
const ARRIVALS_COLOR: (u8, u8, u8) = (70, 130, 180);

/// Marker color at flow position 1.0 (all departures) - dark orange.
const DEPARTURES_COLOR: (u8, u8, u8) = (255, 140, 0);

/// Radius range selection.
///
/// A filtered view shows far fewer trips per station, so the minimum radius
/// is raised and the maximum widened to keep markers legible. This remap is
/// intentional, not an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Unfiltered,
    Filtered,
}

impl ScaleMode {
    pub fn for_filter(filter: TimeFilter) -> Self {
        if filter.is_active() {
            ScaleMode::Filtered
        } else {
            ScaleMode::Unfiltered
        }
    }

    /// Output radius range in pixels, (min, max).
    pub fn radius_range(self) -> (f32, f32) {
        match self {
            ScaleMode::Unfiltered => (0.0, 25.0),
            ScaleMode::Filtered => (3.0, 50.0),
        }
    }
}

/// Square-root scale from traffic counts to marker radius.
///
/// The sqrt transform makes marker *area* proportional to traffic, which
/// reads much better than a linear radius on a dense map.
#[derive(Debug, Clone, Copy)]
pub struct RadiusScale {
    max_traffic: u32,
    min_radius: f32,
    max_radius: f32,
}

impl RadiusScale {
    /// Build a scale over the domain `[0, max_traffic]`.
    pub fn new(max_traffic: u32, mode: ScaleMode) -> Self {
        let (min_radius, max_radius) = mode.radius_range();
        Self {
            max_traffic,
            min_radius,
            max_radius,
        }
    }

    /// Radius for a traffic count. Returns 0 when the whole domain is empty
    /// so we never divide by zero.
    pub fn radius(&self, traffic: u32) -> f32 {
        if self.max_traffic == 0 {
            return 0.0;
        }
        let t = (traffic as f32 / self.max_traffic as f32).sqrt();
        self.min_radius + (self.max_radius - self.min_radius) * t
    }
}

/// Quantize a departure ratio into three flow positions: 0.0 (mostly
/// arrivals), 0.5 (balanced), 1.0 (mostly departures).
///
/// `None` means the station had no traffic at all; that renders as balanced
/// rather than dividing by zero.
pub fn station_flow(departure_ratio: Option<f64>) -> f64 {
    let Some(ratio) = departure_ratio else {
        return 0.5;
    };
    // Nearest-third buckets over [0, 1]: [0, 1/3) -> 0, [1/3, 2/3) -> 0.5,
    // [2/3, 1] -> 1. Compared against the thresholds directly so a ratio of
    // exactly 2/3 lands in the top bucket.
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio < 1.0 / 3.0 {
        0.0
    } else if ratio < 2.0 / 3.0 {
        0.5
    } else {
        1.0
    }
}

/// Marker color for a quantized flow position, blending from the arrivals
/// color at 0.0 to the departures color at 1.0.
pub fn flow_color(position: f64) -> egui::Color32 {
    let t = position.clamp(0.0, 1.0) as f32;
    let lerp = |a: u8, b: u8| -> u8 { (f32::from(a) + (f32::from(b) - f32::from(a)) * t) as u8 };
    egui::Color32::from_rgb(
        lerp(ARRIVALS_COLOR.0, DEPARTURES_COLOR.0),
        lerp(ARRIVALS_COLOR.1, DEPARTURES_COLOR.1),
        lerp(ARRIVALS_COLOR.2, DEPARTURES_COLOR.2),
    )
}

/// Format minutes-since-midnight as a 12-hour clock label, e.g. "2:05 PM".
pub fn format_time(minutes: i64) -> String {
    let minutes = minutes.rem_euclid(1440) as u32;
    let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
        .unwrap_or(NaiveTime::MIN);
    time.format("%-I:%M %p").to_string()
}
