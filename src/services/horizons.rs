// src/services/horizons.rs
use serde::Serialize;

/// One selectable chart horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Horizon {
    pub label: &'static str,
    pub days_back: u32,
    pub minutes_per_bar: u32,
    pub cadence: &'static str,
}

pub static HORIZONS: [Horizon; 6] = [
    Horizon { label: "1 Day", days_back: 1, minutes_per_bar: 5, cadence: "5 min" },
    Horizon { label: "1 Week", days_back: 7, minutes_per_bar: 30, cadence: "30 min" },
    Horizon { label: "1 Month", days_back: 30, minutes_per_bar: 60, cadence: "Hourly" },
    Horizon { label: "3 Months", days_back: 90, minutes_per_bar: 1440, cadence: "Daily" },
    Horizon { label: "1 Year", days_back: 365, minutes_per_bar: 1440, cadence: "Daily" },
    Horizon { label: "5 Years", days_back: 1825, minutes_per_bar: 10080, cadence: "Weekly" },
];

/// Clamp any requested index into the table.
pub fn clamp_index(index: i64) -> usize {
    index.clamp(0, HORIZONS.len() as i64 - 1) as usize
}

pub fn horizon(index: i64) -> (usize, &'static Horizon) {
    let idx = clamp_index(index);
    (idx, &HORIZONS[idx])
}

/// Key of a horizon's bucket in the cached `aggregates` map.
pub fn bucket_key(index: usize) -> String {
    index.to_string()
}
