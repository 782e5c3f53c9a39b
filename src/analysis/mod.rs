//! Interval bucketing, per-source collectors, and the attribution engine.

pub mod collectors;
pub mod engine;
pub mod intervals;
pub mod stats;

use std::collections::BTreeMap;

use crate::source::Sensor;

/// Immutable sensor-id lookup built once per analysis run and passed by
/// reference into the collectors.
#[derive(Debug, Default)]
pub struct SensorLookup {
    sensors: BTreeMap<String, Sensor>,
}

impl SensorLookup {
    pub fn new(catalog: Vec<Sensor>) -> Self {
        let sensors = catalog.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { sensors }
    }

    pub fn get(&self, sensor_id: &str) -> Option<&Sensor> {
        self.sensors.get(sensor_id)
    }

    /// Wiring-polarity flag for a sensor; unknown sensors are not inverted.
    pub fn is_inverted(&self, sensor_id: &str) -> bool {
        self.sensors
            .get(sensor_id)
            .is_some_and(|s| s.data.invert_measurement)
    }

    /// Display name for a sensor, falling back to the raw id.
    pub fn name_of<'a>(&'a self, sensor_id: &'a str) -> &'a str {
        self.sensors
            .get(sensor_id)
            .map(Sensor::display_name)
            .unwrap_or(sensor_id)
    }
}
