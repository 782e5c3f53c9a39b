//! Shared test fixtures: an in-memory data source with call recording.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};

use zevsplit::source::{
    BatteryReading, DataSource, MeterReading, Sensor, SensorMeta, SensorSeries, SourceError,
};

/// In-memory [`DataSource`] serving a fixed dataset, recording every fetch
/// so tests can assert what actually hit the upstream.
#[derive(Default)]
pub struct MockSource {
    pub catalog: Vec<Sensor>,
    pub series: Vec<SensorSeries>,
    pub battery: BTreeMap<String, Vec<BatteryReading>>,
    /// When set, every aggregated fetch fails with an upstream status error.
    pub fail_aggregated: bool,
    pub catalog_calls: usize,
    pub aggregated_calls: Vec<(DateTime<Local>, DateTime<Local>)>,
    pub battery_calls: Vec<(String, DateTime<Local>, DateTime<Local>)>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataSource for MockSource {
    fn sensor_catalog(&mut self, _site_id: &str) -> Result<Vec<Sensor>, SourceError> {
        self.catalog_calls += 1;
        Ok(self.catalog.clone())
    }

    fn aggregated_readings(
        &mut self,
        _site_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<SensorSeries>, SourceError> {
        self.aggregated_calls.push((from, to));
        if self.fail_aggregated {
            return Err(SourceError::Status {
                status: 503,
                path: "/v1/data/zev".to_string(),
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(self
            .series
            .iter()
            .map(|s| SensorSeries {
                sensor_id: s.sensor_id.clone(),
                data: s
                    .data
                    .iter()
                    .filter(|r| r.at >= from && r.at <= to)
                    .cloned()
                    .collect(),
            })
            .filter(|s| !s.data.is_empty())
            .collect())
    }

    fn battery_readings(
        &mut self,
        _site_id: &str,
        sensor_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<BatteryReading>, SourceError> {
        self.battery_calls
            .push((sensor_id.to_string(), from, to));
        Ok(self
            .battery
            .get(sensor_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.at >= from && r.at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// A catalog sensor with the given classification and polarity.
pub fn sensor(id: &str, sensor_type: &str, device_type: &str, cost_type: u8, invert: bool) -> Sensor {
    Sensor {
        id: id.to_string(),
        sensor_type: sensor_type.to_string(),
        device_type: device_type.to_string(),
        data: SensorMeta {
            invert_measurement: invert,
            cost_type,
        },
        ..Sensor::default()
    }
}

/// A cumulative-counter sample at the given instant.
pub fn meter_reading(at: DateTime<Local>, purchase_wh: f64, delivery_wh: f64) -> MeterReading {
    MeterReading {
        at,
        purchase_wh,
        delivery_wh,
    }
}

/// A battery sample at the given instant.
pub fn battery_reading(at: DateTime<Local>, charge_wh: f64, discharge_wh: f64) -> BatteryReading {
    BatteryReading {
        at,
        charge_wh,
        discharge_wh,
    }
}

/// Local timestamp on a given day.
pub fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(day.year(), day.month(), day.day(), hour, minute, 0)
        .single()
        .expect("valid local time")
}

/// Yesterday's date; analysis windows ending here never touch the
/// never-cache-today path.
pub fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}
