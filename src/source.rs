//! Sensor catalog types, raw reading types, and the upstream data-source capability.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cost-type tag marking a sub-meter as an ordinary consumer.
pub const COST_TYPE_CONSUMER: u8 = 0;
/// Cost-type tag marking the grid exchange meter.
pub const COST_TYPE_GRID: u8 = 1;
/// Cost-type tag marking a production (inverter) meter.
pub const COST_TYPE_PRODUCTION: u8 = 2;

/// Display metadata attached to a sensor by the meter service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorTag {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Wiring and classification metadata for a sensor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorMeta {
    /// Meter mounted with reversed polarity; purchase and delivery
    /// (or charge and discharge) are swapped before use.
    #[serde(rename = "invertMeasurement", default)]
    pub invert_measurement: bool,
    #[serde(rename = "subMeterCostTypes", default)]
    pub cost_type: u8,
}

/// One entry of the site's sensor catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sensor {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub sensor_type: String,
    #[serde(rename = "device_type", default)]
    pub device_type: String,
    #[serde(rename = "device_group", default)]
    pub device_group: String,
    #[serde(default)]
    pub tag: SensorTag,
    #[serde(default)]
    pub data: SensorMeta,
}

impl Sensor {
    /// Human-readable name, falling back to the raw id when untagged.
    pub fn display_name(&self) -> &str {
        if self.tag.name.is_empty() {
            &self.id
        } else {
            &self.tag.name
        }
    }
}

/// One cumulative-counter sample of an aggregated (ZEV) meter.
///
/// Counters are lifetime totals in Wh; per-interval energy is derived from
/// consecutive-pair differences, never from single samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    #[serde(rename = "createdAt")]
    pub at: DateTime<Local>,
    #[serde(rename = "CurrentEnergyPurchaseTariff1", default)]
    pub purchase_wh: f64,
    #[serde(rename = "CurrentEnergyDeliveryTariff1", default)]
    pub delivery_wh: f64,
}

/// All samples of one aggregated meter over a fetch window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorSeries {
    #[serde(rename = "sensorId")]
    pub sensor_id: String,
    #[serde(default)]
    pub data: Vec<MeterReading>,
}

/// One sample of a battery system sensor: energy moved during the
/// sampling period, not a cumulative counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    #[serde(rename = "date")]
    pub at: DateTime<Local>,
    #[serde(rename = "bcWh", default)]
    pub charge_wh: f64,
    #[serde(rename = "bdWh", default)]
    pub discharge_wh: f64,
}

/// Failure modes of an upstream fetch.
///
/// These propagate to the caller of an analysis unchanged; no retries
/// happen below this boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status} from {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("decoding upstream response from {path}: {message}")]
    Decode { path: String, message: String },
}

/// Capability contract for the meter-data service.
///
/// Implemented by the direct HTTP client and by the caching decorator
/// wrapping it; consumers depend only on this trait. Date windows may be
/// arbitrarily large — implementations subdivide as needed.
pub trait DataSource {
    /// Lists the site's sensors with their classification metadata.
    fn sensor_catalog(&mut self, site_id: &str) -> Result<Vec<Sensor>, SourceError>;

    /// Fetches cumulative-counter samples for all aggregated meters of the
    /// site within `[from, to]`.
    fn aggregated_readings(
        &mut self,
        site_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<SensorSeries>, SourceError>;

    /// Fetches charge/discharge samples for one battery sensor within
    /// `[from, to]`.
    fn battery_readings(
        &mut self,
        site_id: &str,
        sensor_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<BatteryReading>, SourceError>;
}
