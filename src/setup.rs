//! Sensor-role discovery: turns a fetched catalog into a suggested `[zev]`
//! configuration section.

use std::fmt;

use crate::source::{COST_TYPE_CONSUMER, COST_TYPE_GRID, COST_TYPE_PRODUCTION, Sensor};

/// A classified sensor with its display name for annotation.
#[derive(Debug, Clone)]
pub struct SuggestedSensor {
    pub id: String,
    pub name: String,
}

impl SuggestedSensor {
    fn from_sensor(sensor: &Sensor) -> Self {
        Self {
            id: sensor.id.clone(),
            name: sensor.display_name().to_string(),
        }
    }

    fn annotated(&self) -> String {
        format!("{}  # {}", self.id, self.name)
    }
}

/// Sensor roles derived from catalog classification tags.
#[derive(Debug, Clone, Default)]
pub struct SetupSuggestion {
    pub grid_meter: Option<SuggestedSensor>,
    pub production: Vec<SuggestedSensor>,
    pub batteries: Vec<SuggestedSensor>,
    pub consumers: Vec<SuggestedSensor>,
}

/// Classifies the catalog by cost-type tag: 1 = grid exchange, 2 =
/// production, 0 = consumer; battery systems are matched by device kind.
pub fn suggest_config(catalog: &[Sensor]) -> SetupSuggestion {
    let mut suggestion = SetupSuggestion::default();

    for sensor in catalog {
        let is_sub_meter = sensor.sensor_type == "Smart Meter" && sensor.device_type == "sub-meter";

        if is_sub_meter && sensor.data.cost_type == COST_TYPE_GRID {
            if suggestion.grid_meter.is_none() {
                suggestion.grid_meter = Some(SuggestedSensor::from_sensor(sensor));
            }
        } else if is_sub_meter && sensor.data.cost_type == COST_TYPE_PRODUCTION {
            suggestion.production.push(SuggestedSensor::from_sensor(sensor));
        } else if is_sub_meter && sensor.data.cost_type == COST_TYPE_CONSUMER {
            suggestion.consumers.push(SuggestedSensor::from_sensor(sensor));
        } else if sensor.sensor_type == "Battery" && sensor.device_type == "device" {
            suggestion.batteries.push(SuggestedSensor::from_sensor(sensor));
        }
    }

    suggestion
}

impl fmt::Display for SetupSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.grid_meter.is_none() {
            writeln!(f, "warning: no grid meter identified")?;
        }
        if self.production.is_empty() {
            writeln!(f, "warning: no production meters identified")?;
        }
        if self.batteries.is_empty() {
            writeln!(f, "warning: no battery system identified")?;
        }
        if self.consumers.is_empty() {
            writeln!(f, "warning: no consumer meters identified")?;
        }

        writeln!(f, "Suggested [zev] config section:")?;
        writeln!(f, "[zev]")?;
        match &self.grid_meter {
            Some(s) => writeln!(f, "grid_meter_id = \"{}\"", s.annotated())?,
            None => writeln!(f, "grid_meter_id = \"\"")?,
        }
        write_id_list(f, "production_ids", &self.production)?;
        write_id_list(f, "battery_ids", &self.batteries)?;
        write_id_list(f, "consumer_ids", &self.consumers)
    }
}

fn write_id_list(
    f: &mut fmt::Formatter<'_>,
    key: &str,
    sensors: &[SuggestedSensor],
) -> fmt::Result {
    writeln!(f, "{key} = [")?;
    for s in sensors {
        writeln!(f, "    \"{}\",", s.annotated())?;
    }
    writeln!(f, "]")
}
