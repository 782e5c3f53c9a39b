//! Aggregate analysis output: per-source system totals and per-consumer
//! attribution.

use std::collections::BTreeMap;

/// Identifier of the synthetic consumer capturing energy balance not
/// attributable to any named consumer meter.
pub const SHARED_CONSUMER_ID: &str = "shared";
/// Display name of the synthetic shared consumer.
pub const SHARED_CONSUMER_NAME: &str = "Shared Usage";

/// Energy a consumer drew from each source, in Wh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceBreakdown {
    pub from_solar_wh: f64,
    pub from_battery_wh: f64,
    pub from_grid_wh: f64,
}

/// Attribution result for one consumer over the analysis period.
#[derive(Debug, Clone)]
pub struct ConsumerStats {
    pub id: String,
    pub name: String,
    pub sources: SourceBreakdown,
    /// Total usage; equals the sum of the source shares except for usage
    /// from intervals with no attributable input energy.
    pub total_wh: f64,
}

impl ConsumerStats {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            sources: SourceBreakdown::default(),
            total_wh: 0.0,
        }
    }
}

/// System-level totals and per-consumer attribution for one tariff class.
#[derive(Debug, Clone, Default)]
pub struct EnergyStats {
    pub grid_import_wh: f64,
    pub grid_export_wh: f64,
    /// Net inverter production over the period.
    pub production_wh: f64,
    /// Inverter-side internal consumption over the period.
    pub inverter_internal_wh: f64,
    pub battery_charge_wh: f64,
    pub battery_discharge_wh: f64,
    pub consumers: Vec<ConsumerStats>,
}

impl EnergyStats {
    /// Percentage of produced energy consumed locally instead of exported.
    pub fn self_consumption_rate(&self) -> f64 {
        if self.production_wh <= 0.0 {
            return 0.0;
        }
        let direct = self.production_wh - self.grid_export_wh;
        direct / self.production_wh * 100.0
    }

    /// Percentage of total consumption not sourced from the grid.
    pub fn autarchy_rate(&self) -> f64 {
        let consumption = self.grid_import_wh + self.production_wh - self.grid_export_wh;
        if consumption <= 0.0 {
            return 0.0;
        }
        (consumption - self.grid_import_wh) / consumption * 100.0
    }
}

/// Mutable accumulator used while walking intervals; converts into the
/// final consumer list preserving configured order, shared consumer last.
#[derive(Debug, Default)]
pub(crate) struct ConsumerAccumulator {
    order: Vec<String>,
    entries: BTreeMap<String, ConsumerStats>,
}

impl ConsumerAccumulator {
    pub(crate) fn with_consumers<'a>(ids_and_names: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        let mut acc = Self::default();
        for (id, name) in ids_and_names {
            acc.order.push(id.to_string());
            acc.entries
                .insert(id.to_string(), ConsumerStats::new(id, name));
        }
        acc.order.push(SHARED_CONSUMER_ID.to_string());
        acc.entries.insert(
            SHARED_CONSUMER_ID.to_string(),
            ConsumerStats::new(SHARED_CONSUMER_ID, SHARED_CONSUMER_NAME),
        );
        acc
    }

    pub(crate) fn entry(&mut self, id: &str) -> &mut ConsumerStats {
        self.entries
            .entry(id.to_string())
            .or_insert_with(|| ConsumerStats::new(id, id))
    }

    pub(crate) fn into_consumers(mut self) -> Vec<ConsumerStats> {
        let mut result = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(stats) = self.entries.remove(id) {
                result.push(stats);
            }
        }
        // Anything collected outside the configured set keeps map order.
        result.extend(self.entries.into_values());
        result
    }
}
