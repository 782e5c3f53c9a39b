//! Attribution engine: distributes consumer usage across grid, solar, and
//! battery per interval, split by tariff period.

use chrono::{DateTime, Local, Timelike};
use tracing::{debug, warn};

use super::SensorLookup;
use super::collectors::{collect_battery, collect_consumers, collect_grid, collect_production};
use super::intervals::{Interval, IntervalSet};
use super::stats::{ConsumerAccumulator, EnergyStats, SHARED_CONSUMER_ID};
use crate::config::Config;
use crate::source::{DataSource, SourceError};

/// Negative balances smaller than this are floating-point noise; anything
/// beyond it gets a warning.
const BALANCE_WARN_WH: f64 = -1.0;

/// Daily low-tariff window over interval start hours.
#[derive(Debug, Clone, Copy)]
pub struct TariffWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TariffWindow {
    /// Membership test handling both same-day windows (6–22) and windows
    /// wrapping past midnight (21–6).
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour > self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }
}

/// Full analysis output: one statistics set per tariff class.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub from: DateTime<Local>,
    pub to: DateTime<Local>,
    pub low_tariff: EnergyStats,
    pub high_tariff: EnergyStats,
}

/// One-shot analyzer over a [`DataSource`].
///
/// Owns no persistent state; intervals and the sensor lookup live for a
/// single [`Analyzer::analyze`] call.
pub struct Analyzer<'a, S> {
    source: &'a mut S,
    config: &'a Config,
}

impl<'a, S: DataSource> Analyzer<'a, S> {
    pub fn new(source: &'a mut S, config: &'a Config) -> Self {
        Self { source, config }
    }

    /// Fetches all sensor data for `[from, to)`, buckets it, and produces
    /// per-tariff attribution statistics.
    ///
    /// # Errors
    ///
    /// Returns the first upstream fetch failure; data-quality anomalies
    /// never surface here.
    pub fn analyze(
        &mut self,
        site_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<AnalysisReport, SourceError> {
        let zev = &self.config.zev;

        let catalog = self.source.sensor_catalog(site_id)?;
        let lookup = SensorLookup::new(catalog);

        let mut intervals = IntervalSet::build(from, to);
        debug!(count = intervals.len(), "created analysis intervals");

        let series = self.source.aggregated_readings(site_id, from, to)?;
        collect_grid(&mut intervals, &series, &zev.grid_meter_id);
        collect_production(&mut intervals, &series, &zev.production_ids);
        for battery_id in &zev.battery_ids {
            let readings = self.source.battery_readings(site_id, battery_id, from, to)?;
            collect_battery(&mut intervals, &readings, lookup.is_inverted(battery_id));
        }
        collect_consumers(&mut intervals, &series, &zev.consumer_ids, &lookup);

        let window = TariffWindow {
            start_hour: self.config.low_tariff.start_hour,
            end_hour: self.config.low_tariff.end_hour,
        };
        let efficiency = self.config.inverter_efficiency();

        let low_tariff = accumulate_stats(
            &intervals,
            |iv| window.contains_hour(iv.start.hour()),
            self.config,
            &lookup,
            efficiency,
        );
        let high_tariff = accumulate_stats(
            &intervals,
            |iv| !window.contains_hour(iv.start.hour()),
            self.config,
            &lookup,
            efficiency,
        );

        Ok(AnalysisReport {
            from,
            to,
            low_tariff,
            high_tariff,
        })
    }
}

/// Folds the intervals selected by `tariff` into one statistics set.
fn accumulate_stats(
    intervals: &IntervalSet,
    tariff: impl Fn(&Interval) -> bool,
    config: &Config,
    lookup: &SensorLookup,
    efficiency: f64,
) -> EnergyStats {
    let mut stats = EnergyStats::default();
    let mut consumers = ConsumerAccumulator::with_consumers(
        config
            .zev
            .consumer_ids
            .iter()
            .map(|id| (id.as_str(), lookup.name_of(id))),
    );

    for interval in intervals.iter().filter(|iv| tariff(iv)) {
        stats.grid_import_wh += interval.grid_import_wh;
        stats.grid_export_wh += interval.grid_export_wh;
        stats.production_wh += interval.inverter_net_wh;
        stats.inverter_internal_wh += interval.inverter_internal_wh;
        stats.battery_charge_wh += interval.battery_charge_wh;
        stats.battery_discharge_wh += interval.battery_discharge_wh;

        let consumption: f64 = interval.consumer_usage_wh.values().sum();
        let total_input = interval.grid_import_wh + interval.inverter_net_wh;
        let total_output = consumption + interval.grid_export_wh + interval.inverter_internal_wh;

        let shared = total_input - total_output;
        if shared < BALANCE_WARN_WH {
            warn!(
                start = %interval.start,
                balance = shared,
                input = total_input,
                output = total_output,
                "negative energy balance in interval"
            );
        }

        let shared_usage = if shared > 0.0 { Some(shared) } else { None };
        let usages = interval
            .consumer_usage_wh
            .iter()
            .map(|(id, usage)| (id.as_str(), *usage))
            .chain(shared_usage.map(|wh| (SHARED_CONSUMER_ID, wh)));

        if total_input <= 0.0 {
            // No attributable input energy; usage still counts toward each
            // consumer's total but belongs to no source.
            for (id, usage) in usages {
                if usage > 0.0 {
                    consumers.entry(id).total_wh += usage;
                }
            }
            continue;
        }

        let inverter_net = interval.inverter_net_wh;
        let mut battery_ac = interval.battery_discharge_wh * efficiency;
        let mut solar_contribution = inverter_net - battery_ac;
        if inverter_net >= 0.0 && solar_contribution < 0.0 {
            // Battery claims more than the inverter delivered; the battery
            // share cannot exceed what actually reached the AC side.
            battery_ac = inverter_net;
            solar_contribution = 0.0;
        }

        let solar_share = solar_contribution / total_input;
        let battery_share = battery_ac / total_input;
        let grid_share = interval.grid_import_wh / total_input;

        for (id, usage) in usages {
            if usage <= 0.0 {
                continue;
            }

            // A net-consuming inverter is carried by the shared consumer
            // alone; named consumers fold the negative solar share into
            // their grid share instead.
            let (solar_share, grid_share) = if inverter_net < 0.0 && id != SHARED_CONSUMER_ID {
                (0.0, grid_share + solar_share)
            } else {
                (solar_share, grid_share)
            };

            let entry = consumers.entry(id);
            entry.total_wh += usage;
            entry.sources.from_solar_wh += usage * solar_share;
            entry.sources.from_battery_wh += usage * battery_share;
            entry.sources.from_grid_wh += usage * grid_share;
        }
    }

    stats.consumers = consumers.into_consumers();
    stats
}
