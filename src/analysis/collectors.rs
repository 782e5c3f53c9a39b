//! Per-source collectors: cumulative counter sequences to per-interval energy.
//!
//! Every collector walks consecutive sample pairs per sensor and adds the
//! derived delta to the bucket containing the newer sample. Implausible
//! deltas are discarded, never clamped, and surface only through debug
//! logging — one bad sample must not abort an analysis.

use tracing::debug;

use super::SensorLookup;
use super::intervals::IntervalSet;
use crate::source::{BatteryReading, SensorSeries};

/// Upper plausibility bound for one 15-minute grid exchange delta.
pub const GRID_MAX_DELTA_WH: f64 = 30_000.0;
/// Upper plausibility bound for one 15-minute inverter counter delta.
pub const PRODUCTION_MAX_DELTA_WH: f64 = 10_000.0;
/// Upper plausibility bound for one 15-minute consumer usage delta.
pub const CONSUMER_MAX_DELTA_WH: f64 = 10_000.0;

/// Accumulates grid import (purchase delta) and export (delivery delta).
///
/// Samples showing a counter-reset signature (previous delivery counter
/// exactly zero while the current one is non-zero) are skipped, as are
/// deltas beyond the grid plausibility bound.
pub fn collect_grid(intervals: &mut IntervalSet, series: &[SensorSeries], grid_meter_id: &str) {
    if grid_meter_id.is_empty() {
        return;
    }

    for s in series.iter().filter(|s| s.sensor_id == grid_meter_id) {
        for pair in s.data.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            let Some(interval) = intervals.containing_mut(current.at) else {
                continue;
            };

            if previous.delivery_wh == 0.0 && current.delivery_wh != 0.0 {
                debug!(at = %current.at, "skipping grid sample after counter reset");
                continue;
            }

            let import = current.purchase_wh - previous.purchase_wh;
            let export = current.delivery_wh - previous.delivery_wh;
            if import > GRID_MAX_DELTA_WH || export > GRID_MAX_DELTA_WH {
                debug!(import, export, "skipping abnormal grid reading");
                continue;
            }

            interval.grid_import_wh += import;
            interval.grid_export_wh += export;
        }
    }
}

/// Accumulates net inverter production via the NET formula.
///
/// Hybrid inverters doing cross-phase balancing register simultaneous
/// import and export that never leaves the device; subtracting the
/// purchase delta from the delivery delta removes that phantom exchange.
/// The purchase delta itself accumulates as inverter internal consumption.
/// Net production may be negative (standby draw at night).
pub fn collect_production(
    intervals: &mut IntervalSet,
    series: &[SensorSeries],
    production_ids: &[String],
) {
    for id in production_ids {
        for s in series.iter().filter(|s| &s.sensor_id == id) {
            for pair in s.data.windows(2) {
                let (previous, current) = (&pair[0], &pair[1]);
                let Some(interval) = intervals.containing_mut(current.at) else {
                    continue;
                };

                let delivery = current.delivery_wh - previous.delivery_wh;
                let purchase = current.purchase_wh - previous.purchase_wh;
                if !(0.0..=PRODUCTION_MAX_DELTA_WH).contains(&delivery)
                    || !(0.0..=PRODUCTION_MAX_DELTA_WH).contains(&purchase)
                {
                    debug!(delivery, purchase, "skipping abnormal production reading");
                    continue;
                }

                interval.inverter_net_wh += delivery - purchase;
                interval.inverter_internal_wh += purchase;
            }
        }
    }
}

/// Accumulates battery charge and discharge energy for one sensor.
///
/// Battery samples carry per-period energy rather than cumulative
/// counters; the first sample of a series is skipped to mirror the
/// pair-wise walk of the counter collectors. `invert` swaps charge and
/// discharge for meters wired with reversed polarity.
pub fn collect_battery(intervals: &mut IntervalSet, readings: &[BatteryReading], invert: bool) {
    for pair in readings.windows(2) {
        let current = &pair[1];
        let Some(interval) = intervals.containing_mut(current.at) else {
            continue;
        };

        let (charge, discharge) = if invert {
            (current.discharge_wh, current.charge_wh)
        } else {
            (current.charge_wh, current.discharge_wh)
        };

        interval.battery_charge_wh += charge;
        interval.battery_discharge_wh += discharge;
    }
}

/// Accumulates per-consumer usage deltas.
///
/// Usage is the purchase-counter delta, or the delivery-counter delta for
/// sensors flagged as inverted. Deltas beyond the consumer bound are
/// discarded as anomalous.
pub fn collect_consumers(
    intervals: &mut IntervalSet,
    series: &[SensorSeries],
    consumer_ids: &[String],
    lookup: &SensorLookup,
) {
    for id in consumer_ids {
        let inverted = lookup.is_inverted(id);

        for s in series.iter().filter(|s| &s.sensor_id == id) {
            for pair in s.data.windows(2) {
                let (previous, current) = (&pair[0], &pair[1]);
                let Some(interval) = intervals.containing_mut(current.at) else {
                    continue;
                };

                let usage = if inverted {
                    current.delivery_wh - previous.delivery_wh
                } else {
                    current.purchase_wh - previous.purchase_wh
                };
                if usage > CONSUMER_MAX_DELTA_WH {
                    debug!(consumer = %id, usage, "skipping abnormal consumer usage");
                    continue;
                }

                *interval.consumer_usage_wh.entry(id.clone()).or_default() += usage;
            }
        }
    }
}
