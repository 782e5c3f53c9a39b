//! Human-readable rendering of an analysis report.

use std::io::{self, Write};

use crate::analysis::engine::AnalysisReport;
use crate::analysis::stats::EnergyStats;

/// Writes the full per-tariff report to `w`.
pub fn write_report<W: Write>(w: &mut W, report: &AnalysisReport) -> io::Result<()> {
    writeln!(
        w,
        "Energy Analysis for period: {} to {}",
        report.from.format("%Y-%m-%d %H:%M"),
        report.to.format("%Y-%m-%d %H:%M")
    )?;

    write_stats(w, "Low Tariff", &report.low_tariff)?;
    write_stats(w, "High Tariff", &report.high_tariff)
}

fn write_stats<W: Write>(w: &mut W, label: &str, stats: &EnergyStats) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "=== {label} ===")?;
    writeln!(w)?;

    writeln!(w, "System Overview:")?;
    writeln!(w, "---------------")?;
    writeln!(w, "Grid Import:       {:>8.1} kWh", kwh(stats.grid_import_wh))?;
    writeln!(w, "Grid Export:       {:>8.1} kWh", kwh(stats.grid_export_wh))?;
    writeln!(w, "Production:        {:>8.1} kWh", kwh(stats.production_wh))?;
    writeln!(w, "Battery Charge:    {:>8.1} kWh", kwh(stats.battery_charge_wh))?;
    writeln!(w, "Battery Discharge: {:>8.1} kWh", kwh(stats.battery_discharge_wh))?;
    writeln!(w, "Self Consumption:  {:>8.1}%", stats.self_consumption_rate())?;
    writeln!(w, "Autarchy:          {:>8.1}%", stats.autarchy_rate())?;

    let consumed: f64 = stats.consumers.iter().map(|c| c.total_wh).sum();
    let total_input = stats.grid_import_wh + stats.production_wh;
    let total_output = consumed + stats.grid_export_wh + stats.inverter_internal_wh;
    writeln!(w)?;
    writeln!(w, "Energy Balance:")?;
    writeln!(w, "--------------")?;
    writeln!(w, "Total Input:       {:>8.1} kWh", kwh(total_input))?;
    writeln!(w, "Total Output:      {:>8.1} kWh", kwh(total_output))?;
    writeln!(w, "Difference:        {:>8.1} kWh", kwh(total_input - total_output))?;

    writeln!(w)?;
    writeln!(w, "Consumer Details:")?;
    writeln!(w, "----------------")?;
    writeln!(
        w,
        "{:<20} {:>12} {:>12} {:>12} {:>12}",
        "Name", "Total", "Solar", "Battery", "Grid"
    )?;
    writeln!(w, "{}", "-".repeat(72))?;
    for consumer in &stats.consumers {
        writeln!(
            w,
            "{:<20} {:>8.1} kWh {:>8.1} kWh {:>8.1} kWh {:>8.1} kWh",
            consumer.name,
            kwh(consumer.total_wh),
            kwh(consumer.sources.from_solar_wh),
            kwh(consumer.sources.from_battery_wh),
            kwh(consumer.sources.from_grid_wh),
        )?;
    }

    Ok(())
}

fn kwh(wh: f64) -> f64 {
    wh / 1000.0
}
