//! CSV export of per-consumer attribution results.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::analysis::engine::AnalysisReport;
use crate::analysis::stats::EnergyStats;

/// Schema v1 column header for the attribution CSV export.
const HEADER: &str = "tariff,consumer_id,consumer,total_kwh,\
                      from_solar_kwh,from_battery_kwh,from_grid_kwh";

/// Exports the attribution report to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(report: &AnalysisReport, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(report, buf)
}

/// Writes the attribution report as CSV to any writer.
///
/// One row per consumer per tariff class; deterministic output for
/// identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(report: &AnalysisReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    write_rows(&mut wtr, "low", &report.low_tariff)?;
    write_rows(&mut wtr, "high", &report.high_tariff)?;

    wtr.flush()?;
    Ok(())
}

fn write_rows<W: Write>(
    wtr: &mut csv::Writer<W>,
    tariff: &str,
    stats: &EnergyStats,
) -> io::Result<()> {
    for consumer in &stats.consumers {
        wtr.write_record(&[
            tariff.to_string(),
            consumer.id.clone(),
            consumer.name.clone(),
            format!("{:.4}", consumer.total_wh / 1000.0),
            format!("{:.4}", consumer.sources.from_solar_wh / 1000.0),
            format!("{:.4}", consumer.sources.from_battery_wh / 1000.0),
            format!("{:.4}", consumer.sources.from_grid_wh / 1000.0),
        ])?;
    }
    Ok(())
}
