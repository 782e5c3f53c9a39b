//! Human-readable cache inspection.

use std::collections::BTreeMap;
use std::io::{self, Write};

use super::MeterCache;
use crate::ranges::DateRange;

/// Writes a summary of cache metadata, cached ranges, and per-sensor
/// data-point counts.
pub fn dump<W: Write>(cache: &MeterCache, w: &mut W) -> io::Result<()> {
    writeln!(w, "=== Cache Dump ===")?;
    writeln!(w)?;

    writeln!(w, "Metadata:")?;
    writeln!(w, "  Version:      {}", cache.meta.version)?;
    writeln!(w, "  Site:         {}", cache.meta.site_id)?;
    writeln!(w, "  Created:      {}", cache.meta.created_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(w, "  Last Updated: {}", cache.meta.updated_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(w)?;

    writeln!(w, "Aggregated (ZEV) data:")?;
    writeln!(w, "  Cached Ranges:")?;
    write_ranges(w, &cache.zev.cached_ranges, "    ")?;

    let mut sensor_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for day_data in cache.zev.days.values() {
        for (sensor_id, points) in day_data {
            *sensor_counts.entry(sensor_id).or_default() += points.len();
        }
    }
    writeln!(w, "  Data Points per Sensor:")?;
    if sensor_counts.is_empty() {
        writeln!(w, "    (none)")?;
    }
    for (sensor_id, count) in &sensor_counts {
        writeln!(w, "    {sensor_id}: {count} points")?;
    }

    writeln!(w)?;
    writeln!(w, "Battery data:")?;
    if cache.battery.cached_ranges.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for (sensor_id, ranges) in &cache.battery.cached_ranges {
        writeln!(w, "  Sensor {sensor_id}:")?;
        writeln!(w, "    Cached Ranges:")?;
        write_ranges(w, ranges, "      ")?;
        if let Some(per_day) = cache.battery.days.get(sensor_id) {
            let total: usize = per_day.values().map(Vec::len).sum();
            writeln!(w, "    Total Data Points: {total}")?;
        }
    }

    writeln!(w)?;
    writeln!(w, "=== End Cache Dump ===")
}

fn write_ranges<W: Write>(w: &mut W, ranges: &[DateRange], indent: &str) -> io::Result<()> {
    if ranges.is_empty() {
        writeln!(w, "{indent}(none)")?;
    }
    for r in ranges {
        writeln!(w, "{indent}{} to {} ({} days)", r.start, r.end, r.days())?;
    }
    Ok(())
}
