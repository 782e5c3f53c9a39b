//! Cache-backed decorator over a [`DataSource`].
//!
//! Historical days are served from the on-disk cache; only missing day
//! ranges and the always-fresh "today" slice hit the upstream source.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Local};
use tracing::{debug, warn};

use super::{CacheError, MeterCache, dump};
use crate::ranges::{day_end, day_start};
use crate::source::{BatteryReading, DataSource, MeterReading, Sensor, SensorSeries, SourceError};

/// Caching wrapper implementing the same capability as the inner source.
pub struct CachedSource<S> {
    inner: S,
    cache: MeterCache,
    path: PathBuf,
    enabled: bool,
}

impl<S: DataSource> CachedSource<S> {
    /// Wraps `inner`, loading the snapshot at `path` when caching is
    /// enabled. A snapshot tagged with a different site is a hard error.
    pub fn new(
        inner: S,
        path: impl Into<PathBuf>,
        site_id: &str,
        enabled: bool,
    ) -> Result<Self, CacheError> {
        let path = path.into();
        let cache = if enabled {
            MeterCache::load(&path, Some(site_id))?
        } else {
            MeterCache::new(site_id)
        };

        Ok(Self {
            inner,
            cache,
            path,
            enabled,
        })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops all cached data and persists the empty snapshot.
    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        self.cache.clear();
        self.cache.save(&self.path)
    }

    /// Writes a human-readable summary of the cache contents.
    pub fn dump_cache<W: Write>(&self, w: &mut W) -> io::Result<()> {
        dump(&self.cache, w)
    }

    /// Batched save after a fetch round; persistence failures must not
    /// block analysis, so they only log.
    fn persist(&mut self) {
        if let Err(e) = self.cache.save(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to persist cache");
        }
    }
}

impl<S: DataSource> DataSource for CachedSource<S> {
    /// The catalog is small and changes out-of-band; it is never cached.
    fn sensor_catalog(&mut self, site_id: &str) -> Result<Vec<Sensor>, SourceError> {
        self.inner.sensor_catalog(site_id)
    }

    fn aggregated_readings(
        &mut self,
        site_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<SensorSeries>, SourceError> {
        if !self.enabled {
            return self.inner.aggregated_readings(site_id, from, to);
        }

        let today = Local::now().date_naive();
        let from_day = from.date_naive();
        let to_day = to.date_naive();
        let mut all: Vec<SensorSeries> = Vec::new();
        let mut modified = false;

        for gap in self.cache.zev_gaps(from_day, to_day, today) {
            debug!(start = %gap.start, end = %gap.end, "fetching aggregated readings gap");
            let fetched =
                self.inner
                    .aggregated_readings(site_id, day_start(gap.start), day_end(gap.end))?;
            self.cache.store_zev(&fetched, today);
            self.cache.mark_zev_cached(gap.start, gap.end, today);
            modified = true;
        }

        let includes_today = to_day >= today;
        if includes_today {
            debug!("fetching today's aggregated readings fresh");
            let fresh =
                self.inner
                    .aggregated_readings(site_id, day_start(today), day_end(today))?;
            all.extend(fresh);
        }

        let historical_end = if includes_today {
            today - Duration::days(1)
        } else {
            to_day
        };
        if historical_end >= from_day {
            all.extend(self.cache.zev_readings(from_day, historical_end));
        }

        if modified {
            self.persist();
        }

        Ok(merge_series(all))
    }

    fn battery_readings(
        &mut self,
        site_id: &str,
        sensor_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<BatteryReading>, SourceError> {
        if !self.enabled {
            return self.inner.battery_readings(site_id, sensor_id, from, to);
        }

        let today = Local::now().date_naive();
        let from_day = from.date_naive();
        let to_day = to.date_naive();
        let mut all: Vec<BatteryReading> = Vec::new();
        let mut modified = false;

        for gap in self.cache.battery_gaps(sensor_id, from_day, to_day, today) {
            debug!(sensor = sensor_id, start = %gap.start, end = %gap.end, "fetching battery readings gap");
            let fetched = self.inner.battery_readings(
                site_id,
                sensor_id,
                day_start(gap.start),
                day_end(gap.end),
            )?;
            self.cache.store_battery(sensor_id, &fetched, today);
            self.cache.mark_battery_cached(sensor_id, gap.start, gap.end, today);
            modified = true;
        }

        let includes_today = to_day >= today;
        if includes_today {
            debug!(sensor = sensor_id, "fetching today's battery readings fresh");
            let fresh = self.inner.battery_readings(
                site_id,
                sensor_id,
                day_start(today),
                day_end(today),
            )?;
            all.extend(fresh);
        }

        let historical_end = if includes_today {
            today - Duration::days(1)
        } else {
            to_day
        };
        if historical_end >= from_day {
            all.extend(self.cache.battery_readings(sensor_id, from_day, historical_end));
        }

        if modified {
            self.persist();
        }

        Ok(merge_battery_readings(all))
    }
}

/// Combines series from cache and fresh fetches: grouped per sensor,
/// de-duplicated by exact timestamp, sorted ascending. Cache and fresh
/// fetch may supply overlapping boundary samples.
pub fn merge_series(series: Vec<SensorSeries>) -> Vec<SensorSeries> {
    let mut by_sensor: BTreeMap<String, Vec<MeterReading>> = BTreeMap::new();

    for s in series {
        by_sensor.entry(s.sensor_id).or_default().extend(s.data);
    }

    by_sensor
        .into_iter()
        .map(|(sensor_id, mut data)| {
            data.sort_by_key(|r| r.at);
            data.dedup_by_key(|r| r.at);
            SensorSeries { sensor_id, data }
        })
        .collect()
}

/// De-duplicates battery readings by exact timestamp and sorts ascending.
pub fn merge_battery_readings(mut readings: Vec<BatteryReading>) -> Vec<BatteryReading> {
    readings.sort_by_key(|r| r.at);
    readings.dedup_by_key(|r| r.at);
    readings
}
