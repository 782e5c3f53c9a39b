//! Persistent day-keyed store of raw meter readings with cached-range tracking.
//!
//! The whole cache is one versioned JSON snapshot tagged with the site
//! identity. Day keys are calendar days in local time; the current day is
//! never stored — it is still accumulating and must always be re-fetched.

mod client;
mod dump;

pub use client::{CachedSource, merge_battery_readings, merge_series};
pub use dump::dump;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::ranges::{DateRange, find_gaps, merge_ranges};
use crate::source::{BatteryReading, MeterReading, SensorSeries};

/// Snapshot format version; bump on incompatible layout changes.
pub const CACHE_VERSION: u32 = 1;

/// Cache integrity and persistence failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file i/o: {0}")]
    Io(#[from] io::Error),
    #[error("decoding cache snapshot: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cache belongs to site {found}, expected {expected}")]
    SiteMismatch { found: String, expected: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub version: u32,
    pub site_id: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

/// Aggregated (ZEV) readings keyed day -> sensor id -> samples, plus the
/// merged list of fully-fetched day ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZevStore {
    #[serde(default)]
    pub days: BTreeMap<NaiveDate, BTreeMap<String, Vec<MeterReading>>>,
    #[serde(default)]
    pub cached_ranges: Vec<DateRange>,
}

/// Battery readings keyed sensor id -> day -> samples; ranges are tracked
/// per sensor since battery sensors are fetched independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryStore {
    #[serde(default)]
    pub days: BTreeMap<String, BTreeMap<NaiveDate, Vec<BatteryReading>>>,
    #[serde(default)]
    pub cached_ranges: BTreeMap<String, Vec<DateRange>>,
}

/// The complete persisted cache for one site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterCache {
    pub meta: CacheMeta,
    #[serde(default)]
    pub zev: ZevStore,
    #[serde(default)]
    pub battery: BatteryStore,
}

impl MeterCache {
    /// Creates an empty cache owned by the given site.
    pub fn new(site_id: &str) -> Self {
        let now = Local::now();
        Self {
            meta: CacheMeta {
                version: CACHE_VERSION,
                site_id: site_id.to_string(),
                created_at: now,
                updated_at: now,
            },
            zev: ZevStore::default(),
            battery: BatteryStore::default(),
        }
    }

    /// Loads a cache snapshot from disk.
    ///
    /// A missing file yields an empty cache. When `expected_site` is given,
    /// a snapshot tagged with a different site is a hard error, as is a
    /// corrupt snapshot. Without an expected site (inspection tooling) a
    /// corrupt snapshot degrades to an empty cache with a warning.
    pub fn load(path: &Path, expected_site: Option<&str>) -> Result<Self, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::new(expected_site.unwrap_or_default()));
            }
            Err(e) => return Err(e.into()),
        };

        let cache: MeterCache = match serde_json::from_slice(&bytes) {
            Ok(cache) => cache,
            Err(e) => match expected_site {
                Some(_) => return Err(e.into()),
                None => {
                    warn!(path = %path.display(), error = %e, "unreadable cache snapshot, treating as empty");
                    return Ok(Self::new(""));
                }
            },
        };

        if let Some(expected) = expected_site
            && cache.meta.site_id != expected
        {
            return Err(CacheError::SiteMismatch {
                found: cache.meta.site_id,
                expected: expected.to_string(),
            });
        }

        Ok(cache)
    }

    /// Writes the cache atomically: serialize to `<path>.tmp`, then rename
    /// over the previous snapshot so a crash mid-write never corrupts it.
    pub fn save(&mut self, path: &Path) -> Result<(), CacheError> {
        self.meta.updated_at = Local::now();

        let tmp = tmp_path(path);
        let bytes = serde_json::to_vec(self)?;
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(())
    }

    /// Drops all stored readings and ranges, keeping identity metadata.
    pub fn clear(&mut self) {
        self.zev = ZevStore::default();
        self.battery = BatteryStore::default();
    }

    /// Day ranges within `[from, to]` still missing from the ZEV store.
    pub fn zev_gaps(&self, from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Vec<DateRange> {
        find_gaps(&self.zev.cached_ranges, from, to, today)
    }

    /// Indexes aggregated readings under their day; samples dated today or
    /// later are silently dropped.
    pub fn store_zev(&mut self, series: &[SensorSeries], today: NaiveDate) {
        for s in series {
            for reading in &s.data {
                let day = reading.at.date_naive();
                if day >= today {
                    continue;
                }
                self.zev
                    .days
                    .entry(day)
                    .or_default()
                    .entry(s.sensor_id.clone())
                    .or_default()
                    .push(reading.clone());
            }
        }
    }

    /// Marks `[from, to]` (clipped to exclude today) as fetched for the ZEV
    /// store and re-merges the range list.
    pub fn mark_zev_cached(&mut self, from: NaiveDate, to: NaiveDate, today: NaiveDate) {
        if let Some(range) = clip_to_yesterday(from, to, today) {
            self.zev.cached_ranges.push(range);
            self.zev.cached_ranges = merge_ranges(&self.zev.cached_ranges);
        }
    }

    /// Concatenates stored aggregated readings over `[from, to]`, grouped
    /// per sensor. Days without data contribute nothing.
    pub fn zev_readings(&self, from: NaiveDate, to: NaiveDate) -> Vec<SensorSeries> {
        let mut by_sensor: BTreeMap<String, Vec<MeterReading>> = BTreeMap::new();

        let mut day = from;
        while day <= to {
            if let Some(day_data) = self.zev.days.get(&day) {
                for (sensor_id, readings) in day_data {
                    by_sensor
                        .entry(sensor_id.clone())
                        .or_default()
                        .extend(readings.iter().cloned());
                }
            }
            day += Duration::days(1);
        }

        by_sensor
            .into_iter()
            .map(|(sensor_id, data)| SensorSeries { sensor_id, data })
            .collect()
    }

    /// Day ranges within `[from, to]` still missing for one battery sensor.
    pub fn battery_gaps(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) -> Vec<DateRange> {
        let cached = self
            .battery
            .cached_ranges
            .get(sensor_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        find_gaps(cached, from, to, today)
    }

    /// Indexes battery readings under their day; today is never stored.
    pub fn store_battery(&mut self, sensor_id: &str, readings: &[BatteryReading], today: NaiveDate) {
        let per_day = self.battery.days.entry(sensor_id.to_string()).or_default();
        for reading in readings {
            let day = reading.at.date_naive();
            if day >= today {
                continue;
            }
            per_day.entry(day).or_default().push(reading.clone());
        }
    }

    /// Marks `[from, to]` (clipped to exclude today) as fetched for one
    /// battery sensor.
    pub fn mark_battery_cached(
        &mut self,
        sensor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) {
        if let Some(range) = clip_to_yesterday(from, to, today) {
            let ranges = self
                .battery
                .cached_ranges
                .entry(sensor_id.to_string())
                .or_default();
            ranges.push(range);
            *ranges = merge_ranges(ranges);
        }
    }

    /// Concatenates stored battery readings for one sensor over `[from, to]`.
    pub fn battery_readings(
        &self,
        sensor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<BatteryReading> {
        let Some(per_day) = self.battery.days.get(sensor_id) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut day = from;
        while day <= to {
            if let Some(readings) = per_day.get(&day) {
                result.extend(readings.iter().cloned());
            }
            day += Duration::days(1);
        }
        result
    }
}

/// Normalizes `[from, to]` against the never-cache-today policy; `None`
/// when nothing before today remains.
fn clip_to_yesterday(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Option<DateRange> {
    let to = if to >= today { today - Duration::days(1) } else { to };
    (from <= to).then(|| DateRange::new(from, to))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Removes the cache file; a missing file is not an error.
pub fn delete(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Derives the cache path from the config path: `config.toml` -> `config.data-cache`.
pub fn cache_file_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("data-cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::day_start;
    use chrono::Duration;

    fn d(s: &str) -> NaiveDate {
        s.parse().expect("test date should parse")
    }

    fn meter_reading(day: NaiveDate, purchase_wh: f64) -> MeterReading {
        MeterReading {
            at: day_start(day) + Duration::hours(12),
            purchase_wh,
            delivery_wh: 0.0,
        }
    }

    fn series(sensor_id: &str, readings: Vec<MeterReading>) -> SensorSeries {
        SensorSeries {
            sensor_id: sensor_id.to_string(),
            data: readings,
        }
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let today = d("2025-03-10");
        let mut cache = MeterCache::new("site-1");

        let readings = vec![
            meter_reading(d("2025-03-01"), 100.0),
            meter_reading(d("2025-03-02"), 200.0),
        ];
        cache.store_zev(&[series("m1", readings.clone())], today);

        let out = cache.zev_readings(d("2025-03-01"), d("2025-03-02"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sensor_id, "m1");
        assert_eq!(out[0].data, readings);
    }

    #[test]
    fn store_drops_today_and_future() {
        let today = d("2025-03-10");
        let mut cache = MeterCache::new("site-1");

        cache.store_zev(
            &[series(
                "m1",
                vec![
                    meter_reading(d("2025-03-09"), 1.0),
                    meter_reading(today, 2.0),
                    meter_reading(d("2025-03-11"), 3.0),
                ],
            )],
            today,
        );

        let out = cache.zev_readings(d("2025-03-01"), d("2025-03-31"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data.len(), 1);
        assert_eq!(out[0].data[0].at.date_naive(), d("2025-03-09"));
    }

    #[test]
    fn mark_cached_never_includes_today() {
        let today = d("2025-03-10");
        let mut cache = MeterCache::new("site-1");

        cache.mark_zev_cached(d("2025-03-05"), d("2025-03-20"), today);
        assert_eq!(
            cache.zev.cached_ranges,
            vec![DateRange::new(d("2025-03-05"), d("2025-03-09"))]
        );

        // A window entirely today-or-later marks nothing.
        cache.mark_zev_cached(today, d("2025-03-20"), today);
        assert_eq!(cache.zev.cached_ranges.len(), 1);
    }

    #[test]
    fn mark_cached_merges_with_existing_ranges() {
        let today = d("2025-06-01");
        let mut cache = MeterCache::new("site-1");

        cache.mark_zev_cached(d("2025-03-01"), d("2025-03-05"), today);
        cache.mark_zev_cached(d("2025-03-06"), d("2025-03-10"), today);
        assert_eq!(
            cache.zev.cached_ranges,
            vec![DateRange::new(d("2025-03-01"), d("2025-03-10"))]
        );
    }

    #[test]
    fn battery_ranges_are_tracked_per_sensor() {
        let today = d("2025-06-01");
        let mut cache = MeterCache::new("site-1");

        cache.mark_battery_cached("b1", d("2025-03-01"), d("2025-03-05"), today);
        assert_eq!(cache.battery_gaps("b1", d("2025-03-01"), d("2025-03-05"), today), vec![]);
        assert_eq!(
            cache.battery_gaps("b2", d("2025-03-01"), d("2025-03-05"), today),
            vec![DateRange::new(d("2025-03-01"), d("2025-03-05"))]
        );
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site.data-cache");

        let today = d("2025-03-10");
        let mut cache = MeterCache::new("site-1");
        cache.store_zev(&[series("m1", vec![meter_reading(d("2025-03-02"), 5.0)])], today);
        cache.mark_zev_cached(d("2025-03-02"), d("2025-03-02"), today);
        cache.store_battery(
            "b1",
            &[BatteryReading {
                at: day_start(d("2025-03-02")),
                charge_wh: 10.0,
                discharge_wh: 0.0,
            }],
            today,
        );
        cache.save(&path).expect("save should succeed");

        let loaded = MeterCache::load(&path, Some("site-1")).expect("load should succeed");
        assert_eq!(loaded.meta.version, CACHE_VERSION);
        assert_eq!(loaded.zev.cached_ranges, cache.zev.cached_ranges);
        assert_eq!(
            loaded.zev_readings(d("2025-03-02"), d("2025-03-02"))[0].data,
            cache.zev_readings(d("2025-03-02"), d("2025-03-02"))[0].data
        );
        assert_eq!(loaded.battery_readings("b1", d("2025-03-01"), d("2025-03-05")).len(), 1);
    }

    #[test]
    fn load_missing_file_yields_empty_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = MeterCache::load(&dir.path().join("absent"), Some("site-1"))
            .expect("missing file should not error");
        assert_eq!(cache.meta.site_id, "site-1");
        assert!(cache.zev.days.is_empty());
    }

    #[test]
    fn load_rejects_site_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site.data-cache");
        MeterCache::new("site-1").save(&path).expect("save");

        let err = MeterCache::load(&path, Some("other-site"));
        assert!(matches!(err, Err(CacheError::SiteMismatch { .. })));

        // Inspection loads skip the identity check.
        assert!(MeterCache::load(&path, None).is_ok());
    }

    #[test]
    fn load_defaults_missing_optional_maps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("old.data-cache");

        // A snapshot from before the battery store existed.
        let old = r#"{"meta":{"version":1,"site_id":"site-1",
            "created_at":"2025-03-01T00:00:00+00:00",
            "updated_at":"2025-03-01T00:00:00+00:00"}}"#;
        fs::write(&path, old).expect("write");

        let cache = MeterCache::load(&path, Some("site-1")).expect("load should default maps");
        assert!(cache.zev.days.is_empty());
        assert!(cache.battery.cached_ranges.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_fatal_only_when_identity_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.data-cache");
        fs::write(&path, b"not json").expect("write");

        assert!(MeterCache::load(&path, Some("site-1")).is_err());
        assert!(MeterCache::load(&path, None).is_ok());
    }

    #[test]
    fn clear_keeps_identity() {
        let mut cache = MeterCache::new("site-1");
        cache.mark_zev_cached(d("2025-03-01"), d("2025-03-02"), d("2025-06-01"));
        cache.clear();
        assert_eq!(cache.meta.site_id, "site-1");
        assert!(cache.zev.cached_ranges.is_empty());
    }

    #[test]
    fn cache_path_derived_from_config_path() {
        assert_eq!(
            cache_file_path(Path::new("/etc/zev/config.toml")),
            PathBuf::from("/etc/zev/config.data-cache")
        );
    }
}
