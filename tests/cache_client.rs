//! Integration tests for the cache-backed data source.

mod common;

use chrono::{Duration, Local};

use common::{MockSource, at, battery_reading, meter_reading, yesterday};
use zevsplit::cache::CachedSource;
use zevsplit::source::{DataSource, SensorSeries};

const SITE: &str = "site-1";

fn historical_mock() -> MockSource {
    let y = yesterday();
    let mut mock = MockSource::new();
    mock.series = vec![SensorSeries {
        sensor_id: "m1".to_string(),
        data: vec![
            meter_reading(at(y - Duration::days(2), 12, 0), 100.0, 0.0),
            meter_reading(at(y - Duration::days(1), 12, 0), 200.0, 0.0),
            meter_reading(at(y, 12, 0), 300.0, 0.0),
        ],
    }];
    mock
}

#[test]
fn historical_window_fetched_once_then_served_from_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let y = yesterday();
    let from = at(y - Duration::days(2), 0, 0);
    let to = at(y, 23, 45);

    let mut source =
        CachedSource::new(historical_mock(), &path, SITE, true).expect("cache should load");

    let first = source
        .aggregated_readings(SITE, from, to)
        .expect("first fetch should succeed");
    assert_eq!(source.inner().aggregated_calls.len(), 1);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].data.len(), 3);

    let second = source
        .aggregated_readings(SITE, from, to)
        .expect("second fetch should succeed");
    assert_eq!(
        source.inner().aggregated_calls.len(),
        1,
        "fully cached window must not hit the upstream again"
    );
    assert_eq!(second[0].data, first[0].data);
}

#[test]
fn window_including_today_always_refetches_today() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let today = Local::now().date_naive();
    let y = yesterday();

    let mut mock = MockSource::new();
    mock.series = vec![SensorSeries {
        sensor_id: "m1".to_string(),
        data: vec![
            meter_reading(at(y, 12, 0), 100.0, 0.0),
            meter_reading(at(today, 0, 30), 200.0, 0.0),
        ],
    }];

    let mut source = CachedSource::new(mock, &path, SITE, true).expect("cache should load");
    let from = at(y, 0, 0);
    let to = at(today, 23, 45);

    let first = source
        .aggregated_readings(SITE, from, to)
        .expect("first fetch should succeed");
    // One gap fetch for yesterday plus the fresh today slice.
    assert_eq!(source.inner().aggregated_calls.len(), 2);
    assert_eq!(first[0].data.len(), 2);

    let second = source
        .aggregated_readings(SITE, from, to)
        .expect("second fetch should succeed");
    // Only today is refetched; the historical day stays cached.
    assert_eq!(source.inner().aggregated_calls.len(), 3);
    let today_fetches = source
        .inner()
        .aggregated_calls
        .iter()
        .filter(|(f, _)| f.date_naive() == today)
        .count();
    assert_eq!(today_fetches, 2);
    assert_eq!(second[0].data.len(), 2);
}

#[test]
fn cache_persists_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let y = yesterday();
    let from = at(y, 0, 0);
    let to = at(y, 23, 45);

    {
        let mut source =
            CachedSource::new(historical_mock(), &path, SITE, true).expect("cache should load");
        source
            .aggregated_readings(SITE, from, to)
            .expect("warm-up fetch should succeed");
    }

    // Fresh instance over an empty upstream: data must come from disk.
    let mut source =
        CachedSource::new(MockSource::new(), &path, SITE, true).expect("cache should load");
    let result = source
        .aggregated_readings(SITE, from, to)
        .expect("cached fetch should succeed");

    assert!(source.inner().aggregated_calls.is_empty());
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].data.len(), 1);
    assert_eq!(result[0].data[0].purchase_wh, 300.0);
}

#[test]
fn battery_ranges_are_tracked_per_sensor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let y = yesterday();
    let from = at(y, 0, 0);
    let to = at(y, 23, 45);

    let mut mock = MockSource::new();
    mock.battery.insert(
        "b1".to_string(),
        vec![battery_reading(at(y, 12, 0), 50.0, 0.0)],
    );
    mock.battery.insert(
        "b2".to_string(),
        vec![battery_reading(at(y, 12, 0), 0.0, 70.0)],
    );

    let mut source = CachedSource::new(mock, &path, SITE, true).expect("cache should load");

    source.battery_readings(SITE, "b1", from, to).expect("b1 fetch");
    assert_eq!(source.inner().battery_calls.len(), 1);

    // A different sensor has its own ranges and must fetch.
    source.battery_readings(SITE, "b2", from, to).expect("b2 fetch");
    assert_eq!(source.inner().battery_calls.len(), 2);

    // b1 is cached now.
    let again = source.battery_readings(SITE, "b1", from, to).expect("b1 cached fetch");
    assert_eq!(source.inner().battery_calls.len(), 2);
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].charge_wh, 50.0);
}

#[test]
fn save_failure_is_non_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing-subdir").join("readings.data-cache");
    let y = yesterday();

    let mut source =
        CachedSource::new(historical_mock(), &path, SITE, true).expect("cache should load");
    let result = source
        .aggregated_readings(SITE, at(y, 0, 0), at(y, 23, 45))
        .expect("fetch must survive a failed cache save");

    assert_eq!(result.len(), 1);
    assert!(!path.exists());
}

#[test]
fn disabled_cache_passes_everything_through() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let y = yesterday();
    let from = at(y, 0, 0);
    let to = at(y, 23, 45);

    let mut source =
        CachedSource::new(historical_mock(), &path, SITE, false).expect("construction");

    source.aggregated_readings(SITE, from, to).expect("first fetch");
    source.aggregated_readings(SITE, from, to).expect("second fetch");

    assert_eq!(source.inner().aggregated_calls.len(), 2);
    assert!(!path.exists());
}

#[test]
fn sensor_catalog_bypasses_the_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");

    let mut source =
        CachedSource::new(MockSource::new(), &path, SITE, true).expect("cache should load");
    source.sensor_catalog(SITE).expect("catalog fetch");
    source.sensor_catalog(SITE).expect("catalog fetch");

    assert_eq!(source.inner().catalog_calls, 2);
}

#[test]
fn duplicate_samples_are_merged_by_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("readings.data-cache");
    let y = yesterday();

    // The upstream reports the same sample through two series entries.
    let mut mock = MockSource::new();
    let duplicated = meter_reading(at(y, 12, 0), 100.0, 0.0);
    mock.series = vec![
        SensorSeries {
            sensor_id: "m1".to_string(),
            data: vec![duplicated.clone()],
        },
        SensorSeries {
            sensor_id: "m1".to_string(),
            data: vec![duplicated, meter_reading(at(y, 12, 15), 110.0, 0.0)],
        },
    ];

    let mut source = CachedSource::new(mock, &path, SITE, true).expect("cache should load");
    let result = source
        .aggregated_readings(SITE, at(y, 0, 0), at(y, 23, 45))
        .expect("fetch should succeed");

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].data.len(), 2);
    assert!(result[0].data[0].at < result[0].data[1].at);
}
