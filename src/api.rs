//! Blocking HTTP implementation of the [`DataSource`] capability.

use chrono::{DateTime, Duration, Local, SecondsFormat, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ApiConfig;
use crate::source::{BatteryReading, DataSource, Sensor, SensorSeries, SourceError};

/// Maximum days per upstream request; larger windows are subdivided.
const CHUNK_DAYS: i64 = 30;

/// Direct client for the meter-data service.
pub struct HttpSource {
    http: reqwest::blocking::Client,
    base_url: String,
    username: String,
    password: String,
    chunk_days: i64,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    #[serde(rename = "sm_id")]
    site_id: String,
}

impl HttpSource {
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            username: api.username.clone(),
            password: api.password.clone(),
            chunk_days: CHUNK_DAYS,
        }
    }

    /// Resolves the installation (site) id from the service's user listing.
    ///
    /// # Errors
    ///
    /// Fails on transport/status errors or when no user is registered.
    pub fn discover_site(&self) -> Result<String, SourceError> {
        let users: Vec<UserEntry> = self.get_json("/v1/users")?;
        users
            .into_iter()
            .next()
            .map(|u| u.site_id)
            .ok_or_else(|| SourceError::Decode {
                path: "/v1/users".to_string(),
                message: "no users registered for these credentials".to_string(),
            })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        debug!(path, "fetching");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

impl DataSource for HttpSource {
    fn sensor_catalog(&mut self, site_id: &str) -> Result<Vec<Sensor>, SourceError> {
        self.get_json(&format!("/v1/info/sensors/{site_id}"))
    }

    fn aggregated_readings(
        &mut self,
        site_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<SensorSeries>, SourceError> {
        let mut all = Vec::new();
        for (start, end) in chunk_spans(from, to, self.chunk_days) {
            let path = format!(
                "/v1/data/zev/{site_id}?from={}&to={}",
                format_instant(start),
                format_instant(end)
            );
            let chunk: Vec<SensorSeries> = self.get_json(&path)?;
            all.extend(chunk);
        }
        Ok(all)
    }

    fn battery_readings(
        &mut self,
        _site_id: &str,
        sensor_id: &str,
        from: DateTime<Local>,
        to: DateTime<Local>,
    ) -> Result<Vec<BatteryReading>, SourceError> {
        let mut all = Vec::new();
        for (start, end) in chunk_spans(from, to, self.chunk_days) {
            let path = format!(
                "/v1/data/sensor/{sensor_id}/range?from={}&to={}&interval=900",
                format_instant(start),
                format_instant(end)
            );
            let chunk: Vec<BatteryReading> = self.get_json(&path)?;
            all.extend(chunk);
        }
        Ok(all)
    }
}

fn format_instant(t: DateTime<Local>) -> String {
    t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Splits `[from, to]` into consecutive spans of at most `chunk_days`.
fn chunk_spans(
    from: DateTime<Local>,
    to: DateTime<Local>,
    chunk_days: i64,
) -> Vec<(DateTime<Local>, DateTime<Local>)> {
    if from >= to {
        return vec![(from, to)];
    }

    let mut spans = Vec::new();
    let mut start = from;
    while start < to {
        let end = (start + Duration::days(chunk_days)).min(to);
        spans.push((start, end));
        start = end;
    }
    spans
}
