//! Fixed-duration bucketing of the analysis window.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Local};

/// Bucket width used for attribution; matches the meter service's
/// aggregation granularity.
pub const BUCKET_SECONDS: i64 = 900;

/// One `[start, end)` bucket with the energy accumulated into it.
#[derive(Debug, Clone)]
pub struct Interval {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub grid_import_wh: f64,
    pub grid_export_wh: f64,
    /// Net inverter production (delivery minus purchase); may be negative
    /// when the inverter draws standby power.
    pub inverter_net_wh: f64,
    /// Inverter-side purchase accumulated as internal consumption.
    pub inverter_internal_wh: f64,
    pub battery_charge_wh: f64,
    pub battery_discharge_wh: f64,
    /// Accumulated usage per consumer id.
    pub consumer_usage_wh: BTreeMap<String, f64>,
}

impl Interval {
    fn new(start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self {
            start,
            end,
            grid_import_wh: 0.0,
            grid_export_wh: 0.0,
            inverter_net_wh: 0.0,
            inverter_internal_wh: 0.0,
            battery_charge_wh: 0.0,
            battery_discharge_wh: 0.0,
            consumer_usage_wh: BTreeMap::new(),
        }
    }
}

/// Contiguous, non-overlapping buckets covering exactly `[from, to)`.
///
/// The final bucket is truncated to `to` when the window does not divide
/// evenly. Timestamp lookup is a direct index computation rather than a
/// scan.
#[derive(Debug)]
pub struct IntervalSet {
    from: DateTime<Local>,
    to: DateTime<Local>,
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn build(from: DateTime<Local>, to: DateTime<Local>) -> Self {
        let bucket = Duration::seconds(BUCKET_SECONDS);
        let mut intervals = Vec::new();
        let mut current = from;

        while current < to {
            let end = (current + bucket).min(to);
            intervals.push(Interval::new(current, end));
            current = end;
        }

        Self { from, to, intervals }
    }

    /// Index of the bucket containing `t`, or `None` outside `[from, to)`.
    pub fn index_of(&self, t: DateTime<Local>) -> Option<usize> {
        if t < self.from || t >= self.to {
            return None;
        }
        let idx = ((t - self.from).num_seconds() / BUCKET_SECONDS) as usize;
        (idx < self.intervals.len()).then_some(idx)
    }

    pub fn containing_mut(&mut self, t: DateTime<Local>) -> Option<&mut Interval> {
        let idx = self.index_of(t)?;
        self.intervals.get_mut(idx)
    }

    /// The bucket containing `t`, if any.
    pub fn containing(&self, t: DateTime<Local>) -> Option<&Interval> {
        let idx = self.index_of(t)?;
        self.intervals.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
