//! Day-granular date-range algebra: containment, overlap, merge, gap subtraction.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// An inclusive span of calendar days.
///
/// Collections of ranges belonging to one source are kept in merged form:
/// sorted by start, non-overlapping, with adjacent ranges (end + 1 day ==
/// next start) collapsed into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range; `start` must not be after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start after end");
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// True iff neither range ends strictly before the other starts.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.end >= other.start && other.end >= self.start
    }

    /// Number of days covered, inclusive of both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Local midnight of the given day.
///
/// On the rare DST transition where local midnight does not exist, the
/// earliest valid instant of the day is used.
pub fn day_start(day: NaiveDate) -> DateTime<Local> {
    let naive = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Last representable instant of the given day (23:59:59.999 local).
pub fn day_end(day: NaiveDate) -> DateTime<Local> {
    let naive = day
        .and_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or_else(|| day.and_time(NaiveTime::MIN));
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Consolidates overlapping and adjacent ranges into the minimal sorted set.
pub fn merge_ranges(ranges: &[DateRange]) -> Vec<DateRange> {
    if ranges.is_empty() {
        return Vec::new();
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut result: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for current in sorted {
        match result.last_mut() {
            // Adjacent (end + 1 day == start) counts as mergeable.
            Some(last) if current.start <= last.end + Duration::days(1) => {
                if current.end > last.end {
                    last.end = current.end;
                }
            }
            _ => result.push(current),
        }
    }

    result
}

/// Removes `cut` from `base`, returning the 0, 1, or 2 remaining pieces.
pub fn subtract_range(base: DateRange, cut: DateRange) -> Vec<DateRange> {
    if !base.overlaps(&cut) {
        return vec![base];
    }

    let mut result = Vec::new();

    if base.start < cut.start {
        result.push(DateRange::new(base.start, cut.start - Duration::days(1)));
    }
    if base.end > cut.end {
        result.push(DateRange::new(cut.end + Duration::days(1), base.end));
    }

    result
}

/// Returns the sub-spans of `[from, to]` not covered by any cached range.
///
/// The window is first clipped to end no later than yesterday: today is
/// still accumulating and is always treated as a gap by policy, so it never
/// appears in the returned ranges (the fetcher handles it separately).
pub fn find_gaps(
    cached: &[DateRange],
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
) -> Vec<DateRange> {
    let to = if to >= today { today - Duration::days(1) } else { to };
    if from > to {
        // Entire window is today or later.
        return Vec::new();
    }

    let mut gaps = vec![DateRange::new(from, to)];
    for c in cached {
        let mut remaining = Vec::new();
        for gap in gaps {
            remaining.extend(subtract_range(gap, *c));
        }
        gaps = remaining;
    }

    gaps
}
