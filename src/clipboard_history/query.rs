//! Search, filtering and time grouping over history snapshots

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use std::collections::HashMap;

use super::types::{ClipboardRecord, ContentKind};

/// Filter over a snapshot; every set condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Lowercased search needle
    text: Option<String>,
    kind: Option<ContentKind>,
    pinned_only: bool,
    since_ms: Option<i64>,
    until_ms: Option<i64>,
    limit: Option<usize>,
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring match on the resolved text. Blank clears it.
    pub fn text(mut self, needle: impl AsRef<str>) -> Self {
        let needle = needle.as_ref().trim();
        self.text = (!needle.is_empty()).then(|| needle.to_lowercase());
        self
    }

    pub fn kind(mut self, kind: ContentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn pinned_only(mut self, pinned_only: bool) -> Self {
        self.pinned_only = pinned_only;
        self
    }

    /// Inclusive lower bound, Unix milliseconds
    pub fn since(mut self, timestamp_ms: i64) -> Self {
        self.since_ms = Some(timestamp_ms);
        self
    }

    /// Exclusive upper bound, Unix milliseconds
    pub fn until(mut self, timestamp_ms: i64) -> Self {
        self.until_ms = Some(timestamp_ms);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &ClipboardRecord) -> bool {
        if self.pinned_only && !record.is_pinned {
            return false;
        }
        if self.kind.is_some_and(|kind| record.kind() != kind) {
            return false;
        }
        if self.since_ms.is_some_and(|since| record.timestamp < since) {
            return false;
        }
        if self.until_ms.is_some_and(|until| record.timestamp >= until) {
            return false;
        }
        match &self.text {
            Some(needle) => record.resolved_text().to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }

    /// Matching records in snapshot order, up to the limit
    pub fn apply(&self, records: &[ClipboardRecord]) -> Vec<ClipboardRecord> {
        records
            .iter()
            .filter(|record| self.matches(record))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Time grouping for history lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeGroup {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    Older,
}

impl TimeGroup {
    pub fn display_name(&self) -> &'static str {
        match self {
            TimeGroup::Today => "Today",
            TimeGroup::Yesterday => "Yesterday",
            TimeGroup::ThisWeek => "This Week",
            TimeGroup::LastWeek => "Last Week",
            TimeGroup::ThisMonth => "This Month",
            TimeGroup::Older => "Older",
        }
    }

    /// Lower sorts first
    pub fn sort_order(&self) -> u8 {
        match self {
            TimeGroup::Today => 0,
            TimeGroup::Yesterday => 1,
            TimeGroup::ThisWeek => 2,
            TimeGroup::LastWeek => 3,
            TimeGroup::ThisMonth => 4,
            TimeGroup::Older => 5,
        }
    }
}

/// Classify a millisecond timestamp in the local timezone
pub fn classify_timestamp(timestamp_ms: i64) -> TimeGroup {
    classify_timestamp_with_now(timestamp_ms, Local::now())
}

/// Classify against a fixed `now`; the timestamp is read in `now`'s timezone.
pub fn classify_timestamp_with_now<Tz: TimeZone>(
    timestamp_ms: i64,
    now: DateTime<Tz>,
) -> TimeGroup {
    let today = now.date_naive();
    let entry_date = match now.timezone().timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.date_naive(),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.date_naive(),
        chrono::LocalResult::None => return TimeGroup::Older,
    };

    if entry_date == today {
        return TimeGroup::Today;
    }
    if today.pred_opt() == Some(entry_date) {
        return TimeGroup::Yesterday;
    }

    // weeks start on Monday
    let days_since_monday = today.weekday().num_days_from_monday();
    let this_week_start = today - chrono::Duration::days(days_since_monday as i64);
    let last_week_start = this_week_start - chrono::Duration::days(7);

    if entry_date >= this_week_start && entry_date < today {
        return TimeGroup::ThisWeek;
    }
    if entry_date >= last_week_start && entry_date < this_week_start {
        return TimeGroup::LastWeek;
    }

    let this_month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    if entry_date >= this_month_start && entry_date < today {
        return TimeGroup::ThisMonth;
    }

    TimeGroup::Older
}

/// Group records by time period relative to `now`.
///
/// Groups come out Today first; records keep their snapshot order inside a
/// group.
pub fn group_by_time<Tz: TimeZone>(
    records: &[ClipboardRecord],
    now: DateTime<Tz>,
) -> Vec<(TimeGroup, Vec<ClipboardRecord>)> {
    let mut groups: HashMap<TimeGroup, Vec<ClipboardRecord>> = HashMap::new();
    for record in records {
        let group = classify_timestamp_with_now(record.timestamp, now.clone());
        groups.entry(group).or_default().push(record.clone());
    }

    let mut result: Vec<(TimeGroup, Vec<ClipboardRecord>)> = groups.into_iter().collect();
    result.sort_by_key(|(group, _)| group.sort_order());
    result
}
