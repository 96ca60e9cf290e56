use crate::collectors::ActivityRecord;
use chrono::{DateTime, Utc};

/// Most recent activity across all sources. Ties are broken arbitrarily,
/// record order carries no meaning.
pub fn latest_activity(records: &[ActivityRecord]) -> Option<&ActivityRecord> {
    records.iter().max_by_key(|record| record.timestamp)
}

/// Strict wall-clock comparison: idle only once the gap exceeds the
/// threshold. Assumes the local clock and the API clocks agree.
pub fn is_idle(now: DateTime<Utc>, last_activity: DateTime<Utc>, threshold_secs: u64) -> bool {
    now.signed_duration_since(last_activity).num_seconds() > threshold_secs as i64
}
