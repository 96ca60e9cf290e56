pub mod sessions;

use chrono::{DateTime, Utc};
use self::sessions::{Session, SessionsError};
use std::fmt;

/// Where a piece of activity evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    Execution,
    Connection,
    InstanceConfiguration,
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivitySource::Execution => "execution",
            ActivitySource::Connection => "connection",
            ActivitySource::InstanceConfiguration => "instance configuration",
        };
        f.write_str(name)
    }
}

/// One point of observed activity. Produced fresh on every poll and
/// discarded after the idle decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub source: ActivitySource,
    pub timestamp: DateTime<Utc>,
}

/// Derives the full set of activity records for one decision cycle:
/// an execution record per session, a connection record per session
/// (unless connections are ignored), and one instance-configuration
/// record from the cloud-reported last-modified time.
pub fn collect_activity(
    sessions: &[Session],
    instance_last_modified: DateTime<Utc>,
    now: DateTime<Utc>,
    ignore_connections: bool,
) -> Result<Vec<ActivityRecord>, SessionsError> {
    let mut records = Vec::with_capacity(sessions.len() * 2 + 1);
    for session in sessions {
        records.push(ActivityRecord {
            source: ActivitySource::Execution,
            timestamp: sessions::execution_activity(&session.kernel, now)?,
        });
        if !ignore_connections {
            records.push(ActivityRecord {
                source: ActivitySource::Connection,
                timestamp: sessions::connection_activity(&session.kernel, now)?,
            });
        }
    }
    records.push(ActivityRecord {
        source: ActivitySource::InstanceConfiguration,
        timestamp: instance_last_modified,
    });
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::sessions::Kernel;
    use chrono::Duration;

    fn stamp(time: DateTime<Utc>) -> String {
        time.format("%Y-%m-%dT%H:%M:%S%.6fz").to_string()
    }

    fn session(state: &str, last_activity: &str, connections: u64) -> Session {
        Session {
            kernel: Kernel {
                execution_state: state.to_string(),
                last_activity: last_activity.to_string(),
                connections,
            },
        }
    }

    #[test]
    fn idle_kernel_yields_reported_timestamps() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(700);
        let modified = now - Duration::hours(2);
        let sessions = vec![session("idle", &stamp(earlier), 0)];

        let records =
            collect_activity(&sessions, modified, now, false).expect("records should build");

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].source, ActivitySource::Execution);
        assert_eq!(records[0].timestamp.timestamp(), earlier.timestamp());
        assert_eq!(records[1].source, ActivitySource::Connection);
        assert_eq!(records[2].source, ActivitySource::InstanceConfiguration);
        assert_eq!(records[2].timestamp, modified);
    }

    #[test]
    fn busy_kernel_counts_as_active_now() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(5000);
        let sessions = vec![session("busy", &stamp(earlier), 0)];

        let records = collect_activity(&sessions, earlier, now, false).expect("records");

        assert_eq!(records[0].source, ActivitySource::Execution);
        assert_eq!(records[0].timestamp, now);
    }

    #[test]
    fn live_connection_counts_as_active_now() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(5000);
        let sessions = vec![session("idle", &stamp(earlier), 2)];

        let records = collect_activity(&sessions, earlier, now, false).expect("records");

        assert_eq!(records[1].source, ActivitySource::Connection);
        assert_eq!(records[1].timestamp, now);
    }

    #[test]
    fn ignore_connections_drops_connection_records() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(700);
        let sessions = vec![session("idle", &stamp(earlier), 5)];

        let records = collect_activity(&sessions, earlier, now, true).expect("records");

        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.source != ActivitySource::Connection));
    }

    #[test]
    fn no_sessions_still_yields_instance_record() {
        let now = Utc::now();
        let modified = now - Duration::hours(1);

        let records = collect_activity(&[], modified, now, false).expect("records");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, ActivitySource::InstanceConfiguration);
    }

    #[test]
    fn malformed_last_activity_is_fatal() {
        let now = Utc::now();
        let sessions = vec![session("idle", "yesterday at noon", 0)];

        let result = collect_activity(&sessions, now, now, false);

        assert!(matches!(result, Err(SessionsError::Timestamp { .. })));
    }
}
