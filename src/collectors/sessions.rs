use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Execution state Jupyter reports for a kernel with nothing running.
const KERNEL_IDLE_STATE: &str = "idle";

/// Timestamp shape of the `last_activity` field, fractional seconds with
/// the trailing `z` already stripped.
const LAST_ACTIVITY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One notebook session as returned by `GET /api/sessions`. Only the
/// kernel portion matters for idle detection.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub kernel: Kernel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Kernel {
    pub execution_state: String,
    pub last_activity: String,
    #[serde(default)]
    pub connections: u64,
}

#[derive(Debug, Error)]
pub enum SessionsError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("sessions response was not valid JSON: {source}")]
    Decode { source: reqwest::Error },
    #[error("kernel last_activity '{value}' is not a recognized timestamp")]
    Timestamp { value: String },
}

/// Fetches the current sessions from the local Jupyter server. Any
/// transport or decode failure is fatal for the whole decision cycle.
pub async fn fetch_sessions(client: &Client, port: u16) -> Result<Vec<Session>, SessionsError> {
    let url = format!("https://localhost:{port}/api/sessions");
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|source| SessionsError::Request {
            url: url.clone(),
            source,
        })?;

    let sessions: Vec<Session> = response
        .json()
        .await
        .map_err(|source| SessionsError::Decode { source })?;
    debug!(url = %url, sessions = sessions.len(), "fetched notebook sessions");
    Ok(sessions)
}

/// Execution activity of a kernel: a kernel that is not idle is active
/// right now, otherwise its self-reported last activity counts.
pub fn execution_activity(kernel: &Kernel, now: DateTime<Utc>) -> Result<DateTime<Utc>, SessionsError> {
    if kernel.execution_state != KERNEL_IDLE_STATE {
        return Ok(now);
    }
    parse_last_activity(&kernel.last_activity)
}

/// Connection activity of a kernel: any live connection counts as
/// activity right now, otherwise the self-reported last activity.
pub fn connection_activity(kernel: &Kernel, now: DateTime<Utc>) -> Result<DateTime<Utc>, SessionsError> {
    if kernel.connections > 0 {
        return Ok(now);
    }
    parse_last_activity(&kernel.last_activity)
}

/// Parses the `last_activity` value. Jupyter emits UTC with a trailing
/// `Z`; the SageMaker variant uses a lowercase `z`. Both are accepted,
/// anything else is an error.
pub fn parse_last_activity(value: &str) -> Result<DateTime<Utc>, SessionsError> {
    let trimmed = value
        .strip_suffix(['z', 'Z'])
        .ok_or_else(|| SessionsError::Timestamp {
            value: value.to_string(),
        })?;
    NaiveDateTime::parse_from_str(trimmed, LAST_ACTIVITY_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| SessionsError::Timestamp {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn kernel(state: &str, last_activity: &str, connections: u64) -> Kernel {
        Kernel {
            execution_state: state.to_string(),
            last_activity: last_activity.to_string(),
            connections,
        }
    }

    #[test]
    fn parses_microsecond_timestamp_with_lowercase_z() {
        let parsed = parse_last_activity("2023-04-12T10:15:30.123456z").expect("should parse");
        let expected = Utc
            .with_ymd_and_hms(2023, 4, 12, 10, 15, 30)
            .unwrap()
            + Duration::microseconds(123_456);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parses_uppercase_z_suffix() {
        parse_last_activity("2023-04-12T10:15:30.000001Z").expect("should parse");
    }

    #[test]
    fn rejects_missing_suffix() {
        let result = parse_last_activity("2023-04-12T10:15:30.123456");
        assert!(matches!(result, Err(SessionsError::Timestamp { .. })));
    }

    #[test]
    fn rejects_garbage() {
        let result = parse_last_activity("not-a-timestamp-z");
        assert!(matches!(result, Err(SessionsError::Timestamp { .. })));
    }

    #[test]
    fn busy_kernel_is_active_now() {
        let now = Utc::now();
        let stamp = execution_activity(&kernel("busy", "2020-01-01T00:00:00.000000z", 0), now)
            .expect("should resolve");
        assert_eq!(stamp, now);
    }

    #[test]
    fn idle_kernel_uses_reported_activity() {
        let now = Utc::now();
        let stamp = execution_activity(&kernel("idle", "2020-01-01T00:00:00.000000z", 0), now)
            .expect("should resolve");
        assert_eq!(stamp, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn connected_kernel_is_active_now() {
        let now = Utc::now();
        let stamp = connection_activity(&kernel("idle", "2020-01-01T00:00:00.000000z", 3), now)
            .expect("should resolve");
        assert_eq!(stamp, now);
    }

    #[test]
    fn session_payload_deserializes() {
        let payload = r#"[
            {
                "id": "4b3cd1e2",
                "path": "Untitled.ipynb",
                "kernel": {
                    "id": "2f5a1b9c",
                    "name": "python3",
                    "last_activity": "2023-04-12T10:15:30.123456z",
                    "execution_state": "idle",
                    "connections": 1
                }
            }
        ]"#;
        let sessions: Vec<Session> = serde_json::from_str(payload).expect("should deserialize");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].kernel.execution_state, "idle");
        assert_eq!(sessions[0].kernel.connections, 1);
    }
}
