use crate::cloud::{CloudError, NotebookControl};
use crate::collectors::{ActivityRecord, ActivitySource};
use crate::idle;
use crate::sampler::{ProcessSample, SampleError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

/// An instance below this CPU share is considered quiet enough to stop,
/// measured on the busiest process that is not the sampler itself.
pub const CPU_IDLE_THRESHOLD_PERCENT: f64 = 20.0;

/// Outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Recent activity inside the threshold, instance keeps running.
    Active {
        source: ActivitySource,
        last_activity: DateTime<Utc>,
    },
    /// Idle time exceeded but a process is still burning CPU.
    LoadTooHigh { command: String, cpu_percent: f64 },
    /// Idle and quiet, stop was requested.
    Stopped {
        idle_secs: i64,
        command: String,
        cpu_percent: f64,
    },
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("no activity records were collected")]
    NoActivity,
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

/// Runs the per-invocation state machine: evaluate idleness, and only if
/// idle take a single load sample and gate the stop call on it. The load
/// value that is logged is the value that is acted on.
pub async fn run_check<C, S>(
    cloud: &C,
    instance: &str,
    records: &[ActivityRecord],
    threshold_secs: u64,
    sampler: S,
    now: DateTime<Utc>,
) -> Result<Decision, ActuatorError>
where
    C: NotebookControl,
    S: FnOnce() -> Result<ProcessSample, SampleError>,
{
    let latest = idle::latest_activity(records).ok_or(ActuatorError::NoActivity)?;
    info!(
        source = %latest.source,
        last_activity = %latest.timestamp,
        "most recent activity"
    );

    if !idle::is_idle(now, latest.timestamp, threshold_secs) {
        return Ok(Decision::Active {
            source: latest.source,
            last_activity: latest.timestamp,
        });
    }

    let sample = sampler()?;
    info!(
        command = %sample.command,
        cpu_percent = sample.cpu_percent,
        "busiest process"
    );

    if sample.cpu_percent >= CPU_IDLE_THRESHOLD_PERCENT {
        return Ok(Decision::LoadTooHigh {
            command: sample.command,
            cpu_percent: sample.cpu_percent,
        });
    }

    cloud.stop(instance).await?;
    Ok(Decision::Stopped {
        idle_secs: now.signed_duration_since(latest.timestamp).num_seconds(),
        command: sample.command,
        cpu_percent: sample.cpu_percent,
    })
}
