use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;
use sysinfo::{ProcessExt, System, SystemExt};
use thiserror::Error;
use tracing::debug;

/// Gap between the two process refreshes that a CPU usage reading needs.
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Column positions of `top -b` output, half-open byte ranges per field.
const TOP_COLUMNS: TopColumns = TopColumns {
    pid: (0, 5),
    user: (6, 16),
    priority: (16, 18),
    nice: (19, 22),
    virt: (23, 30),
    res: (31, 37),
    shr: (38, 44),
    state: (45, 46),
    cpu: (47, 52),
    mem: (53, 57),
    time: (58, 67),
    command: (68, usize::MAX),
};

struct TopColumns {
    pid: (usize, usize),
    user: (usize, usize),
    priority: (usize, usize),
    nice: (usize, usize),
    virt: (usize, usize),
    res: (usize, usize),
    shr: (usize, usize),
    state: (usize, usize),
    cpu: (usize, usize),
    mem: (usize, usize),
    time: (usize, usize),
    command: (usize, usize),
}

/// Point-in-time reading of the busiest process that is not the sampler
/// itself. Discarded after the single threshold comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub command: String,
    pub cpu_percent: f64,
}

/// One parsed row of the process table.
#[derive(Debug, Clone, PartialEq)]
pub struct TopRow {
    pub pid: u32,
    pub user: String,
    pub priority: String,
    pub nice: String,
    pub virt: String,
    pub res: String,
    pub shr: String,
    pub state: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub time: String,
    pub command: String,
}

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("process listing did not match the expected column layout: {detail}")]
    ColumnLayout { detail: String },
    #[error("process listing had fewer than two entries")]
    NotEnoughProcesses,
}

/// Takes the one load sample of a decision cycle. The structured sysinfo
/// query is preferred; the `top` parser remains as a portability shim for
/// hosts where sysinfo yields no processes.
pub fn sample_load() -> Result<ProcessSample, SampleError> {
    if let Some(sample) = busiest_other_process() {
        debug!(command = %sample.command, cpu_percent = sample.cpu_percent, "sampled via sysinfo");
        return Ok(sample);
    }
    sample_from_top()
}

/// Busiest process excluding this one, read through sysinfo. Two
/// refreshes are required for a meaningful CPU delta.
fn busiest_other_process() -> Option<ProcessSample> {
    let mut system = System::new();
    system.refresh_processes();
    std::thread::sleep(CPU_SAMPLE_INTERVAL);
    system.refresh_processes();

    let own_pid = sysinfo::get_current_pid().ok();
    let mut samples: Vec<ProcessSample> = system
        .processes()
        .iter()
        .filter(|(pid, _)| Some(**pid) != own_pid)
        .map(|(_, process)| ProcessSample {
            command: process.name().to_string(),
            cpu_percent: f64::from(process.cpu_usage()),
        })
        .collect();
    samples.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    samples.into_iter().next()
}

/// Fallback: one batch-mode snapshot of `top` sorted by CPU.
fn sample_from_top() -> Result<ProcessSample, SampleError> {
    let output = Command::new("top")
        .args(["-bn1", "-o", "%CPU"])
        .output()
        .map_err(|source| SampleError::Spawn {
            command: "top".to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(SampleError::Failed {
            command: "top".to_string(),
            status: output.status,
        });
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let rows = parse_top_output(&text)?;
    second_busiest(rows)
}

fn header_pattern() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^\s*PID\s+USER\b.*\bCOMMAND\s*$").expect("valid regex"))
}

/// Parses the full `top -b` snapshot: everything before the
/// `PID ... COMMAND` header is preamble, everything after is rows.
pub fn parse_top_output(text: &str) -> Result<Vec<TopRow>, SampleError> {
    let mut lines = text.lines();
    let mut found_header = false;
    for line in &mut lines {
        if header_pattern().is_match(line) {
            found_header = true;
            break;
        }
    }
    if !found_header {
        return Err(SampleError::ColumnLayout {
            detail: "missing 'PID ... COMMAND' header".to_string(),
        });
    }

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(line)?);
    }
    Ok(rows)
}

/// Second-busiest row of the snapshot: row 0 is always `top` itself and
/// is deliberately skipped.
pub fn second_busiest(mut rows: Vec<TopRow>) -> Result<ProcessSample, SampleError> {
    if rows.len() < 2 {
        return Err(SampleError::NotEnoughProcesses);
    }
    rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    let row = &rows[1];
    Ok(ProcessSample {
        command: row.command.clone(),
        cpu_percent: row.cpu_percent,
    })
}

fn parse_row(line: &str) -> Result<TopRow, SampleError> {
    let pid = col(line, TOP_COLUMNS.pid)
        .parse::<u32>()
        .map_err(|_| layout_error("PID", line))?;
    let cpu_percent = col(line, TOP_COLUMNS.cpu)
        .parse::<f64>()
        .map_err(|_| layout_error("%CPU", line))?;
    let mem_percent = col(line, TOP_COLUMNS.mem)
        .parse::<f64>()
        .map_err(|_| layout_error("%MEM", line))?;

    Ok(TopRow {
        pid,
        user: col(line, TOP_COLUMNS.user).to_string(),
        priority: col(line, TOP_COLUMNS.priority).to_string(),
        nice: col(line, TOP_COLUMNS.nice).to_string(),
        virt: col(line, TOP_COLUMNS.virt).to_string(),
        res: col(line, TOP_COLUMNS.res).to_string(),
        shr: col(line, TOP_COLUMNS.shr).to_string(),
        state: col(line, TOP_COLUMNS.state).to_string(),
        cpu_percent,
        mem_percent,
        time: col(line, TOP_COLUMNS.time).to_string(),
        command: col(line, TOP_COLUMNS.command).to_string(),
    })
}

fn layout_error(field: &str, line: &str) -> SampleError {
    SampleError::ColumnLayout {
        detail: format!("bad {field} in row '{line}'"),
    }
}

fn col(line: &str, (start, end): (usize, usize)) -> &str {
    if start >= line.len() {
        return "";
    }
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}
