//! Execution history — an append-only, size-bounded record of job runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records kept in memory at once. Oldest entries are dropped first.
const MAX_RECORDS: usize = 1000;

/// Maximum length of captured output stored in a record.
const OUTPUT_CAP: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub job_name: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub execution_time_seconds: f64,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureProjection {
    pub job_name: String,
    pub timestamp: DateTime<Utc>,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_execution_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    #[serde(flatten)]
    pub stats: Stats,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Everything mutated together on `add`: the capped in-memory mirror plus
/// the cumulative counters that outlive truncation.
struct HistoryState {
    records: Vec<ExecutionRecord>,
    /// Total number of records ever appended, never decremented by the
    /// 1000-record cap. This is what `total()` reports.
    total_appended: usize,
    cumulative_successful: usize,
    cumulative_failed: usize,
    /// Sum of `execution_time_seconds` across every successful append ever
    /// made, kept alongside `cumulative_successful` so `stats()` doesn't
    /// need to recompute an average over the truncated window.
    cumulative_success_time_sum: f64,
}

/// Durable execution log. The on-disk representation is a plain JSON array;
/// the in-memory mirror is capped at `MAX_RECORDS` and protected by a mutex
/// so it can be read from `health_check` while dispatch appends. `total()`
/// and `stats()` report cumulative counts across the whole lifetime of this
/// instance, not just the capped window still held in memory.
pub struct History {
    path: PathBuf,
    state: Mutex<HistoryState>,
}

impl History {
    /// Load an existing history file, or start empty if it's missing or
    /// unparseable. Cumulative counters are seeded from whatever was on
    /// disk, since the persisted file itself never holds more than
    /// `MAX_RECORDS` entries.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::read_from_disk(&path).unwrap_or_default();
        let (cumulative_successful, cumulative_failed, cumulative_success_time_sum) =
            tally(&records);
        let total_appended = records.len();
        Self {
            path,
            state: Mutex::new(HistoryState {
                records,
                total_appended,
                cumulative_successful,
                cumulative_failed,
                cumulative_success_time_sum,
            }),
        }
    }

    fn read_from_disk(path: &Path) -> Option<Vec<ExecutionRecord>> {
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Append one execution outcome, truncating `output` to `OUTPUT_CAP`
    /// characters. Returns the stored record.
    pub fn add(
        &self,
        job_name: &str,
        success: bool,
        execution_time_seconds: f64,
        output: &str,
    ) -> ExecutionRecord {
        let record = ExecutionRecord {
            job_name: job_name.to_string(),
            timestamp: Utc::now(),
            success,
            execution_time_seconds,
            output: truncate_output(output),
        };

        let mut state = self.state.lock().unwrap();
        state.records.push(record.clone());
        state.total_appended += 1;
        if success {
            state.cumulative_successful += 1;
            state.cumulative_success_time_sum += execution_time_seconds;
        } else {
            state.cumulative_failed += 1;
        }
        if state.records.len() > MAX_RECORDS {
            let excess = state.records.len() - MAX_RECORDS;
            state.records.drain(0..excess);
        }

        if let Err(e) = self.write_to_disk(&state.records) {
            tracing::warn!("Failed to persist execution history: {e}");
        }

        record
    }

    fn write_to_disk(&self, records: &[ExecutionRecord]) -> anyhow::Result<()> {
        let json = serde_json::to_string(records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Total number of records ever appended, independent of the in-memory
    /// cap.
    pub fn total(&self) -> usize {
        self.state.lock().unwrap().total_appended
    }

    /// The last `n` failed records, oldest of the selection first, newest
    /// last — matching wall-clock append order. Drawn from the capped
    /// in-memory window.
    pub fn recent_failures(&self, n: usize) -> Vec<FailureProjection> {
        let state = self.state.lock().unwrap();
        state
            .records
            .iter()
            .filter(|r| !r.success)
            .rev()
            .take(n)
            .map(|r| FailureProjection {
                job_name: r.job_name.clone(),
                timestamp: r.timestamp,
                output: r.output.clone(),
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Global stats computed from the cumulative counters, so `total`
    /// agrees with `total()` even past the 1000-record cap.
    pub fn stats(&self) -> Stats {
        let state = self.state.lock().unwrap();
        Stats {
            total: state.total_appended,
            successful: state.cumulative_successful,
            failed: state.cumulative_failed,
            success_rate: if state.total_appended == 0 {
                0.0
            } else {
                round2(
                    state.cumulative_successful as f64 / state.total_appended as f64 * 100.0,
                )
            },
            avg_execution_time: if state.cumulative_successful == 0 {
                0.0
            } else {
                state.cumulative_success_time_sum / state.cumulative_successful as f64
            },
        }
    }

    /// Per-job stats, filtered over the capped in-memory window (per-job
    /// cumulative counters aren't tracked, since only the global `total()`
    /// invariant is load-bearing).
    pub fn stats_for(&self, job_name: &str) -> JobStats {
        let state = self.state.lock().unwrap();
        let matching: Vec<&ExecutionRecord> = state
            .records
            .iter()
            .filter(|r| r.job_name == job_name)
            .collect();
        let stats = compute_stats(matching.iter().copied());
        let last_execution = matching.iter().map(|r| r.timestamp).max();
        JobStats {
            stats,
            last_execution,
        }
    }
}

fn tally(records: &[ExecutionRecord]) -> (usize, usize, f64) {
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut success_time_sum = 0.0f64;
    for record in records {
        if record.success {
            successful += 1;
            success_time_sum += record.execution_time_seconds;
        } else {
            failed += 1;
        }
    }
    (successful, failed, success_time_sum)
}

fn compute_stats<'a>(records: impl Iterator<Item = &'a ExecutionRecord>) -> Stats {
    let mut total = 0usize;
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut success_time_sum = 0.0f64;

    for record in records {
        total += 1;
        if record.success {
            successful += 1;
            success_time_sum += record.execution_time_seconds;
        } else {
            failed += 1;
        }
    }

    let success_rate = if total == 0 {
        0.0
    } else {
        round2(successful as f64 / total as f64 * 100.0)
    };
    let avg_execution_time = if successful == 0 {
        0.0
    } else {
        success_time_sum / successful as f64
    };

    Stats {
        total,
        successful,
        failed,
        success_rate,
        avg_execution_time,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn truncate_output(output: &str) -> String {
    if output.chars().count() <= OUTPUT_CAP {
        return output.to_string();
    }
    let keep = OUTPUT_CAP.saturating_sub(3);
    let truncated: String = output.chars().take(keep).collect();
    format!("{truncated}...")
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
