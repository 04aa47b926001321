use crate::jobs::JobKind;
use crate::state::{new_state, Shared};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Compteurs d'un job depuis le démarrage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobHealth {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped_ticks: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub memory_usage_mb: f32,
    pub jobs: BTreeMap<JobKind, JobHealth>,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    jobs: Shared<BTreeMap<JobKind, JobHealth>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            jobs: new_state(BTreeMap::new()),
        }
    }

    pub fn record_success(&self, job: JobKind, elapsed: Duration) {
        let mut jobs = self.jobs.lock();
        let entry = jobs.entry(job).or_default();
        entry.runs += 1;
        entry.successes += 1;
        entry.last_success = Some(OffsetDateTime::now_utc());
        entry.last_duration_ms = Some(elapsed.as_millis() as u64);
    }

    pub fn record_failure(&self, job: JobKind, elapsed: Duration, error: String) {
        let mut jobs = self.jobs.lock();
        let entry = jobs.entry(job).or_default();
        entry.runs += 1;
        entry.failures += 1;
        entry.last_error = Some(error);
        entry.last_duration_ms = Some(elapsed.as_millis() as u64);
    }

    pub fn record_skipped(&self, job: JobKind) {
        self.jobs.lock().entry(job).or_default().skipped_ticks += 1;
    }

    pub fn job(&self, job: JobKind) -> JobHealth {
        self.jobs.lock().get(&job).cloned().unwrap_or_default()
    }

    pub fn get_health(&self) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            memory_usage_mb: get_memory_usage_mb(),
            jobs: self.jobs.lock().clone(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
