use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::pm2::Target;

/// One element of `pm2 jlist`, kept exactly as PM2 emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessRecord(pub Map<String, Value>);

/// The full `pm2 jlist` output: an array of objects, possibly empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessSnapshot(pub Vec<ProcessRecord>);

impl ProcessSnapshot {
    /// Only a JSON array is a listing; empty output is an error.
    pub fn parse(output: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(output.trim())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.0.iter()
    }

    /// Whether `target` names a process in this snapshot.
    pub fn contains(&self, target: &Target) -> bool {
        match target {
            Target::All => true,
            Target::Id(id) => self.iter().any(|p| p.pm_id() == Some(*id)),
            Target::Name(name) => self.iter().any(|p| p.name() == Some(name.as_str())),
        }
    }

    pub fn summaries(&self, now: DateTime<Utc>) -> Vec<ProcessSummary> {
        self.iter().map(|p| p.summary(now)).collect()
    }

    pub fn stats(&self) -> ProcessStats {
        let mut stats = ProcessStats {
            total_processes: self.len(),
            ..ProcessStats::default()
        };

        for process in self.iter() {
            match process.status() {
                Some("online") => stats.online += 1,
                Some("stopped") => stats.stopped += 1,
                Some("errored") => stats.errored += 1,
                _ => stats.other += 1,
            }
            stats.total_restarts += process.restarts();
            stats.total_memory_bytes += process.memory_bytes();
            stats.total_cpu_percent += process.cpu_percent();
        }

        stats
    }
}

impl ProcessRecord {
    fn env(&self) -> Option<&Map<String, Value>> {
        self.0.get("pm2_env").and_then(Value::as_object)
    }

    fn monit(&self) -> Option<&Map<String, Value>> {
        self.0.get("monit").and_then(Value::as_object)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn pm_id(&self) -> Option<u32> {
        self.0
            .get("pm_id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
    }

    /// OS pid; PM2 reports 0 for processes that are not running.
    pub fn pid(&self) -> Option<u32> {
        self.0
            .get("pid")
            .and_then(Value::as_u64)
            .filter(|pid| *pid != 0)
            .and_then(|pid| u32::try_from(pid).ok())
    }

    pub fn status(&self) -> Option<&str> {
        self.env()?.get("status").and_then(Value::as_str)
    }

    pub fn cpu_percent(&self) -> f64 {
        self.monit()
            .and_then(|m| m.get("cpu"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.monit()
            .and_then(|m| m.get("memory"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// When the process was last (re)started; `pm_uptime` is epoch milliseconds.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.env()?.get("pm_uptime").and_then(Value::as_i64)?;
        if millis <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn restarts(&self) -> u64 {
        self.env()
            .and_then(|env| env.get("restart_time"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Last path segment of the executed script.
    pub fn script(&self) -> Option<&str> {
        let path = self.env()?.get("pm_exec_path").and_then(Value::as_str)?;
        path.rsplit(['/', '\\']).next().filter(|s| !s.is_empty())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> ProcessSummary {
        ProcessSummary {
            name: self.name().unwrap_or("Unknown").to_string(),
            pm_id: self.pm_id(),
            pid: self.pid(),
            status: self.status().unwrap_or("unknown").to_string(),
            cpu_percent: self.cpu_percent(),
            memory_bytes: self.memory_bytes(),
            uptime_seconds: self
                .started_at()
                .map(|started| now.signed_duration_since(started).num_seconds().max(0)),
            restarts: self.restarts(),
            script: self.script().unwrap_or("N/A").to_string(),
        }
    }
}

/// A record flattened for display, with placeholders for missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub name: String,
    pub pm_id: Option<u32>,
    pub pid: Option<u32>,
    pub status: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub uptime_seconds: Option<i64>,
    pub restarts: u64,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    pub total_processes: usize,
    pub online: usize,
    pub stopped: usize,
    pub errored: usize,
    pub other: usize,
    pub total_restarts: u64,
    pub total_memory_bytes: u64,
    pub total_cpu_percent: f64,
}
