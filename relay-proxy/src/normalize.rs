//! Canonical result shapes for node payloads.
//!
//! Everything here is pure: raw node JSON in, caller-facing structs out.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---- container stats ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskStats {
    #[serde(default)]
    pub bind: u64,
    #[serde(default)]
    pub volumes: u64,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Docker-style telemetry as reported by a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerRawStats {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub networks: std::collections::BTreeMap<String, NetworkStats>,
    #[serde(default)]
    pub disk_stats: Option<DiskStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStats {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub disk_usage: u64,
    pub disk_limit: u64,
    pub disk_percent: f64,
}

pub fn to_container_stats(raw: &DockerRawStats, name: &str, disk_limit_bytes: u64) -> ContainerStats {
    let memory = &raw.memory_stats;
    let disk_usage = match &raw.disk_stats {
        Some(disk) if disk.error.is_none() => disk.bind.saturating_add(disk.volumes),
        _ => 0,
    };
    let (network_rx, network_tx) = raw
        .networks
        .values()
        .fold((0u64, 0u64), |(rx, tx), n| (rx.saturating_add(n.rx_bytes), tx.saturating_add(n.tx_bytes)));

    ContainerStats {
        name: name.to_string(),
        cpu_percent: cpu_percent(raw),
        memory_usage: memory.usage,
        memory_limit: memory.limit,
        memory_percent: percent(memory.usage, memory.limit),
        network_rx,
        network_tx,
        disk_usage,
        disk_limit: disk_limit_bytes,
        disk_percent: percent(disk_usage, disk_limit_bytes),
    }
}

fn cpu_percent(raw: &DockerRawStats) -> f64 {
    let cpu_delta = raw
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(raw.precpu_stats.cpu_usage.total_usage);
    let system_delta = raw
        .cpu_stats
        .system_cpu_usage
        .saturating_sub(raw.precpu_stats.system_cpu_usage);
    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }
    let online = raw.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;
    // multiply before dividing so round numbers stay exact
    (cpu_delta as f64 * online * 100.0) / system_delta as f64
}

fn percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        0.0
    } else {
        usage as f64 * 100.0 / limit as f64
    }
}

// ---- folder listing ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub is_symbolic_link: bool,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub modified_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Directory,
    Symlink,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub kind: FileKind,
    pub modified: Option<DateTime<Utc>>,
}

/// Directories first, then by name.
pub fn to_directory_listing(raw: &[RawFileEntry]) -> Vec<FileInfo> {
    let mut listing: Vec<FileInfo> = raw
        .iter()
        .filter(|e| !e.name.is_empty())
        .map(|e| FileInfo {
            name: e.name.clone(),
            size: if e.is_directory { 0 } else { e.size },
            kind: if e.is_directory {
                FileKind::Directory
            } else if e.is_symbolic_link {
                FileKind::Symlink
            } else {
                FileKind::File
            },
            modified: e
                .modified_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        })
        .collect();
    listing.sort_by(|a, b| {
        (a.kind != FileKind::Directory)
            .cmp(&(b.kind != FileKind::Directory))
            .then_with(|| a.name.cmp(&b.name))
    });
    listing
}

// ---- logs ----

/// Nodes return logs either as an array of lines or as one string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LogPayload {
    Lines(Vec<String>),
    Text(String),
}

pub fn to_log_text(raw: LogPayload) -> String {
    match raw {
        LogPayload::Lines(lines) => lines.join("\n"),
        LogPayload::Text(text) => text,
    }
}
