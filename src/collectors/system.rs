use crate::collectors::{HostSample, TelemetryError, TelemetryProvider};
use crate::models::{CpuStats, DiskStats, MemoryStats, NetworkStats};
use async_trait::async_trait;
use rand::Rng;
use sysinfo::{RefreshKind, System, SystemExt};
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;
const DISK_TOTAL_GB: u64 = 500;
const NETWORK_MAX_MBPS: f64 = 100.0;

/// Reads real host memory and uptime; CPU, disk and network are random
/// placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTelemetry;

impl MockTelemetry {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TelemetryProvider for MockTelemetry {
    async fn sample(&self) -> Result<HostSample, TelemetryError> {
        let (total_bytes, available_bytes, system_uptime_secs) =
            tokio::task::spawn_blocking(query_host)
                .await
                .map_err(|err| TelemetryError::Source(format!("host query aborted: {err}")))?;
        debug!(total_bytes, available_bytes, "host memory sampled");

        let memory = memory_stats(total_bytes, available_bytes)?;
        let mut rng = rand::thread_rng();
        Ok(HostSample {
            cpu: CpuStats {
                usage: rng.gen_range(0..=100),
            },
            memory,
            disk: DiskStats {
                total: DISK_TOTAL_GB,
                used: rng.gen_range(1..DISK_TOTAL_GB),
                free: rng.gen_range(1..DISK_TOTAL_GB),
            },
            network: NetworkStats {
                traffic: round_2(rng.gen_range(0.0..NETWORK_MAX_MBPS)),
            },
            system_uptime_secs,
        })
    }
}

/// Total bytes, available bytes and system uptime in seconds.
fn query_host() -> (u64, u64, f64) {
    let system = System::new_with_specifics(RefreshKind::new().with_memory());
    (
        system.total_memory(),
        system.available_memory(),
        system.uptime() as f64,
    )
}

pub fn memory_stats(total_bytes: u64, free_bytes: u64) -> Result<MemoryStats, TelemetryError> {
    if total_bytes == 0 {
        return Err(TelemetryError::MemoryUnavailable);
    }
    let free_bytes = free_bytes.min(total_bytes);
    Ok(MemoryStats {
        total: total_bytes / BYTES_PER_MB,
        free: free_bytes / BYTES_PER_MB,
        usage: usage_percent(total_bytes, free_bytes),
    })
}

/// `round((1 - free/total) * 100)`, clamped to 0..=100.
pub fn usage_percent(total_bytes: u64, free_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return 0;
    }
    let ratio = free_bytes as f64 / total_bytes as f64;
    ((1.0 - ratio) * 100.0).round().clamp(0.0, 100.0) as u8
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
