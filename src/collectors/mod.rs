pub mod system;

use crate::models::{CpuStats, DiskStats, MemoryStats, NetworkStats};
use async_trait::async_trait;
use thiserror::Error;

pub use system::MockTelemetry;

/// One reading of host resource usage. Uptime is left raw so callers can
/// render it alongside the server's own uptime.
#[derive(Debug, Clone)]
pub struct HostSample {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
    pub system_uptime_secs: f64,
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("host reported zero total memory")]
    MemoryUnavailable,
    #[error("telemetry source failed: {0}")]
    Source(String),
}

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    async fn sample(&self) -> Result<HostSample, TelemetryError>;
}
