use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    #[serde(rename = "OK")]
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    #[serde(serialize_with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
    /// Process uptime in seconds.
    pub uptime: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
    pub uptime: UptimeStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuStats {
    pub usage: u8,
}

/// Host memory in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub free: u64,
    pub usage: u8,
}

/// Disk figures in gigabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkStats {
    /// Mbps.
    pub traffic: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeStats {
    pub server: String,
    pub system: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResult {
    pub success: bool,
    pub message: String,
    #[serde(serialize_with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

fn rfc3339_millis<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}
