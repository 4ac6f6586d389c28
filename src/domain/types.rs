use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub package: String,
    pub from_version: String,
    pub to_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub state: String,
    pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerList {
    pub containers: Vec<ContainerRecord>,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    pub cpu: String,
    pub ram: String,
    pub net_io: String,
    pub disk_io: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: String,
    pub used: String,
    pub free: String,
    pub percent: f64,
}

impl Default for DiskUsage {
    fn default() -> Self {
        Self {
            total: "0.0B".into(),
            used: "0.0B".into(),
            free: "0.0B".into(),
            percent: 0.0,
        }
    }
}

/// Update check result as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub updates: Vec<UpdateEntry>,
    pub items: usize,
}

/// One-shot host overview.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<String>,
    pub cpu_usage: String,
    pub ram_usage: String,
    pub swap_usage: String,
    pub disk_usage: String,
    pub disk_name: String,
    pub kernel: String,
    pub hostname: String,
    pub uptime: String,
    pub uptime_since: String,
    pub stress_app: String,
    pub public_ip: String,
    pub local_ip: String,
    pub packages: String,
}

/// Run-queue averages over 1, 5 and 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuInfo {
    pub cores: usize,
    pub threads: usize,
    /// Mean current frequency, MHz
    pub current_mhz: Option<f64>,
    pub max_mhz: Option<f64>,
    pub per_core_mhz: Vec<f64>,
}

/// RAM figures in GiB.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RamStats {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapStats {
    pub total: String,
    pub used: String,
    pub free: String,
    pub percent: f64,
}

/// A temperature sensor device and how many probes it exposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempSensor {
    pub name: String,
    pub probes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempReading {
    pub label: String,
    pub current: f64,
}
