//! Direct host metric reads from /proc and /sys.

use std::path::Path;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};

use super::parsers::bytes_to_human;
use super::types::{CpuInfo, LoadAverage, RamStats, SwapStats, TempReading, TempSensor};

const CPU_SENSORS: [&str; 4] = ["coretemp", "k10temp", "cpu_thermal", "zenpower"];
const CPU_MAX_FREQ: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";

// ── CPU usage ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Aggregate `cpu` line of /proc/stat. Guest time is already part of user
/// time, so only the first eight columns are summed.
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse().ok())
        .collect::<Option<_>>()?;
    if values.len() < 4 {
        return None;
    }

    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: values.iter().sum(),
    })
}

pub fn cpu_usage_between(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let busy = total.saturating_sub(after.idle.saturating_sub(before.idle));
    round1(busy as f64 / total as f64 * 100.0)
}

/// CPU usage over a one second window.
pub async fn cpu_usage() -> Option<f64> {
    let before = read_cpu_times().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let after = read_cpu_times().await?;
    Some(cpu_usage_between(before, after))
}

async fn read_cpu_times() -> Option<CpuTimes> {
    match tokio::fs::read_to_string("/proc/stat").await {
        Ok(stat) => parse_cpu_times(&stat),
        Err(e) => {
            warn!(error = %e, "failed to read /proc/stat");
            None
        }
    }
}

fn extract_proc_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    (key.trim() == field).then(|| value.trim())
}

/// Core and thread counts plus per-processor `cpu MHz` from /proc/cpuinfo.
///
/// Cores are distinct `(physical id, core id)` pairs; without topology
/// fields (most ARM boards) every processor counts as a core.
pub fn parse_cpuinfo(cpuinfo: &str) -> (usize, usize, Vec<f64>) {
    let mut threads = 0;
    let mut cores = std::collections::BTreeSet::new();
    let mut per_core_mhz = Vec::new();
    let mut physical_id = None;

    for line in cpuinfo.lines() {
        if extract_proc_field(line, "processor").is_some() {
            threads += 1;
            physical_id = None;
        } else if let Some(id) = extract_proc_field(line, "physical id") {
            physical_id = Some(id.to_string());
        } else if let Some(id) = extract_proc_field(line, "core id") {
            cores.insert((physical_id.clone().unwrap_or_default(), id.to_string()));
        } else if let Some(mhz) = extract_proc_field(line, "cpu MHz") {
            if let Ok(mhz) = mhz.parse::<f64>() {
                per_core_mhz.push(mhz);
            }
        }
    }

    let cores = if cores.is_empty() { threads } else { cores.len() };
    (cores, threads, per_core_mhz)
}

pub async fn cpu_info() -> CpuInfo {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo")
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to read /proc/cpuinfo");
            String::new()
        });
    let (cores, threads, per_core_mhz) = parse_cpuinfo(&cpuinfo);

    let current_mhz = (!per_core_mhz.is_empty())
        .then(|| round3(per_core_mhz.iter().sum::<f64>() / per_core_mhz.len() as f64));
    let max_mhz = tokio::fs::read_to_string(CPU_MAX_FREQ)
        .await
        .ok()
        .and_then(|khz| khz.trim().parse::<f64>().ok())
        .map(|khz| khz / 1000.0);

    let info = CpuInfo {
        cores,
        threads,
        current_mhz,
        max_mhz,
        per_core_mhz,
    };
    debug!(?info, "cpu info");
    info
}

// ── Load ───────────────────────────────────────────────────

pub fn parse_loadavg(raw: &str) -> Option<LoadAverage> {
    let loads: Vec<f64> = raw
        .split_whitespace()
        .take(3)
        .filter_map(|s| s.parse().ok())
        .collect();
    match loads[..] {
        [one, five, fifteen] => Some(LoadAverage { one, five, fifteen }),
        _ => None,
    }
}

/// Load averages rounded to three decimals; with `percent`, relative to the
/// number of logical processors.
pub fn scale_load(load: LoadAverage, percent: bool, threads: usize) -> LoadAverage {
    let scale = |value: f64| {
        if percent && threads > 0 {
            round3(value / threads as f64 * 100.0)
        } else {
            round3(value)
        }
    };
    LoadAverage {
        one: scale(load.one),
        five: scale(load.five),
        fifteen: scale(load.fifteen),
    }
}

pub async fn system_load(percent: bool) -> Option<LoadAverage> {
    let raw = tokio::fs::read_to_string("/proc/loadavg")
        .await
        .map_err(|e| warn!(error = %e, "failed to read /proc/loadavg"))
        .ok()?;
    let load = parse_loadavg(&raw)?;
    let threads = if percent { cpu_info().await.threads } else { 0 };
    Some(scale_load(load, percent, threads))
}

// ── Memory ─────────────────────────────────────────────────

pub async fn read_meminfo() -> String {
    tokio::fs::read_to_string("/proc/meminfo")
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to read /proc/meminfo");
            String::new()
        })
}

pub fn parse_meminfo_kb(meminfo: &str, field: &str) -> u64 {
    meminfo
        .lines()
        .find(|l| l.starts_with(field) && l[field.len()..].starts_with(':'))
        .and_then(|l| l.split_whitespace().nth(1).and_then(|v| v.parse().ok()))
        .unwrap_or(0)
}

pub fn ram_usage_percent(meminfo: &str) -> f64 {
    let total = parse_meminfo_kb(meminfo, "MemTotal");
    let available = parse_meminfo_kb(meminfo, "MemAvailable");
    usage_percent(total.saturating_sub(available), total)
}

pub fn swap_usage_percent(meminfo: &str) -> f64 {
    let total = parse_meminfo_kb(meminfo, "SwapTotal");
    let free = parse_meminfo_kb(meminfo, "SwapFree");
    usage_percent(total.saturating_sub(free), total)
}

/// RAM in GiB. `used` excludes buffers and page cache, as `free` reports it.
pub fn ram_stats(meminfo: &str) -> RamStats {
    let kb = |field| parse_meminfo_kb(meminfo, field);
    let total = kb("MemTotal");
    let free = kb("MemFree");
    let cache = kb("Buffers") + kb("Cached") + kb("SReclaimable");
    let used = match total.checked_sub(free + cache) {
        Some(used) => used,
        None => total.saturating_sub(free),
    };

    RamStats {
        total: kib_to_gib(total),
        used: kib_to_gib(used),
        available: kib_to_gib(kb("MemAvailable")),
        percent: ram_usage_percent(meminfo),
    }
}

pub fn swap_stats(meminfo: &str) -> SwapStats {
    let total = parse_meminfo_kb(meminfo, "SwapTotal");
    let free = parse_meminfo_kb(meminfo, "SwapFree");
    SwapStats {
        total: bytes_to_human(total * 1024),
        used: bytes_to_human(total.saturating_sub(free) * 1024),
        free: bytes_to_human(free * 1024),
        percent: swap_usage_percent(meminfo),
    }
}

fn kib_to_gib(kib: u64) -> f64 {
    round3(kib as f64 / (1024.0 * 1024.0))
}

fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(used as f64 / total as f64 * 100.0)
}

// ── Uptime ─────────────────────────────────────────────────

pub async fn uptime_secs() -> Option<u64> {
    let raw = tokio::fs::read_to_string("/proc/uptime")
        .await
        .map_err(|e| warn!(error = %e, "failed to read /proc/uptime"))
        .ok()?;
    parse_uptime_secs(&raw)
}

pub fn parse_uptime_secs(raw: &str) -> Option<u64> {
    raw.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .map(|secs| secs as u64)
}

/// `"3 days, 4:05:06"`, `"1 day, 0:00:10"`, `"4:05:06"`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;
    let rest = secs % 60;
    let clock = format!("{}:{:02}:{:02}", hours, mins, rest);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

/// Local boot time as `dd/mm/YYYY HH:MM:SS`.
pub fn boot_time(uptime_secs: u64) -> String {
    let booted = Local::now() - chrono::Duration::seconds(uptime_secs as i64);
    booted.format("%d/%m/%Y %H:%M:%S").to_string()
}

// ── Temperature ────────────────────────────────────────────

fn is_cpu_sensor(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    CPU_SENSORS.contains(&name.as_str()) || name.contains("cpu") || name.contains("core")
}

/// Mean of the `Core N` readings, or of every reading when none is labelled
/// per core.
pub fn cpu_temperature_from(readings: &[TempReading]) -> Option<f64> {
    let cores: Vec<f64> = readings
        .iter()
        .filter(|r| r.label.to_lowercase().contains("core"))
        .map(|r| r.current)
        .collect();
    let values: Vec<f64> = if cores.is_empty() {
        readings.iter().map(|r| r.current).collect()
    } else {
        cores
    };

    if values.is_empty() {
        return None;
    }
    Some(round1(values.iter().sum::<f64>() / values.len() as f64))
}

/// CPU temperature in °C from the first CPU sensor with readings.
pub async fn cpu_temperature() -> Option<f64> {
    read_hwmon()
        .await
        .into_iter()
        .filter(|(name, _)| is_cpu_sensor(name))
        .find_map(|(_, readings)| cpu_temperature_from(&readings))
}

/// Every sensor device with at least one temperature probe.
pub async fn temp_sensors() -> Vec<TempSensor> {
    read_hwmon()
        .await
        .into_iter()
        .filter(|(_, readings)| !readings.is_empty())
        .map(|(name, readings)| TempSensor {
            name,
            probes: readings.len(),
        })
        .collect()
}

/// Probes of the sensor device called `name`, or `None` if there is none.
pub async fn temp_by_sensor(name: &str) -> Option<Vec<TempReading>> {
    let readings = read_hwmon()
        .await
        .into_iter()
        .find(|(device, _)| device == name)
        .map(|(_, readings)| readings);
    if readings.is_none() {
        warn!(sensor = %name, "sensor is not available");
    }
    readings
}

/// Devices under /sys/class/hwmon, merged by name in discovery order.
async fn read_hwmon() -> Vec<(String, Vec<TempReading>)> {
    let mut sensors: Vec<(String, Vec<TempReading>)> = Vec::new();
    let Ok(mut devices) = tokio::fs::read_dir("/sys/class/hwmon").await else {
        return sensors;
    };

    let mut paths = Vec::new();
    while let Ok(Some(device)) = devices.next_entry().await {
        paths.push(device.path());
    }
    paths.sort();

    for path in paths {
        let name = tokio::fs::read_to_string(path.join("name"))
            .await
            .unwrap_or_default()
            .trim()
            .to_string();
        let readings = read_hwmon_temps(&path).await;
        match sensors.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, merged)) => merged.extend(readings),
            None => sensors.push((name, readings)),
        }
    }
    sensors
}

async fn read_hwmon_temps(device: &Path) -> Vec<TempReading> {
    let mut inputs: Vec<u32> = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(device).await else {
        return Vec::new();
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(sensor) = file_name
            .strip_prefix("temp")
            .and_then(|rest| rest.strip_suffix("_input"))
        {
            if let Ok(index) = sensor.parse::<u32>() {
                inputs.push(index);
            }
        }
    }
    inputs.sort_unstable();

    let mut readings = Vec::new();
    for index in inputs {
        let input = device.join(format!("temp{}_input", index));
        let Some(millis) = tokio::fs::read_to_string(input)
            .await
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
        else {
            continue;
        };
        let label = tokio::fs::read_to_string(device.join(format!("temp{}_label", index)))
            .await
            .unwrap_or_default();
        readings.push(TempReading {
            label: label.trim().to_string(),
            current: millis / 1000.0,
        });
    }
    readings
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:       16000000 kB
MemFree:         2000000 kB
MemAvailable:    4000000 kB
SwapCached:            0 kB
SwapTotal:       2000000 kB
SwapFree:        1500000 kB
";

    #[test]
    fn test_meminfo_fields() {
        assert_eq!(parse_meminfo_kb(MEMINFO, "MemTotal"), 16_000_000);
        assert_eq!(parse_meminfo_kb(MEMINFO, "SwapTotal"), 2_000_000);
        assert_eq!(parse_meminfo_kb(MEMINFO, "Missing"), 0);
    }

    #[test]
    fn test_memory_percentages() {
        assert_eq!(ram_usage_percent(MEMINFO), 75.0);
        assert_eq!(swap_usage_percent(MEMINFO), 25.0);
        assert_eq!(swap_usage_percent("SwapTotal: 0 kB\nSwapFree: 0 kB\n"), 0.0);
    }

    #[test]
    fn test_cpu_usage_between_samples() {
        let before = parse_cpu_times("cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 1 2 3 4\n").unwrap();
        let after = parse_cpu_times("cpu  150 0 150 850 150 0 0 0 0 0\n").unwrap();

        assert_eq!(before, CpuTimes { idle: 800, total: 1000 });
        assert_eq!(cpu_usage_between(before, after), 33.3);
        assert_eq!(cpu_usage_between(after, after), 0.0);
    }

    #[test]
    fn test_uptime_formatting() {
        assert_eq!(parse_uptime_secs("350735.47 234388.90\n"), Some(350_735));
        assert_eq!(format_uptime(14_706), "4:05:06");
        assert_eq!(format_uptime(86_410), "1 day, 0:00:10");
        assert_eq!(format_uptime(273_906), "3 days, 4:05:06");
    }

    fn reading(label: &str, current: f64) -> TempReading {
        TempReading {
            label: label.to_string(),
            current,
        }
    }

    #[test]
    fn test_cpu_temperature_prefers_core_labels() {
        let readings = vec![
            reading("Package id 0", 60.0),
            reading("Core 0", 45.0),
            reading("Core 1", 50.0),
        ];
        assert_eq!(cpu_temperature_from(&readings), Some(47.5));

        let unlabelled = vec![reading("Tctl", 41.25), reading("", 43.0)];
        assert_eq!(cpu_temperature_from(&unlabelled), Some(42.1));
        assert_eq!(cpu_temperature_from(&[]), None);
    }

    #[test]
    fn test_cpu_sensor_names() {
        assert!(is_cpu_sensor("coretemp\n"));
        assert!(is_cpu_sensor("k10temp"));
        assert!(!is_cpu_sensor("nvme"));
        assert!(!is_cpu_sensor("acpitz"));
    }

    #[test]
    fn test_ram_stats_in_gib() {
        let meminfo = "\
MemTotal:        8388608 kB
MemFree:         1048576 kB
MemAvailable:    4194304 kB
Buffers:          524288 kB
Cached:          2097152 kB
SReclaimable:     524288 kB
";
        let stats = ram_stats(meminfo);

        assert_eq!(stats.total, 8.0);
        assert_eq!(stats.used, 4.0);
        assert_eq!(stats.available, 4.0);
        assert_eq!(stats.percent, 50.0);
    }

    #[test]
    fn test_swap_stats_human_readable() {
        let stats = swap_stats(MEMINFO);

        assert_eq!(stats.total, "1.9G");
        assert_eq!(stats.used, "488.3M");
        assert_eq!(stats.free, "1.4G");
        assert_eq!(stats.percent, 25.0);
    }

    #[test]
    fn test_loadavg() {
        let load = parse_loadavg("0.52 1.25 2.00 2/345 6789\n").unwrap();
        assert_eq!(load, LoadAverage { one: 0.52, five: 1.25, fifteen: 2.0 });
        assert_eq!(parse_loadavg("garbage"), None);

        let percent = scale_load(load, true, 4);
        assert_eq!(percent, LoadAverage { one: 13.0, five: 31.25, fifteen: 50.0 });
        assert_eq!(scale_load(load, false, 4), load);
    }

    #[test]
    fn test_cpuinfo_counts_cores_and_threads() {
        let cpuinfo = "\
processor\t: 0
physical id\t: 0
core id\t\t: 0
cpu MHz\t\t: 2000.000

processor\t: 1
physical id\t: 0
core id\t\t: 0
cpu MHz\t\t: 3000.000

processor\t: 2
physical id\t: 0
core id\t\t: 1
cpu MHz\t\t: 2500.000
";
        let (cores, threads, mhz) = parse_cpuinfo(cpuinfo);

        assert_eq!(cores, 2);
        assert_eq!(threads, 3);
        assert_eq!(mhz, vec![2000.0, 3000.0, 2500.0]);
    }

    #[test]
    fn test_cpuinfo_without_topology() {
        let (cores, threads, mhz) = parse_cpuinfo("processor\t: 0\nprocessor\t: 1\n");

        assert_eq!((cores, threads), (2, 2));
        assert!(mhz.is_empty());
    }
}
