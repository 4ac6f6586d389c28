//! Output parsers — turn the raw stdout of a pipeline's last stage into
//! typed values.
//!
//! Every parser is pure; the host service decides how a
//! [`MalformedOutputError`] degrades.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use super::types::{ContainerList, ContainerRecord, ContainerStats, DiskUsage, UpdateEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    UpdateList,
    UpgradeSummary,
    ContainerList,
    ContainerStats,
    DiskTopology,
    DiskUsage,
    ProcessSnapshot,
    Count,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputKind::UpdateList => "update list",
            OutputKind::UpgradeSummary => "upgrade summary",
            OutputKind::ContainerList => "container list",
            OutputKind::ContainerStats => "container stats",
            OutputKind::DiskTopology => "block device listing",
            OutputKind::DiskUsage => "disk usage",
            OutputKind::ProcessSnapshot => "process snapshot",
            OutputKind::Count => "count",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {kind} output: {detail}")]
pub struct MalformedOutputError {
    pub kind: OutputKind,
    pub detail: String,
}

impl MalformedOutputError {
    fn new(kind: OutputKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

// ── Packages ───────────────────────────────────────────────

/// Parse `apt list --upgradable`.
///
/// Line format: `name/suite 1.2.4 amd64 [upgradable from: 1.2.3]`. The first
/// line is apt's `Listing...` header.
pub fn parse_update_list(raw: &str) -> Result<Vec<UpdateEntry>, MalformedOutputError> {
    raw.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(MalformedOutputError::new(
                    OutputKind::UpdateList,
                    format!("line {}: expected at least 2 fields", number + 1),
                ));
            }
            let last = tokens[tokens.len() - 1];
            Ok(UpdateEntry {
                package: tokens[0].trim_end_matches(':').to_string(),
                from_version: last.trim_end_matches(']').to_string(),
                to_version: tokens[1].to_string(),
            })
        })
        .collect()
}

/// Number of upgraded packages from `apt upgrade -y` output.
pub fn parse_upgrade_count(raw: &str) -> Result<u32, MalformedOutputError> {
    let leading_number = |line: &str| {
        line.split_whitespace()
            .next()
            .and_then(|token| token.parse::<u32>().ok())
    };

    let summary = raw
        .lines()
        .rev()
        .filter(|line| line.contains("upgraded,"))
        .find_map(leading_number);
    if let Some(count) = summary {
        return Ok(count);
    }

    raw.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(leading_number)
        .ok_or_else(|| MalformedOutputError::new(OutputKind::UpgradeSummary, "no package count"))
}

/// Single integer, as printed by `grep -c`.
pub fn parse_count(raw: &str) -> Result<u64, MalformedOutputError> {
    let trimmed = raw.trim();
    trimmed
        .parse()
        .map_err(|_| MalformedOutputError::new(OutputKind::Count, format!("not a number: {trimmed:?}")))
}

// ── Containers ─────────────────────────────────────────────

/// Parse `docker ps -a --format "{{.Names}} {{.State}} {{.RunningFor}}"`.
pub fn parse_container_list(raw: &str) -> Result<ContainerList, MalformedOutputError> {
    let mut containers = Vec::new();

    for (number, line) in raw.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(state)) = (tokens.next(), tokens.next()) else {
            if line.trim().is_empty() {
                continue;
            }
            return Err(MalformedOutputError::new(
                OutputKind::ContainerList,
                format!("line {}: expected name and state", number + 1),
            ));
        };
        containers.push(ContainerRecord {
            name: name.to_string(),
            state: state.to_string(),
            runtime: tokens.collect::<Vec<_>>().join(" "),
        });
    }

    containers.sort_by(|a, b| a.name.cmp(&b.name));
    let items = containers.len();
    Ok(ContainerList { containers, items })
}

/// Parse `docker stats --no-stream` output formatted as
/// `name|cpu|mem|net|block`, selecting the line for `container`.
///
/// `Ok(None)` when no line mentions the container.
pub fn parse_container_stats(
    raw: &str,
    container: &str,
) -> Result<Option<ContainerStats>, MalformedOutputError> {
    let target = container.to_lowercase();

    let exact = raw.lines().find(|line| {
        line.split('|')
            .next()
            .is_some_and(|name| name.trim().to_lowercase() == target)
    });
    let line = exact.or_else(|| raw.lines().find(|line| line.to_lowercase().contains(&target)));

    let Some(line) = line else {
        return Ok(None);
    };

    let fields: Vec<&str> = line.trim().split('|').map(str::trim).collect();
    let [name, cpu, ram, net_io, disk_io] = fields.as_slice() else {
        return Err(MalformedOutputError::new(
            OutputKind::ContainerStats,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    };

    Ok(Some(ContainerStats {
        name: name.to_string(),
        cpu: cpu.to_string(),
        ram: ram.to_string(),
        net_io: net_io.to_string(),
        disk_io: disk_io.to_string(),
    }))
}

// ── Disks ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    // lsblk >= 2.37
    #[serde(default)]
    mountpoints: Option<Vec<Option<String>>>,
    #[serde(default)]
    children: Option<Vec<BlockDevice>>,
}

impl BlockDevice {
    fn is_mounted_at(&self, target: &str) -> bool {
        self.mountpoint.as_deref() == Some(target)
            || self
                .mountpoints
                .iter()
                .flatten()
                .any(|m| m.as_deref() == Some(target))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Label of the disk mounted at `mountpoint`, from `lsblk -J -o NAME,MOUNTPOINT,MODEL`.
///
/// Empty string when nothing is mounted there.
pub fn parse_disk_label(raw: &str, mountpoint: &str) -> Result<String, MalformedOutputError> {
    let listing: LsblkOutput = serde_json::from_str(raw)
        .map_err(|e| MalformedOutputError::new(OutputKind::DiskTopology, e.to_string()))?;

    for device in &listing.blockdevices {
        let children = device.children.as_deref().unwrap_or_default();

        if let Some(child) = children.iter().find(|c| c.is_mounted_at(mountpoint)) {
            return Ok(non_empty(&child.model)
                .or_else(|| non_empty(&child.name))
                .or_else(|| non_empty(&device.model))
                .unwrap_or_default());
        }

        if children.is_empty() && device.is_mounted_at(mountpoint) {
            return Ok(non_empty(&device.model)
                .or_else(|| non_empty(&device.name))
                .unwrap_or_default());
        }
    }

    Ok(String::new())
}

/// Parse `df -kP <path>`.
pub fn parse_disk_usage(raw: &str) -> Result<DiskUsage, MalformedOutputError> {
    let line = raw
        .lines()
        .nth(1)
        .ok_or_else(|| MalformedOutputError::new(OutputKind::DiskUsage, "missing data line"))?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return Err(MalformedOutputError::new(
            OutputKind::DiskUsage,
            format!("expected at least 5 fields, found {}", tokens.len()),
        ));
    }

    let kib = |token: &str| {
        token.parse::<u64>().map(|v| v * 1024).map_err(|_| {
            MalformedOutputError::new(OutputKind::DiskUsage, format!("not a number: {token:?}"))
        })
    };
    let total = kib(tokens[1])?;
    let used = kib(tokens[2])?;
    let free = kib(tokens[3])?;

    let percent = if used + free == 0 {
        0.0
    } else {
        (used as f64 / (used + free) as f64 * 1000.0).round() / 10.0
    };

    Ok(DiskUsage {
        total: bytes_to_human(total),
        used: bytes_to_human(used),
        free: bytes_to_human(free),
        percent,
    })
}

/// `1073741824` → `"1.0G"`, `512` → `"512.0B"`.
pub fn bytes_to_human(bytes: u64) -> String {
    const SYMBOLS: [&str; 8] = ["K", "M", "G", "T", "P", "E", "Z", "Y"];

    for (index, symbol) in SYMBOLS.iter().enumerate().rev() {
        let prefix = 1u128 << ((index + 1) * 10);
        if u128::from(bytes) >= prefix {
            return format!("{:.1}{}", bytes as f64 / prefix as f64, symbol);
        }
    }
    format!("{:.1}B", bytes as f64)
}

// ── Processes ──────────────────────────────────────────────

/// Command name of the top process row from `top -b -n 1 | head -n 8 | tail -n 1`.
///
/// Scans backward from the end of the line for a space preceded by a digit;
/// everything after that space is the command (so names with spaces survive,
/// as long as the column before them is numeric, i.e. TIME+).
pub fn parse_hot_process(raw: &str) -> Result<String, MalformedOutputError> {
    let line = raw.lines().last().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(String::new());
    }

    let chars: Vec<char> = line.chars().collect();
    let mut index = chars.len() - 1;
    while index > 0 {
        if chars[index] == ' ' && chars[index - 1].is_numeric() {
            return Ok(chars[index + 1..].iter().collect());
        }
        index -= 1;
    }

    Err(MalformedOutputError::new(
        OutputKind::ProcessSnapshot,
        "no numeric column before the command name",
    ))
}

// ── Plain text ─────────────────────────────────────────────

/// First line, trimmed; `None` when empty.
pub fn first_line(raw: &str) -> Option<String> {
    raw.lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// First whitespace-separated token (e.g. the first address of `hostname -I`).
pub fn first_token(raw: &str) -> Option<String> {
    raw.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APT_LIST: &str = "\
Listing...
curl/jammy-updates 7.81.0-1ubuntu1.16 amd64 [upgradable from: 7.81.0-1ubuntu1.15]
libssl3/jammy-security 3.0.2-0ubuntu1.15 amd64 [upgradable from: 3.0.2-0ubuntu1.14]
tzdata/jammy-updates 2024a-0ubuntu0.22.04 all [upgradable from: 2023c-0ubuntu0.22.04.2]
";

    #[test]
    fn test_update_list_one_entry_per_line() {
        let updates = parse_update_list(APT_LIST).unwrap();

        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[0],
            UpdateEntry {
                package: "curl/jammy-updates".into(),
                from_version: "7.81.0-1ubuntu1.15".into(),
                to_version: "7.81.0-1ubuntu1.16".into(),
            }
        );
        assert!(updates.iter().all(|u| !u.package.is_empty()
            && !u.from_version.is_empty()
            && !u.to_version.is_empty()));
    }

    #[test]
    fn test_update_list_header_only_is_empty() {
        assert!(parse_update_list("Listing...\n").unwrap().is_empty());
        assert!(parse_update_list("").unwrap().is_empty());
    }

    #[test]
    fn test_update_list_strips_trailing_colon() {
        let updates = parse_update_list("Listing...\nvim: 9.1 [upgradable from: 9.0]\n").unwrap();
        assert_eq!(updates[0].package, "vim");
        assert_eq!(updates[0].from_version, "9.0");
        assert_eq!(updates[0].to_version, "9.1");
    }

    #[test]
    fn test_update_list_rejects_single_token_line() {
        let err = parse_update_list("Listing...\ngarbage\n").unwrap_err();
        assert_eq!(err.kind, OutputKind::UpdateList);
    }

    #[test]
    fn test_upgrade_count_from_summary_line() {
        let raw = "\
Reading package lists...
Calculating upgrade...
3 upgraded, 0 newly installed, 0 to remove and 0 not upgraded.
Setting up curl (7.81.0-1ubuntu1.16) ...
Processing triggers for man-db (2.10.2-1) ...
";
        assert_eq!(parse_upgrade_count(raw).unwrap(), 3);
    }

    #[test]
    fn test_upgrade_count_falls_back_to_last_line() {
        assert_eq!(parse_upgrade_count("something\n0 packages\n").unwrap(), 0);
        assert!(parse_upgrade_count("Done.\n").is_err());
    }

    #[test]
    fn test_count() {
        assert_eq!(parse_count("1843\n").unwrap(), 1843);
        assert!(parse_count("").is_err());
    }

    #[test]
    fn test_container_list_sorted_by_name() {
        let list = parse_container_list("web Up 3 hours\napi Exited 2 days\n").unwrap();

        assert_eq!(list.items, 2);
        assert_eq!(list.containers[0].name, "api");
        assert_eq!(list.containers[0].state, "Exited");
        assert_eq!(list.containers[0].runtime, "2 days");
        assert_eq!(list.containers[1].name, "web");
        assert_eq!(list.containers[1].runtime, "3 hours");
    }

    #[test]
    fn test_container_list_is_idempotent() {
        let raw = "b running 1 minute ago\nA exited 2 hours ago\na created 5 seconds ago\n";
        let first = parse_container_list(raw).unwrap();
        let second = parse_container_list(raw).unwrap();

        assert_eq!(first, second);
        let names: Vec<_> = first.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["A", "a", "b"]);
    }

    #[test]
    fn test_container_list_empty() {
        let list = parse_container_list("").unwrap();
        assert_eq!(list.items, 0);
        assert!(list.containers.is_empty());
    }

    #[test]
    fn test_container_stats_match() {
        let stats = parse_container_stats("redis|2.3%|10MiB/1GiB|1kB/2kB|0B/0B\n", "redis")
            .unwrap()
            .unwrap();

        assert_eq!(
            stats,
            ContainerStats {
                name: "redis".into(),
                cpu: "2.3%".into(),
                ram: "10MiB/1GiB".into(),
                net_io: "1kB/2kB".into(),
                disk_io: "0B/0B".into(),
            }
        );
    }

    #[test]
    fn test_container_stats_missing_is_none() {
        let raw = "redis|2.3%|10MiB/1GiB|1kB/2kB|0B/0B\n";
        assert_eq!(parse_container_stats(raw, "missing").unwrap(), None);
    }

    #[test]
    fn test_container_stats_prefers_exact_name() {
        let raw = "\
redis-cache|9.0%|1MiB/1GiB|0B/0B|0B/0B
Redis|2.3%|10MiB/1GiB|1kB/2kB|0B/0B
";
        let stats = parse_container_stats(raw, "redis").unwrap().unwrap();
        assert_eq!(stats.name, "Redis");
        assert_eq!(stats.cpu, "2.3%");
    }

    #[test]
    fn test_container_stats_wrong_field_count() {
        let err = parse_container_stats("redis|2.3%\n", "redis").unwrap_err();
        assert_eq!(err.kind, OutputKind::ContainerStats);
    }

    #[test]
    fn test_disk_label_falls_back_to_child_name() {
        let raw = r#"{"blockdevices": [
            {"name": "sda", "mountpoint": null, "model": "SSD123",
             "children": [{"name": "sda1", "mountpoint": "/", "model": ""}]}
        ]}"#;
        assert_eq!(parse_disk_label(raw, "/").unwrap(), "sda1");
    }

    #[test]
    fn test_disk_label_no_match_is_empty() {
        let raw = r#"{"blockdevices": [
            {"name": "sda", "mountpoint": null, "model": "SSD123",
             "children": [{"name": "sda1", "mountpoint": "/boot", "model": null}]}
        ]}"#;
        assert_eq!(parse_disk_label(raw, "/").unwrap(), "");
    }

    #[test]
    fn test_disk_label_prefers_child_model() {
        let raw = r#"{"blockdevices": [
            {"name": "nvme0n1", "model": "Samsung SSD 980",
             "children": [{"name": "nvme0n1p2", "mountpoints": ["/", "/home"], "model": "Volume"}]}
        ]}"#;
        assert_eq!(parse_disk_label(raw, "/home").unwrap(), "Volume");
    }

    #[test]
    fn test_disk_label_whole_disk_mount() {
        let raw = r#"{"blockdevices": [
            {"name": "vda", "mountpoint": "/", "model": null}
        ]}"#;
        assert_eq!(parse_disk_label(raw, "/").unwrap(), "vda");
    }

    #[test]
    fn test_disk_label_invalid_json() {
        let err = parse_disk_label("not json", "/").unwrap_err();
        assert_eq!(err.kind, OutputKind::DiskTopology);
    }

    #[test]
    fn test_disk_usage() {
        let raw = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1         10485760  2621440   7864320      25% /
";
        let usage = parse_disk_usage(raw).unwrap();

        assert_eq!(usage.total, "10.0G");
        assert_eq!(usage.used, "2.5G");
        assert_eq!(usage.free, "7.5G");
        assert_eq!(usage.percent, 25.0);
    }

    #[test]
    fn test_bytes_to_human() {
        assert_eq!(bytes_to_human(0), "0.0B");
        assert_eq!(bytes_to_human(1023), "1023.0B");
        assert_eq!(bytes_to_human(1024), "1.0K");
        assert_eq!(bytes_to_human(10_000), "9.8K");
        assert_eq!(bytes_to_human(1_073_741_824), "1.0G");
    }

    #[test]
    fn test_hot_process_name() {
        let raw = "   1234 root      20   0  123456  65432  12345 S  12.5   1.6   0:42.17 firefox\n";
        assert_eq!(parse_hot_process(raw).unwrap(), "firefox");
    }

    #[test]
    fn test_hot_process_name_with_spaces() {
        let raw = "   4321 user      20   0  987654  54321   4321 R   6.0   2.0   1:02.03 Web Content";
        assert_eq!(parse_hot_process(raw).unwrap(), "Web Content");
    }

    #[test]
    fn test_hot_process_empty_and_malformed() {
        assert_eq!(parse_hot_process("").unwrap(), "");
        assert!(parse_hot_process("no digits here").is_err());
    }

    #[test]
    fn test_first_line_and_token() {
        assert_eq!(first_line("6.8.0-45-generic\n"), Some("6.8.0-45-generic".into()));
        assert_eq!(first_line("\n"), None);
        assert_eq!(first_token("192.168.1.20 172.17.0.1 \n"), Some("192.168.1.20".into()));
        assert_eq!(first_token(""), None);
    }
}
