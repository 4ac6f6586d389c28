//! Dashboard collector — one-shot overview of the local host.
//!
//! Fields are gathered one after another; a field that cannot be read logs a
//! warning and stays empty instead of failing the dashboard.

use std::fmt::Display;
use std::path::Path;

use tracing::warn;

use super::host_metrics;
use super::host_service::HostService;
use super::types::Dashboard;
use crate::pipeline::PipelineError;

pub struct DashboardCollector;

impl DashboardCollector {
    pub async fn collect(service: &HostService) -> Dashboard {
        let meminfo = host_metrics::read_meminfo().await;
        let uptime = host_metrics::uptime_secs().await;

        Dashboard {
            cpu_temp: host_metrics::cpu_temperature()
                .await
                .map(|t| format!("{:.1} 'C", t)),
            cpu_usage: match host_metrics::cpu_usage().await {
                Some(usage) => percent(usage),
                None => String::new(),
            },
            ram_usage: percent(host_metrics::ram_usage_percent(&meminfo)),
            swap_usage: percent(host_metrics::swap_usage_percent(&meminfo)),
            disk_usage: field(
                "disk_usage",
                service
                    .disk_usage(Path::new("/"))
                    .await
                    .map(|usage| Some(percent(usage.percent))),
            ),
            disk_name: field("disk_name", service.disk_label("/").await),
            kernel: field("kernel", service.kernel_version().await),
            hostname: field("hostname", service.hostname().await),
            uptime: uptime.map(host_metrics::format_uptime).unwrap_or_default(),
            uptime_since: uptime.map(host_metrics::boot_time).unwrap_or_default(),
            stress_app: field("stress_app", service.hottest_process().await),
            public_ip: field("public_ip", service.public_ip().await),
            local_ip: field("local_ip", service.local_ip().await),
            packages: field(
                "packages",
                service
                    .installed_package_count()
                    .await
                    .map(|count| Some(count.to_string())),
            ),
        }
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn field<T: Display>(name: &str, value: Result<Option<T>, PipelineError>) -> String {
    match value {
        Ok(Some(v)) => v.to_string(),
        Ok(None) => {
            warn!(field = name, "no value for dashboard field");
            String::new()
        }
        Err(e) => {
            warn!(field = name, error = %e, "failed to collect dashboard field");
            String::new()
        }
    }
}
