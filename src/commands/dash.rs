//! `servpilot dash` — collect and display the host dashboard.

use anyhow::{bail, Result};
use colored::Colorize;

use super::{block_on, print_json};
use crate::config::Config;
use crate::domain::dashboard_collector::DashboardCollector;
use crate::domain::host_service::HostService;
use crate::domain::types::Dashboard;

pub fn run(config: &Config, format: &str) -> Result<()> {
    if !matches!(format, "json" | "table") {
        bail!("unknown format `{}` (expected json or table)", format);
    }
    let service = HostService::new(config);

    block_on(async {
        let dashboard = DashboardCollector::collect(&service).await;
        match format {
            "json" => print_json(&dashboard)?,
            _ => print_table(&dashboard),
        }
        Ok(())
    })
}

fn print_table(dash: &Dashboard) {
    println!("{}", "═══ Dashboard ═══".cyan().bold());
    println!("  Hostname:      {}", dash.hostname.bold());
    println!("  Kernel:        {}", dash.kernel);
    println!("  Uptime:        {} (since {})", dash.uptime, dash.uptime_since);
    println!();

    println!("{}", "── Load ──".yellow());
    if let Some(ref temp) = dash.cpu_temp {
        println!("  CPU Temp:      {}", temp);
    }
    println!("  CPU:           {}", dash.cpu_usage);
    println!("  RAM:           {}", dash.ram_usage);
    println!("  Swap:          {}", dash.swap_usage);
    println!("  Hottest:       {}", dash.stress_app);
    println!();

    println!("{}", "── Storage ──".yellow());
    println!("  Disk:          {}", dash.disk_name);
    println!("  Used:          {}", dash.disk_usage);
    println!("  Packages:      {}", dash.packages);
    println!();

    println!("{}", "── Network ──".yellow());
    println!("  Public IP:     {}", dash.public_ip);
    println!("  Local IP:      {}", dash.local_ip);
}
