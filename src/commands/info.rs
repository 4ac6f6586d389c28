//! `servpilot info` — single host facts.

use anyhow::Result;
use clap::Subcommand;

use super::{block_on, print_json, print_json_or_false, print_text_or_false};
use crate::config::Config;
use crate::domain::host_metrics;
use crate::domain::host_service::HostService;

#[derive(Subcommand)]
pub enum InfoCommands {
    /// Running kernel release
    Kernel,
    /// Host name
    Hostname,
    /// Public address as seen from the internet
    PublicIp,
    /// First local address
    LocalIp,
    /// Number of installed packages
    Packages,
    /// Command of the busiest process
    HottestProcess,
    /// Load average over 1, 5 and 15 minutes
    Load {
        /// Relative to the number of logical processors
        #[arg(long)]
        percent: bool,
    },
    /// Core and thread counts and frequencies
    Cpu,
    /// RAM usage in GiB
    Ram,
    /// Swap usage
    Swap,
    /// Available temperature sensors
    Sensors,
    /// Readings of one temperature sensor
    Sensor {
        /// Sensor name, e.g. coretemp
        name: String,
    },
}

pub fn run(config: &Config, command: InfoCommands) -> Result<()> {
    let service = HostService::new(config);

    block_on(async {
        let value = match command {
            InfoCommands::Kernel => service.kernel_version().await?,
            InfoCommands::Hostname => service.hostname().await?,
            InfoCommands::PublicIp => service.public_ip().await?,
            InfoCommands::LocalIp => service.local_ip().await?,
            InfoCommands::Packages => Some(service.installed_package_count().await?.to_string()),
            InfoCommands::HottestProcess => service.hottest_process().await?,
            InfoCommands::Load { percent } => {
                let load = host_metrics::system_load(percent).await;
                return print_json_or_false(load.as_ref());
            }
            InfoCommands::Cpu => return print_json(&host_metrics::cpu_info().await),
            InfoCommands::Ram => {
                let meminfo = host_metrics::read_meminfo().await;
                return print_json(&host_metrics::ram_stats(&meminfo));
            }
            InfoCommands::Swap => {
                let meminfo = host_metrics::read_meminfo().await;
                return print_json(&host_metrics::swap_stats(&meminfo));
            }
            InfoCommands::Sensors => return print_json(&host_metrics::temp_sensors().await),
            InfoCommands::Sensor { name } => {
                let readings = host_metrics::temp_by_sensor(&name).await;
                return print_json_or_false(readings.as_ref());
            }
        };
        print_text_or_false(value.as_deref());
        Ok(())
    })
}
