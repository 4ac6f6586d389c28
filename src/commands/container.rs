//! `servpilot container` — container engine operations.

use anyhow::Result;
use clap::Subcommand;

use super::{block_on, credential, print_json_or_false};
use crate::config::Config;
use crate::domain::host_service::HostService;

#[derive(Subcommand)]
pub enum ContainerCommands {
    /// List every container with its state
    List {
        /// Password for the escalation program
        password: String,
    },
    /// Start a container
    Start { password: String, name: String },
    /// Stop a container
    Stop { password: String, name: String },
    /// Restart a container
    Restart { password: String, name: String },
    /// One-shot resource usage of a container
    Stats { password: String, name: String },
}

impl ContainerCommands {
    fn password(&self) -> &str {
        match self {
            ContainerCommands::List { password }
            | ContainerCommands::Start { password, .. }
            | ContainerCommands::Stop { password, .. }
            | ContainerCommands::Restart { password, .. }
            | ContainerCommands::Stats { password, .. } => password,
        }
    }
}

pub fn run(config: &Config, command: ContainerCommands) -> Result<()> {
    let Some(credential) = credential(command.password().to_string()) else {
        println!("false");
        return Ok(());
    };
    let service = HostService::new(config);

    block_on(async {
        match &command {
            ContainerCommands::List { .. } => {
                let list = service.list_containers(&credential).await?;
                print_json_or_false(list.as_ref())
            }
            ContainerCommands::Start { name, .. } => {
                println!("{}", service.start_container(&credential, name).await?);
                Ok(())
            }
            ContainerCommands::Stop { name, .. } => {
                println!("{}", service.stop_container(&credential, name).await?);
                Ok(())
            }
            ContainerCommands::Restart { name, .. } => {
                println!("{}", service.restart_container(&credential, name).await?);
                Ok(())
            }
            ContainerCommands::Stats { name, .. } => {
                let stats = service.container_stats(&credential, name).await?;
                print_json_or_false(stats.as_ref())
            }
        }
    })
}
