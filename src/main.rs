mod commands;
mod config;
mod domain;
mod logging;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "servpilot", version, about = "Run privileged maintenance pipelines on a Linux server")]
struct Cli {
    /// Path to config file (default: ~/.config/servpilot/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Pipeline deadline in seconds, 0 to wait forever (overrides config)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print the dashboard as JSON (same as `dash --format json`)
    #[arg(long)]
    dash: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a one-shot overview of the host
    Dash {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Package updates
    Updates {
        #[command(subcommand)]
        command: UpdateCommands,
    },

    /// Reboot the host now
    Reboot {
        /// Password for the escalation program
        password: String,
    },

    /// Power off the host now
    Shutdown {
        /// Password for the escalation program
        password: String,
    },

    /// Manage containers
    Container {
        #[command(subcommand)]
        command: commands::container::ContainerCommands,
    },

    /// Disk usage and model
    Disk {
        #[command(subcommand)]
        command: DiskCommands,
    },

    /// Single host facts
    Info {
        #[command(subcommand)]
        command: commands::info::InfoCommands,
    },
}

#[derive(Subcommand)]
enum UpdateCommands {
    /// Refresh the package index and list upgradable packages
    Check { password: String },
    /// Upgrade every package
    Apply { password: String },
}

#[derive(Subcommand)]
enum DiskCommands {
    /// Usage of the filesystem holding a path
    Usage {
        #[arg(default_value = "/")]
        path: PathBuf,
    },
    /// Model of the disk mounted at a mountpoint
    Label {
        #[arg(default_value = "/")]
        mountpoint: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        cfg.log_level = level;
    }
    if let Some(secs) = cli.timeout {
        cfg.timeout_secs = secs;
    }
    logging::init(&cfg.log_level, cfg.log_json);

    let command = match (cli.command, cli.dash) {
        (Some(command), _) => command,
        (None, true) => Commands::Dash {
            format: "json".to_string(),
        },
        (None, false) => anyhow::bail!("no command given (try --help)"),
    };

    match command {
        Commands::Dash { format } => commands::dash::run(&cfg, &format),
        Commands::Updates { command } => match command {
            UpdateCommands::Check { password } => commands::updates::check(&cfg, password),
            UpdateCommands::Apply { password } => commands::updates::apply(&cfg, password),
        },
        Commands::Reboot { password } => commands::power::reboot(&cfg, password),
        Commands::Shutdown { password } => commands::power::shutdown(&cfg, password),
        Commands::Container { command } => commands::container::run(&cfg, command),
        Commands::Disk { command } => match command {
            DiskCommands::Usage { path } => commands::disk::usage(&cfg, &path),
            DiskCommands::Label { mountpoint } => commands::disk::label(&cfg, &mountpoint),
        },
        Commands::Info { command } => commands::info::run(&cfg, command),
    }
}
