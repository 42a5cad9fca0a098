mod commands;

use clap::{Parser, Subcommand};
use sysd_client::{Bus, JournalConfig};

#[derive(Parser)]
#[command(name = "unitctl")]
#[command(about = "Control a systemd-compatible service manager over D-Bus")]
struct Args {
    /// Talk to the user service manager instead of the system one
    #[arg(long, global = true)]
    user: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a unit
    Start {
        /// Unit name (e.g., "docker.service")
        name: String,
        #[command(flatten)]
        job: commands::JobArgs,
    },

    /// Stop a unit
    Stop {
        name: String,
        #[command(flatten)]
        job: commands::JobArgs,
    },

    /// Restart a unit
    Restart {
        name: String,
        #[command(flatten)]
        job: commands::JobArgs,
    },

    /// Reload a running unit
    Reload {
        name: String,
        #[command(flatten)]
        job: commands::JobArgs,
    },

    /// List loaded units
    List,

    /// Show a unit's properties
    Show {
        name: String,
    },

    /// Send a signal to all of a unit's processes
    Kill {
        name: String,
        /// Signal number
        #[arg(long, short = 's', default_value_t = 15)]
        signal: i32,
    },

    /// Enable unit files
    Enable {
        #[arg(required = true)]
        files: Vec<String>,
        /// Only until next reboot (/run instead of /etc)
        #[arg(long)]
        runtime: bool,
        /// Replace symlinks pointing at other units
        #[arg(long)]
        force: bool,
    },

    /// Disable unit files
    Disable {
        #[arg(required = true)]
        files: Vec<String>,
        #[arg(long)]
        runtime: bool,
    },

    /// Reload unit files from disk
    DaemonReload,

    /// Follow a unit's log until Ctrl+C
    Logs {
        name: String,
        /// Start this many seconds back (0 = only new entries)
        #[arg(long, default_value_t = 0)]
        since_secs: u64,
        /// Stop after this many seconds
        #[arg(long)]
        follow_for: Option<u64>,
        /// Log reader command line
        #[arg(long, default_value = sysd_client::journal::JOURNALCTL_PATH)]
        journalctl: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bus = if args.user { Bus::Session } else { Bus::System };

    match args.command {
        Command::Start { name, job } => {
            commands::run_job(bus, commands::JobKind::Start, &name, &job).await?;
        }
        Command::Stop { name, job } => {
            commands::run_job(bus, commands::JobKind::Stop, &name, &job).await?;
        }
        Command::Restart { name, job } => {
            commands::run_job(bus, commands::JobKind::Restart, &name, &job).await?;
        }
        Command::Reload { name, job } => {
            commands::run_job(bus, commands::JobKind::Reload, &name, &job).await?;
        }
        Command::List => {
            commands::list(bus).await?;
        }
        Command::Show { name } => {
            commands::show(bus, &name).await?;
        }
        Command::Kill { name, signal } => {
            commands::kill(bus, &name, signal).await?;
        }
        Command::Enable {
            files,
            runtime,
            force,
        } => {
            commands::enable(bus, &files, runtime, force).await?;
        }
        Command::Disable { files, runtime } => {
            commands::disable(bus, &files, runtime).await?;
        }
        Command::DaemonReload => {
            commands::daemon_reload(bus).await?;
        }
        Command::Logs {
            name,
            since_secs,
            follow_for,
            journalctl,
        } => {
            let config = JournalConfig::from_command_line(&journalctl)?.user(args.user);
            commands::logs(config, &name, since_secs, follow_for).await?;
        }
    }

    Ok(())
}
