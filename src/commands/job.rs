//! Start, stop, restart or reload a unit

use std::time::Duration;
use sysd_client::{is_success, Bus, SystemdClient};

#[derive(clap::Args)]
pub struct JobArgs {
    /// Job mode: replace, fail, isolate, ignore-dependencies, ignore-requirements
    #[arg(long, default_value = "replace")]
    mode: String,

    /// Don't wait for the job to finish
    #[arg(long)]
    no_block: bool,

    /// Give up waiting after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub enum JobKind {
    Start,
    Stop,
    Restart,
    Reload,
}

impl JobKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
        }
    }
}

pub async fn run_job(
    bus: Bus,
    kind: JobKind,
    name: &str,
    args: &JobArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = SystemdClient::connect(bus).await?;

    let job = match kind {
        JobKind::Start => client.start_unit_job(name, &args.mode).await?,
        JobKind::Stop => client.stop_unit_job(name, &args.mode).await?,
        JobKind::Restart => client.restart_unit_job(name, &args.mode).await?,
        JobKind::Reload => client.reload_unit_job(name, &args.mode).await?,
    };

    if args.no_block {
        println!("● {} - {} job queued ({})", name, kind.as_str(), job.path());
        return Ok(());
    }

    let result = match args.timeout {
        Some(secs) => job.wait_timeout(Duration::from_secs(secs)).await?,
        None => job.wait().await?,
    };

    if is_success(&result) {
        println!("● {} - {} {}", name, kind.as_str(), result);
        Ok(())
    } else {
        Err(format!("{} {} job finished with result: {}", kind.as_str(), name, result).into())
    }
}
