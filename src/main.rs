use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use aem_fleet::logging::init_logging;
use aem_fleet::{load_config, AppError, ErrorKind, Fleet, Instance, ProcessingMode};

#[derive(Parser, Debug)]
#[command(name = "aemfleet", version, about = "Manage and await a fleet of AEM instances")]
struct Args {
    /// Fleet configuration file
    #[arg(long, env = "AEMFLEET_CONFIG", default_value = "aemfleet.toml")]
    config: PathBuf,
    /// Target instance ids; all active instances when omitted
    #[arg(long = "instance", short = 'i')]
    instances: Vec<String>,
    /// Override the configured processing mode
    #[arg(long, value_enum)]
    mode: Option<ProcessingMode>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Unpack local instances
    Create,
    /// Start local instances and await them
    Start,
    /// Stop local instances and await them
    Stop,
    /// Stop then start local instances
    Restart,
    /// Force-kill local instance processes
    Kill,
    /// Delete stopped local instances
    Delete,
    /// Show reachability and local process state
    Status,
    /// Wait until instances are stable
    AwaitStarted,
    /// Wait until local instances are down
    AwaitStopped,
    /// Extract the SDK distribution
    Prepare,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };
    init_logging(&config.logging);
    if args.config.exists() {
        log::debug!("Loaded config from {}", args.config.display());
    } else {
        log::debug!("Config file {} not found, using defaults", args.config.display());
    }

    match run(args, Fleet::from_config(config)).await {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

async fn run(args: Args, fleet: aem_fleet::Result<Fleet>) -> aem_fleet::Result<serde_json::Value> {
    let mut fleet = fleet?;
    if let Some(mode) = args.mode {
        fleet = fleet.with_processing_mode(mode);
    }
    let targets = fleet.instances(&args.instances)?;

    let changed = match args.cmd {
        Cmd::Create => fleet.create(&targets).await?,
        Cmd::Start => fleet.start(&targets).await?,
        Cmd::Stop => fleet.stop(&targets).await?,
        Cmd::Restart => fleet.restart(&targets).await?,
        Cmd::Kill => fleet.kill(&targets).await?,
        Cmd::Delete => fleet.delete(&targets).await?,
        Cmd::Status => {
            let states = fleet.status(&targets).await?;
            return Ok(json!({ "instances": states }));
        }
        Cmd::AwaitStarted => {
            fleet.await_started(&targets).await?;
            return Ok(json!({ "stable": ids(&targets) }));
        }
        Cmd::AwaitStopped => {
            fleet.await_stopped(&targets).await?;
            return Ok(json!({ "stopped": ids(&targets) }));
        }
        Cmd::Prepare => {
            let changed = fleet.prepare().await?;
            return Ok(json!({ "changed": changed }));
        }
    };

    Ok(json!({
        "changed": !changed.is_empty(),
        "instances": ids(&changed),
    }))
}

fn ids(instances: &[Instance]) -> Vec<&str> {
    instances.iter().map(Instance::id).collect()
}

fn fail(err: &AppError) -> ExitCode {
    log::error!("{err}");
    eprintln!("{}", json!({ "error": err, "message": err.to_string() }));
    if err.kind() == ErrorKind::CheckAbort {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}
