use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbgr::http::{MaintenanceSleeper, RateLimitSleeper};
use sbgr::resources::File;
use sbgr::transfer::{DEFAULT_PART_SIZE, TransferHandle};
use sbgr::{Api, Config, DownloadOptions, UploadOptions, UploadTarget};

#[derive(Parser)]
#[command(name = "sbgr", version, about = "Seven Bridges platform transfer client")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the authenticated user and the current rate limit
    Whoami,

    /// Upload a local file into a project or folder
    Upload {
        path: PathBuf,

        /// Destination project id
        #[arg(long, conflicts_with = "parent", required_unless_present = "parent")]
        project: Option<String>,

        /// Destination folder id
        #[arg(long)]
        parent: Option<String>,

        /// Remote file name (defaults to the local name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        overwrite: bool,

        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: u64,
    },

    /// Download a platform file by id
    Download {
        file_id: String,

        destination: PathBuf,

        #[arg(long)]
        overwrite: bool,

        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.config.merge_profile()?;
    let api = Api::builder(config)
        .error_handler(RateLimitSleeper::default())
        .error_handler(MaintenanceSleeper::default())
        .build()
        .context("failed to configure API client")?;
    tracing::debug!("using {}", api.base_url());

    match cli.command {
        Command::Whoami => {
            let user = api.user().await?;
            println!(
                "{} <{}>",
                user.get_str("username").unwrap_or("?"),
                user.get_str("email").unwrap_or("?")
            );
            let status = api.rate_limit_status().await?;
            if let (Some(remaining), Some(limit)) = (status.rate.remaining, status.rate.limit) {
                println!("rate limit: {}/{} remaining", remaining, limit);
            }
        }
        Command::Upload {
            path,
            project,
            parent,
            name,
            overwrite,
            part_size,
        } => {
            let target = match (project, parent) {
                (Some(project), _) => UploadTarget::Project(project),
                (None, Some(parent)) => UploadTarget::Parent(parent),
                (None, None) => anyhow::bail!("either --project or --parent is required"),
            };
            let options = UploadOptions {
                file_name: name,
                overwrite,
                part_size,
                ..Default::default()
            };
            let mut upload = File::upload(&api, &path, target, options)?;
            let file = run(&mut upload).await?;
            println!("uploaded {} as {}", path.display(), file.id().unwrap_or("?"));
        }
        Command::Download {
            file_id,
            destination,
            overwrite,
            part_size,
        } => {
            let file = File::get(&api, &file_id).await?;
            let options = DownloadOptions {
                part_size,
                overwrite,
                ..Default::default()
            };
            let mut download = file.download(&destination, options).await?;
            let path = run(&mut download).await?;
            println!("downloaded {} to {}", file_id, path.display());
        }
    }

    Ok(())
}

/// Drive a transfer to completion; ctrl-c stops it.
async fn run<T: Send + 'static>(handle: &mut TransferHandle<T>) -> anyhow::Result<T> {
    handle.on_progress(|progress| {
        tracing::info!(
            "{}/{} parts, {}/{} bytes",
            progress.parts_done,
            progress.parts_total,
            progress.bytes_done,
            progress.total_bytes
        );
    });
    handle.start()?;

    let finished = tokio::select! {
        result = handle.wait() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match finished {
        Some(result) => Ok(result?),
        None => {
            tracing::warn!("interrupted, stopping transfer");
            handle.stop().await?;
            anyhow::bail!("transfer {}", handle.status())
        }
    }
}
