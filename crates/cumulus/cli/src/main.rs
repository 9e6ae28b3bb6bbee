//! Cumulus CLI - run image requests against a local cluster
//!
//! The cluster (users, groups, datastores, images, ACL rules and quota
//! limits) is loaded from a JSON fixture into the in-memory collaborators.
//! One request runs per invocation; the response is printed as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use cumulus_request::{
    CumulusConfig, Response, METHOD_CHTYPE, METHOD_CLONE, METHOD_ENABLE, METHOD_PERSISTENT,
};
use cumulus_types::{ImageId, UserId};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod fixture;

use fixture::Cluster;

/// Cumulus CLI
#[derive(Parser)]
#[command(name = "cumulus")]
#[command(about = "Cumulus - image requests against a local cluster fixture", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CUMULUS_CONFIG")]
    config: Option<String>,

    /// Cluster fixture (JSON)
    #[arg(short, long, env = "CUMULUS_FIXTURE")]
    fixture: PathBuf,

    /// User id the request runs as
    #[arg(short, long, default_value_t = 0)]
    user: u32,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available requests
#[derive(Subcommand)]
enum Commands {
    /// Enable an image
    Enable { id: u32 },

    /// Disable an image
    Disable { id: u32 },

    /// Make an image persistent
    Persistent { id: u32 },

    /// Make an image non-persistent
    Nonpersistent { id: u32 },

    /// Change the type of an image
    Chtype {
        id: u32,
        /// OS, DATABLOCK, CDROM, KERNEL, RAMDISK or CONTEXT
        #[arg(value_name = "TYPE")]
        type_name: String,
    },

    /// Clone an image
    Clone { id: u32, name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CumulusConfig::load(cli.config.as_deref())?;

    // Initialize tracing; stdout is reserved for the response
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let cluster = Cluster::load(&cli.fixture, &config)?;
    let identity = cluster.identity(UserId(cli.user))?;
    let manager = &cluster.manager;

    let response = match cli.command {
        Commands::Enable { id } => Response::report(
            METHOD_ENABLE,
            &manager.enable(&identity, ImageId(id), true).await,
        ),
        Commands::Disable { id } => Response::report(
            METHOD_ENABLE,
            &manager.enable(&identity, ImageId(id), false).await,
        ),
        Commands::Persistent { id } => Response::report(
            METHOD_PERSISTENT,
            &manager.set_persistent(&identity, ImageId(id), true).await,
        ),
        Commands::Nonpersistent { id } => Response::report(
            METHOD_PERSISTENT,
            &manager.set_persistent(&identity, ImageId(id), false).await,
        ),
        Commands::Chtype { id, type_name } => Response::report(
            METHOD_CHTYPE,
            &manager.change_type(&identity, ImageId(id), &type_name).await,
        ),
        Commands::Clone { id, name } => Response::report(
            METHOD_CLONE,
            &manager.clone_image(&identity, ImageId(id), &name).await,
        ),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
