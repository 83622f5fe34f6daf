//! # resq
//!
//! Command-line ResQLink node.
//!
//! ## Commands
//!
//! - `init`: Create the device identity (and optionally pick a role)
//! - `role`: Show, set or clear the device role
//! - `create`: Create a request and broadcast it
//! - `update`: Append a status change to a request
//! - `list`: List requests
//! - `status`: Show identity, request counts and transports
//! - `peers`: Listen briefly and list devices seen
//! - `clear`: Delete every request (administrative)
//! - `serve`: Run the node until Ctrl+C
//!
//! ## Example
//!
//! ```bash
//! # Set up a sender device that shares a USB stick with the relay
//! resq init --role sender
//! resq --drop-dir /media/usb/resq create --kind medical --description "Two injured at the bridge"
//!
//! # On the handler device
//! resq --drop-dir /media/usb/resq serve
//! resq update <id> received
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resq_types::{Location, RequestStatus, Role};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{clear, create, init, list, peers, role, serve, status, update, NodeOptions};

/// Command-line ResQLink node.
#[derive(Parser, Debug)]
#[command(name = "resq")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the database and resq.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Shared directory to exchange requests through (overrides resq.toml)
    #[arg(long, global = true)]
    drop_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the device identity
    Init {
        /// Role to operate as (sender, transporter, handler)
        #[arg(long)]
        role: Option<Role>,
    },

    /// Show, set or clear the device role
    Role {
        #[command(subcommand)]
        action: Option<RoleAction>,
    },

    /// Create a request and broadcast it
    Create {
        /// Request type (medical, supplies, rescue, info)
        #[arg(long, short)]
        kind: String,

        /// What is needed (5 to 500 characters)
        #[arg(long, short)]
        description: String,

        /// Latitude in degrees
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude in degrees
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Append a status change to a request
    Update {
        /// Request id
        id: String,

        /// New status (created, forwarded, received, acknowledged, resolved)
        status: RequestStatus,
    },

    /// List requests, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show identity, request counts and transports
    Status,

    /// Listen briefly and list devices seen
    Peers {
        /// How long to listen, in milliseconds
        #[arg(long, default_value = "3000")]
        listen_ms: u64,
    },

    /// Delete every request
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Run the node until Ctrl+C
    Serve {
        /// Re-broadcast all open requests on startup
        #[arg(long)]
        rebroadcast: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RoleAction {
    /// Operate as the given role
    Set {
        /// sender, transporter or handler
        role: Role,
    },
    /// Go back to no role
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let options = NodeOptions {
        data_dir,
        drop_dir: cli.drop_dir,
    };

    match cli.command {
        Commands::Init { role } => {
            init::run(&options, role).await?;
        }
        Commands::Role { action } => match action {
            None => role::show(&options).await?,
            Some(RoleAction::Set { role }) => role::set(&options, role).await?,
            Some(RoleAction::Clear) => role::clear(&options).await?,
        },
        Commands::Create {
            kind,
            description,
            lat,
            lon,
        } => {
            let location = match (lat, lon) {
                (Some(latitude), Some(longitude)) => Some(Location {
                    latitude,
                    longitude,
                }),
                _ => None,
            };
            create::run(&options, &kind, &description, location).await?;
        }
        Commands::Update { id, status } => {
            update::run(&options, &id, status).await?;
        }
        Commands::List { json } => {
            list::run(&options, json).await?;
        }
        Commands::Status => {
            status::run(&options).await?;
        }
        Commands::Peers { listen_ms } => {
            peers::run(&options, Duration::from_millis(listen_ms)).await?;
        }
        Commands::Clear { yes } => {
            clear::run(&options, yes).await?;
        }
        Commands::Serve { rebroadcast } => {
            serve::run(&options, rebroadcast).await?;
        }
    }

    Ok(())
}

/// Install the global tracing subscriber on stderr.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for resq.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "resqlink", "resq")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
