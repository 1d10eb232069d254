use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// challengebox - per-owner challenge containers on remote container engines
#[derive(Debug, Parser)]
#[command(name = "challengebox", author, about, version, styles=styles::styles())]
pub struct ChallengeboxArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<ChallengeboxSubcommand>,

    /// Settings file to use instead of `$CHALLENGEBOX_HOME/challengebox.toml`
    #[arg(short, long, global = true, env = "CHALLENGEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum ChallengeboxSubcommand {
    /// Start the HTTP server
    #[command(name = "serve")]
    Serve {
        /// Address to bind to, overriding the settings file
        #[arg(short, long)]
        addr: Option<SocketAddr>,
    },

    /// Manage container host configurations
    #[command(name = "host")]
    Host {
        /// The host subcommand to run
        #[command(subcommand)]
        subcommand: HostSubcommand,
    },

    /// List the images offered by the reference host
    #[command(name = "images")]
    Images {
        /// Show `repository:tag` instead of bare repositories
        #[arg(short, long)]
        tags: bool,
    },

    /// List tracked instances
    #[command(name = "status")]
    Status {
        /// Only show instances of this owner
        #[arg(short, long)]
        owner_id: Option<String>,
    },

    /// Force-remove tracked instances
    #[command(name = "nuke")]
    Nuke {
        /// Engine id of the container to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        container: Option<String>,

        /// Owner whose host runs the container
        #[arg(short, long, requires = "container")]
        owner_id: Option<String>,

        /// Remove every tracked instance
        #[arg(short, long)]
        all: bool,
    },

    /// Reclaim every stale instance once
    #[command(name = "sweep")]
    Sweep,
}

/// Subcommands for managing host configurations
#[derive(Debug, Parser)]
pub enum HostSubcommand {
    /// Create or replace the host configuration of an owner
    #[command(name = "set")]
    Set {
        /// The owner the host serves
        #[arg(long)]
        owner_id: String,

        /// `host:port` of the engine control API
        #[arg(long)]
        hostname: String,

        /// Use mutual-TLS
        #[arg(long, requires_all = ["ca_cert", "client_cert", "client_key"])]
        tls: bool,

        /// CA certificate PEM file
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        /// Client certificate PEM file
        #[arg(long)]
        client_cert: Option<PathBuf>,

        /// Client private key PEM file
        #[arg(long)]
        client_key: Option<PathBuf>,

        /// Allowed repositories; none allows every image
        #[arg(short, long = "repository")]
        repositories: Vec<String>,
    },

    /// List host configurations
    #[command(name = "list")]
    List,
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
