//! # CLI Interface
//!
//! Defines the command-line argument structure for `gavel-node` using
//! `clap` derive. Two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};

use gavel_contracts::RegistryConfig;
use gavel_protocol::config::{
    DEFAULT_MAX_DURATION_SECS, DEFAULT_MIN_DURATION_SECS, EXTENSION_WINDOW_SECS, MAX_PAGE_SIZE,
};
use gavel_protocol::{AssetId, Principal};

use crate::host::HostConfig;
use crate::logging::LogFormat;

/// Gavel auction node.
///
/// Hosts the auction registry, its engines, and the reward issuer on top of
/// in-memory devnet ledgers. Serves the JSON-RPC API, a live event stream,
/// and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "gavel-node",
    about = "Gavel anti-snipe auction node",
    version,
    propagate_version = true
)]
pub struct GavelNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Gavel node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "GAVEL_RPC_PORT", default_value_t = 9841)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GAVEL_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// Governance principal for the registry and the reward issuer.
    #[arg(long, env = "GAVEL_OWNER", default_value = "gov")]
    pub owner: String,

    /// The registry's own principal. Engine ids are derived from it.
    #[arg(long, env = "GAVEL_REGISTRY_ADDRESS", default_value = "gavel-registry")]
    pub registry_address: String,

    /// Asset symbols whitelisted at startup, comma separated.
    #[arg(long, env = "GAVEL_ASSETS", value_delimiter = ',', default_value = "USDC")]
    pub assets: Vec<String>,

    /// Shortest allowed auction, in seconds.
    #[arg(long, env = "GAVEL_MIN_DURATION_SECS", default_value_t = DEFAULT_MIN_DURATION_SECS)]
    pub min_duration_secs: u64,

    /// Longest allowed auction, in seconds.
    #[arg(long, env = "GAVEL_MAX_DURATION_SECS", default_value_t = DEFAULT_MAX_DURATION_SECS)]
    pub max_duration_secs: u64,

    /// Anti-snipe window, in seconds.
    #[arg(long, env = "GAVEL_EXTENSION_WINDOW_SECS", default_value_t = EXTENSION_WINDOW_SECS)]
    pub extension_window_secs: u64,

    /// Log output format.
    #[arg(long, env = "GAVEL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Host configuration described by these arguments.
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            registry_address: Principal::new(self.registry_address.as_str()),
            owner: Principal::new(self.owner.as_str()),
            assets: self
                .assets
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(AssetId::new)
                .collect(),
            registry: RegistryConfig {
                min_duration_secs: self.min_duration_secs,
                max_duration_secs: self.max_duration_secs,
                extension_window_secs: self.extension_window_secs,
                max_page_size: MAX_PAGE_SIZE,
            },
        }
    }
}
