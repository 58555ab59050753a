//! Command line configuration

use clap::Parser;
use dispatcher_core::definition::ensure_unique;
use dispatcher_core::{DefinitionDefaults, DefinitionError, GroupDefinition};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "dispatchers",
    about = "Keep a Kamailio dispatcher list in sync with Kubernetes endpoints"
)]
pub struct Cli {
    /// Dispatcher sets of the form [namespace:]name=index[:port], where index
    /// is the set number and port the SIP port of its members. May be
    /// repeated or comma separated.
    #[arg(long = "set", value_name = "SET")]
    pub sets: Vec<String>,

    /// Output file for the dispatcher list
    #[arg(short = 'o', long, default_value = "/data/kamailio/dispatcher.list")]
    pub output: PathBuf,

    /// Host of Kamailio's BINRPC service
    #[arg(long, env = "RPC_HOST", default_value = "127.0.0.1")]
    pub rpc_host: String,

    /// Port of Kamailio's BINRPC service
    #[arg(long, env = "RPC_PORT", default_value_t = 9998)]
    pub rpc_port: u16,

    /// Location of a kubeconfig file (if not running inside Kubernetes)
    #[arg(long)]
    pub kubecfg: Option<PathBuf>,

    /// Address for the membership API, e.g. ":8080" or "0.0.0.0:8080"
    #[arg(long)]
    pub api: Option<String>,

    /// Runs shorter than this many seconds count as short failures
    #[arg(long, default_value_t = 60)]
    pub min_runtime_secs: u64,

    /// Exit after this many short failures
    #[arg(long, default_value_t = 10)]
    pub max_short_failures: u32,

    /// Delay before the follow-up reload notification at startup
    #[arg(long, default_value_t = 60)]
    pub renotify_delay_secs: u64,
}

/// Validated runtime configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub definitions: Vec<GroupDefinition>,
    pub output: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub kubeconfig: Option<PathBuf>,
    pub api_addr: Option<String>,
    pub min_runtime: Duration,
    pub max_short_failures: u32,
    pub renotify_delay: Duration,
}

impl Config {
    pub fn from_cli(cli: Cli, defaults: &DefinitionDefaults) -> Result<Self, DefinitionError> {
        let mut definitions = Vec::new();
        for raw in &cli.sets {
            definitions.extend(GroupDefinition::parse_list(raw, defaults)?);
        }
        ensure_unique(&definitions)?;

        Ok(Self {
            definitions,
            output: cli.output,
            rpc_host: cli.rpc_host,
            rpc_port: cli.rpc_port,
            kubeconfig: cli.kubecfg,
            api_addr: cli.api.map(|addr| listen_addr(&addr)),
            min_runtime: Duration::from_secs(cli.min_runtime_secs),
            max_short_failures: cli.max_short_failures,
            renotify_delay: Duration::from_secs(cli.renotify_delay_secs),
        })
    }
}

/// Accept the bare ":port" form for listening on all interfaces
fn listen_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    }
}
