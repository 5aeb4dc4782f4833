//! The signer node of the cross-chain bridge.
//!
//! Every node of the signing group runs one signing session per destination chain. Sessions
//! agree on a withdrawal, sign it with the group's threshold key and finalize it, while a
//! separate session gossips newly submitted deposits between the nodes.

use std::{fs, path::Path, process};

use anyhow::Context;
use args::{Cli, Command};
use clap::Parser;
use config::Config;
use constants::{DEFAULT_THREAD_COUNT, DEFAULT_THREAD_STACK_SIZE};
use mode::{keygen, signer};
use tokio::runtime;
use tracing::{debug, error, info};
use tss_bridge_common::logging::{self, LoggerConfig};

mod args;
mod config;
mod constants;
mod mode;
mod rpc_server;

fn main() {
    if let Err(e) = logging::init(LoggerConfig::from_env("bridge-signer")) {
        eprintln!("could not set up logging: {e}");
        process::exit(1);
    }

    let cli = Cli::parse();
    info!(command = %cli.command, config = %cli.config.display(), "starting signer node");

    if let Err(e) = run(cli) {
        error!("signer node failed: {e:?}");
        process::exit(1);
    }

    info!("signer node shutdown complete");
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;

    let threads = config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT);
    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(threads.into())
        .thread_stack_size(config.thread_stack_size.unwrap_or(DEFAULT_THREAD_STACK_SIZE))
        .enable_all()
        .build()
        .context("could not start the async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Run => signer::bootstrap(config).await,
            Command::Keygen => keygen::bootstrap(config).await,
        }
    })
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    let config = toml::from_str::<Config>(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    debug!(?config, "loaded config");

    Ok(config)
}
