//! Parses command-line arguments for the signer node.

use std::{fmt::Display, path::PathBuf};

use clap::{crate_version, Parser, ValueEnum};

#[derive(Debug, Parser)]
#[clap(
    name = "bridge-signer",
    about = "A threshold signer node of the cross-chain bridge",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[arg(
        value_enum,
        help = "Whether to sign withdrawals (`run`) or generate the group key (`keygen`)",
        default_value_t = Command::Run
    )]
    pub command: Command,

    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the node",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Command {
    /// Run the signing sessions, deposit distribution and the API.
    Run,

    /// Run key generation once and write the resulting share.
    Keygen,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Run => write!(f, "run"),
            Command::Keygen => write!(f, "keygen"),
        }
    }
}
