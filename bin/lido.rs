use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use url::Url;

use lido_registry::{
    AbiOverride, ChainConfig, FilesystemRegistry, HttpTransport, Lido, LidoOptions, Registry,
    ValidationMode, WithdrawalPolicy,
};

#[derive(Debug, Parser)]
#[clap(name = "lido", about = "Inspect the Lido node operators registry")]
struct CliOpts {
    #[clap(long, env = "LIDO_RPC_URL")]
    pub rpc_url: Url,
    #[clap(long, env = "LIDO_REGISTRY_ADDRESS")]
    pub registry_address: Option<Address>,
    #[clap(long, env = "LIDO_ADDRESS")]
    pub lido_address: Option<Address>,
    /// JSON chain configuration for deployments on other chains.
    #[clap(long, env = "LIDO_CHAIN_CONFIG")]
    pub chain_config: Option<PathBuf>,
    /// JSON ABI of the registry, checked against the built-in layouts.
    #[clap(long, env = "LIDO_REGISTRY_ABI")]
    pub registry_abi: Option<PathBuf>,
    /// Signing key calls per aggregated request.
    #[clap(long, env = "LIDO_MAX_MULTICALL")]
    pub max_multicall: Option<usize>,
    /// Write the result to this file instead of stdout.
    #[clap(long, global = true)]
    pub output: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List operators, without keys.
    Operators,
    /// List operators with all of their signing keys.
    Keys,
    /// Fetch all keys, check their signatures and look for duplicates.
    Validate {
        /// Only accept signatures for the live withdrawal credentials.
        #[clap(long)]
        strict: bool,
        /// Check keys on a single thread.
        #[clap(long)]
        serial: bool,
        /// Start from a previous `keys` or `validate` output instead of the registry.
        #[clap(long)]
        cache: Option<PathBuf>,
    },
    /// Show Lido contract figures.
    Stats,
}

impl CliOpts {
    fn lido_options(&self) -> eyre::Result<LidoOptions> {
        Ok(LidoOptions {
            lido_address: self.lido_address,
            registry_address: self.registry_address,
            max_multicall: self.max_multicall,
            chain_config: self.chain_config.as_ref().map(ChainConfig::from_file).transpose()?,
            registry_abi: self.registry_abi.as_ref().map(AbiOverride::from_file).transpose()?,
        })
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt().with_writer(io::stderr).try_init();
    let opts = CliOpts::parse();

    let transport = Arc::new(HttpTransport::new(opts.rpc_url.clone()));
    let lido = Lido::connect(transport, opts.lido_options()?).await?;

    match &opts.command {
        Command::Operators => {
            let operators = lido.fetch_operators().await?;
            emit(&operators, opts.output.as_ref())?;
        }
        Command::Keys => {
            let operators = lido.fetch_operators().await?;
            let operators = lido.fetch_keys(operators).await?;
            emit(&operators, opts.output.as_ref())?;
        }
        Command::Validate { strict, serial, cache } => {
            let policy = if *strict { WithdrawalPolicy::Strict } else { WithdrawalPolicy::Loose };
            let mode = if *serial { ValidationMode::Serial } else { ValidationMode::Pooled };

            let operators = if let Some(cache) = cache {
                let snapshot = FilesystemRegistry::read_from_file(cache.clone())?;
                info!(path = %cache.display(), "Loaded snapshot");
                let operators = snapshot.operators_with_keys().await?;
                lido.validate_and_deduplicate(operators, policy, mode).await?
            } else {
                lido.fetch_and_validate(policy, mode).await?
            };

            let invalid = operators
                .iter()
                .flat_map(|op| &op.keys)
                .filter(|key| key.valid_signature == Some(false))
                .count();
            let duplicates =
                operators.iter().flat_map(|op| &op.keys).filter(|key| key.duplicate).count();
            info!(operators = operators.len(), invalid, duplicates, "Validation done");

            emit(&operators, opts.output.as_ref())?;
        }
        Command::Stats => {
            let stats = lido.fetch_stats().await?;
            emit(&stats, opts.output.as_ref())?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(value: &T, output: Option<&PathBuf>) -> eyre::Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}
