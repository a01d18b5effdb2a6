use std::path::PathBuf;

use alloy::primitives::{Address, Bytes, FixedBytes, B256};
use clap::Parser;
use eyre::eyre;

use lido_registry::{
    bls::{random_bls_secret, sign_with_prefix},
    compute_deposit_domain, Chain, DepositMessage, FilesystemRegistry, Operator, SigningKey,
};

/// Writes an operator snapshot with freshly generated, correctly signed keys.
#[derive(Debug, Parser)]
struct CliOpts {
    #[clap(long, default_value = "5")]
    pub chain_id: u64,
    /// Defaults to the first known credentials of the chain.
    #[clap(long)]
    pub withdrawal_credentials: Option<B256>,
    #[clap(long, default_value = "3")]
    pub operators: u64,
    #[clap(long, default_value = "10")]
    pub keys: u64,
    #[clap(long, default_value = "operators.json")]
    pub output: PathBuf,
}

fn main() -> eyre::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let opts = CliOpts::parse();

    let chain = Chain::try_from(opts.chain_id)?;
    let credentials = match opts.withdrawal_credentials {
        Some(credentials) => credentials,
        None => chain
            .withdrawal_credentials()
            .first()
            .copied()
            .ok_or_else(|| eyre!("No known withdrawal credentials for {}", chain.name()))?,
    };
    let domain = compute_deposit_domain(chain.genesis_fork_version());

    let operators = (0..opts.operators)
        .map(|id| {
            let keys = (0..opts.keys)
                .map(|index| {
                    let secret = random_bls_secret();
                    let pubkey = FixedBytes::<48>::from(secret.sk_to_pk().compress());
                    let root = DepositMessage::new(pubkey, credentials).signing_root(domain);
                    let signature = sign_with_prefix(&secret, root).compress();

                    SigningKey::new(
                        index,
                        Bytes::copy_from_slice(pubkey.as_slice()),
                        Bytes::copy_from_slice(&signature),
                        true,
                    )
                })
                .collect();

            Operator {
                id,
                active: true,
                name: format!("lido-operator-{id}"),
                reward_address: Address::repeat_byte(id as u8 + 1),
                staking_limit: opts.keys,
                stopped_validators: 0,
                total_signing_keys: opts.keys,
                used_signing_keys: opts.keys,
                keys,
            }
        })
        .collect();

    let snapshot = FilesystemRegistry::write_to_file(opts.output, operators)?;
    tracing::info!(path = %snapshot.path.display(), chain = chain.name(), "Wrote snapshot");

    Ok(())
}
