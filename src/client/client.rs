use std::sync::Arc;

use alloy::primitives::{Address, B256};
use rayon::ThreadPool;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::{
    abi::json::AbiOverride,
    bindings::ILido,
    common::{ConfigError, Error, Operator},
    config::ChainConfig,
    duplicates,
    multicall::{call_single, Multicall, TypedCall},
    registry::ContractRegistry,
    stats::{Stats, StatsReader},
    transport::Transport,
    validator::{
        default_threads, worker_pool, KeyValidator, ValidationContext, ValidationMode,
        ValidationSummary, WithdrawalPolicy,
    },
};

/// Overrides applied on top of the chain defaults by [`Lido::connect`].
#[derive(Debug, Clone, Default)]
pub struct LidoOptions {
    /// Lido contract address.
    pub lido_address: Option<Address>,
    /// Node operators registry address.
    pub registry_address: Option<Address>,
    /// Number of `getSigningKey` calls per aggregated request.
    pub max_multicall: Option<usize>,
    /// Full chain configuration, replacing the built-in one.
    pub chain_config: Option<ChainConfig>,
    /// Registry ABI of a non-default deployment, checked against the static layouts.
    pub registry_abi: Option<AbiOverride>,
}

/// Reads, validates and cross-checks the node operators of one Lido deployment.
///
/// The stages can be run one by one, each taking the operators produced by the previous
/// stage, or all at once with [`Lido::fetch_and_validate`].
#[derive(Debug, Clone)]
pub struct Lido {
    config: ChainConfig,
    multicall: Multicall,
    registry: ContractRegistry,
    stats: StatsReader,
    /// Built on first pooled validation, then shared by every validator of this client.
    pool: Arc<OnceCell<Arc<ThreadPool>>>,
}

impl Lido {
    /// Builds a client for the chain the transport is connected to.
    ///
    /// Fails before any contract is read if the chain is unknown and no configuration was
    /// given, or if the given configuration is for another chain.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        options: LidoOptions,
    ) -> Result<Self, Error> {
        let chain_id = transport.chain_id().await?;

        let mut config = match options.chain_config {
            Some(config) if config.chain_id != chain_id => {
                let expected = config.chain_id;
                return Err(ConfigError::ChainMismatch { expected, got: chain_id }.into())
            }
            Some(config) => config,
            None => ChainConfig::for_chain_id(chain_id)?,
        };
        if let Some(lido) = options.lido_address {
            config = config.with_lido(lido);
        }
        if let Some(registry) = options.registry_address {
            config = config.with_registry(registry);
        }

        let mut lido = Self::new(transport, config)?;
        if let Some(max_multicall) = options.max_multicall {
            lido.registry = lido.registry.with_max_multicall(max_multicall)?;
        }
        if let Some(abi) = &options.registry_abi {
            lido.registry = lido.registry.with_abi_override(abi)?;
        }

        info!(chain_id, registry = %lido.config.registry, lido = %lido.config.lido, "Connected");

        Ok(lido)
    }

    /// Builds a client from an explicit configuration, without contacting the node.
    pub fn new(transport: Arc<dyn Transport>, config: ChainConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let multicall = Multicall::new(transport, config.multicall);
        let registry = ContractRegistry::new(multicall.clone(), config.registry);
        let stats = StatsReader::new(multicall.clone(), config.lido);

        Ok(Self { config, multicall, registry, stats, pool: Arc::new(OnceCell::new()) })
    }

    /// The active chain configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The call aggregator.
    pub fn multicall(&self) -> &Multicall {
        &self.multicall
    }

    /// The registry reader.
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Fetches all operators, without keys.
    pub async fn fetch_operators(&self) -> Result<Vec<Operator>, Error> {
        Ok(self.registry.fetch_operators().await?)
    }

    /// Attaches all signing keys to `operators`.
    pub async fn fetch_keys(&self, operators: Vec<Operator>) -> Result<Vec<Operator>, Error> {
        Ok(self.registry.fetch_keys(operators, self.registry.max_multicall()).await?)
    }

    /// The withdrawal credentials currently set in the Lido contract.
    pub async fn live_withdrawal_credentials(&self) -> Result<B256, Error> {
        let call = TypedCall::new(self.config.lido, ILido::getWithdrawalCredentialsCall {});
        let credentials = call_single(self.multicall.transport().as_ref(), &call).await?._0;

        Ok(credentials)
    }

    /// Builds a key validator for the live withdrawal credentials, running on the worker
    /// pool of this client.
    pub async fn key_validator(&self, policy: WithdrawalPolicy) -> Result<KeyValidator, Error> {
        self.validator_for(policy, ValidationMode::Pooled).await
    }

    async fn validator_for(
        &self,
        policy: WithdrawalPolicy,
        mode: ValidationMode,
    ) -> Result<KeyValidator, Error> {
        let live = self.live_withdrawal_credentials().await?;
        if !self.config.withdrawal_credentials.contains(&live) {
            warn!(%live, "Live withdrawal credentials are not among the known ones");
        }
        let context = ValidationContext::from_config(&self.config, live, policy);

        match mode {
            ValidationMode::Serial => Ok(KeyValidator::serial(context)),
            ValidationMode::Pooled => {
                Ok(KeyValidator::with_pool(context, self.worker_pool().await?))
            }
        }
    }

    async fn worker_pool(&self) -> Result<Arc<ThreadPool>, ConfigError> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                let threads = default_threads();
                debug!(threads, "Starting key validation pool");
                worker_pool(threads).map(Arc::new)
            })
            .await?;

        Ok(pool.clone())
    }

    /// Validates all keys off the async runtime.
    #[instrument(skip_all, fields(operators = operators.len(), ?mode))]
    pub async fn validate_keys(
        &self,
        mut operators: Vec<Operator>,
        validator: &KeyValidator,
        mode: ValidationMode,
    ) -> Result<(Vec<Operator>, ValidationSummary), Error> {
        let validator = validator.clone();

        let result = tokio::task::spawn_blocking(move || {
            let summary = validator.validate(&mut operators, mode);
            (operators, summary)
        })
        .await?;

        Ok(result)
    }

    /// Validates all keys on the worker pool with the default policy.
    pub async fn validate_keys_pooled(
        &self,
        operators: Vec<Operator>,
    ) -> Result<Vec<Operator>, Error> {
        let validator = self.key_validator(WithdrawalPolicy::default()).await?;
        Ok(self.validate_keys(operators, &validator, ValidationMode::Pooled).await?.0)
    }

    /// Validates all keys on a single thread with the default policy.
    pub async fn validate_keys_serial(
        &self,
        operators: Vec<Operator>,
    ) -> Result<Vec<Operator>, Error> {
        let mode = ValidationMode::Serial;
        let validator = self.validator_for(WithdrawalPolicy::default(), mode).await?;
        Ok(self.validate_keys(operators, &validator, mode).await?.0)
    }

    /// Annotates every key with the other locations of the same key.
    pub fn find_duplicates(&self, mut operators: Vec<Operator>) -> Vec<Operator> {
        duplicates::find_duplicates(&mut operators);
        operators
    }

    /// Runs every stage: operators, keys, signature validation and duplicate detection.
    pub async fn fetch_and_validate(
        &self,
        policy: WithdrawalPolicy,
        mode: ValidationMode,
    ) -> Result<Vec<Operator>, Error> {
        let operators = self.fetch_operators().await?;
        let operators = self.fetch_keys(operators).await?;
        self.validate_and_deduplicate(operators, policy, mode).await
    }

    /// Runs validation and duplicate detection on operators that already have their keys,
    /// such as a loaded snapshot. Keys with a verdict are not checked again.
    pub async fn validate_and_deduplicate(
        &self,
        operators: Vec<Operator>,
        policy: WithdrawalPolicy,
        mode: ValidationMode,
    ) -> Result<Vec<Operator>, Error> {
        let validator = self.validator_for(policy, mode).await?;
        let (operators, _) = self.validate_keys(operators, &validator, mode).await?;

        Ok(self.find_duplicates(operators))
    }

    /// Fetches the Lido contract figures.
    pub async fn fetch_stats(&self) -> Result<Stats, Error> {
        Ok(self.stats.fetch().await?)
    }
}
