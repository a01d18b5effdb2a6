use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument};

use crate::{
    abi::json::AbiOverride,
    bindings::{signatures, INodeOperatorsRegistry},
    common::{ConfigError, Operator, RegistryError, SigningKey},
    multicall::{call_single, Multicall, TypedCall},
};

use INodeOperatorsRegistry::{
    getNodeOperatorCall, getNodeOperatorReturn, getNodeOperatorsCountCall, getSigningKeyCall,
    getSigningKeyReturn,
};

/// Default number of `getSigningKey` calls per aggregated request. Key responses are much
/// larger than operator responses, so this is lower than the aggregator default.
pub const DEFAULT_KEYS_BATCH_SIZE: usize = 100;

/// Operator counts at or above this are treated as a broken registry.
pub const MAX_OPERATORS: u64 = 1_000_000;

/// Reads operators and their keys from the on-chain node operators registry.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    multicall: Multicall,
    address: Address,
    max_multicall: usize,
}

impl ContractRegistry {
    /// Creates a new reader for the registry deployed at `address`.
    pub fn new(multicall: Multicall, address: Address) -> Self {
        Self { multicall, address, max_multicall: DEFAULT_KEYS_BATCH_SIZE }
    }

    /// Sets the number of key calls per aggregated request.
    pub fn with_max_multicall(mut self, max_multicall: usize) -> Result<Self, ConfigError> {
        if max_multicall == 0 {
            return Err(ConfigError::InvalidBatchSize)
        }
        self.max_multicall = max_multicall;

        Ok(self)
    }

    /// Checks that a deployment specific ABI agrees with the layouts this reader decodes.
    pub fn with_abi_override(self, abi: &AbiOverride) -> Result<Self, ConfigError> {
        for signature in [
            signatures::GET_NODE_OPERATORS_COUNT,
            signatures::GET_NODE_OPERATOR,
            signatures::GET_SIGNING_KEY,
        ] {
            abi.check(signature)?;
        }

        Ok(self)
    }

    /// The registry contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The number of key calls per aggregated request.
    pub fn max_multicall(&self) -> usize {
        self.max_multicall
    }

    /// Gets the number of registered operators.
    pub async fn get_operators_count(&self) -> Result<u64, RegistryError> {
        let call = TypedCall::new(self.address, getNodeOperatorsCountCall {});
        let count = call_single(self.multicall.transport().as_ref(), &call).await?._0;

        if count >= U256::from(MAX_OPERATORS) {
            return Err(RegistryError::TooManyOperators(count))
        }

        Ok(count.to())
    }

    /// Gets all operators, without keys. Operator ids are `0..count`.
    #[instrument(skip(self), fields(registry = %self.address))]
    pub async fn fetch_operators(&self) -> Result<Vec<Operator>, RegistryError> {
        let count = self.get_operators_count().await?;
        debug!(count, "Fetching operators");

        let calls = (0..count)
            .map(|id| {
                TypedCall::new(
                    self.address,
                    getNodeOperatorCall { _id: U256::from(id), _fullInfo: true },
                )
            })
            .collect::<Vec<_>>();

        let operators = self.multicall.aggregate(&calls).await?;

        Ok((0..count).zip(operators).map(|(id, info)| operator_from_info(id, info)).collect())
    }

    /// Attaches all keys to each operator, `max_multicall` key calls per request.
    ///
    /// Requests never mix keys of different operators. Keys are indexed by their position
    /// in the request order.
    #[instrument(skip(self, operators), fields(operators = operators.len()))]
    pub async fn fetch_keys(
        &self,
        mut operators: Vec<Operator>,
        max_multicall: usize,
    ) -> Result<Vec<Operator>, RegistryError> {
        for operator in operators.iter_mut() {
            let total = operator.total_signing_keys;
            let calls = (0..total)
                .map(|index| {
                    TypedCall::new(
                        self.address,
                        getSigningKeyCall {
                            _operator_id: U256::from(operator.id),
                            _index: U256::from(index),
                        },
                    )
                })
                .collect::<Vec<_>>();

            let keys = self.multicall.aggregate_with(&calls, max_multicall).await?;
            operator.keys =
                (0..total).zip(keys).map(|(index, key)| signing_key(index, key)).collect();

            if !operator.has_all_keys() {
                return Err(RegistryError::IncompleteKeys {
                    operator: operator.id,
                    expected: total,
                    got: operator.keys.len() as u64,
                })
            }
            debug!(operator = operator.id, keys = total, "Fetched keys");
        }

        let keys = operators.iter().map(|op| op.keys.len()).sum::<usize>();
        info!(keys, "Fetched signing keys");

        Ok(operators)
    }
}

fn operator_from_info(id: u64, info: getNodeOperatorReturn) -> Operator {
    Operator {
        id,
        active: info.active,
        name: info.name,
        reward_address: info.rewardAddress,
        staking_limit: info.stakingLimit,
        stopped_validators: info.stoppedValidators,
        total_signing_keys: info.totalSigningKeys,
        used_signing_keys: info.usedSigningKeys,
        keys: Vec::new(),
    }
}

fn signing_key(index: u64, key: getSigningKeyReturn) -> SigningKey {
    SigningKey::new(index, key.key, key.depositSignature, key.used)
}
