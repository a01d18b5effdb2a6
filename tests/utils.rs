use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, FixedBytes, Selector, B256, U256},
    sol_types::SolCall,
    transports::{TransportErrorKind, TransportResult},
};
use async_trait::async_trait;
use hashbrown::HashMap;

use lido_registry::{
    bindings::{
        ILido, IMulticall,
        INodeOperatorsRegistry::{
            getNodeOperatorCall, getNodeOperatorsCountCall, getSigningKeyCall,
        },
    },
    bls::{bls_secret_from_seed, sign_with_prefix},
    compute_deposit_domain,
    stats::DEFAULT_STATS_SIGNATURES,
    BlockInfo, ChainConfig, DepositMessage, Operator, Signature, SigningKey, Transport,
};

pub const LATEST_BLOCK: BlockInfo = BlockInfo { number: 7_000_000, timestamp: 1_650_000_000 };

/// Emulates the multicall, registry and Lido contracts of one chain, answering calls by
/// selector from an in-memory operator list.
#[derive(Debug)]
pub struct StubChain {
    pub config: ChainConfig,
    pub operators: Vec<Operator>,
    pub live_credentials: B256,
    /// Operator count reported instead of the length of `operators`.
    pub reported_count: Option<u64>,
    /// `eth_call` requests received, direct and aggregated.
    pub requests: AtomicUsize,
    /// Zero based index of a request that fails with a transport error.
    pub fail_request: Mutex<Option<usize>>,
    stats: HashMap<Selector, DynSolValue>,
}

impl StubChain {
    pub fn new(config: ChainConfig, operators: Vec<Operator>, live_credentials: B256) -> Self {
        let responses = [
            DynSolValue::Bool(false),
            uint(2_048_000_000_000_000_000, 256),
            DynSolValue::FixedBytes(live_credentials, 32),
            DynSolValue::Uint(U256::from(1000), 16),
            DynSolValue::Tuple(vec![
                DynSolValue::Uint(U256::from(5000), 16),
                DynSolValue::Uint(U256::from(0), 16),
                DynSolValue::Uint(U256::from(5000), 16),
            ]),
            DynSolValue::Tuple(vec![
                DynSolValue::Uint(U256::from(60_000), 256),
                DynSolValue::Uint(U256::from(59_000), 256),
                DynSolValue::Uint(U256::from(1_900_000u64), 256),
            ]),
            DynSolValue::Uint(U256::from(32), 256),
        ];
        let stats = DEFAULT_STATS_SIGNATURES
            .iter()
            .zip(responses)
            .map(|(sig, value)| (Signature::parse(sig).unwrap().selector(), value))
            .collect();

        Self {
            config,
            operators,
            live_credentials,
            reported_count: None,
            requests: AtomicUsize::new(0),
            fail_request: Mutex::new(None),
            stats,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn reset_requests(&self) {
        self.requests.store(0, Ordering::SeqCst);
    }

    pub fn fail_request(&self, request: usize) {
        *self.fail_request.lock().unwrap() = Some(request);
    }

    fn execute(&self, to: Address, data: &[u8]) -> TransportResult<Bytes> {
        let revert = || TransportErrorKind::custom_str("execution reverted");
        let selector: [u8; 4] = data.get(..4).ok_or_else(revert)?.try_into().unwrap();

        let output = if to == self.config.registry {
            if selector == getNodeOperatorsCountCall::SELECTOR {
                let count = self.reported_count.unwrap_or(self.operators.len() as u64);
                DynSolValue::Tuple(vec![uint(count, 256)])
            } else if selector == getNodeOperatorCall::SELECTOR {
                let call = getNodeOperatorCall::abi_decode(data, true).map_err(|_| revert())?;
                let op = self.operator(call._id).ok_or_else(revert)?;
                DynSolValue::Tuple(vec![
                    DynSolValue::Bool(op.active),
                    DynSolValue::String(op.name.clone()),
                    DynSolValue::Address(op.reward_address),
                    uint(op.staking_limit, 64),
                    uint(op.stopped_validators, 64),
                    uint(op.total_signing_keys, 64),
                    uint(op.used_signing_keys, 64),
                ])
            } else if selector == getSigningKeyCall::SELECTOR {
                let call = getSigningKeyCall::abi_decode(data, true).map_err(|_| revert())?;
                let op = self.operator(call._operator_id).ok_or_else(revert)?;
                let key = op.keys.get(call._index.to::<usize>()).ok_or_else(revert)?;
                DynSolValue::Tuple(vec![
                    DynSolValue::Bytes(key.key.to_vec()),
                    DynSolValue::Bytes(key.deposit_signature.to_vec()),
                    DynSolValue::Bool(key.used),
                ])
            } else {
                return Err(revert())
            }
        } else if to == self.config.lido {
            if selector == ILido::getWithdrawalCredentialsCall::SELECTOR {
                DynSolValue::Tuple(vec![DynSolValue::FixedBytes(self.live_credentials, 32)])
            } else {
                let value = self.stats.get(&Selector::from(selector)).ok_or_else(revert)?;
                match value {
                    DynSolValue::Tuple(_) => value.clone(),
                    _ => DynSolValue::Tuple(vec![value.clone()]),
                }
            }
        } else {
            return Err(revert())
        };

        Ok(output.abi_encode_params().into())
    }

    fn operator(&self, id: U256) -> Option<&Operator> {
        self.operators.iter().find(|op| U256::from(op.id) == id)
    }
}

#[async_trait]
impl Transport for StubChain {
    async fn chain_id(&self) -> TransportResult<u64> {
        Ok(self.config.chain_id)
    }

    async fn call(&self, to: Address, data: Bytes) -> TransportResult<Bytes> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst);
        if *self.fail_request.lock().unwrap() == Some(request) {
            return Err(TransportErrorKind::custom_str("connection reset"))
        }

        if to != self.config.multicall {
            return self.execute(to, &data)
        }

        let calls = IMulticall::aggregateCall::abi_decode(&data, true)
            .map_err(|_| TransportErrorKind::custom_str("execution reverted"))?
            .calls;
        let outputs = calls
            .iter()
            .map(|call| {
                let output = self.execute(call.target, &call.callData)?;
                Ok(DynSolValue::Bytes(output.to_vec()))
            })
            .collect::<TransportResult<Vec<_>>>()?;

        let response = DynSolValue::Tuple(vec![
            uint(LATEST_BLOCK.number, 256),
            DynSolValue::Array(outputs),
        ]);

        Ok(response.abi_encode_params().into())
    }

    async fn latest_block(&self) -> TransportResult<BlockInfo> {
        Ok(LATEST_BLOCK)
    }
}

fn uint(value: u64, bits: usize) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), bits)
}

/// A key deterministically derived from `seed`, signed for `credentials` on the chain of
/// `config`.
pub fn signed_key(
    config: &ChainConfig,
    seed: u64,
    index: u64,
    credentials: B256,
    used: bool,
) -> SigningKey {
    let mut ikm = [0u8; 32];
    ikm[..8].copy_from_slice(&seed.to_be_bytes());
    ikm[8..].fill(0x42);

    let secret = bls_secret_from_seed(ikm);
    let pubkey = FixedBytes::<48>::from(secret.sk_to_pk().compress());
    let domain = compute_deposit_domain(config.genesis_fork_version);
    let root = DepositMessage::new(pubkey, credentials).signing_root(domain);
    let signature = sign_with_prefix(&secret, root).compress();

    SigningKey::new(
        index,
        Bytes::copy_from_slice(pubkey.as_slice()),
        Bytes::copy_from_slice(&signature),
        used,
    )
}

/// `count` operators with `keys` keys each, all signed for `credentials`. Every key is
/// distinct.
pub fn operators(config: &ChainConfig, count: u64, keys: u64, credentials: B256) -> Vec<Operator> {
    (0..count)
        .map(|id| Operator {
            id,
            active: true,
            name: format!("operator-{id}"),
            reward_address: Address::repeat_byte(id as u8 + 1),
            staking_limit: keys,
            total_signing_keys: keys,
            used_signing_keys: keys / 2,
            keys: (0..keys)
                .map(|index| {
                    let used = index < keys / 2;
                    signed_key(config, id * 1000 + index, index, credentials, used)
                })
                .collect(),
            ..Default::default()
        })
        .collect()
}

/// Operator records as the registry reports them, before keys are fetched.
pub fn without_keys(operators: &[Operator]) -> Vec<Operator> {
    operators.iter().map(|op| Operator { keys: Vec::new(), ..op.clone() }).collect()
}

/// Operator records as fetched from the registry, before validation.
pub fn unvalidated(operators: &[Operator]) -> Vec<Operator> {
    operators
        .iter()
        .map(|op| Operator {
            keys: op
                .keys
                .iter()
                .map(|k| {
                    SigningKey::new(k.index, k.key.clone(), k.deposit_signature.clone(), k.used)
                })
                .collect(),
            ..op.clone()
        })
        .collect()
}
