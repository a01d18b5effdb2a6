use alloy::{
    primitives::{Address, Bytes, U256},
    transports::TransportError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A node operator as registered in the node operators registry.
///
/// Records are created fresh for every fetch and enriched in place by the later
/// pipeline stages: keys are attached, then validity flags, then duplicate flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    /// Registry-assigned operator id. Never reused.
    pub id: u64,
    /// Whether the operator is active.
    pub active: bool,
    /// Human readable operator name.
    pub name: String,
    /// Address receiving the operator rewards.
    pub reward_address: Address,
    /// Maximum number of keys the operator is allowed to have deposited.
    pub staking_limit: u64,
    /// Number of validators that were stopped.
    pub stopped_validators: u64,
    /// Number of signing keys the registry holds for this operator.
    pub total_signing_keys: u64,
    /// Number of signing keys already deposited.
    pub used_signing_keys: u64,
    /// Signing keys, indexed `0..total_signing_keys`. Empty until fetched.
    #[serde(default)]
    pub keys: Vec<SigningKey>,
}

impl Operator {
    /// An operator is approved when it has a non-zero staking limit.
    pub fn approved(&self) -> bool {
        self.staking_limit != 0
    }

    /// Returns true if all `total_signing_keys` keys are attached.
    pub fn has_all_keys(&self) -> bool {
        self.keys.len() as u64 == self.total_signing_keys
    }
}

/// A single validator signing key of an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Position of the key within its operator.
    pub index: u64,
    /// The BLS public key, as returned by the registry (48 bytes when well formed).
    pub key: Bytes,
    /// The BLS deposit signature (96 bytes when well formed).
    #[serde(rename = "depositSignature")]
    pub deposit_signature: Bytes,
    /// Whether the key has already been deposited.
    pub used: bool,
    /// Result of the deposit signature check. `None` until checked; once set it is
    /// authoritative and never recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_signature: Option<bool>,
    /// True if at least one other location in the registry holds the same key bytes.
    #[serde(default)]
    pub duplicate: bool,
    /// Every other location holding the same key bytes.
    #[serde(default)]
    pub duplicates: Vec<DuplicateEntry>,
}

impl SigningKey {
    /// Creates a fresh, unvalidated signing key record.
    pub fn new(index: u64, key: Bytes, deposit_signature: Bytes, used: bool) -> Self {
        Self { index, key, deposit_signature, used, ..Default::default() }
    }
}

/// A reference to another key sharing the same raw public key bytes.
///
/// `approved` and `used` describe the *matching* operator and key, not the key
/// carrying this entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    /// Id of the operator holding the matching key.
    pub op_id: u64,
    /// Name of the operator holding the matching key.
    pub op_name: String,
    /// Index of the matching key within its operator.
    pub index: u64,
    /// Whether the matching operator is approved (`stakingLimit != 0`).
    pub approved: bool,
    /// Whether the matching key is used.
    pub used: bool,
}

impl DuplicateEntry {
    /// Describes `key` of `operator` as a duplicate location.
    pub fn new(operator: &Operator, key: &SigningKey) -> Self {
        Self {
            op_id: operator.id,
            op_name: operator.name.clone(),
            index: key.index,
            approved: operator.approved(),
            used: key.used,
        }
    }
}

/// Errors raised while encoding calls or decoding contract responses.
///
/// These are protocol errors: they are never retried.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AbiError {
    #[error("Malformed function signature: {0:?}")]
    MalformedSignature(String),
    #[error("Unknown ABI type {ty:?}: {source}")]
    UnknownType {
        ty: String,
        #[source]
        source: alloy::dyn_abi::Error,
    },
    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("Argument {index} does not match type {ty}")]
    ArgumentType { index: usize, ty: String },
    #[error("Response length mismatch: declared outputs take {expected} bytes, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("Non-canonical encoding of {0}")]
    NonCanonical(String),
    #[error("Unexpected value for {name}, expected {expected}")]
    UnexpectedValue { name: String, expected: &'static str },
    #[error("Failed to decode response: {0}")]
    Decode(#[from] alloy::dyn_abi::Error),
    #[error("Failed to decode typed response: {0}")]
    SolDecode(#[from] alloy::sol_types::Error),
}

/// Errors raised while building components from configuration.
///
/// Any of these prevents the pipeline from running.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("Unsupported chain id {0}")]
    UnsupportedChain(u64),
    #[error("No multicall contract configured for chain {0}")]
    MissingMulticall(u64),
    #[error("No {contract} contract address configured for chain {chain_id}")]
    MissingAddress { contract: &'static str, chain_id: u64 },
    #[error("Chain config is for chain {expected}, but the node reports chain {got}")]
    ChainMismatch { expected: u64, got: u64 },
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,
    #[error("ABI override has no function {0:?}")]
    MissingFunction(String),
    #[error("ABI override layout of {function} does not match {expected}")]
    AbiMismatch { function: String, expected: String },
    #[error("Invalid signature in configuration: {0}")]
    Abi(#[from] AbiError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors raised by the call aggregator.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum MulticallError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),
    #[error("Aggregator returned {got} responses for a batch of {expected} calls")]
    ResponseCount { expected: usize, got: usize },
    #[error("Output name {0:?} is used by more than one call")]
    DuplicateKey(String),
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,
}

/// Errors raised while reading the registry.
///
/// Any of these aborts the whole fetch; no partial operator list is returned.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum RegistryError {
    #[error("Multicall error: {0}")]
    Multicall(#[from] MulticallError),
    #[error("Registry reports an implausible operator count: {0}")]
    TooManyOperators(U256),
    #[error("Operator {operator} has {got} keys attached, expected {expected}")]
    IncompleteKeys { operator: u64, expected: u64, got: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error of the [`crate::Lido`] pipeline.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Multicall error: {0}")]
    Multicall(#[from] MulticallError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Validation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
