#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations, missing_docs, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod common;
pub use common::{
    AbiError, ConfigError, DuplicateEntry, Error, MulticallError, Operator, RegistryError,
    SigningKey,
};

pub mod abi;
pub use abi::{json::AbiOverride, Call, Signature};

pub mod bindings;

pub mod config;
pub use config::{Chain, ChainConfig};

pub mod transport;
pub use transport::{BlockInfo, HttpTransport, Transport};

pub mod multicall;
pub use multicall::{Callable, Multicall, TypedCall};

mod primitives;
pub use primitives::{
    bls, compute_deposit_domain, compute_domain, compute_signing_root, DepositMessage,
    DEPOSIT_AMOUNT_GWEI, DOMAIN_DEPOSIT,
};

mod registry;
pub use registry::{
    ContractRegistry, FilesystemRegistry, Registry, DEFAULT_KEYS_BATCH_SIZE, MAX_OPERATORS,
};

mod validator;
pub use validator::{
    KeyValidator, Validation, ValidationContext, ValidationMode, ValidationSummary,
    WithdrawalPolicy,
};

mod duplicates;
pub use duplicates::find_duplicates;

pub mod stats;
pub use stats::{DataActuality, Stats, StatsReader};

mod client;
pub use client::{Lido, LidoOptions};
