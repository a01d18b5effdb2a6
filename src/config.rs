//! Chain metadata: contract addresses, fork versions and withdrawal credentials.

use std::{fs::File, io::BufReader, path::Path};

use alloy::primitives::{address, b256, fixed_bytes, Address, FixedBytes, B256};
use serde::{Deserialize, Serialize};

use crate::common::ConfigError;

/// Chains with a known Lido deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ethereum mainnet.
    Mainnet,
    /// Ropsten testnet.
    Ropsten,
    /// Goerli testnet, paired with the Prater beacon chain.
    Goerli,
}

impl Chain {
    /// Returns the execution layer chain id.
    pub const fn id(&self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Ropsten => 3,
            Chain::Goerli => 5,
        }
    }

    /// Readable network name.
    pub const fn name(&self) -> &'static str {
        match self {
            Chain::Mainnet => "mainnet",
            Chain::Ropsten => "ropsten",
            Chain::Goerli => "goerli",
        }
    }

    /// Name of the paired beacon chain.
    pub const fn beacon_name(&self) -> &'static str {
        match self {
            Chain::Mainnet => "mainnet",
            Chain::Ropsten => "ropsten",
            Chain::Goerli => "prater",
        }
    }

    /// Genesis fork version of the paired beacon chain, used for the deposit domain.
    pub const fn genesis_fork_version(&self) -> FixedBytes<4> {
        match self {
            Chain::Mainnet => fixed_bytes!("00000000"),
            Chain::Ropsten => fixed_bytes!("80000069"),
            Chain::Goerli => fixed_bytes!("00001020"),
        }
    }

    /// Address of the well-known multicall aggregator contract.
    pub const fn multicall_address(&self) -> Address {
        match self {
            Chain::Mainnet => address!("eefBa1e63905eF1D7ACbA5a8513c70307C1cE441"),
            Chain::Ropsten => address!("53C43764255c17BD724F74c4eF150724AC50a3ed"),
            Chain::Goerli => address!("77dCa2C955b15e9dE4dbBCf1246B4B85b651e50e"),
        }
    }

    /// Address of the Lido contract.
    pub const fn lido_address(&self) -> Address {
        match self {
            Chain::Mainnet => address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
            Chain::Ropsten => address!("d40EefCFaB888C9159a61221def03bF77773FC19"),
            Chain::Goerli => address!("1643E812aE58766192Cf7D2Cf9567dF2C37e9B7F"),
        }
    }

    /// Address of the node operators registry contract.
    pub const fn registry_address(&self) -> Address {
        match self {
            Chain::Mainnet => address!("55032650b14df07b85bF18A3a3eC8E0Af2e028d5"),
            Chain::Ropsten => address!("32c6f34F3920E8c0074241619c02be2fB722a68d"),
            Chain::Goerli => address!("9D4AF1Ee19Dad8857db3a45B0374c81c8A1C6320"),
        }
    }

    /// Withdrawal credentials that have been in use on this chain at some point.
    ///
    /// Used keys may have been signed against any of them.
    pub fn withdrawal_credentials(&self) -> Vec<B256> {
        match self {
            Chain::Mainnet => {
                vec![b256!("009690e5d4472c7c0dbdf490425d89862535d2a52fb686333f3a0a9ff5d2125e")]
            }
            Chain::Goerli => {
                vec![b256!("00040517ce98f81070cea20e35610a3ae23a45f0883b0b035afc5717cc2e833e")]
            }
            Chain::Ropsten => vec![
                b256!("01000000000000000000000002139137fdd974181a49268d7b0ae888634e5469"),
                b256!("000000000000000000000000ff139137fdd974181a49268d7b0ae888634e5469"),
                b256!("000000000000000000000000aa139137fdd974181a49268d7b0ae888634e5469"),
                b256!("010000000000000000000000aa139137fdd974181a49268d7b0ae888634e5469"),
                b256!("73c72beecbd832c9ce342e61a772c8cfe6f1c6d661b19a98317b5dac05ce9685"),
            ],
        }
    }
}

impl TryFrom<u64> for Chain {
    type Error = ConfigError;

    fn try_from(chain_id: u64) -> Result<Self, Self::Error> {
        match chain_id {
            1 => Ok(Chain::Mainnet),
            3 => Ok(Chain::Ropsten),
            5 => Ok(Chain::Goerli),
            other => Err(ConfigError::UnsupportedChain(other)),
        }
    }
}

/// Everything chain specific the pipeline needs, passed explicitly to each component.
///
/// Built from a known [`Chain`], or loaded from a JSON file for non-default deployments:
///
/// ```json
/// {
///   "chainId": 5,
///   "multicall": "0x77dCa2C955b15e9dE4dbBCf1246B4B85b651e50e",
///   "lido": "0x1643E812aE58766192Cf7D2Cf9567dF2C37e9B7F",
///   "registry": "0x9D4AF1Ee19Dad8857db3a45B0374c81c8A1C6320",
///   "genesisForkVersion": "0x00001020",
///   "withdrawalCredentials": ["0x00040517ce98f81070cea20e35610a3ae23a45f0883b0b035afc5717cc2e833e"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Execution layer chain id.
    pub chain_id: u64,
    /// Multicall aggregator contract.
    pub multicall: Address,
    /// Lido contract.
    pub lido: Address,
    /// Node operators registry contract.
    pub registry: Address,
    /// Genesis fork version of the beacon chain.
    pub genesis_fork_version: FixedBytes<4>,
    /// Historically known withdrawal credentials.
    #[serde(default)]
    pub withdrawal_credentials: Vec<B256>,
}

impl ChainConfig {
    /// Returns the default configuration of a known chain.
    pub fn for_chain_id(chain_id: u64) -> Result<Self, ConfigError> {
        Chain::try_from(chain_id).map(Self::from)
    }

    /// Loads a configuration from a JSON file and checks it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    /// Overrides the Lido contract address.
    pub fn with_lido(mut self, lido: Address) -> Self {
        self.lido = lido;
        self
    }

    /// Overrides the registry contract address.
    pub fn with_registry(mut self, registry: Address) -> Self {
        self.registry = registry;
        self
    }

    /// Checks that no contract address is left unset.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multicall.is_zero() {
            return Err(ConfigError::MissingMulticall(self.chain_id))
        }
        if self.lido.is_zero() {
            return Err(ConfigError::MissingAddress { contract: "lido", chain_id: self.chain_id })
        }
        if self.registry.is_zero() {
            return Err(ConfigError::MissingAddress {
                contract: "registry",
                chain_id: self.chain_id,
            })
        }

        Ok(())
    }
}

impl From<Chain> for ChainConfig {
    fn from(chain: Chain) -> Self {
        Self {
            chain_id: chain.id(),
            multicall: chain.multicall_address(),
            lido: chain.lido_address(),
            registry: chain.registry_address(),
            genesis_fork_version: chain.genesis_fork_version(),
            withdrawal_credentials: chain.withdrawal_credentials(),
        }
    }
}
