//! Protocol level figures read from the Lido contract.

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, U256},
};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    abi::Call,
    common::{AbiError, MulticallError},
    multicall::Multicall,
};

/// Functions read by [`StatsReader::fetch`].
pub const DEFAULT_STATS_SIGNATURES: [&str; 7] = [
    "isStopped()(bool)",
    "getTotalPooledEther()(uint256)",
    "getWithdrawalCredentials()(bytes32)",
    "getFee()(uint16)",
    "getFeeDistribution()(uint16,uint16,uint16)",
    "getBeaconStat()(uint256,uint256,uint256)",
    "getBufferedEther()(uint256)",
];

/// The block a set of figures was read at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataActuality {
    /// Latest block number.
    pub last_block: u64,
    /// Latest block timestamp, in seconds.
    pub last_blocktime: u64,
}

/// Split of the protocol fee, in basis points of the fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FeeDistribution {
    pub treasury_fee_basis_points: u16,
    pub insurance_fee_basis_points: u16,
    pub operators_fee_basis_points: u16,
}

/// Validator figures reported by the beacon chain oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BeaconStat {
    pub deposited_validators: U256,
    pub beacon_validators: U256,
    pub beacon_balance: U256,
}

/// Figures of the Lido contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Stats {
    pub is_stopped: bool,
    pub total_pooled_ether: U256,
    pub withdrawal_credentials: B256,
    pub fee: u16,
    pub fee_distribution: FeeDistribution,
    pub beacon_stat: BeaconStat,
    pub buffered_ether: U256,
    #[serde(flatten)]
    pub actuality: DataActuality,
}

/// Reads [`Stats`] in a single aggregated request.
#[derive(Debug, Clone)]
pub struct StatsReader {
    multicall: Multicall,
    lido: Address,
}

impl StatsReader {
    /// Creates a reader for the Lido contract at `lido`.
    pub fn new(multicall: Multicall, lido: Address) -> Self {
        Self { multicall, lido }
    }

    /// Calls each argument-less function in `signatures` on the Lido contract. Results are
    /// keyed by function name.
    pub async fn fetch_raw(
        &self,
        signatures: &[&str],
    ) -> Result<HashMap<String, DynSolValue>, MulticallError> {
        let calls = signatures
            .iter()
            .map(|signature| Call::new(self.lido, signature, &[]))
            .collect::<Result<Vec<_>, _>>()?;

        self.multicall.aggregate_named(&calls).await
    }

    /// Latest block number and timestamp.
    pub async fn data_actuality(&self) -> Result<DataActuality, MulticallError> {
        let block = self.multicall.transport().latest_block().await?;

        Ok(DataActuality { last_block: block.number, last_blocktime: block.timestamp })
    }

    /// Reads all [`DEFAULT_STATS_SIGNATURES`] and the data actuality.
    pub async fn fetch(&self) -> Result<Stats, MulticallError> {
        let values = self.fetch_raw(&DEFAULT_STATS_SIGNATURES).await?;
        let actuality = self.data_actuality().await?;
        debug!(block = actuality.last_block, "Fetched Lido stats");

        let fee_distribution = tuple::<3>(&values, "getFeeDistribution")?;
        let fee_share = |i: usize| small_uint(&fee_distribution[i], "getFeeDistribution");
        let beacon_stat = tuple::<3>(&values, "getBeaconStat")?;
        let beacon = |i: usize| uint(&beacon_stat[i], "getBeaconStat");

        Ok(Stats {
            is_stopped: field(&values, "isStopped", boolean)?,
            total_pooled_ether: field(&values, "getTotalPooledEther", uint)?,
            withdrawal_credentials: field(&values, "getWithdrawalCredentials", word)?,
            fee: field(&values, "getFee", small_uint)?,
            fee_distribution: FeeDistribution {
                treasury_fee_basis_points: fee_share(0)?,
                insurance_fee_basis_points: fee_share(1)?,
                operators_fee_basis_points: fee_share(2)?,
            },
            beacon_stat: BeaconStat {
                deposited_validators: beacon(0)?,
                beacon_validators: beacon(1)?,
                beacon_balance: beacon(2)?,
            },
            buffered_ether: field(&values, "getBufferedEther", uint)?,
            actuality,
        })
    }
}

fn unexpected(name: &str, expected: &'static str) -> AbiError {
    AbiError::UnexpectedValue { name: name.to_owned(), expected }
}

fn get<'a>(
    values: &'a HashMap<String, DynSolValue>,
    name: &str,
) -> Result<&'a DynSolValue, AbiError> {
    values.get(name).ok_or_else(|| unexpected(name, "a value"))
}

fn field<T>(
    values: &HashMap<String, DynSolValue>,
    name: &str,
    convert: fn(&DynSolValue, &str) -> Result<T, AbiError>,
) -> Result<T, AbiError> {
    convert(get(values, name)?, name)
}

fn tuple<'a, const N: usize>(
    values: &'a HashMap<String, DynSolValue>,
    name: &str,
) -> Result<&'a [DynSolValue], AbiError> {
    match get(values, name)? {
        DynSolValue::Tuple(items) if items.len() == N => Ok(items),
        _ => Err(unexpected(name, "a tuple")),
    }
}

fn boolean(value: &DynSolValue, name: &str) -> Result<bool, AbiError> {
    match value {
        DynSolValue::Bool(value) => Ok(*value),
        _ => Err(unexpected(name, "bool")),
    }
}

fn uint(value: &DynSolValue, name: &str) -> Result<U256, AbiError> {
    match value {
        DynSolValue::Uint(value, _) => Ok(*value),
        _ => Err(unexpected(name, "uint")),
    }
}

fn small_uint(value: &DynSolValue, name: &str) -> Result<u16, AbiError> {
    let value = uint(value, name)?;
    if value > U256::from(u16::MAX) {
        return Err(unexpected(name, "uint16"))
    }

    Ok(value.to())
}

fn word(value: &DynSolValue, name: &str) -> Result<B256, AbiError> {
    match value {
        DynSolValue::FixedBytes(word, 32) => Ok(*word),
        _ => Err(unexpected(name, "bytes32")),
    }
}
