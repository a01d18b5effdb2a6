//! Deposit message hashing.
//!
//! Only the handful of SSZ containers needed to reproduce a deposit signing root are
//! implemented here, each merkleized by hand.

use alloy::primitives::{fixed_bytes, FixedBytes, B256};
use sha2::{Digest, Sha256};

pub mod bls;

/// Domain type of deposit signatures.
pub const DOMAIN_DEPOSIT: FixedBytes<4> = fixed_bytes!("03000000");

/// Gwei per ether.
pub const ETH_TO_GWEI: u64 = 1_000_000_000;

/// Amount every deposit message is signed for: 32 ETH, in gwei.
pub const DEPOSIT_AMOUNT_GWEI: u64 = 32 * ETH_TO_GWEI;

/// Hashes the concatenation of two 32 byte chunks.
pub fn sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    B256::from_slice(&hasher.finalize())
}

/// Packs a value of at most 32 bytes into a zero padded chunk.
fn chunk(bytes: &[u8]) -> [u8; 32] {
    let mut chunk = [0u8; 32];
    chunk[..bytes.len()].copy_from_slice(bytes);
    chunk
}

/// The message a validator signs when depositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositMessage {
    /// BLS public key of the validator.
    pub pubkey: FixedBytes<48>,
    /// Withdrawal credentials the deposit is bound to.
    pub withdrawal_credentials: B256,
    /// Deposit amount in gwei.
    pub amount: u64,
}

impl DepositMessage {
    /// A full 32 ETH deposit of `pubkey` to `withdrawal_credentials`.
    pub fn new(pubkey: FixedBytes<48>, withdrawal_credentials: B256) -> Self {
        Self { pubkey, withdrawal_credentials, amount: DEPOSIT_AMOUNT_GWEI }
    }

    /// SSZ root of the container.
    pub fn hash_tree_root(&self) -> B256 {
        // the 48 byte key spans two chunks
        let pubkey_root = sha256_pair(&chunk(&self.pubkey[..32]), &chunk(&self.pubkey[32..]));
        let amount = chunk(&self.amount.to_le_bytes());

        let left = sha256_pair(&pubkey_root.0, &self.withdrawal_credentials.0);
        let right = sha256_pair(&amount, &[0u8; 32]);

        sha256_pair(&left.0, &right.0)
    }

    /// Root that is actually signed under `domain`.
    pub fn signing_root(&self, domain: B256) -> B256 {
        compute_signing_root(self.hash_tree_root(), domain)
    }
}

/// Root of `ForkData { current_version, genesis_validators_root }`.
pub fn compute_fork_data_root(version: FixedBytes<4>, genesis_validators_root: B256) -> B256 {
    sha256_pair(&chunk(version.as_slice()), &genesis_validators_root.0)
}

/// `domain_type ++ fork_data_root[..28]`.
pub fn compute_domain(
    domain_type: FixedBytes<4>,
    fork_version: FixedBytes<4>,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = B256::ZERO;
    domain[..4].copy_from_slice(domain_type.as_slice());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

/// Deposits are valid across forks, so the domain is always built from the genesis fork
/// version and an empty validators root.
pub fn compute_deposit_domain(genesis_fork_version: FixedBytes<4>) -> B256 {
    compute_domain(DOMAIN_DEPOSIT, genesis_fork_version, B256::ZERO)
}

/// Root of `SigningData { object_root, domain }`.
pub fn compute_signing_root(object_root: B256, domain: B256) -> B256 {
    sha256_pair(&object_root.0, &domain.0)
}
