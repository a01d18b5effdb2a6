use alloy::primitives::{FixedBytes, B256};
use serde::{Deserialize, Serialize};

use crate::{common::SigningKey, config::ChainConfig, primitives::compute_deposit_domain};

/// Which withdrawal credentials a deposit signature may be bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalPolicy {
    /// Every key must be signed for the live credentials.
    Strict,
    /// Used keys may also be signed for any historically known credentials.
    #[default]
    Loose,
}

/// Fixed inputs of the signature check, shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    domain: B256,
    /// Live credentials first, then historical ones, without repeats.
    candidates: Vec<B256>,
    policy: WithdrawalPolicy,
}

impl ValidationContext {
    /// Builds a context for the chain with genesis fork `fork_version`.
    pub fn new(
        fork_version: FixedBytes<4>,
        live: B256,
        historical: &[B256],
        policy: WithdrawalPolicy,
    ) -> Self {
        let mut candidates = vec![live];
        for credentials in historical {
            if !candidates.contains(credentials) {
                candidates.push(*credentials);
            }
        }

        Self { domain: compute_deposit_domain(fork_version), candidates, policy }
    }

    /// Builds a context from a chain configuration and the credentials currently reported by
    /// the Lido contract.
    pub fn from_config(config: &ChainConfig, live: B256, policy: WithdrawalPolicy) -> Self {
        Self::new(config.genesis_fork_version, live, &config.withdrawal_credentials, policy)
    }

    /// The deposit signature domain.
    pub fn domain(&self) -> B256 {
        self.domain
    }

    /// The live withdrawal credentials.
    pub fn live(&self) -> B256 {
        self.candidates[0]
    }

    /// The active policy.
    pub fn policy(&self) -> WithdrawalPolicy {
        self.policy
    }

    /// Credentials `key` may have been signed against, in the order they should be tried.
    pub fn candidates_for(&self, key: &SigningKey) -> &[B256] {
        match self.policy {
            WithdrawalPolicy::Loose if key.used => &self.candidates,
            _ => &self.candidates[..1],
        }
    }
}
