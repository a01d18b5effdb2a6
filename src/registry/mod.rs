use async_trait::async_trait;

use crate::common::{Operator, RegistryError};

pub mod contract;
pub mod filesystem;

pub use contract::{ContractRegistry, DEFAULT_KEYS_BATCH_SIZE, MAX_OPERATORS};
pub use filesystem::FilesystemRegistry;

/// A source of node operator records.
#[async_trait]
pub trait Registry {
    /// All operators, without keys.
    async fn operators(&self) -> Result<Vec<Operator>, RegistryError>;

    /// All operators with all of their keys attached.
    async fn operators_with_keys(&self) -> Result<Vec<Operator>, RegistryError>;
}

#[async_trait]
impl Registry for ContractRegistry {
    async fn operators(&self) -> Result<Vec<Operator>, RegistryError> {
        self.fetch_operators().await
    }

    async fn operators_with_keys(&self) -> Result<Vec<Operator>, RegistryError> {
        let operators = self.fetch_operators().await?;
        self.fetch_keys(operators, self.max_multicall()).await
    }
}

#[async_trait]
impl Registry for FilesystemRegistry {
    async fn operators(&self) -> Result<Vec<Operator>, RegistryError> {
        Ok(self.operators.iter().map(|op| Operator { keys: Vec::new(), ..op.clone() }).collect())
    }

    async fn operators_with_keys(&self) -> Result<Vec<Operator>, RegistryError> {
        for operator in &self.operators {
            if !operator.has_all_keys() {
                return Err(RegistryError::IncompleteKeys {
                    operator: operator.id,
                    expected: operator.total_signing_keys,
                    got: operator.keys.len() as u64,
                })
            }
        }

        Ok(self.operators.clone())
    }
}
