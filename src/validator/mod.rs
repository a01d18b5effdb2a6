use std::{num::NonZeroUsize, sync::Arc, thread::available_parallelism};

use alloy::primitives::FixedBytes;
use rayon::{
    prelude::{IntoParallelRefIterator, ParallelIterator},
    ThreadPool, ThreadPoolBuilder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod policy;
pub use policy::{ValidationContext, WithdrawalPolicy};

use crate::{
    common::{ConfigError, Operator, SigningKey},
    primitives::{
        bls::{parse_pubkey, parse_signature, verify_signature},
        DepositMessage,
    },
};

/// Outcome of checking a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The key already carried a verdict and was not checked again.
    Skipped,
    /// The key was checked; `true` if its deposit signature verified.
    Checked(bool),
}

/// How a collection of operators is validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Keys are checked on the worker pool.
    #[default]
    Pooled,
    /// Keys are checked one after another on the calling thread.
    Serial,
}

/// Counters of a validation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Keys checked in this pass.
    pub checked: usize,
    /// Keys that already had a verdict.
    pub skipped: usize,
    /// Checked keys whose signature did not verify.
    pub invalid: usize,
}

/// Checks deposit signatures of signing keys.
///
/// Verdicts are written into [`SigningKey::valid_signature`] and are final: a key that
/// already has one is never checked again. Serial and pooled validation produce the same
/// verdicts.
#[derive(Debug, Clone)]
pub struct KeyValidator {
    context: Arc<ValidationContext>,
    pool: Option<Arc<ThreadPool>>,
}

impl KeyValidator {
    /// Creates a validator with one worker per available core.
    pub fn new(context: ValidationContext) -> Result<Self, ConfigError> {
        Ok(Self::with_pool(context, Arc::new(worker_pool(default_threads())?)))
    }

    /// Creates a validator with a fixed number of workers.
    pub fn with_threads(context: ValidationContext, threads: usize) -> Result<Self, ConfigError> {
        Ok(Self::with_pool(context, Arc::new(worker_pool(threads)?)))
    }

    /// Creates a validator running on an existing pool, shared with other validators.
    pub fn with_pool(context: ValidationContext, pool: Arc<ThreadPool>) -> Self {
        Self { context: Arc::new(context), pool: Some(pool) }
    }

    /// Creates a validator without a pool of its own. Pooled validation then runs on the
    /// global rayon pool.
    pub fn serial(context: ValidationContext) -> Self {
        Self { context: Arc::new(context), pool: None }
    }

    /// The validation context.
    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// The dedicated worker pool, if any.
    pub fn pool(&self) -> Option<&Arc<ThreadPool>> {
        self.pool.as_ref()
    }

    /// Checks a single key, unless it already has a verdict. Does not modify the key.
    pub fn validate_key(&self, key: &SigningKey) -> Validation {
        if key.valid_signature.is_some() {
            return Validation::Skipped
        }

        Validation::Checked(self.check(key))
    }

    /// Validates every key on the calling thread.
    pub fn validate_serial(&self, operators: &mut [Operator]) -> ValidationSummary {
        let verdicts: Vec<Vec<Validation>> = operators
            .iter()
            .map(|operator| operator.keys.iter().map(|key| self.validate_key(key)).collect())
            .collect();

        apply(operators, verdicts)
    }

    /// Validates every key on the worker pool.
    ///
    /// Verdicts are gathered in key order and written back only once every key has been
    /// checked; blocks the calling thread until then.
    pub fn validate_pooled(&self, operators: &mut [Operator]) -> ValidationSummary {
        let scatter = || -> Vec<Vec<Validation>> {
            operators
                .par_iter()
                .map(|operator| {
                    operator.keys.par_iter().map(|key| self.validate_key(key)).collect()
                })
                .collect()
        };
        let verdicts = match &self.pool {
            Some(pool) => pool.install(scatter),
            None => scatter(),
        };

        apply(operators, verdicts)
    }

    /// Validates with the given mode.
    pub fn validate(&self, operators: &mut [Operator], mode: ValidationMode) -> ValidationSummary {
        match mode {
            ValidationMode::Pooled => self.validate_pooled(operators),
            ValidationMode::Serial => self.validate_serial(operators),
        }
    }

    fn check(&self, key: &SigningKey) -> bool {
        let Ok(pubkey_bytes) = FixedBytes::<48>::try_from(&key.key[..]) else {
            return false
        };
        let (Some(pubkey), Some(signature)) =
            (parse_pubkey(pubkey_bytes.as_slice()), parse_signature(&key.deposit_signature))
        else {
            return false
        };

        self.context.candidates_for(key).iter().any(|credentials| {
            let root = DepositMessage::new(pubkey_bytes, *credentials)
                .signing_root(self.context.domain());

            verify_signature(&signature, &pubkey, root)
        })
    }
}

/// One worker per available core.
pub(crate) fn default_threads() -> usize {
    available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Builds the pool keys are checked on.
pub(crate) fn worker_pool(threads: usize) -> Result<ThreadPool, ConfigError> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("key-validator-{i}"))
        .build()?)
}

/// Writes verdicts back into the operators they were computed for.
fn apply(operators: &mut [Operator], verdicts: Vec<Vec<Validation>>) -> ValidationSummary {
    let mut summary = ValidationSummary::default();

    for (operator, verdicts) in operators.iter_mut().zip(verdicts) {
        for (key, verdict) in operator.keys.iter_mut().zip(verdicts) {
            match verdict {
                Validation::Skipped => summary.skipped += 1,
                Validation::Checked(valid) => {
                    summary.checked += 1;
                    if !valid {
                        summary.invalid += 1;
                        debug!(
                            operator = operator.id,
                            index = key.index,
                            "Invalid deposit signature"
                        );
                    }
                    key.valid_signature.get_or_insert(valid);
                }
            }
        }
    }

    info!(
        checked = summary.checked,
        skipped = summary.skipped,
        invalid = summary.invalid,
        "Validated signing keys"
    );

    summary
}
