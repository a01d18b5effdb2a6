//! Batching of independent read calls through the well-known multicall contract.

use std::{fmt, sync::Arc};

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes},
    sol_types::SolCall,
};
use futures::{stream, StreamExt, TryStreamExt};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, instrument};

use crate::{
    abi::Call,
    bindings::IMulticall,
    common::{AbiError, ConfigError, MulticallError},
    transport::Transport,
};

/// Default number of calls per aggregated request.
pub const DEFAULT_BATCH_SIZE: usize = 300;

/// A read call that can be batched: a target, a request payload and a decoder for the
/// response.
pub trait Callable: Send + Sync {
    /// The decoded response type.
    type Output: Send;

    /// The contract the call is sent to.
    fn target(&self) -> Address;

    /// The encoded request payload.
    fn calldata(&self) -> Bytes;

    /// Decodes a raw response to this call.
    fn decode_output(&self, output: &[u8]) -> Result<Self::Output, AbiError>;
}

impl Callable for Call {
    type Output = DynSolValue;

    fn target(&self) -> Address {
        Call::target(self)
    }

    fn calldata(&self) -> Bytes {
        Call::calldata(self).clone()
    }

    fn decode_output(&self, output: &[u8]) -> Result<Self::Output, AbiError> {
        Call::decode_output(self, output)
    }
}

/// A call with a static layout generated by [`alloy::sol!`].
#[derive(Clone)]
pub struct TypedCall<C> {
    target: Address,
    call: C,
}

impl<C: SolCall> TypedCall<C> {
    /// Binds `call` to `target`.
    pub fn new(target: Address, call: C) -> Self {
        Self { target, call }
    }
}

impl<C> fmt::Debug for TypedCall<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCall")
            .field("target", &self.target)
            .field("function", &std::any::type_name::<C>())
            .finish()
    }
}

impl<C> Callable for TypedCall<C>
where
    C: SolCall + Send + Sync,
    C::Return: Send,
{
    type Output = C::Return;

    fn target(&self) -> Address {
        self.target
    }

    fn calldata(&self) -> Bytes {
        self.call.abi_encode().into()
    }

    fn decode_output(&self, output: &[u8]) -> Result<Self::Output, AbiError> {
        // validation rejects responses that do not re-encode to the exact input
        C::abi_decode_returns(output, true).map_err(Into::into)
    }
}

/// Sends a single call directly, without going through the aggregator.
pub async fn call_single<C: Callable>(
    transport: &dyn Transport,
    call: &C,
) -> Result<C::Output, MulticallError> {
    let output = transport.call(call.target(), call.calldata()).await?;

    Ok(call.decode_output(&output)?)
}

/// Aggregates many read calls into as few requests as possible.
///
/// `N` calls with a batch size of `B` take exactly `ceil(N / B)` requests. A failing
/// request fails the whole aggregation; no partial results are returned.
#[derive(Debug, Clone)]
pub struct Multicall {
    transport: Arc<dyn Transport>,
    address: Address,
    batch_size: usize,
    concurrency: usize,
}

impl Multicall {
    /// Creates an aggregator for the multicall contract at `address`.
    pub fn new(transport: Arc<dyn Transport>, address: Address) -> Self {
        Self { transport, address, batch_size: DEFAULT_BATCH_SIZE, concurrency: 1 }
    }

    /// Sets the default number of calls per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize)
        }
        self.batch_size = batch_size;

        Ok(self)
    }

    /// Allows up to `concurrency` requests in flight at once. Results keep call order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The multicall contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The default number of calls per request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Executes `calls` with the default batch size. Outputs are in call order.
    pub async fn aggregate<C: Callable>(
        &self,
        calls: &[C],
    ) -> Result<Vec<C::Output>, MulticallError> {
        self.aggregate_with(calls, self.batch_size).await
    }

    /// Executes `calls` in requests of at most `batch_size` calls. Outputs are in call
    /// order.
    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn aggregate_with<C: Callable>(
        &self,
        calls: &[C],
        batch_size: usize,
    ) -> Result<Vec<C::Output>, MulticallError> {
        if batch_size == 0 {
            return Err(MulticallError::InvalidBatchSize)
        }

        let batches: Vec<Vec<C::Output>> = stream::iter(calls.chunks(batch_size))
            .map(|batch| self.aggregate_batch(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// Executes `calls` and returns their outputs keyed by call name.
    ///
    /// Names must be unique across all calls; a collision is reported before anything
    /// is sent.
    pub async fn aggregate_named(
        &self,
        calls: &[Call],
    ) -> Result<HashMap<String, DynSolValue>, MulticallError> {
        let mut names = HashSet::with_capacity(calls.len());
        for call in calls {
            if !names.insert(call.name()) {
                return Err(MulticallError::DuplicateKey(call.name().to_owned()))
            }
        }

        let outputs = self.aggregate(calls).await?;

        Ok(calls.iter().map(|call| call.name().to_owned()).zip(outputs).collect())
    }

    async fn aggregate_batch<C: Callable>(
        &self,
        batch: &[C],
    ) -> Result<Vec<C::Output>, MulticallError> {
        let request = IMulticall::aggregateCall {
            calls: batch
                .iter()
                .map(|call| IMulticall::Call { target: call.target(), callData: call.calldata() })
                .collect(),
        };

        let response = self.transport.call(self.address, request.abi_encode().into()).await?;
        let IMulticall::aggregateReturn { blockNumber, returnData } =
            IMulticall::aggregateCall::abi_decode_returns(&response, true)
                .map_err(AbiError::from)?;

        if returnData.len() != batch.len() {
            return Err(MulticallError::ResponseCount {
                expected: batch.len(),
                got: returnData.len(),
            })
        }

        debug!(block = %blockNumber, calls = batch.len(), "Aggregated batch");

        batch
            .iter()
            .zip(returnData.iter())
            .map(|(call, output)| call.decode_output(output).map_err(Into::into))
            .collect()
    }
}
