//! JSON-RPC access to the node: chain id, `eth_call` and the latest block.

use std::borrow::Cow;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, Bytes, U64},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{TransactionInput, TransactionRequest},
    transports::{http::Http, TransportErrorKind, TransportResult},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

/// Number and timestamp of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block number.
    pub number: u64,
    /// Block timestamp, in seconds.
    pub timestamp: u64,
}

/// The remote call interface the crate reads the chain through.
///
/// Failures are returned unmodified; retry policy belongs to the implementation.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the chain id reported by the node.
    async fn chain_id(&self) -> TransportResult<u64>;

    /// Executes a read-only `eth_call` of `data` against `to` at the latest block.
    async fn call(&self, to: Address, data: Bytes) -> TransportResult<Bytes>;

    /// Returns number and timestamp of the latest block.
    async fn latest_block(&self) -> TransportResult<BlockInfo>;
}

/// A [`Transport`] backed by an alloy HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpTransport(RootProvider<Http<Client>>);

impl HttpTransport {
    /// Creates a new transport for the given execution client URL.
    pub fn new<U: Into<Url>>(execution_client_url: U) -> Self {
        let provider = ProviderBuilder::new().on_http(execution_client_url.into());

        Self(provider)
    }
}

/// The subset of the `eth_getBlockByNumber` response we care about.
#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    number: U64,
    timestamp: U64,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn chain_id(&self) -> TransportResult<u64> {
        self.0.get_chain_id().await
    }

    async fn call(&self, to: Address, data: Bytes) -> TransportResult<Bytes> {
        trace!(%to, len = data.len(), "eth_call");
        let tx = TransactionRequest::default().to(to).input(TransactionInput::new(data));

        self.0.call(&tx).await
    }

    async fn latest_block(&self) -> TransportResult<BlockInfo> {
        let block: Option<RpcBlockHeader> = self
            .0
            .raw_request(Cow::Borrowed("eth_getBlockByNumber"), (BlockNumberOrTag::Latest, false))
            .await?;

        let header =
            block.ok_or_else(|| TransportErrorKind::custom_str("latest block not available"))?;

        Ok(BlockInfo { number: header.number.to(), timestamp: header.timestamp.to() })
    }
}
