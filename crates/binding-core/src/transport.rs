use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::{Filter, Log};
use crate::transaction::{BlockId, TransactionRequest};

/// Failure reported by a transport; passed through to callers as the error source.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a node request that may execute contract code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Success(T),
    /// The node reported a revert with this return data.
    Revert(Bytes),
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub hash: B256,
}

/// Provider and signer seam consumed by the dispatcher.
///
/// Implementations own connection handling, signing, nonce management and
/// retries. Each method is a single request/response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes the request read-only against `block`.
    async fn call(
        &self,
        request: &TransactionRequest,
        block: BlockId,
    ) -> Result<CallOutcome<Bytes>, TransportError>;

    /// Signs and submits the request.
    async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<CallOutcome<PendingTransaction>, TransportError>;

    async fn estimate_gas(
        &self,
        request: &TransactionRequest,
    ) -> Result<CallOutcome<U256>, TransportError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError>;

    /// Address of the attached signer, used as the default `from`.
    fn signer_address(&self) -> Option<Address> {
        None
    }
}
