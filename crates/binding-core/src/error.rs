use thiserror::Error;

use crate::dispatch::CallMode;
use crate::transport::TransportError;

/// Registry, type and codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("ambiguous signature {signature}: {reason}")]
    AmbiguousSignature { signature: String, reason: String },

    #[error("ambiguous name {0}: overloaded, look up by full signature")]
    AmbiguousName(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("invalid abi: {0}")]
    InvalidAbi(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("encoding error at argument {index}: {reason}")]
    Encoding { reason: String, index: usize },

    #[error("decoding error at output {index}: {reason}")]
    Decoding { reason: String, index: usize },

    #[error("incomplete transaction: missing {0}")]
    IncompleteTransaction(&'static str),
}

impl AbiError {
    pub(crate) fn encoding(index: usize, reason: impl Into<String>) -> Self {
        AbiError::Encoding {
            reason: reason.into(),
            index,
        }
    }

    pub(crate) fn decoding(index: usize, reason: impl Into<String>) -> Self {
        AbiError::Decoding {
            reason: reason.into(),
            index,
        }
    }
}

/// Errors surfaced by dispatched contract calls.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// Arguments or return data of one call failed to encode or decode.
    #[error("{mode} {signature}: {source}")]
    Codec {
        signature: String,
        mode: CallMode,
        #[source]
        source: AbiError,
    },

    #[error("{signature} reverted: {reason}")]
    Revert {
        signature: String,
        reason: String,
        data: Vec<u8>,
    },

    #[error("unsupported operation on {signature}: {reason}")]
    UnsupportedOperation { signature: String, reason: String },

    #[error("transport error in {signature}: {source}")]
    Transport {
        signature: String,
        #[source]
        source: TransportError,
    },
}

impl ContractError {
    /// Raw revert data, when the error is a revert.
    pub fn revert_data(&self) -> Option<&[u8]> {
        match self {
            ContractError::Revert { data, .. } => Some(data),
            _ => None,
        }
    }
}
