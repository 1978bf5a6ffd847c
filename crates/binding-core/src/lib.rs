//! Typed contract bindings for EVM contracts.
//!
//! This crate provides:
//! - A type registry built from a JSON ABI (functions and events keyed by
//!   canonical signature)
//! - A byte-exact head/tail ABI codec for arbitrary nested types
//! - A call dispatcher routing each call through simulate, send, gas
//!   estimation or local request population
//! - Typed event filters and log decoding
//! - Generic contract facade support (`Contract`, `ContractCall`, and the
//!   `contract_methods!` mapping macro used by per-contract bindings)

pub mod abi;
pub mod address;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod filter;
pub mod function;
pub mod registry;
pub mod revert;
pub mod token;
pub mod transaction;
pub mod transport;
pub mod types;

pub use alloy_primitives::{Address, Bytes, FixedBytes, B256, I256, U256};

pub use contract::{Contract, ContractCall, EventQuery, Invocation};
pub use dispatch::{CallMode, DispatchOutcome, Dispatcher};
pub use error::{AbiError, ContractError};
pub use event::{DecodedEvent, Event, EventParam};
pub use filter::{Filter, Log};
pub use function::{CallResult, EncodedCall, Function, Param, StateMutability};
pub use registry::Registry;
pub use revert::RevertReason;
pub use token::{Token, Tokenizable};
pub use transaction::{BlockId, CallOverrides, TransactionRequest};
pub use transport::{CallOutcome, PendingTransaction, Transport, TransportError};
pub use types::ParamType;

use sha3::{Digest, Keccak256};

/// Keccak-256 of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    B256::from_slice(&Keccak256::digest(data.as_ref()))
}
