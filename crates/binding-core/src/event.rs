use std::fmt;

use alloy_primitives::{Address, B256};

use crate::function::canonical_signature;
use crate::keccak256;
use crate::token::Token;
use crate::types::ParamType;

/// An event parameter; indexed parameters travel as topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventParam {
    pub name: String,
    pub kind: ParamType,
    pub indexed: bool,
}

impl EventParam {
    pub fn new(name: impl Into<String>, kind: ParamType, indexed: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            indexed,
        }
    }
}

/// A contract event declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub name: String,
    pub inputs: Vec<EventParam>,
    /// Anonymous events do not emit their signature hash as topic 0.
    pub anonymous: bool,
}

impl Event {
    pub fn new(name: impl Into<String>, inputs: Vec<EventParam>, anonymous: bool) -> Self {
        Self {
            name: name.into(),
            inputs,
            anonymous,
        }
    }

    /// Canonical signature, e.g. `Staked(address,uint256)`.
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, self.inputs.iter().map(|p| &p.kind))
    }

    /// Keccak-256 of the canonical signature (topic 0).
    pub fn topic_hash(&self) -> B256 {
        keccak256(self.signature())
    }

    pub fn indexed(&self) -> impl Iterator<Item = &EventParam> {
        self.inputs.iter().filter(|p| p.indexed)
    }

    pub fn non_indexed(&self) -> impl Iterator<Item = &EventParam> {
        self.inputs.iter().filter(|p| !p.indexed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// A log decoded against its event declaration.
///
/// Provenance fields are copied from the transport's log untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub name: String,
    pub address: Address,
    /// Parameters in declaration order. Indexed dynamic values are returned
    /// as their 32-byte topic hash.
    pub params: Vec<(String, Token)>,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl DecodedEvent {
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, token)| token)
    }

    pub fn values(&self) -> impl Iterator<Item = &Token> {
        self.params.iter().map(|(_, token)| token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> Event {
        Event::new(
            "Transfer",
            vec![
                EventParam::new("from", ParamType::Address, true),
                EventParam::new("to", ParamType::Address, true),
                EventParam::new("value", ParamType::Uint(256), false),
            ],
            false,
        )
    }

    #[test]
    fn transfer_topic_hash() {
        assert_eq!(
            hex::encode(transfer().topic_hash()),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn indexed_split() {
        let event = transfer();
        assert_eq!(event.indexed().count(), 2);
        assert_eq!(event.non_indexed().map(|p| p.name.as_str()).collect::<Vec<_>>(), ["value"]);
    }
}
