//! Event topic filters and log decoding.
//!
//! Indexed parameters are stored as topics. Values of at most one word are
//! stored as their ABI word; `string`, `bytes`, arrays and tuples are stored
//! as the Keccak-256 of their contents, so only the hash can be recovered.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::abi;
use crate::error::AbiError;
use crate::event::{DecodedEvent, Event};
use crate::keccak256;
use crate::token::Token;
use crate::transaction::quantity;
use crate::types::ParamType;

/// Maximum number of topics a log can carry.
pub const MAX_TOPICS: usize = 4;

/// A log filter: `None` in a topic position matches anything, `Some` matches
/// any one of the listed alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, with = "quantity::u64_opt", skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,
    #[serde(default, with = "quantity::u64_opt", skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
    pub topics: Vec<Option<Vec<B256>>>,
}

impl Filter {
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    /// Replaces the alternatives at topic position `index`.
    pub fn topic(mut self, index: usize, alternatives: Option<Vec<B256>>) -> Self {
        if self.topics.len() <= index {
            self.topics.resize(index + 1, None);
        }
        self.topics[index] = alternatives;
        self
    }

    /// Whether `log` passes the address and topic constraints.
    ///
    /// Block range is left to the node.
    pub fn matches(&self, log: &Log) -> bool {
        if self.address.is_some_and(|address| address != log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, alternatives)| match alternatives {
            None => true,
            Some(alternatives) => log
                .topics
                .get(i)
                .is_some_and(|topic| alternatives.contains(topic)),
        })
    }
}

/// A raw log as returned by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default, with = "quantity::u64_opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default, with = "quantity::u64_opt")]
    pub log_index: Option<u64>,
}

/// Builds the topic filter for `event` from one entry per indexed input.
///
/// `None` leaves the position as a wildcard. Topic 0 is the event hash unless
/// the event is anonymous.
pub fn build_filter(event: &Event, indexed_values: &[Option<Token>]) -> Result<Filter, AbiError> {
    let indexed: Vec<&ParamType> = event.indexed().map(|p| &p.kind).collect();
    if indexed.len() != indexed_values.len() {
        return Err(AbiError::encoding(
            indexed.len().min(indexed_values.len()),
            format!(
                "{} has {} indexed inputs, got {} values",
                event.signature(),
                indexed.len(),
                indexed_values.len()
            ),
        ));
    }

    let mut topics = Vec::with_capacity(indexed.len() + 1);
    if !event.anonymous {
        topics.push(Some(vec![event.topic_hash()]));
    }
    for (index, (kind, value)) in indexed.into_iter().zip(indexed_values).enumerate() {
        let topic = match value {
            None => None,
            Some(token) => {
                token
                    .type_check(kind)
                    .map_err(|reason| AbiError::encoding(index, reason))?;
                Some(vec![encode_topic(kind, token).map_err(|reason| AbiError::encoding(index, reason))?])
            }
        };
        topics.push(topic);
    }

    if topics.len() > MAX_TOPICS {
        return Err(AbiError::encoding(
            MAX_TOPICS,
            format!("{} needs {} topics, logs carry at most {MAX_TOPICS}", event.signature(), topics.len()),
        ));
    }

    Ok(Filter {
        topics,
        ..Filter::default()
    })
}

/// Encodes one indexed value as a topic.
pub fn encode_topic(kind: &ParamType, token: &Token) -> Result<B256, String> {
    match (kind, token) {
        (ParamType::Bytes, Token::Bytes(bytes)) => Ok(keccak256(bytes)),
        (ParamType::String, Token::String(s)) => Ok(keccak256(s.as_bytes())),
        (kind, token) if is_hashed(kind) => Ok(keccak256(encode_in_place(kind, token)?)),
        (kind, token) => Ok(B256::from_slice(&abi::encode_value(kind, token)?)),
    }
}

/// Arrays and tuples in a topic are the concatenation of their elements,
/// each padded to a whole number of words, with no offsets or lengths.
fn encode_in_place(kind: &ParamType, token: &Token) -> Result<Vec<u8>, String> {
    match (kind, token) {
        (ParamType::Bytes, Token::Bytes(bytes)) => Ok(abi::pad_right(bytes)),
        (ParamType::String, Token::String(s)) => Ok(abi::pad_right(s.as_bytes())),
        (ParamType::Array(inner) | ParamType::FixedArray(inner, _), Token::Array(items) | Token::FixedArray(items)) => {
            concat(items.iter().map(|item| encode_in_place(inner, item)))
        }
        (ParamType::Tuple(members), Token::Tuple(items)) => {
            concat(members.iter().zip(items).map(|(member, item)| encode_in_place(member, item)))
        }
        (kind, token) => abi::encode_value(kind, token),
    }
}

fn concat(parts: impl Iterator<Item = Result<Vec<u8>, String>>) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(&part?);
    }
    Ok(out)
}

fn is_hashed(kind: &ParamType) -> bool {
    matches!(
        kind,
        ParamType::Bytes
            | ParamType::String
            | ParamType::Array(_)
            | ParamType::FixedArray(..)
            | ParamType::Tuple(_)
    )
}

/// Decodes `log` against `event`.
///
/// Hashed indexed values come back as `Token::FixedBytes` holding the topic.
/// Decoding errors carry the index of the parameter in declaration order.
pub fn decode_log(event: &Event, log: &Log) -> Result<DecodedEvent, AbiError> {
    let mut topics = log.topics.iter();
    if !event.anonymous {
        let topic0 = topics
            .next()
            .ok_or_else(|| AbiError::decoding(0, format!("log has no topics, expected {}", event.signature())))?;
        if *topic0 != event.topic_hash() {
            return Err(AbiError::decoding(
                0,
                format!("topic 0x{} is not {}", hex::encode(topic0), event.signature()),
            ));
        }
    }

    let indexed_count = event.indexed().count();
    if topics.len() != indexed_count {
        return Err(AbiError::decoding(
            0,
            format!("expected {indexed_count} indexed topics, log has {}", topics.len()),
        ));
    }

    let data_types: Vec<ParamType> = event.non_indexed().map(|p| p.kind.clone()).collect();
    let mut data_values = abi::decode(&data_types, &log.data)
        .map_err(|err| data_error_index(err, event))?
        .into_iter();

    let mut params = Vec::with_capacity(event.inputs.len());
    for (index, param) in event.inputs.iter().enumerate() {
        let token = if param.indexed {
            // Count was checked above.
            let topic = topics
                .next()
                .ok_or_else(|| AbiError::decoding(index, "missing topic"))?;
            if is_hashed(&param.kind) {
                Token::FixedBytes(topic.to_vec())
            } else {
                abi::decode_value(&param.kind, topic.as_slice(), 0)
                    .map_err(|reason| AbiError::decoding(index, reason))?
            }
        } else {
            data_values
                .next()
                .ok_or_else(|| AbiError::decoding(index, "missing data value"))?
        };
        params.push((param.name.clone(), token));
    }

    Ok(DecodedEvent {
        name: event.name.clone(),
        address: log.address,
        params,
        block_number: log.block_number,
        block_hash: log.block_hash,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
    })
}

/// Maps a decoding index over the non-indexed inputs back to declaration order.
fn data_error_index(err: AbiError, event: &Event) -> AbiError {
    match err {
        AbiError::Decoding { reason, index } => {
            let declared = event
                .inputs
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.indexed)
                .nth(index)
                .map_or(index, |(i, _)| i);
            AbiError::decoding(declared, reason)
        }
        other => other,
    }
}
