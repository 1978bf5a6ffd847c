use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_rlp::{Encodable, RlpEncodable};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AbiError;
use crate::keccak256;

/// Which state a read-only call executes against.
///
/// Serializes as a JSON-RPC block parameter: `"latest"`, `"pending"`, a hex
/// quantity, or `{"blockHash": ...}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlockId {
    #[default]
    Latest,
    Pending,
    Number(u64),
    Hash(B256),
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockId::Latest => serializer.serialize_str("latest"),
            BlockId::Pending => serializer.serialize_str("pending"),
            BlockId::Number(number) => U64::from(*number).serialize(serializer),
            BlockId::Hash(hash) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("blockHash", hash)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Hash {
                #[serde(rename = "blockHash")]
                block_hash: B256,
            },
            Tag(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Hash { block_hash } => Ok(BlockId::Hash(block_hash)),
            Raw::Tag(tag) => match tag.as_str() {
                "latest" => Ok(BlockId::Latest),
                "pending" => Ok(BlockId::Pending),
                other => other
                    .strip_prefix("0x")
                    .and_then(|digits| u64::from_str_radix(digits, 16).ok())
                    .map(BlockId::Number)
                    .ok_or_else(|| D::Error::custom(format!("unsupported block id {other}"))),
            },
        }
    }
}

/// Serde adapters for JSON-RPC quantities: `0x`-prefixed hex without
/// leading zeros.
pub(crate) mod quantity {
    use alloy_primitives::{U128, U64};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) mod u64_opt {
        use super::*;

        pub(crate) fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
            value.map(U64::from).serialize(serializer)
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
            Ok(Option::<U64>::deserialize(deserializer)?.map(|quantity| quantity.to::<u64>()))
        }
    }

    pub(crate) mod u128_opt {
        use super::*;

        pub(crate) fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
            value.map(U128::from).serialize(serializer)
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
            Ok(Option::<U128>::deserialize(deserializer)?.map(|quantity| quantity.to::<u128>()))
        }
    }
}

/// Per-call configuration layered over the encoded request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOverrides {
    /// Wei attached to the call; only payable functions accept a non-zero value.
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    pub from: Option<Address>,
    /// State to simulate against; ignored when sending.
    pub block: Option<BlockId>,
    pub nonce: Option<u64>,
    pub chain_id: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl CallOverrides {
    /// Fills unset fields from `defaults`.
    pub fn or(self, defaults: &CallOverrides) -> CallOverrides {
        CallOverrides {
            value: self.value.or(defaults.value),
            gas_limit: self.gas_limit.or(defaults.gas_limit),
            from: self.from.or(defaults.from),
            block: self.block.or(defaults.block),
            nonce: self.nonce.or(defaults.nonce),
            chain_id: self.chain_id.or(defaults.chain_id),
            max_fee_per_gas: self.max_fee_per_gas.or(defaults.max_fee_per_gas),
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .or(defaults.max_priority_fee_per_gas),
        }
    }
}

/// An unsigned contract call, ready for a transport or an external signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Selector followed by the encoded arguments.
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(rename = "gas", default, with = "quantity::u64_opt", skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, with = "quantity::u64_opt", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, with = "quantity::u64_opt", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, with = "quantity::u128_opt", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(default, with = "quantity::u128_opt", skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TransactionRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            ..Default::default()
        }
    }

    /// Copies the transaction-shaping fields of `overrides` onto the request.
    pub fn apply(mut self, overrides: &CallOverrides) -> Self {
        self.from = overrides.from.or(self.from);
        self.value = overrides.value.or(self.value);
        self.gas_limit = overrides.gas_limit.or(self.gas_limit);
        self.nonce = overrides.nonce.or(self.nonce);
        self.chain_id = overrides.chain_id.or(self.chain_id);
        self.max_fee_per_gas = overrides.max_fee_per_gas.or(self.max_fee_per_gas);
        self.max_priority_fee_per_gas = overrides
            .max_priority_fee_per_gas
            .or(self.max_priority_fee_per_gas);
        self
    }

    /// Encodes the request as an unsigned EIP-1559 payload:
    /// `0x02 || rlp([chain_id, nonce, max_priority_fee_per_gas, max_fee_per_gas,
    /// gas_limit, to, value, data, access_list])`.
    ///
    /// Chain id, nonce, gas limit and both fee fields must be set.
    pub fn encode_unsigned_eip1559(&self) -> Result<Vec<u8>, AbiError> {
        let fields = UnsignedTxFields {
            chain_id: self.chain_id.ok_or(AbiError::IncompleteTransaction("chain id"))?,
            nonce: self.nonce.ok_or(AbiError::IncompleteTransaction("nonce"))?,
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .ok_or(AbiError::IncompleteTransaction("max priority fee per gas"))?,
            max_fee_per_gas: self
                .max_fee_per_gas
                .ok_or(AbiError::IncompleteTransaction("max fee per gas"))?,
            gas_limit: self.gas_limit.ok_or(AbiError::IncompleteTransaction("gas limit"))?,
            to: self.to,
            value: self.value.unwrap_or(U256::ZERO),
            data: self.data.clone(),
            access_list: Vec::new(),
        };

        let mut rlp_buf = Vec::new();
        fields.encode(&mut rlp_buf);

        let mut payload = Vec::with_capacity(1 + rlp_buf.len());
        payload.push(0x02); // EIP-1559 type byte.
        payload.extend_from_slice(&rlp_buf);
        Ok(payload)
    }

    /// Keccak-256 of the unsigned EIP-1559 payload, the digest a signer signs.
    pub fn signing_hash(&self) -> Result<B256, AbiError> {
        Ok(keccak256(self.encode_unsigned_eip1559()?))
    }
}

/// Unsigned EIP-1559 transaction fields for RLP encoding.
#[derive(RlpEncodable)]
struct UnsignedTxFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    access_list: Vec<AccessListItem>,
}

/// An EIP-2930 access list entry; populated requests carry an empty list.
#[derive(RlpEncodable)]
struct AccessListItem {
    address: Address,
    storage_keys: Vec<B256>,
}
