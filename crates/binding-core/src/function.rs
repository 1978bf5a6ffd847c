use std::fmt;
use std::sync::Arc;

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

use crate::abi;
use crate::error::AbiError;
use crate::keccak256;
use crate::token::{detokenize, Token, Tokenizable};
use crate::types::ParamType;

/// A named function parameter or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    /// Empty when the ABI leaves the parameter unnamed.
    pub name: String,
    pub kind: ParamType,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Whether a function reads or may change contract state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    NonPayable,
    Payable,
}

impl StateMutability {
    /// `view` and `pure` functions cannot be sent as transactions.
    pub fn is_read_only(self) -> bool {
        matches!(self, StateMutability::Pure | StateMutability::View)
    }
}

impl fmt::Display for StateMutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateMutability::Pure => "pure",
            StateMutability::View => "view",
            StateMutability::NonPayable => "nonpayable",
            StateMutability::Payable => "payable",
        })
    }
}

/// A callable contract function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub state_mutability: StateMutability,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Param>,
        outputs: Vec<Param>,
        state_mutability: StateMutability,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            state_mutability,
        }
    }

    /// Canonical signature, e.g. `setLockUp(uint256,uint256)`.
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, self.inputs.iter().map(|p| &p.kind))
    }

    /// First four bytes of the Keccak-256 of the canonical signature.
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash[..4]);
        selector
    }

    pub fn input_types(&self) -> Vec<ParamType> {
        self.inputs.iter().map(|p| p.kind.clone()).collect()
    }

    pub fn output_types(&self) -> Vec<ParamType> {
        self.outputs.iter().map(|p| p.kind.clone()).collect()
    }

    /// Encodes `selector || arguments`.
    pub fn encode_input(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        abi::encode_function_call(self.selector(), &self.input_types(), args)
    }

    /// Decodes calldata produced for this function, checking the selector.
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<Token>, AbiError> {
        let selector = calldata
            .get(..4)
            .ok_or_else(|| AbiError::decoding(0, "calldata shorter than a selector"))?;
        if selector != self.selector() {
            return Err(AbiError::decoding(
                0,
                format!("selector 0x{} does not match {}", hex::encode(selector), self.signature()),
            ));
        }
        abi::decode(&self.input_types(), &calldata[4..])
    }

    /// Decodes the return data of a call to this function.
    pub fn decode_output(&self, data: &[u8]) -> Result<CallResult, AbiError> {
        let values = abi::decode(&self.output_types(), data)?;
        Ok(CallResult {
            values,
            names: self.outputs.iter().map(|p| p.name.clone()).collect(),
        })
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

pub(crate) fn canonical_signature<'a>(
    name: &str,
    kinds: impl Iterator<Item = &'a ParamType>,
) -> String {
    let kinds: Vec<String> = kinds.map(ToString::to_string).collect();
    format!("{name}({})", kinds.join(","))
}

/// The wire payload of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub function: Arc<Function>,
    /// Selector followed by the encoded arguments.
    pub data: Bytes,
}

impl EncodedCall {
    pub fn new(function: Arc<Function>, args: &[Token]) -> Result<Self, AbiError> {
        let data = function.encode_input(args)?;
        Ok(Self {
            function,
            data: Bytes::from(data),
        })
    }

    /// The encoded arguments without the selector.
    pub fn arguments(&self) -> &[u8] {
        &self.data[4..]
    }
}

/// Decoded return values of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    values: Vec<Token>,
    names: Vec<String>,
}

impl CallResult {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.values.get(index)
    }

    /// Looks up an output by the name the ABI gave it.
    pub fn get_named(&self, name: &str) -> Option<&Token> {
        if name.is_empty() {
            return None;
        }
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Token] {
        &self.values
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.values
    }

    /// Converts the outputs into a Rust value (`()`, a single type, or a tuple).
    pub fn into_typed<R: Tokenizable>(self) -> Result<R, AbiError> {
        detokenize(self.values)
    }
}
