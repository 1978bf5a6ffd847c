use std::fmt;

use alloy_primitives::U256;

use crate::abi;
use crate::token::Token;
use crate::types::ParamType;

/// Selector of `Error(string)`.
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of `Panic(uint256)`.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Reason extracted from revert data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// `require`/`revert` with a message.
    Message(String),
    /// Compiler-inserted check failure.
    Panic(U256),
    /// Custom error or data that could not be decoded.
    Raw(Vec<u8>),
}

impl RevertReason {
    pub fn decode(data: &[u8]) -> Self {
        let Some((selector, payload)) = data.split_first_chunk::<4>() else {
            return RevertReason::Raw(data.to_vec());
        };

        if *selector == ERROR_SELECTOR {
            if let Ok(mut tokens) = abi::decode(&[ParamType::String], payload) {
                if let Some(Token::String(message)) = tokens.pop() {
                    return RevertReason::Message(message);
                }
            }
        } else if *selector == PANIC_SELECTOR {
            if let Ok(mut tokens) = abi::decode(&[ParamType::Uint(256)], payload) {
                if let Some(Token::Uint(code)) = tokens.pop() {
                    return RevertReason::Panic(code);
                }
            }
        }
        RevertReason::Raw(data.to_vec())
    }
}

fn panic_description(code: U256) -> Option<&'static str> {
    let code: u8 = code.try_into().ok()?;
    Some(match code {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow",
        0x12 => "division by zero",
        0x21 => "invalid enum value",
        0x22 => "invalid storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to zero-initialized function",
        _ => return None,
    })
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::Message(message) => f.write_str(message),
            RevertReason::Panic(code) => match panic_description(*code) {
                Some(description) => write!(f, "panic 0x{code:x}: {description}"),
                None => write!(f, "panic 0x{code:x}"),
            },
            RevertReason::Raw(data) if data.is_empty() => f.write_str("no revert data"),
            RevertReason::Raw(data) => write!(f, "raw 0x{}", hex::encode(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_data(message: &str) -> Vec<u8> {
        abi::encode_function_call(ERROR_SELECTOR, &[ParamType::String], &[Token::String(message.into())])
            .unwrap()
    }

    #[test]
    fn selectors_match_signatures() {
        assert_eq!(crate::keccak256("Error(string)")[..4], ERROR_SELECTOR);
        assert_eq!(crate::keccak256("Panic(uint256)")[..4], PANIC_SELECTOR);
    }

    #[test]
    fn decodes_error_string() {
        let reason = RevertReason::decode(&error_data("Nursery: still locked"));
        assert_eq!(reason, RevertReason::Message("Nursery: still locked".into()));
        assert_eq!(reason.to_string(), "Nursery: still locked");
    }

    #[test]
    fn decodes_panic_code() {
        let data = abi::encode_function_call(
            PANIC_SELECTOR,
            &[ParamType::Uint(256)],
            &[Token::Uint(U256::from(0x11))],
        )
        .unwrap();
        let reason = RevertReason::decode(&data);
        assert_eq!(reason, RevertReason::Panic(U256::from(0x11)));
        assert_eq!(reason.to_string(), "panic 0x11: arithmetic overflow");
    }

    #[test]
    fn unknown_data_stays_raw() {
        assert_eq!(RevertReason::decode(&[]).to_string(), "no revert data");
        assert_eq!(
            RevertReason::decode(&[0xde, 0xad, 0xbe, 0xef, 0x01]).to_string(),
            "raw 0xdeadbeef01"
        );
    }

    #[test]
    fn malformed_error_payload_stays_raw() {
        let mut data = error_data("x");
        data.truncate(40);
        assert_eq!(RevertReason::decode(&data), RevertReason::Raw(data));
    }
}
