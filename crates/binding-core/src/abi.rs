//! ABI encoding and decoding for EVM function calls.
//!
//! Values are laid out in 32-byte words. Static types are packed in place in
//! the head of their enclosing tuple; dynamic types (`bytes`, `string`, `T[]`
//! and anything containing them) leave an offset word in the head pointing
//! into the tail. Offsets are relative to the start of the enclosing tuple.

use std::iter;

use alloy_primitives::{Address, I256, U256};

use crate::error::AbiError;
use crate::token::{check_int_width, Token};
use crate::types::ParamType;

/// Size of an ABI word in bytes.
pub const WORD: usize = 32;

/// Encodes `tokens` as the top-level tuple described by `types`.
///
/// Arity and per-argument type compatibility are checked first; the error
/// carries the index of the offending argument.
pub fn encode(types: &[ParamType], tokens: &[Token]) -> Result<Vec<u8>, AbiError> {
    if types.len() != tokens.len() {
        return Err(AbiError::encoding(
            types.len().min(tokens.len()),
            format!("expected {} arguments, got {}", types.len(), tokens.len()),
        ));
    }

    for (index, (kind, token)) in types.iter().zip(tokens).enumerate() {
        token
            .type_check(kind)
            .map_err(|reason| AbiError::encoding(index, reason))?;
    }

    encode_sequence(types.iter(), tokens).map_err(|reason| AbiError::encoding(0, reason))
}

/// Encodes a function call: `selector || encode(types, tokens)`.
pub fn encode_function_call(
    selector: [u8; 4],
    types: &[ParamType],
    tokens: &[Token],
) -> Result<Vec<u8>, AbiError> {
    let params = encode(types, tokens)?;

    let mut data = Vec::with_capacity(4 + params.len());
    data.extend_from_slice(&selector);
    data.extend_from_slice(&params);
    Ok(data)
}

/// Decodes `data` as the top-level tuple described by `types`.
///
/// Trailing bytes after the last value are ignored. The error carries the
/// index of the output that failed to decode.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut decoder = Decoder::new(data);
    let mut tokens = Vec::with_capacity(types.len());
    let mut head = 0usize;

    for (index, kind) in types.iter().enumerate() {
        let token = decoder.at(kind, 0, head).map_err(|reason| AbiError::decoding(index, reason))?;
        tokens.push(token);
        head += kind.head_size();
    }

    Ok(tokens)
}

fn encode_sequence<'a, I>(types: I, tokens: &[Token]) -> Result<Vec<u8>, String>
where
    I: Iterator<Item = &'a ParamType> + Clone,
{
    let head_len: usize = types.clone().map(ParamType::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (kind, token) in types.zip(tokens) {
        if kind.is_dynamic() {
            // Offset of this value's tail segment from the start of the tuple.
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend_from_slice(&encode_value(kind, token)?);
        } else {
            head.extend_from_slice(&encode_value(kind, token)?);
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

/// Encodes a single value: its in-place words for static types, or its tail
/// segment for dynamic types.
pub(crate) fn encode_value(kind: &ParamType, token: &Token) -> Result<Vec<u8>, String> {
    match (kind, token) {
        (ParamType::Uint(_) | ParamType::Int(_), Token::Uint(value)) => {
            Ok(value.to_be_bytes::<32>().to_vec())
        }
        // Two's complement is already sign-extended to 256 bits.
        (ParamType::Uint(_) | ParamType::Int(_), Token::Int(value)) => {
            Ok(value.into_raw().to_be_bytes::<32>().to_vec())
        }
        (ParamType::Address, Token::Address(address)) => {
            // Left-pad: 12 zero bytes + 20 address bytes.
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(address.as_slice());
            Ok(word.to_vec())
        }
        (ParamType::Bool, Token::Bool(value)) => {
            let mut word = [0u8; WORD];
            word[31] = u8::from(*value);
            Ok(word.to_vec())
        }
        (ParamType::FixedBytes(_), Token::FixedBytes(bytes)) => {
            // Right-pad: data + trailing zero bytes.
            let mut word = [0u8; WORD];
            word[..bytes.len()].copy_from_slice(bytes);
            Ok(word.to_vec())
        }
        (ParamType::Bytes, Token::Bytes(bytes)) => Ok(encode_length_prefixed(bytes)),
        (ParamType::String, Token::String(s)) => Ok(encode_length_prefixed(s.as_bytes())),
        (ParamType::Array(inner), Token::Array(items)) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend_from_slice(&encode_sequence(iter::repeat(inner.as_ref()).take(items.len()), items)?);
            Ok(out)
        }
        (ParamType::FixedArray(inner, len), Token::FixedArray(items) | Token::Array(items)) => {
            encode_sequence(iter::repeat(inner.as_ref()).take(*len), items)
        }
        (ParamType::Tuple(members), Token::Tuple(items)) => encode_sequence(members.iter(), items),
        (kind, token) => Err(format!("cannot encode {token} as {kind}")),
    }
}

fn encode_length_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + padded_len(bytes.len()));
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(&pad_right(bytes));
    out
}

/// Right-pads `bytes` with zeros to a multiple of 32 bytes.
pub(crate) fn pad_right(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(padded_len(bytes.len()), 0);
    out
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn usize_word(value: usize) -> [u8; WORD] {
    U256::from(value).to_be_bytes::<32>()
}

/// Cursor over untrusted return data.
///
/// Every word read, payload byte and produced token is charged against a
/// budget proportional to the input length. Aliased tail offsets therefore
/// cannot expand the decoded tree beyond a constant multiple of the input.
struct Decoder<'a> {
    data: &'a [u8],
    budget: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            budget: data.len().saturating_mul(2).saturating_add(WORD),
        }
    }

    fn charge(&mut self, cost: usize) -> Result<(), String> {
        self.budget = self.budget.checked_sub(cost).ok_or_else(|| {
            format!("data of {} bytes expands past its decoding budget", self.data.len())
        })?;
        Ok(())
    }

    /// Decodes the value whose head slot starts at `head`, inside the tuple
    /// whose data region starts at `base`.
    fn at(&mut self, kind: &ParamType, base: usize, head: usize) -> Result<Token, String> {
        if kind.is_dynamic() {
            let offset = self.read_usize(head)?;
            let start = base
                .checked_add(offset)
                .ok_or_else(|| format!("offset {offset} overflows"))?;
            self.value(kind, start)
        } else {
            self.value(kind, head)
        }
    }

    fn sequence<'k, I>(&mut self, types: I, base: usize) -> Result<Vec<Token>, String>
    where
        I: Iterator<Item = &'k ParamType>,
    {
        let mut tokens = Vec::new();
        let mut head = base;
        for kind in types {
            tokens.push(self.at(kind, base, head)?);
            head = head
                .checked_add(kind.head_size())
                .ok_or_else(|| "head position overflows".to_string())?;
        }
        Ok(tokens)
    }

    /// Decodes the value of type `kind` whose encoding starts at `at`.
    fn value(&mut self, kind: &ParamType, at: usize) -> Result<Token, String> {
        self.charge(1)?;
        match kind {
            ParamType::Uint(bits) => {
                let value = U256::from_be_bytes(self.read_word(at)?);
                if value.bit_len() > *bits {
                    return Err(format!("value {value} out of range for uint{bits}"));
                }
                Ok(Token::Uint(value))
            }
            ParamType::Int(bits) => {
                let value = I256::from_raw(U256::from_be_bytes(self.read_word(at)?));
                check_int_width(&value, *bits)?;
                Ok(Token::Int(value))
            }
            ParamType::Address => {
                let word = self.read_word(at)?;
                if word[..12].iter().any(|b| *b != 0) {
                    return Err("address word has non-zero upper bytes".into());
                }
                Ok(Token::Address(Address::from_slice(&word[12..])))
            }
            // Any non-zero word is true.
            ParamType::Bool => Ok(Token::Bool(self.read_word(at)?.iter().any(|b| *b != 0))),
            ParamType::FixedBytes(len) => Ok(Token::FixedBytes(self.read_word(at)?[..*len].to_vec())),
            ParamType::Bytes => Ok(Token::Bytes(self.read_length_prefixed(at)?.to_vec())),
            ParamType::String => {
                let bytes = self.read_length_prefixed(at)?;
                let s = String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid utf-8 string: {e}"))?;
                Ok(Token::String(s))
            }
            ParamType::Array(inner) => {
                let len = self.read_usize(at)?;
                let start = at + WORD;
                // Every element needs at least one head slot; reject lengths the
                // buffer cannot possibly hold before allocating.
                let min_size = len
                    .checked_mul(inner.head_size().max(1))
                    .ok_or_else(|| format!("array length {len} overflows"))?;
                if start.saturating_add(min_size) > self.data.len() {
                    return Err(format!("array length {len} exceeds available data"));
                }
                let items = self.sequence(iter::repeat(inner.as_ref()).take(len), start)?;
                Ok(Token::Array(items))
            }
            ParamType::FixedArray(inner, len) => {
                let items = self.sequence(iter::repeat(inner.as_ref()).take(*len), at)?;
                Ok(Token::FixedArray(items))
            }
            ParamType::Tuple(members) => Ok(Token::Tuple(self.sequence(members.iter(), at)?)),
        }
    }

    fn read_word(&mut self, at: usize) -> Result<[u8; WORD], String> {
        self.charge(WORD)?;
        let bytes = read_slice(self.data, at, WORD)?;
        let mut word = [0u8; WORD];
        word.copy_from_slice(bytes);
        Ok(word)
    }

    fn read_usize(&mut self, at: usize) -> Result<usize, String> {
        let value = U256::from_be_bytes(self.read_word(at)?);
        usize::try_from(value).map_err(|_| format!("length or offset {value} too large"))
    }

    fn read_length_prefixed(&mut self, at: usize) -> Result<&'a [u8], String> {
        let len = self.read_usize(at)?;
        let bytes = read_slice(self.data, at + WORD, len)?;
        self.charge(len)?;
        Ok(bytes)
    }
}

/// Decodes a single value of type `kind` starting at `at` in `data`.
pub(crate) fn decode_value(kind: &ParamType, data: &[u8], at: usize) -> Result<Token, String> {
    Decoder::new(data).value(kind, at)
}

fn read_slice(data: &[u8], at: usize, len: usize) -> Result<&[u8], String> {
    let end = at
        .checked_add(len)
        .ok_or_else(|| format!("length {len} at offset {at} overflows"))?;
    data.get(at..end).ok_or_else(|| {
        format!("need {len} bytes at offset {at}, have {}", data.len().saturating_sub(at))
    })
}
