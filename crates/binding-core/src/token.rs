//! Dynamic ABI values and the bridge to statically typed Rust values.

use std::fmt;

use alloy_primitives::{Address, Bytes, FixedBytes, I256, U256};

use crate::address::checksum_address;
use crate::error::AbiError;
use crate::types::ParamType;

/// A single ABI value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Uint(U256),
    /// Two's complement 256-bit signed integer.
    Int(I256),
    Address(Address),
    Bool(bool),
    /// `bytes<N>`; the length must match N when encoded.
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<Token>),
    FixedArray(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    /// Checks that the token can be encoded as `kind`.
    ///
    /// Returns a human-readable reason on mismatch; callers attach the
    /// argument index.
    pub fn type_check(&self, kind: &ParamType) -> Result<(), String> {
        match (self, kind) {
            (Token::Uint(value), ParamType::Uint(bits)) => check_uint_width(value, *bits),
            (Token::Int(value), ParamType::Uint(bits)) => {
                if value.is_negative() {
                    return Err(format!("negative value {value} for uint{bits}"));
                }
                check_uint_width(&value.into_raw(), *bits)
            }
            (Token::Int(value), ParamType::Int(bits)) => check_int_width(value, *bits),
            (Token::Uint(value), ParamType::Int(bits)) => {
                check_int_width(&I256::from_raw(*value), *bits).and_then(|_| {
                    // A raw value with the top bit set is not a positive int256.
                    if value.bit(255) {
                        Err(format!("value {value} exceeds int{bits}"))
                    } else {
                        Ok(())
                    }
                })
            }
            (Token::Address(_), ParamType::Address) => Ok(()),
            (Token::Bool(_), ParamType::Bool) => Ok(()),
            (Token::FixedBytes(bytes), ParamType::FixedBytes(len)) => {
                if bytes.len() == *len {
                    Ok(())
                } else {
                    Err(format!("expected {len} bytes for bytes{len}, got {}", bytes.len()))
                }
            }
            (Token::Bytes(_), ParamType::Bytes) => Ok(()),
            (Token::String(_), ParamType::String) => Ok(()),
            (Token::Array(items), ParamType::Array(inner)) => {
                items.iter().enumerate().try_for_each(|(i, item)| {
                    item.type_check(inner).map_err(|e| format!("element {i}: {e}"))
                })
            }
            (Token::FixedArray(items) | Token::Array(items), ParamType::FixedArray(inner, len)) => {
                if items.len() != *len {
                    return Err(format!("expected {len} elements for {kind}, got {}", items.len()));
                }
                items.iter().enumerate().try_for_each(|(i, item)| {
                    item.type_check(inner).map_err(|e| format!("element {i}: {e}"))
                })
            }
            (Token::Tuple(items), ParamType::Tuple(members)) => {
                if items.len() != members.len() {
                    return Err(format!(
                        "expected {} tuple members for {kind}, got {}",
                        members.len(),
                        items.len()
                    ));
                }
                items.iter().zip(members).enumerate().try_for_each(|(i, (item, member))| {
                    item.type_check(member).map_err(|e| format!("member {i}: {e}"))
                })
            }
            (token, kind) => Err(format!("{} value cannot be encoded as {kind}", token.kind_name())),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Token::Uint(_) => "uint",
            Token::Int(_) => "int",
            Token::Address(_) => "address",
            Token::Bool(_) => "bool",
            Token::FixedBytes(_) => "fixed bytes",
            Token::Bytes(_) => "bytes",
            Token::String(_) => "string",
            Token::Array(_) => "array",
            Token::FixedArray(_) => "fixed array",
            Token::Tuple(_) => "tuple",
        }
    }

    pub fn into_uint(self) -> Option<U256> {
        match self {
            Token::Uint(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(value) => Some(value),
            _ => None,
        }
    }
}

fn check_uint_width(value: &U256, bits: usize) -> Result<(), String> {
    if value.bit_len() > bits {
        Err(format!("value {value} exceeds uint{bits}"))
    } else {
        Ok(())
    }
}

pub(crate) fn check_int_width(value: &I256, bits: usize) -> Result<(), String> {
    if bits == 256 {
        return Ok(());
    }
    // In range iff |v| fits in bits-1 bits (v >= 0) or |v|-1 does (v < 0).
    let raw = value.into_raw();
    let magnitude = if value.is_negative() { !raw } else { raw };
    if magnitude.bit_len() > bits - 1 {
        Err(format!("value {value} exceeds int{bits}"))
    } else {
        Ok(())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Uint(value) => write!(f, "{value}"),
            Token::Int(value) => write!(f, "{value}"),
            Token::Address(address) => f.write_str(&checksum_address(address)),
            Token::Bool(value) => write!(f, "{value}"),
            Token::FixedBytes(bytes) | Token::Bytes(bytes) => {
                write!(f, "0x{}", hex::encode(bytes))
            }
            Token::String(s) => write!(f, "{s:?}"),
            Token::Array(items) | Token::FixedArray(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Token::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Token]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Conversion between Rust values and ABI tokens.
pub trait Tokenizable: Sized {
    fn from_token(token: Token) -> Result<Self, AbiError>;
    fn into_token(self) -> Token;
}

fn mismatch(expected: &str, token: &Token) -> AbiError {
    AbiError::decoding(0, format!("expected {expected}, got {}", token.kind_name()))
}

impl Tokenizable for Token {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        Ok(token)
    }

    fn into_token(self) -> Token {
        self
    }
}

impl Tokenizable for U256 {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Uint(value) => Ok(value),
            other => Err(mismatch("uint", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Uint(self)
    }
}

impl Tokenizable for I256 {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Int(value) => Ok(value),
            other => Err(mismatch("int", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Int(self)
    }
}

macro_rules! impl_tokenizable_uint {
    ($($t:ty),*) => {
        $(
            impl Tokenizable for $t {
                fn from_token(token: Token) -> Result<Self, AbiError> {
                    match token {
                        Token::Uint(value) => <$t>::try_from(value).map_err(|_| {
                            AbiError::decoding(0, format!("value {value} does not fit {}", stringify!($t)))
                        }),
                        other => Err(mismatch("uint", &other)),
                    }
                }

                fn into_token(self) -> Token {
                    Token::Uint(U256::from(self))
                }
            }
        )*
    };
}

impl_tokenizable_uint!(u8, u16, u32, u64, u128);

macro_rules! impl_tokenizable_int {
    ($($t:ty),*) => {
        $(
            impl Tokenizable for $t {
                fn from_token(token: Token) -> Result<Self, AbiError> {
                    let value = match token {
                        Token::Int(value) => value,
                        other => return Err(mismatch("int", &other)),
                    };
                    check_int_width(&value, <$t>::BITS as usize).map_err(|e| AbiError::decoding(0, e))?;
                    // Fits in the target width, so the low 64 bits carry the
                    // two's complement value.
                    let low = value.into_raw().as_limbs()[0] as i64;
                    Ok(low as $t)
                }

                fn into_token(self) -> Token {
                    Token::Int(I256::unchecked_from(self))
                }
            }
        )*
    };
}

impl_tokenizable_int!(i8, i16, i32, i64);

impl Tokenizable for Address {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Address(address) => Ok(address),
            other => Err(mismatch("address", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Address(self)
    }
}

impl Tokenizable for bool {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Bool(value) => Ok(value),
            other => Err(mismatch("bool", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Bool(self)
    }
}

impl Tokenizable for String {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::String(self)
    }
}

impl Tokenizable for Bytes {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Bytes(bytes) => Ok(Bytes::from(bytes)),
            other => Err(mismatch("bytes", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Bytes(self.to_vec())
    }
}

impl<const N: usize> Tokenizable for FixedBytes<N> {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::FixedBytes(bytes) if bytes.len() == N => Ok(FixedBytes::from_slice(&bytes)),
            other => Err(mismatch(&format!("bytes{N}"), &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::FixedBytes(self.to_vec())
    }
}

impl<T: Tokenizable> Tokenizable for Vec<T> {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Array(items) | Token::FixedArray(items) => {
                items.into_iter().map(T::from_token).collect()
            }
            other => Err(mismatch("array", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Array(self.into_iter().map(T::into_token).collect())
    }
}

impl<T: Tokenizable, const N: usize> Tokenizable for [T; N] {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        let items = match token {
            Token::FixedArray(items) | Token::Array(items) => items,
            other => return Err(mismatch("fixed array", &other)),
        };
        let values = items.into_iter().map(T::from_token).collect::<Result<Vec<_>, _>>()?;
        let len = values.len();
        values
            .try_into()
            .map_err(|_| AbiError::decoding(0, format!("expected {N} elements, got {len}")))
    }

    fn into_token(self) -> Token {
        Token::FixedArray(self.into_iter().map(T::into_token).collect())
    }
}

impl Tokenizable for () {
    fn from_token(token: Token) -> Result<Self, AbiError> {
        match token {
            Token::Tuple(items) if items.is_empty() => Ok(()),
            other => Err(mismatch("empty tuple", &other)),
        }
    }

    fn into_token(self) -> Token {
        Token::Tuple(Vec::new())
    }
}

macro_rules! impl_tokenizable_tuple {
    ($len:expr => $($name:ident),+) => {
        impl<$($name: Tokenizable),+> Tokenizable for ($($name,)+) {
            fn from_token(token: Token) -> Result<Self, AbiError> {
                let items = match token {
                    Token::Tuple(items) if items.len() == $len => items,
                    other => return Err(mismatch(concat!("tuple of ", stringify!($len)), &other)),
                };
                let mut items = items.into_iter();
                Ok(($(
                    $name::from_token(items.next().ok_or_else(|| AbiError::decoding(0, "tuple too short"))?)?,
                )+))
            }

            #[allow(non_snake_case)]
            fn into_token(self) -> Token {
                let ($($name,)+) = self;
                Token::Tuple(vec![$($name.into_token()),+])
            }
        }
    };
}

impl_tokenizable_tuple!(1 => A);
impl_tokenizable_tuple!(2 => A, B);
impl_tokenizable_tuple!(3 => A, B, C);
impl_tokenizable_tuple!(4 => A, B, C, D);
impl_tokenizable_tuple!(5 => A, B, C, D, E);
impl_tokenizable_tuple!(6 => A, B, C, D, E, F);

/// Converts the decoded outputs of a call into a Rust value.
///
/// No outputs map to `()`, a single output maps to its own type, and several
/// outputs map to a tuple.
pub fn detokenize<R: Tokenizable>(mut tokens: Vec<Token>) -> Result<R, AbiError> {
    let token = if tokens.len() == 1 {
        tokens.remove(0)
    } else {
        Token::Tuple(tokens)
    };
    R::from_token(token)
}
