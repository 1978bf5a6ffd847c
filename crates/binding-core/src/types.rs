use std::fmt;
use std::str::FromStr;

use crate::error::AbiError;

/// A Solidity ABI type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// `uint<N>`, N in 8..=256, multiple of 8.
    Uint(usize),
    /// `int<N>`, N in 8..=256, multiple of 8.
    Int(usize),
    Address,
    Bool,
    /// `bytes<N>`, N in 1..=32.
    FixedBytes(usize),
    Bytes,
    String,
    /// `T[]`
    Array(Box<ParamType>),
    /// `T[k]`
    FixedArray(Box<ParamType>, usize),
    /// `(T1,...,Tn)`
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Parses a canonical (or aliased) Solidity type string.
    ///
    /// Accepts `uint`/`int` as aliases for the 256-bit forms and tuples
    /// written as `(t1,t2)`, optionally followed by array suffixes.
    pub fn parse(s: &str) -> Result<Self, AbiError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AbiError::InvalidType("empty type".into()));
        }

        // Array suffixes bind last: `uint8[2][]` is a dynamic array of uint8[2].
        if s.ends_with(']') {
            let open = s
                .rfind('[')
                .ok_or_else(|| AbiError::InvalidType(format!("unbalanced brackets in {s}")))?;
            let inner = ParamType::parse(&s[..open])?;
            let len = &s[open + 1..s.len() - 1];
            return if len.is_empty() {
                Ok(ParamType::Array(Box::new(inner)))
            } else {
                let len: usize = len
                    .parse()
                    .map_err(|_| AbiError::InvalidType(format!("invalid array length in {s}")))?;
                let kind = ParamType::FixedArray(Box::new(inner), len);
                kind.checked_head_size()
                    .ok_or_else(|| AbiError::InvalidType(format!("array length overflows in {s}")))?;
                Ok(kind)
            };
        }

        if let Some(body) = s.strip_prefix('(') {
            let body = body
                .strip_suffix(')')
                .ok_or_else(|| AbiError::InvalidType(format!("unbalanced parentheses in {s}")))?;
            let members = split_top_level(body)?
                .into_iter()
                .map(ParamType::parse)
                .collect::<Result<Vec<_>, _>>()?;
            let kind = ParamType::Tuple(members);
            kind.checked_head_size()
                .ok_or_else(|| AbiError::InvalidType(format!("tuple size overflows in {s}")))?;
            return Ok(kind);
        }

        match s {
            "address" => return Ok(ParamType::Address),
            "bool" => return Ok(ParamType::Bool),
            "string" => return Ok(ParamType::String),
            "bytes" => return Ok(ParamType::Bytes),
            "uint" => return Ok(ParamType::Uint(256)),
            "int" => return Ok(ParamType::Int(256)),
            _ => {}
        }

        if let Some(bits) = s.strip_prefix("uint") {
            return Ok(ParamType::Uint(parse_int_width(s, bits)?));
        }
        if let Some(bits) = s.strip_prefix("int") {
            return Ok(ParamType::Int(parse_int_width(s, bits)?));
        }
        if let Some(len) = s.strip_prefix("bytes") {
            let len: usize = len
                .parse()
                .map_err(|_| AbiError::InvalidType(format!("invalid bytes length in {s}")))?;
            if !(1..=32).contains(&len) {
                return Err(AbiError::InvalidType(format!("bytes length out of range in {s}")));
            }
            return Ok(ParamType::FixedBytes(len));
        }

        Err(AbiError::InvalidType(format!("unknown type {s}")))
    }

    /// Whether values of this type are encoded by reference in the tail.
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            ParamType::Tuple(members) => members.iter().any(ParamType::is_dynamic),
            _ => false,
        }
    }

    /// Number of bytes this type occupies in the head of its enclosing tuple.
    ///
    /// Dynamic types occupy a single offset word.
    ///
    /// Saturates for types too large to address; [`ParamType::parse`] rejects
    /// those.
    pub fn head_size(&self) -> usize {
        self.checked_head_size().unwrap_or(usize::MAX)
    }

    fn checked_head_size(&self) -> Option<usize> {
        if self.is_dynamic() {
            return Some(32);
        }
        match self {
            ParamType::FixedArray(inner, len) => inner.checked_head_size()?.checked_mul(*len),
            ParamType::Tuple(members) => members
                .iter()
                .try_fold(0usize, |total, member| total.checked_add(member.checked_head_size()?)),
            _ => Some(32),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Uint(bits) => write!(f, "uint{bits}"),
            ParamType::Int(bits) => write!(f, "int{bits}"),
            ParamType::Address => f.write_str("address"),
            ParamType::Bool => f.write_str("bool"),
            ParamType::FixedBytes(len) => write!(f, "bytes{len}"),
            ParamType::Bytes => f.write_str("bytes"),
            ParamType::String => f.write_str("string"),
            ParamType::Array(inner) => write!(f, "{inner}[]"),
            ParamType::FixedArray(inner, len) => write!(f, "{inner}[{len}]"),
            ParamType::Tuple(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl FromStr for ParamType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamType::parse(s)
    }
}

fn parse_int_width(full: &str, bits: &str) -> Result<usize, AbiError> {
    let bits: usize = bits
        .parse()
        .map_err(|_| AbiError::InvalidType(format!("invalid integer width in {full}")))?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(AbiError::InvalidType(format!("integer width out of range in {full}")));
    }
    Ok(bits)
}

/// Splits a comma-separated type list, ignoring commas nested in parentheses.
pub(crate) fn split_top_level(s: &str) -> Result<Vec<&str>, AbiError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| AbiError::InvalidType(format!("unbalanced parentheses in {s}")))?;
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(AbiError::InvalidType(format!("unbalanced parentheses in {s}")));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_elementary_types() {
        assert_eq!(ParamType::parse("uint256").unwrap(), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int8").unwrap(), ParamType::Int(8));
        assert_eq!(ParamType::parse("address").unwrap(), ParamType::Address);
        assert_eq!(ParamType::parse("bool").unwrap(), ParamType::Bool);
        assert_eq!(ParamType::parse("bytes32").unwrap(), ParamType::FixedBytes(32));
        assert_eq!(ParamType::parse("bytes").unwrap(), ParamType::Bytes);
        assert_eq!(ParamType::parse("string").unwrap(), ParamType::String);
    }

    #[test]
    fn oversized_fixed_arrays_are_rejected() {
        let huge = format!("uint256[{}]", usize::MAX / 16);
        assert!(matches!(ParamType::parse(&huge), Err(AbiError::InvalidType(_))));

        let nested = format!("uint8[{0}][{0}]", 1usize << 40);
        assert!(ParamType::parse(&nested).is_err());

        let kind = ParamType::FixedArray(Box::new(ParamType::Uint(256)), usize::MAX);
        assert_eq!(kind.head_size(), usize::MAX);
        assert_eq!(ParamType::parse("bool[3]").unwrap().head_size(), 96);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!(ParamType::parse("uint").unwrap(), ParamType::Uint(256));
        assert_eq!(ParamType::parse("int").unwrap(), ParamType::Int(256));
    }

    #[test]
    fn parse_nested_arrays() {
        // uint8[2][] is a dynamic array whose elements are uint8[2].
        let ty = ParamType::parse("uint8[2][]").unwrap();
        assert_eq!(
            ty,
            ParamType::Array(Box::new(ParamType::FixedArray(Box::new(ParamType::Uint(8)), 2)))
        );
        assert_eq!(ty.to_string(), "uint8[2][]");
    }

    #[test]
    fn parse_tuple_with_nested_tuple() {
        let ty = ParamType::parse("(uint256,(address,string)[])").unwrap();
        assert_eq!(
            ty,
            ParamType::Tuple(vec![
                ParamType::Uint(256),
                ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::String,
                ]))),
            ])
        );
        assert_eq!(ty.to_string(), "(uint256,(address,string)[])");
    }

    #[test]
    fn parse_rejects_bad_widths() {
        assert!(ParamType::parse("uint7").is_err());
        assert!(ParamType::parse("uint264").is_err());
        assert!(ParamType::parse("bytes0").is_err());
        assert!(ParamType::parse("bytes33").is_err());
        assert!(ParamType::parse("float").is_err());
        assert!(ParamType::parse("(uint256").is_err());
        assert!(ParamType::parse("uint256[x]").is_err());
    }

    #[test]
    fn dynamic_classification() {
        assert!(!ParamType::Uint(256).is_dynamic());
        assert!(ParamType::String.is_dynamic());
        assert!(ParamType::parse("uint256[]").unwrap().is_dynamic());
        assert!(!ParamType::parse("uint256[3]").unwrap().is_dynamic());
        assert!(ParamType::parse("string[3]").unwrap().is_dynamic());
        assert!(!ParamType::parse("(uint256,bool)").unwrap().is_dynamic());
        assert!(ParamType::parse("(uint256,bytes)").unwrap().is_dynamic());
    }

    #[test]
    fn head_sizes() {
        assert_eq!(ParamType::Address.head_size(), 32);
        assert_eq!(ParamType::parse("uint256[3]").unwrap().head_size(), 96);
        assert_eq!(ParamType::parse("(uint256,bool[2])").unwrap().head_size(), 96);
        assert_eq!(ParamType::parse("string[3]").unwrap().head_size(), 32);
    }

    #[test]
    fn empty_tuple() {
        let ty = ParamType::parse("()").unwrap();
        assert_eq!(ty, ParamType::Tuple(vec![]));
        assert_eq!(ty.head_size(), 0);
    }
}
