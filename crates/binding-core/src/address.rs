use alloy_primitives::Address;

use crate::error::AbiError;

/// Parses a 0x-prefixed hex address string.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase and
/// all-uppercase input is accepted as-is.
pub fn parse_address(address: &str) -> Result<Address, AbiError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| AbiError::InvalidAddress("address must start with 0x".into()))?;

    if hex_part.len() != 40 {
        return Err(AbiError::InvalidAddress(format!(
            "expected 40 hex characters, got {}",
            hex_part.len()
        )));
    }

    let bytes = hex::decode(hex_part)
        .map_err(|e| AbiError::InvalidAddress(format!("invalid hex: {e}")))?;
    let parsed = Address::from_slice(&bytes);

    let is_all_lower = hex_part.chars().all(|c| !c.is_ascii_uppercase());
    let is_all_upper = hex_part.chars().all(|c| !c.is_ascii_lowercase());
    if !is_all_lower && !is_all_upper && &checksum_address(&parsed)[2..] != hex_part {
        return Err(AbiError::InvalidAddress(format!("bad checksum: {address}")));
    }

    Ok(parsed)
}

/// Formats an address with EIP-55 mixed-case checksum encoding.
pub fn checksum_address(address: &Address) -> String {
    address.to_checksum(None)
}
