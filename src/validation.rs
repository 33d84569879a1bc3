/// Input validation for wallet addresses, amounts and signatures
///
/// Everything coming in over HTTP or from upstream aggregators passes through
/// these checks before it reaches the coordination stores. Stores that model
/// a boolean/`Option` failure contract call the `is_*` helpers; handlers use
/// the `validate_*` forms to report the reason.
use crate::error::{ModexoError, Result};
use rust_decimal::Decimal;

/// Shortest base58 encoding of a 32-byte public key
pub const MIN_ADDRESS_LEN: usize = 32;
/// Longest base58 encoding of a 32-byte public key
pub const MAX_ADDRESS_LEN: usize = 44;
/// Largest amount accepted by escrow and pricing inputs (USD)
pub const MAX_AMOUNT_USD: i64 = 1_000_000_000;

/// Validate a Solana address (base58, 32-44 characters)
///
/// # Arguments
/// * `address` - Wallet or mint address
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err` if invalid
pub fn validate_solana_address(address: &str) -> Result<()> {
    let trimmed = address.trim();
    if trimmed.len() < MIN_ADDRESS_LEN || trimmed.len() > MAX_ADDRESS_LEN {
        return Err(ModexoError::Validation(format!(
            "address must be {}-{} characters, got {}",
            MIN_ADDRESS_LEN,
            MAX_ADDRESS_LEN,
            trimmed.len()
        )));
    }

    if bs58::decode(trimmed).into_vec().is_err() {
        return Err(ModexoError::Validation(format!(
            "address is not valid base58: {}",
            trimmed
        )));
    }

    Ok(())
}

pub fn is_valid_solana_address(address: &str) -> bool {
    validate_solana_address(address).is_ok()
}

/// Validate a positive monetary amount
///
/// # Arguments
/// * `amount` - Amount in USD
/// * `field_name` - Name of the field for error messages
pub fn validate_amount(amount: Decimal, field_name: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ModexoError::Validation(format!(
            "{} must be positive: {}",
            field_name, amount
        )));
    }

    if amount > Decimal::from(MAX_AMOUNT_USD) {
        return Err(ModexoError::Validation(format!(
            "{} exceeds maximum {}: {}",
            field_name, MAX_AMOUNT_USD, amount
        )));
    }

    Ok(())
}

/// Decode a base58 ed25519 signature (64 bytes)
pub fn decode_signature(signature: &str) -> Result<[u8; 64]> {
    let bytes = bs58::decode(signature.trim())
        .into_vec()
        .map_err(|e| ModexoError::Validation(format!("signature is not valid base58: {}", e)))?;

    bytes.try_into().map_err(|raw: Vec<u8>| {
        ModexoError::Validation(format!("signature must be 64 bytes, got {}", raw.len()))
    })
}

/// Decode a base58 wallet address into its 32-byte public key
pub fn decode_public_key(address: &str) -> Result<[u8; 32]> {
    validate_solana_address(address)?;
    let bytes = bs58::decode(address.trim())
        .into_vec()
        .map_err(|e| ModexoError::Validation(format!("address is not valid base58: {}", e)))?;

    bytes.try_into().map_err(|raw: Vec<u8>| {
        ModexoError::Validation(format!("public key must be 32 bytes, got {}", raw.len()))
    })
}

/// Validate a free-text field (non-empty, bounded)
pub fn validate_text(value: &str, field_name: &str, max_len: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModexoError::Validation(format!(
            "{} cannot be empty",
            field_name
        )));
    }
    if trimmed.chars().count() > max_len {
        return Err(ModexoError::Validation(format!(
            "{} exceeds {} characters",
            field_name, max_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const WSOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn test_validate_solana_address() {
        assert!(validate_solana_address(WSOL).is_ok());
        assert!(validate_solana_address(USDC).is_ok());

        // Too short / too long
        assert!(validate_solana_address("abc").is_err());
        assert!(validate_solana_address(&"1".repeat(45)).is_err());

        // '0', 'O', 'I' and 'l' are not in the base58 alphabet
        assert!(validate_solana_address(&format!("0{}", &USDC[1..])).is_err());
        assert!(validate_solana_address(&"l".repeat(40)).is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(dec!(10), "amount").is_ok());
        assert!(validate_amount(dec!(0.000001), "amount").is_ok());

        assert!(validate_amount(dec!(0), "amount").is_err());
        assert!(validate_amount(dec!(-5), "amount").is_err());
        assert!(validate_amount(dec!(2000000000), "amount").is_err());
    }

    #[test]
    fn test_decode_signature_length() {
        let sig = bs58::encode([7u8; 64]).into_string();
        assert!(decode_signature(&sig).is_ok());

        let short = bs58::encode([7u8; 32]).into_string();
        assert!(decode_signature(&short).is_err());
        assert!(decode_signature("not-base58!").is_err());
    }

    #[test]
    fn test_decode_public_key() {
        let key = decode_public_key(USDC).unwrap();
        assert_eq!(bs58::encode(key).into_string(), USDC);
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("release on delivery", "condition", 256).is_ok());
        assert!(validate_text("   ", "condition", 256).is_err());
        assert!(validate_text(&"x".repeat(300), "condition", 256).is_err());
    }
}
