use crate::models::{ChainKey, WalletAddress};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid EVM address format: {0}")]
    InvalidEvmAddress(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Invalid custom name: {0}")]
    InvalidName(String),
}

/// Accepts `0x` followed by exactly 40 hex digits, in any case.
pub fn validate_evm_address(address: &str) -> Result<WalletAddress, ValidationError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ValidationError::MissingParameter("wallet".to_string()));
    }

    let valid = address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::InvalidEvmAddress(address.to_string()));
    }

    Ok(WalletAddress::new(address))
}

/// The key must name one of the configured chains.
pub fn validate_chain_key(key: &str, configured: &[ChainKey]) -> Result<ChainKey, ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::MissingParameter("chain_key".to_string()));
    }
    configured
        .iter()
        .find(|chain| chain.as_str() == key.trim())
        .cloned()
        .ok_or_else(|| ValidationError::UnknownChain(key.to_string()))
}

pub fn validate_custom_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::InvalidName("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}
