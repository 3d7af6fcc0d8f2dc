// Chain facts as returned by a provider, and the pure functions turning them
// into the pipeline's `Transaction` records.

use crate::models::{
    BlockBatch, ChainKey, InternalTransfer, TokenTransfer, Transaction, WalletAddress,
};
use alloy_primitives::U256;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Native and token amounts are scaled by this many decimal places for display.
pub const DISPLAY_DECIMALS: usize = 18;

const PARAM_HEX_LEN: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected 3 Transfer parameters, got {0}")]
    ParameterCount(usize),

    #[error("invalid hex quantity: {0}")]
    InvalidQuantity(String),

    #[error("not a hex string: {0}")]
    InvalidHex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBody {
    pub number: u64,
    pub timestamp: i64,
    pub transactions: Vec<BlockTransaction>,
}

/// A raw log entry matching the Transfer topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLog {
    pub transaction_hash: String,
    pub address: String,
    #[serde(default)]
    pub log_index: Option<String>,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalTransferRecord {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
}

/// Parses a `0x`-prefixed JSON-RPC quantity.
pub fn parse_quantity(value: &str) -> Result<U256, DecodeError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidQuantity(value.to_string()))
}

/// Parses a base-10 amount as reported by explorer APIs.
pub fn parse_decimal(value: &str) -> Result<U256, DecodeError> {
    if value.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(value, 10).map_err(|_| DecodeError::InvalidQuantity(value.to_string()))
}

pub fn parse_u64_quantity(value: &str) -> Result<u64, DecodeError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| DecodeError::InvalidQuantity(value.to_string()))
}

/// Integer on-chain units -> decimal display units, trailing zeros trimmed.
pub fn format_amount(value: U256) -> String {
    let digits = value.to_string();
    let (int_part, frac_part) = if digits.len() > DISPLAY_DECIMALS {
        let split = digits.len() - DISPLAY_DECIMALS;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = DISPLAY_DECIMALS))
    };
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Strips the `0x` prefix, rejecting anything but ASCII hex digits.
fn hex_digits(value: &str) -> Result<&str, DecodeError> {
    let digits = value.trim_start_matches("0x");
    if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(digits)
    } else {
        Err(DecodeError::InvalidHex(value.to_string()))
    }
}

fn word_to_address(word: &str) -> WalletAddress {
    let start = word.len().saturating_sub(40);
    WalletAddress::new(format!("0x{}", &word[start..]))
}

/// Extracts (sender, recipient, amount) from a Transfer log. Parameters are
/// taken from `topics[1..]` followed by the data payload cut into 32-byte words.
pub fn decode_transfer_log(log: &TransferLog) -> Result<TokenTransfer, DecodeError> {
    let mut params: Vec<&str> = log
        .topics
        .iter()
        .skip(1)
        .map(String::as_str)
        .map(hex_digits)
        .collect::<Result<_, _>>()?;

    let mut rest = hex_digits(&log.data)?;
    while !rest.is_empty() {
        let take = rest.len().min(PARAM_HEX_LEN);
        params.push(&rest[..take]);
        rest = &rest[take..];
    }

    if params.len() != 3 {
        return Err(DecodeError::ParameterCount(params.len()));
    }

    Ok(TokenTransfer {
        transaction_hash: log.transaction_hash.to_lowercase(),
        contract_address: WalletAddress::new(&log.address),
        from: word_to_address(params[0]),
        to: word_to_address(params[1]),
        value: parse_quantity(params[2])?,
    })
}

/// Decodes the return data of `symbol()`: ABI `string` or legacy `bytes32`.
pub fn decode_abi_string(data: &str) -> Option<String> {
    let hex = hex_digits(data).ok()?;
    let word = |index: usize| {
        let start = index.checked_mul(PARAM_HEX_LEN)?;
        hex.get(start..start.checked_add(PARAM_HEX_LEN)?)
    };
    let bytes_of = |chunk: &str| -> Option<Vec<u8>> {
        (0..chunk.len())
            .step_by(2)
            .map(|i| chunk.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
            .collect()
    };

    let text = if hex.len() == PARAM_HEX_LEN {
        let bytes = bytes_of(word(0)?)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec()).ok()?
    } else {
        let offset = usize::from_str_radix(word(0)?, 16).ok()? / 32;
        let len = usize::from_str_radix(word(offset)?, 16).ok()?;
        let start = offset.checked_add(1)?.checked_mul(PARAM_HEX_LEN)?;
        let end = start.checked_add(len.checked_mul(2)?)?;
        let payload = hex.get(start..end)?;
        String::from_utf8(bytes_of(payload)?).ok()?
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Builds one record per mined transaction and attaches each internal and
/// token transfer to its owning transaction. Undecodable logs are dropped.
pub fn assemble_block(
    chain_key: &ChainKey,
    body: BlockBody,
    logs: &[TransferLog],
    internals: Vec<InternalTransferRecord>,
) -> BlockBatch {
    let mut transactions: HashMap<String, Transaction> = body
        .transactions
        .into_iter()
        .map(|tx| {
            let hash = tx.hash.to_lowercase();
            let record = Transaction {
                hash: hash.clone(),
                from: WalletAddress::new(&tx.from),
                to: tx.to.as_deref().map(WalletAddress::new),
                value: tx.value,
                timestamp: body.timestamp,
                internal_transfers: Vec::new(),
                token_transfers: Vec::new(),
            };
            (hash, record)
        })
        .collect();

    for internal in internals {
        match transactions.get_mut(&internal.hash.to_lowercase()) {
            Some(tx) => tx.internal_transfers.push(InternalTransfer {
                from: WalletAddress::new(&internal.from),
                to: internal.to.as_deref().map(WalletAddress::new),
                value: internal.value,
            }),
            None => warn!(
                chain = %chain_key,
                block = body.number,
                tx = %internal.hash,
                "Internal transfer references a transaction outside the block, dropping"
            ),
        }
    }

    for log in logs {
        let transfer = match decode_transfer_log(log) {
            Ok(transfer) => transfer,
            Err(e) => {
                warn!(
                    chain = %chain_key,
                    block = body.number,
                    tx = %log.transaction_hash,
                    log_index = log.log_index.as_deref().unwrap_or("?"),
                    "Error while parsing Transfer event: {}", e
                );
                continue;
            }
        };
        match transactions.get_mut(&transfer.transaction_hash) {
            Some(tx) => tx.token_transfers.push(transfer),
            None => warn!(
                chain = %chain_key,
                block = body.number,
                tx = %transfer.transaction_hash,
                "Transfer log references a transaction outside the block, dropping"
            ),
        }
    }

    BlockBatch {
        chain_key: chain_key.clone(),
        block_number: body.number,
        transactions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER_WORD: &str =
        "0x0000000000000000000000001111111111111111111111111111111111111111";
    const RECIPIENT_WORD: &str =
        "0x000000000000000000000000AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

    fn log(topics: Vec<&str>, data: &str) -> TransferLog {
        TransferLog {
            transaction_hash: "0xABC".into(),
            address: "0xToken".into(),
            log_index: Some("0x1".into()),
            topics: topics.into_iter().map(String::from).collect(),
            data: data.into(),
        }
    }

    #[test]
    fn format_amount_scales_by_eighteen_decimals() {
        assert_eq!(format_amount(U256::ZERO), "0");
        assert_eq!(format_amount(U256::from(1_000_000_000_000_000_000u128)), "1");
        assert_eq!(format_amount(U256::from(1_500_000_000_000_000_000u128)), "1.5");
        assert_eq!(format_amount(U256::from(1u64)), "0.000000000000000001");
        assert_eq!(
            format_amount(U256::from(123_450_000_000_000_000_000u128)),
            "123.45"
        );
    }

    #[test]
    fn decodes_erc20_transfer_from_topics_and_data() {
        let amount = format!("0x{:064x}", 5_000u64);
        let transfer =
            decode_transfer_log(&log(vec![TRANSFER_TOPIC, SENDER_WORD, RECIPIENT_WORD], &amount))
                .unwrap();

        assert_eq!(transfer.transaction_hash, "0xabc");
        assert_eq!(transfer.contract_address.as_str(), "0xtoken");
        assert_eq!(
            transfer.from.as_str(),
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(
            transfer.to.as_str(),
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(transfer.value, U256::from(5_000u64));
    }

    #[test]
    fn decodes_transfer_with_unindexed_parameters() {
        let data = format!(
            "0x{}{}{:064x}",
            SENDER_WORD.trim_start_matches("0x"),
            RECIPIENT_WORD.trim_start_matches("0x"),
            7u64
        );
        let transfer = decode_transfer_log(&log(vec![TRANSFER_TOPIC], &data)).unwrap();
        assert_eq!(transfer.value, U256::from(7u64));
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let result = decode_transfer_log(&log(vec![TRANSFER_TOPIC, SENDER_WORD], "0x"));
        assert_eq!(result, Err(DecodeError::ParameterCount(1)));

        let result = decode_transfer_log(&log(
            vec![TRANSFER_TOPIC, SENDER_WORD, RECIPIENT_WORD, SENDER_WORD],
            &format!("0x{:064x}", 1u64),
        ));
        assert_eq!(result, Err(DecodeError::ParameterCount(4)));
    }

    #[test]
    fn decodes_string_and_bytes32_symbols() {
        let mut encoded = String::from("0x");
        encoded.push_str(&format!("{:064x}", 32));
        encoded.push_str(&format!("{:064x}", 4));
        encoded.push_str(&format!("{:0<64}", "55534454"));
        assert_eq!(decode_abi_string(&encoded), Some("USDT".to_string()));

        let bytes32 = format!("0x{:0<64}", "4d4b52");
        assert_eq!(decode_abi_string(&bytes32), Some("MKR".to_string()));

        assert_eq!(decode_abi_string("0x"), None);
    }

    #[test]
    fn oversized_symbol_length_is_rejected() {
        let mut encoded = String::from("0x");
        encoded.push_str(&format!("{:064x}", 32));
        encoded.push_str(&format!("{:064x}", 0x8000_0000_0000_0000u64));
        encoded.push_str(&format!("{:0<64}", "55534454"));
        assert_eq!(decode_abi_string(&encoded), None);

        let mut far_offset = String::from("0x");
        far_offset.push_str(&format!("{:064x}", u64::MAX));
        far_offset.push_str(&format!("{:064x}", 4));
        assert_eq!(decode_abi_string(&far_offset), None);
    }

    #[test]
    fn non_hex_log_payload_is_a_decode_error() {
        let data = format!("0x{}é", "a".repeat(63));
        let result =
            decode_transfer_log(&log(vec![TRANSFER_TOPIC, SENDER_WORD, RECIPIENT_WORD], &data));
        assert_eq!(result, Err(DecodeError::InvalidHex(data)));

        let topic = format!("0x{}ü", "0".repeat(62));
        let result = decode_transfer_log(&log(
            vec![TRANSFER_TOPIC, &topic, RECIPIENT_WORD],
            &format!("0x{:064x}", 1u64),
        ));
        assert!(matches!(result, Err(DecodeError::InvalidHex(_))));

        assert_eq!(decode_abi_string(&format!("0x{}é", "4".repeat(63))), None);
    }

    #[test]
    fn assemble_attaches_transfers_by_hash_and_drops_orphans() {
        let chain = ChainKey::new("BSC").unwrap();
        let body = BlockBody {
            number: 10,
            timestamp: 1_700_000_000,
            transactions: vec![BlockTransaction {
                hash: "0xABC".into(),
                from: "0x01".into(),
                to: Some("0x02".into()),
                value: U256::from(1u64),
            }],
        };
        let amount = format!("0x{:064x}", 1u64);
        let logs = vec![
            log(vec![TRANSFER_TOPIC, SENDER_WORD, RECIPIENT_WORD], &amount),
            log(vec![TRANSFER_TOPIC, SENDER_WORD], "0x"),
        ];
        let internals = vec![
            InternalTransferRecord {
                hash: "0xabc".into(),
                from: "0x02".into(),
                to: Some("0x03".into()),
                value: U256::from(2u64),
            },
            InternalTransferRecord {
                hash: "0xdead".into(),
                from: "0x02".into(),
                to: None,
                value: U256::from(2u64),
            },
        ];

        let batch = assemble_block(&chain, body, &logs, internals);
        let tx = &batch.transactions["0xabc"];
        assert_eq!(batch.block_number, 10);
        assert_eq!(tx.timestamp, 1_700_000_000);
        assert_eq!(tx.internal_transfers.len(), 1);
        assert_eq!(tx.token_transfers.len(), 1);
    }
}
