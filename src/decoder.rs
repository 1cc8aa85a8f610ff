//! Binary event decoder for venue program logs.
//!
//! On-chain programs emit self-describing event records as
//! `Program data: <base64>` log lines, tagged by an 8-byte discriminator.
//! The decoder recognizes the bonding-curve trade event (fully
//! attributed: mint, user, exact lamports) and the AMM buy/sell events
//! (amounts and reserves only; mint and user arrive later from the
//! enricher). Malformed or truncated records are skipped silently.

use base64::{engine::general_purpose, Engine as _};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::classifier::MIN_DECODED_NOTIONAL_LAMPORTS;

// Event discriminators from the venue IDLs.
const CURVE_TRADE_EVENT_DISCRIMINATOR: [u8; 8] = [189, 219, 127, 211, 78, 230, 97, 238];
const AMM_BUY_EVENT_DISCRIMINATOR: [u8; 8] = [103, 244, 82, 31, 44, 245, 119, 119];
const AMM_SELL_EVENT_DISCRIMINATOR: [u8; 8] = [62, 47, 55, 10, 165, 3, 220, 42];

const PROGRAM_DATA_PREFIX: &str = "Program data: ";

/// One decoded event record.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    /// Bonding-curve trade: exact semantics straight from the payload.
    CurveTrade {
        mint: String,
        sol_lamports: u64,
        token_amount: u64,
        is_buy: bool,
        user: String,
        timestamp: i64,
        virtual_sol_reserves: u64,
        virtual_token_reserves: u64,
        real_sol_reserves: u64,
        real_token_reserves: u64,
        fee_recipient: String,
        fee_basis_points: u64,
    },
    /// AMM swap: amounts and pool reserves only. The signer and mint are
    /// not in the payload and must be supplied by the enricher, so these
    /// records bypass the dust floor.
    AmmSwap {
        is_buy: bool,
        timestamp: i64,
        base_amount: u64,
        quote_amount: u64,
        pool_base_reserves: u64,
        pool_quote_reserves: u64,
    },
}

pub struct BinaryEventDecoder {
    min_notional_lamports: u64,
}

impl Default for BinaryEventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryEventDecoder {
    pub fn new() -> Self {
        Self {
            min_notional_lamports: MIN_DECODED_NOTIONAL_LAMPORTS,
        }
    }

    /// Decode every recognizable event record in a log batch. Records
    /// with exact notional below the dust floor are dropped here; AMM
    /// records pass through unfiltered for enrichment.
    pub fn decode_all(&self, logs: &[String]) -> Vec<DecodedRecord> {
        let mut records = Vec::new();
        for log in logs {
            let Some(data) = Self::extract_event_data(log) else {
                continue;
            };
            if let Some(record) = self.parse_record(&data) {
                if self.passes_dust_floor(&record) {
                    records.push(record);
                } else {
                    debug!("dust-filtered curve trade below {} lamports", self.min_notional_lamports);
                }
            }
        }
        records
    }

    fn passes_dust_floor(&self, record: &DecodedRecord) -> bool {
        match record {
            DecodedRecord::CurveTrade { sol_lamports, .. } => {
                *sol_lamports >= self.min_notional_lamports
            }
            DecodedRecord::AmmSwap { .. } => true,
        }
    }

    /// Pull the binary payload out of a `Program data:` log line.
    /// Base64 first (the emitter default), base58 as a fallback.
    fn extract_event_data(log: &str) -> Option<Vec<u8>> {
        let start = log.find(PROGRAM_DATA_PREFIX)?;
        let data_str = log[start + PROGRAM_DATA_PREFIX.len()..].trim();
        if let Ok(decoded) = general_purpose::STANDARD.decode(data_str) {
            return Some(decoded);
        }
        bs58::decode(data_str).into_vec().ok()
    }

    fn parse_record(&self, data: &[u8]) -> Option<DecodedRecord> {
        if data.len() < 8 {
            return None;
        }
        let discriminator = &data[0..8];
        let payload = &data[8..];

        if discriminator == CURVE_TRADE_EVENT_DISCRIMINATOR {
            Self::parse_curve_trade(payload)
        } else if discriminator == AMM_BUY_EVENT_DISCRIMINATOR {
            Self::parse_amm_swap(payload, true)
        } else if discriminator == AMM_SELL_EVENT_DISCRIMINATOR {
            Self::parse_amm_swap(payload, false)
        } else {
            None
        }
    }

    fn parse_curve_trade(payload: &[u8]) -> Option<DecodedRecord> {
        let mut cursor = Cursor::new(payload);

        let mint = cursor.read_pubkey()?;
        let sol_lamports = cursor.read_u64()?;
        let token_amount = cursor.read_u64()?;
        let is_buy = cursor.read_bool()?;
        let user = cursor.read_pubkey()?;
        let timestamp = cursor.read_i64()?;
        let virtual_sol_reserves = cursor.read_u64()?;
        let virtual_token_reserves = cursor.read_u64()?;
        let real_sol_reserves = cursor.read_u64()?;
        let real_token_reserves = cursor.read_u64()?;
        let fee_recipient = cursor.read_pubkey()?;
        let fee_basis_points = cursor.read_u64()?;

        Some(DecodedRecord::CurveTrade {
            mint: mint.to_string(),
            sol_lamports,
            token_amount,
            is_buy,
            user: user.to_string(),
            timestamp,
            virtual_sol_reserves,
            virtual_token_reserves,
            real_sol_reserves,
            real_token_reserves,
            fee_recipient: fee_recipient.to_string(),
            fee_basis_points,
        })
    }

    fn parse_amm_swap(payload: &[u8], is_buy: bool) -> Option<DecodedRecord> {
        let mut cursor = Cursor::new(payload);

        let timestamp = cursor.read_i64()?;
        let base_amount = cursor.read_u64()?;
        let quote_amount = cursor.read_u64()?;
        let pool_base_reserves = cursor.read_u64()?;
        let pool_quote_reserves = cursor.read_u64()?;

        Some(DecodedRecord::AmmSwap {
            is_buy,
            timestamp,
            base_amount,
            quote_amount,
            pool_base_reserves,
            pool_quote_reserves,
        })
    }
}

/// Bounds-checked little-endian reader over an event payload.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Some(slice)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take(8).map(|b| u64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.take(8).map(|b| i64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.take(1).map(|b| b[0] != 0)
    }

    fn read_pubkey(&mut self) -> Option<Pubkey> {
        self.take(32)
            .map(|b| Pubkey::new_from_array(b.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_log(payload: &[u8]) -> String {
        format!("Program data: {}", general_purpose::STANDARD.encode(payload))
    }

    fn curve_trade_payload(sol_lamports: u64, is_buy: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&CURVE_TRADE_EVENT_DISCRIMINATOR);
        data.extend_from_slice(&[7u8; 32]); // mint
        data.extend_from_slice(&sol_lamports.to_le_bytes());
        data.extend_from_slice(&1_000_000u64.to_le_bytes()); // token amount
        data.push(u8::from(is_buy));
        data.extend_from_slice(&[9u8; 32]); // user
        data.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        data.extend_from_slice(&30_000_000_000u64.to_le_bytes()); // virtual sol
        data.extend_from_slice(&1_000_000_000_000u64.to_le_bytes()); // virtual tokens
        data.extend_from_slice(&5_000_000_000u64.to_le_bytes()); // real sol
        data.extend_from_slice(&800_000_000_000u64.to_le_bytes()); // real tokens
        data.extend_from_slice(&[3u8; 32]); // fee recipient
        data.extend_from_slice(&100u64.to_le_bytes());
        data
    }

    fn amm_swap_payload(is_buy: bool, quote_amount: u64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(if is_buy {
            &AMM_BUY_EVENT_DISCRIMINATOR
        } else {
            &AMM_SELL_EVENT_DISCRIMINATOR
        });
        data.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        data.extend_from_slice(&123_456u64.to_le_bytes()); // base amount
        data.extend_from_slice(&quote_amount.to_le_bytes());
        data.extend_from_slice(&50_000_000_000u64.to_le_bytes()); // pool base
        data.extend_from_slice(&40_000_000_000u64.to_le_bytes()); // pool quote
        data
    }

    #[test]
    fn test_decode_curve_trade() {
        let decoder = BinaryEventDecoder::new();
        let logs = vec![encode_log(&curve_trade_payload(300_000_000, true))];

        let records = decoder.decode_all(&logs);
        assert_eq!(records.len(), 1);
        match &records[0] {
            DecodedRecord::CurveTrade {
                sol_lamports,
                is_buy,
                fee_basis_points,
                ..
            } => {
                assert_eq!(*sol_lamports, 300_000_000);
                assert!(*is_buy);
                assert_eq!(*fee_basis_points, 100);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_decode_amm_buy_and_sell() {
        let decoder = BinaryEventDecoder::new();
        let logs = vec![
            encode_log(&amm_swap_payload(true, 200_000_000)),
            encode_log(&amm_swap_payload(false, 150_000_000)),
        ];

        let records = decoder.decode_all(&logs);
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], DecodedRecord::AmmSwap { is_buy: true, .. }));
        assert!(matches!(records[1], DecodedRecord::AmmSwap { is_buy: false, .. }));
    }

    #[test]
    fn test_dust_floor_filters_curve_but_not_amm() {
        let decoder = BinaryEventDecoder::new();
        // 0.01 SOL curve trade: below the 0.05 floor, dropped.
        let logs = vec![encode_log(&curve_trade_payload(10_000_000, true))];
        assert!(decoder.decode_all(&logs).is_empty());

        // Same notional in an AMM record: passed through for enrichment.
        let logs = vec![encode_log(&amm_swap_payload(true, 10_000_000))];
        assert_eq!(decoder.decode_all(&logs).len(), 1);
    }

    #[test]
    fn test_truncated_payload_is_skipped() {
        let decoder = BinaryEventDecoder::new();
        let mut payload = curve_trade_payload(300_000_000, true);
        payload.truncate(40); // cuts into the first u64
        let logs = vec![encode_log(&payload)];
        assert!(decoder.decode_all(&logs).is_empty());
    }

    #[test]
    fn test_unknown_discriminator_is_skipped() {
        let decoder = BinaryEventDecoder::new();
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(&[1u8; 64]);
        let logs = vec![encode_log(&payload)];
        assert!(decoder.decode_all(&logs).is_empty());
    }

    #[test]
    fn test_non_event_logs_are_ignored() {
        let decoder = BinaryEventDecoder::new();
        let logs = vec![
            "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]".to_string(),
            "Program log: Instruction: Buy".to_string(),
            "Program data: not-valid-base64!!!".to_string(),
        ];
        assert!(decoder.decode_all(&logs).is_empty());
    }
}
