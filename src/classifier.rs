//! Address classification predicates.
//!
//! Hot-path filters separating plausible token mints and trader wallets
//! from program accounts, system accounts, and binary garbage that leaks
//! into heuristic log parses. All predicates are allocation-free after
//! the denylist is built.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::types::{sol_to_lamports, LAMPORTS_PER_SOL};

// Venue program IDs, shared with the decoder and enricher.
pub const BONDING_CURVE_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const AMM_PROGRAM: &str = "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA";
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

/// Curated denylist: system programs, token programs, venue programs,
/// aggregators, base mints, and known fee accounts. Anything here is
/// never a candidate mint or a trader wallet.
static DENYLIST: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        SYSTEM_PROGRAM,
        "ComputeBudget111111111111111111111111111111",
        TOKEN_PROGRAM,
        TOKEN_2022_PROGRAM,
        "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
        BONDING_CURVE_PROGRAM,
        AMM_PROGRAM,
        RAYDIUM_AMM_V4,
        // Aggregators
        "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
        "jupoNjAxXgZ4rjzxzPMP4oxduvQsQtZzyknqvzYNrNu",
        // Base mints
        WRAPPED_SOL_MINT,
        USDC_MINT,
        USDT_MINT,
        // Bonding-curve global state and fee accounts
        "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf",
        "CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM",
        "62qc2CNXwrYqQScmEdiZFFAnJR262PxWEuNQtxfafNgV",
        // Metadata program
        "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s",
    ]
    .into_iter()
    .collect()
});

/// Address prefixes that identify pool accounts, authorities, and other
/// protocol-derived addresses rather than freely minted tokens.
static PROTOCOL_PREFIXES: &[&str] = &[
    "Sysvar",
    "Vote111",
    "Stake11",
    "Config1",
    "BPFLoader",
    "NativeLoader",
    "pAMM",
    "SysvarRent",
];

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Upper sanity cap on a single trade's notional: nothing real trades
/// 10,000 SOL through these venues in one swap.
const MAX_PLAUSIBLE_NOTIONAL_SOL: f64 = 10_000.0;

pub struct AddressClassifier {
    max_notional_lamports: u64,
}

impl Default for AddressClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressClassifier {
    pub fn new() -> Self {
        // Touch the denylist so construction, not the hot path, pays for it.
        Lazy::force(&DENYLIST);
        Self {
            max_notional_lamports: sol_to_lamports(MAX_PLAUSIBLE_NOTIONAL_SOL),
        }
    }

    /// True when the address is a known program, system account, venue,
    /// aggregator, base mint, or fee account.
    pub fn is_program_or_system(&self, addr: &str) -> bool {
        DENYLIST.contains(addr)
    }

    /// True when the address could be a freshly minted token: right
    /// length, not denylisted, not a system derivative, not binary
    /// garbage, not protocol-prefixed.
    pub fn is_plausible_mint(&self, addr: &str) -> bool {
        let len = addr.len();
        if !(43..=44).contains(&len) {
            return false;
        }
        if DENYLIST.contains(addr) {
            return false;
        }
        if addr.bytes().all(|b| b == b'1') {
            return false;
        }
        if PROTOCOL_PREFIXES.iter().any(|p| addr.starts_with(p)) {
            return false;
        }
        !Self::looks_like_garbage(addr)
    }

    /// True when the address could be a trader wallet. Wallets can be
    /// slightly shorter than mints (32..=44) but face the same denylist
    /// and garbage filters, and must differ from the paired mint.
    pub fn is_plausible_wallet(&self, addr: &str, paired_mint: &str) -> bool {
        let len = addr.len();
        if !(32..=44).contains(&len) {
            return false;
        }
        if DENYLIST.contains(addr) {
            return false;
        }
        if addr == paired_mint {
            return false;
        }
        !Self::looks_like_garbage(addr)
    }

    /// Combined pre-admission check on an inferred swap.
    pub fn validate_swap(&self, mint: &str, wallet: Option<&str>, notional_lamports: u64) -> bool {
        if !self.is_plausible_mint(mint) {
            return false;
        }
        if let Some(w) = wallet {
            if !self.is_plausible_wallet(w, mint) {
                return false;
            }
        }
        notional_lamports <= self.max_notional_lamports
    }

    /// Repetition/entropy filter for strings that decode from binary
    /// data rather than real base58 addresses:
    /// - any base58-invalid character
    /// - >=4 consecutive identical characters
    /// - fewer than 15 distinct characters
    /// - any single character above 25% frequency
    fn looks_like_garbage(addr: &str) -> bool {
        let bytes = addr.as_bytes();
        let mut freq = [0u8; 128];
        let mut run = 1usize;
        let mut prev = 0u8;

        for (i, &b) in bytes.iter().enumerate() {
            if b >= 128 || !BASE58_ALPHABET.as_bytes().contains(&b) {
                return true;
            }
            freq[b as usize] += 1;
            if i > 0 && b == prev {
                run += 1;
                if run >= 4 {
                    return true;
                }
            } else {
                run = 1;
            }
            prev = b;
        }

        let unique = freq.iter().filter(|&&c| c > 0).count();
        if unique < 15 {
            return true;
        }

        let max_freq = *freq.iter().max().unwrap_or(&0) as usize;
        max_freq * 4 > bytes.len()
    }
}

/// Lamport floor below which decoded bonding-curve trades are dropped as
/// dust before emission (0.05 SOL).
pub const MIN_DECODED_NOTIONAL_LAMPORTS: u64 = LAMPORTS_PER_SOL / 20;
