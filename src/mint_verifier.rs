//! Mint verification against chain state.
//!
//! Decides whether an address is a real fungible-token mint: blocklist
//! fast path, base58 format check, then an account-info fetch checking
//! the owner program and data length. Outcomes are memoized and
//! concurrent requests for one address collapse onto a single fetch.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::classifier::{
    AMM_PROGRAM, BONDING_CURVE_PROGRAM, RAYDIUM_AMM_V4, SYSTEM_PROGRAM, TOKEN_2022_PROGRAM,
    TOKEN_PROGRAM, WRAPPED_SOL_MINT,
};
use crate::rpc::{AccountInfo, RpcClient};

/// Mint account size under the standard token program.
const MINT_ACCOUNT_LEN: usize = 82;
/// Token-account size; a token-2022 account of exactly this length is an
/// associated token account, not a mint.
const TOKEN_ACCOUNT_LEN: usize = 165;

/// Addresses that are never mints regardless of chain state.
const BLOCKLIST: &[&str] = &[
    SYSTEM_PROGRAM,
    TOKEN_PROGRAM,
    TOKEN_2022_PROGRAM,
    BONDING_CURVE_PROGRAM,
    AMM_PROGRAM,
    RAYDIUM_AMM_V4,
    WRAPPED_SOL_MINT,
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
    "ComputeBudget111111111111111111111111111111",
];

pub struct MintVerifier {
    rpc: Arc<RpcClient>,
    cache: DashMap<String, bool>,
    verify_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MintVerifier {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            cache: DashMap::new(),
            verify_locks: DashMap::new(),
        }
    }

    /// Synchronous cache probe; no RPC.
    pub fn is_cached(&self, address: &str) -> Option<bool> {
        self.cache.get(address).map(|entry| *entry.value())
    }

    /// Verify an address, blocking until an answer exists. At most one
    /// fetch per address is ever in flight; latecomers wait on the
    /// per-address lock and read the cached verdict.
    pub async fn is_valid(&self, address: &str) -> bool {
        if BLOCKLIST.contains(&address) {
            return false;
        }
        if let Some(cached) = self.is_cached(address) {
            return cached;
        }
        if Pubkey::from_str(address).is_err() {
            return false;
        }

        let lock = self
            .verify_locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent caller may have resolved it while we waited.
        if let Some(cached) = self.is_cached(address) {
            return cached;
        }

        let verdict = match self.rpc.get_account_info(address).await {
            Ok(Some(info)) => Self::classify_account(&info),
            Ok(None) => false,
            Err(e) => {
                debug!("mint verify RPC failed for {}: {}", &address[..12.min(address.len())], e);
                false
            }
        };

        self.cache.insert(address.to_string(), verdict);
        self.verify_locks.remove(address);
        verdict
    }

    /// Owner/length rules for a mint account.
    fn classify_account(info: &AccountInfo) -> bool {
        match info.owner.as_str() {
            TOKEN_PROGRAM => info.data_len == MINT_ACCOUNT_LEN,
            TOKEN_2022_PROGRAM => {
                info.data_len >= MINT_ACCOUNT_LEN && info.data_len != TOKEN_ACCOUNT_LEN
            }
            _ => false,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
