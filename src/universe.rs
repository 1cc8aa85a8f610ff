//! Registry of live tokens.
//!
//! Admission happens only after the mint survives verification; every
//! 10 s tick forces lazy window expiry and evicts tokens whose last
//! activity fell outside the inactivity timeout. Mints that failed
//! verification are memoized in a bounded LRU so repeat observations
//! stay cheap.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tracing::{debug, info};

use crate::token_state::TokenState;
use crate::types::SwapEvent;

pub const UNIVERSE_TICK_INTERVAL_MS: u64 = 10_000;
const REJECTED_MINT_CAP: usize = 10_000;

pub struct TokenUniverse {
    tokens: HashMap<String, TokenState>,
    inactivity_timeout_ms: u64,
    rejected_mints: LruCache<String, ()>,
}

impl TokenUniverse {
    pub fn new(inactivity_timeout_ms: u64) -> Self {
        Self {
            tokens: HashMap::new(),
            inactivity_timeout_ms,
            rejected_mints: LruCache::new(NonZeroUsize::new(REJECTED_MINT_CAP).unwrap()),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.tokens.contains_key(mint)
    }

    pub fn get_mut(&mut self, mint: &str) -> Option<&mut TokenState> {
        self.tokens.get_mut(mint)
    }

    pub fn mints(&self) -> Vec<String> {
        self.tokens.keys().cloned().collect()
    }

    /// Record a mint that failed verification so it is never admitted.
    pub fn mark_rejected(&mut self, mint: &str) {
        self.rejected_mints.put(mint.to_string(), ());
    }

    pub fn is_rejected(&mut self, mint: &str) -> bool {
        self.rejected_mints.get(mint).is_some()
    }

    /// Apply a verified swap. Returns true when this observation admitted
    /// a new token (the caller emits `TokenEntered`).
    ///
    /// The caller is responsible for having verified the mint; a mint in
    /// the rejected memo is refused outright.
    pub fn admit(&mut self, event: SwapEvent, now_ms: u64) -> bool {
        debug_assert!(!self.rejected_mints.contains(&event.mint));

        let is_new = !self.tokens.contains_key(&event.mint);
        let state = self
            .tokens
            .entry(event.mint.clone())
            .or_insert_with(|| TokenState::new(event.mint.clone(), now_ms));
        state.apply(event, now_ms);

        if is_new {
            info!("🪙 token entered universe ({} live)", self.tokens.len());
        }
        is_new
    }

    /// Periodic maintenance: advance every token's windows and evict
    /// inactive ones. Returns the evicted mints (the caller emits
    /// `TokenExited` for each).
    pub fn tick(&mut self, now_ms: u64) -> Vec<String> {
        let timeout = self.inactivity_timeout_ms;
        let mut evicted = Vec::new();

        self.tokens.retain(|mint, state| {
            state.tick_windows(now_ms);
            if state.is_inactive(now_ms, timeout) {
                debug!("🧹 evicting inactive token {}", mint);
                evicted.push(mint.clone());
                false
            } else {
                true
            }
        });

        evicted
    }
}
