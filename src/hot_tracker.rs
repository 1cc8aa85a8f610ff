//! Phase-1 hot-candidate tracking.
//!
//! Decides which candidates deserve expensive Phase-2 enrichment by
//! counting swaps in an exact sliding window per candidate. Counts come
//! from the record deque at decision time, never from a stale bucket.
//! Cooldowns and the in-flight set keep Phase-2 spend bounded.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::types::HotDetectionStats;

/// Per-candidate record cap; beyond this the oldest records roll off.
const RECORD_CAP: usize = 200;
/// Hard cap on tracked candidates; the stalest are dropped past this.
const CANDIDATE_CAP: usize = 2_048;
/// Minimum spacing between baseline recomputations per candidate.
const BASELINE_RECOMPUTE_INTERVAL_MS: u64 = 30_000;

const COOLDOWN_SUCCESS_MS: u64 = 3 * 60 * 1_000;
const COOLDOWN_REJECTED_MS: u64 = 10 * 60 * 1_000;
const COOLDOWN_NOISE_MS: u64 = 15 * 60 * 1_000;

/// Outcome of a Phase-2 pass, setting the re-trigger cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase2Outcome {
    /// Enrichment produced verified swap events.
    Success,
    /// The resolved mint failed verification.
    Rejected,
    /// No coherent mint emerged from the sample.
    Noise,
}

impl Phase2Outcome {
    fn cooldown_ms(self) -> u64 {
        match self {
            Phase2Outcome::Success => COOLDOWN_SUCCESS_MS,
            Phase2Outcome::Rejected => COOLDOWN_REJECTED_MS,
            Phase2Outcome::Noise => COOLDOWN_NOISE_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct SwapRecord {
    timestamp_ms: u64,
    is_buy: bool,
    wallet: Option<String>,
}

struct CandidateState {
    records: VecDeque<(String, SwapRecord)>,
    seen_signatures: HashSet<String>,
    baseline_swaps_per_min: f64,
    last_baseline_recompute_ms: u64,
    last_activity_ms: u64,
}

impl CandidateState {
    fn new(now_ms: u64) -> Self {
        Self {
            records: VecDeque::new(),
            seen_signatures: HashSet::new(),
            baseline_swaps_per_min: 0.0,
            last_baseline_recompute_ms: 0,
            last_activity_ms: now_ms,
        }
    }

    fn push(&mut self, signature: String, record: SwapRecord, horizon_ms: u64) {
        self.seen_signatures.insert(signature.clone());
        self.records.push_back((signature, record));

        let cutoff = self.last_activity_ms.saturating_sub(horizon_ms);
        while let Some((_, front)) = self.records.front() {
            if front.timestamp_ms >= cutoff && self.records.len() <= RECORD_CAP {
                break;
            }
            let (sig, _) = self.records.pop_front().unwrap();
            self.seen_signatures.remove(&sig);
        }
    }
}

/// Counters zeroed on readout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerCounters {
    pub candidates_seen: u64,
    pub phase2_started: u64,
    pub phase2_success: u64,
    pub phase2_rejected: u64,
    pub cooldown_skips: u64,
    pub inflight_skips: u64,
}

pub struct HotCandidateTracker {
    hot_threshold: u32,
    hot_window_ms: u64,
    baseline_window_ms: u64,

    candidates: HashMap<String, CandidateState>,
    cooldowns: HashMap<String, u64>,
    inflight: HashSet<String>,
    counters: TrackerCounters,
}

impl HotCandidateTracker {
    pub fn new(hot_threshold: u32, hot_window_ms: u64, baseline_window_ms: u64) -> Self {
        Self {
            hot_threshold,
            hot_window_ms,
            baseline_window_ms,
            candidates: HashMap::new(),
            cooldowns: HashMap::new(),
            inflight: HashSet::new(),
            counters: TrackerCounters::default(),
        }
    }

    fn prune_horizon_ms(&self) -> u64 {
        (2 * self.hot_window_ms).max(self.baseline_window_ms)
    }

    /// Record one Phase-1 swap observation. Returns a snapshot when the
    /// candidate just crossed the hot threshold; the candidate is then
    /// marked in-flight until `complete_phase2` is called.
    pub fn record_swap(
        &mut self,
        candidate: &str,
        signature: &str,
        is_buy: bool,
        wallet: Option<&str>,
        now_ms: u64,
    ) -> Option<HotDetectionStats> {
        let horizon = self.prune_horizon_ms();
        let hot_window_ms = self.hot_window_ms;
        let baseline_window_ms = self.baseline_window_ms;

        if !self.candidates.contains_key(candidate) {
            self.counters.candidates_seen += 1;
        }
        let state = self
            .candidates
            .entry(candidate.to_string())
            .or_insert_with(|| CandidateState::new(now_ms));

        // Dedup: the same signature never counts twice.
        if state.seen_signatures.contains(signature) {
            return None;
        }

        state.last_activity_ms = now_ms;
        state.push(
            signature.to_string(),
            SwapRecord {
                timestamp_ms: now_ms,
                is_buy,
                wallet: wallet.map(str::to_string),
            },
            horizon,
        );

        // Periodic baseline recompute over the pre-hot-window span.
        if now_ms.saturating_sub(state.last_baseline_recompute_ms)
            >= BASELINE_RECOMPUTE_INTERVAL_MS
        {
            state.last_baseline_recompute_ms = now_ms;
            let span_start = now_ms.saturating_sub(baseline_window_ms);
            let span_end = now_ms.saturating_sub(hot_window_ms);
            let count = state
                .records
                .iter()
                .filter(|(_, r)| r.timestamp_ms >= span_start && r.timestamp_ms < span_end)
                .count();
            let span_mins = (baseline_window_ms - hot_window_ms) as f64 / 60_000.0;
            state.baseline_swaps_per_min = if span_mins > 0.0 {
                count as f64 / span_mins
            } else {
                0.0
            };
        }

        self.check_hot(candidate, now_ms)
    }

    fn check_hot(&mut self, candidate: &str, now_ms: u64) -> Option<HotDetectionStats> {
        if let Some(&until) = self.cooldowns.get(candidate) {
            if now_ms < until {
                self.counters.cooldown_skips += 1;
                return None;
            }
        }
        if self.inflight.contains(candidate) {
            self.counters.inflight_skips += 1;
            return None;
        }

        let state = self.candidates.get(candidate)?;
        let window_start = now_ms.saturating_sub(self.hot_window_ms);

        // Exact count over the sliding window, from the records themselves.
        let mut swaps = 0u32;
        let mut buys = 0u32;
        let mut wallets = HashSet::new();
        let mut any_wallet = false;
        let mut oldest_ts = now_ms;
        for (_, record) in state.records.iter().rev() {
            if record.timestamp_ms < window_start {
                break;
            }
            swaps += 1;
            if record.is_buy {
                buys += 1;
            }
            if let Some(w) = &record.wallet {
                any_wallet = true;
                wallets.insert(w.as_str());
            }
            oldest_ts = record.timestamp_ms;
        }

        if swaps < self.hot_threshold {
            return None;
        }

        let buy_ratio = buys as f64 / swaps as f64;

        // Quality gates scale with data richness: attributed records get
        // wallet-diversity requirements, log-only records a higher bar.
        if any_wallet {
            if wallets.len() < 4 || buy_ratio < 0.5 {
                return None;
            }
        } else if swaps < 2 * self.hot_threshold {
            return None;
        }

        let is_new_momentum = state.baseline_swaps_per_min < self.hot_threshold as f64 / 2.0;

        let stats = HotDetectionStats {
            mint: candidate.to_string(),
            swaps_in_window: swaps,
            buys,
            sells: swaps - buys,
            buy_ratio,
            unique_wallets: wallets.len() as u32,
            window_actual_ms: now_ms.saturating_sub(oldest_ts),
            baseline_swaps_per_min: state.baseline_swaps_per_min,
            is_new_momentum,
        };

        self.inflight.insert(candidate.to_string());
        self.counters.phase2_started += 1;
        info!(
            "🔥 hot candidate {}: {} swaps ({} buys, {} wallets) in {}ms",
            &candidate[..12.min(candidate.len())],
            swaps,
            buys,
            stats.unique_wallets,
            stats.window_actual_ms
        );

        Some(stats)
    }

    /// Clear the in-flight marker and start the outcome's cooldown.
    pub fn complete_phase2(&mut self, candidate: &str, outcome: Phase2Outcome, now_ms: u64) {
        self.inflight.remove(candidate);
        self.cooldowns
            .insert(candidate.to_string(), now_ms + outcome.cooldown_ms());

        match outcome {
            Phase2Outcome::Success => self.counters.phase2_success += 1,
            Phase2Outcome::Rejected | Phase2Outcome::Noise => {
                self.counters.phase2_rejected += 1
            }
        }
        debug!(
            "phase-2 {:?} for {}, cooldown {}s",
            outcome,
            &candidate[..12.min(candidate.len())],
            outcome.cooldown_ms() / 1_000
        );
    }

    pub fn is_inflight(&self, candidate: &str) -> bool {
        self.inflight.contains(candidate)
    }

    /// Periodic maintenance: expire cooldowns, drop stale candidates,
    /// and enforce the candidate cap (stalest-first).
    pub fn cleanup(&mut self, now_ms: u64) {
        self.cooldowns.retain(|_, &mut until| now_ms < until);

        let horizon = self.prune_horizon_ms();
        self.candidates
            .retain(|_, state| now_ms.saturating_sub(state.last_activity_ms) <= horizon);

        if self.candidates.len() > CANDIDATE_CAP {
            let mut by_age: Vec<(String, u64)> = self
                .candidates
                .iter()
                .map(|(k, s)| (k.clone(), s.last_activity_ms))
                .collect();
            by_age.sort_by_key(|(_, ts)| *ts);
            for (mint, _) in by_age.iter().take(self.candidates.len() - CANDIDATE_CAP) {
                self.candidates.remove(mint);
            }
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Snapshot and zero the counters.
    pub fn take_counters(&mut self) -> TrackerCounters {
        std::mem::take(&mut self.counters)
    }
}
