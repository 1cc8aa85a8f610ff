//! Momentum scoring.
//!
//! Four global Welford accumulators (cross-token by design, so z-scores
//! stay comparable between tokens) feed a weighted z-composite. Tokens
//! carrying a Phase-1 snapshot blend in a hotness term computed from
//! true on-chain counts. Confirmation dwell is advanced on monotonic
//! wall-clock ticks only.

use crate::config::{ThresholdsConfig, WeightsConfig};
use crate::token_state::TokenState;
use crate::types::{ExitReason, MomentumScore, ScoreComponents};

const Z_CLAMP: f64 = 6.0;
/// Fallback per-swap notional (SOL) for the Phase-1 inflow estimate when
/// no trailing average is available yet.
const DEFAULT_PER_SWAP_SOL: f64 = 0.5;
/// Continuous negative 15s inflow required for a flow-reversal exit.
const FLOW_REVERSAL_DWELL_MS: u64 = 5_000;

/// Numerically stable one-pass mean/variance accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct WelfordStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl WelfordStats {
    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let variance = self.m2 / (self.n - 1) as f64;
        if variance > 0.0 {
            Some(variance.sqrt())
        } else {
            None
        }
    }

    /// Z-score of `x` against the accumulated distribution, clamped to
    /// [-6, 6]; zero while undefined.
    pub fn z_score(&self, x: f64) -> f64 {
        match self.std_dev() {
            Some(sigma) => ((x - self.mean) / sigma).clamp(-Z_CLAMP, Z_CLAMP),
            None => 0.0,
        }
    }
}

pub struct MomentumScorer {
    swap_count_stats: WelfordStats,
    net_inflow_stats: WelfordStats,
    unique_buyers_stats: WelfordStats,
    price_change_stats: WelfordStats,

    weights: WeightsConfig,
    entry_threshold: f64,
    exit_threshold: f64,
    confirmation_secs: u64,
}

impl MomentumScorer {
    pub fn new(weights: WeightsConfig, thresholds: &ThresholdsConfig) -> Self {
        Self {
            swap_count_stats: WelfordStats::default(),
            net_inflow_stats: WelfordStats::default(),
            unique_buyers_stats: WelfordStats::default(),
            price_change_stats: WelfordStats::default(),
            weights,
            entry_threshold: thresholds.entry_threshold,
            exit_threshold: thresholds.exit_threshold,
            confirmation_secs: thresholds.confirmation_secs,
        }
    }

    /// One scoring tick for a token: observe, score, advance dwell.
    pub fn tick(&mut self, state: &mut TokenState, now_ms: u64) -> MomentumScore {
        let m15 = state.metrics_15s(now_ms);
        let m60 = state.metrics_60s(now_ms);
        let phase1 = state.phase1_stats().cloned();

        // Phase-1-aware input substitution: the snapshot carries true
        // on-chain counts where Phase-2 attribution is thin.
        let (swap_count, net_inflow_sol, unique_buyers) = match &phase1 {
            Some(p1) => {
                let per_swap_sol = state
                    .trailing_avg_notional_sol()
                    .unwrap_or(DEFAULT_PER_SWAP_SOL);
                let inflow = (p1.buys as f64 - p1.sells as f64) * per_swap_sol;

                let seen = m60.unique_buyers.len() as u64;
                let buyers = if seen == 0 {
                    ((p1.swaps_in_window / 3) as u64).min(10)
                } else {
                    seen
                };
                (p1.swaps_in_window as f64, inflow, buyers as f64)
            }
            None => (
                m15.swap_count as f64,
                m15.net_inflow as f64 / 1e9,
                m60.unique_buyers.len() as f64,
            ),
        };
        let price_change = m60.price_change_pct;

        self.swap_count_stats.update(swap_count);
        self.net_inflow_stats.update(net_inflow_sol);
        self.unique_buyers_stats.update(unique_buyers);
        self.price_change_stats.update(price_change);

        let components = ScoreComponents {
            swap_count_z: self.swap_count_stats.z_score(swap_count),
            net_inflow_z: self.net_inflow_stats.z_score(net_inflow_sol),
            unique_buyers_z: self.unique_buyers_stats.z_score(unique_buyers),
            price_change_z: self.price_change_stats.z_score(price_change),
        };

        let z_composite = self.weights.swap_count * components.swap_count_z
            + self.weights.net_inflow * components.net_inflow_z
            + self.weights.unique_buyers * components.unique_buyers_z
            + self.weights.price_change * components.price_change_z;

        let total_score = match &phase1 {
            Some(p1) => 0.6 * Self::hotness(p1.swaps_in_window, p1.buy_ratio, p1.is_new_momentum)
                + 0.4 * z_composite,
            None => z_composite,
        };

        let above_entry = total_score >= self.entry_threshold;
        let negative_inflow = m15.net_inflow < 0;
        state.update_dwell(now_ms, above_entry, negative_inflow);

        MomentumScore {
            mint: state.mint.clone(),
            timestamp_ms: now_ms,
            total_score,
            components,
            is_above_entry_threshold: above_entry,
            is_above_exit_threshold: total_score >= self.exit_threshold,
            consecutive_above_entry_secs: state.consecutive_above_entry_ms as f64 / 1_000.0,
        }
    }

    /// Tiered hotness term from true Phase-1 counts.
    fn hotness(swaps: u32, buy_ratio: f64, is_new_momentum: bool) -> f64 {
        let base = if swaps >= 30 {
            3.0
        } else if swaps >= 15 {
            2.0
        } else if swaps >= 5 {
            1.0
        } else {
            0.0
        };
        let ratio_boost = if buy_ratio >= 0.8 { 1.2 } else { 1.0 };
        let momentum_boost = if is_new_momentum { 1.1 } else { 1.0 };
        base * ratio_boost * momentum_boost
    }

    /// Entry requires the score above threshold AND the confirmation
    /// dwell served; neither alone suffices.
    pub fn entry_ready(&self, score: &MomentumScore) -> bool {
        score.is_above_entry_threshold
            && score.consecutive_above_entry_secs >= self.confirmation_secs as f64
    }

    /// Exit check for a token with an open position. Momentum decay takes
    /// precedence over flow reversal; at most one reason per tick.
    pub fn should_exit(&self, state: &TokenState, score: &MomentumScore) -> Option<ExitReason> {
        if score.total_score < self.exit_threshold {
            return Some(ExitReason::MomentumDecay);
        }
        if state.consecutive_negative_inflow_ms >= FLOW_REVERSAL_DWELL_MS {
            return Some(ExitReason::FlowReversal);
        }
        None
    }
}
