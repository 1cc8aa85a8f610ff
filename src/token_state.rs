//! Per-token aggregation bundle: three windows, lifecycle timestamps,
//! the write-once Phase-1 snapshot, and the dwell counters the scorer
//! drives on every tick.

use std::collections::VecDeque;
use tracing::debug;

use crate::types::{lamports_to_sol, HotDetectionStats, SwapEvent};
use crate::window::{SlidingWindow, WindowMetrics};

pub const WINDOW_5S_MS: u64 = 5_000;
pub const WINDOW_15S_MS: u64 = 15_000;
pub const WINDOW_60S_MS: u64 = 60_000;

/// How many recent exact notionals feed the trailing per-swap average
/// used by the Phase-1 inflow estimator.
const RECENT_NOTIONAL_CAP: usize = 20;

pub struct TokenState {
    pub mint: String,
    pub first_seen_ms: u64,
    pub last_activity_ms: u64,
    pub all_time_swap_count: u64,

    pub window_5s: SlidingWindow,
    pub window_15s: SlidingWindow,
    pub window_60s: SlidingWindow,

    /// Notional-per-swap proxy of the most recent event.
    pub estimated_price: f64,
    /// Pool-side reserve hint in lamports, when a decoded curve event
    /// carried one. Zero until observed.
    pub estimated_liquidity_lamports: u64,

    phase1_stats: Option<HotDetectionStats>,

    // Dwell counters, advanced only by monotonic scoring ticks.
    pub consecutive_above_entry_ms: u64,
    pub consecutive_negative_inflow_ms: u64,
    pub last_dwell_tick_ms: u64,

    /// Trailing exact notionals (lamports) for the inflow estimator.
    recent_exact_notionals: VecDeque<u64>,
}

impl TokenState {
    pub fn new(mint: String, now_ms: u64) -> Self {
        Self {
            mint,
            first_seen_ms: now_ms,
            last_activity_ms: now_ms,
            all_time_swap_count: 0,
            window_5s: SlidingWindow::new(WINDOW_5S_MS),
            window_15s: SlidingWindow::new(WINDOW_15S_MS),
            window_60s: SlidingWindow::new(WINDOW_60S_MS),
            estimated_price: 0.0,
            estimated_liquidity_lamports: 0,
            phase1_stats: None,
            consecutive_above_entry_ms: 0,
            consecutive_negative_inflow_ms: 0,
            last_dwell_tick_ms: now_ms,
            recent_exact_notionals: VecDeque::new(),
        }
    }

    /// Apply one enriched event to all three windows.
    pub fn apply(&mut self, event: SwapEvent, now_ms: u64) {
        self.last_activity_ms = now_ms;
        self.all_time_swap_count += 1;
        self.estimated_price = lamports_to_sol(event.notional_lamports);

        if event.notional_exact {
            self.recent_exact_notionals.push_back(event.notional_lamports);
            while self.recent_exact_notionals.len() > RECENT_NOTIONAL_CAP {
                self.recent_exact_notionals.pop_front();
            }
        }

        self.window_5s.add(event.clone(), now_ms);
        self.window_15s.add(event.clone(), now_ms);
        self.window_60s.add(event, now_ms);
    }

    /// Force lazy expiry on all windows without adding.
    pub fn tick_windows(&mut self, now_ms: u64) {
        self.window_5s.tick(now_ms);
        self.window_15s.tick(now_ms);
        self.window_60s.tick(now_ms);
    }

    pub fn metrics_15s(&mut self, now_ms: u64) -> WindowMetrics {
        self.window_15s.metrics(now_ms)
    }

    pub fn metrics_60s(&mut self, now_ms: u64) -> WindowMetrics {
        self.window_60s.metrics(now_ms)
    }

    pub fn phase1_stats(&self) -> Option<&HotDetectionStats> {
        self.phase1_stats.as_ref()
    }

    /// Phase-1 snapshot is write-once: the first call wins, later calls
    /// are ignored until the token is evicted.
    pub fn set_phase1_stats(&mut self, stats: HotDetectionStats) {
        if self.phase1_stats.is_none() {
            self.phase1_stats = Some(stats);
        } else {
            debug!("ignoring repeated phase-1 snapshot for {}", self.mint);
        }
    }

    /// Trailing average exact notional in SOL, when at least three
    /// samples exist. Feeds the Phase-1 net-inflow estimate.
    pub fn trailing_avg_notional_sol(&self) -> Option<f64> {
        if self.recent_exact_notionals.len() < 3 {
            return None;
        }
        let sum: u64 = self.recent_exact_notionals.iter().sum();
        Some(lamports_to_sol(sum / self.recent_exact_notionals.len() as u64))
    }

    /// Advance the dwell counters by one monotonic tick. `above_entry`
    /// and `negative_inflow` are the conditions observed at `now_ms`.
    pub fn update_dwell(&mut self, now_ms: u64, above_entry: bool, negative_inflow: bool) {
        let elapsed = now_ms.saturating_sub(self.last_dwell_tick_ms);
        self.last_dwell_tick_ms = now_ms;

        if above_entry {
            self.consecutive_above_entry_ms += elapsed;
        } else {
            self.consecutive_above_entry_ms = 0;
        }

        if negative_inflow {
            self.consecutive_negative_inflow_ms += elapsed;
        } else {
            self.consecutive_negative_inflow_ms = 0;
        }
    }

    pub fn is_inactive(&self, now_ms: u64, inactivity_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > inactivity_timeout_ms
    }
}
