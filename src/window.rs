//! Time-bounded sliding window over swap events.
//!
//! A deque of events paired with incrementally maintained aggregates so
//! `add` and `tick` stay O(1) amortized. Window membership is indexed by
//! `SwapEvent.timestamp_ms` (stamped at observation), and expiry is
//! driven by the `now_ms` the caller passes in; there is no hidden clock.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::classifier::MIN_DECODED_NOTIONAL_LAMPORTS;
use crate::types::{SwapEvent, TradeSide, Venue};

/// Snapshot of one window's aggregates.
#[derive(Debug, Clone)]
pub struct WindowMetrics {
    pub window_size_ms: u64,
    pub swap_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub buy_notional: u64,
    pub sell_notional: u64,
    pub net_inflow: i128,
    pub unique_buyers: HashSet<String>,
    pub unique_sellers: HashSet<String>,
    /// Percent of buy notional owned by the largest single buyer.
    pub top_buyer_concentration_pct: f64,
    /// Notional-per-swap proxy: percent change between the oldest and
    /// newest in-window notionals. A flow-intensity measure, not a pool
    /// price.
    pub price_change_pct: f64,
    pub first_timestamp_ms: u64,
    pub last_timestamp_ms: u64,
}

impl WindowMetrics {
    fn empty(window_size_ms: u64) -> Self {
        Self {
            window_size_ms,
            swap_count: 0,
            buy_count: 0,
            sell_count: 0,
            buy_notional: 0,
            sell_notional: 0,
            net_inflow: 0,
            unique_buyers: HashSet::new(),
            unique_sellers: HashSet::new(),
            top_buyer_concentration_pct: 0.0,
            price_change_pct: 0.0,
            first_timestamp_ms: 0,
            last_timestamp_ms: 0,
        }
    }
}

pub struct SlidingWindow {
    window_size_ms: u64,
    events: VecDeque<SwapEvent>,
    buy_count: u64,
    sell_count: u64,
    buy_notional: u64,
    sell_notional: u64,
    /// Running per-wallet notionals; an entry is removed the moment its
    /// notional drains to zero so set membership reflects
    /// presence-in-window.
    buyer_notional: HashMap<String, u64>,
    seller_notional: HashMap<String, u64>,
}

impl SlidingWindow {
    pub fn new(window_size_ms: u64) -> Self {
        Self {
            window_size_ms,
            events: VecDeque::new(),
            buy_count: 0,
            sell_count: 0,
            buy_notional: 0,
            sell_notional: 0,
            buyer_notional: HashMap::new(),
            seller_notional: HashMap::new(),
        }
    }

    pub fn window_size_ms(&self) -> u64 {
        self.window_size_ms
    }

    pub fn swap_count(&self) -> u64 {
        self.buy_count + self.sell_count
    }

    /// Add an event at wall-clock `now_ms`: expire first, then append.
    ///
    /// Sub-dust exact notionals are only accepted from the bonding-curve
    /// source; placeholder-valued events bypass the floor entirely (their
    /// count is the signal).
    pub fn add(&mut self, event: SwapEvent, now_ms: u64) -> bool {
        self.tick(now_ms);

        if event.notional_exact
            && event.notional_lamports < MIN_DECODED_NOTIONAL_LAMPORTS
            && event.venue != Venue::BondingCurve
        {
            return false;
        }

        match event.side {
            TradeSide::Buy => {
                self.buy_count += 1;
                self.buy_notional += event.notional_lamports;
                if let Some(wallet) = &event.wallet {
                    *self.buyer_notional.entry(wallet.clone()).or_insert(0) +=
                        event.notional_lamports;
                }
            }
            TradeSide::Sell => {
                self.sell_count += 1;
                self.sell_notional += event.notional_lamports;
                if let Some(wallet) = &event.wallet {
                    *self.seller_notional.entry(wallet.clone()).or_insert(0) +=
                        event.notional_lamports;
                }
            }
        }

        self.events.push_back(event);
        true
    }

    /// Force expiry of everything older than `now_ms - window_size_ms`,
    /// decrementing aggregates as events leave.
    pub fn tick(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_size_ms);
        while let Some(front) = self.events.front() {
            if front.timestamp_ms >= cutoff {
                break;
            }
            let event = self.events.pop_front().unwrap();
            self.evict(&event);
        }
    }

    fn evict(&mut self, event: &SwapEvent) {
        match event.side {
            TradeSide::Buy => {
                debug_assert!(self.buy_count > 0);
                self.buy_count -= 1;
                self.buy_notional = self.buy_notional.saturating_sub(event.notional_lamports);
                if let Some(wallet) = &event.wallet {
                    if let Some(running) = self.buyer_notional.get_mut(wallet) {
                        *running = running.saturating_sub(event.notional_lamports);
                        if *running == 0 {
                            self.buyer_notional.remove(wallet);
                        }
                    }
                }
            }
            TradeSide::Sell => {
                debug_assert!(self.sell_count > 0);
                self.sell_count -= 1;
                self.sell_notional = self.sell_notional.saturating_sub(event.notional_lamports);
                if let Some(wallet) = &event.wallet {
                    if let Some(running) = self.seller_notional.get_mut(wallet) {
                        *running = running.saturating_sub(event.notional_lamports);
                        if *running == 0 {
                            self.seller_notional.remove(wallet);
                        }
                    }
                }
            }
        }
    }

    /// Expire, then snapshot. Set views copy.
    pub fn metrics(&mut self, now_ms: u64) -> WindowMetrics {
        self.tick(now_ms);

        if self.events.is_empty() {
            return WindowMetrics::empty(self.window_size_ms);
        }

        let first = self.events.front().unwrap();
        let last = self.events.back().unwrap();

        let first_notional = first.notional_lamports;
        let last_notional = last.notional_lamports;
        let price_change_pct = if first_notional > 0 {
            (last_notional as f64 - first_notional as f64) / first_notional as f64 * 100.0
        } else {
            0.0
        };

        let top_buyer_concentration_pct = if self.buy_notional > 0 {
            let top = self.buyer_notional.values().max().copied().unwrap_or(0);
            top as f64 / self.buy_notional as f64 * 100.0
        } else {
            0.0
        };

        WindowMetrics {
            window_size_ms: self.window_size_ms,
            swap_count: self.buy_count + self.sell_count,
            buy_count: self.buy_count,
            sell_count: self.sell_count,
            buy_notional: self.buy_notional,
            sell_notional: self.sell_notional,
            net_inflow: self.buy_notional as i128 - self.sell_notional as i128,
            unique_buyers: self.buyer_notional.keys().cloned().collect(),
            unique_sellers: self.seller_notional.keys().cloned().collect(),
            top_buyer_concentration_pct,
            price_change_pct,
            first_timestamp_ms: first.timestamp_ms,
            last_timestamp_ms: last.timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sol_to_lamports;

    fn buy_event(sig: &str, wallet: &str, notional_sol: f64, timestamp_ms: u64) -> SwapEvent {
        SwapEvent {
            signature: sig.to_string(),
            slot: 1,
            timestamp_ms,
            mint: "MintAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            side: TradeSide::Buy,
            notional_lamports: sol_to_lamports(notional_sol),
            wallet: Some(wallet.to_string()),
            venue: Venue::BondingCurve,
            pool_address: None,
            price_impact_bps: None,
            notional_exact: true,
        }
    }

    fn sell_event(sig: &str, wallet: &str, notional_sol: f64, timestamp_ms: u64) -> SwapEvent {
        SwapEvent {
            side: TradeSide::Sell,
            ..buy_event(sig, wallet, notional_sol, timestamp_ms)
        }
    }

    #[test]
    fn test_counts_and_notionals() {
        let mut window = SlidingWindow::new(5_000);
        let t = 1_000_000;

        window.add(buy_event("s1", "w1", 1.0, t), t);
        window.add(buy_event("s2", "w2", 2.0, t + 100), t + 100);
        window.add(sell_event("s3", "w3", 0.5, t + 200), t + 200);

        let metrics = window.metrics(t + 300);
        assert_eq!(metrics.swap_count, 3);
        assert_eq!(metrics.buy_count, 2);
        assert_eq!(metrics.sell_count, 1);
        assert_eq!(metrics.swap_count, metrics.buy_count + metrics.sell_count);
        assert_eq!(metrics.buy_notional, sol_to_lamports(3.0));
        assert_eq!(metrics.sell_notional, sol_to_lamports(0.5));
        assert_eq!(
            metrics.net_inflow,
            sol_to_lamports(3.0) as i128 - sol_to_lamports(0.5) as i128
        );
    }

    #[test]
    fn test_eviction_empties_window() {
        // Three buys at t=0,1,2s in a 5s window, then advance to t=7s.
        let mut window = SlidingWindow::new(5_000);
        window.add(buy_event("s1", "w1", 1.0, 0), 0);
        window.add(buy_event("s2", "w2", 1.0, 1_000), 1_000);
        window.add(buy_event("s3", "w3", 1.0, 2_000), 2_000);

        let metrics = window.metrics(7_001);
        assert_eq!(metrics.swap_count, 0);
        assert_eq!(metrics.buy_notional, 0);
        assert!(metrics.unique_buyers.is_empty());
    }

    #[test]
    fn test_partial_eviction_decrements_aggregates() {
        let mut window = SlidingWindow::new(5_000);
        window.add(buy_event("s1", "w1", 1.0, 0), 0);
        window.add(buy_event("s2", "w2", 2.0, 4_000), 4_000);

        // At t=5.5s only the first event has aged out.
        let metrics = window.metrics(5_500);
        assert_eq!(metrics.swap_count, 1);
        assert_eq!(metrics.buy_notional, sol_to_lamports(2.0));
        assert!(metrics.unique_buyers.contains("w2"));
        assert!(!metrics.unique_buyers.contains("w1"));
    }

    #[test]
    fn test_events_within_bound_after_any_operation() {
        let mut window = SlidingWindow::new(5_000);
        for i in 0..20u64 {
            let t = i * 700;
            window.add(buy_event(&format!("s{}", i), "w", 0.2, t), t);
            for event in &window.events {
                assert!(t - event.timestamp_ms <= 5_000);
            }
        }
    }

    #[test]
    fn test_wallet_entry_removed_at_zero_notional() {
        let mut window = SlidingWindow::new(5_000);
        window.add(buy_event("s1", "w1", 1.0, 0), 0);
        window.add(buy_event("s2", "w1", 1.0, 4_000), 4_000);

        // First of w1's two buys expires; the wallet stays present.
        let metrics = window.metrics(5_500);
        assert!(metrics.unique_buyers.contains("w1"));

        // Second expires too; w1 must disappear from the set.
        let metrics = window.metrics(9_500);
        assert!(metrics.unique_buyers.is_empty());
    }

    #[test]
    fn test_anonymous_wallets_never_enter_sets() {
        let mut window = SlidingWindow::new(5_000);
        let mut event = buy_event("s1", "w1", 1.0, 0);
        event.wallet = None;
        window.add(event, 0);

        let metrics = window.metrics(100);
        assert_eq!(metrics.swap_count, 1);
        assert!(metrics.unique_buyers.is_empty());
    }

    #[test]
    fn test_top_buyer_concentration() {
        let mut window = SlidingWindow::new(60_000);
        window.add(buy_event("s1", "whale", 8.0, 0), 0);
        window.add(buy_event("s2", "w2", 1.0, 100), 100);
        window.add(buy_event("s3", "w3", 1.0, 200), 200);

        let metrics = window.metrics(300);
        assert!((metrics.top_buyer_concentration_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_proxy_change() {
        let mut window = SlidingWindow::new(60_000);
        window.add(buy_event("s1", "w1", 1.0, 0), 0);
        window.add(buy_event("s2", "w2", 1.5, 100), 100);

        let metrics = window.metrics(200);
        assert!((metrics.price_change_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_notional_bypasses_dust_floor() {
        let mut window = SlidingWindow::new(5_000);
        let mut event = buy_event("s1", "w1", 0.001, 0);
        event.venue = Venue::Amm;
        event.notional_exact = false;
        assert!(window.add(event, 0));

        // The same sub-floor notional marked exact from a non-curve
        // source is rejected.
        let mut event = buy_event("s2", "w2", 0.001, 10);
        event.venue = Venue::Amm;
        assert!(!window.add(event, 10));
    }
}
