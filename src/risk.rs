//! Pre-entry risk gating.
//!
//! Eight gates, all of which must pass before an entry signal leaves the
//! pipeline. The evaluator never fails: every gate yields a pass/fail
//! record with a reason, and the overall risk level is derived from the
//! failure set. Gate comparisons run on lamport integers.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::token_state::TokenState;
use crate::types::{lamports_to_sol, sol_to_lamports, LAMPORTS_PER_SOL};
use crate::window::WindowMetrics;

/// Maximum tolerated quoted sell impact (gate 8).
const MAX_SELL_IMPACT_BPS: u32 = 1_000;
/// Buyer/seller overlap ceiling for the wash-trading gate.
const MAX_WASH_OVERLAP_PCT: f64 = 30.0;

/// External sell-route quoter. Absent quoter means the gate passes; a
/// quoter error fails it.
pub trait SellQuoter: Send + Sync {
    fn quote_price_impact_bps(&self, mint: &str, size_lamports: u64) -> Result<u32>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub passed: bool,
    pub level: RiskLevel,
    pub checks: Vec<GateCheck>,
}

impl RiskAssessment {
    pub fn failed_gates(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.gate.as_str())
            .collect()
    }
}

pub struct RiskGates {
    min_liquidity_lamports: u64,
    min_unique_wallets: usize,
    max_concentration_pct: f64,
    max_position_pct_of_pool: f64,
    trade_size_lamports: u64,
    confirmation_ms: u64,
}

impl RiskGates {
    pub fn new(risk: &RiskConfig, confirmation_secs: u64) -> Self {
        Self {
            min_liquidity_lamports: sol_to_lamports(risk.min_liquidity_sol),
            min_unique_wallets: risk.min_unique_wallets,
            max_concentration_pct: risk.max_concentration_pct,
            max_position_pct_of_pool: risk.max_position_pct_of_pool,
            trade_size_lamports: sol_to_lamports(risk.trade_size_sol),
            confirmation_ms: confirmation_secs * 1_000,
        }
    }

    /// Run every gate against the token's current 60-second view.
    pub fn evaluate(
        &self,
        state: &mut TokenState,
        now_ms: u64,
        quoter: Option<&dyn SellQuoter>,
    ) -> RiskAssessment {
        let m60 = state.metrics_60s(now_ms);
        let phase1_swaps = state
            .phase1_stats()
            .map(|p| p.swaps_in_window as u64)
            .unwrap_or(0);
        let phase1_buy_ratio = state.phase1_stats().map(|p| p.buy_ratio);

        let liquidity = self.effective_liquidity(state.estimated_liquidity_lamports, &m60);

        let mut checks = Vec::with_capacity(8);
        checks.push(self.check_liquidity(liquidity));
        checks.push(self.check_wallet_diversity(&m60, phase1_swaps));
        checks.push(self.check_buyer_concentration(&m60, phase1_swaps));
        checks.push(self.check_buy_sell_imbalance(&m60, phase1_buy_ratio));
        checks.push(self.check_position_size(liquidity));
        checks.push(self.check_wash_trading(&m60));
        checks.push(self.check_momentum_confirmation(state.consecutive_above_entry_ms));
        checks.push(self.check_sell_simulation(&state.mint, quoter));

        let failures: Vec<&GateCheck> = checks.iter().filter(|c| !c.passed).collect();
        let extreme = failures
            .iter()
            .any(|c| c.gate == "liquidity" || c.gate == "sell_simulation");
        let level = if extreme {
            RiskLevel::Extreme
        } else {
            match failures.len() {
                0 => RiskLevel::Low,
                1 => RiskLevel::Medium,
                2 => RiskLevel::High,
                _ => RiskLevel::Extreme,
            }
        };

        RiskAssessment {
            passed: failures.is_empty(),
            level,
            checks,
        }
    }

    /// Liquidity estimate with fallbacks: observed pool reserves, then
    /// 5x the 60-second volume, then a swap-velocity-inferred floor.
    fn effective_liquidity(&self, estimated: u64, m60: &WindowMetrics) -> u64 {
        if estimated > 0 {
            return estimated;
        }
        let volume = m60.buy_notional + m60.sell_notional;
        if volume > 0 {
            return volume * 5;
        }
        let floor_sol = match m60.swap_count {
            n if n >= 100 => 50,
            n if n >= 50 => 20,
            n if n >= 20 => 10,
            n if n >= 5 => 5,
            _ => 0,
        };
        floor_sol * LAMPORTS_PER_SOL
    }

    fn check_liquidity(&self, liquidity: u64) -> GateCheck {
        GateCheck {
            gate: "liquidity".to_string(),
            passed: liquidity >= self.min_liquidity_lamports,
            detail: format!(
                "{:.2} SOL vs min {:.2}",
                lamports_to_sol(liquidity),
                lamports_to_sol(self.min_liquidity_lamports)
            ),
        }
    }

    /// Unique-buyer floor. When Phase-1 saw heavy activity but Phase-2
    /// attribution is degenerate (<10% of swaps attributed across >=10
    /// swaps), estimate buyers as max(seen, swaps/2).
    fn check_wallet_diversity(&self, m60: &WindowMetrics, phase1_swaps: u64) -> GateCheck {
        let seen = m60.unique_buyers.len() as u64;
        let degenerate =
            phase1_swaps >= 10 && (seen as f64) < 0.10 * phase1_swaps as f64;
        let effective = if degenerate {
            seen.max(phase1_swaps / 2)
        } else {
            seen
        };
        GateCheck {
            gate: "wallet_diversity".to_string(),
            passed: effective >= self.min_unique_wallets as u64,
            detail: format!(
                "{} unique buyers (effective {}) vs min {}",
                seen, effective, self.min_unique_wallets
            ),
        }
    }

    /// Top-buyer share of buy notional. Skipped when almost nothing is
    /// attributed: concentration over a tiny known subset is noise.
    fn check_buyer_concentration(&self, m60: &WindowMetrics, phase1_swaps: u64) -> GateCheck {
        let swaps = m60.swap_count.max(phase1_swaps);
        let known = m60.unique_buyers.len() as f64 + m60.unique_sellers.len() as f64;
        let known_ratio = if swaps > 0 { known / swaps as f64 } else { 0.0 };

        if swaps >= 20 && known_ratio < 0.10 {
            return GateCheck {
                gate: "buyer_concentration".to_string(),
                passed: true,
                detail: format!("skipped: {:.0}% attribution on {} swaps", known_ratio * 100.0, swaps),
            };
        }

        GateCheck {
            gate: "buyer_concentration".to_string(),
            passed: m60.top_buyer_concentration_pct <= self.max_concentration_pct,
            detail: format!(
                "top buyer {:.1}% vs max {:.1}%",
                m60.top_buyer_concentration_pct, self.max_concentration_pct
            ),
        }
    }

    /// Buy/sell notional ratio must sit in [1, 20]. An all-buy window on
    /// >=5 swaps falls back to the Phase-1 buy ratio.
    fn check_buy_sell_imbalance(
        &self,
        m60: &WindowMetrics,
        phase1_buy_ratio: Option<f64>,
    ) -> GateCheck {
        let (passed, detail) = if m60.sell_notional == 0 {
            if m60.swap_count >= 5 {
                match phase1_buy_ratio {
                    Some(ratio) => (
                        ratio >= 0.5,
                        format!("no sells; phase-1 buy ratio {:.2}", ratio),
                    ),
                    None => (false, "no sells and no phase-1 ratio".to_string()),
                }
            } else {
                (false, "no sells on thin activity".to_string())
            }
        } else {
            let ratio = m60.buy_notional as f64 / m60.sell_notional as f64;
            (
                (1.0..=20.0).contains(&ratio),
                format!("buy/sell ratio {:.2}", ratio),
            )
        };

        GateCheck {
            gate: "buy_sell_imbalance".to_string(),
            passed,
            detail,
        }
    }

    fn check_position_size(&self, liquidity: u64) -> GateCheck {
        let (passed, detail) = if liquidity == 0 {
            (false, "no liquidity estimate".to_string())
        } else {
            let pct = self.trade_size_lamports as f64 / liquidity as f64 * 100.0;
            (
                pct <= self.max_position_pct_of_pool,
                format!("{:.2}% of pool vs max {:.2}%", pct, self.max_position_pct_of_pool),
            )
        };
        GateCheck {
            gate: "position_size".to_string(),
            passed,
            detail,
        }
    }

    /// Buyer/seller overlap as a share of all participants.
    fn check_wash_trading(&self, m60: &WindowMetrics) -> GateCheck {
        let overlap = m60
            .unique_buyers
            .intersection(&m60.unique_sellers)
            .count();
        let total = m60.unique_buyers.union(&m60.unique_sellers).count();

        let (passed, detail) = if total == 0 {
            (true, "no attributed participants".to_string())
        } else {
            let pct = overlap as f64 / total as f64 * 100.0;
            (
                pct <= MAX_WASH_OVERLAP_PCT,
                format!("{:.0}% overlap ({}/{})", pct, overlap, total),
            )
        };

        GateCheck {
            gate: "wash_trading".to_string(),
            passed,
            detail,
        }
    }

    fn check_momentum_confirmation(&self, dwell_ms: u64) -> GateCheck {
        GateCheck {
            gate: "momentum_confirmation".to_string(),
            passed: dwell_ms >= self.confirmation_ms,
            detail: format!("{}ms dwell vs {}ms required", dwell_ms, self.confirmation_ms),
        }
    }

    fn check_sell_simulation(&self, mint: &str, quoter: Option<&dyn SellQuoter>) -> GateCheck {
        let (passed, detail) = match quoter {
            None => (true, "no quoter configured".to_string()),
            Some(q) => match q.quote_price_impact_bps(mint, self.trade_size_lamports) {
                Ok(bps) => (
                    bps <= MAX_SELL_IMPACT_BPS,
                    format!("{}bps impact vs max {}", bps, MAX_SELL_IMPACT_BPS),
                ),
                Err(e) => (false, format!("quote failed: {}", e)),
            },
        };
        GateCheck {
            gate: "sell_simulation".to_string(),
            passed,
            detail,
        }
    }
}
