use serde::{Deserialize, Serialize};

/// Lamports per SOL (fixed 9-decimal scale used for all notional math).
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports to SOL for report boundaries only. Never feed the
/// result back into gate comparisons.
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Venue {
    BondingCurve,
    Amm,
    Unknown,
}

/// One observed trade, fully attributed.
///
/// `timestamp_ms` is stamped at observation (wall clock), not chain block
/// time; sliding windows index by this field throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub signature: String,
    pub slot: u64,
    pub timestamp_ms: u64,
    pub mint: String,
    pub side: TradeSide,
    /// Trade size in lamports of the base asset.
    pub notional_lamports: u64,
    /// Signer wallet; `None` when Phase-1 inferred the trade from logs
    /// without signer attribution. Unique-buyer/seller sets never admit
    /// an anonymous event.
    pub wallet: Option<String>,
    pub venue: Venue,
    pub pool_address: Option<String>,
    pub price_impact_bps: Option<u32>,
    /// True when the notional came from an exact on-chain amount rather
    /// than a heuristic placeholder.
    pub notional_exact: bool,
}

/// Phase-1 snapshot captured at the moment hotness triggered.
/// Write-once per token: immutable until the token is evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotDetectionStats {
    pub mint: String,
    pub swaps_in_window: u32,
    pub buys: u32,
    pub sells: u32,
    pub buy_ratio: f64,
    pub unique_wallets: u32,
    pub window_actual_ms: u64,
    pub baseline_swaps_per_min: f64,
    pub is_new_momentum: bool,
}

/// Z-score components of one scoring tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub swap_count_z: f64,
    pub net_inflow_z: f64,
    pub unique_buyers_z: f64,
    pub price_change_z: f64,
}

/// Output of the momentum scorer at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumScore {
    pub mint: String,
    pub timestamp_ms: u64,
    pub total_score: f64,
    pub components: ScoreComponents,
    pub is_above_entry_threshold: bool,
    pub is_above_exit_threshold: bool,
    pub consecutive_above_entry_secs: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    MomentumDecay,
    FlowReversal,
    MaxHoldTimeExternal,
}

impl ExitReason {
    pub fn as_str(&self) -> &str {
        match self {
            ExitReason::MomentumDecay => "momentum_decay",
            ExitReason::FlowReversal => "flow_reversal",
            ExitReason::MaxHoldTimeExternal => "max_hold_time_external",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySignal {
    pub mint: String,
    pub score: MomentumScore,
    pub risk: crate::risk::RiskAssessment,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSignal {
    pub mint: String,
    pub reason: ExitReason,
    pub score: f64,
    pub timestamp_ms: u64,
}

/// Typed notifications emitted by the pipeline to downstream consumers.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    TokenEntered { mint: String, timestamp_ms: u64 },
    TokenExited { mint: String, timestamp_ms: u64 },
    Entry(Box<EntrySignal>),
    Exit(ExitSignal),
    /// Unrecoverable upstream failure; the pipeline has stopped.
    Error(String),
}
