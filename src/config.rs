use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub endpoints: EndpointsConfig,
    pub thresholds: ThresholdsConfig,
    pub hotness: HotnessConfig,
    pub risk: RiskConfig,
    pub weights: WeightsConfig,
    pub rate_limits: RateLimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointsConfig {
    pub rpc_endpoint: String,
    pub ws_endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub confirmation_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotnessConfig {
    pub hot_threshold: u32,
    pub hot_window_ms: u64,
    pub baseline_window_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    pub min_liquidity_sol: f64,
    pub min_unique_wallets: usize,
    pub max_concentration_pct: f64,
    pub max_position_pct_of_pool: f64,
    pub trade_size_sol: f64,
    pub inactivity_timeout_ms: u64,
}

/// Scoring weights. Must sum to 1.0 within 0.01.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightsConfig {
    pub swap_count: f64,
    pub net_inflow: f64,
    pub unique_buyers: f64,
    pub price_change: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitsConfig {
    /// Minimum interval between full transaction fetches (ms).
    pub enricher_interval_ms: u64,
    /// Minimum interval between account-info fetches (ms).
    pub verifier_interval_ms: u64,
    /// Per-request timeout (secs).
    pub rpc_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointsConfig {
                rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
                ws_endpoint: "wss://api.mainnet-beta.solana.com".to_string(),
            },
            thresholds: ThresholdsConfig {
                entry_threshold: 2.5,
                exit_threshold: 0.5,
                confirmation_secs: 3,
            },
            hotness: HotnessConfig {
                hot_threshold: 5,
                hot_window_ms: 30_000,
                baseline_window_ms: 300_000,
            },
            risk: RiskConfig {
                min_liquidity_sol: 10.0,
                min_unique_wallets: 4,
                max_concentration_pct: 40.0,
                max_position_pct_of_pool: 2.0,
                trade_size_sol: 0.5,
                inactivity_timeout_ms: 300_000,
            },
            weights: WeightsConfig {
                swap_count: 0.20,
                net_inflow: 0.35,
                unique_buyers: 0.25,
                price_change: 0.20,
            },
            rate_limits: RateLimitsConfig {
                enricher_interval_ms: 125,
                verifier_interval_ms: 50,
                rpc_timeout_secs: 5,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try config.toml, fall back to built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::load("config.toml") {
            Ok(config) => Ok(config),
            Err(_) => {
                let mut config = Config::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// RPC_ENDPOINT / WS_ENDPOINT env vars win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(rpc) = std::env::var("RPC_ENDPOINT") {
            self.endpoints.rpc_endpoint = rpc;
        }
        if let Ok(ws) = std::env::var("WS_ENDPOINT") {
            self.endpoints.ws_endpoint = ws;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rpc = url::Url::parse(&self.endpoints.rpc_endpoint)
            .context("rpc_endpoint is not a valid URL")?;
        if !matches!(rpc.scheme(), "http" | "https") {
            bail!("rpc_endpoint must be http(s), got {}", rpc.scheme());
        }
        let ws = url::Url::parse(&self.endpoints.ws_endpoint)
            .context("ws_endpoint is not a valid URL")?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            bail!("ws_endpoint must be ws(s), got {}", ws.scheme());
        }

        if self.thresholds.entry_threshold <= self.thresholds.exit_threshold {
            bail!(
                "entry_threshold ({}) must be strictly greater than exit_threshold ({})",
                self.thresholds.entry_threshold,
                self.thresholds.exit_threshold
            );
        }

        let weight_sum = self.weights.swap_count
            + self.weights.net_inflow
            + self.weights.unique_buyers
            + self.weights.price_change;
        if (weight_sum - 1.0).abs() > 0.01 {
            bail!("scoring weights must sum to 1.0 (got {:.3})", weight_sum);
        }

        if self.hotness.hot_threshold == 0 {
            bail!("hot_threshold must be at least 1");
        }
        if self.hotness.baseline_window_ms <= self.hotness.hot_window_ms {
            bail!("baseline_window_ms must exceed hot_window_ms");
        }

        Ok(())
    }
}
