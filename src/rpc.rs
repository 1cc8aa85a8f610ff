//! JSON-RPC plumbing shared by the enricher and the mint verifier.
//!
//! One HTTP client per concern, each behind a serialized rate limiter:
//! callers queue on an async mutex and are released one inter-call
//! interval apart. A 429 gets exactly one retry after a 1 s backoff.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// FIFO rate limiter: the mutex queues callers, the timestamp spaces
/// them out.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval: Duration::from_millis(min_interval_ms),
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransactionResponse {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub meta: Option<TxMeta>,
    pub transaction: TxPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(default)]
    pub err: Option<Value>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxPayload {
    pub message: TxMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMessage {
    pub account_keys: Vec<AccountKey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKey {
    pub pubkey: String,
    #[serde(default)]
    pub signer: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    #[serde(default)]
    pub ui_amount_string: Option<String>,
    pub amount: String,
    pub decimals: u8,
}

impl UiTokenAmount {
    /// UI-scaled amount, preferring the pre-rendered string.
    pub fn ui_amount(&self) -> f64 {
        if let Some(s) = &self.ui_amount_string {
            if let Ok(v) = s.parse::<f64>() {
                return v;
            }
        }
        self.amount
            .parse::<f64>()
            .map(|raw| raw / 10f64.powi(self.decimals as i32))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub owner: String,
    pub data_len: usize,
}

pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    limiter: RateLimiter,
}

impl RpcClient {
    pub fn new(endpoint: &str, min_interval_ms: u64, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            limiter: RateLimiter::new(min_interval_ms),
        })
    }

    /// Issue one rate-limited JSON-RPC call. A 429 sleeps 1 s and retries
    /// once; any further failure surfaces as Err for the caller to map
    /// to a benign skip.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.limiter.acquire().await;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("RPC request failed")?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            debug!("429 from RPC, backing off {}ms", RETRY_BACKOFF.as_millis());
            tokio::time::sleep(RETRY_BACKOFF).await;
            response = self
                .http
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .context("RPC retry failed")?;
        }

        if !response.status().is_success() {
            return Err(anyhow!("RPC returned status {}", response.status()));
        }

        let payload: Value = response.json().await.context("RPC response not JSON")?;
        if let Some(err) = payload.get("error") {
            return Err(anyhow!("RPC error: {}", err));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("RPC response missing result"))
    }

    /// Fetch a parsed transaction. `Ok(None)` when the node does not
    /// know the signature or the shape is unusable.
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<ParsedTransactionResponse>> {
        let result = self
            .request(
                "getTransaction",
                json!([signature, {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        match serde_json::from_value::<ParsedTransactionResponse>(result) {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => {
                debug!("unparseable transaction {}: {}", &signature[..12.min(signature.len())], e);
                Ok(None)
            }
        }
    }

    /// Fetch owner and data length for an account. `Ok(None)` when the
    /// account does not exist.
    pub async fn get_account_info(&self, address: &str) -> Result<Option<AccountInfo>> {
        let result = self
            .request(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;

        let value = match result.get("value") {
            Some(v) if !v.is_null() => v.clone(),
            _ => return Ok(None),
        };

        let owner = value
            .get("owner")
            .and_then(|o| o.as_str())
            .unwrap_or_default()
            .to_string();

        let data_len = value
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .and_then(|s| s.as_str())
            .and_then(|b64| {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD.decode(b64).ok()
            })
            .map(|bytes| bytes.len())
            .unwrap_or(0);

        Ok(Some(AccountInfo { owner, data_len }))
    }
}
