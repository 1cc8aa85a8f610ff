//! Ingestion pipeline: venue log subscription, two-phase processing,
//! universe maintenance, scoring ticks, and signal emission.
//!
//! Phase-1 is cheap: discriminator decode plus a heuristic instruction
//! parse feed the hot-candidate tracker. Phase-2 is expensive: on a hot
//! alert, recent signatures for the candidate are enriched over RPC, the
//! real mint is resolved by majority, and verified events enter the
//! universe. All downstream consumers hear about it over one typed
//! channel.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use lru::LruCache;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::classifier::{AddressClassifier, AMM_PROGRAM, BONDING_CURVE_PROGRAM};
use crate::config::Config;
use crate::decoder::{BinaryEventDecoder, DecodedRecord};
use crate::enricher::TransactionEnricher;
use crate::hot_tracker::{HotCandidateTracker, Phase2Outcome};
use crate::mint_verifier::MintVerifier;
use crate::risk::{RiskGates, SellQuoter};
use crate::rpc::RpcClient;
use crate::scorer::MomentumScorer;
use crate::types::{
    now_ms, EntrySignal, ExitSignal, HotDetectionStats, PipelineEvent, SwapEvent,
};
use crate::universe::TokenUniverse;

/// Signature dedup bound; halved when full.
const DEDUP_CAP: usize = 10_000;
/// Tracked Phase-1 candidates (LRU by last-seen).
const CANDIDATE_RING_CAP: usize = 4_096;
/// Triggering signatures retained per candidate.
const SIGS_PER_CANDIDATE: usize = 20;
/// Signatures enriched per Phase-2 pass.
const PHASE2_SAMPLE: usize = 5;

const SCORING_TICK: Duration = Duration::from_secs(1);
const UNIVERSE_TICK: Duration = Duration::from_secs(10);
const STATS_TICK: Duration = Duration::from_secs(60);

const MAX_RECONNECT_ATTEMPTS: u32 = 10;
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Per-candidate Phase-1 bookkeeping.
struct CandidateMeta {
    signatures: VecDeque<String>,
    liquidity_hint_lamports: Option<u64>,
}

impl CandidateMeta {
    fn new() -> Self {
        Self {
            signatures: VecDeque::new(),
            liquidity_hint_lamports: None,
        }
    }

    fn push_signature(&mut self, signature: &str) {
        if self.signatures.iter().any(|s| s == signature) {
            return;
        }
        self.signatures.push_back(signature.to_string());
        while self.signatures.len() > SIGS_PER_CANDIDATE {
            self.signatures.pop_front();
        }
    }
}

pub struct IngestionPipeline {
    config: Config,
    classifier: Arc<AddressClassifier>,
    decoder: BinaryEventDecoder,
    tracker: Mutex<HotCandidateTracker>,
    universe: Mutex<TokenUniverse>,
    scorer: Mutex<MomentumScorer>,
    gates: RiskGates,
    verifier: Arc<MintVerifier>,
    enricher: Arc<TransactionEnricher>,
    quoter: Option<Arc<dyn SellQuoter>>,

    dedup: Mutex<LruCache<String, ()>>,
    candidates: Mutex<LruCache<String, CandidateMeta>>,
    active_positions: Mutex<HashSet<String>>,

    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl IngestionPipeline {
    /// Wire the full core from configuration. Dependencies are explicit
    /// handles so tests can build a fresh core per case.
    pub fn new(config: Config, events: mpsc::UnboundedSender<PipelineEvent>) -> Result<Self> {
        let classifier = Arc::new(AddressClassifier::new());

        let enricher_rpc = Arc::new(RpcClient::new(
            &config.endpoints.rpc_endpoint,
            config.rate_limits.enricher_interval_ms,
            config.rate_limits.rpc_timeout_secs,
        )?);
        let verifier_rpc = Arc::new(RpcClient::new(
            &config.endpoints.rpc_endpoint,
            config.rate_limits.verifier_interval_ms,
            config.rate_limits.rpc_timeout_secs,
        )?);

        let verifier = Arc::new(MintVerifier::new(verifier_rpc));
        let enricher = Arc::new(TransactionEnricher::new(
            enricher_rpc,
            verifier.clone(),
            classifier.clone(),
        ));

        let tracker = HotCandidateTracker::new(
            config.hotness.hot_threshold,
            config.hotness.hot_window_ms,
            config.hotness.baseline_window_ms,
        );
        let universe = TokenUniverse::new(config.risk.inactivity_timeout_ms);
        let scorer = MomentumScorer::new(config.weights.clone(), &config.thresholds);
        let gates = RiskGates::new(&config.risk, config.thresholds.confirmation_secs);

        Ok(Self {
            config,
            classifier,
            decoder: BinaryEventDecoder::new(),
            tracker: Mutex::new(tracker),
            universe: Mutex::new(universe),
            scorer: Mutex::new(scorer),
            gates,
            verifier,
            enricher,
            quoter: None,
            dedup: Mutex::new(LruCache::new(NonZeroUsize::new(DEDUP_CAP).unwrap())),
            candidates: Mutex::new(LruCache::new(
                NonZeroUsize::new(CANDIDATE_RING_CAP).unwrap(),
            )),
            active_positions: Mutex::new(HashSet::new()),
            events,
        })
    }

    pub fn with_quoter(mut self, quoter: Arc<dyn SellQuoter>) -> Self {
        self.quoter = Some(quoter);
        self
    }

    /// Run until the subscription dies past recovery. Spawns the scoring,
    /// universe, and stats timers, then drives the reconnect loop.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!("🚀 ingestion pipeline starting");

        let scoring = {
            let pipeline = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SCORING_TICK);
                loop {
                    interval.tick().await;
                    pipeline.scoring_tick(now_ms());
                }
            })
        };
        let maintenance = {
            let pipeline = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(UNIVERSE_TICK);
                loop {
                    interval.tick().await;
                    pipeline.universe_tick(now_ms());
                }
            })
        };
        let stats = {
            let pipeline = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_TICK);
                loop {
                    interval.tick().await;
                    pipeline.log_stats();
                }
            })
        };

        let result = self.clone().subscription_loop().await;

        // Shutdown is coarse: stop the timers, abandon in-flight work.
        scoring.abort();
        maintenance.abort();
        stats.abort();
        result
    }

    async fn subscription_loop(self: Arc<Self>) -> Result<()> {
        let mut attempts = 0u32;
        let mut delay = INITIAL_RECONNECT_DELAY;

        loop {
            match self.clone().connect_and_stream().await {
                Ok(()) => {
                    warn!("WebSocket closed cleanly, reconnecting...");
                    attempts = 0;
                    delay = INITIAL_RECONNECT_DELAY;
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_RECONNECT_ATTEMPTS {
                        let msg = format!(
                            "subscription failed after {} attempts: {}",
                            attempts, e
                        );
                        error!("❌ {}", msg);
                        let _ = self.events.send(PipelineEvent::Error(msg.clone()));
                        return Err(anyhow!(msg));
                    }
                    warn!(
                        "WebSocket error: {} — reconnecting in {:?} (attempt {}/{})",
                        e, delay, attempts, MAX_RECONNECT_ATTEMPTS
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    /// One connection lifetime: subscribe to both venue programs and
    /// pump notifications through Phase-1.
    async fn connect_and_stream(self: Arc<Self>) -> Result<()> {
        let (ws_stream, _) = connect_async(self.config.endpoints.ws_endpoint.as_str())
            .await
            .context("Failed to connect to WebSocket")?;
        info!("✅ connected to {}", self.config.endpoints.ws_endpoint);

        let (mut write, mut read) = ws_stream.split();

        for (id, program) in [(1, BONDING_CURVE_PROGRAM), (2, AMM_PROGRAM)] {
            let subscribe = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "logsSubscribe",
                "params": [
                    { "mentions": [program] },
                    { "commitment": "confirmed" }
                ]
            });
            write
                .send(Message::Text(subscribe.to_string()))
                .await
                .context("Failed to send subscription")?;
            info!("📡 subscribed to program logs: {}", program);
        }

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    self.clone().process_ws_message(&text);
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        return Err(anyhow!("failed to send pong: {}", e));
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket closed by server");
                    return Ok(());
                }
                Err(e) => return Err(anyhow!("WebSocket error: {}", e)),
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse a `logsNotification` frame and hand it to Phase-1. Hot
    /// alerts spawn Phase-2 tasks.
    fn process_ws_message(self: Arc<Self>, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return,
        };
        if value.get("method").and_then(|m| m.as_str()) != Some("logsNotification") {
            return;
        }
        let Some(result) = value.pointer("/params/result") else {
            return;
        };

        let slot = result
            .pointer("/context/slot")
            .and_then(|s| s.as_u64())
            .unwrap_or(0);
        let signature = result
            .pointer("/value/signature")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string();
        let failed = result
            .pointer("/value/err")
            .map(|e| !e.is_null())
            .unwrap_or(false);
        let logs: Vec<String> = result
            .pointer("/value/logs")
            .and_then(|l| l.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if signature.is_empty() {
            return;
        }

        let alerts = self.process_notification(&signature, failed, &logs, slot, now_ms());
        for stats in alerts {
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.run_phase2(stats).await;
            });
        }
    }

    /// Phase-1 for one notification: dedup, decode, heuristics, tracker.
    /// Returns hot alerts for the caller to act on.
    pub fn process_notification(
        &self,
        signature: &str,
        failed: bool,
        logs: &[String],
        _slot: u64,
        now: u64,
    ) -> Vec<HotDetectionStats> {
        if failed {
            return Vec::new();
        }

        {
            let mut dedup = self.dedup.lock().unwrap();
            if dedup.contains(signature) {
                return Vec::new();
            }
            dedup.put(signature.to_string(), ());
        }

        // Candidate pairs from decoded records first; the heuristic
        // instruction parse only fills in when decode saw nothing.
        let mut pairs: Vec<(String, bool, Option<String>)> = Vec::new();
        let mut liquidity_hint: Option<u64> = None;

        for record in self.decoder.decode_all(logs) {
            if let DecodedRecord::CurveTrade {
                mint,
                is_buy,
                user,
                real_sol_reserves,
                ..
            } = record
            {
                let wallet = if self.classifier.is_plausible_wallet(&user, &mint) {
                    Some(user)
                } else {
                    None
                };
                liquidity_hint = Some(real_sol_reserves);
                pairs.push((mint, is_buy, wallet));
            }
            // AMM records carry no mint; they surface through Phase-2.
        }

        if pairs.is_empty() {
            pairs = self
                .heuristic_candidates(logs)
                .into_iter()
                .map(|(mint, is_buy)| (mint, is_buy, None))
                .collect();
        }

        let mut alerts = Vec::new();
        for (mint, is_buy, wallet) in pairs {
            if !self.classifier.is_plausible_mint(&mint) {
                continue;
            }

            {
                let mut candidates = self.candidates.lock().unwrap();
                if candidates.get(&mint).is_none() {
                    candidates.put(mint.clone(), CandidateMeta::new());
                }
                if let Some(meta) = candidates.get_mut(&mint) {
                    meta.push_signature(signature);
                    if liquidity_hint.is_some() {
                        meta.liquidity_hint_lamports = liquidity_hint;
                    }
                }
            }

            let alert = self.tracker.lock().unwrap().record_swap(
                &mint,
                signature,
                is_buy,
                wallet.as_deref(),
                now,
            );
            if let Some(stats) = alert {
                alerts.push(stats);
            }
        }

        alerts
    }

    /// Fallback candidate extraction from instruction log lines, for
    /// venues whose events did not decode: direction from the
    /// instruction name, mints from plausible base58 tokens in the batch.
    fn heuristic_candidates(&self, logs: &[String]) -> Vec<(String, bool)> {
        let saw_buy = logs.iter().any(|l| l.contains("Instruction: Buy"));
        let saw_sell = logs.iter().any(|l| l.contains("Instruction: Sell"));
        if !saw_buy && !saw_sell {
            return Vec::new();
        }
        let is_buy = saw_buy;

        let mut mints = Vec::new();
        for log in logs {
            for token in log.split(|c: char| !c.is_ascii_alphanumeric()) {
                if (43..=44).contains(&token.len())
                    && self.classifier.is_plausible_mint(token)
                    && !mints.iter().any(|(m, _)| m == token)
                {
                    mints.push((token.to_string(), is_buy));
                }
            }
        }
        mints
    }

    /// Phase-2: enrich the candidate's recent signatures, resolve the
    /// real mint by majority, and admit verified events.
    async fn run_phase2(self: Arc<Self>, stats: HotDetectionStats) {
        let candidate = stats.mint.clone();
        let (signatures, liquidity_hint) = {
            let mut candidates = self.candidates.lock().unwrap();
            match candidates.get(&candidate) {
                Some(meta) => {
                    let sigs: Vec<String> = meta
                        .signatures
                        .iter()
                        .rev()
                        .take(PHASE2_SAMPLE)
                        .cloned()
                        .collect();
                    (sigs, meta.liquidity_hint_lamports)
                }
                None => (Vec::new(), None),
            }
        };

        // Arrival order within the candidate.
        let mut events = Vec::new();
        for signature in signatures.iter().rev() {
            if let Some(event) = self.enricher.enrich(signature).await {
                events.push(event);
            }
        }

        let outcome = self.admit_enriched(&stats, events, liquidity_hint, now_ms());
        self.tracker
            .lock()
            .unwrap()
            .complete_phase2(&candidate, outcome, now_ms());
    }

    /// Resolve the modal mint across enriched events and admit them.
    /// Sync and deterministic; verification already happened per event.
    fn admit_enriched(
        &self,
        stats: &HotDetectionStats,
        events: Vec<SwapEvent>,
        liquidity_hint: Option<u64>,
        now: u64,
    ) -> Phase2Outcome {
        if events.is_empty() {
            // Distinguish a verified-bad mint from pure noise.
            return if self.verifier.is_cached(&stats.mint) == Some(false) {
                self.universe.lock().unwrap().mark_rejected(&stats.mint);
                Phase2Outcome::Rejected
            } else {
                Phase2Outcome::Noise
            };
        }

        // Majority vote across the sample picks the real mint.
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for event in &events {
            match counts.iter_mut().find(|(m, _)| *m == event.mint) {
                Some((_, c)) => *c += 1,
                None => counts.push((event.mint.as_str(), 1)),
            }
        }
        let resolved = counts
            .iter()
            .max_by_key(|(_, c)| *c)
            .map(|(m, _)| m.to_string())
            .unwrap();

        let mut universe = self.universe.lock().unwrap();
        if universe.is_rejected(&resolved) {
            return Phase2Outcome::Rejected;
        }

        let mut admitted = 0usize;
        for event in events.into_iter().filter(|e| e.mint == resolved) {
            let is_new = universe.admit(event, now);
            if is_new {
                let _ = self.events.send(PipelineEvent::TokenEntered {
                    mint: resolved.clone(),
                    timestamp_ms: now,
                });
            }
            admitted += 1;
        }

        if let Some(state) = universe.get_mut(&resolved) {
            state.set_phase1_stats(stats.clone());
            if let Some(hint) = liquidity_hint {
                state.estimated_liquidity_lamports = hint;
            }
        }

        debug!(
            "phase-2 admitted {} events for {}",
            admitted,
            &resolved[..12.min(resolved.len())]
        );
        Phase2Outcome::Success
    }

    /// One scoring pass over every live token: score, dwell, entry
    /// gating, exit checks.
    pub fn scoring_tick(&self, now: u64) {
        let mut universe = self.universe.lock().unwrap();
        let mut scorer = self.scorer.lock().unwrap();
        let mints = universe.mints();

        for mint in mints {
            let Some(state) = universe.get_mut(&mint) else {
                continue;
            };
            let score = scorer.tick(state, now);
            let mut active = self.active_positions.lock().unwrap();

            if !active.contains(&mint) {
                if scorer.entry_ready(&score) {
                    let assessment =
                        self.gates
                            .evaluate(state, now, self.quoter.as_deref());
                    if assessment.passed {
                        info!(
                            "🟢 entry signal: {} score {:.2}",
                            &mint[..12.min(mint.len())],
                            score.total_score
                        );
                        active.insert(mint.clone());
                        let _ = self.events.send(PipelineEvent::Entry(Box::new(EntrySignal {
                            mint: mint.clone(),
                            score: score.clone(),
                            risk: assessment,
                            timestamp_ms: now,
                        })));
                    } else {
                        debug!(
                            "entry blocked for {}: {:?}",
                            &mint[..12.min(mint.len())],
                            assessment.failed_gates()
                        );
                    }
                }
            } else if let Some(reason) = scorer.should_exit(state, &score) {
                info!(
                    "🔴 exit signal: {} ({})",
                    &mint[..12.min(mint.len())],
                    reason.as_str()
                );
                active.remove(&mint);
                let _ = self.events.send(PipelineEvent::Exit(ExitSignal {
                    mint: mint.clone(),
                    reason,
                    score: score.total_score,
                    timestamp_ms: now,
                }));
            }
        }
    }

    /// Periodic maintenance: universe eviction, tracker cleanup, dedup
    /// halving.
    pub fn universe_tick(&self, now: u64) {
        let evicted = self.universe.lock().unwrap().tick(now);
        if !evicted.is_empty() {
            let mut active = self.active_positions.lock().unwrap();
            for mint in &evicted {
                // An evicted token with an open position exits as decayed:
                // five minutes of silence is momentum gone.
                if active.remove(mint) {
                    let _ = self.events.send(PipelineEvent::Exit(ExitSignal {
                        mint: mint.clone(),
                        reason: crate::types::ExitReason::MomentumDecay,
                        score: 0.0,
                        timestamp_ms: now,
                    }));
                }
                let _ = self.events.send(PipelineEvent::TokenExited {
                    mint: mint.clone(),
                    timestamp_ms: now,
                });
            }
        }

        self.tracker.lock().unwrap().cleanup(now);

        let mut dedup = self.dedup.lock().unwrap();
        if dedup.len() >= DEDUP_CAP {
            for _ in 0..DEDUP_CAP / 2 {
                if dedup.pop_lru().is_none() {
                    break;
                }
            }
        }
    }

    fn log_stats(&self) {
        let counters = self.tracker.lock().unwrap().take_counters();
        let (enriched, skipped) = self.enricher.counters.take();
        let universe_len = self.universe.lock().unwrap().len();
        let tracked = self.tracker.lock().unwrap().candidate_count();

        info!(
            "📊 stats: {} live tokens, {} candidates | phase2 {}/{}/{} (started/ok/rejected) | skips: {} cooldown, {} inflight | enrich {} ok / {} skipped | verifier cache {}",
            universe_len,
            tracked,
            counters.phase2_started,
            counters.phase2_success,
            counters.phase2_rejected,
            counters.cooldown_skips,
            counters.inflight_skips,
            enriched,
            skipped,
            self.verifier.cache_len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{sol_to_lamports, TradeSide, Venue};
    use base64::Engine as _;

    const MINT: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJospump";

    fn pipeline() -> (Arc<IngestionPipeline>, mpsc::UnboundedReceiver<PipelineEvent>) {
        pipeline_with(Config::default())
    }

    fn pipeline_with(
        config: Config,
    ) -> (Arc<IngestionPipeline>, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = IngestionPipeline::new(config, tx).unwrap();
        (Arc::new(pipeline), rx)
    }

    fn curve_trade_log(mint_bytes: [u8; 32], user_bytes: [u8; 32], lamports: u64, is_buy: bool) -> String {
        let mut data = Vec::new();
        data.extend_from_slice(&[189, 219, 127, 211, 78, 230, 97, 238]);
        data.extend_from_slice(&mint_bytes);
        data.extend_from_slice(&lamports.to_le_bytes());
        data.extend_from_slice(&1_000_000u64.to_le_bytes());
        data.push(u8::from(is_buy));
        data.extend_from_slice(&user_bytes);
        data.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        data.extend_from_slice(&30_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&1_000_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&20_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&800_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&[3u8; 32]);
        data.extend_from_slice(&100u64.to_le_bytes());
        format!(
            "Program data: {}",
            base64::engine::general_purpose::STANDARD.encode(&data)
        )
    }

    fn event(mint: &str, wallet: &str, timestamp_ms: u64) -> SwapEvent {
        SwapEvent {
            signature: format!("sig-{}-{}", wallet, timestamp_ms),
            slot: 1,
            timestamp_ms,
            mint: mint.to_string(),
            side: TradeSide::Buy,
            notional_lamports: sol_to_lamports(0.5),
            wallet: Some(wallet.to_string()),
            venue: Venue::BondingCurve,
            pool_address: None,
            price_impact_bps: None,
            notional_exact: true,
        }
    }

    fn stats_for(mint: &str) -> HotDetectionStats {
        HotDetectionStats {
            mint: mint.to_string(),
            swaps_in_window: 6,
            buys: 6,
            sells: 0,
            buy_ratio: 1.0,
            unique_wallets: 6,
            window_actual_ms: 5_000,
            baseline_swaps_per_min: 0.0,
            is_new_momentum: true,
        }
    }

    #[test]
    fn test_failed_tx_is_ignored() {
        let (p, _rx) = pipeline();
        let logs = vec!["Program log: Instruction: Buy".to_string()];
        let alerts = p.process_notification("sig1", true, &logs, 1, 0);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_dedup_blocks_second_observation() {
        let (p, _rx) = pipeline();
        let now = 1_000_000;

        let make_logs = |user_tag: u8| {
            let mut user = [9u8; 32];
            user[0] = user_tag;
            vec![curve_trade_log([7u8; 32], user, 300_000_000, true)]
        };

        // The same signature observed twice counts once.
        let logs = make_logs(1);
        p.process_notification("dup-sig", false, &logs, 1, now);
        p.process_notification("dup-sig", false, &logs, 1, now + 10);

        // Three more distinct signatures: four unique records total, one
        // short of the threshold, so no alert yet -- proof the duplicate
        // did not double-count.
        let mut alerts = Vec::new();
        for i in 0..3u64 {
            alerts.extend(p.process_notification(
                &format!("sig{}", i),
                false,
                &make_logs(i as u8 + 2),
                1,
                now + 100 + i,
            ));
        }
        assert!(alerts.is_empty());

        // The fifth unique record tips it over.
        let alerts = p.process_notification("sig-final", false, &make_logs(6), 1, now + 200);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].swaps_in_window, 5);
        assert_eq!(p.candidates.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_heuristic_candidates() {
        let (p, _rx) = pipeline();
        let logs = vec![
            "Program log: Instruction: Buy".to_string(),
            format!("Program log: mint {}", MINT),
        ];
        let candidates = p.heuristic_candidates(&logs);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, MINT);
        assert!(candidates[0].1);
    }

    #[test]
    fn test_heuristic_requires_instruction_line() {
        let (p, _rx) = pipeline();
        let logs = vec![format!("Program log: mint {}", MINT)];
        assert!(p.heuristic_candidates(&logs).is_empty());
    }

    #[test]
    fn test_phase1_hot_alert_after_threshold() {
        let (p, _rx) = pipeline();
        let mut alerts = Vec::new();
        let base = 1_000_000;
        for i in 0..5u64 {
            let mut user = [9u8; 32];
            user[0] = i as u8 + 1;
            let logs = vec![curve_trade_log([7u8; 32], user, 300_000_000, true)];
            alerts.extend(p.process_notification(&format!("sig{}", i), false, &logs, 1, base + i * 1_000));
        }
        assert_eq!(alerts.len(), 1);
        let stats = &alerts[0];
        assert_eq!(stats.swaps_in_window, 5);
        assert_eq!(stats.unique_wallets, 5);
        assert!(stats.is_new_momentum);
    }

    #[test]
    fn test_admit_enriched_resolves_modal_mint() {
        let (p, mut rx) = pipeline();
        let now = 1_000;
        let events = vec![
            event(MINT, "W1", now),
            event(MINT, "W2", now + 1),
            event("BadMintxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx", "W3", now + 2),
        ];

        let outcome = p.admit_enriched(&stats_for(MINT), events, Some(sol_to_lamports(20.0)), now);
        assert_eq!(outcome, Phase2Outcome::Success);

        let mut universe = p.universe.lock().unwrap();
        assert!(universe.contains(MINT));
        assert!(!universe.contains("BadMintxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"));

        let state = universe.get_mut(MINT).unwrap();
        assert_eq!(state.window_60s.swap_count(), 2);
        assert_eq!(state.phase1_stats().unwrap().swaps_in_window, 6);
        assert_eq!(state.estimated_liquidity_lamports, sol_to_lamports(20.0));
        drop(universe);

        match rx.try_recv().unwrap() {
            PipelineEvent::TokenEntered { mint, .. } => assert_eq!(mint, MINT),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_admit_enriched_empty_is_noise() {
        let (p, _rx) = pipeline();
        let outcome = p.admit_enriched(&stats_for(MINT), Vec::new(), None, 0);
        assert_eq!(outcome, Phase2Outcome::Noise);
    }

    #[test]
    fn test_rejected_mint_never_admitted() {
        let (p, _rx) = pipeline();
        p.universe.lock().unwrap().mark_rejected(MINT);
        let outcome = p.admit_enriched(&stats_for(MINT), vec![event(MINT, "W1", 0)], None, 0);
        assert_eq!(outcome, Phase2Outcome::Rejected);
        assert!(!p.universe.lock().unwrap().contains(MINT));
    }

    /// Seed a token whose phase-1 hotness yields a steady 2.376 score:
    /// eight half-SOL buys, one sell, deep liquidity.
    fn seed_strong_token(p: &Arc<IngestionPipeline>, now: u64) {
        let mut events = Vec::new();
        for i in 0..8u64 {
            events.push(event(MINT, &format!("W{}", i), now + i));
        }
        let mut strong = stats_for(MINT);
        strong.swaps_in_window = 35;
        strong.buys = 33;
        strong.sells = 2;
        strong.buy_ratio = 0.94;
        p.admit_enriched(&strong, events, Some(sol_to_lamports(100.0)), now);

        let mut universe = p.universe.lock().unwrap();
        let state = universe.get_mut(MINT).unwrap();
        let mut sell = event(MINT, "S1", now + 20);
        sell.side = TradeSide::Sell;
        sell.notional_lamports = sol_to_lamports(1.0);
        state.apply(sell, now + 20);
    }

    #[test]
    fn test_no_entry_below_threshold() {
        // Default entry bar is 2.5; hotness-only score is 2.376.
        let (p, mut rx) = pipeline();
        let now = 1_000_000;
        seed_strong_token(&p, now);
        let _ = rx.try_recv(); // TokenEntered

        for secs in 0..6u64 {
            p.scoring_tick(now + secs * 1_000);
        }

        assert!(p.active_positions.lock().unwrap().is_empty());
        while let Ok(event) = rx.try_recv() {
            assert!(
                !matches!(event, PipelineEvent::Entry(_)),
                "entry must not fire below threshold"
            );
        }
    }

    #[test]
    fn test_entry_fires_after_dwell_and_gates() {
        // Entry bar below the 2.376 hotness score: the dwell and the
        // gates are the only things standing between.
        let mut config = Config::default();
        config.thresholds.entry_threshold = 2.0;
        let (p, mut rx) = pipeline_with(config);
        let now = 1_000_000;
        seed_strong_token(&p, now);
        let _ = rx.try_recv(); // TokenEntered

        let mut entries = Vec::new();
        for secs in 0..6u64 {
            p.scoring_tick(now + secs * 1_000);
            while let Ok(event) = rx.try_recv() {
                if let PipelineEvent::Entry(entry) = event {
                    entries.push((secs, entry));
                }
            }
        }

        // Exactly one entry, only after the 3-second confirmation dwell.
        assert_eq!(entries.len(), 1);
        let (fired_at, entry) = &entries[0];
        assert!(*fired_at >= 3, "fired at {}s", fired_at);
        assert_eq!(entry.mint, MINT);
        assert!(entry.risk.passed);
        assert!(entry.score.consecutive_above_entry_secs >= 3.0);
        assert!(p.active_positions.lock().unwrap().contains(MINT));
    }

    #[test]
    fn test_universe_tick_emits_exits() {
        let (p, mut rx) = pipeline();
        p.admit_enriched(&stats_for(MINT), vec![event(MINT, "W1", 0)], None, 0);
        let _ = rx.try_recv(); // TokenEntered

        // Pretend the token also holds a position.
        p.active_positions.lock().unwrap().insert(MINT.to_string());

        p.universe_tick(400_000); // past the 300s inactivity timeout

        let mut saw_exit_signal = false;
        let mut saw_token_exited = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::Exit(exit) => {
                    assert_eq!(exit.mint, MINT);
                    saw_exit_signal = true;
                }
                PipelineEvent::TokenExited { mint, .. } => {
                    assert_eq!(mint, MINT);
                    saw_token_exited = true;
                }
                _ => {}
            }
        }
        assert!(saw_exit_signal);
        assert!(saw_token_exited);
        assert!(p.active_positions.lock().unwrap().is_empty());
        assert!(!p.universe.lock().unwrap().contains(MINT));
    }
}
