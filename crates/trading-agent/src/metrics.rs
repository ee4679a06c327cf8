use decision_core::RoundArtifact;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

const RECENT_WINDOW: usize = 20;

/// Wall-clock time spent in each pipeline stage of one round
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub fetch_ms: u64,
    pub claims_ms: u64,
    pub fusion_ms: u64,
    pub risk_ms: u64,
    pub execution_ms: u64,
}

impl StageTimings {
    pub fn start() -> Instant {
        Instant::now()
    }

    pub fn elapsed_ms(start: Instant) -> u64 {
        start.elapsed().as_millis() as u64
    }
}

/// Counters that survive a restart through the round store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricCounters {
    pub rounds_run: u64,
    pub rounds_completed: u64,
    pub rounds_skipped: u64,
    pub rounds_failed: u64,
    pub claims_verified: u64,
    pub claims_rejected: u64,
    pub signals_generated: u64,
    pub risk_rejections: u64,
    pub orders_submitted: u64,
    pub orders_failed: u64,
}

/// Round-level telemetry for the decision engine.
pub struct EngineMetrics {
    pub counters: MetricCounters,
    pub last_stages: StageTimings,
    pub last_total_duration_ms: u64,
    recent_outcomes: VecDeque<bool>,
    log_interval_rounds: u64,
}

impl EngineMetrics {
    pub fn new(log_interval_rounds: u64) -> Self {
        Self {
            counters: MetricCounters::default(),
            last_stages: StageTimings::default(),
            last_total_duration_ms: 0,
            recent_outcomes: VecDeque::with_capacity(RECENT_WINDOW),
            log_interval_rounds,
        }
    }

    pub fn record_artifact(&mut self, artifact: &RoundArtifact, stages: StageTimings) {
        let c = &mut self.counters;
        c.claims_verified += artifact.verified_claims as u64;
        c.claims_rejected += artifact.rejected_claims as u64;
        c.signals_generated += artifact.signals.len() as u64;
        if artifact.risk.as_ref().is_some_and(|v| !v.ok) {
            c.risk_rejections += 1;
        }
        for order in &artifact.orders {
            if order.error.is_some() {
                c.orders_failed += 1;
            } else {
                c.orders_submitted += 1;
            }
        }
        if artifact.skipped {
            c.rounds_skipped += 1;
        } else {
            c.rounds_completed += 1;
        }
        self.last_stages = stages;
        self.push_outcome(true);
    }

    pub fn record_failure(&mut self) {
        self.counters.rounds_failed += 1;
        self.push_outcome(false);
    }

    fn push_outcome(&mut self, ok: bool) {
        self.recent_outcomes.push_back(ok);
        if self.recent_outcomes.len() > RECENT_WINDOW {
            self.recent_outcomes.pop_front();
        }
    }

    pub fn finish_round(&mut self, round_start: Instant) {
        self.last_total_duration_ms = round_start.elapsed().as_millis() as u64;
        self.counters.rounds_run += 1;

        if self.log_interval_rounds > 0 && self.counters.rounds_run.is_multiple_of(self.log_interval_rounds) {
            self.log_metrics();
        }
    }

    /// Share of the last rounds that did not fail (0-100%)
    pub fn recent_success_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 0.0;
        }
        let ok = self.recent_outcomes.iter().filter(|o| **o).count() as f64;
        ok / self.recent_outcomes.len() as f64 * 100.0
    }

    pub fn log_metrics(&self) {
        let c = &self.counters;
        tracing::info!(
            rounds = c.rounds_run,
            completed = c.rounds_completed,
            skipped = c.rounds_skipped,
            failed = c.rounds_failed,
            claims_verified = c.claims_verified,
            claims_rejected = c.claims_rejected,
            signals = c.signals_generated,
            risk_rejections = c.risk_rejections,
            orders_submitted = c.orders_submitted,
            orders_failed = c.orders_failed,
            recent_success = format!("{:.1}%", self.recent_success_rate()),
            last_round_ms = self.last_total_duration_ms,
            last_fetch_ms = self.last_stages.fetch_ms,
            last_claims_ms = self.last_stages.claims_ms,
            last_fusion_ms = self.last_stages.fusion_ms,
            last_risk_ms = self.last_stages.risk_ms,
            last_execution_ms = self.last_stages.execution_ms,
            "Engine metrics summary"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.counters).unwrap_or_default()
    }

    /// Restore counters from persisted JSON. Unknown or malformed input leaves them untouched.
    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        match serde_json::from_value::<MetricCounters>(json.clone()) {
            Ok(counters) => {
                self.counters = counters;
                tracing::info!("Restored metrics from persisted state (rounds={})", self.counters.rounds_run);
            }
            Err(e) => tracing::warn!("Ignoring persisted metrics: {}", e),
        }
    }
}
