use decision_core::{EngineError, RiskProfile, Round, RoundContext, RoundStatus};
use futures_util::FutureExt;
use notification_service::{Alert, AlertType};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tracing::Instrument;

use crate::config::LoopTiming;
use crate::kill_switch::KillSwitch;
use crate::metrics::EngineMetrics;
use crate::pipeline::RoundPipeline;
use crate::state_machine::{EngineState, RoundStateMachine};
use crate::store::RoundStore;

/// Why the round loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    Shutdown,
    KillSwitch {
        reason: String,
        flattened: usize,
        flatten_error: Option<String>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub profile: RiskProfile,
    pub timing: LoopTiming,
    /// 0 disables the automatic kill switch
    pub max_consecutive_failures: u32,
    pub metrics_log_interval: u64,
}

/// Drives rounds back to back until shutdown or the kill switch.
///
/// A round that errors or panics is logged, reported and followed by the
/// failure cool-down; it never ends the loop.
pub struct RoundDriver {
    pipeline: RoundPipeline,
    settings: DriverSettings,
    state: RoundStateMachine,
    metrics: EngineMetrics,
    consecutive_failures: u32,
    store: Option<Arc<RoundStore>>,
}

impl RoundDriver {
    pub fn new(pipeline: RoundPipeline, settings: DriverSettings) -> Self {
        Self {
            pipeline,
            settings,
            state: RoundStateMachine::new(),
            metrics: EngineMetrics::new(settings.metrics_log_interval),
            consecutive_failures: 0,
            store: None,
        }
    }

    /// Persist metrics to this store after every round.
    pub fn with_metrics_store(mut self, store: Arc<RoundStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state.state()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut EngineMetrics {
        &mut self.metrics
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        self.pipeline.kill_switch()
    }

    pub async fn run<F>(&mut self, shutdown: F) -> ExitReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let kill_switch = self.kill_switch().clone();

        loop {
            if kill_switch.is_active() {
                return self.engage_kill_switch().await;
            }

            let delay = self.run_round().await;

            if kill_switch.is_active() {
                continue;
            }
            tracing::debug!("Next round in {}s", delay.as_secs());

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, leaving round loop");
                    self.metrics.log_metrics();
                    return ExitReason::Shutdown;
                }
                _ = kill_switch.triggered() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run one round and return how long to wait before the next.
    pub async fn run_round(&mut self) -> Duration {
        let ctx = RoundContext::new(self.settings.profile);
        let span = tracing::info_span!("round", round_id = %ctx.round_id);
        self.run_round_in(ctx).instrument(span).await
    }

    async fn run_round_in(&mut self, ctx: RoundContext) -> Duration {
        let round_start = Instant::now();
        let timing = self.settings.timing;

        if let Err(e) = self.state.begin(ctx.round_id) {
            tracing::error!("Cannot start round: {}", e);
            return timing.failure_cooldown;
        }
        tracing::info!("Round started ({} profile)", ctx.profile);

        let mut round = Round::start(&ctx);
        let sink = self.pipeline.collaborators().sink.clone();
        if let Err(e) = sink.start_round(&round).await {
            tracing::warn!("Failed to record round start: {}", e);
        }

        let outcome = AssertUnwindSafe(self.pipeline.run(&ctx, &round)).catch_unwind().await;

        let delay = match outcome {
            Ok(Ok(report)) => {
                self.consecutive_failures = 0;
                round = report.artifact.round.clone();

                if let Err(e) = sink.record_artifact(&report.artifact).await {
                    tracing::warn!("Failed to record round artifact: {}", e);
                }
                self.metrics.record_artifact(&report.artifact, report.timings);
                log_transition(self.state.complete());

                let skipped = report.artifact.skipped;
                self.notify(AlertType::RoundCompleted {
                    round_id: ctx.round_id.to_string(),
                    duration_secs: round_start.elapsed().as_secs_f64(),
                    orders: round.orders_count,
                    skipped,
                });
                tracing::info!(
                    "Round completed: {} signals, {} orders{}",
                    report.artifact.signals.len(),
                    round.orders_count,
                    if skipped { " (skipped)" } else { "" }
                );

                if skipped {
                    timing.skip_delay
                } else {
                    timing.interval
                }
            }
            Ok(Err(e)) => self.fail_round(&ctx, &mut round, e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.fail_round(&ctx, &mut round, EngineError::Collaborator(format!("round panicked: {}", message)))
            }
        };

        if let Err(e) = sink.end_round(&round).await {
            tracing::warn!("Failed to record round end: {}", e);
        }

        self.metrics.finish_round(round_start);
        if let Some(store) = &self.store {
            if let Err(e) = store.save_metrics(&self.metrics.to_json()).await {
                tracing::debug!("Failed to persist metrics: {}", e);
            }
        }

        log_transition(self.state.reset());
        delay
    }

    fn fail_round(&mut self, ctx: &RoundContext, round: &mut Round, error: EngineError) -> Duration {
        self.consecutive_failures += 1;
        round.finish(RoundStatus::Failed);
        self.metrics.record_failure();
        log_transition(self.state.fail());

        tracing::error!(
            "Round failed ({} in a row): {}",
            self.consecutive_failures,
            error
        );
        self.notify(AlertType::RoundFailed {
            round_id: ctx.round_id.to_string(),
            error: error.to_string(),
            consecutive_failures: self.consecutive_failures,
        });

        let max = self.settings.max_consecutive_failures;
        if max > 0 && self.consecutive_failures >= max {
            self.kill_switch()
                .trigger(format!("{} consecutive round failures, last: {}", self.consecutive_failures, error));
        }

        self.settings.timing.failure_cooldown
    }

    /// Flatten everything and report. Never re-enters the loop, even if flattening fails.
    async fn engage_kill_switch(&mut self) -> ExitReason {
        self.state.engage_kill_switch();
        let reason = self
            .kill_switch()
            .reason()
            .unwrap_or_else(|| "unspecified".to_string());
        let broker = self.pipeline.collaborators().broker.clone();

        tracing::error!("Kill switch engaged ({}), flattening on {}", reason, broker.broker_name());
        let (flattened, flatten_error) = match broker.emergency_close().await {
            Ok(orders) => {
                tracing::warn!("Emergency close sent {} orders", orders.len());
                (orders.len(), None)
            }
            Err(e) => {
                tracing::error!("Emergency close failed: {}", e);
                (0, Some(e.to_string()))
            }
        };

        let alert = Alert::from_type(AlertType::KillSwitchTriggered {
            reason: reason.clone(),
            flattened,
            flatten_error: flatten_error.clone(),
        });
        self.pipeline.collaborators().notifier.send_alert_async(&alert).await;

        if let Some(store) = &self.store {
            store.save_metrics(&self.metrics.to_json()).await.ok();
        }

        ExitReason::KillSwitch {
            reason,
            flattened,
            flatten_error,
        }
    }

    fn notify(&self, alert_type: AlertType) {
        self.pipeline
            .collaborators()
            .notifier
            .send_alert(Alert::from_type(alert_type));
    }
}

/// Resolve on SIGINT or SIGTERM. Both handlers are installed before this
/// returns, so a signal that lands mid-round is held until the loop polls.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    })
}

fn log_transition(result: Result<(), EngineError>) {
    if let Err(e) = result {
        tracing::error!("{}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
