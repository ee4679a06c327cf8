use broker_trait::{BrokerOrderSide, ExecutionAdapter};
use chrono::{DateTime, Duration, Utc};
use consensus_builder::{build_consensus, detect_conflicts};
use decision_core::{
    Claim, ClaimGenerator, ClaimVerifier, EngineError, Evidence, EvidenceKind, EvidenceProvider, EvidenceQuery,
    MarketDataProvider, MarketStats, RiskRequest, RiskService, RiskVerdict, Role, RoleContext, Round, RoundArtifact,
    RoundContext, RoundSink, RoundStatus, Side, SubmittedOrder, TechnicalIndicators, TechnicalProvider,
    UniverseFilters,
};
use futures_util::future::{join_all, try_join_all};
use notification_service::{Alert, AlertType, NotificationService};
use portfolio_constructor::{CorrelationGroup, PortfolioConstructor, RebalanceCalculator};
use rust_decimal::prelude::*;
use signal_processor::SignalProcessor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::kill_switch::KillSwitch;
use crate::metrics::StageTimings;

/// Evidence rows fetched from the store per ticker
const EVIDENCE_FETCH_LIMIT: usize = 50;

/// Everything a round talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataProvider>,
    pub technical: Arc<dyn TechnicalProvider>,
    pub evidence: Arc<dyn EvidenceProvider>,
    pub claims: Arc<dyn ClaimGenerator>,
    pub verifier: Arc<dyn ClaimVerifier>,
    pub risk: Arc<dyn RiskService>,
    pub broker: Arc<dyn ExecutionAdapter>,
    pub sink: Arc<dyn RoundSink>,
    pub notifier: NotificationService,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub filters: UniverseFilters,
    pub timeframe: String,
    pub evidence_max_age: Duration,
    pub news_lookback: Duration,
    pub conflict_gap: f64,
    pub min_order_notional: Decimal,
    pub correlated: CorrelationGroup,
}

impl PipelineSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            filters: config.universe_filters(),
            timeframe: config.technical_timeframe.clone(),
            evidence_max_age: Duration::hours(config.evidence_max_age_hours),
            news_lookback: Duration::hours(config.news_lookback_hours),
            conflict_gap: config.conflict_confidence_gap,
            min_order_notional: Decimal::from_f64(config.min_order_notional).unwrap_or(Decimal::TEN),
            correlated: CorrelationGroup::new(config.correlated_assets.iter()),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            filters: UniverseFilters {
                min_volume: 0.0,
                limit: 25,
            },
            timeframe: "1h".to_string(),
            evidence_max_age: Duration::hours(24),
            news_lookback: Duration::hours(24),
            conflict_gap: consensus_builder::DEFAULT_CONFIDENCE_GAP,
            min_order_notional: Decimal::TEN,
            correlated: CorrelationGroup::majors(),
        }
    }
}

/// A finished round: its artifact plus per-stage timings
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub artifact: RoundArtifact,
    pub timings: StageTimings,
}

/// One pass from universe to orders.
pub struct RoundPipeline {
    collaborators: Collaborators,
    settings: PipelineSettings,
    processor: SignalProcessor,
    constructor: PortfolioConstructor,
    kill_switch: KillSwitch,
}

impl RoundPipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings, kill_switch: KillSwitch) -> Self {
        let constructor = PortfolioConstructor::new(settings.correlated.clone());
        Self {
            collaborators,
            settings,
            processor: SignalProcessor::new(),
            constructor,
            kill_switch,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    fn notify(&self, alert_type: AlertType) {
        self.collaborators.notifier.send_alert(Alert::from_type(alert_type));
    }

    /// Run one round. Errors abort the round; the caller owns the retry policy.
    pub async fn run(&self, ctx: &RoundContext, round: &Round) -> Result<RoundReport, EngineError> {
        let c = &self.collaborators;
        let params = ctx.profile.params();
        let mut timings = StageTimings::default();
        let round_id = ctx.round_id.to_string();

        // 1. Universe and market stats
        let started = StageTimings::start();
        let universe = dedup(c.market.get_universe(ctx, &self.settings.filters).await?);
        tracing::info!("Universe: {} tickers", universe.len());
        self.notify(AlertType::RoundStarted {
            round_id: round_id.clone(),
            profile: ctx.profile.to_string(),
            universe_size: universe.len(),
        });

        let market_stats = self.fetch_market_stats(ctx, &universe).await;
        if market_stats.is_empty() {
            tracing::warn!("No market data for any of {} tickers, skipping round", universe.len());
            timings.fetch_ms = StageTimings::elapsed_ms(started);
            return Ok(RoundReport {
                artifact: empty_artifact(ctx, round, universe.len()),
                timings,
            });
        }
        let mut tickers: Vec<String> = market_stats.keys().cloned().collect();
        tickers.sort();

        // 2. News, stored evidence and technicals
        let now = Utc::now();
        let (mut facts, technical) = tokio::join!(
            self.gather_evidence(ctx, &tickers, now),
            self.fetch_technicals(ctx, &tickers)
        );
        let derived = derived_evidence(ctx, &market_stats, &technical);
        if let Err(e) = c.evidence.put_evidence(ctx, &derived).await {
            tracing::warn!("Failed to store derived evidence: {}", e);
        }
        facts.extend(derived);
        timings.fetch_ms = StageTimings::elapsed_ms(started);
        tracing::info!(
            "Fetched data: {} with stats, {} with technicals, {} evidence items",
            market_stats.len(),
            technical.len(),
            facts.len()
        );

        // 3. Claims, one generator call per role
        let started = StageTimings::start();
        let input = RoleContext {
            round_id: ctx.round_id,
            universe: tickers.clone(),
            facts,
            market_stats: market_stats.clone(),
            risk_profile: ctx.profile,
            timestamp: now,
        };
        let per_role = try_join_all(Role::ALL.iter().map(|role| c.claims.run_role(ctx, *role, &input))).await?;
        let claims: Vec<Claim> = per_role.into_iter().flatten().collect();
        let generated = claims.len();

        let cutoff = ctx.started_at - self.settings.evidence_max_age;
        let outcome = c.verifier.verify_claims(ctx, claims, &input.facts, cutoff).await?;
        if let Err(e) = c.sink.record_claims(round, &outcome.verified, &outcome.rejected).await {
            tracing::warn!("Failed to record claims: {}", e);
        }
        timings.claims_ms = StageTimings::elapsed_ms(started);
        tracing::info!(
            "Claims: {} generated, {} verified, {} rejected",
            generated,
            outcome.verified.len(),
            outcome.rejected.len()
        );

        // 4. Fusion, consensus and target weights
        let started = StageTimings::start();
        let signals = self
            .processor
            .process_signals(&outcome.verified, &market_stats, ctx.profile, Some(&technical));
        let consensus = build_consensus(&signals, &outcome.verified, &market_stats, params.max_positions);
        let conflicts = detect_conflicts(&outcome.verified, self.settings.conflict_gap);
        let target_weights = self.constructor.build_target_weights(&signals, ctx.profile);
        timings.fusion_ms = StageTimings::elapsed_ms(started);

        let buys = target_weights.iter().filter(|t| t.side == Side::Buy).count();
        let sells = target_weights.iter().filter(|t| t.side == Side::Sell).count();
        tracing::info!(
            "Signals: {} tickers, {} consensus, {} conflicts, {} targets ({} buy / {} sell)",
            signals.len(),
            consensus.len(),
            conflicts.len(),
            target_weights.len(),
            buys,
            sells
        );
        self.notify(AlertType::SignalsReady {
            round_id: round_id.clone(),
            signals: signals.len(),
            buys,
            sells,
            top: consensus.iter().take(3).map(|r| r.ticker.clone()).collect(),
        });

        // 5. Risk check against the live book
        let started = StageTimings::start();
        let positions = c
            .broker
            .get_positions()
            .await
            .map_err(|e| EngineError::Execution(format!("get_positions: {}", e)))?;
        let account = c
            .broker
            .get_account()
            .await
            .map_err(|e| EngineError::Execution(format!("get_account: {}", e)))?;

        let verdict = c
            .risk
            .check_limits(
                ctx,
                RiskRequest {
                    target_weights: &target_weights,
                    current_positions: &positions,
                    market_stats: &market_stats,
                    risk_profile: ctx.profile,
                    equity: account.equity.to_f64().unwrap_or(0.0),
                },
            )
            .await?;
        timings.risk_ms = StageTimings::elapsed_ms(started);

        if verdict.halt {
            self.kill_switch.trigger(format!("Risk halt: {}", describe(&verdict)));
        }
        if !verdict.ok {
            tracing::warn!("Risk check rejected targets: {}", describe(&verdict));
            self.notify(AlertType::RiskRejected {
                round_id: round_id.clone(),
                violations: verdict.violations.iter().map(|v| v.detail.clone()).collect(),
                halt: verdict.halt,
            });
        }

        // 6. Orders, one at a time
        let started = StageTimings::start();
        let mut orders = Vec::new();
        if !verdict.ok {
            tracing::info!("No orders this round: risk check failed");
        } else if self.kill_switch.is_active() {
            tracing::warn!("No orders this round: kill switch active");
        } else if account.trading_blocked {
            tracing::warn!("No orders this round: trading blocked on {}", c.broker.broker_name());
        } else {
            let intents = RebalanceCalculator::calculate(
                &target_weights,
                &positions,
                account.equity,
                self.settings.min_order_notional,
            );
            for intent in intents {
                if self.kill_switch.is_active() {
                    tracing::warn!("Kill switch raised mid-round, stopping order submission");
                    break;
                }
                let request = intent.to_request(format!("{}-{}", ctx.round_id, intent.symbol));
                let side = match intent.side {
                    BrokerOrderSide::Buy => Side::Buy,
                    BrokerOrderSide::Sell => Side::Sell,
                };
                let notional = intent.notional.to_f64().unwrap_or(0.0);
                match c.broker.place_order(request).await {
                    Ok(order) => {
                        tracing::info!("Submitted {} {} ${:.2} ({})", side.as_str(), intent.symbol, notional, order.id);
                        orders.push(SubmittedOrder {
                            symbol: intent.symbol,
                            side,
                            notional,
                            order_id: Some(order.id),
                            error: None,
                        });
                    }
                    Err(e) => {
                        tracing::error!("Order {} {} ${:.2} rejected: {}", side.as_str(), intent.symbol, notional, e);
                        orders.push(SubmittedOrder {
                            symbol: intent.symbol,
                            side,
                            notional,
                            order_id: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }
        timings.execution_ms = StageTimings::elapsed_ms(started);

        if !orders.is_empty() {
            let failed = orders.iter().filter(|o| o.error.is_some()).count();
            self.notify(AlertType::OrdersSubmitted {
                round_id,
                submitted: orders.len() - failed,
                failed,
                notional: orders.iter().filter(|o| o.error.is_none()).map(|o| o.notional).sum(),
            });
        }

        let mut record = round.clone();
        record.claims_count = outcome.verified.len() + outcome.rejected.len();
        record.orders_count = orders.iter().filter(|o| o.error.is_none()).count();
        record.total_pnl = broker_trait::unrealized_pl(&positions).to_f64().unwrap_or(0.0);
        record.finish(RoundStatus::Completed);

        Ok(RoundReport {
            artifact: RoundArtifact {
                round: record,
                profile: ctx.profile,
                universe_size: universe.len(),
                verified_claims: outcome.verified.len(),
                rejected_claims: outcome.rejected.len(),
                violations: outcome.violations,
                signals,
                consensus,
                conflicts,
                target_weights,
                risk: Some(verdict),
                orders,
                skipped: false,
            },
            timings,
        })
    }

    async fn fetch_market_stats(&self, ctx: &RoundContext, universe: &[String]) -> HashMap<String, MarketStats> {
        let market = &self.collaborators.market;
        let results = join_all(
            universe
                .iter()
                .map(|ticker| async move { (ticker, market.get_market_stats(ctx, ticker).await) }),
        )
        .await;

        let mut stats = HashMap::new();
        for (ticker, result) in results {
            match result {
                Ok(s) => {
                    stats.insert(ticker.clone(), s);
                }
                Err(e) => tracing::debug!("No market stats for {}: {}", ticker, e),
            }
        }
        stats
    }

    async fn fetch_technicals(&self, ctx: &RoundContext, tickers: &[String]) -> HashMap<String, TechnicalIndicators> {
        let provider = &self.collaborators.technical;
        let timeframe = self.settings.timeframe.as_str();
        let results = join_all(tickers.iter().map(|ticker| async move {
            (ticker, provider.get_technical_indicators(ctx, ticker, timeframe).await)
        }))
        .await;

        let mut technical = HashMap::new();
        for (ticker, result) in results {
            match result {
                Ok(t) => {
                    technical.insert(ticker.clone(), t);
                }
                Err(e) => tracing::debug!("No technicals for {}: {}", ticker, e),
            }
        }
        technical
    }

    /// News for each ticker plus whatever the evidence store already holds.
    async fn gather_evidence(&self, ctx: &RoundContext, tickers: &[String], now: DateTime<Utc>) -> Vec<Evidence> {
        let provider = &self.collaborators.evidence;
        let from = now - self.settings.news_lookback;
        let query = EvidenceQuery {
            since: Some(ctx.started_at - self.settings.evidence_max_age),
            min_relevance: None,
            limit: Some(EVIDENCE_FETCH_LIMIT),
        };
        let query = &query;

        let per_ticker = join_all(tickers.iter().map(|ticker| async move {
            let mut found = Vec::new();
            match provider.search(ctx, ticker, from, now).await {
                Ok(news) if !news.is_empty() => {
                    if let Err(e) = provider.put_news(ctx, &news).await {
                        tracing::warn!("Failed to store news for {}: {}", ticker, e);
                    }
                    let evidence: Vec<Evidence> = news.into_iter().map(|n| n.into_evidence(ticker)).collect();
                    if let Err(e) = provider.put_evidence(ctx, &evidence).await {
                        tracing::warn!("Failed to store news evidence for {}: {}", ticker, e);
                    }
                    found.extend(evidence);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("News search failed for {}: {}", ticker, e),
            }
            match provider.find_evidence(ctx, ticker, query).await {
                Ok(stored) => found.extend(stored),
                Err(e) => tracing::debug!("Evidence lookup failed for {}: {}", ticker, e),
            }
            found
        }))
        .await;

        let mut seen = HashSet::new();
        per_ticker
            .into_iter()
            .flatten()
            .filter(|e| seen.insert(e.id.clone()))
            .collect()
    }
}

fn dedup(universe: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    universe
        .into_iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn describe(verdict: &RiskVerdict) -> String {
    verdict
        .violations
        .iter()
        .map(|v| format!("[{}] {}", v.rule, v.detail))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Market and indicator readings of this round as citable evidence.
fn derived_evidence(
    ctx: &RoundContext,
    market_stats: &HashMap<String, MarketStats>,
    technical: &HashMap<String, TechnicalIndicators>,
) -> Vec<Evidence> {
    let item = |ticker: &str, name: &str, kind: EvidenceKind| Evidence {
        id: format!("{}:{}:{}", ctx.round_id, ticker, name),
        ticker: ticker.to_string(),
        source: "market".to_string(),
        relevance: 1.0,
        impact: None,
        confidence: None,
        observed_at: ctx.started_at,
        kind,
    };

    let mut tickers: Vec<&String> = market_stats.keys().collect();
    tickers.sort();

    let mut out = Vec::new();
    for ticker in tickers {
        let stats = &market_stats[ticker];
        for (metric, value) in [
            ("volume_24h", stats.volume_24h),
            ("price_change_24h", stats.price_change_24h),
            ("volume_change_24h", stats.volume_change_24h),
            ("spread", stats.spread),
        ] {
            if value.is_finite() {
                out.push(item(
                    ticker,
                    metric,
                    EvidenceKind::Market {
                        metric: metric.to_string(),
                        value,
                    },
                ));
            }
        }

        let Some(tech) = technical.get(ticker) else {
            continue;
        };
        for (indicator, value) in [("rsi", tech.rsi), ("macd_histogram", tech.histogram()), ("adx", tech.adx)] {
            if let Some(value) = value.filter(|v| v.is_finite()) {
                out.push(item(
                    ticker,
                    indicator,
                    EvidenceKind::Tech {
                        indicator: indicator.to_string(),
                        value,
                    },
                ));
            }
        }
    }
    out
}

fn empty_artifact(ctx: &RoundContext, round: &Round, universe_size: usize) -> RoundArtifact {
    let mut record = round.clone();
    record.finish(RoundStatus::Completed);
    RoundArtifact {
        round: record,
        profile: ctx.profile,
        universe_size,
        verified_claims: 0,
        rejected_claims: 0,
        violations: Vec::new(),
        signals: Vec::new(),
        consensus: Vec::new(),
        conflicts: Vec::new(),
        target_weights: Vec::new(),
        risk: None,
        orders: Vec::new(),
        skipped: true,
    }
}
