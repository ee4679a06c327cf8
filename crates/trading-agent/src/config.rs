use anyhow::{bail, Context, Result};
use decision_core::{RiskProfile, UniverseFilters};
use notification_service::NotificationConfig;
use risk_manager::RiskLimits;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub risk_profile: RiskProfile,

    // Loop cadence
    pub round_interval_secs: u64,        // 300 (5 minutes)
    pub skip_delay_secs: u64,            // 60, when no asset had data
    pub failure_cooldown_secs: u64,      // 900, after a failed round
    pub max_consecutive_failures: u32,   // 5, 0 disables the automatic kill switch

    // Claim verification
    pub evidence_max_age_hours: i64,
    pub min_evidence_relevance: f64,
    pub conflict_confidence_gap: f64,

    // Universe and data
    pub correlated_assets: Vec<String>,
    pub technical_timeframe: String,
    pub universe_min_volume: f64,
    pub universe_limit: usize,
    pub news_lookback_hours: i64,

    // Collaborator gateway
    pub gateway_url: String,
    pub gateway_timeout_secs: u64,

    // Execution
    pub paper_trading: bool,
    pub paper_starting_equity: f64,
    pub min_order_notional: f64,

    // Account-level risk limits
    pub max_gross_exposure: f64,
    pub daily_loss_halt_percent: f64,
    pub min_liquidity_volume: f64,
    pub max_spread: f64,

    // Discord notifications
    pub discord_webhook_url: String,

    // Database
    pub database_url: String,

    pub metrics_log_interval: u64,
}

fn var_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().with_context(|| format!("Invalid {}: {:?}", key, raw))
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            risk_profile: env::var("RISK_PROFILE")
                .unwrap_or_else(|_| "neutral".to_string())
                .parse()
                .context("Invalid RISK_PROFILE")?,

            round_interval_secs: var_or("ROUND_INTERVAL_SECS", "300")?,
            skip_delay_secs: var_or("SKIP_DELAY_SECS", "60")?,
            failure_cooldown_secs: var_or("FAILURE_COOLDOWN_SECS", "900")?,
            max_consecutive_failures: var_or("MAX_CONSECUTIVE_FAILURES", "5")?,

            evidence_max_age_hours: var_or("EVIDENCE_MAX_AGE_HOURS", "24")?,
            min_evidence_relevance: var_or("MIN_EVIDENCE_RELEVANCE", "0.3")?,
            conflict_confidence_gap: var_or("CONFLICT_CONFIDENCE_GAP", "0.3")?,

            correlated_assets: csv(&env::var("CORRELATED_ASSETS").unwrap_or_else(|_| "BTC,ETH,SOL,BNB,XRP".to_string())),
            technical_timeframe: env::var("TECHNICAL_TIMEFRAME").unwrap_or_else(|_| "1h".to_string()),
            universe_min_volume: var_or("UNIVERSE_MIN_VOLUME", "0")?,
            universe_limit: var_or("UNIVERSE_LIMIT", "25")?,
            news_lookback_hours: var_or("NEWS_LOOKBACK_HOURS", "24")?,

            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:8010".to_string())
                .trim_end_matches('/')
                .to_string(),
            gateway_timeout_secs: var_or("GATEWAY_TIMEOUT_SECS", "30")?,

            paper_trading: var_or("PAPER_TRADING", "true")?,
            paper_starting_equity: var_or("PAPER_STARTING_EQUITY", "100000")?,
            min_order_notional: var_or("MIN_ORDER_NOTIONAL", "10")?,

            max_gross_exposure: var_or("MAX_GROSS_EXPOSURE", "1.0")?,
            daily_loss_halt_percent: var_or("DAILY_LOSS_HALT_PERCENT", "5")?,
            min_liquidity_volume: var_or("MIN_LIQUIDITY_VOLUME", "100000")?,
            max_spread: var_or("MAX_SPREAD", "0.01")?,

            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").unwrap_or_default(),

            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:rounds.db".to_string()),

            metrics_log_interval: var_or("METRICS_LOG_INTERVAL", "12")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.round_interval_secs == 0 {
            bail!("ROUND_INTERVAL_SECS must be positive");
        }
        if self.failure_cooldown_secs <= self.skip_delay_secs {
            bail!(
                "FAILURE_COOLDOWN_SECS ({}) must be longer than SKIP_DELAY_SECS ({})",
                self.failure_cooldown_secs,
                self.skip_delay_secs
            );
        }
        if self.evidence_max_age_hours <= 0 || self.news_lookback_hours <= 0 {
            bail!("EVIDENCE_MAX_AGE_HOURS and NEWS_LOOKBACK_HOURS must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_evidence_relevance) {
            bail!("MIN_EVIDENCE_RELEVANCE must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.conflict_confidence_gap) {
            bail!("CONFLICT_CONFIDENCE_GAP must be within [0, 1]");
        }
        if self.universe_limit == 0 {
            bail!("UNIVERSE_LIMIT must be positive");
        }
        if self.max_gross_exposure <= 0.0 || self.max_gross_exposure > 1.0 {
            bail!("MAX_GROSS_EXPOSURE must be within (0, 1]");
        }
        if self.daily_loss_halt_percent <= 0.0 {
            bail!("DAILY_LOSS_HALT_PERCENT must be positive");
        }
        if self.min_order_notional < 0.0 || self.paper_starting_equity <= 0.0 {
            bail!("MIN_ORDER_NOTIONAL must be non-negative and PAPER_STARTING_EQUITY positive");
        }
        if self.gateway_timeout_secs == 0 {
            bail!("GATEWAY_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    pub fn timing(&self) -> LoopTiming {
        LoopTiming {
            interval: Duration::from_secs(self.round_interval_secs),
            skip_delay: Duration::from_secs(self.skip_delay_secs),
            failure_cooldown: Duration::from_secs(self.failure_cooldown_secs),
        }
    }

    pub fn universe_filters(&self) -> UniverseFilters {
        UniverseFilters {
            min_volume: self.universe_min_volume,
            limit: self.universe_limit,
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_gross_exposure: self.max_gross_exposure,
            daily_loss_halt_percent: self.daily_loss_halt_percent,
            min_liquidity_volume: self.min_liquidity_volume,
            max_spread: self.max_spread,
        }
    }

    pub fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            discord_webhook_url: Some(self.discord_webhook_url.clone()).filter(|s| !s.is_empty()),
            log_alerts: true,
        }
    }
}

/// Delays between rounds, by outcome
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    pub interval: Duration,
    pub skip_delay: Duration,
    pub failure_cooldown: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AgentConfig {
        AgentConfig {
            risk_profile: RiskProfile::Neutral,
            round_interval_secs: 300,
            skip_delay_secs: 60,
            failure_cooldown_secs: 900,
            max_consecutive_failures: 5,
            evidence_max_age_hours: 24,
            min_evidence_relevance: 0.3,
            conflict_confidence_gap: 0.3,
            correlated_assets: csv("btc, eth,,SOL"),
            technical_timeframe: "1h".into(),
            universe_min_volume: 0.0,
            universe_limit: 25,
            news_lookback_hours: 24,
            gateway_url: "http://localhost:8010".into(),
            gateway_timeout_secs: 30,
            paper_trading: true,
            paper_starting_equity: 100_000.0,
            min_order_notional: 10.0,
            max_gross_exposure: 1.0,
            daily_loss_halt_percent: 5.0,
            min_liquidity_volume: 100_000.0,
            max_spread: 0.01,
            discord_webhook_url: String::new(),
            database_url: "sqlite::memory:".into(),
            metrics_log_interval: 12,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = base();
        assert!(config.validate().is_ok());
        assert_eq!(config.correlated_assets, vec!["BTC", "ETH", "SOL"]);
        assert!(config.notification_config().discord_webhook_url.is_none());
    }

    #[test]
    fn test_cooldown_must_exceed_skip_delay() {
        let mut config = base();
        config.failure_cooldown_secs = 60;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("FAILURE_COOLDOWN_SECS"));
    }

    #[test]
    fn test_exposure_bounds() {
        let mut config = base();
        config.max_gross_exposure = 1.5;
        assert!(config.validate().is_err());
    }
}
