use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use broker_trait::ExecutionAdapter;
use notification_service::NotificationService;
use risk_manager::LimitChecker;
use rust_decimal::prelude::*;
use tokio::signal::unix::SignalKind;

use trading_agent::{
    shutdown_signal, AgentConfig, Collaborators, DriverSettings, EvidenceVerifier, ExitReason, GatewayClient, KillSwitch,
    PaperBroker, PipelineSettings, RoundDriver, RoundPipeline, RoundStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting decision engine");

    // 2. Configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Risk profile: {}", config.risk_profile);
    tracing::info!(
        "  Round interval: {}s (skip {}s, failure cool-down {}s)",
        config.round_interval_secs,
        config.skip_delay_secs,
        config.failure_cooldown_secs
    );
    tracing::info!("  Gateway: {} (timeout {}s)", config.gateway_url, config.gateway_timeout_secs);
    tracing::info!("  Correlated assets: {}", config.correlated_assets.join(","));

    // 3. Execution venue: only the paper book is built in
    if !config.paper_trading {
        bail!("PAPER_TRADING=false but no live execution adapter is configured");
    }
    let starting_equity = Decimal::from_f64(config.paper_starting_equity).unwrap_or(Decimal::ZERO);
    let broker: Arc<dyn ExecutionAdapter> = Arc::new(PaperBroker::new(starting_equity));
    tracing::info!("Paper trading mode ({} starting equity)", starting_equity);

    // 4. Database
    sqlx::any::install_default_drivers();
    let db_pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::query("SELECT 1")
        .execute(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database connectivity check failed: {}", e))?;
    let store = Arc::new(RoundStore::new(db_pool));
    store.init_tables().await?;
    tracing::info!("Round store initialized ({})", config.database_url);

    // 5. Collaborators
    let gateway = Arc::new(GatewayClient::new(
        config.gateway_url.clone(),
        Duration::from_secs(config.gateway_timeout_secs),
    )?);
    let notifier = NotificationService::new(&config.notification_config());
    let collaborators = Collaborators {
        market: gateway.clone(),
        technical: gateway.clone(),
        evidence: gateway.clone(),
        claims: gateway,
        verifier: Arc::new(EvidenceVerifier::new(config.min_evidence_relevance)),
        risk: Arc::new(LimitChecker::new(config.risk_limits())),
        broker,
        sink: store.clone(),
        notifier,
    };

    // 6. Driver
    let kill_switch = KillSwitch::new();
    let pipeline = RoundPipeline::new(collaborators, PipelineSettings::from_config(&config), kill_switch.clone());
    let mut driver = RoundDriver::new(
        pipeline,
        DriverSettings {
            profile: config.risk_profile,
            timing: config.timing(),
            max_consecutive_failures: config.max_consecutive_failures,
            metrics_log_interval: config.metrics_log_interval,
        },
    )
    .with_metrics_store(store.clone());

    if let Ok(Some(saved)) = store.load_metrics().await {
        driver.metrics_mut().restore_from_json(&saved);
    }

    // 7. Signals: SIGINT/SIGTERM stop gracefully, SIGUSR1 raises the kill switch
    let shutdown = shutdown_signal()?;

    let mut sigusr1 = tokio::signal::unix::signal(SignalKind::user_defined1())?;
    let manual = kill_switch.clone();
    tokio::spawn(async move {
        if sigusr1.recv().await.is_some() {
            manual.trigger("manual trigger (SIGUSR1)");
        }
    });

    tracing::info!("Engine is now running. Send SIGUSR1 to trigger the kill switch, Ctrl+C to stop.");

    match driver.run(shutdown).await {
        ExitReason::Shutdown => {
            tracing::info!("Decision engine shut down.");
        }
        ExitReason::KillSwitch {
            reason,
            flattened,
            flatten_error,
        } => {
            tracing::error!(
                "Halted by kill switch: {} ({} positions flattened{})",
                reason,
                flattened,
                flatten_error
                    .map(|e| format!(", flattening failed: {}", e))
                    .unwrap_or_default()
            );
            tracing::error!("Restart the process to resume trading.");
        }
    }

    Ok(())
}
