mod templates;

pub use templates::{color, MessageTemplate};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Round stages that trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertType {
    RoundStarted {
        round_id: String,
        profile: String,
        universe_size: usize,
    },
    SignalsReady {
        round_id: String,
        signals: usize,
        buys: usize,
        sells: usize,
        top: Vec<String>,
    },
    RiskRejected {
        round_id: String,
        violations: Vec<String>,
        halt: bool,
    },
    OrdersSubmitted {
        round_id: String,
        submitted: usize,
        failed: usize,
        notional: f64,
    },
    RoundCompleted {
        round_id: String,
        duration_secs: f64,
        orders: usize,
        skipped: bool,
    },
    RoundFailed {
        round_id: String,
        error: String,
        consecutive_failures: u32,
    },
    KillSwitchTriggered {
        reason: String,
        flattened: usize,
        flatten_error: Option<String>,
    },
}

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(alert_type: AlertType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            alert_type,
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
        }
    }

    /// Build an alert with the stock title and message for its type.
    pub fn from_type(alert_type: AlertType) -> Self {
        let (title, message) = MessageTemplate::render(&alert_type);
        Self::new(alert_type, title, message)
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub discord_webhook_url: Option<String>,
    /// Mirror every alert into the tracing log
    pub log_alerts: bool,
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            log_alerts: std::env::var("LOG_ALERTS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

/// Dispatches alerts to all configured channels. Cheap to clone.
#[derive(Clone)]
pub struct NotificationService {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.log_alerts {
            channels.push(Box::new(LogNotifier));
        }

        if let Some(ref webhook_url) = config.discord_webhook_url {
            match DiscordWebhookNotifier::new(webhook_url) {
                Ok(notifier) => {
                    channels.push(Box::new(notifier));
                    tracing::info!("Discord webhook notifications enabled");
                }
                Err(e) => tracing::warn!("Failed to initialize Discord notifier: {}", e),
            }
        }

        if channels.is_empty() {
            tracing::info!("No notification channels configured (set DISCORD_WEBHOOK_URL or LOG_ALERTS)");
        }

        Self {
            channels: Arc::new(channels),
        }
    }

    /// Service over an explicit channel list.
    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
        }
    }

    /// A service that drops every alert.
    pub fn disabled() -> Self {
        Self::with_channels(Vec::new())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send an alert to all configured channels (fire-and-forget via tokio::spawn).
    pub fn send_alert(&self, alert: Alert) {
        if self.channels.is_empty() {
            return;
        }
        let channels = self.channels.clone();
        tokio::spawn(async move {
            dispatch(&channels, &alert).await;
        });
    }

    /// Send alert to all channels, awaiting completion.
    pub async fn send_alert_async(&self, alert: &Alert) {
        dispatch(&self.channels, alert).await;
    }
}

async fn dispatch(channels: &[Box<dyn NotificationChannel>], alert: &Alert) {
    for channel in channels.iter() {
        match channel.send(alert).await {
            Ok(()) => tracing::debug!("Sent notification via {}", channel.name()),
            Err(e) => tracing::warn!("Failed to send notification via {}: {}", channel.name(), e),
        }
    }
}

/// Writes alerts to the tracing log.
struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        match alert.alert_type {
            AlertType::KillSwitchTriggered { .. } | AlertType::RoundFailed { .. } => {
                tracing::error!(target: "alerts", "{}", MessageTemplate::plain(alert))
            }
            AlertType::RiskRejected { .. } => tracing::warn!(target: "alerts", "{}", MessageTemplate::plain(alert)),
            _ => tracing::info!(target: "alerts", "{}", MessageTemplate::plain(alert)),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Discord webhook notifier.
struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    fn new(webhook_url: &str) -> Result<Self, NotificationError> {
        if !webhook_url.starts_with("https://") && !webhook_url.starts_with("http://") {
            return Err(NotificationError::Config(format!("Invalid webhook URL: {}", webhook_url)));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Config(e.to_string()))?;
        Ok(Self {
            webhook_url: webhook_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let payload = serde_json::json!({
            "embeds": [{
                "title": alert.title,
                "description": alert.message,
                "color": color(&alert.alert_type),
                "timestamp": alert.timestamp.to_rfc3339(),
            }]
        });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotificationError::Discord(format!("HTTP {}", resp.status())));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl NotificationChannel for Counting {
        async fn send(&self, _alert: &Alert) -> Result<(), NotificationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        async fn send(&self, _alert: &Alert) -> Result<(), NotificationError> {
            Err(NotificationError::Discord("down".into()))
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let channels: Vec<Box<dyn NotificationChannel>> = vec![Box::new(Broken), Box::new(Counting(count.clone()))];
        let service = NotificationService::with_channels(channels);

        let alert = Alert::from_type(AlertType::RoundFailed {
            round_id: "r1".into(),
            error: "boom".into(),
            consecutive_failures: 2,
        });
        service.send_alert_async(&alert).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_templates_render_round_stages() {
        let alert = Alert::from_type(AlertType::RiskRejected {
            round_id: "r9".into(),
            violations: vec!["Weight 30% above cap".into()],
            halt: true,
        });
        assert_eq!(alert.title, "Risk halt");
        assert!(alert.message.contains("Weight 30% above cap"));
        assert_eq!(color(&alert.alert_type), 0xff0000);

        let alert = Alert::from_type(AlertType::KillSwitchTriggered {
            reason: "manual".into(),
            flattened: 0,
            flatten_error: Some("venue offline".into()),
        });
        assert!(alert.message.contains("Flattening failed: venue offline"));
        assert!(!MessageTemplate::plain(&alert).contains('\n'));
    }

    #[test]
    fn test_invalid_webhook_rejected() {
        assert!(DiscordWebhookNotifier::new("not a url").is_err());
        let service = NotificationService::new(&NotificationConfig {
            discord_webhook_url: Some("ftp://nope".into()),
            log_alerts: true,
        });
        assert_eq!(service.channel_count(), 1);
        assert_eq!(NotificationService::disabled().channel_count(), 0);
    }
}
