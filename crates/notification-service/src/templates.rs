use crate::{Alert, AlertType};

/// Discord embed colours per alert type
pub fn color(alert_type: &AlertType) -> u32 {
    match alert_type {
        AlertType::RoundStarted { .. } => 0x64748b,
        AlertType::SignalsReady { .. } => 0x0099ff,
        AlertType::RiskRejected { halt, .. } => {
            if *halt {
                0xff0000
            } else {
                0xff6600
            }
        }
        AlertType::OrdersSubmitted { failed, .. } => {
            if *failed == 0 {
                0x00ff00
            } else {
                0xff6600
            }
        }
        AlertType::RoundCompleted { skipped, .. } => {
            if *skipped {
                0x94a3b8
            } else {
                0x00ff00
            }
        }
        AlertType::RoundFailed { .. } => 0xff6600,
        AlertType::KillSwitchTriggered { .. } => 0xff0000,
    }
}

pub struct MessageTemplate;

impl MessageTemplate {
    /// Title and body for an alert type, in Discord markdown.
    pub fn render(alert_type: &AlertType) -> (String, String) {
        match alert_type {
            AlertType::RoundStarted {
                round_id,
                profile,
                universe_size,
            } => (
                "Round started".to_string(),
                format!("`{round_id}` | profile **{profile}** | {universe_size} assets"),
            ),
            AlertType::SignalsReady {
                round_id,
                signals,
                buys,
                sells,
                top,
            } => {
                let top = if top.is_empty() { "-".to_string() } else { top.join(", ") };
                (
                    "Signals ready".to_string(),
                    format!("`{round_id}` | {signals} signals, {buys} BUY / {sells} SELL\nTop: {top}"),
                )
            }
            AlertType::RiskRejected {
                round_id,
                violations,
                halt,
            } => {
                let lines: Vec<String> = violations.iter().map(|v| format!("- {v}")).collect();
                (
                    if *halt { "Risk halt" } else { "Risk check failed" }.to_string(),
                    format!("`{round_id}` | no orders this round\n{}", lines.join("\n")),
                )
            }
            AlertType::OrdersSubmitted {
                round_id,
                submitted,
                failed,
                notional,
            } => (
                "Orders submitted".to_string(),
                format!("`{round_id}` | {submitted} sent, {failed} rejected, ${notional:.2} notional"),
            ),
            AlertType::RoundCompleted {
                round_id,
                duration_secs,
                orders,
                skipped,
            } => (
                if *skipped { "Round skipped" } else { "Round completed" }.to_string(),
                format!("`{round_id}` | {orders} orders in {duration_secs:.1}s"),
            ),
            AlertType::RoundFailed {
                round_id,
                error,
                consecutive_failures,
            } => (
                "Round failed".to_string(),
                format!("`{round_id}` | failure #{consecutive_failures}\n```{error}```"),
            ),
            AlertType::KillSwitchTriggered {
                reason,
                flattened,
                flatten_error,
            } => {
                let outcome = match flatten_error {
                    Some(e) => format!("Flattening failed: {e}"),
                    None => format!("{flattened} closing orders sent"),
                };
                ("KILL SWITCH".to_string(), format!("{reason}\n{outcome}\nTrading halted until restart."))
            }
        }
    }

    /// One-line form used by the log channel
    pub fn plain(alert: &Alert) -> String {
        format!("{}: {}", alert.title, alert.message.replace('\n', " | "))
    }
}
