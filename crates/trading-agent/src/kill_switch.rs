use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    active: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

/// Emergency stop shared between the round driver, signal handlers and
/// anything else that may need to halt trading. Cheap to clone.
///
/// Triggering only sets a flag and wakes waiters; the driver observes it
/// between rounds and before each order submission.
#[derive(Clone, Default)]
pub struct KillSwitch {
    inner: Arc<Inner>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the switch. Returns false if it was already active; the first reason wins.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return false;
        }
        let reason = reason.into();
        tracing::error!("KILL SWITCH TRIGGERED: {}", reason);
        if let Ok(mut slot) = self.inner.reason.lock() {
            *slot = Some(reason);
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Resolves once the switch is active.
    pub async fn triggered(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_active() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillSwitch")
            .field("active", &self.is_active())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let switch = KillSwitch::new();
        assert!(!switch.is_active());
        assert!(switch.trigger("manual"));
        assert!(!switch.trigger("again"));
        assert!(switch.is_active());
        assert_eq!(switch.reason().as_deref(), Some("manual"));
    }

    #[tokio::test]
    async fn test_waiters_wake_on_trigger() {
        let switch = KillSwitch::new();
        let remote = switch.clone();
        let waiter = tokio::spawn(async move { remote.triggered().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        switch.trigger("test");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn test_already_active_resolves_immediately() {
        let switch = KillSwitch::new();
        switch.trigger("early");
        tokio::time::timeout(Duration::from_millis(50), switch.triggered())
            .await
            .unwrap();
    }
}
