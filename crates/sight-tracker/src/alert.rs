//! Cooldown-gated alert dispatch
//!
//! One cooldown covers every track: whichever track triggers a dispatch,
//! the next one waits out the full window. The timestamp is claimed
//! before the relay is called and kept even if delivery fails, so a
//! flaky relay cannot turn into an alert storm.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sight_core::UserId;
use sight_store::AlertRelay;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Check-and-set guard around the last-alert timestamp
#[derive(Debug)]
pub struct AlertGate {
    cooldown: Duration,
    last: Mutex<Option<Instant>>,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Mutex::new(None),
        }
    }

    /// Claim the right to dispatch at `now`. Succeeds when no alert was
    /// sent yet or the cooldown has elapsed, and records `now` if so.
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        if let Some(previous) = *last {
            if now.saturating_duration_since(previous) < self.cooldown {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Time left before the next claim can succeed
    pub fn remaining(&self, now: Instant) -> Duration {
        match *self.last.lock() {
            Some(previous) => self.cooldown.saturating_sub(now.saturating_duration_since(previous)),
            None => Duration::ZERO,
        }
    }

    pub fn last_claim(&self) -> Option<Instant> {
        *self.last.lock()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Result of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing outside, alerts off, or no user bound
    NotApplicable,
    /// Within the cooldown window
    Suppressed,
    Sent,
    /// The relay failed; the cooldown still applies
    Failed,
}

impl DispatchOutcome {
    /// Metric label, `None` for attempts that never reached the gate
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::NotApplicable => None,
            Self::Suppressed => Some("suppressed"),
            Self::Sent => Some("sent"),
            Self::Failed => Some("failed"),
        }
    }
}

pub struct AlertDispatcher {
    gate: AlertGate,
    relay: Arc<dyn AlertRelay>,
    message: String,
    last_sent_at: Mutex<Option<DateTime<Utc>>>,
}

impl AlertDispatcher {
    pub fn new(relay: Arc<dyn AlertRelay>, cooldown: Duration, message: impl Into<String>) -> Self {
        Self {
            gate: AlertGate::new(cooldown),
            relay,
            message: message.into(),
            last_sent_at: Mutex::new(None),
        }
    }

    /// Attempt an alert for the bound user if any surfaced track is outside
    /// the zone and the user has alerts enabled
    pub async fn dispatch(
        &self,
        user: Option<&UserId>,
        alert_enabled: bool,
        any_outside: bool,
        now: Instant,
    ) -> DispatchOutcome {
        let Some(user) = user else {
            return DispatchOutcome::NotApplicable;
        };
        if !any_outside || !alert_enabled {
            return DispatchOutcome::NotApplicable;
        }

        if !self.gate.try_claim(now) {
            debug!("Alert suppressed, {:?} of cooldown left", self.gate.remaining(now));
            return DispatchOutcome::Suppressed;
        }

        *self.last_sent_at.lock() = Some(Utc::now());
        match self.relay.send_alert(user, &self.message).await {
            Ok(()) => {
                info!("🚨 ALERT sent to {} via {}", user, self.relay.backend());
                DispatchOutcome::Sent
            }
            Err(e) => {
                warn!("⚠️ Failed to send alert to {}: {}", user, e);
                DispatchOutcome::Failed
            }
        }
    }

    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    /// Wall-clock time of the last claimed dispatch
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sent_at.lock()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sight_store::{RelayError, RelayResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRelay {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRelay {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait::async_trait]
    impl AlertRelay for CountingRelay {
        async fn send_alert(&self, _user: &UserId, _message: &str) -> RelayResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RelayError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        }

        fn backend(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_gate_cooldown() {
        let gate = AlertGate::new(Duration::from_secs(120));
        let start = Instant::now();

        assert!(gate.try_claim(start));
        assert!(!gate.try_claim(start + Duration::from_secs(30)));
        assert_eq!(gate.remaining(start + Duration::from_secs(30)), Duration::from_secs(90));
        assert!(gate.try_claim(start + Duration::from_secs(120)));
        assert_eq!(gate.last_claim(), Some(start + Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_two_attempts_within_cooldown_one_call() {
        let relay = CountingRelay::new(false);
        let dispatcher = AlertDispatcher::new(relay.clone(), Duration::from_secs(120), "left the zone");
        let user = UserId::new("u1");
        let start = Instant::now();

        let first = dispatcher.dispatch(Some(&user), true, true, start).await;
        let second = dispatcher
            .dispatch(Some(&user), true, true, start + Duration::from_secs(60))
            .await;

        assert_eq!(first, DispatchOutcome::Sent);
        assert_eq!(second, DispatchOutcome::Suppressed);
        assert_eq!(relay.calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.last_sent_at().is_some());
    }

    #[tokio::test]
    async fn test_failed_dispatch_still_starts_cooldown() {
        let relay = CountingRelay::new(true);
        let dispatcher = AlertDispatcher::new(relay.clone(), Duration::from_secs(120), "x");
        let user = UserId::new("u1");
        let start = Instant::now();

        assert_eq!(dispatcher.dispatch(Some(&user), true, true, start).await, DispatchOutcome::Failed);
        assert_eq!(
            dispatcher.dispatch(Some(&user), true, true, start + Duration::from_secs(1)).await,
            DispatchOutcome::Suppressed
        );
        assert_eq!(relay.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_applicable_leaves_gate_untouched() {
        let relay = CountingRelay::new(false);
        let dispatcher = AlertDispatcher::new(relay.clone(), Duration::from_secs(120), "x");
        let user = UserId::new("u1");
        let now = Instant::now();

        assert_eq!(dispatcher.dispatch(None, true, true, now).await, DispatchOutcome::NotApplicable);
        assert_eq!(dispatcher.dispatch(Some(&user), false, true, now).await, DispatchOutcome::NotApplicable);
        assert_eq!(dispatcher.dispatch(Some(&user), true, false, now).await, DispatchOutcome::NotApplicable);
        assert_eq!(relay.calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.gate().last_claim().is_none());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DispatchOutcome::NotApplicable.label(), None);
        assert_eq!(DispatchOutcome::Failed.label(), Some("failed"));
    }
}
