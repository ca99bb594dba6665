//! # Payment Events
//!
//! The orchestrator reports progress by publishing [`PaymentEvent`]s to a
//! [`Notifier`]. Consumers register a callback with [`Notifier::subscribe`]
//! and keep the returned [`Subscription`] for as long as they want events;
//! `unsubscribe()` or dropping it detaches the callback.
//!
//! Callbacks run synchronously on the publishing task, outside the
//! registry lock, so a callback may subscribe or unsubscribe freely.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::purchase::{PurchaseOutcome, PurchaseState};

/// How long a toast stays up unless the consumer dismisses it earlier.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Severity of a [`Toast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    /// Positive confirmation.
    Success,
    /// Something the user must know went wrong.
    Error,
}

/// A transient user-facing notification. `message_key` is a translation
/// key; rendering is up to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    /// Severity.
    pub level: ToastLevel,
    /// Translation key, e.g. `not_enough_money`.
    pub message_key: String,
    /// Display duration.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl Toast {
    /// Error toast with the default duration.
    pub fn error(message_key: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            message_key: message_key.into(),
            duration: DEFAULT_TOAST_DURATION,
        }
    }

    /// Success toast with the default duration.
    pub fn success(message_key: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            message_key: message_key.into(),
            duration: DEFAULT_TOAST_DURATION,
        }
    }
}

/// Something that happened during a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    /// The attempt moved to a new state.
    StateChanged {
        /// Attempt id.
        attempt_id: Uuid,
        /// Invoice reference.
        reference_id: String,
        /// Previous state.
        from: PurchaseState,
        /// New state.
        to: PurchaseState,
    },
    /// A notification for the user.
    Toast(Toast),
    /// The attempt finished with this outcome.
    OutcomeRecorded {
        /// Attempt id.
        attempt_id: Uuid,
        /// Final outcome.
        outcome: PurchaseOutcome,
    },
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

type Callback = Arc<dyn Fn(&PaymentEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    callbacks: RwLock<BTreeMap<u64, Callback>>,
}

/// Fan-out of [`PaymentEvent`]s to registered callbacks. Cheap to clone;
/// clones share subscribers.
#[derive(Clone, Default)]
pub struct Notifier {
    registry: Arc<Registry>,
}

impl Notifier {
    /// A notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` until the returned [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PaymentEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.write().insert(id, Arc::new(callback));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `event` to every current subscriber, in subscription order.
    pub fn publish(&self, event: &PaymentEvent) {
        let callbacks: Vec<Callback> = self.registry.callbacks.read().values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.callbacks.read().len()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle of a registered callback.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Detaches the callback.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.callbacks.write().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn recorder(notifier: &Notifier) -> (Subscription, Arc<Mutex<Vec<PaymentEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = notifier.subscribe(move |event| sink.lock().push(event.clone()));
        (subscription, seen)
    }

    #[test]
    fn subscribers_receive_published_events() {
        let notifier = Notifier::new();
        let (_sub, seen) = recorder(&notifier);

        notifier.publish(&PaymentEvent::Toast(Toast::error("not_enough_money")));
        assert_eq!(
            seen.lock().as_slice(),
            &[PaymentEvent::Toast(Toast::error("not_enough_money"))]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let (sub, seen) = recorder(&notifier);
        sub.unsubscribe();

        notifier.publish(&PaymentEvent::Toast(Toast::success("paid")));
        assert!(seen.lock().is_empty());
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_subscription_detaches() {
        let notifier = Notifier::new();
        {
            let (_sub, _) = recorder(&notifier);
            assert_eq!(notifier.subscriber_count(), 1);
        }
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_notifier_is_harmless() {
        let notifier = Notifier::new();
        let (sub, _) = recorder(&notifier);
        drop(notifier);
        sub.unsubscribe();
    }

    #[test]
    fn toast_serializes_with_millis() {
        let json = serde_json::to_value(PaymentEvent::Toast(Toast::error("x"))).unwrap();
        assert_eq!(json["type"], "toast");
        assert_eq!(json["level"], "error");
        assert_eq!(json["duration"], 2000);
    }
}
