//! Synchronous publish/subscribe message bus
//!
//! Every subscriber sees every message, in subscription order; the bus does
//! no recipient filtering. A failing subscriber is logged and does not
//! prevent delivery to the remaining subscribers.

use chrono::{Duration, Utc};
use corr_core::{Message, MessageType, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Maximum number of messages retained in the bus log
pub const MESSAGE_LOG_CAP: usize = 1000;

/// Callback registered for the lifetime of the process
pub trait MessageSubscriber: Send + Sync {
    /// Get the subscriber's name (used in delivery-failure logs)
    fn name(&self) -> &str;

    /// Handle one published message
    ///
    /// Each subscriber is responsible for checking whether the message is
    /// addressed to it. An `Err` here is a communication error isolated to
    /// this subscriber.
    fn on_message(&self, message: &Message) -> Result<()>;
}

/// Cross-agent notification channel
pub struct MessageBus {
    subscribers: RwLock<Vec<Arc<dyn MessageSubscriber>>>,
    recent: Mutex<VecDeque<Message>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            recent: Mutex::new(VecDeque::new()),
        }
    }
}

impl MessageBus {
    /// Create a new bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; delivery order follows subscription order
    pub fn subscribe(&self, subscriber: Arc<dyn MessageSubscriber>) {
        self.subscribers.write().unwrap().push(subscriber);
    }

    /// Build and deliver a message to every subscriber, synchronously
    ///
    /// Returns the published message (immutable once built).
    pub fn publish(
        &self,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Message {
        let message = Message::new(sender_id, recipient_id, message_type, payload);
        debug!(
            from = %message.sender_id,
            to = %message.recipient_id,
            kind = %message.message_type,
            "Publishing message"
        );

        {
            let mut recent = self.recent.lock().unwrap();
            if recent.len() >= MESSAGE_LOG_CAP {
                recent.pop_front();
            }
            recent.push_back(message.clone());
        }

        let subscribers = self.subscribers.read().unwrap().clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_message(&message) {
                warn!(
                    subscriber = subscriber.name(),
                    error = %e,
                    "Subscriber failed to process message"
                );
            }
        }

        message
    }

    /// Number of messages currently retained
    pub fn backlog(&self) -> usize {
        self.recent.lock().unwrap().len()
    }

    /// The `n` most recent messages, oldest first
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        let recent = self.recent.lock().unwrap();
        let skip = recent.len().saturating_sub(n);
        recent.iter().skip(skip).cloned().collect()
    }

    /// Drop retained messages older than `max_age`, returning the count
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut recent = self.recent.lock().unwrap();
        let before = recent.len();
        recent.retain(|m| m.timestamp > cutoff);
        before - recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corr_core::CoreError;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        label: String,
        seen: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    impl MessageSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.label
        }

        fn on_message(&self, message: &Message) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, message.message_type));
            if self.fail {
                return Err(CoreError::Communication("induced".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus = MessageBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            bus.subscribe(Arc::new(Recorder {
                label: label.to_string(),
                seen: seen.clone(),
                fail: false,
            }));
        }

        bus.publish("a", "b", MessageType::DataAvailable, serde_json::json!({}));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "first:data_available",
                "second:data_available",
                "third:data_available"
            ]
        );
    }

    #[test]
    fn test_failing_subscriber_does_not_block_delivery() {
        let bus = MessageBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        bus.subscribe(Arc::new(Recorder {
            label: "fails".to_string(),
            seen: seen.clone(),
            fail: true,
        }));
        bus.subscribe(Arc::new(Recorder {
            label: "after".to_string(),
            seen: seen.clone(),
            fail: false,
        }));

        bus.publish("a", "b", MessageType::AnalysisComplete, serde_json::json!({}));

        // Both subscribers were invoked despite the first failing
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_recipient_filtering_at_bus_level() {
        let bus = MessageBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        bus.subscribe(Arc::new(Recorder {
            label: "unrelated".to_string(),
            seen: seen.clone(),
            fail: false,
        }));

        // Addressed to someone else entirely; the subscriber still sees it
        bus.publish(
            "sender",
            "someone-else",
            MessageType::JobCompleted,
            serde_json::json!({}),
        );

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_backlog_bounded_and_prunable() {
        let bus = MessageBus::new();
        for _ in 0..MESSAGE_LOG_CAP + 5 {
            bus.publish("a", "b", MessageType::DataAvailable, serde_json::json!({}));
        }
        assert_eq!(bus.backlog(), MESSAGE_LOG_CAP);

        // Everything is fresh, so a one-hour prune removes nothing
        assert_eq!(bus.prune_older_than(Duration::hours(1)), 0);
        // A zero-age prune removes everything
        assert_eq!(bus.prune_older_than(Duration::zero()), MESSAGE_LOG_CAP);
        assert_eq!(bus.backlog(), 0);
    }
}
