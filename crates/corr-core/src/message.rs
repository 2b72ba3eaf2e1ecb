//! Inter-agent messages
//!
//! Messages are immutable once published. Delivery is not filtered by
//! recipient at the bus level; each subscriber checks whether a message is
//! addressed to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cross-agent notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Fresh market data has been collected and stored
    DataAvailable,
    /// An analysis run finished and results are available
    AnalysisComplete,
    /// A scheduled job execution completed
    JobCompleted,
    /// A scheduled job execution failed
    JobFailed,
}

impl MessageType {
    /// Stable string form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataAvailable => "data_available",
            Self::AnalysisComplete => "analysis_complete",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: Uuid,
    /// Id of the publishing agent
    pub sender_id: String,
    /// Id of the intended recipient
    pub recipient_id: String,
    /// Notification kind
    pub message_type: MessageType,
    /// Free-form payload
    pub payload: serde_json::Value,
    /// Publication timestamp (serialized as ISO-8601)
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a new message stamped with the current time
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            message_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Whether the message is addressed to the given agent id
    pub fn is_for(&self, agent_id: &str) -> bool {
        self.recipient_id == agent_id
    }
}
