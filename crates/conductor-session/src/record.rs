use chrono::{DateTime, Utc};
use conductor_core::ConversationTurn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A persisted conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub user_id: String,
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConversationRecord {
    /// Creates a record; `created_at` is the first turn's timestamp, or now.
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            created_at: turns.first().map(|t| t.timestamp).unwrap_or(now),
            updated_at: now,
            turns,
            metadata: HashMap::new(),
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}
