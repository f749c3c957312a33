use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationState;
use crate::flows::GraphNode;

/// Latest snapshot of one thread, written after every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: ConversationState,
    /// Node the interpreter runs next; `None` once the turn reached `End`.
    pub next_node: Option<GraphNode>,
    /// Nodes completed in the current turn.
    pub step: u32,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: ConversationState, next_node: Option<GraphNode>, step: u32) -> Self {
        Self { thread_id: state.thread_id.clone(), state, next_node, step, updated_at: Utc::now() }
    }

    pub fn is_pending(&self) -> bool {
        self.next_node.is_some_and(|node| !node.is_terminal())
    }
}

/// One row of a user's conversation list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn from_checkpoint(checkpoint: &Checkpoint, created_at: DateTime<Utc>) -> Self {
        Self {
            thread_id: checkpoint.thread_id.clone(),
            user_id: checkpoint.state.user_id.clone(),
            title: checkpoint.state.title(),
            message_count: checkpoint.state.messages().len(),
            created_at,
            last_message_at: checkpoint.updated_at,
        }
    }
}
