use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::comment::RetrievedRecord;

/// One structured row returned by the relational executor, column order preserved.
pub type SqlRow = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Chitchat,
    SqlOnly,
    SqlThenRag,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Chitchat, Intent::SqlOnly, Intent::SqlThenRag];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Chitchat => "chitchat",
            Self::SqlOnly => "sql_only",
            Self::SqlThenRag => "sql_then_rag",
        }
    }

    /// Exact label match after trimming and lowercasing; anything else is `None`.
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|intent| intent.label() == normalized)
    }

    pub fn uses_sql(&self) -> bool {
        matches!(self, Self::SqlOnly | Self::SqlThenRag)
    }
}

pub const TITLE_CHARS: usize = 50;

/// The record threaded through every node of a turn and checkpointed per thread.
///
/// `messages` is append-only: the only mutation is [`ConversationState::push_message`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    pub user_id: String,
    pub thread_id: String,
    pub last_question: String,
    pub last_answer: String,
    pub intent: Option<Intent>,
    pub sql_query: Option<String>,
    pub sql_results: Option<String>,
    pub sql_results_for_rag: Option<Vec<SqlRow>>,
    pub rag_results: Option<Vec<RetrievedRecord>>,
    pub error: Option<String>,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), user_id: user_id.into(), ..Self::default() }
    }

    /// Clears every per-turn field and installs the new question. The transcript is untouched.
    pub fn begin_turn(&mut self, user_id: impl Into<String>, question: impl Into<String>) {
        self.user_id = user_id.into();
        self.last_question = question.into();
        self.last_answer.clear();
        self.intent = None;
        self.sql_query = None;
        self.sql_results = None;
        self.sql_results_for_rag = None;
        self.rag_results = None;
        self.error = None;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Transcript preceding the current turn's human message, if it was already appended.
    pub fn prior_messages(&self) -> &[ChatMessage] {
        match self.messages.last() {
            Some(last) if last.role == MessageRole::Human && last.content == self.last_question => {
                &self.messages[..self.messages.len() - 1]
            }
            _ => &self.messages,
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn sql_rows(&self) -> &[SqlRow] {
        self.sql_results_for_rag.as_deref().unwrap_or(&[])
    }

    /// The thread's first human message, cut to [`TITLE_CHARS`] characters.
    pub fn title(&self) -> Option<String> {
        let first = self.messages.iter().find(|message| message.role == MessageRole::Human)?;
        let text = first.content.trim();
        if text.chars().count() <= TITLE_CHARS {
            return Some(text.to_string());
        }
        let cut: String = text.chars().take(TITLE_CHARS).collect();
        Some(format!("{cut}..."))
    }
}
