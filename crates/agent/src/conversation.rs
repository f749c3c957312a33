use parley_core::domain::conversation::ChatMessage;

const ELLIPSIS: &str = "...";

/// Bounded view of recent turns fed to prompts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversationWindow {
    pub max_messages: usize,
    pub max_chars: usize,
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self { max_messages: 6, max_chars: 500 }
    }
}

impl ConversationWindow {
    pub fn new(max_messages: usize, max_chars: usize) -> Self {
        Self { max_messages, max_chars }
    }

    /// The most recent `max_messages` entries as `role: text` lines, each truncated.
    pub fn render(&self, messages: &[ChatMessage]) -> String {
        let start = messages.len().saturating_sub(self.max_messages);
        messages[start..]
            .iter()
            .map(|message| {
                format!("{}: {}", message.role.as_str(), truncate_chars(&message.content, self.max_chars))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Cuts on a char boundary and marks the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{ELLIPSIS}", &text[..byte_index]),
        None => text.to_string(),
    }
}

/// Model text with surrounding whitespace removed, or `fallback` when nothing is left.
pub fn answer_or(text: &str, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
