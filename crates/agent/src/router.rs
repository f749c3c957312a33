use std::sync::Arc;

use tera::Context;
use tracing::debug;

use parley_core::domain::conversation::{ConversationState, Intent};

use crate::conversation::ConversationWindow;
use crate::errors::NodeError;
use crate::llm::LlmClient;
use crate::prompts::{PromptKind, PromptLibrary};

/// Single-shot intent classification. Unrecognised output is chitchat, which touches no data.
pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    window: ConversationWindow,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, window: ConversationWindow) -> Self {
        Self { llm, prompts, window }
    }

    pub async fn classify(&self, state: &mut ConversationState) -> Result<Intent, NodeError> {
        let mut context = Context::new();
        context.insert("history", &self.window.render(state.prior_messages()));
        context.insert("question", &state.last_question);

        let messages = self.prompts.render(PromptKind::Router, &context)?;
        let raw = self.llm.complete(&messages).await?;
        let intent = parse_intent(&raw);

        debug!(
            event_name = "agent.router.classified",
            thread_id = %state.thread_id,
            raw_label = %raw.trim(),
            intent = intent.label(),
            "question classified"
        );
        state.intent = Some(intent);
        Ok(intent)
    }
}

pub fn parse_intent(raw: &str) -> Intent {
    Intent::from_label(raw).unwrap_or(Intent::Chitchat)
}
