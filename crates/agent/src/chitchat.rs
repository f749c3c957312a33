use std::sync::Arc;

use tera::Context;

use parley_core::domain::conversation::ConversationState;

use crate::conversation::{answer_or, ConversationWindow};
use crate::errors::NodeError;
use crate::llm::LlmClient;
use crate::prompts::{PromptKind, PromptLibrary};

pub const CHITCHAT_FALLBACK: &str = "Hello! Ask me anything about the customer comments.";

pub struct ChitchatPath {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    window: ConversationWindow,
}

impl ChitchatPath {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, window: ConversationWindow) -> Self {
        Self { llm, prompts, window }
    }

    pub async fn reply(&self, state: &mut ConversationState) -> Result<(), NodeError> {
        let mut context = Context::new();
        context.insert("history", &self.window.render(state.prior_messages()));
        context.insert("question", &state.last_question);

        let messages = self.prompts.render(PromptKind::Chitchat, &context)?;
        let answer = self.llm.complete(&messages).await?;
        state.last_answer = answer_or(&answer, CHITCHAT_FALLBACK);
        Ok(())
    }
}
