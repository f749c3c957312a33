use tera::{Context, Tera};
use thiserror::Error;

use parley_core::domain::conversation::ChatMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Router,
    SqlGenerate,
    Interpret,
    Analysis,
    Chitchat,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] =
        [Self::Router, Self::SqlGenerate, Self::Interpret, Self::Analysis, Self::Chitchat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::SqlGenerate => "sql_generate",
            Self::Interpret => "interpret",
            Self::Analysis => "analysis",
            Self::Chitchat => "chitchat",
        }
    }

    fn sources(&self) -> (&'static str, &'static str) {
        match self {
            Self::Router => (
                include_str!("../../../templates/prompts/router.system.tera"),
                include_str!("../../../templates/prompts/router.user.tera"),
            ),
            Self::SqlGenerate => (
                include_str!("../../../templates/prompts/sql_generate.system.tera"),
                include_str!("../../../templates/prompts/sql_generate.user.tera"),
            ),
            Self::Interpret => (
                include_str!("../../../templates/prompts/interpret.system.tera"),
                include_str!("../../../templates/prompts/interpret.user.tera"),
            ),
            Self::Analysis => (
                include_str!("../../../templates/prompts/analysis.system.tera"),
                include_str!("../../../templates/prompts/analysis.user.tera"),
            ),
            Self::Chitchat => (
                include_str!("../../../templates/prompts/chitchat.system.tera"),
                include_str!("../../../templates/prompts/chitchat.user.tera"),
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{name}` failed: {source}")]
    Template {
        name: String,
        #[source]
        source: tera::Error,
    },
}

/// Instruction templates for every model call, kept out of the graph's control flow.
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn embedded() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        for kind in PromptKind::ALL {
            let (system, user) = kind.sources();
            for (name, source) in [(system_name(kind), system), (user_name(kind), user)] {
                tera.add_raw_template(&name, source)
                    .map_err(|source| PromptError::Template { name: name.clone(), source })?;
            }
        }
        Ok(Self { tera })
    }

    /// Renders the system instruction and user turn for one model call.
    pub fn render(
        &self,
        kind: PromptKind,
        context: &Context,
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render_one(&system_name(kind), context)?;
        let user = self.render_one(&user_name(kind), context)?;
        Ok(vec![ChatMessage::system(system), ChatMessage::human(user)])
    }

    fn render_one(&self, name: &str, context: &Context) -> Result<String, PromptError> {
        self.tera
            .render(name, context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|source| PromptError::Template { name: name.to_string(), source })
    }
}

fn system_name(kind: PromptKind) -> String {
    format!("{}.system", kind.as_str())
}

fn user_name(kind: PromptKind) -> String {
    format!("{}.user", kind.as_str())
}

#[cfg(test)]
mod tests {
    use tera::Context;

    use parley_core::domain::conversation::MessageRole;

    use super::{PromptKind, PromptLibrary};

    #[test]
    fn router_prompt_lists_every_label() {
        let prompts = PromptLibrary::embedded().expect("templates parse");
        let mut context = Context::new();
        context.insert("history", "");
        context.insert("question", "Merhaba");

        let messages = prompts.render(PromptKind::Router, &context).expect("render");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        for label in ["chitchat", "sql_only", "sql_then_rag"] {
            assert!(messages[0].content.contains(label), "missing {label}");
        }
        assert_eq!(messages[1].content, "Question: Merhaba");
    }

    #[test]
    fn history_block_is_included_when_present() {
        let prompts = PromptLibrary::embedded().expect("templates parse");
        let mut context = Context::new();
        context.insert("history", "human: Merhaba\nassistant: Selam");
        context.insert("question", "Kaç yorum var?");

        let messages = prompts.render(PromptKind::SqlGenerate, &context);
        // sql generation also needs the schema
        assert!(messages.is_err());

        context.insert("schema", "comments(id INTEGER)");
        let messages = prompts.render(PromptKind::SqlGenerate, &context).expect("render");
        assert!(messages[0].content.contains("comments(id INTEGER)"));
        assert!(messages[1].content.starts_with("Recent conversation:\nhuman: Merhaba"));
        assert!(messages[1].content.ends_with("Question: Kaç yorum var?"));
    }

    #[test]
    fn chitchat_instruction_knows_nothing_about_the_data() {
        let prompts = PromptLibrary::embedded().expect("templates parse");
        let mut context = Context::new();
        context.insert("history", "");
        context.insert("question", "Merhaba");

        let messages = prompts.render(PromptKind::Chitchat, &context).expect("render");

        let instruction = messages[0].content.to_lowercase();
        for term in ["comment", "compan", "sentiment", "sql", "table"] {
            assert!(!instruction.contains(term), "chitchat instruction mentions {term}");
        }
    }
}
