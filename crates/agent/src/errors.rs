use thiserror::Error;

use parley_core::errors::{ApplicationError, DomainError};
use parley_core::flows::GraphTransitionError;
use parley_db::RepositoryError;

use crate::llm::LlmError;
use crate::prompts::PromptError;

/// Failure inside a graph node that cannot be absorbed into the conversation state.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// The only failures a turn reports to its caller. Everything else lands in `state.error`.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("question exceeds {max} characters")]
    QuestionTooLong { max: usize },
    #[error("language model unavailable: {0}")]
    ModelUnavailable(#[source] LlmError),
    #[error("could not read checkpoint for thread `{thread_id}`: {source}")]
    CheckpointRead {
        thread_id: String,
        #[source]
        source: RepositoryError,
    },
    #[error("could not list conversations for user `{user_id}`: {source}")]
    ConversationList {
        user_id: String,
        #[source]
        source: RepositoryError,
    },
    #[error("could not delete thread `{thread_id}`: {source}")]
    ConversationDelete {
        thread_id: String,
        #[source]
        source: RepositoryError,
    },
    #[error(transparent)]
    Prompt(PromptError),
    #[error(transparent)]
    Graph(#[from] GraphTransitionError),
}

impl From<NodeError> for TurnError {
    fn from(value: NodeError) -> Self {
        match value {
            NodeError::Model(error) => Self::ModelUnavailable(error),
            NodeError::Prompt(error) => Self::Prompt(error),
        }
    }
}

impl From<TurnError> for ApplicationError {
    fn from(value: TurnError) -> Self {
        match value {
            TurnError::EmptyQuestion | TurnError::QuestionTooLong { .. } => {
                ApplicationError::InvalidInput(value.to_string())
            }
            TurnError::ModelUnavailable(error) => ApplicationError::ModelUnavailable(error.to_string()),
            TurnError::CheckpointRead { .. }
            | TurnError::ConversationList { .. }
            | TurnError::ConversationDelete { .. } => ApplicationError::Persistence(value.to_string()),
            TurnError::Prompt(error) => ApplicationError::Configuration(error.to_string()),
            TurnError::Graph(error) => ApplicationError::Domain(DomainError::from(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_core::errors::{ApplicationError, InterfaceError};

    use super::TurnError;
    use crate::llm::LlmError;

    #[test]
    fn model_unavailability_is_distinguishable() {
        let error = ApplicationError::from(TurnError::ModelUnavailable(LlmError::Transport(
            "connection refused".to_string(),
        )));
        assert!(matches!(error, ApplicationError::ModelUnavailable(_)));
        assert!(matches!(error.into_interface("req-1"), InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn input_errors_are_bad_requests() {
        for error in [TurnError::EmptyQuestion, TurnError::QuestionTooLong { max: 10_000 }] {
            assert!(matches!(
                ApplicationError::from(error).into_interface("req-2"),
                InterfaceError::BadRequest { .. }
            ));
        }
    }
}
