use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use parley_core::config::AgentConfig;
use parley_core::domain::checkpoint::{Checkpoint, ConversationSummary};
use parley_core::domain::conversation::{ChatMessage, ConversationState, Intent};
use parley_core::domain::degradation::Degradation;
use parley_core::flows::{ConversationGraph, GraphEngine, GraphNode};
use parley_db::{CheckpointStore, QueryExecutor};

use crate::chitchat::ChitchatPath;
use crate::conversation::ConversationWindow;
use crate::errors::{NodeError, TurnError};
use crate::guardrails::GuardrailPolicy;
use crate::llm::LlmClient;
use crate::prompts::{PromptError, PromptLibrary};
use crate::rag::{RetrievalPath, SemanticSearch};
use crate::router::IntentRouter;
use crate::sql::SqlPath;

pub const MAX_QUESTION_CHARS: usize = 10_000;
pub const MAX_CONVERSATION_PAGE: u32 = 100;

/// Collaborators injected at construction.
#[derive(Clone)]
pub struct AgentDependencies {
    pub llm: Arc<dyn LlmClient>,
    pub executor: Arc<dyn QueryExecutor>,
    pub search: Arc<dyn SemanticSearch>,
    pub store: Arc<dyn CheckpointStore>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub thread_id: String,
    pub intent: Option<Intent>,
    pub degradations: Vec<Degradation>,
}

/// Drives one turn through the conversation graph, checkpointing after every node.
pub struct Orchestrator {
    engine: GraphEngine<ConversationGraph>,
    router: IntentRouter,
    sql: SqlPath,
    retrieval: RetrievalPath,
    chitchat: ChitchatPath,
    store: Arc<dyn CheckpointStore>,
}

impl Orchestrator {
    pub fn new(dependencies: AgentDependencies, settings: &AgentConfig) -> Result<Self, PromptError> {
        let prompts = Arc::new(PromptLibrary::embedded()?);
        let window = ConversationWindow::new(settings.history_window, settings.history_char_cap);
        let AgentDependencies { llm, executor, search, store } = dependencies;

        Ok(Self {
            engine: GraphEngine::default(),
            router: IntentRouter::new(llm.clone(), prompts.clone(), window),
            sql: SqlPath::new(
                llm.clone(),
                prompts.clone(),
                window,
                executor,
                GuardrailPolicy::default(),
            ),
            retrieval: RetrievalPath::new(
                llm.clone(),
                prompts.clone(),
                search,
                settings.retrieval_top_k,
                settings.analysis_record_cap,
            ),
            chitchat: ChitchatPath::new(llm, prompts, window),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Loads the thread (or starts it), runs exactly one path and returns the answer.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_id: &str,
        question: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(TurnError::EmptyQuestion);
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(TurnError::QuestionTooLong { max: MAX_QUESTION_CHARS });
        }

        let mut state = match self.load(thread_id).await? {
            Some(checkpoint) => checkpoint.state,
            None => ConversationState::new(thread_id, user_id),
        };
        state.begin_turn(user_id, question);

        info!(
            event_name = "agent.turn.start",
            thread_id,
            prior_messages = state.messages().len(),
            "turn started"
        );
        self.drive(state, self.engine.entry(), 0).await
    }

    /// Continues a turn interrupted after a checkpoint. A finished thread returns its last answer
    /// without running anything; an unknown thread returns `None`.
    pub async fn resume_turn(&self, thread_id: &str) -> Result<Option<TurnOutcome>, TurnError> {
        let Some(checkpoint) = self.load(thread_id).await? else {
            return Ok(None);
        };

        match checkpoint.next_node {
            Some(next) if checkpoint.is_pending() => {
                info!(
                    event_name = "agent.turn.resume",
                    thread_id,
                    next_node = next.as_str(),
                    step = checkpoint.step,
                    "resuming interrupted turn"
                );
                self.drive(checkpoint.state, next, checkpoint.step).await.map(Some)
            }
            _ => Ok(Some(TurnOutcome {
                answer: checkpoint.state.last_answer.clone(),
                thread_id: checkpoint.thread_id,
                intent: checkpoint.state.intent,
                degradations: Vec::new(),
            })),
        }
    }

    /// Read-only projection of the thread transcript.
    pub async fn get_history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, TurnError> {
        Ok(self
            .load(thread_id)
            .await?
            .map(|checkpoint| checkpoint.state.messages().to_vec())
            .unwrap_or_default())
    }

    /// The user's threads, most recently active first. `limit` is clamped to
    /// `1..=MAX_CONVERSATION_PAGE`.
    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, TurnError> {
        self.store
            .list(user_id, limit.clamp(1, MAX_CONVERSATION_PAGE), offset)
            .await
            .map_err(|source| TurnError::ConversationList { user_id: user_id.to_string(), source })
    }

    /// Removes a thread and its transcript. With `owner` set, a thread started by someone else is
    /// treated as missing. Returns whether anything was deleted.
    pub async fn delete_conversation(
        &self,
        thread_id: &str,
        owner: Option<&str>,
    ) -> Result<bool, TurnError> {
        if let Some(owner) = owner {
            let owned = self
                .load(thread_id)
                .await?
                .is_some_and(|checkpoint| checkpoint.state.user_id == owner);
            if !owned {
                return Ok(false);
            }
        }

        let deleted = self.store.delete(thread_id).await.map_err(|source| {
            TurnError::ConversationDelete { thread_id: thread_id.to_string(), source }
        })?;
        info!(event_name = "agent.conversation.deleted", thread_id, deleted, "conversation delete");
        Ok(deleted)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, TurnError> {
        self.store
            .load(thread_id)
            .await
            .map_err(|source| TurnError::CheckpointRead { thread_id: thread_id.to_string(), source })
    }

    async fn drive(
        &self,
        mut state: ConversationState,
        mut node: GraphNode,
        mut step: u32,
    ) -> Result<TurnOutcome, TurnError> {
        let mut degradations = Vec::new();

        while !node.is_terminal() {
            degradations.extend(self.run_node(node, &mut state).await?);

            let transition = self.engine.next(node, &state)?;
            step += 1;
            debug!(
                event_name = "agent.graph.node_completed",
                thread_id = %state.thread_id,
                node = node.as_str(),
                next_node = transition.to.as_str(),
                step,
                "node completed"
            );

            let pending = (!transition.to.is_terminal()).then_some(transition.to);
            if let Some(degradation) = self.checkpoint(&state, pending, step, node).await {
                degradations.push(degradation);
            }
            node = transition.to;
        }

        info!(
            event_name = "agent.turn.completed",
            thread_id = %state.thread_id,
            intent = state.intent.map(|intent| intent.label()).unwrap_or("none"),
            error = state.error.as_deref().unwrap_or(""),
            degradations = degradations.len(),
            "turn completed"
        );

        Ok(TurnOutcome {
            answer: state.last_answer.clone(),
            thread_id: state.thread_id.clone(),
            intent: state.intent,
            degradations,
        })
    }

    async fn run_node(
        &self,
        node: GraphNode,
        state: &mut ConversationState,
    ) -> Result<Vec<Degradation>, NodeError> {
        match node {
            GraphNode::AppendUserMessage => {
                let question = state.last_question.clone();
                state.push_message(ChatMessage::human(question));
            }
            GraphNode::ClassifyIntent => {
                self.router.classify(state).await?;
            }
            GraphNode::Chitchat => self.chitchat.reply(state).await?,
            GraphNode::GenerateSql => self.sql.generate(state).await?,
            GraphNode::ExecuteSql => self.sql.execute(state).await,
            GraphNode::InterpretResults => self.sql.interpret(state).await?,
            GraphNode::RetrieveRecords => return Ok(self.retrieval.retrieve(state).await),
            GraphNode::AnalyzeRecords => self.retrieval.analyze(state).await?,
            GraphNode::AppendAiMessage => {
                let answer = state.last_answer.clone();
                state.push_message(ChatMessage::assistant(answer));
            }
            GraphNode::End => {}
        }
        Ok(Vec::new())
    }

    async fn checkpoint(
        &self,
        state: &ConversationState,
        next_node: Option<GraphNode>,
        step: u32,
        completed: GraphNode,
    ) -> Option<Degradation> {
        match self.store.save(Checkpoint::new(state.clone(), next_node, step)).await {
            Ok(()) => None,
            Err(error) => {
                warn!(
                    event_name = "agent.graph.checkpoint_write_failed",
                    thread_id = %state.thread_id,
                    node = completed.as_str(),
                    error = %error,
                    "checkpoint write failed; continuing turn"
                );
                Some(Degradation::CheckpointWriteFailed {
                    node: completed.as_str().to_string(),
                    reason: error.to_string(),
                })
            }
        }
    }
}
