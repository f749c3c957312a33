//! Conversational agent for the customer-comments assistant.
//!
//! Each turn is driven through an explicit graph (see `parley_core::flows`):
//! 1. **Routing** (`router`) - classify the question as chitchat, SQL-only or SQL-then-retrieval
//! 2. **SQL path** (`sql`) - generate a statement, gate it (`guardrails`), execute, interpret
//! 3. **Retrieval path** (`rag`) - semantic search filtered by sentiment, then bounded analysis
//! 4. **Chitchat** (`chitchat`) - a conversational reply that touches no data
//!
//! The `orchestrator` checkpoints the conversation state after every node so an interrupted
//! turn can be resumed. `runtime::ChatRuntime` is what the server and CLI hold.
//!
//! # Safety Principle
//!
//! The model only ever proposes SQL. Nothing it writes reaches the database unless the
//! read-only guard allows it.

pub mod chitchat;
pub mod conversation;
pub mod embeddings;
pub mod errors;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod rag;
pub mod router;
pub mod runtime;
pub mod sql;

pub use errors::{NodeError, TurnError};
pub use orchestrator::{AgentDependencies, Orchestrator, TurnOutcome, MAX_QUESTION_CHARS};
pub use runtime::{ChatRuntime, RuntimeBuildError};
