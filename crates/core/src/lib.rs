pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use domain::checkpoint::{Checkpoint, ConversationSummary};
pub use domain::comment::{RetrievedRecord, Sentiment};
pub use domain::conversation::{ChatMessage, ConversationState, Intent, MessageRole, SqlRow};
pub use domain::degradation::{Degradable, Degradation};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConversationGraph, EdgeKind, GraphEngine, GraphNode, GraphTransitionError};
