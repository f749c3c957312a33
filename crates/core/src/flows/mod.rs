pub mod engine;
pub mod states;

pub use engine::{ConversationGraph, GraphDefinition, GraphEngine, GraphTransitionError};
pub use states::{EdgeKind, GraphNode, Transition};
