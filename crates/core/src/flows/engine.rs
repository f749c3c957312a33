use thiserror::Error;

use crate::domain::conversation::{ConversationState, Intent};
use crate::flows::states::{EdgeKind, GraphNode, Transition};

pub trait GraphDefinition {
    fn entry(&self) -> GraphNode;
    fn transition(
        &self,
        current: GraphNode,
        state: &ConversationState,
    ) -> Result<Transition, GraphTransitionError>;
}

/// The fixed topology: one three-way branch after classification and one two-way
/// branch after SQL execution. Every other edge is unconditional.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConversationGraph;

impl GraphDefinition for ConversationGraph {
    fn entry(&self) -> GraphNode {
        GraphNode::AppendUserMessage
    }

    fn transition(
        &self,
        current: GraphNode,
        state: &ConversationState,
    ) -> Result<Transition, GraphTransitionError> {
        transition_conversation(current, state)
    }
}

pub struct GraphEngine<G> {
    graph: G,
}

impl<G> GraphEngine<G>
where
    G: GraphDefinition,
{
    pub fn new(graph: G) -> Self {
        Self { graph }
    }

    pub fn entry(&self) -> GraphNode {
        self.graph.entry()
    }

    pub fn next(
        &self,
        current: GraphNode,
        state: &ConversationState,
    ) -> Result<Transition, GraphTransitionError> {
        self.graph.transition(current, state)
    }
}

impl Default for GraphEngine<ConversationGraph> {
    fn default() -> Self {
        Self::new(ConversationGraph)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphTransitionError {
    #[error("no transition leaves terminal node {0:?}")]
    FromTerminal(GraphNode),
}

/// Post-classification branch. An unset intent takes the chitchat edge, which touches no data.
pub fn route_after_classification(state: &ConversationState) -> (GraphNode, Intent) {
    match state.intent.unwrap_or(Intent::Chitchat) {
        Intent::Chitchat => (GraphNode::Chitchat, Intent::Chitchat),
        Intent::SqlOnly => (GraphNode::GenerateSql, Intent::SqlOnly),
        Intent::SqlThenRag => (GraphNode::GenerateSql, Intent::SqlThenRag),
    }
}

/// Post-execution branch.
pub fn route_after_execution(state: &ConversationState) -> (GraphNode, EdgeKind) {
    match state.intent {
        Some(Intent::SqlThenRag) => (GraphNode::RetrieveRecords, EdgeKind::ResultsToRetrieval),
        _ => (GraphNode::InterpretResults, EdgeKind::ResultsToInterpretation),
    }
}

fn transition_conversation(
    current: GraphNode,
    state: &ConversationState,
) -> Result<Transition, GraphTransitionError> {
    use GraphNode::{
        AnalyzeRecords, AppendAiMessage, AppendUserMessage, Chitchat, ClassifyIntent, End,
        ExecuteSql, GenerateSql, InterpretResults, RetrieveRecords,
    };

    let (to, edge) = match current {
        AppendUserMessage => (ClassifyIntent, EdgeKind::Always),
        ClassifyIntent => {
            let (to, intent) = route_after_classification(state);
            (to, EdgeKind::Routed(intent))
        }
        GenerateSql => (ExecuteSql, EdgeKind::Always),
        ExecuteSql => route_after_execution(state),
        RetrieveRecords => (AnalyzeRecords, EdgeKind::Always),
        Chitchat | InterpretResults | AnalyzeRecords => (AppendAiMessage, EdgeKind::Always),
        AppendAiMessage => (End, EdgeKind::Always),
        End => return Err(GraphTransitionError::FromTerminal(End)),
    };

    Ok(Transition { from: current, to, edge })
}
