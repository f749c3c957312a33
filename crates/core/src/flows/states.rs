use serde::{Deserialize, Serialize};

use crate::domain::conversation::Intent;

/// Nodes of the fixed conversation graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNode {
    AppendUserMessage,
    ClassifyIntent,
    Chitchat,
    GenerateSql,
    ExecuteSql,
    InterpretResults,
    RetrieveRecords,
    AnalyzeRecords,
    AppendAiMessage,
    End,
}

impl GraphNode {
    pub const ALL: [GraphNode; 10] = [
        Self::AppendUserMessage,
        Self::ClassifyIntent,
        Self::Chitchat,
        Self::GenerateSql,
        Self::ExecuteSql,
        Self::InterpretResults,
        Self::RetrieveRecords,
        Self::AnalyzeRecords,
        Self::AppendAiMessage,
        Self::End,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|node| node.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppendUserMessage => "append_user_message",
            Self::ClassifyIntent => "classify_intent",
            Self::Chitchat => "chitchat",
            Self::GenerateSql => "generate_sql",
            Self::ExecuteSql => "execute_sql",
            Self::InterpretResults => "interpret_results",
            Self::RetrieveRecords => "retrieve_records",
            Self::AnalyzeRecords => "analyze_records",
            Self::AppendAiMessage => "append_ai_message",
            Self::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Nodes that set `last_answer` for the turn.
    pub fn sets_answer(&self) -> bool {
        matches!(self, Self::Chitchat | Self::InterpretResults | Self::AnalyzeRecords)
    }
}

/// Why an edge was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Always,
    Routed(Intent),
    ResultsToRetrieval,
    ResultsToInterpretation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: GraphNode,
    pub to: GraphNode,
    pub edge: EdgeKind,
}
