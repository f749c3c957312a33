use serde::Serialize;

/// A fallback that kept the system serving at reduced fidelity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Durable checkpoint store unreachable; conversations do not survive a restart.
    VolatileMemory { reason: String },
    /// Similarity search failed and previously fetched SQL rows were used instead.
    RetrievalFallback { reason: String },
    /// A per-node checkpoint could not be written.
    CheckpointWriteFailed { node: String, reason: String },
}

impl Degradation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::VolatileMemory { .. } => "volatile_memory",
            Self::RetrievalFallback { .. } => "retrieval_fallback",
            Self::CheckpointWriteFailed { .. } => "checkpoint_write_failed",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::VolatileMemory { reason }
            | Self::RetrievalFallback { reason }
            | Self::CheckpointWriteFailed { reason, .. } => reason,
        }
    }
}

/// A successful result that may have been produced through one or more fallbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct Degradable<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> Degradable<T> {
    pub fn clean(value: T) -> Self {
        Self { value, degradations: Vec::new() }
    }

    pub fn degraded(value: T, degradation: Degradation) -> Self {
        Self { value, degradations: vec![degradation] }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Degradable<U> {
        Degradable { value: f(self.value), degradations: self.degradations }
    }

    pub fn into_parts(self) -> (T, Vec<Degradation>) {
        (self.value, self.degradations)
    }
}
