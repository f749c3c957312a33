use serde::{Deserialize, Serialize};

/// Sentiment tags carried by stored comments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    #[serde(rename = "Olumlu")]
    Positive,
    #[serde(rename = "Olumsuz")]
    Negative,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "Olumlu",
            Self::Negative => "Olumsuz",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "olumlu" | "positive" => Some(Self::Positive),
            "olumsuz" | "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// A comment returned by similarity search. Never persisted by the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    pub identifier: String,
    pub text: String,
    pub source_label: String,
    pub category: String,
    pub sentiment_label: String,
    /// Cosine distance from the query; `None` for rows substituted without a search.
    pub distance: Option<f32>,
}

impl RetrievedRecord {
    pub fn similarity(&self) -> Option<f32> {
        self.distance.map(|distance| 1.0 - distance)
    }
}

#[cfg(test)]
mod tests {
    use super::{RetrievedRecord, Sentiment};

    #[test]
    fn sentiment_labels_accept_turkish_and_english() {
        assert_eq!(Sentiment::from_label("Olumsuz"), Some(Sentiment::Negative));
        assert_eq!(Sentiment::from_label(" olumlu "), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_label("NEGATIVE"), Some(Sentiment::Negative));
        assert_eq!(Sentiment::from_label("Nötr"), None);
    }

    #[test]
    fn similarity_is_one_minus_distance() {
        let record = RetrievedRecord {
            identifier: "42".to_string(),
            text: "Kargo çok geç geldi".to_string(),
            source_label: "Acme".to_string(),
            category: "Kargo".to_string(),
            sentiment_label: "Olumsuz".to_string(),
            distance: Some(0.25),
        };
        assert_eq!(record.similarity(), Some(0.75));
    }
}
