//! The three classification stages and the resolver that merges them.

mod builder;
mod ensemble;
mod error;
mod learned;
mod nli;
mod rules;
mod tfidf;
mod utils;
mod zero_shot;

pub use builder::ZeroShotModelBuilder;
pub use ensemble::{DecisionSource, EnsembleResolver, KeywordTable, OverrideRule, Resolution, NOT_DETECTED};
pub use error::ClassifierError;
pub use learned::{LearnedArtifact, LearnedClassifier, LogisticRegression, TrainingConfig};
pub use rules::RuleMatcher;
pub use tfidf::TfidfVectorizer;
pub use utils::round_confidence;
pub use zero_shot::{OnnxZeroShotModel, ZeroShotClassifier, ZeroShotModel, DEFAULT_HYPOTHESIS_TEMPLATE};

use serde::Serialize;

/// Result of running one optional pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome<T> {
    /// The stage produced a prediction
    Ready(T),
    /// The stage ran but had nothing to say
    NoPrediction,
    /// The stage is not configured (missing model or artifact)
    Unavailable(String),
    /// The stage errored or timed out
    Failed(String),
}

impl<T> StageOutcome<T> {
    /// The prediction, if any. Every non-ready outcome reads as "no prediction".
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

}

impl<T> From<Option<T>> for StageOutcome<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NoPrediction, Self::Ready)
    }
}
