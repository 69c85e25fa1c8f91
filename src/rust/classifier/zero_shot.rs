use std::sync::Arc;
use std::time::Duration;
use ndarray::Array1;
use ort::session::Session;
use tokenizers::Tokenizer;
use log::{debug, warn};

use super::error::ClassifierError;
use super::nli::EntailmentScoring;
use super::utils::softmax;
use super::StageOutcome;

/// Hypothesis used to turn each candidate label into an NLI query.
pub const DEFAULT_HYPOTHESIS_TEMPLATE: &str = "This text is about {}.";

/// A zero-shot classifier: given text, candidate labels and a hypothesis
/// template with a `{}` placeholder, returns labels ranked by descending score.
pub trait ZeroShotModel: Send + Sync {
    fn classify(
        &self,
        text: &str,
        candidate_labels: &[String],
        hypothesis_template: &str,
    ) -> Result<Vec<(String, f32)>, ClassifierError>;
}

/// Zero-shot classification over an ONNX NLI model.
///
/// Each label is scored by the entailment logit of
/// `(text, template.replace("{}", label))`; scores are a softmax over the
/// labels' entailment logits, so they sum to one.
#[derive(Debug)]
pub struct OnnxZeroShotModel {
    pub model_path: String,
    pub tokenizer_path: String,
    pub tokenizer: Arc<Tokenizer>,
    pub session: Arc<Session>,
    pub entailment_index: usize,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxZeroShotModel>();
    }
};

impl EntailmentScoring for OnnxZeroShotModel {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        Some(&self.tokenizer)
    }

    fn session(&self) -> Option<&Session> {
        Some(&self.session)
    }

    fn entailment_index(&self) -> usize {
        self.entailment_index
    }
}

impl OnnxZeroShotModel {
    /// Creates a new ZeroShotModelBuilder for fluent construction
    pub fn builder() -> super::builder::ZeroShotModelBuilder {
        super::builder::ZeroShotModelBuilder::new()
    }
}

impl ZeroShotModel for OnnxZeroShotModel {
    fn classify(
        &self,
        text: &str,
        candidate_labels: &[String],
        hypothesis_template: &str,
    ) -> Result<Vec<(String, f32)>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        if candidate_labels.is_empty() {
            return Err(ClassifierError::ValidationError("At least one candidate label is required".into()));
        }

        let logits = candidate_labels
            .iter()
            .map(|label| self.entailment_logit(text, &hypothesis_template.replace("{}", label)))
            .collect::<Result<Vec<f32>, _>>()?;

        let scores = softmax(Array1::from(logits).view());
        Ok(rank(candidate_labels, scores.iter().copied()))
    }
}

pub(crate) fn rank(labels: &[String], scores: impl Iterator<Item = f32>) -> Vec<(String, f32)> {
    let mut ranked: Vec<(String, f32)> = labels.iter().cloned().zip(scores).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Pipeline stage around an optional [`ZeroShotModel`].
///
/// Availability is fixed at construction: a classifier built without a
/// model reports [`StageOutcome::Unavailable`] for every call.
#[derive(Clone)]
pub struct ZeroShotClassifier {
    model: Option<Arc<dyn ZeroShotModel>>,
    hypothesis_template: String,
    timeout: Duration,
}

impl ZeroShotClassifier {
    pub fn new(model: Arc<dyn ZeroShotModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            timeout,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            model: None,
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            timeout: Duration::ZERO,
        }
    }

    /// Keeps the model if it loaded, otherwise logs why and disables the stage.
    pub fn from_load_result<M, E>(result: Result<M, E>, timeout: Duration) -> Self
    where
        M: ZeroShotModel + 'static,
        E: std::fmt::Display,
    {
        match result {
            Ok(model) => Self::new(Arc::new(model), timeout),
            Err(e) => {
                warn!("Zero-shot model not loaded, stage disabled: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn with_hypothesis_template(mut self, template: impl Into<String>) -> Self {
        self.hypothesis_template = template.into();
        self
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// Scores `text` against `labels` and returns the best label with its
    /// confidence. Inference runs on the blocking pool under the timeout.
    pub async fn score(&self, text: &str, labels: &[String]) -> StageOutcome<(String, f32)> {
        let Some(model) = self.model.clone() else {
            return StageOutcome::Unavailable("zero-shot model not loaded".into());
        };
        if labels.is_empty() || text.trim().is_empty() {
            return StageOutcome::NoPrediction;
        }

        let text = text.to_string();
        let labels = labels.to_vec();
        let template = self.hypothesis_template.clone();
        let task = tokio::task::spawn_blocking(move || model.classify(&text, &labels, &template));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => StageOutcome::Failed(format!("zero-shot inference timed out after {:?}", self.timeout)),
            Ok(Err(join_error)) => StageOutcome::Failed(format!("zero-shot task panicked: {}", join_error)),
            Ok(Ok(Err(e))) => StageOutcome::Failed(e.to_string()),
            Ok(Ok(Ok(ranked))) => match ranked.into_iter().next() {
                Some((label, score)) => {
                    debug!("Zero-shot best label '{}' ({:.3})", label, score);
                    StageOutcome::Ready((label, score))
                }
                None => StageOutcome::NoPrediction,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores each label by how many of its words appear in the text.
    struct OverlapModel;

    impl ZeroShotModel for OverlapModel {
        fn classify(&self, text: &str, labels: &[String], template: &str) -> Result<Vec<(String, f32)>, ClassifierError> {
            assert_eq!(template, DEFAULT_HYPOTHESIS_TEMPLATE);
            let raw: Vec<f32> = labels
                .iter()
                .map(|l| l.to_lowercase().split_whitespace().filter(|w| text.contains(w)).count() as f32)
                .collect();
            let scores = softmax(Array1::from(raw).view());
            Ok(rank(labels, scores.iter().copied()))
        }
    }

    struct BrokenModel;

    impl ZeroShotModel for BrokenModel {
        fn classify(&self, _: &str, _: &[String], _: &str) -> Result<Vec<(String, f32)>, ClassifierError> {
            Err(ClassifierError::ModelError("session crashed".into()))
        }
    }

    struct SleepyModel;

    impl ZeroShotModel for SleepyModel {
        fn classify(&self, _: &str, labels: &[String], _: &str) -> Result<Vec<(String, f32)>, ClassifierError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(rank(labels, std::iter::repeat(1.0)))
        }
    }

    fn labels() -> Vec<String> {
        vec!["Root Rot".into(), "Pest Attack".into()]
    }

    #[test]
    fn test_rank_sorts_descending() {
        let ranked = rank(&labels(), vec![0.2, 0.8].into_iter());
        assert_eq!(ranked[0], ("Pest Attack".to_string(), 0.8));
    }

    #[tokio::test]
    async fn test_score_returns_best_label() {
        let classifier = ZeroShotClassifier::new(Arc::new(OverlapModel), Duration::from_secs(5));
        match classifier.score("pest on the leaves", &labels()).await {
            StageOutcome::Ready((label, score)) => {
                assert_eq!(label, "Pest Attack");
                assert!(score > 0.5);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_model() {
        let classifier = ZeroShotClassifier::from_load_result::<OverlapModel, _>(Err("missing model.onnx"), Duration::from_secs(1));
        assert!(!classifier.is_available());
        assert!(matches!(classifier.score("text", &labels()).await, StageOutcome::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_model_error_is_a_failure() {
        let classifier = ZeroShotClassifier::new(Arc::new(BrokenModel), Duration::from_secs(1));
        assert!(matches!(classifier.score("text", &labels()).await, StageOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let classifier = ZeroShotClassifier::new(Arc::new(SleepyModel), Duration::from_millis(20));
        assert!(matches!(classifier.score("text", &labels()).await, StageOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_no_labels_means_no_prediction() {
        let classifier = ZeroShotClassifier::new(Arc::new(OverlapModel), Duration::from_secs(1));
        assert!(matches!(classifier.score("text", &[]).await, StageOutcome::NoPrediction));
    }
}
