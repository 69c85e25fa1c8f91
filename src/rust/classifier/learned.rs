use std::collections::BTreeSet;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use log::{debug, info};

use super::error::ClassifierError;
use super::tfidf::TfidfVectorizer;
use super::utils::{argmax, softmax};

const ARTIFACT_VERSION: u32 = 1;

/// Multinomial logistic regression with an L2 penalty, fitted by
/// full-batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    classes: Vec<String>,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// Optimiser settings for [`LogisticRegression::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Inverse regularisation strength
    pub c: f32,
    pub learning_rate: f32,
    pub max_iter: usize,
    /// Stop once the gradient's max-abs entry falls below this
    pub tolerance: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            learning_rate: 1.0,
            max_iter: 1000,
            tolerance: 1e-4,
        }
    }
}

impl LogisticRegression {
    pub fn fit(
        features: &Array2<f32>,
        labels: &[String],
        config: &TrainingConfig,
    ) -> Result<Self, ClassifierError> {
        let classes: Vec<String> = labels.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(ClassifierError::ValidationError(format!(
                "Training needs at least two distinct labels, got {}",
                classes.len()
            )));
        }

        let (n_samples, n_features) = features.dim();
        let n_classes = classes.len();

        let mut targets = Array2::<f32>::zeros((n_samples, n_classes));
        for (row, label) in labels.iter().enumerate() {
            if let Ok(col) = classes.binary_search(label) {
                targets[[row, col]] = 1.0;
            }
        }

        let mut weights = Array2::<f32>::zeros((n_classes, n_features));
        let mut bias = Array1::<f32>::zeros(n_classes);
        let n = n_samples as f32;
        let penalty = 1.0 / (config.c * n);

        for iteration in 0..config.max_iter {
            let mut probs = features.dot(&weights.t()) + &bias;
            for mut row in probs.rows_mut() {
                let p = softmax(row.view());
                row.assign(&p);
            }
            let error = probs - &targets;

            let grad_w = error.t().dot(features) / n + &weights * penalty;
            let grad_b = error.sum_axis(Axis(0)) / n;

            let max_grad = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f32, |acc, g| acc.max(g.abs()));
            if max_grad < config.tolerance {
                debug!("Logistic regression converged after {} iterations", iteration);
                break;
            }

            weights = weights - grad_w * config.learning_rate;
            bias = bias - grad_b * config.learning_rate;
        }

        Ok(Self { classes, weights, bias })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Class probabilities for a single feature row, in [`classes`](Self::classes) order.
    pub fn predict_proba(&self, features: &Array1<f32>) -> Result<Array1<f32>, ClassifierError> {
        if features.len() != self.weights.ncols() {
            return Err(ClassifierError::PredictionError(format!(
                "Feature size mismatch: expected {}, got {}",
                self.weights.ncols(),
                features.len()
            )));
        }
        let logits = self.weights.dot(features) + &self.bias;
        Ok(softmax(logits.view()))
    }

    pub fn predict(&self, features: &Array1<f32>) -> Result<String, ClassifierError> {
        let probs = self.predict_proba(features)?;
        argmax(probs.view())
            .and_then(|idx| self.classes.get(idx).cloned())
            .ok_or_else(|| ClassifierError::PredictionError("Model has no classes".into()))
    }
}

/// The persisted (vectorizer, classifier) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedArtifact {
    pub version: u32,
    pub vectorizer: TfidfVectorizer,
    pub model: LogisticRegression,
}

/// TF-IDF + logistic regression classifier stored at a fixed path.
///
/// A missing artifact means "not trained yet": [`predict`](Self::predict)
/// returns `Ok(None)` instead of failing. The artifact is read from disk on
/// every prediction, so retraining takes effect immediately.
#[derive(Debug, Clone)]
pub struct LearnedClassifier {
    artifact_path: PathBuf,
    training: TrainingConfig,
}

impl LearnedClassifier {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            training: TrainingConfig::default(),
        }
    }

    pub fn with_training_config(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn is_trained(&self) -> bool {
        self.artifact_path.exists()
    }

    /// Fits the vectorizer and model on `texts[i]` / `labels[i]` pairs and
    /// overwrites the stored artifact.
    pub fn train<S: AsRef<str>>(&self, texts: &[S], labels: &[S]) -> Result<(), ClassifierError> {
        if texts.is_empty() {
            return Err(ClassifierError::ValidationError("Training data cannot be empty".into()));
        }
        if texts.len() != labels.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Got {} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }
        if let Some(pos) = labels.iter().position(|l| l.as_ref().trim().is_empty()) {
            return Err(ClassifierError::ValidationError(format!("Label {} cannot be empty", pos + 1)));
        }

        let (vectorizer, features) = TfidfVectorizer::fit_transform(texts)?;
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().trim().to_string()).collect();
        let model = LogisticRegression::fit(&features, &labels, &self.training)?;

        let artifact = LearnedArtifact {
            version: ARTIFACT_VERSION,
            vectorizer,
            model,
        };
        self.save(&artifact)?;
        info!(
            "Learned model trained on {} samples ({} classes) and saved to {:?}",
            texts.len(),
            artifact.model.classes().len(),
            self.artifact_path
        );
        Ok(())
    }

    /// Predicts the label for `text`, or `None` when no artifact exists yet.
    pub fn predict(&self, text: &str) -> Result<Option<String>, ClassifierError> {
        let Some(artifact) = self.load()? else {
            return Ok(None);
        };
        let features = artifact.vectorizer.transform(text);
        artifact.model.predict(&features).map(Some)
    }

    fn load(&self) -> Result<Option<LearnedArtifact>, ClassifierError> {
        if !self.artifact_path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&self.artifact_path)?;
        let artifact: LearnedArtifact = serde_json::from_reader(BufReader::new(file))?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ClassifierError::ArtifactError(format!(
                "Unsupported artifact version {} (expected {})",
                artifact.version, ARTIFACT_VERSION
            )));
        }
        Ok(Some(artifact))
    }

    fn save(&self, artifact: &LearnedArtifact) -> Result<(), ClassifierError> {
        if let Some(parent) = self.artifact_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.artifact_path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp_path)?;
            serde_json::to_writer(BufWriter::new(file), artifact)?;
        }
        fs::rename(&tmp_path, &self.artifact_path)?;
        Ok(())
    }
}
