//! The classification pipeline.
//!
//! ```text
//! detect language -> translate to English -> normalise -> catalog
//!   -> {learned, zero-shot, rules} -> ensemble -> catalog lookup
//!   -> translate back
//! ```
//!
//! Only an empty query is an error. Every other failure degrades the stage
//! it happened in and is recorded in the [`PipelineReport`].

use std::sync::Arc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogSource, InMemoryCatalogSource, ProblemCatalog, ProblemDetails};
use crate::classifier::{
    ClassifierError, EnsembleResolver, LearnedClassifier, OnnxZeroShotModel, Resolution, RuleMatcher,
    StageOutcome, ZeroShotClassifier, ZeroShotModel,
};
use crate::config::PipelineConfig;
use crate::language::Language;
use crate::text;
use crate::translation::{create_service, TranslationService, Translator};
use crate::{BuiltinNliModel, ModelManager};

/// Text to classify, optionally with its language already known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub text: String,
    #[serde(default)]
    pub language: Option<Language>,
}

impl ClassificationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
        }
    }

    /// Skips language detection.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The query as received
    pub input: String,
    /// Normalised English text the stages saw
    pub translated: String,
    pub language: Language,
    /// Issue name, in the farmer's language when translation succeeded
    pub issue: String,
    pub confidence: f32,
    pub details: ProblemDetails,
}

/// Per-stage outcomes of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// `NoPrediction` when the input was already English
    pub translation: StageOutcome<()>,
    pub learned: StageOutcome<String>,
    pub zero_shot: StageOutcome<(String, f32)>,
    pub rule: StageOutcome<(String, f32)>,
    pub resolution: Resolution,
    pub catalog_size: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    catalog: Arc<ProblemCatalog>,
    translator: Translator,
    learned: LearnedClassifier,
    zero_shot: ZeroShotClassifier,
    rules: RuleMatcher,
    resolver: EnsembleResolver,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<ProblemCatalog> {
        &self.catalog
    }

    pub fn learned(&self) -> &LearnedClassifier {
        &self.learned
    }

    pub fn zero_shot_available(&self) -> bool {
        self.zero_shot.is_available()
    }

    /// Classifies a farmer's query.
    ///
    /// # Errors
    /// `ValidationError` if the query is empty or whitespace.
    pub async fn classify(&self, query: &str) -> Result<ClassificationResult, ClassifierError> {
        let (result, _) = self.classify_request(&ClassificationRequest::new(query)).await?;
        Ok(result)
    }

    /// Classifies a request and reports what each stage did.
    pub async fn classify_request(
        &self,
        request: &ClassificationRequest,
    ) -> Result<(ClassificationResult, PipelineReport), ClassifierError> {
        if request.text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Query cannot be empty".into()));
        }

        let language = request.language.unwrap_or_else(|| Language::detect(&request.text));
        let (english, translation_error) = self.translator.to_english_from(&request.text, language).await;
        let translation = match (language.is_english(), translation_error) {
            (true, _) => StageOutcome::NoPrediction,
            (false, None) => StageOutcome::Ready(()),
            (false, Some(e)) => StageOutcome::Failed(e.to_string()),
        };

        let normalized = text::normalize(&english);
        debug!("Normalised query: {:?}", normalized);
        let catalog = self.catalog.get_problems(false).await;

        let learned = self.run_learned(&normalized).await;
        let zero_shot = self.zero_shot.score(&normalized, &catalog.labels()).await;
        let rule = StageOutcome::from(self.rules.find_match(&normalized, &catalog));
        log_degraded("learned", &learned);
        log_degraded("zero-shot", &zero_shot);

        let resolution = self.resolver.resolve(
            rule.clone().ready(),
            learned.clone().ready(),
            zero_shot.clone().ready(),
            &normalized,
        );
        info!(
            "Resolved '{}' ({:.3}) via {:?}{}",
            resolution.issue,
            resolution.confidence,
            resolution.decided_by,
            if resolution.overridden { ", overridden" } else { "" }
        );

        let details = catalog.get(&resolution.issue).cloned().unwrap_or_default();
        let mut result = ClassificationResult {
            input: request.text.clone(),
            translated: normalized,
            language,
            issue: resolution.issue.clone(),
            confidence: resolution.confidence,
            details,
        };
        self.translator.translate_result(&mut result, language).await;

        let report = PipelineReport {
            translation,
            learned,
            zero_shot,
            rule,
            resolution,
            catalog_size: catalog.len(),
        };
        Ok((result, report))
    }

    async fn run_learned(&self, text: &str) -> StageOutcome<String> {
        if !self.learned.is_trained() {
            return StageOutcome::Unavailable(format!(
                "no learned artifact at {:?}",
                self.learned.artifact_path()
            ));
        }
        let learned = self.learned.clone();
        let text = text.to_string();
        match tokio::task::spawn_blocking(move || learned.predict(&text)).await {
            Ok(Ok(Some(label))) => StageOutcome::Ready(label),
            Ok(Ok(None)) => StageOutcome::Unavailable("learned artifact removed".into()),
            Ok(Err(e)) => StageOutcome::Failed(e.to_string()),
            Err(join_error) => StageOutcome::Failed(format!("learned task panicked: {}", join_error)),
        }
    }
}

fn log_degraded<T>(stage: &str, outcome: &StageOutcome<T>) {
    match outcome {
        StageOutcome::Failed(reason) => warn!("{} stage failed: {}", stage, reason),
        StageOutcome::Unavailable(reason) => debug!("{} stage unavailable: {}", stage, reason),
        _ => {}
    }
}

/// Wires a [`Pipeline`] from config and collaborators.
///
/// Without a catalog source the pipeline serves the built-in catalog.
/// Without a translation service one is created from the config. The
/// zero-shot stage stays unavailable unless a model is supplied or
/// [`with_builtin_zero_shot`](Self::with_builtin_zero_shot) is requested.
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    catalog_source: Option<Arc<dyn CatalogSource>>,
    translation_service: Option<Arc<dyn TranslationService>>,
    zero_shot_model: Option<Arc<dyn ZeroShotModel>>,
    load_builtin_zero_shot: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.catalog_source = Some(source);
        self
    }

    pub fn with_translation_service(mut self, service: Arc<dyn TranslationService>) -> Self {
        self.translation_service = Some(service);
        self
    }

    pub fn with_zero_shot_model(mut self, model: Arc<dyn ZeroShotModel>) -> Self {
        self.zero_shot_model = Some(model);
        self
    }

    /// Loads the built-in NLI model from `config.models_dir` at build time.
    /// A missing or broken model disables the stage instead of failing.
    pub fn with_builtin_zero_shot(mut self) -> Self {
        self.load_builtin_zero_shot = true;
        self
    }

    /// # Errors
    /// `ValidationError` if the config is invalid.
    pub fn build(self) -> Result<Pipeline, ClassifierError> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| ClassifierError::ValidationError(e.to_string()))?;

        let source: Arc<dyn CatalogSource> = match self.catalog_source {
            Some(source) => source,
            None => Arc::new(InMemoryCatalogSource::default()),
        };
        let catalog = ProblemCatalog::subscribed(source);

        let service = self
            .translation_service
            .unwrap_or_else(|| create_service(&config.translation));
        let translator = Translator::new(service, config.translation.timeout());

        let zero_shot = match self.zero_shot_model {
            Some(model) => ZeroShotClassifier::new(model, config.zero_shot_timeout()),
            None if self.load_builtin_zero_shot => {
                ZeroShotClassifier::from_load_result(load_builtin_model(&config), config.zero_shot_timeout())
            }
            None => ZeroShotClassifier::unavailable(),
        }
        .with_hypothesis_template(config.hypothesis_template.clone());

        info!(
            "Pipeline ready (zero-shot {}, learned artifact {:?})",
            if zero_shot.is_available() { "available" } else { "unavailable" },
            config.artifact_path
        );

        Ok(Pipeline {
            learned: LearnedClassifier::new(config.artifact_path.clone())
                .with_training_config(config.training.clone()),
            rules: RuleMatcher::new(config.rule_confidence),
            resolver: EnsembleResolver::new(config.zero_shot_threshold, config.overrides.clone()),
            catalog,
            translator,
            zero_shot,
            config,
        })
    }
}

fn load_builtin_model(config: &PipelineConfig) -> Result<OnnxZeroShotModel, ClassifierError> {
    let manager = ModelManager::new(&config.models_dir)
        .map_err(|e| ClassifierError::BuildError(format!("Failed to open models directory: {}", e)))?;
    OnnxZeroShotModel::builder()
        .with_runtime_config(config.runtime_config())
        .with_managed_model(&manager, BuiltinNliModel::XlmRobertaLargeXnli)?
        .build()
}
