//! Multilingual crop-problem classifier.
//!
//! A farmer's free-text description (English, Hindi or Marathi) is
//! translated to English, normalised, and scored by three stages: keyword
//! rules over the problem catalog, a TF-IDF + logistic regression model, and
//! an optional zero-shot NLI model. The answer, with causes and remedies from
//! the catalog, is translated back to the farmer's language.
//!
//! # Basic Usage
//!
//! ```rust
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use cropsage::{NoopTranslator, Pipeline, PipelineConfig};
//!
//! let dir = tempfile::tempdir()?;
//! let pipeline = Pipeline::builder()
//!     .with_config(PipelineConfig {
//!         artifact_path: dir.path().join("model.json"),
//!         ..PipelineConfig::default()
//!     })
//!     .with_translation_service(Arc::new(NoopTranslator))
//!     .build()?;
//!
//! let result = pipeline.classify("yellow leaves with pale veins").await?;
//! assert_eq!(result.issue, "Iron Deficiency");
//! # Ok(())
//! # }
//! ```
//!
//! # Degradation
//!
//! Only an empty query is rejected. A failed translation, a missing learned
//! artifact, an unloaded zero-shot model or an unreachable catalog store
//! each weakens the answer instead of failing it; see [`PipelineReport`].

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod language;
pub mod model_manager;
pub mod models;
pub mod pipeline;
mod runtime;
pub mod text;
pub mod translation;

pub use catalog::{
    Catalog, CatalogError, CatalogEvent, CatalogObserver, CatalogSource, InMemoryCatalogSource,
    JsonFileCatalogSource, ProblemCatalog, ProblemDetails, ProblemEntry, ProblemRecord, RawField,
};
pub use classifier::{
    ClassifierError, DecisionSource, EnsembleResolver, LearnedClassifier, OnnxZeroShotModel, OverrideRule,
    Resolution, RuleMatcher, StageOutcome, ZeroShotClassifier, ZeroShotModel, ZeroShotModelBuilder, NOT_DETECTED,
};
pub use config::{ConfigError, PipelineConfig};
pub use language::Language;
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinNliModel, ModelCharacteristics, ModelInfo};
pub use pipeline::{ClassificationRequest, ClassificationResult, Pipeline, PipelineBuilder, PipelineReport};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use translation::{
    GoogleTranslateService, NoopTranslator, TranslationConfig, TranslationError, TranslationProvider,
    TranslationService, Translator,
};

pub fn init_logger() {
    env_logger::init();
}
