use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use ort::session::Session;
use log::{info, error};

use super::error::ClassifierError;
use super::nli::EntailmentScoring;
use super::zero_shot::OnnxZeroShotModel;
use crate::{BuiltinNliModel, ModelManager, runtime::{RuntimeConfig, create_session_builder}};

/// Builds an [`OnnxZeroShotModel`] from a built-in or custom NLI model.
#[derive(Default, Debug)]
pub struct ZeroShotModelBuilder {
    model_path: Option<String>,
    tokenizer_path: Option<String>,
    tokenizer: Option<Tokenizer>,
    session: Option<Session>,
    entailment_index: usize,
    max_sequence_length: usize,
    runtime_config: RuntimeConfig,
}

impl EntailmentScoring for ZeroShotModelBuilder {
    fn tokenizer(&self) -> Option<&Tokenizer> {
        self.tokenizer.as_ref()
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn entailment_index(&self) -> usize {
        self.entailment_index
    }
}

impl ZeroShotModelBuilder {
    pub fn new() -> Self {
        let characteristics = BuiltinNliModel::XlmRobertaLargeXnli.characteristics();
        Self {
            model_path: None,
            tokenizer_path: None,
            tokenizer: None,
            session: None,
            entailment_index: characteristics.entailment_index,
            max_sequence_length: characteristics.max_sequence_length,
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Sets the runtime configuration for ONNX model execution.
    /// Must be called before the model is loaded.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Position of the entailment logit in the model output.
    pub fn with_entailment_index(mut self, index: usize) -> Self {
        self.entailment_index = index;
        self
    }

    /// Loads a built-in model from the default models directory.
    ///
    /// # Errors
    /// - `BuildError` if a model is already set
    /// - `BuildError` if the model is not downloaded
    /// - `BuildError`/`ModelError` if the model or tokenizer fails to load
    pub fn with_model(self, model: BuiltinNliModel) -> Result<Self, ClassifierError> {
        let manager = ModelManager::new_default()
            .map_err(|e| ClassifierError::BuildError(format!("Failed to create model manager: {}", e)))?;
        self.with_managed_model(&manager, model)
    }

    /// Loads a built-in model through an explicit [`ModelManager`].
    pub fn with_managed_model(mut self, manager: &ModelManager, model: BuiltinNliModel) -> Result<Self, ClassifierError> {
        if !manager.is_model_downloaded(model) {
            return Err(ClassifierError::BuildError(format!(
                "Model '{:?}' is not downloaded. Please download it first using ModelManager::download_model()",
                model
            )));
        }
        let characteristics = model.characteristics();
        self.entailment_index = characteristics.entailment_index;

        let model_path = manager.get_model_path(model);
        let tokenizer_path = manager.get_tokenizer_path(model);
        self.load(
            &model_path.to_string_lossy(),
            &tokenizer_path.to_string_lossy(),
            characteristics.max_sequence_length,
        )
    }

    /// Loads a custom ONNX NLI model and tokenizer.
    ///
    /// `max_sequence_length` defaults to 512 tokens; longer pairs are
    /// truncated longest-first.
    pub fn with_custom_model(
        self,
        model_path: &str,
        tokenizer_path: &str,
        max_sequence_length: Option<usize>,
    ) -> Result<Self, ClassifierError> {
        if model_path.is_empty() || tokenizer_path.is_empty() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths cannot be empty".to_string()));
        }
        if !std::path::Path::new(model_path).exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {}", model_path)));
        }
        if !std::path::Path::new(tokenizer_path).exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {}", tokenizer_path)));
        }
        self.load(model_path, tokenizer_path, max_sequence_length.unwrap_or(512))
    }

    fn load(mut self, model_path: &str, tokenizer_path: &str, max_sequence_length: usize) -> Result<Self, ClassifierError> {
        if self.model_path.is_some() || self.tokenizer_path.is_some() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths already set".to_string()));
        }

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| {
                error!("Failed to load tokenizer: {}", e);
                ClassifierError::BuildError(format!("Failed to load tokenizer: {}", e))
            })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_sequence_length,
                ..Default::default()
            }))
            .map_err(|e| ClassifierError::TokenizerError(format!("Failed to configure truncation: {}", e)))?;
        info!("Tokenizer loaded successfully");

        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(model_path)?;
        Self::validate_model(&session)?;
        info!("NLI model structure validated successfully");

        self.max_sequence_length = max_sequence_length;
        self.model_path = Some(model_path.to_string());
        self.tokenizer_path = Some(tokenizer_path.to_string());
        self.tokenizer = Some(tokenizer);
        self.session = Some(session);
        Ok(self)
    }

    /// Builds the model after a smoke-test inference.
    pub fn build(mut self) -> Result<OnnxZeroShotModel, ClassifierError> {
        let (Some(model_path), Some(tokenizer_path)) = (self.model_path.take(), self.tokenizer_path.take()) else {
            return Err(ClassifierError::BuildError("Model and tokenizer paths must be set".to_string()));
        };

        self.entailment_logit("The leaves are yellow.", "This text is about plants.")
            .map_err(|e| ClassifierError::BuildError(format!("Model smoke test failed: {}", e)))?;

        let tokenizer = Arc::new(self.tokenizer.take()
            .ok_or_else(|| ClassifierError::BuildError("No tokenizer loaded".into()))?);
        let session = Arc::new(self.session.take()
            .ok_or_else(|| ClassifierError::BuildError("No ONNX model loaded".into()))?);

        info!("Zero-shot model ready (max {} tokens per pair)", self.max_sequence_length);
        Ok(OnnxZeroShotModel {
            model_path,
            tokenizer_path,
            tokenizer,
            session,
            entailment_index: self.entailment_index,
        })
    }

    /// Validates that the model has the expected input/output structure
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let inputs = &session.inputs;
        if inputs.len() < 2 {
            return Err(ClassifierError::ModelError(
                format!("Model must have at least 2 inputs (input_ids and attention_mask), found {}", inputs.len())
            ));
        }

        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for NLI logits".to_string()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_model_fails() {
        let result = ZeroShotModelBuilder::new().build();
        assert!(matches!(result, Err(ClassifierError::BuildError(_))));
    }

    #[test]
    fn test_custom_model_paths_validated() {
        assert!(ZeroShotModelBuilder::new().with_custom_model("", "", None).is_err());
        let result = ZeroShotModelBuilder::new()
            .with_custom_model("/nonexistent/model.onnx", "/nonexistent/tokenizer.json", None);
        assert!(matches!(result, Err(ClassifierError::BuildError(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_missing_builtin_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        let result = ZeroShotModelBuilder::new()
            .with_managed_model(&manager, BuiltinNliModel::XlmRobertaLargeXnli);
        assert!(matches!(result, Err(ClassifierError::BuildError(msg)) if msg.contains("not downloaded")));
    }

    #[test]
    fn test_defaults_follow_builtin_model() {
        let builder = ZeroShotModelBuilder::new();
        assert_eq!(builder.entailment_index, 2);
        assert_eq!(builder.with_entailment_index(0).entailment_index, 0);
    }

    #[test]
    fn test_runtime_config_from_pipeline_settings() {
        let config = crate::PipelineConfig {
            onnx_inter_threads: 1,
            onnx_intra_threads: 3,
            ..crate::PipelineConfig::default()
        };
        let builder = ZeroShotModelBuilder::new().with_runtime_config(config.runtime_config());
        assert_eq!(builder.runtime_config.inter_threads, 1);
        assert_eq!(builder.runtime_config.intra_threads, 3);
    }
}
