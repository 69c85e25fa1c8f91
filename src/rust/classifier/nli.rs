use tokenizers::Tokenizer;
use ort::session::Session;
use ndarray::Array2;
use ort::value::Tensor;
use std::collections::HashMap;

use super::error::ClassifierError;

/// Natural-language-inference scoring with an ONNX sequence-pair classifier.
///
/// The ONNX model is expected to:
/// - Accept `input_ids` and `attention_mask` (both shape [1, sequence_length])
/// - Output logits of shape [1, num_nli_classes]
/// - Place the entailment logit at [`entailment_index`](Self::entailment_index)
///   (2 for the XNLI models: contradiction, neutral, entailment)
pub(crate) trait EntailmentScoring {
    /// Returns the initialized tokenizer if available
    fn tokenizer(&self) -> Option<&Tokenizer>;

    /// Returns the initialized ONNX session if available
    fn session(&self) -> Option<&Session>;

    fn entailment_index(&self) -> usize;

    /// Tokenizes a premise/hypothesis pair with the model's special tokens.
    ///
    /// # Errors
    /// - `TokenizerError` if the tokenizer is not initialized
    /// - `TokenizerError` if the pair cannot be encoded
    fn encode_pair(&self, premise: &str, hypothesis: &str) -> Result<(Vec<i64>, Vec<i64>), ClassifierError> {
        let tokenizer = self.tokenizer()
            .ok_or_else(|| ClassifierError::TokenizerError("Tokenizer not initialized".into()))?;

        let encoding = tokenizer.encode((premise, hypothesis), true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;

        let ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        Ok((ids, mask))
    }

    /// Runs the model on one pair and returns the raw entailment logit.
    ///
    /// # Errors
    /// - `ModelError` if the session is not initialized
    /// - `ModelError` if tensor creation or model execution fails
    /// - `PredictionError` if the output has no entailment logit
    fn entailment_logit(&self, premise: &str, hypothesis: &str) -> Result<f32, ClassifierError> {
        let session = self.session()
            .ok_or_else(|| ClassifierError::ModelError("Session not initialized".into()))?;
        let (ids, mask) = self.encode_pair(premise, hypothesis)?;
        let seq_len = ids.len();

        let input_array = Array2::from_shape_vec((1, seq_len), ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input array: {}", e)))?;
        let input_dyn = input_array.into_dyn();
        let input_ids = input_dyn.as_standard_layout();

        let mask_array = Array2::from_shape_vec((1, seq_len), mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask array: {}", e)))?;
        let mask_dyn = mask_array.into_dyn();
        let attention_mask = mask_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", Tensor::from_array(&input_ids)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?);
        input_tensors.insert("attention_mask", Tensor::from_array(&attention_mask)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create mask tensor: {}", e)))?);

        let outputs = session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let logits = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract logits: {}", e)))?;

        logits.iter()
            .nth(self.entailment_index())
            .copied()
            .ok_or_else(|| ClassifierError::PredictionError(format!(
                "Model output has {} logits, entailment index is {}",
                logits.len(),
                self.entailment_index()
            )))
    }
}
