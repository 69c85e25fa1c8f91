use std::env;

/// Default location of the built-in model files. Override with
/// `CROPSAGE_MODEL_BASE_URL` to use a mirror.
const DEFAULT_BASE_URL: &str = "https://huggingface.co/joeddav/xlm-roberta-large-xnli/resolve/main";

/// Built-in natural-language-inference models usable for zero-shot scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinNliModel {
    /// Multilingual XNLI model based on XLM-RoBERTa large
    ///
    /// Characteristics:
    /// - Labels: contradiction, neutral, entailment
    /// - Max sequence length: 512
    /// - Size: ~2.2GB
    /// - Covers English, Hindi and Marathi input
    XlmRobertaLargeXnli,
}

/// Characteristics of a model including its capabilities and requirements
#[derive(Debug, Clone)]
pub struct ModelCharacteristics {
    /// Maximum premise + hypothesis length in tokens
    pub max_sequence_length: usize,
    /// Position of the entailment logit in the model output
    pub entailment_index: usize,
}

/// Download locations and optional SHA-256 digests of a model's files.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub model_url: String,
    pub tokenizer_url: String,
    /// Unset hashes skip verification
    pub model_hash: Option<String>,
    pub tokenizer_hash: Option<String>,
}

impl BuiltinNliModel {
    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            Self::XlmRobertaLargeXnli => ModelCharacteristics {
                max_sequence_length: 512,
                entailment_index: 2,
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfo {
        self.get_model_info_with(|name| env::var(name).ok())
    }

    /// Like [`get_model_info`](Self::get_model_info), reading the
    /// `CROPSAGE_MODEL_*` overrides through `lookup`.
    pub fn get_model_info_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ModelInfo {
        let base = lookup("CROPSAGE_MODEL_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        match self {
            Self::XlmRobertaLargeXnli => ModelInfo {
                name: "xlm-roberta-large-xnli".to_string(),
                model_url: format!("{}/onnx/model.onnx", base),
                tokenizer_url: format!("{}/tokenizer.json", base),
                model_hash: lookup("CROPSAGE_MODEL_SHA256"),
                tokenizer_hash: lookup("CROPSAGE_TOKENIZER_SHA256"),
            },
        }
    }
}
