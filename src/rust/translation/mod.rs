//! Translation between the farmer's language and English.
//!
//! The pipeline classifies English text, so non-English input is
//! translated on the way in and the issue/remedies on the way out. A failed
//! or slow translation never fails a request: the untranslated text is used
//! instead.

mod google;
mod noop;

pub use google::GoogleTranslateService;
pub use noop::NoopTranslator;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::language::Language;
use crate::pipeline::ClassificationResult;

/// Remedy values that are stored as placeholders and never translated.
const PLACEHOLDERS: [&str; 3] = ["---", "None", "N/A"];

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Translation service returned HTTP {0}")]
    Status(u16),
    #[error("Malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("Translation timed out after {0:?}")]
    Timeout(Duration),
}

/// A remote or local translation backend.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translates `text` into `target`. A `None` source asks the backend
    /// to detect the source language itself.
    async fn translate(
        &self,
        text: &str,
        source: Option<Language>,
        target: Language,
    ) -> Result<String, TranslationError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    #[default]
    Google,
    /// Pass-through
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub provider: TranslationProvider,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::Google,
            endpoint: google::DEFAULT_ENDPOINT.to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl TranslationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Creates the backend selected by `config`.
pub fn create_service(config: &TranslationConfig) -> Arc<dyn TranslationService> {
    match config.provider {
        TranslationProvider::Google => Arc::new(GoogleTranslateService::new(&config.endpoint, config.timeout())),
        TranslationProvider::Disabled => Arc::new(NoopTranslator),
    }
}

/// Bidirectional translator with bounded calls and fall-back-to-original.
#[derive(Clone)]
pub struct Translator {
    service: Arc<dyn TranslationService>,
    timeout: Duration,
}

impl Translator {
    pub fn new(service: Arc<dyn TranslationService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Translates `text` to English if it is not English already, returning
    /// the (possibly unchanged) text and the detected language.
    pub async fn to_english(&self, text: &str) -> (String, Language) {
        let language = Language::detect(text);
        let (translated, _) = self.to_english_from(text, language).await;
        (translated, language)
    }

    /// Like [`to_english`](Self::to_english) with the language already known.
    /// The error is returned alongside the fallback text for reporting.
    pub async fn to_english_from(
        &self,
        text: &str,
        language: Language,
    ) -> (String, Option<TranslationError>) {
        if language.is_english() {
            return (text.to_string(), None);
        }
        match self.call(text, None, Language::English).await {
            Ok(translated) => {
                debug!("Translated ({} -> en): {}", language, translated);
                (translated, None)
            }
            Err(e) => {
                warn!("Translation to English failed via {}, using original text: {}", self.service.name(), e);
                (text.to_string(), Some(e))
            }
        }
    }

    /// Translates English `text` into `target`, falling back to `text`.
    pub async fn from_english(&self, text: &str, target: Language) -> String {
        if target.is_english() {
            return text.to_string();
        }
        match self.call(text, Some(Language::English), target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation to {} failed via {}, keeping English: {}", target, self.service.name(), e);
                text.to_string()
            }
        }
    }

    /// Translates the issue and every remedy of `result` into `target`.
    /// Each item is translated on its own; placeholders and blank values
    /// pass through, and a failed item keeps its English text.
    pub async fn translate_result(&self, result: &mut ClassificationResult, target: Language) {
        if target.is_english() {
            return;
        }
        if !result.issue.trim().is_empty() {
            result.issue = self.from_english(&result.issue, target).await;
        }

        let mut remedies = Vec::with_capacity(result.details.remedies.len());
        for remedy in &result.details.remedies {
            if is_placeholder(remedy) {
                remedies.push(remedy.clone());
            } else {
                remedies.push(self.from_english(remedy.trim(), target).await);
            }
        }
        result.details.remedies = remedies;
    }

    async fn call(
        &self,
        text: &str,
        source: Option<Language>,
        target: Language,
    ) -> Result<String, TranslationError> {
        match tokio::time::timeout(self.timeout, self.service.translate(text, source, target)).await {
            Ok(result) => result,
            Err(_) => Err(TranslationError::Timeout(self.timeout)),
        }
    }
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed)
}
