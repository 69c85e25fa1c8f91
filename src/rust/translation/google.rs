use std::time::Duration;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::{TranslationError, TranslationService};
use crate::language::Language;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Client for Google's public `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslateService {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateService {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl TranslationService for GoogleTranslateService {
    async fn translate(
        &self,
        text: &str,
        source: Option<Language>,
        target: Language,
    ) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let source_code = source.map(|l| l.code()).unwrap_or("auto");
        debug!("Requesting translation {} -> {}", source_code, target);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source_code),
                ("tl", target.code()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::Status(status.as_u16()));
        }
        let body: Value = response.json().await?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "google"
    }
}

/// The body looks like `[[["translated", "original", ...], ...], ...]`;
/// the first element holds one entry per translated sentence.
fn parse_response(body: &Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::MalformedResponse("missing sentence list".into()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.is_empty() {
        return Err(TranslationError::MalformedResponse("no translated text".into()));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_joins_segments() {
        let body = json!([[["Yellow leaves. ", "पीली पत्तियां। ", null], ["Pale veins.", "नसें पीली।", null]], null, "hi"]);
        assert_eq!(parse_response(&body).unwrap(), "Yellow leaves. Pale veins.");
    }

    #[test]
    fn test_parse_rejects_unexpected_shape() {
        assert!(matches!(parse_response(&json!({"error": "x"})), Err(TranslationError::MalformedResponse(_))));
        assert!(matches!(parse_response(&json!([[]])), Err(TranslationError::MalformedResponse(_))));
    }
}
