use async_trait::async_trait;

use super::{TranslationError, TranslationService};
use crate::language::Language;

/// Returns every input unchanged. Used when translation is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTranslator;

#[async_trait]
impl TranslationService for NoopTranslator {
    async fn translate(
        &self,
        text: &str,
        _source: Option<Language>,
        _target: Language,
    ) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
