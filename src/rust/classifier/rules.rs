use crate::catalog::Catalog;

/// Keyword matcher over catalog causes.
///
/// Walks entries in catalog order and each entry's causes in order; the
/// first cause found as a substring of the text decides the label.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    confidence: f32,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new(0.98)
    }
}

impl RuleMatcher {
    pub fn new(confidence: f32) -> Self {
        Self { confidence }
    }

    /// Matches `text` (already normalised, so lowercase) against `catalog`.
    pub fn find_match(&self, text: &str, catalog: &Catalog) -> Option<(String, f32)> {
        catalog.iter().find_map(|entry| {
            entry
                .details
                .causes
                .iter()
                .map(|cause| cause.trim().to_lowercase())
                .any(|keyword| !keyword.is_empty() && text.contains(&keyword))
                .then(|| (entry.name.clone(), self.confidence))
        })
    }
}
