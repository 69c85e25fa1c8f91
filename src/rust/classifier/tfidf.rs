use std::collections::{BTreeMap, BTreeSet};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::utils::normalize_vector;

/// Term-frequency / inverse-document-frequency vectorizer.
///
/// Tokens are lowercase runs of at least two word characters. The
/// vocabulary is ordered alphabetically and IDF is smoothed as
/// `ln((1 + n) / (1 + df)) + 1`. Rows are L2-normalised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Learns the vocabulary and IDF weights, returning the fitted
    /// vectorizer and the document-term matrix for `texts`.
    pub fn fit_transform<S: AsRef<str>>(texts: &[S]) -> Result<(Self, Array2<f32>), ClassifierError> {
        let documents: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t.as_ref())).collect();

        let terms: BTreeSet<&str> = documents
            .iter()
            .flat_map(|doc| doc.iter().map(String::as_str))
            .collect();
        if terms.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Empty vocabulary: training texts contain no usable words".into(),
            ));
        }

        let vocabulary: BTreeMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(i, term)| (term.to_string(), i))
            .collect();

        let mut document_frequency = vec![0usize; vocabulary.len()];
        for doc in &documents {
            let unique: BTreeSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                if let Some(&idx) = vocabulary.get(term) {
                    document_frequency[idx] += 1;
                }
            }
        }

        let n = documents.len() as f32;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let vectorizer = Self { vocabulary, idf };
        let mut matrix = Array2::zeros((documents.len(), vectorizer.num_features()));
        for (row, doc) in documents.iter().enumerate() {
            matrix.row_mut(row).assign(&vectorizer.weigh(doc));
        }
        Ok((vectorizer, matrix))
    }

    pub fn transform(&self, text: &str) -> Array1<f32> {
        self.weigh(&tokenize(text))
    }

    pub fn num_features(&self) -> usize {
        self.vocabulary.len()
    }

    fn weigh(&self, tokens: &[String]) -> Array1<f32> {
        let mut counts = Array1::<f32>::zeros(self.num_features());
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                counts[idx] += 1.0;
            }
        }
        let weighted = counts * &Array1::from(self.idf.clone());
        normalize_vector(&weighted)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || ('\u{0900}'..='\u{097F}').contains(&c)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !is_word_char(c))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}
