use std::collections::BTreeMap;
use log::debug;
use serde::{Deserialize, Serialize};

use super::utils::round_confidence;
use crate::text::collapse_whitespace;

/// Issue reported when no stage produces a usable label.
pub const NOT_DETECTED: &str = "Problem not detected";

/// Keywords per language code. A table matches when any keyword of any
/// language occurs in the text, since translated input may still carry
/// words in the original script.
pub type KeywordTable = BTreeMap<String, Vec<String>>;

/// Forces `issue` when every keyword table in `all_of` matches the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    pub issue: String,
    pub min_confidence: f32,
    pub all_of: Vec<KeywordTable>,
}

impl OverrideRule {
    /// Yellowing together with vein symptoms is diagnostic for iron deficiency.
    pub fn iron_deficiency() -> Self {
        Self {
            issue: "Iron Deficiency".into(),
            min_confidence: 0.96,
            all_of: vec![
                table(&[
                    ("en", &["vein", "veins", "nas"]),
                    ("hi", &["नसें", "नस"]),
                    ("mr", &["शिरा", "शिरांचे", "शिरा पांढऱ्या", "पिवळी"]),
                ]),
                table(&[
                    ("en", &["yellow"]),
                    ("hi", &["पीली"]),
                    ("mr", &["पिवळी"]),
                ]),
            ],
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        !self.all_of.is_empty()
            && self.all_of.iter().all(|keywords| {
                keywords
                    .values()
                    .flatten()
                    .any(|kw| !kw.is_empty() && text.contains(kw.as_str()))
            })
    }
}

fn table(rows: &[(&str, &[&str])]) -> KeywordTable {
    rows.iter()
        .map(|(lang, words)| (lang.to_string(), words.iter().map(|w| w.to_string()).collect()))
        .collect()
}

/// Which stage decided the final issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Rule,
    Learned,
    ZeroShot,
    NotDetected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub issue: String,
    /// Rounded to three decimals
    pub confidence: f32,
    pub decided_by: DecisionSource,
    /// Set when an override rule replaced the cascade's answer
    pub overridden: bool,
}

/// Merges the three stage predictions.
///
/// Priority: rule match, then learned label, then zero-shot above the
/// threshold, else [`NOT_DETECTED`]. Override rules run afterwards on the
/// normalised text and may replace the issue and raise the confidence.
#[derive(Debug, Clone)]
pub struct EnsembleResolver {
    zero_shot_threshold: f32,
    overrides: Vec<OverrideRule>,
}

impl Default for EnsembleResolver {
    fn default() -> Self {
        Self::new(0.45, vec![OverrideRule::iron_deficiency()])
    }
}

impl EnsembleResolver {
    pub fn new(zero_shot_threshold: f32, overrides: Vec<OverrideRule>) -> Self {
        Self {
            zero_shot_threshold,
            overrides,
        }
    }

    pub fn resolve(
        &self,
        rule: Option<(String, f32)>,
        learned: Option<String>,
        zero_shot: Option<(String, f32)>,
        normalized_text: &str,
    ) -> Resolution {
        let zero_shot_confidence = zero_shot.as_ref().map_or(0.0, |(_, c)| *c);
        let rule_confidence = rule.as_ref().map_or(0.0, |(_, c)| *c);
        // The learned model has no score; it inherits whatever the other
        // stages produced.
        let interim_confidence = zero_shot_confidence.max(rule_confidence);

        let (mut issue, mut confidence, decided_by) = match (rule, learned, zero_shot) {
            (Some((label, _)), _, _) => (label, interim_confidence, DecisionSource::Rule),
            (None, Some(label), _) => (label, interim_confidence, DecisionSource::Learned),
            (None, None, Some((label, score))) if score > self.zero_shot_threshold => {
                (label, score, DecisionSource::ZeroShot)
            }
            _ => (NOT_DETECTED.to_string(), 0.0, DecisionSource::NotDetected),
        };

        let text = collapse_whitespace(normalized_text);
        let mut overridden = false;
        for rule in &self.overrides {
            if rule.matches(&text) {
                debug!("Override '{}' matched, replacing '{}'", rule.issue, issue);
                issue = rule.issue.clone();
                confidence = confidence.max(rule.min_confidence);
                overridden = true;
            }
        }

        Resolution {
            issue,
            confidence: round_confidence(confidence.clamp(0.0, 1.0)),
            decided_by,
            overridden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(label: &str) -> Option<(String, f32)> {
        Some((label.to_string(), 0.98))
    }

    #[test]
    fn test_rule_beats_everything() {
        let resolution = EnsembleResolver::default().resolve(
            rule("Root Rot"),
            Some("Pest Attack".into()),
            Some(("Fungal Infection".into(), 0.99)),
            "plants are wilting",
        );
        assert_eq!(resolution.issue, "Root Rot");
        assert_eq!(resolution.decided_by, DecisionSource::Rule);
        assert_eq!(resolution.confidence, 0.99);
    }

    #[test]
    fn test_learned_beats_zero_shot_and_carries_its_score() {
        let resolution = EnsembleResolver::default().resolve(
            None,
            Some("Pest Attack".into()),
            Some(("Root Rot".into(), 0.3)),
            "small holes",
        );
        assert_eq!(resolution.issue, "Pest Attack");
        assert_eq!(resolution.decided_by, DecisionSource::Learned);
        assert_eq!(resolution.confidence, 0.3);
    }

    #[test]
    fn test_learned_alone_has_zero_confidence() {
        let resolution = EnsembleResolver::default().resolve(None, Some("Pest Attack".into()), None, "holes");
        assert_eq!(resolution.confidence, 0.0);
    }

    #[test]
    fn test_zero_shot_threshold_is_strict() {
        let resolver = EnsembleResolver::default();
        let above = resolver.resolve(None, None, Some(("Root Rot".into(), 0.4567)), "droopy");
        assert_eq!(above.issue, "Root Rot");
        assert_eq!(above.confidence, 0.457);

        let at = resolver.resolve(None, None, Some(("Root Rot".into(), 0.45)), "droopy");
        assert_eq!(at.issue, NOT_DETECTED);
        assert_eq!(at.confidence, 0.0);
    }

    #[test]
    fn test_nothing_detected() {
        let resolution = EnsembleResolver::default().resolve(None, None, None, "");
        assert_eq!(resolution.issue, NOT_DETECTED);
        assert_eq!(resolution.confidence, 0.0);
        assert_eq!(resolution.decided_by, DecisionSource::NotDetected);
        assert!(!resolution.overridden);
    }

    #[test]
    fn test_vein_and_yellow_override_rule_match() {
        let resolution = EnsembleResolver::default().resolve(
            rule("Nitrogen Deficiency"),
            None,
            None,
            "yellow  leaves with pale veins",
        );
        assert_eq!(resolution.issue, "Iron Deficiency");
        assert_eq!(resolution.confidence, 0.98);
        assert!(resolution.overridden);
        assert_eq!(resolution.decided_by, DecisionSource::Rule);
    }

    #[test]
    fn test_override_raises_low_confidence() {
        let resolution = EnsembleResolver::default().resolve(None, Some("Root Rot".into()), None, "yellow veins");
        assert_eq!(resolution.issue, "Iron Deficiency");
        assert_eq!(resolution.confidence, 0.96);
    }

    #[test]
    fn test_override_needs_both_keywords() {
        let resolver = EnsembleResolver::default();
        assert_eq!(resolver.resolve(None, None, None, "yellow leaves").issue, NOT_DETECTED);
        assert_eq!(resolver.resolve(None, None, None, "white veins").issue, NOT_DETECTED);
    }

    #[test]
    fn test_override_matches_devanagari_keywords() {
        let resolver = EnsembleResolver::default();
        assert_eq!(resolver.resolve(None, None, None, "पत्तियों की नसें पीली").issue, "Iron Deficiency");
        // "पिवळी" is listed under both tables
        assert_eq!(resolver.resolve(None, None, None, "पाने पिवळी").issue, "Iron Deficiency");
    }

    #[test]
    fn test_overrides_are_configurable() {
        let rule = OverrideRule {
            issue: "Blight".into(),
            min_confidence: 0.9,
            all_of: vec![table(&[("en", &["brown"])]), table(&[("en", &["spots"])])],
        };
        let resolver = EnsembleResolver::new(0.45, vec![rule]);
        assert_eq!(resolver.resolve(None, None, None, "brown spots").issue, "Blight");
        assert_eq!(resolver.resolve(None, None, None, "yellow veins").issue, NOT_DETECTED);
    }
}
