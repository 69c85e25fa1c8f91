use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;

use cropsage::{
    CatalogError, CatalogSource, ClassificationRequest, ClassifierError, DecisionSource, InMemoryCatalogSource,
    Language, NoopTranslator, Pipeline, PipelineConfig, ProblemRecord, RawField, StageOutcome, TranslationError,
    TranslationService, ZeroShotModel, NOT_DETECTED,
};

/// Translates a few known phrases; anything else comes back unchanged.
struct PhrasebookService;

#[async_trait]
impl TranslationService for PhrasebookService {
    async fn translate(&self, text: &str, _source: Option<Language>, target: Language) -> Result<String, TranslationError> {
        let translated = match (text, target) {
            ("पौधे मुरझा रहे हैं", Language::English) => "plants are wilting",
            ("Root Rot", Language::Hindi) => "जड़ सड़न",
            ("Avoid overwatering", Language::Hindi) => "अधिक पानी देने से बचें",
            _ => text,
        };
        Ok(translated.to_string())
    }

    fn name(&self) -> &str {
        "phrasebook"
    }
}

struct FailingService;

#[async_trait]
impl TranslationService for FailingService {
    async fn translate(&self, _: &str, _: Option<Language>, _: Language) -> Result<String, TranslationError> {
        Err(TranslationError::Status(503))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Always picks `label` with `score`.
struct FixedModel {
    label: &'static str,
    score: f32,
}

impl ZeroShotModel for FixedModel {
    fn classify(&self, _text: &str, labels: &[String], _template: &str) -> Result<Vec<(String, f32)>, ClassifierError> {
        assert!(labels.iter().any(|l| l == self.label), "label must come from the catalog");
        Ok(vec![(self.label.to_string(), self.score)])
    }
}

struct CountingSource {
    fetches: AtomicUsize,
}

#[async_trait]
impl CatalogSource for CountingSource {
    async fn fetch_all(&self) -> Result<Vec<ProblemRecord>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Vec::new())
    }
}

fn config(dir: &tempfile::TempDir) -> PipelineConfig {
    PipelineConfig {
        artifact_path: dir.path().join("crop_model.json"),
        models_dir: dir.path().join("models"),
        ..PipelineConfig::default()
    }
}

fn pipeline_with(dir: &tempfile::TempDir, service: Arc<dyn TranslationService>) -> Pipeline {
    Pipeline::builder()
        .with_config(config(dir))
        .with_translation_service(service)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_yellow_leaves_with_pale_veins() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(&dir, Arc::new(NoopTranslator));

    let result = pipeline.classify("yellow leaves with pale veins").await?;
    assert_eq!(result.issue, "Iron Deficiency");
    assert!(result.confidence >= 0.96);
    assert_eq!(result.language, Language::English);
    assert_eq!(
        result.details.remedies,
        vec!["Apply FeSO4", "Use foliar iron spray", "Use iron chelates"]
    );
    Ok(())
}

#[tokio::test]
async fn test_devanagari_without_any_match() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(&dir, Arc::new(PhrasebookService));

    let (result, report) = pipeline
        .classify_request(&ClassificationRequest::new("फल में छेद हैं"))
        .await?;
    assert_eq!(result.issue, NOT_DETECTED);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.language, Language::Hindi);
    assert!(result.details.causes.is_empty());
    assert!(matches!(report.zero_shot, StageOutcome::Unavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_hindi_round_trip() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(&dir, Arc::new(PhrasebookService));

    let result = pipeline.classify("पौधे मुरझा रहे हैं").await?;
    assert_eq!(result.input, "पौधे मुरझा रहे हैं");
    assert_eq!(result.translated, "plants are wilting");
    assert_eq!(result.language, Language::Hindi);
    assert_eq!(result.issue, "जड़ सड़न");
    assert_eq!(result.confidence, 0.98);
    assert_eq!(result.details.remedies, vec!["अधिक पानी देने से बचें", "Improve soil drainage"]);
    // causes stay in English
    assert_eq!(result.details.causes[0], "wilting");
    Ok(())
}

#[tokio::test]
async fn test_translation_outage_degrades() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(&dir, Arc::new(FailingService));

    let (result, report) = pipeline
        .classify_request(&ClassificationRequest::new("पत्तियों की नसें पीली"))
        .await?;
    assert!(matches!(report.translation, StageOutcome::Failed(_)));
    // the override also matches untranslated Devanagari keywords
    assert_eq!(result.issue, "Iron Deficiency");
    assert_eq!(result.confidence, 0.96);
    Ok(())
}

#[tokio::test]
async fn test_zero_shot_above_threshold() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .with_config(config(&dir))
        .with_translation_service(Arc::new(NoopTranslator))
        .with_zero_shot_model(Arc::new(FixedModel { label: "Root Rot", score: 0.71234 }))
        .build()?;

    let (result, report) = pipeline
        .classify_request(&ClassificationRequest::new("the stems went soft and brown"))
        .await?;
    assert_eq!(result.issue, "Root Rot");
    assert_eq!(result.confidence, 0.712);
    assert_eq!(report.resolution.decided_by, DecisionSource::ZeroShot);
    Ok(())
}

#[tokio::test]
async fn test_zero_shot_below_threshold() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .with_config(config(&dir))
        .with_translation_service(Arc::new(NoopTranslator))
        .with_zero_shot_model(Arc::new(FixedModel { label: "Root Rot", score: 0.4 }))
        .build()?;

    let result = pipeline.classify("the stems went soft and brown").await?;
    assert_eq!(result.issue, NOT_DETECTED);
    assert_eq!(result.confidence, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_rule_beats_zero_shot() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .with_config(config(&dir))
        .with_translation_service(Arc::new(NoopTranslator))
        .with_zero_shot_model(Arc::new(FixedModel { label: "Nitrogen Deficiency", score: 0.99 }))
        .build()?;

    let result = pipeline.classify("the field has waterlogging").await?;
    assert_eq!(result.issue, "Root Rot");
    assert_eq!(result.confidence, 0.99);
    Ok(())
}

#[tokio::test]
async fn test_learned_branch_carries_zero_shot_confidence() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .with_config(config(&dir))
        .with_translation_service(Arc::new(NoopTranslator))
        .with_zero_shot_model(Arc::new(FixedModel { label: "Root Rot", score: 0.3 }))
        .build()?;
    pipeline.learned().train(
        &["white spots on leaves", "insects eating leaves"],
        &["Fungal Infection", "Pest Attack"],
    )?;

    let result = pipeline.classify("white spots everywhere").await?;
    assert_eq!(result.issue, "Fungal Infection");
    assert_eq!(result.confidence, 0.3);
    Ok(())
}

#[tokio::test]
async fn test_custom_catalog_order_decides() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryCatalogSource::new(vec![
        ProblemRecord::new("Leaf Spot", RawField::Text("['spots', 'lesions']".into()), RawField::Text("Copper spray".into())),
        ProblemRecord::new("Mildew", RawField::List(vec![json!("white spots")]), RawField::List(vec![json!("Sulphur dust")])),
    ]));
    let pipeline = Pipeline::builder()
        .with_config(config(&dir))
        .with_catalog_source(source)
        .with_translation_service(Arc::new(NoopTranslator))
        .build()?;

    let result = pipeline.classify("white spots on leaves").await?;
    assert_eq!(result.issue, "Leaf Spot");
    assert_eq!(result.details.causes, vec!["spots", "lesions"]);
    assert_eq!(result.details.remedies, vec!["Copper spray"]);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_share_one_catalog_load() -> Result<(), ClassifierError> {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingSource { fetches: AtomicUsize::new(0) });
    let pipeline = Arc::new(
        Pipeline::builder()
            .with_config(config(&dir))
            .with_catalog_source(source.clone())
            .with_translation_service(Arc::new(NoopTranslator))
            .build()?,
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.classify("plants are wilting").await })
        })
        .collect();
    for handle in handles {
        let result = handle.await.expect("task panicked")?;
        assert_eq!(result.issue, "Root Rot");
    }

    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_result_serializes_with_language_code() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let pipeline = pipeline_with(&dir, Arc::new(NoopTranslator));
    let result = pipeline.classify("plants are wilting").await?;

    let value = serde_json::to_value(&result)?;
    assert_eq!(value["language"], "en");
    assert_eq!(value["issue"], "Root Rot");
    assert!(value["details"]["causes"].is_array());
    Ok(())
}
