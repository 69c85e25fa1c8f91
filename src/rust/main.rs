use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use serde::Deserialize;

use cropsage::{
    BuiltinNliModel, ClassificationRequest, JsonFileCatalogSource, ModelManager, Pipeline, PipelineConfig,
};

/// Phrases the learned model is seeded with when no training file is given.
const SEED_SAMPLES: [(&str, &str); 4] = [
    ("white spots on leaves", "Fungal Infection"),
    ("plants are wilting", "Root Rot"),
    ("insects eating leaves", "Pest Attack"),
    ("pale viens and yellow leaves", "Iron Deficiency"),
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; CROPSAGE_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a crop problem description and print the result as JSON
    Classify {
        text: String,
        /// JSON file with an array of problem records
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Skip loading the zero-shot model
        #[arg(long)]
        no_zero_shot: bool,
        /// Include per-stage outcomes in the output
        #[arg(long)]
        report: bool,
    },
    /// Train the learned classifier
    Train {
        /// JSON file of the form {"texts": [...], "labels": [...]}
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Download the zero-shot NLI model
    DownloadModel {
        /// Force a fresh download of the model files
        #[arg(short, long)]
        fresh: bool,
    },
}

#[derive(Deserialize)]
struct TrainingData {
    texts: Vec<String>,
    labels: Vec<String>,
}

async fn download_model(config: &PipelineConfig, fresh: bool) -> anyhow::Result<()> {
    let manager = ModelManager::new(&config.models_dir)?;
    let model = BuiltinNliModel::XlmRobertaLargeXnli;

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(model)?;
    }

    manager.ensure_model_downloaded(model).await?;
    println!("Model ready at {}", manager.get_model_path(model).display());
    Ok(())
}

fn train(config: &PipelineConfig, data: Option<PathBuf>) -> anyhow::Result<()> {
    let (texts, labels) = match data {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read training data {}", path.display()))?;
            let data: TrainingData = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid training data {}", path.display()))?;
            (data.texts, data.labels)
        }
        None => {
            info!("No training data given, using {} seed samples", SEED_SAMPLES.len());
            SEED_SAMPLES
                .iter()
                .map(|(text, label)| (text.to_string(), label.to_string()))
                .unzip()
        }
    };

    let start = Instant::now();
    cropsage::LearnedClassifier::new(config.artifact_path.clone())
        .with_training_config(config.training.clone())
        .train(&texts, &labels)?;
    println!(
        "Trained on {} samples in {:.2?}; artifact at {}",
        texts.len(),
        start.elapsed(),
        config.artifact_path.display()
    );
    Ok(())
}

async fn classify(
    config: PipelineConfig,
    text: String,
    catalog: Option<PathBuf>,
    no_zero_shot: bool,
    report: bool,
) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        bail!("Nothing to classify: the query is empty");
    }

    let mut builder = Pipeline::builder().with_config(config);
    if let Some(path) = catalog {
        builder = builder.with_catalog_source(Arc::new(JsonFileCatalogSource::new(path)));
    }
    if !no_zero_shot {
        builder = builder.with_builtin_zero_shot();
    }
    let pipeline = builder.build()?;

    let start = Instant::now();
    let (result, stages) = pipeline.classify_request(&ClassificationRequest::new(text)).await?;
    info!("Classified in {:.2?}", start.elapsed());

    let output = if report {
        serde_json::json!({ "result": result, "report": stages })
    } else {
        serde_json::to_value(&result)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Classify {
            text,
            catalog,
            no_zero_shot,
            report,
        } => classify(config, text, catalog, no_zero_shot, report).await,
        Command::Train { data } => train(&config, data),
        Command::DownloadModel { fresh } => download_model(&config, fresh).await,
    }
}
