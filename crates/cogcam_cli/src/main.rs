//! cogcam CLI for training, evaluating and explaining severity classifiers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use cogcam::core::{ExperimentConfig, FeatureIntrospection, ScoreKind};
use cogcam::models::{load_classifier, model_paths, ModelMetadata};
use cogcam::pipeline::{evaluate_saved, explain_saved, Experiment};
use cogcam::train::StopSignal;

/// Backend type for training and attribution.
type TrainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "cogcam")]
#[command(author, version)]
#[command(about = "Classify brain scans by dementia severity and explain predictions with Grad-CAM")]
#[command(long_about = "cogcam: severity classification of brain scans with Grad-CAM heatmaps.

EXAMPLES:
  # Train on a folder with one sub-directory per class
  cogcam train --data ./Alzheimer_s_Dataset --output ./runs/exp1 --epochs 10

  # Train from a JSON configuration, overriding the seed
  cogcam --config experiment.json train --seed 7

  # Report on another labelled folder
  cogcam evaluate --model ./runs/exp1 --data ./holdout

  # Explain one scan for a chosen class at a chosen layer
  cogcam explain --model ./runs/exp1 --image scan.jpg --class MildDemented --layer stage3

  # List the layers that can be attributed
  cogcam layers --model ./runs/exp1")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Experiment configuration file (JSON); flags override its values
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a classifier, report on the test split and explain test images
    Train(TrainArgs),
    /// Evaluate a saved classifier on a labelled image folder
    Evaluate {
        /// Directory holding model.mpk and model.json
        #[arg(long, value_name = "DIR")]
        model: PathBuf,

        /// Folder with one sub-directory per class
        #[arg(long, value_name = "DIR")]
        data: PathBuf,

        /// Batch size for inference
        #[arg(long, default_value = "32", value_name = "SIZE")]
        batch_size: usize,
    },
    /// Explain one image with a saved classifier
    Explain {
        /// Directory holding model.mpk and model.json
        #[arg(long, value_name = "DIR")]
        model: PathBuf,

        /// Image file to explain
        #[arg(long, value_name = "FILE")]
        image: PathBuf,

        /// Class to explain, by name or index (default: predicted class)
        #[arg(long = "class", value_name = "CLASS")]
        class: Option<String>,

        /// Layer to attribute (see `cogcam layers`)
        #[arg(long, value_name = "LAYER")]
        layer: Option<String>,

        /// Colormap: jet or hot
        #[arg(long, value_name = "NAME")]
        colormap: Option<String>,

        /// Differentiate the logit instead of the probability
        #[arg(long)]
        logit: bool,

        /// Directory receiving the PNGs
        #[arg(long, default_value = ".", value_name = "DIR")]
        output: PathBuf,
    },
    /// List the attributable layers of a saved classifier
    Layers {
        /// Directory holding model.mpk and model.json
        #[arg(long, value_name = "DIR")]
        model: PathBuf,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// Folder with one sub-directory per class
    #[arg(long, value_name = "DIR")]
    data: Option<PathBuf>,

    /// Output directory for the model, reports, plots and explanations
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long, value_name = "N")]
    epochs: Option<usize>,

    /// Batch size for training
    #[arg(long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Square input resolution
    #[arg(long, value_name = "PX")]
    image_size: Option<usize>,

    /// Learning rate for Adam optimizer
    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    /// Random seed for reproducibility
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Pretrained backbone record
    #[arg(long, value_name = "FILE")]
    backbone_weights: Option<PathBuf>,

    /// Train the backbone together with the head
    #[arg(long)]
    unfreeze: bool,

    /// Layer attributed in the test explanations
    #[arg(long, value_name = "LAYER")]
    layer: Option<String>,

    /// Number of test images to explain
    #[arg(long, value_name = "N")]
    samples: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train(args) => handle_train(config, args),
        Commands::Evaluate {
            model,
            data,
            batch_size,
        } => handle_evaluate(&model, &data, batch_size),
        Commands::Explain {
            model,
            image,
            class,
            layer,
            colormap,
            logit,
            output,
        } => handle_explain(config, &model, &image, class, layer, colormap, logit, &output),
        Commands::Layers { model } => handle_layers(&model),
    }
}

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::from_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

fn apply_overrides(mut config: ExperimentConfig, args: TrainArgs) -> ExperimentConfig {
    if let Some(data) = args.data {
        config.dataset_dir = data;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(image_size) = args.image_size {
        config.image_size = image_size;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        config.seed = cogcam::core::Seed::new(seed);
    }
    if let Some(weights) = args.backbone_weights {
        config.backbone_weights = Some(weights);
    }
    if args.unfreeze {
        config.freeze_backbone = false;
    }
    if let Some(layer) = args.layer {
        config.explain.layer = layer;
    }
    if let Some(samples) = args.samples {
        config.explain.samples = samples;
    }
    config
}

/// Raise `stop` on Ctrl-C from a background thread.
fn install_interrupt_handler(stop: StopSignal) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to start signal listener: {e}");
                return;
            }
        };
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("Received Ctrl+C, stopping after the current batch");
                    stop.raise();
                }
                Err(e) => tracing::error!("Failed to listen for SIGINT: {e}"),
            }
        });
    });
}

fn handle_train(config: ExperimentConfig, args: TrainArgs) -> Result<()> {
    let config = apply_overrides(config, args);
    config.validate().context("Invalid experiment configuration")?;

    println!("=== cogcam Training ===\n");
    println!("Configuration:");
    println!("  Dataset: {}", config.dataset_dir.display());
    println!("  Classes: {}", config.class_names.join(", "));
    println!("  Image size: {}", config.image_size);
    println!("  Epochs: {}", config.epochs);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Batch size: {}", config.batch_size);
    println!("  Seed: {}", config.seed.value());
    println!("  Output: {}\n", config.output_dir.display());

    let stop = StopSignal::new();
    install_interrupt_handler(stop.clone());

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let dataset_dir = config.dataset_dir.clone();
    let summary = Experiment::new(config)
        .with_stop_signal(stop)
        .run::<TrainBackend>(&device)
        .with_context(|| format!("Experiment on {} failed", dataset_dir.display()))?;

    let (train, valid, test) = summary.split_sizes;
    println!("Split: {train} train / {valid} valid / {test} test");
    if summary.interrupted {
        println!("Training interrupted after {} epochs", summary.history.len());
    }
    match summary.best_epoch {
        Some(epoch) => println!(
            "Best validation accuracy: {:.2}% (epoch {})",
            summary.best_valid_acc * 100.0,
            epoch
        ),
        None => println!("No epoch completed; the saved model has its initial weights"),
    }
    println!("\n{}", summary.report.to_string_table());
    println!("{}", summary.report.confusion.to_string_table());
    for overlay in &summary.explanations {
        println!("Explanation: {}", overlay.display());
    }
    println!("\nArtefacts written to {}", summary.output_dir.display());
    Ok(())
}

fn handle_evaluate(model: &Path, data: &Path, batch_size: usize) -> Result<()> {
    let device = burn_ndarray::NdArrayDevice::Cpu;
    let report = evaluate_saved::<NdArray>(model, data, batch_size, &device)
        .with_context(|| format!("Failed to evaluate {} on {}", model.display(), data.display()))?;

    println!("{}", report.to_string_table());
    println!("{}", report.confusion.to_string_table());
    Ok(())
}

fn resolve_class(class: &str, class_names: &[String]) -> Result<usize> {
    if let Some(index) = class_names.iter().position(|name| name.eq_ignore_ascii_case(class)) {
        return Ok(index);
    }
    match class.parse::<usize>() {
        Ok(index) if index < class_names.len() => Ok(index),
        _ => bail!(
            "Unknown class '{}'; expected one of {} or an index below {}",
            class,
            class_names.join(", "),
            class_names.len()
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_explain(
    config: ExperimentConfig,
    model: &Path,
    image: &Path,
    class: Option<String>,
    layer: Option<String>,
    colormap: Option<String>,
    logit: bool,
    output: &Path,
) -> Result<()> {
    let (_, metadata_path) = model_paths(model);
    let metadata = ModelMetadata::load(&metadata_path)
        .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
    let target = class
        .as_deref()
        .map(|c| resolve_class(c, &metadata.class_names))
        .transpose()?;

    let mut settings = config.explain;
    if let Some(layer) = layer {
        settings.layer = layer;
    }
    if let Some(colormap) = colormap {
        settings.colormap = colormap;
    }
    if logit {
        settings.score = ScoreKind::Logit;
    }

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let (explanation, class_names) =
        explain_saved::<TrainBackend>(model, image, target, &settings, &device)
            .with_context(|| format!("Failed to explain {} at layer {}", image.display(), settings.layer))?;

    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let (overlay, heatmap) = explanation
        .save(output, &stem)
        .with_context(|| format!("Failed to write PNGs to {}", output.display()))?;

    println!("Layer: {}", explanation.attribution.layer);
    println!("Predicted: {}", class_names[explanation.predicted_class]);
    println!("Explained: {}", class_names[explanation.target_class()]);
    for (name, score) in class_names.iter().zip(&explanation.attribution.scores) {
        println!("  {name:>20}: {score:.4}");
    }
    if explanation.composite.degenerate {
        println!("No positive evidence for this class at this layer; the heatmap is empty");
    }
    println!("Overlay: {}", overlay.display());
    println!("Heatmap: {}", heatmap.display());
    Ok(())
}

fn handle_layers(model: &Path) -> Result<()> {
    let device = burn_ndarray::NdArrayDevice::Cpu;
    let (classifier, metadata) = load_classifier::<NdArray>(model, &device)
        .with_context(|| format!("Failed to load model from {}", model.display()))?;

    println!("{} ({} classes, {}px input)", metadata.arch, metadata.class_names.len(), metadata.image_size);
    for layer in classifier.layers() {
        let note = if layer.is_spatial() { "" } else { "  (not attributable: no spatial axes)" };
        println!("  {layer}{note}");
    }
    Ok(())
}
