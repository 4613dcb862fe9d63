//! Integration tests for the experiment pipeline.
//!
//! These tests build a small synthetic image folder and run every stage
//! end to end on the CPU backend.

use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use image::{Rgb, RgbImage};

use cogcam::core::backend::NdArray;
use cogcam::pipeline::{
    CONFIG_FILE, CONFUSION_FILE, CURVES_FILE, HISTORY_FILE, REPORT_JSON_FILE, REPORT_TEXT_FILE,
};
use cogcam::prelude::*;
use cogcam_core::Split;
use cogcam_data::{image_tensor, load_image, DataError};
use cogcam_explain::attribute;
use cogcam_models::{save_model, METADATA_FILE, MODEL_FILE};

type TrainBackend = Autodiff<NdArray>;

const CLASSES: [&str; 4] = ["MildDemented", "ModerateDemented", "NonDemented", "VeryMildDemented"];

/// Class `c` is a bright square whose position depends on the class, on a
/// dark background with a little per-image variation.
fn write_synthetic_folder(root: &Path, per_class: usize) {
    for (class, name) in CLASSES.iter().enumerate() {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let (ox, oy) = ((class % 2) as u32 * 12, (class / 2) as u32 * 12);
            let image = RgbImage::from_fn(24, 24, |x, y| {
                if (ox..ox + 12).contains(&x) && (oy..oy + 12).contains(&y) {
                    Rgb([230, 220, 210])
                } else {
                    Rgb([(i * 5) as u8, 10, 20])
                }
            });
            image.save(dir.join(format!("scan_{i:02}.png"))).unwrap();
        }
    }
}

fn tiny_model_config() -> ClassifierConfig {
    ClassifierConfig::new(4)
        .with_backbone(BackboneConfig::new(vec![4, 8]).with_convs_per_stage(1))
        .with_hidden(8)
        .with_dropout(0.0)
}

fn experiment_config(data: &Path, out: &Path) -> ExperimentConfig {
    ExperimentConfig {
        dataset_dir: data.to_path_buf(),
        output_dir: out.to_path_buf(),
        class_names: CLASSES.iter().map(ToString::to_string).collect(),
        image_size: 16,
        batch_size: 8,
        epochs: 2,
        seed: Seed::new(7),
        freeze_backbone: true,
        explain: ExplainSettings {
            layer: "stage2".to_string(),
            samples: 2,
            ..ExplainSettings::default()
        },
        ..ExperimentConfig::default()
    }
}

#[test]
fn test_experiment_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 10);

    let device = Default::default();
    let summary = Experiment::new(experiment_config(data.path(), out.path()))
        .with_model_config(tiny_model_config())
        .run::<TrainBackend>(&device)
        .unwrap();

    assert_eq!(summary.split_sizes, (28, 4, 8));
    assert_eq!(summary.history.len(), 2);
    assert!(!summary.interrupted);
    assert!(!summary.backbone_frozen, "random backbone must be trained");
    assert!(summary.best_epoch.is_some());
    assert_eq!(summary.report.total_samples, 8);
    assert_eq!(summary.report.classes.len(), 4);
    assert!((0.0..=1.0).contains(&summary.report.balanced_accuracy));

    for file in [
        CONFIG_FILE,
        HISTORY_FILE,
        REPORT_JSON_FILE,
        REPORT_TEXT_FILE,
        CURVES_FILE,
        CONFUSION_FILE,
        MODEL_FILE,
        METADATA_FILE,
    ] {
        assert!(out.path().join(file).exists(), "missing {file}");
    }

    assert_eq!(summary.explanations.len(), 2);
    for overlay in &summary.explanations {
        let rendered = image::open(overlay).unwrap();
        assert_eq!((rendered.width(), rendered.height()), (24, 24));
    }

    let report = evaluate_saved::<NdArray>(out.path(), data.path(), 16, &device).unwrap();
    assert_eq!(report.total_samples, 40);

    let image = data.path().join("NonDemented").join("scan_00.png");
    let (explanation, class_names) = explain_saved::<TrainBackend>(
        out.path(),
        &image,
        Some(2),
        &ExplainSettings { layer: "stage1".to_string(), ..ExplainSettings::default() },
        &device,
    )
    .unwrap();
    assert_eq!(class_names[explanation.target_class()], "NonDemented");
    assert_eq!(explanation.attribution.surface.dim(), (16, 16));
}

#[test]
fn test_interrupted_experiment_still_reports() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 5);

    let stop = StopSignal::new();
    stop.raise();

    let device = Default::default();
    let summary = Experiment::new(experiment_config(data.path(), out.path()))
        .with_model_config(tiny_model_config())
        .with_stop_signal(stop)
        .run::<TrainBackend>(&device)
        .unwrap();

    assert!(summary.interrupted);
    assert!(summary.history.is_empty());
    assert!(summary.best_epoch.is_none());
    assert!(out.path().join(MODEL_FILE).exists());
    assert!(!out.path().join(CURVES_FILE).exists());
}

#[test]
fn test_class_count_mismatch_is_fatal() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 3);
    std::fs::create_dir_all(data.path().join("Unlabelled")).unwrap();

    let device = Default::default();
    let err = Experiment::new(experiment_config(data.path(), out.path()))
        .with_model_config(tiny_model_config())
        .run::<TrainBackend>(&device)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Data(DataError::ClassCountMismatch { expected: 4, found: 5, .. })
    ));
}

#[test]
fn test_pretrained_backbone_stays_frozen() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let weights = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 5);

    let device = Default::default();
    let donor = tiny_model_config().init::<NdArray>(&device).unwrap();
    let weights_path = weights.path().join("backbone");
    save_model::<NdArray, _>(donor.backbone(), &weights_path).unwrap();

    let config = ExperimentConfig {
        backbone_weights: Some(weights_path),
        ..experiment_config(data.path(), out.path())
    };
    let summary = Experiment::new(config)
        .with_model_config(tiny_model_config())
        .run::<TrainBackend>(&device)
        .unwrap();
    assert!(summary.backbone_frozen);
    assert_eq!(summary.history.len(), 2);

    let (trained, _) = load_classifier::<NdArray>(out.path(), &device).unwrap();
    let images = Tensor::<NdArray, 4>::random(
        [2, 3, 16, 16],
        burn::tensor::Distribution::Uniform(0.0, 1.0),
        &device,
    );
    let expected: Vec<f32> = donor.backbone().forward(images.clone()).into_data().to_vec().unwrap();
    let actual: Vec<f32> = trained.backbone().forward(images).into_data().to_vec().unwrap();
    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_too_few_images_names_empty_partition() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 2);

    let device = Default::default();
    let err = Experiment::new(experiment_config(data.path(), out.path()))
        .with_model_config(tiny_model_config())
        .run::<TrainBackend>(&device)
        .unwrap_err();
    match err {
        PipelineError::Data(DataError::EmptySplit { split, class_counts }) => {
            assert_eq!(split, Split::Valid);
            assert_eq!(class_counts, vec![2, 2, 2, 2]);
        }
        other => panic!("expected EmptySplit, got {other:?}"),
    }
}

#[test]
fn test_saved_model_reproduces_predictions_and_attributions() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_synthetic_folder(data.path(), 1);

    let device = Default::default();
    let model = tiny_model_config().init::<TrainBackend>(&device).unwrap();
    let metadata = ModelMetadata::new(
        tiny_model_config(),
        CLASSES.iter().map(ToString::to_string).collect(),
        16,
    );
    save_classifier(&model.valid(), &metadata, out.path()).unwrap();
    let (loaded, loaded_meta) = load_classifier::<TrainBackend>(out.path(), &device).unwrap();
    assert_eq!(loaded_meta, metadata);

    let pixels = load_image(data.path().join("MildDemented").join("scan_00.png"), 16).unwrap();
    let input: Tensor<TrainBackend, 4> = image_tensor(&pixels, &device);

    let original = attribute(&model, input.clone(), 0, "stage2", ScoreKind::Logit).unwrap();
    let reloaded = attribute(&loaded, input, 0, "stage2", ScoreKind::Logit).unwrap();

    for (a, b) in original.scores.iter().zip(&reloaded.scores) {
        assert!((a - b).abs() < 1e-5);
    }
    for (a, b) in original.surface.iter().zip(reloaded.surface.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}
