//! Stratified dataset splitting.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::{ImageDataset, ImageDatasets};
use crate::error::{DataError, Result};
use cogcam_core::{Seed, Split};

/// Smallest class size that puts at least one image in each of the train,
/// validation and test partitions.
pub const MIN_IMAGES_PER_CLASS: usize = 3;

/// Split sample indices so that every class keeps its proportion.
///
/// Each class is shuffled independently and `round(n_c * ratio)` of its
/// samples are held out, clamped so that a class with at least two samples
/// appears on both sides. A class with a single sample stays in the kept
/// partition.
///
/// # Returns
///
/// A tuple of (kept_indices, held_indices), each in ascending order.
pub fn stratified_indices(
    labels: &[usize],
    ratio: f32,
    rng: &mut ChaCha8Rng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(DataError::SplitError(format!(
            "ratio must be between 0 and 1, got {}",
            ratio
        )));
    }

    let n_classes = labels.iter().max().map_or(0, |&max| max + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (index, &label) in labels.iter().enumerate() {
        by_class[label].push(index);
    }

    let mut kept = Vec::with_capacity(labels.len());
    let mut held = Vec::new();
    for mut indices in by_class {
        let n = indices.len();
        if n == 0 {
            continue;
        }
        indices.shuffle(rng);
        let n_held = if n < 2 {
            0
        } else {
            ((n as f32 * ratio).round() as usize).clamp(1, n - 1)
        };
        held.extend_from_slice(&indices[..n_held]);
        kept.extend_from_slice(&indices[n_held..]);
    }

    kept.sort_unstable();
    held.sort_unstable();
    Ok((kept, held))
}

/// Split a dataset into train and test sets, stratified by class.
///
/// # Arguments
///
/// * `dataset` - The dataset to split
/// * `test_ratio` - Ratio for the test set (e.g., 0.2 for 20%)
/// * `seed` - Random seed for reproducibility
pub fn train_test_split(
    dataset: &ImageDataset,
    test_ratio: f32,
    seed: Seed,
) -> Result<(ImageDataset, ImageDataset)> {
    let mut rng = seed.derive("split").to_rng();
    let (train, test) = stratified_indices(dataset.labels(), test_ratio, &mut rng)?;
    Ok((dataset.subset(&train)?, dataset.subset(&test)?))
}

/// Split a dataset into train, validation and test sets.
///
/// The test set is carved out first; the validation set is then taken from
/// the remainder so that it makes up `valid_ratio` of the whole dataset.
/// Both steps are stratified and driven by one seeded stream.
pub fn train_valid_test_split(
    dataset: &ImageDataset,
    test_ratio: f32,
    valid_ratio: f32,
    seed: Seed,
) -> Result<ImageDatasets> {
    if test_ratio + valid_ratio >= 1.0 {
        return Err(DataError::SplitError(format!(
            "test_ratio + valid_ratio must be < 1, got {} + {}",
            test_ratio, valid_ratio
        )));
    }
    if dataset.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    let mut rng = seed.derive("split").to_rng();
    let (rest, test) = stratified_indices(dataset.labels(), test_ratio, &mut rng)?;

    let rest_labels: Vec<usize> = rest.iter().map(|&i| dataset.labels()[i]).collect();
    let relative_valid = valid_ratio / (1.0 - test_ratio);
    let (train_rel, valid_rel) = stratified_indices(&rest_labels, relative_valid, &mut rng)?;

    let train: Vec<usize> = train_rel.iter().map(|&i| rest[i]).collect();
    let valid: Vec<usize> = valid_rel.iter().map(|&i| rest[i]).collect();

    for (split, indices) in [(Split::Train, &train), (Split::Valid, &valid), (Split::Test, &test)] {
        if indices.is_empty() {
            return Err(DataError::EmptySplit {
                split,
                class_counts: dataset.class_counts(),
            });
        }
    }

    let datasets = ImageDatasets {
        train: dataset.subset(&train)?,
        valid: dataset.subset(&valid)?,
        test: dataset.subset(&test)?,
    };
    let (n_train, n_valid, n_test) = datasets.sizes();
    tracing::info!(
        "Split {} images: train={}, valid={}, test={}",
        dataset.len(),
        n_train,
        n_valid,
        n_test
    );
    Ok(datasets)
}
