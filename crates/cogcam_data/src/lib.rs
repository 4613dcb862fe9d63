//! # cogcam_data
//!
//! Labelled image folders, datasets and dataloaders for cogcam.
//!
//! This crate provides:
//! - [`ImageFolder`] for scanning a class-per-directory dataset
//! - [`ImageDataset`] holding preprocessed `(N, C, H, W)` images and labels
//! - [`train_valid_test_split`] for stratified, seeded partitioning
//! - [`ImageDataLoader`] and [`ImageDataLoaders`] for batched iteration
//!
//! ## Example
//!
//! ```rust,ignore
//! use cogcam_data::{ImageDataLoaders, ImageDataset, ImageFolder, train_valid_test_split};
//! use cogcam_core::Seed;
//!
//! let folder = ImageFolder::scan(&config.dataset_dir, &config.class_names)?;
//! let dataset = ImageDataset::load(&folder, config.image_size)?;
//! let splits = train_valid_test_split(&dataset, 0.2, 0.1, Seed::new(42))?;
//!
//! let dls = ImageDataLoaders::builder(splits.train, splits.valid)
//!     .batch_size(32)
//!     .seed(Seed::new(42))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod folder;
mod loader;
mod splits;

pub use dataset::{load_image, load_rgb, preprocess, ImageDataset, ImageDatasets, CHANNELS};
pub use error::{DataError, Result};
pub use folder::{is_image_file, FolderEntry, ImageFolder, IMAGE_EXTENSIONS};
pub use loader::{
    image_tensor, ImageBatch, ImageDataLoader, ImageDataLoaderBuilder, ImageDataLoaderIter,
    ImageDataLoaders, ImageDataLoadersBuilder,
};
pub use splits::{
    stratified_indices, train_test_split, train_valid_test_split, MIN_IMAGES_PER_CLASS,
};
