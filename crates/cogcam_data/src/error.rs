//! Error types for cogcam_data.

use std::path::PathBuf;

use cogcam_core::Split;
use thiserror::Error;

use crate::splits::MIN_IMAGES_PER_CLASS;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while scanning, loading, splitting or batching images.
#[derive(Error, Debug)]
pub enum DataError {
    /// The number of class directories differs from the declared class list.
    #[error(
        "{dir}: found {found} class directories {found_names:?}, but {expected} classes are declared"
    )]
    ClassCountMismatch {
        /// Dataset root that was scanned.
        dir: PathBuf,
        /// Number of declared classes.
        expected: usize,
        /// Number of class directories found.
        found: usize,
        /// Names of the directories found.
        found_names: Vec<String>,
    },

    /// A class directory holds no readable images.
    #[error("Class directory {0} contains no images")]
    EmptyClass(PathBuf),

    /// The dataset root is missing or not a directory.
    #[error("Dataset directory {0} does not exist or is not a directory")]
    MissingDirectory(PathBuf),

    /// An image file could not be decoded.
    #[error("Failed to decode image {path}: {source}")]
    Image {
        /// File that failed.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: image::ImageError,
    },

    /// Invalid data shape.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Empty dataset.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Splitting left a partition without samples.
    #[error(
        "{split} partition is empty after splitting (images per class: {class_counts:?}); \
         every class needs at least {min} images",
        min = MIN_IMAGES_PER_CLASS
    )]
    EmptySplit {
        /// Partition that came out empty.
        split: Split,
        /// Images per class in the dataset being split.
        class_counts: Vec<usize>,
    },

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] cogcam_core::CoreError),
}
