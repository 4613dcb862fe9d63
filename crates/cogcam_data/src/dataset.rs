//! In-memory image datasets.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::{DataError, Result};
use crate::folder::ImageFolder;

/// Number of colour channels fed to the model.
pub const CHANNELS: usize = 3;

/// Decode an image file as 8-bit RGB at its native resolution.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    let decoded = image::open(path).map_err(|source| DataError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decoded.to_rgb8())
}

/// Resize an RGB image to `size`×`size` and convert it to a `(C, H, W)`
/// array with values in [0, 1].
#[must_use]
pub fn preprocess(image: &RgbImage, size: usize) -> Array3<f32> {
    let side = size as u32;
    let resized = if image.dimensions() == (side, side) {
        image.clone()
    } else {
        image::imageops::resize(image, side, side, FilterType::Triangle)
    };

    let mut array = Array3::<f32>::zeros((CHANNELS, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..CHANNELS {
            array[[c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
        }
    }
    array
}

/// Decode and preprocess one image file for the model.
pub fn load_image(path: impl AsRef<Path>, size: usize) -> Result<Array3<f32>> {
    Ok(preprocess(&load_rgb(path)?, size))
}

/// A labelled set of preprocessed images.
///
/// Stores images in the `(N, C, H, W)` format:
/// - `N`: Number of samples
/// - `C`: Channels (always 3)
/// - `H`, `W`: The configured square resolution
///
/// # Example
///
/// ```rust,ignore
/// use cogcam_data::{ImageDataset, ImageFolder};
///
/// let folder = ImageFolder::scan("data/train", &class_names)?;
/// let dataset = ImageDataset::load(&folder, 128)?;
/// assert_eq!(dataset.image_size(), 128);
/// ```
#[derive(Debug, Clone)]
pub struct ImageDataset {
    images: Array4<f32>,
    labels: Vec<usize>,
    paths: Vec<PathBuf>,
    class_names: Vec<String>,
}

impl ImageDataset {
    /// Decode every image of a scanned folder.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] if the folder is empty and
    /// [`DataError::Image`] for the first file that fails to decode.
    pub fn load(folder: &ImageFolder, image_size: usize) -> Result<Self> {
        if folder.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let n = folder.len();
        let mut images = Array4::<f32>::zeros((n, CHANNELS, image_size, image_size));
        let mut labels = Vec::with_capacity(n);
        let mut paths = Vec::with_capacity(n);

        for (i, entry) in folder.entries().iter().enumerate() {
            let image = load_image(&entry.path, image_size)?;
            images.index_axis_mut(Axis(0), i).assign(&image);
            labels.push(entry.label);
            paths.push(entry.path.clone());
        }

        tracing::info!(
            "Loaded {} images from {} ({}x{}, classes {:?})",
            n,
            folder.root().display(),
            image_size,
            image_size,
            folder.class_counts()
        );

        Ok(Self {
            images,
            labels,
            paths,
            class_names: folder.class_names().to_vec(),
        })
    }

    /// Create a dataset from arrays already in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample counts differ, the images are not
    /// 3-channel squares, or a label is outside the class list.
    pub fn from_arrays(
        images: Array4<f32>,
        labels: Vec<usize>,
        class_names: Vec<String>,
    ) -> Result<Self> {
        let shape = images.shape();
        if shape[0] != labels.len() {
            return Err(DataError::InvalidShape(format!(
                "images has {} samples but labels has {}",
                shape[0],
                labels.len()
            )));
        }
        if shape[1] != CHANNELS || shape[2] != shape[3] {
            return Err(DataError::InvalidShape(format!(
                "expected (N, {}, S, S) images, got {:?}",
                CHANNELS, shape
            )));
        }
        if let Some(&label) = labels.iter().find(|&&label| label >= class_names.len()) {
            return Err(DataError::InvalidShape(format!(
                "label {} outside {} classes",
                label,
                class_names.len()
            )));
        }

        let paths = (0..labels.len())
            .map(|i| PathBuf::from(format!("<memory:{i}>")))
            .collect();
        Ok(Self {
            images,
            labels,
            paths,
            class_names,
        })
    }

    /// Get the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Side length of the square images.
    #[must_use]
    pub fn image_size(&self) -> usize {
        self.images.shape()[2]
    }

    /// Number of declared classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Declared class names, in label order.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// All images `(N, C, H, W)`.
    #[must_use]
    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }

    /// All labels.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Source path of every image.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of samples per class, in label order.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes()];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Get one sample by index.
    pub fn get(&self, index: usize) -> Result<(ArrayView3<'_, f32>, usize)> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }
        Ok((self.images.index_axis(Axis(0), index), self.labels[index]))
    }

    /// Get a subset of samples by indices.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }

        Ok(Self {
            images: self.images.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            paths: indices.iter().map(|&i| self.paths[i].clone()).collect(),
            class_names: self.class_names.clone(),
        })
    }
}

/// Train, validation and test partitions of one labelled image set.
#[derive(Debug, Clone)]
pub struct ImageDatasets {
    /// Samples the classifier head is fitted on.
    pub train: ImageDataset,
    /// Samples that monitor epochs and select the best model.
    pub valid: ImageDataset,
    /// Samples held out for the final report and explanations.
    pub test: ImageDataset,
}

impl ImageDatasets {
    /// Partition sizes as `(train, valid, test)`.
    #[must_use]
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.valid.len(), self.test.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn toy_dataset(n: usize) -> ImageDataset {
        let images = Array4::<f32>::from_shape_fn((n, 3, 4, 4), |(i, c, _, _)| (i * 3 + c) as f32);
        let labels = (0..n).map(|i| i % 2).collect();
        ImageDataset::from_arrays(images, labels, vec!["a".into(), "b".into()]).unwrap()
    }

    #[test]
    fn test_preprocess_scales_and_transposes() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(1, 0, Rgb([255, 0, 51]));

        let array = preprocess(&image, 2);
        assert_eq!(array.shape(), &[3, 2, 2]);
        assert!((array[[0, 0, 1]] - 1.0).abs() < 1e-6);
        assert_eq!(array[[1, 0, 1]], 0.0);
        assert!((array[[2, 0, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(array[[0, 1, 1]], 0.0);
    }

    #[test]
    fn test_preprocess_resizes() {
        let image = RgbImage::from_pixel(10, 6, Rgb([128, 128, 128]));
        let array = preprocess(&image, 8);
        assert_eq!(array.shape(), &[3, 8, 8]);
        assert!(array.iter().all(|&v| (v - 128.0 / 255.0).abs() < 0.01));
    }

    #[test]
    fn test_from_arrays_validation() {
        let images = Array4::<f32>::zeros((2, 3, 4, 4));
        assert!(ImageDataset::from_arrays(images.clone(), vec![0], vec!["a".into()]).is_err());
        assert!(ImageDataset::from_arrays(images, vec![0, 3], vec!["a".into()]).is_err());

        let gray = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(ImageDataset::from_arrays(gray, vec![0], vec!["a".into()]).is_err());
    }

    #[test]
    fn test_subset_and_get() {
        let dataset = toy_dataset(5);
        let subset = dataset.subset(&[4, 1]).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.labels(), &[0, 1]);

        let (image, label) = subset.get(0).unwrap();
        assert_eq!(label, 0);
        assert_eq!(image[[0, 0, 0]], 12.0);

        assert!(matches!(
            dataset.subset(&[9]),
            Err(DataError::IndexOutOfBounds { index: 9, length: 5 })
        ));
        assert_eq!(dataset.class_counts(), vec![3, 2]);
    }

    #[test]
    fn test_load_from_folder() {
        let root = tempfile::tempdir().unwrap();
        for (class, shade) in [("dark", 10u8), ("light", 240u8)] {
            let dir = root.path().join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                RgbImage::from_pixel(12, 12, Rgb([shade, shade, shade]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let folder =
            ImageFolder::scan(root.path(), &["dark".to_string(), "light".to_string()]).unwrap();
        let dataset = ImageDataset::load(&folder, 6).unwrap();

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.image_size(), 6);
        let (image, label) = dataset.get(3).unwrap();
        assert_eq!(label, 1);
        assert!(image.iter().all(|&v| v > 0.9));
    }
}
