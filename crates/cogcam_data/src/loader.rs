//! Dataloader implementations for batched iteration.

use burn::prelude::*;
use ndarray::{Array3, Array4, Axis};
use rand::prelude::*;

use crate::dataset::{ImageDataset, CHANNELS};
use crate::error::{DataError, Result};
use cogcam_core::{Seed, Split};

/// A batch of images and their class labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Images `(batch, channels, height, width)`.
    pub images: Tensor<B, 4>,
    /// Class labels `(batch,)`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convert a `(C, H, W)` image into a batch of one on `device`.
#[must_use]
pub fn image_tensor<B: Backend>(image: &Array3<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (c, h, w) = image.dim();
    let values: Vec<f32> = image.iter().copied().collect();
    Tensor::from_data(TensorData::new(values, [1, c, h, w]), device)
}

/// A dataloader that produces batches from an [`ImageDataset`].
///
/// Training loaders reshuffle every epoch from a stream derived from the
/// seed and the epoch number, so runs are reproducible.
///
/// # Example
///
/// ```rust,ignore
/// use cogcam_data::ImageDataLoader;
/// use cogcam_core::Seed;
///
/// let loader = ImageDataLoader::builder(dataset)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for batch in loader.iter_epoch::<B>(epoch, &device) {
///     let batch = batch?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ImageDataLoader {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl ImageDataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: ImageDataset) -> ImageDataLoaderBuilder {
        ImageDataLoaderBuilder::new(dataset)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Get the total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Get the data split type.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Sample order for one epoch.
    #[must_use]
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = self.seed.derive(&format!("epoch{epoch}")).to_rng();
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Iterate over the batches of the first epoch.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> ImageDataLoaderIter<'_, B> {
        self.iter_epoch(0, device)
    }

    /// Iterate over the batches of `epoch`.
    #[must_use]
    pub fn iter_epoch<B: Backend>(
        &self,
        epoch: usize,
        device: &B::Device,
    ) -> ImageDataLoaderIter<'_, B> {
        ImageDataLoaderIter {
            loader: self,
            device: device.clone(),
            indices: self.epoch_order(epoch),
            current_batch: 0,
            n_batches: self.n_batches(),
        }
    }
}

/// Builder for ImageDataLoader.
pub struct ImageDataLoaderBuilder {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl ImageDataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: ImageDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: Seed::default(),
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Set the data split type.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is zero or the dataset is empty.
    pub fn build(self) -> Result<ImageDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(ImageDataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// Iterator over batches from an ImageDataLoader.
pub struct ImageDataLoaderIter<'a, B: Backend> {
    loader: &'a ImageDataLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a, B: Backend> Iterator for ImageDataLoaderIter<'a, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = std::cmp::min(start + self.loader.batch_size, self.indices.len());
        self.current_batch += 1;

        Some(self.create_batch(&self.indices[start..end]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend> ImageDataLoaderIter<'a, B> {
    fn create_batch(&self, indices: &[usize]) -> Result<ImageBatch<B>> {
        let dataset = &self.loader.dataset;
        let size = dataset.image_size();
        let batch_size = indices.len();

        let mut images = Array4::<f32>::zeros((batch_size, CHANNELS, size, size));
        let mut labels = Vec::with_capacity(batch_size);
        for (i, &idx) in indices.iter().enumerate() {
            let (image, label) = dataset.get(idx)?;
            images.index_axis_mut(Axis(0), i).assign(&image);
            labels.push(label as i64);
        }

        let values: Vec<f32> = images.into_iter().collect();
        let images = Tensor::from_data(
            TensorData::new(values, [batch_size, CHANNELS, size, size]),
            &self.device,
        );
        let targets = Tensor::from_data(TensorData::new(labels, [batch_size]), &self.device);

        Ok(ImageBatch { images, targets })
    }
}

impl<'a, B: Backend> ExactSizeIterator for ImageDataLoaderIter<'a, B> {}

/// Paired dataloaders for training and validation.
///
/// The training loader shuffles with a stream derived from the seed; the
/// validation loader keeps dataset order.
pub struct ImageDataLoaders {
    train: ImageDataLoader,
    valid: ImageDataLoader,
}

impl ImageDataLoaders {
    /// Create a new builder.
    #[must_use]
    pub fn builder(train: ImageDataset, valid: ImageDataset) -> ImageDataLoadersBuilder {
        ImageDataLoadersBuilder::new(train, valid)
    }

    /// Get the training dataloader.
    #[must_use]
    pub fn train(&self) -> &ImageDataLoader {
        &self.train
    }

    /// Get the validation dataloader.
    #[must_use]
    pub fn valid(&self) -> &ImageDataLoader {
        &self.valid
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.train.batch_size()
    }

    /// Number of classes of the training set.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.train.dataset().n_classes()
    }

    /// Side length of the square images.
    #[must_use]
    pub fn image_size(&self) -> usize {
        self.train.dataset().image_size()
    }
}

/// Builder for ImageDataLoaders.
pub struct ImageDataLoadersBuilder {
    train: ImageDataset,
    valid: ImageDataset,
    batch_size: usize,
    shuffle_train: bool,
    seed: Seed,
}

impl ImageDataLoadersBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(train: ImageDataset, valid: ImageDataset) -> Self {
        Self {
            train,
            valid,
            batch_size: 32,
            shuffle_train: true,
            seed: Seed::default(),
        }
    }

    /// Set the batch size for both loaders.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling for the training loader.
    #[must_use]
    pub fn shuffle_train(mut self, shuffle: bool) -> Self {
        self.shuffle_train = shuffle;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Build the dataloaders.
    pub fn build(self) -> Result<ImageDataLoaders> {
        if self.train.image_size() != self.valid.image_size() {
            return Err(DataError::InvalidShape(format!(
                "train images are {}px but valid images are {}px",
                self.train.image_size(),
                self.valid.image_size()
            )));
        }

        let train = ImageDataLoader::builder(self.train)
            .batch_size(self.batch_size)
            .shuffle(self.shuffle_train)
            .seed(self.seed.derive("train"))
            .split(Split::Train)
            .build()?;

        let valid = ImageDataLoader::builder(self.valid)
            .batch_size(self.batch_size)
            .shuffle(false)
            .split(Split::Valid)
            .build()?;

        Ok(ImageDataLoaders { train, valid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogcam_core::backend::NdArray;

    fn create_test_dataset(n: usize) -> ImageDataset {
        let images = Array4::<f32>::from_shape_fn((n, 3, 4, 4), |(i, _, _, _)| i as f32);
        let labels = (0..n).map(|i| i % 4).collect();
        let names = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        ImageDataset::from_arrays(images, labels, names).unwrap()
    }

    #[test]
    fn test_loader_n_batches() {
        let ds = create_test_dataset(100);

        let loader = ImageDataLoader::builder(ds.clone())
            .batch_size(32)
            .build()
            .unwrap();
        assert_eq!(loader.n_batches(), 4);

        let loader = ImageDataLoader::builder(ds)
            .batch_size(32)
            .drop_last(true)
            .build()
            .unwrap();
        assert_eq!(loader.n_batches(), 3);
    }

    #[test]
    fn test_invalid_builders() {
        assert!(matches!(
            ImageDataLoader::builder(create_test_dataset(4)).batch_size(0).build(),
            Err(DataError::InvalidBatchSize(_))
        ));
        assert!(matches!(
            ImageDataLoader::builder(create_test_dataset(0)).build(),
            Err(DataError::EmptyDataset)
        ));
    }

    #[test]
    fn test_batches_carry_images_and_labels() {
        let device = Default::default();
        let loader = ImageDataLoader::builder(create_test_dataset(10))
            .batch_size(4)
            .build()
            .unwrap();

        let batches: Vec<ImageBatch<NdArray>> = loader
            .iter::<NdArray>(&device)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.dims(), [4, 3, 4, 4]);
        assert_eq!(batches[2].len(), 2);

        let labels: Vec<i64> = batches[0].targets.clone().into_data().to_vec().unwrap();
        assert_eq!(labels, vec![0, 1, 2, 3]);
        let first: Vec<f32> = batches[2].images.clone().into_data().to_vec().unwrap();
        assert_eq!(first[0], 8.0);
    }

    #[test]
    fn test_shuffle_changes_per_epoch_and_is_reproducible() {
        let build = || {
            ImageDataLoader::builder(create_test_dataset(50))
                .shuffle(true)
                .seed(Seed::new(3))
                .build()
                .unwrap()
        };
        let loader = build();
        let epoch0 = loader.epoch_order(0);
        let epoch1 = loader.epoch_order(1);
        assert_ne!(epoch0, epoch1);
        assert_eq!(epoch0, build().epoch_order(0));

        let mut sorted = epoch1.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_loaders_builder() {
        let dls = ImageDataLoaders::builder(create_test_dataset(100), create_test_dataset(20))
            .batch_size(16)
            .seed(Seed::new(42))
            .build()
            .unwrap();

        assert_eq!(dls.batch_size(), 16);
        assert_eq!(dls.train().len(), 100);
        assert_eq!(dls.valid().split(), Split::Valid);
        assert_eq!(dls.valid().epoch_order(5), (0..20).collect::<Vec<_>>());
        assert_eq!(dls.n_classes(), 4);
    }

    #[test]
    fn test_image_tensor_adds_batch_axis() {
        let image = Array3::<f32>::ones((3, 5, 6));
        let tensor = image_tensor::<NdArray>(&image, &Default::default());
        assert_eq!(tensor.dims(), [1, 3, 5, 6]);
    }
}
