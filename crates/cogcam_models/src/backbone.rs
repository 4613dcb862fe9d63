//! VGG-style convolutional feature extractor.
//!
//! The backbone is a stack of stages. Every stage is a run of 3×3 same-padded
//! convolutions, each followed by a ReLU; every stage after the first starts
//! with a 2×2 max-pool, so the output of stage `n` has `1 / 2^(n-1)` of the
//! input resolution:
//!
//! ```text
//! input 3×128×128
//!   stage1: conv-relu ×2          ->  32×128×128
//!   stage2: pool, conv-relu ×2    ->  64× 64× 64
//!   stage3: pool, conv-relu ×2    -> 128× 32× 32
//!   stage4: pool, conv-relu ×2    -> 256× 16× 16
//! ```
//!
//! Stage outputs are taken after the last ReLU and before the next pool,
//! which keeps the deepest stage spatially resolved for Grad-CAM.

use std::ops::Range;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::module::max_pool2d;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Configuration for the [`Backbone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Output channels of every stage, input side first.
    pub stage_channels: Vec<usize>,
    /// Convolutions per stage.
    pub convs_per_stage: usize,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            stage_channels: vec![32, 64, 128, 256],
            convs_per_stage: 2,
        }
    }
}

impl BackboneConfig {
    /// Create a config with the given stage widths.
    pub fn new(stage_channels: Vec<usize>) -> Self {
        Self {
            stage_channels,
            ..Default::default()
        }
    }

    /// Set the number of convolutions per stage.
    #[must_use]
    pub fn with_convs_per_stage(mut self, convs_per_stage: usize) -> Self {
        self.convs_per_stage = convs_per_stage;
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stage_channels.len()
    }

    /// Channels of the last stage.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.stage_channels.last().copied().unwrap_or(self.in_channels)
    }

    /// Smallest input side that survives every pooling step.
    #[must_use]
    pub fn min_input_size(&self) -> usize {
        1 << self.n_stages().saturating_sub(1)
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.stage_channels.is_empty() {
            return Err(ModelError::InvalidConfig(
                "backbone needs at least one stage".to_string(),
            ));
        }
        if self.in_channels == 0 || self.stage_channels.contains(&0) {
            return Err(ModelError::InvalidConfig(format!(
                "channel counts must be positive, got {} -> {:?}",
                self.in_channels, self.stage_channels
            )));
        }
        if self.convs_per_stage == 0 {
            return Err(ModelError::InvalidConfig(
                "convs_per_stage must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize the backbone with fresh weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Backbone<B>> {
        self.validate()?;
        Ok(Backbone::new(self, device))
    }
}

/// One resolution level: optional pool, then `conv -> relu` repeated.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

impl<B: Backend> ConvStage<B> {
    fn new(in_channels: usize, out_channels: usize, n_convs: usize, device: &B::Device) -> Self {
        let convs = (0..n_convs)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                Conv2dConfig::new([input, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect();
        Self { convs }
    }

    fn forward(&self, x: Tensor<B, 4>, downsample: bool) -> Tensor<B, 4> {
        let x = if downsample {
            max_pool2d(x, [2, 2], [2, 2], [0, 0], [1, 1])
        } else {
            x
        };
        self.convs
            .iter()
            .fold(x, |x, conv| relu(conv.forward(x)))
    }
}

/// Convolutional feature extractor with addressable stages.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stages: Vec<ConvStage<B>>,
}

impl<B: Backend> Backbone<B> {
    /// Create a backbone from its configuration.
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let mut in_channels = config.in_channels;
        let stages = config
            .stage_channels
            .iter()
            .map(|&out_channels| {
                let stage =
                    ConvStage::new(in_channels, out_channels, config.convs_per_stage, device);
                in_channels = out_channels;
                stage
            })
            .collect();
        Self { stages }
    }

    /// Number of stages.
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Run the stages with indices in `range` (0-based) on `x`.
    ///
    /// `x` must be the output of stage `range.start - 1`, or the image when
    /// the range starts at 0.
    pub fn forward_stages(&self, x: Tensor<B, 4>, range: Range<usize>) -> Tensor<B, 4> {
        let end = range.end.min(self.stages.len());
        (range.start..end).fold(x, |x, index| self.stages[index].forward(x, index > 0))
    }

    /// Output of the last stage.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_stages(x, 0..self.stages.len())
    }

    /// Outputs of every stage, input side first.
    pub fn feature_maps(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut features = Vec::with_capacity(self.stages.len());
        let mut x = x;
        for (index, stage) in self.stages.iter().enumerate() {
            x = stage.forward(x, index > 0);
            features.push(x.clone());
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogcam_core::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> BackboneConfig {
        BackboneConfig::new(vec![4, 6, 8]).with_convs_per_stage(1)
    }

    #[test]
    fn test_stage_shapes() {
        let device = Default::default();
        let backbone = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);

        let maps = backbone.feature_maps(x.clone());
        let dims: Vec<[usize; 4]> = maps.iter().map(|m| m.dims()).collect();
        assert_eq!(dims, vec![[2, 4, 16, 16], [2, 6, 8, 8], [2, 8, 4, 4]]);
        assert_eq!(backbone.forward(x).dims(), [2, 8, 4, 4]);
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let backbone = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random(
            [1, 3, 8, 8],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let full = backbone.forward(x.clone());
        let head = backbone.forward_stages(x, 0..2);
        let tail = backbone.forward_stages(head, 2..3);

        let full: Vec<f32> = full.into_data().to_vec().unwrap();
        let tail: Vec<f32> = tail.into_data().to_vec().unwrap();
        for (a, b) in full.iter().zip(&tail) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(BackboneConfig::new(vec![]).validate().is_err());
        assert!(BackboneConfig::new(vec![4, 0]).validate().is_err());
        assert!(small_config().with_convs_per_stage(0).validate().is_err());

        let config = BackboneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.out_channels(), 256);
        assert_eq!(config.min_input_size(), 8);
    }
}
