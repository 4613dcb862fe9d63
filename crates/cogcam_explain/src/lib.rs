//! # cogcam_explain
//!
//! Grad-CAM explanations for cogcam classifiers.
//!
//! This crate provides:
//! - Channel weighting and fusion of a captured feature map and gradient
//! - Heatmap post-processing: rectify, normalize, resize, colorize, blend
//! - [`Explainer`], which turns an image file into a saved overlay
//!
//! Gradients come from [`cogcam_core::GradientIntrospection`]; nothing here
//! touches the autodiff graph.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod attribution;
mod colormap;
mod error;
mod explainer;
pub mod heatmap;

pub use attribution::{
    attribute, attribute_layer, channel_weights, grad_cam, resolve_layer, surface_to_array,
    weighted_fusion, Attribution,
};
pub use colormap::Colormap;
pub use error::{ExplainError, Result};
pub use explainer::{explain_image, Explainer, Explanation};
pub use heatmap::{render, save_explanation, BlendWeights, Composite, Normalized, RenderConfig};
