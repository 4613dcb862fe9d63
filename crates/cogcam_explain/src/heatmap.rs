//! Turning a raw importance surface into a viewable overlay.
//!
//! [`render`] chains the individual steps, each of which is public:
//! [`rectify`] → [`normalize`] → [`resize`] → [`to_u8`] →
//! [`Colormap::apply`] → [`blend`].

use std::path::{Path, PathBuf};

use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::colormap::Colormap;
use crate::error::{ExplainError, Result};
use cogcam_core::ExplainSettings;

/// Replace negative entries with zero.
#[must_use]
pub fn rectify(surface: &Array2<f32>) -> Array2<f32> {
    surface.mapv(|v| v.max(0.0))
}

/// A surface scaled into `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Normalized values.
    pub map: Array2<f32>,
    /// Set when the input carried no positive evidence and the map is all
    /// zero.
    pub degenerate: bool,
}

/// Divide a rectified surface by its maximum.
///
/// A maximum that is not positive or not finite yields an all-zero map
/// flagged `degenerate`.
#[must_use]
pub fn normalize(surface: &Array2<f32>) -> Normalized {
    let max = surface.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() || max <= 0.0 || surface.iter().any(|v| !v.is_finite()) {
        tracing::warn!(
            "Attribution surface {:?} has no positive evidence (max = {}); rendering an empty heatmap",
            surface.dim(),
            max
        );
        return Normalized {
            map: Array2::zeros(surface.raw_dim()),
            degenerate: true,
        };
    }
    Normalized {
        map: surface.mapv(|v| (v / max).clamp(0.0, 1.0)),
        degenerate: false,
    }
}

/// Row and column of the largest entry (first on ties).
#[must_use]
pub fn argmax(map: &Array2<f32>) -> (usize, usize) {
    map.indexed_iter()
        .fold(((0, 0), f32::NEG_INFINITY), |best, (idx, &v)| {
            if v > best.1 {
                (idx, v)
            } else {
                best
            }
        })
        .0
}

/// Bilinear resize of a map to `width` x `height`.
///
/// Values are expected in `[0, 1]` and stay there.
pub fn resize(map: &Array2<f32>, width: u32, height: u32) -> Result<Array2<f32>> {
    if width == 0 || height == 0 {
        return Err(ExplainError::InvalidInput(format!(
            "cannot resize a heatmap to {width}x{height}"
        )));
    }
    let (rows, cols) = map.dim();
    if rows == 0 || cols == 0 {
        return Err(ExplainError::InvalidInput("empty attribution surface".to_string()));
    }
    let source: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, map.iter().copied().collect())
            .ok_or_else(|| ExplainError::InvalidInput(format!("surface {rows}x{cols}")))?;
    let resized = imageops::resize(&source, width, height, imageops::FilterType::Triangle);
    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .map_err(|e| ExplainError::InvalidInput(e.to_string()))
}

/// Scale a `[0, 1]` map to 8 bits (x255, clamped, truncated).
#[must_use]
pub fn to_u8(map: &Array2<f32>) -> GrayImage {
    let (rows, cols) = map.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([(map[[y as usize, x as usize]] * 255.0).clamp(0.0, 255.0) as u8])
    })
}

/// Weights of the overlay blend. They need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    /// Weight of the base image.
    pub image: f32,
    /// Weight of the colorized heatmap.
    pub heatmap: f32,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            image: 0.6,
            heatmap: 0.4,
        }
    }
}

/// `base * w_image + heat * w_heatmap`, rounded and clipped per channel.
pub fn blend(base: &RgbImage, heat: &RgbImage, weights: BlendWeights) -> Result<RgbImage> {
    if base.dimensions() != heat.dimensions() {
        return Err(ExplainError::InvalidInput(format!(
            "cannot blend a {:?} image with a {:?} heatmap",
            base.dimensions(),
            heat.dimensions()
        )));
    }
    let mix = |b: u8, h: u8| -> u8 {
        (f32::from(b) * weights.image + f32::from(h) * weights.heatmap)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Ok(RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y);
        let h = heat.get_pixel(x, y);
        Rgb([mix(b[0], h[0]), mix(b[1], h[1]), mix(b[2], h[2])])
    }))
}

/// How a surface is drawn over an image.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderConfig {
    /// Blend weights.
    pub weights: BlendWeights,
    /// Heatmap colormap.
    pub colormap: Colormap,
}

impl RenderConfig {
    /// Build from the experiment's explanation settings.
    pub fn from_settings(settings: &ExplainSettings) -> Result<Self> {
        Ok(Self {
            weights: BlendWeights {
                image: settings.image_weight,
                heatmap: settings.heatmap_weight,
            },
            colormap: settings.colormap.parse()?,
        })
    }
}

/// A rendered explanation.
#[derive(Debug, Clone)]
pub struct Composite {
    /// Heatmap blended over the base image, at the base resolution.
    pub image: RgbImage,
    /// Colorized heatmap alone, at the base resolution.
    pub heatmap: RgbImage,
    /// Normalized map resized to the base resolution.
    pub normalized: Array2<f32>,
    /// The surface had no positive evidence.
    pub degenerate: bool,
}

/// Render a raw surface over `base` at the base image's resolution.
pub fn render(surface: &Array2<f32>, base: &RgbImage, config: &RenderConfig) -> Result<Composite> {
    let normalized = normalize(&rectify(surface));
    let resized = resize(&normalized.map, base.width(), base.height())?;
    let heatmap = config.colormap.apply(&to_u8(&resized));
    let image = blend(base, &heatmap, config.weights)?;
    Ok(Composite {
        image,
        heatmap,
        normalized: resized,
        degenerate: normalized.degenerate,
    })
}

/// Write `{stem}_gradcam.png` and `{stem}_heatmap.png` into `dir`.
pub fn save_explanation(
    composite: &Composite,
    dir: impl AsRef<Path>,
    stem: &str,
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let overlay = dir.join(format!("{stem}_gradcam.png"));
    let heatmap = dir.join(format!("{stem}_heatmap.png"));
    composite.image.save(&overlay)?;
    composite.heatmap.save(&heatmap)?;
    tracing::debug!("Saved {}", overlay.display());
    Ok((overlay, heatmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 30) as u8, ((x + y) * 10) as u8])
        })
    }

    #[test]
    fn test_rectify() {
        let surface = array![[-1.0, 2.0], [0.0, -0.5]];
        assert_eq!(rectify(&surface), array![[0.0, 2.0], [0.0, 0.0]]);

        let negative = Array2::from_elem((3, 3), -4.0f32);
        assert!(rectify(&negative).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(&array![[0.5, 2.0], [1.0, 0.0]]);
        assert!(!once.degenerate);
        assert_eq!(once.map, array![[0.25, 1.0], [0.5, 0.0]]);

        let twice = normalize(&once.map);
        assert_eq!(twice.map, once.map);
    }

    #[test]
    fn test_normalize_degenerate() {
        let zero = normalize(&Array2::zeros((4, 4)));
        assert!(zero.degenerate);
        assert!(zero.map.iter().all(|&v| v == 0.0));

        let nan = normalize(&array![[f32::NAN, 1.0]]);
        assert!(nan.degenerate);
        assert!(nan.map.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_resize_round_trip_keeps_peak() {
        let peak = (2usize, 3usize);
        let map = Array2::from_shape_fn((6, 6), |(r, c)| {
            let d2 = (r as f32 - peak.0 as f32).powi(2) + (c as f32 - peak.1 as f32).powi(2);
            (-d2 / 2.0).exp()
        });

        let up = resize(&map, 24, 24).unwrap();
        assert_eq!(up.dim(), (24, 24));
        let back = resize(&up, 6, 6).unwrap();

        let (r, c) = argmax(&back);
        assert!(r.abs_diff(peak.0) <= 1 && c.abs_diff(peak.1) <= 1);
    }

    #[test]
    fn test_resize_non_square() {
        let map = Array2::from_elem((2, 4), 0.5f32);
        let resized = resize(&map, 10, 3).unwrap();
        assert_eq!(resized.dim(), (3, 10));
        assert!(resized.iter().all(|v| (v - 0.5).abs() < 1e-5));
        assert!(resize(&map, 0, 3).is_err());
    }

    #[test]
    fn test_to_u8_truncates() {
        let gray = to_u8(&array![[0.0, 0.5], [1.0, 1.2]]);
        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(0, 0)[0], 0);
        assert_eq!(gray.get_pixel(1, 0)[0], 127);
        assert_eq!(gray.get_pixel(0, 1)[0], 255);
        assert_eq!(gray.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_blend_extremes() {
        let base = gradient_image(6, 4);
        let heat = Colormap::Jet.apply(&GrayImage::from_fn(6, 4, |x, _| Luma([(x * 40) as u8])));

        let only_base = blend(&base, &heat, BlendWeights { image: 1.0, heatmap: 0.0 }).unwrap();
        assert_eq!(only_base, base);
        let only_heat = blend(&base, &heat, BlendWeights { image: 0.0, heatmap: 1.0 }).unwrap();
        assert_eq!(only_heat, heat);

        let saturated = blend(&heat, &heat, BlendWeights { image: 1.0, heatmap: 1.0 }).unwrap();
        for (out, h) in saturated.pixels().zip(heat.pixels()) {
            for i in 0..3 {
                assert_eq!(out[i], h[i].saturating_mul(2));
            }
        }

        let small = gradient_image(3, 3);
        assert!(blend(&small, &heat, BlendWeights::default()).is_err());
    }

    #[test]
    fn test_render_and_save() {
        let base = gradient_image(10, 8);
        let surface = array![[0.0, 1.0], [-2.0, 3.0]];
        let composite = render(&surface, &base, &RenderConfig::default()).unwrap();

        assert!(!composite.degenerate);
        assert_eq!(composite.image.dimensions(), (10, 8));
        assert_eq!(composite.heatmap.dimensions(), (10, 8));
        assert_eq!(composite.normalized.dim(), (8, 10));
        assert!(composite.normalized.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!((composite.normalized[[7, 9]] - 1.0).abs() < 1e-6);
        assert_eq!(composite.normalized[[7, 0]], 0.0);

        let dir = tempfile::tempdir().unwrap();
        let (overlay, heatmap) = save_explanation(&composite, dir.path(), "sample").unwrap();
        assert!(overlay.ends_with("sample_gradcam.png"));
        assert_eq!(image::open(&overlay).unwrap().to_rgb8(), composite.image);
        assert!(heatmap.exists());
    }

    #[test]
    fn test_render_degenerate_surface() {
        let base = gradient_image(4, 4);
        let composite = render(&Array2::from_elem((2, 2), -1.0), &base, &RenderConfig::default()).unwrap();
        assert!(composite.degenerate);
        assert!(composite.normalized.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_render_config_from_settings() {
        let settings = ExplainSettings {
            colormap: "hot".to_string(),
            ..ExplainSettings::default()
        };
        let config = RenderConfig::from_settings(&settings).unwrap();
        assert_eq!(config.colormap, Colormap::Hot);
        assert_eq!(config.weights, BlendWeights::default());

        let bad = ExplainSettings {
            colormap: "rainbow".to_string(),
            ..ExplainSettings::default()
        };
        assert!(RenderConfig::from_settings(&bad).is_err());
    }
}
