//! Colormaps from 8-bit intensity to RGB.

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::ExplainError;

/// Perceptually ordered colormap applied to heatmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    /// Blue through cyan, yellow and red.
    #[default]
    Jet,
    /// Black through red and yellow to white.
    Hot,
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Colormap {
    /// All supported colormaps.
    pub const ALL: [Colormap; 2] = [Colormap::Jet, Colormap::Hot];

    /// Color of one intensity.
    #[must_use]
    pub fn color(self, value: u8) -> Rgb<u8> {
        let x = f32::from(value) / 255.0;
        match self {
            Colormap::Jet => Rgb([
                channel(1.5 - (4.0 * x - 3.0).abs()),
                channel(1.5 - (4.0 * x - 2.0).abs()),
                channel(1.5 - (4.0 * x - 1.0).abs()),
            ]),
            Colormap::Hot => Rgb([
                channel(3.0 * x),
                channel(3.0 * x - 1.0),
                channel(3.0 * x - 2.0),
            ]),
        }
    }

    /// Colorize a grayscale heatmap.
    #[must_use]
    pub fn apply(self, heatmap: &GrayImage) -> RgbImage {
        let lut: Vec<Rgb<u8>> = (0..=255u8).map(|v| self.color(v)).collect();
        RgbImage::from_fn(heatmap.width(), heatmap.height(), |x, y| {
            lut[usize::from(heatmap.get_pixel(x, y)[0])]
        })
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Colormap::Jet => "jet",
            Colormap::Hot => "hot",
        }
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Colormap::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ExplainError::InvalidInput(format!("unknown colormap '{s}' (expected jet or hot)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(Colormap::Jet.color(0), Rgb([0, 0, 128]));
        assert_eq!(Colormap::Jet.color(255), Rgb([128, 0, 0]));
        let mid = Colormap::Jet.color(128);
        assert_eq!(mid[1], 255);
    }

    #[test]
    fn test_hot_is_monotonic() {
        let mut prev = Colormap::Hot.color(0);
        assert_eq!(prev, Rgb([0, 0, 0]));
        for v in 1..=255u8 {
            let c = Colormap::Hot.color(v);
            assert!((0..3).all(|i| c[i] >= prev[i]));
            prev = c;
        }
        assert_eq!(prev, Rgb([255, 255, 255]));
    }

    #[test]
    fn test_apply_keeps_dimensions() {
        let gray = GrayImage::from_fn(5, 3, |x, _| image::Luma([(x * 60) as u8]));
        let rgb = Colormap::Hot.apply(&gray);
        assert_eq!(rgb.dimensions(), (5, 3));
        assert_eq!(*rgb.get_pixel(4, 2), Colormap::Hot.color(240));
    }

    #[test]
    fn test_parse() {
        assert_eq!("jet".parse::<Colormap>().unwrap(), Colormap::Jet);
        assert_eq!("HOT".parse::<Colormap>().unwrap(), Colormap::Hot);
        assert!("viridis".parse::<Colormap>().is_err());
        assert_eq!(Colormap::Hot.to_string(), "hot");
    }
}
