//! PNG plots of training curves and confusion matrices.
//!
//! Plots carry no text so they render without system fonts. Colors:
//! training series blue, validation series red.

use std::path::Path;

use plotters::prelude::*;

use crate::confusion::ConfusionMatrix;
use crate::error::{AnalysisError, Result};

const TRAIN_COLOR: RGBColor = RGBColor(31, 119, 180);
const VALID_COLOR: RGBColor = RGBColor(214, 39, 40);
const GRID_COLOR: RGBColor = RGBColor(225, 225, 225);

fn plot_err<E: std::fmt::Display>(e: E) -> AnalysisError {
    AnalysisError::Plot(e.to_string())
}

/// Paired per-epoch series for one panel.
#[derive(Debug, Clone, Copy)]
pub struct CurvePair<'a> {
    /// Training values.
    pub train: &'a [f32],
    /// Validation values.
    pub valid: &'a [f32],
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    curves: CurvePair<'_>,
    y_max: f32,
) -> Result<()> {
    let n = curves.train.len().max(curves.valid.len());
    let x_range = 0.5f32..(n as f32 + 0.5);
    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .build_cartesian_2d(x_range, 0f32..y_max)
        .map_err(plot_err)?;

    for i in 1..4 {
        let y = y_max * i as f32 / 4.0;
        chart
            .draw_series(LineSeries::new(
                [(0.5, y), (n as f32 + 0.5, y)],
                &GRID_COLOR,
            ))
            .map_err(plot_err)?;
    }

    for (values, color) in [(curves.train, TRAIN_COLOR), (curves.valid, VALID_COLOR)] {
        let points: Vec<(f32, f32)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| ((i + 1) as f32, v))
            .collect();
        chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
            .map_err(plot_err)?;
        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 3, color.filled())))
            .map_err(plot_err)?;
    }

    area.draw(&Rectangle::new(
        [(0, 0), (area.dim_in_pixel().0 as i32 - 1, area.dim_in_pixel().1 as i32 - 1)],
        BLACK.stroke_width(1),
    ))
    .map_err(plot_err)?;
    Ok(())
}

/// Draw accuracy (left panel, 0 to 1) and loss (right panel) curves.
pub fn plot_training_curves(
    path: impl AsRef<Path>,
    accuracy: CurvePair<'_>,
    loss: CurvePair<'_>,
) -> Result<()> {
    if accuracy.train.is_empty() && accuracy.valid.is_empty() {
        return Err(AnalysisError::InvalidInput("no epochs to plot".to_string()));
    }
    let path = path.as_ref();
    let root = BitMapBackend::new(path, (1200, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let panels = root.split_evenly((1, 2));
    draw_panel(&panels[0], accuracy, 1.0)?;

    let loss_max = loss
        .train
        .iter()
        .chain(loss.valid)
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    let loss_max = if loss_max > 0.0 { loss_max * 1.1 } else { 1.0 };
    draw_panel(&panels[1], loss, loss_max)?;

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved training curves to {}", path.display());
    Ok(())
}

/// White-to-blue shade for a value in `[0, 1]`.
fn shade(value: f32) -> RGBColor {
    let t = value.clamp(0.0, 1.0);
    let lerp = |from: u8, to: u8| (f32::from(from) + t * (f32::from(to) - f32::from(from))).round() as u8;
    RGBColor(lerp(247, 8), lerp(251, 48), lerp(255, 107))
}

/// Draw a row-normalized confusion matrix as a grid of shaded cells.
pub fn plot_confusion_matrix(path: impl AsRef<Path>, confusion: &ConfusionMatrix) -> Result<()> {
    let n = confusion.n_classes();
    if n == 0 {
        return Err(AnalysisError::InvalidInput("empty confusion matrix".to_string()));
    }
    let path = path.as_ref();
    let cell = 96i32;
    let margin = 16i32;
    let side = (n as i32 * cell + 2 * margin) as u32;
    let root = BitMapBackend::new(path, (side, side)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    for (row, values) in confusion.normalize().iter().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            let x0 = margin + col as i32 * cell;
            let y0 = margin + row as i32 * cell;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                shade(value).filled(),
            ))
            .map_err(plot_err)?;
            root.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell, y0 + cell)],
                BLACK.stroke_width(1),
            ))
            .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;
    tracing::debug!("Saved confusion matrix plot to {}", path.display());
    Ok(())
}
