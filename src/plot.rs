//! Chart rendering
//!
//! [`SvgPlotRenderer`] draws one line per series with offsets on the x axis
//! and nanoseconds on the y axis. NaN offsets break the line instead of
//! being drawn as zero.

use std::fmt::Display;
use std::path::Path;

use plotters::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::aggregate::{ComparisonTable, X_LABEL, Y_LABEL};

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to draw chart {path}: {reason}")]
    Draw { path: String, reason: String },
}

/// Turns a finished table into an image on disk
pub trait PlotRenderer {
    fn render(&self, table: &ComparisonTable, path: &Path) -> Result<(), PlotError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SvgPlotRenderer {
    size: (u32, u32),
}

impl Default for SvgPlotRenderer {
    fn default() -> Self {
        Self { size: (1024, 640) }
    }
}

impl SvgPlotRenderer {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }
}

impl PlotRenderer for SvgPlotRenderer {
    fn render(&self, table: &ComparisonTable, path: &Path) -> Result<(), PlotError> {
        let root = SVGBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| draw_err(path, e))?;

        let x_max = table.offsets().saturating_sub(1).max(1) as f64;
        let (y_min, y_max) = value_range(table);

        let mut chart = ChartBuilder::on(&root)
            .caption(table.title(), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(|e| draw_err(path, e))?;

        chart
            .configure_mesh()
            .x_desc(X_LABEL)
            .y_desc(Y_LABEL)
            .draw()
            .map_err(|e| draw_err(path, e))?;

        for (i, series) in table.series().iter().enumerate() {
            let style = Palette99::pick(i).to_rgba().stroke_width(2);
            let mut labeled = false;
            for segment in finite_segments(series.result.values()) {
                let anno = chart
                    .draw_series(LineSeries::new(segment, style))
                    .map_err(|e| draw_err(path, e))?;
                if !labeled {
                    anno.label(series.label.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
                    labeled = true;
                }
            }
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| draw_err(path, e))?;

        root.present().map_err(|e| draw_err(path, e))?;
        info!(path = %path.display(), "chart written");
        Ok(())
    }
}

fn draw_err(path: &Path, reason: impl Display) -> PlotError {
    PlotError::Draw {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Runs of consecutive finite points as (offset, value) pairs
fn finite_segments(values: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (offset, &value) in values.iter().enumerate() {
        if value.is_finite() {
            current.push((offset as f64, value));
        } else if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Y axis range covering every finite value with a small margin
fn value_range(table: &ComparisonTable) -> (f64, f64) {
    let (lo, hi) = table
        .series()
        .iter()
        .flat_map(|s| s.result.values().iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}
