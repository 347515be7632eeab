use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use plotters::prelude::*;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::services::price_service::PriceSeries;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot")]
    Empty,
    #[error("drawing failed: {0}")]
    Drawing(String),
}

/// Renders price series to an image file and returns its file name.
pub trait PlotRenderer: Send + Sync {
    fn render(&self, series: &[PriceSeries], filename: &str) -> Result<String, PlotError>;
}

/// `stock_prices_YTD_<timestamp>_<suffix>.png`; the suffix keeps concurrent
/// requests in the same second from overwriting each other.
pub fn ytd_plot_filename() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "stock_prices_YTD_{}_{}.png",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// Rescales closes so the first point of each series is 100.
pub fn normalize(series: &PriceSeries) -> Vec<(NaiveDate, f64)> {
    let Some(first) = series.points.first().map(|p| p.close) else {
        return Vec::new();
    };
    if first == 0.0 {
        return Vec::new();
    }
    series
        .points
        .iter()
        .map(|p| (p.date, p.close / first * 100.0))
        .collect()
}

/// PNG line chart of normalized performance, one line per symbol.
pub struct PngPlotRenderer {
    plot_dir: PathBuf,
    size: (u32, u32),
}

impl PngPlotRenderer {
    pub fn new(plot_dir: PathBuf) -> Self {
        Self {
            plot_dir,
            size: (1200, 600),
        }
    }
}

impl PlotRenderer for PngPlotRenderer {
    fn render(&self, series: &[PriceSeries], filename: &str) -> Result<String, PlotError> {
        let lines: Vec<Vec<(NaiveDate, f64)>> = series
            .iter()
            .map(normalize)
            .filter(|line| !line.is_empty())
            .collect();

        let start = lines.iter().filter_map(|l| l.first().map(|p| p.0)).min().ok_or(PlotError::Empty)?;
        let end = lines.iter().filter_map(|l| l.last().map(|p| p.0)).max().ok_or(PlotError::Empty)?;
        let (lo, hi) = lines
            .iter()
            .flatten()
            .fold((f64::MAX, f64::MIN), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        let pad = ((hi - lo) * 0.05).max(1.0);
        let x_max = ((end - start).num_days() as f64).max(1.0);

        let path = self.plot_dir.join(filename);
        let root = BitMapBackend::new(&path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(0f64..x_max, (lo - pad)..(hi + pad))
            .map_err(drawing)?;

        // 100 = price on the first trading day of the year
        chart
            .draw_series(LineSeries::new(vec![(0.0, 100.0), (x_max, 100.0)], &RGBColor(200, 200, 200)))
            .map_err(drawing)?;

        for (idx, line) in lines.iter().enumerate() {
            let points = line
                .iter()
                .map(|(date, value)| ((*date - start).num_days() as f64, *value));
            chart
                .draw_series(LineSeries::new(points, Palette99::pick(idx).stroke_width(2)))
                .map_err(drawing)?;
        }

        root.present().map_err(drawing)?;
        info!("📈 Saved plot {} ({} series)", path.display(), lines.len());

        Ok(filename.to_string())
    }
}

fn drawing<E: std::fmt::Display>(e: E) -> PlotError {
    PlotError::Drawing(e.to_string())
}
