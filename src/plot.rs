//! Box plot with a beeswarm overlay and stacked significance brackets.

use crate::join::PlotTable;
use crate::parse::Highlights;
use crate::process::AnalysisError;
use crate::stats::{BoxSummary, Comparison};

use anyhow::Context;
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;

/// Default categorical palette (seaborn "deep").
pub const DEEP_PALETTE: [RGBColor; 10] = [
    RGBColor(76, 114, 176),
    RGBColor(221, 132, 82),
    RGBColor(85, 168, 104),
    RGBColor(196, 78, 82),
    RGBColor(129, 114, 179),
    RGBColor(147, 120, 96),
    RGBColor(218, 139, 195),
    RGBColor(140, 140, 140),
    RGBColor(204, 185, 116),
    RGBColor(100, 181, 205),
];

const BOX_COLOR: RGBColor = RGBColor(61, 61, 61);
const LEGEND_WIDTH: u32 = 160;

/// Rendering parameters.
#[derive(Debug, Clone)]
pub struct PlotConfig {
    /// Figure width in pixels
    pub width: u32,
    /// Figure height in pixels
    pub height: u32,
    /// Swarm marker size in points; 0 hides the swarm
    pub point_size: u32,
    /// Fraction of a category slot taken by a box
    pub box_width: f64,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            point_size: 2,
            box_width: 0.8,
            palette: DEEP_PALETTE.to_vec(),
        }
    }
}

impl PlotConfig {
    /// Marker diameter in pixels: point size at 100 dpi.
    pub fn marker_diameter(&self) -> f64 {
        self.point_size as f64 * 100.0 / 72.0
    }

    fn color(&self, index: usize) -> RGBColor {
        if self.palette.is_empty() {
            DEEP_PALETTE[index % DEEP_PALETTE.len()]
        } else {
            self.palette[index % self.palette.len()]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisLabels {
    pub x: String,
    pub y: String,
}

/// Subpopulation levels in legend and palette order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueSpec {
    pub levels: Vec<String>,
}

impl HueSpec {
    /// With an allow-list the fallback group comes first, then the list in
    /// the order given; otherwise levels appear in table order.
    pub fn from_table(table: &PlotTable, highlights: &Highlights) -> Self {
        let levels = match highlights {
            Highlights::Only(groups) => std::iter::once(crate::join::FALLBACK_GROUP.to_string())
                .chain(groups.iter().cloned())
                .collect(),
            Highlights::All => {
                let mut levels: Vec<String> = Vec::new();
                for group in table.rows().iter().filter_map(|r| r.subpopulation.as_ref()) {
                    if !levels.contains(group) {
                        levels.push(group.clone());
                    }
                }
                levels
            }
        };
        HueSpec { levels }
    }

    pub fn index_of(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }
}

/// Figure formats, picked from the output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    /// No extension means SVG. PNG needs the `png` feature.
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return Ok(OutputFormat::Svg),
        };
        match ext.as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" if cfg!(feature = "png") => Ok(OutputFormat::Png),
            "png" => Err(AnalysisError::UnsupportedFormat(
                "png (rebuild with the `png` feature)".to_string(),
            )),
            other => Err(AnalysisError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One swarm marker: phenotype value and palette index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Marker {
    value: f64,
    color: usize,
}

struct Category {
    summary: Option<BoxSummary>,
    markers: Vec<Marker>,
}

struct Figure<'a> {
    order: &'a [String],
    categories: Vec<Category>,
    brackets: Vec<(usize, &'a Comparison)>,
    hue: Option<&'a HueSpec>,
    labels: &'a AxisLabels,
    y_range: (f64, f64),
    bracket_base: f64,
    bracket_step: f64,
}

/// Draws the figure to `path`.
pub fn render_plot(
    table: &PlotTable,
    order: &[String],
    comparisons: &[Comparison],
    hue: Option<&HueSpec>,
    labels: &AxisLabels,
    config: &PlotConfig,
    path: &Path,
) -> Result<(), AnalysisError> {
    let format = OutputFormat::from_path(path)?;
    let figure = build_figure(table, order, comparisons, hue, labels);

    let result = match format {
        OutputFormat::Svg => draw_svg(path, &figure, config),
        #[cfg(feature = "png")]
        OutputFormat::Png => draw_png(path, &figure, config),
        #[cfg(not(feature = "png"))]
        OutputFormat::Png => Err(anyhow::anyhow!("PNG output is not enabled")),
    };
    result.map_err(|e| AnalysisError::Plot(format!("{:#}", e)))
}

fn build_figure<'a>(
    table: &PlotTable,
    order: &'a [String],
    comparisons: &'a [Comparison],
    hue: Option<&'a HueSpec>,
    labels: &'a AxisLabels,
) -> Figure<'a> {
    let categories: Vec<Category> = order
        .iter()
        .map(|genotype| {
            let markers: Vec<Marker> = table
                .rows()
                .iter()
                .filter(|row| row.genotype.as_deref() == Some(genotype.as_str()))
                .filter_map(|row| {
                    let value = row.value()?;
                    let color = match (hue, row.subpopulation.as_deref()) {
                        (Some(hue), Some(level)) => hue.index_of(level).unwrap_or(0),
                        _ => 0,
                    };
                    Some(Marker { value, color })
                })
                .collect();
            let values: Vec<f64> = markers.iter().map(|m| m.value).collect();
            Category {
                summary: BoxSummary::from_values(&values),
                markers,
            }
        })
        .collect();

    let (lo, hi) = categories
        .iter()
        .flat_map(|c| c.markers.iter().map(|m| m.value))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) };
    let spread = if hi > lo { hi - lo } else { 1.0 };

    let brackets = bracket_levels(comparisons);
    let levels = brackets.iter().map(|(level, _)| level + 1).max().unwrap_or(0);
    let bracket_base = hi + 0.06 * spread;
    let bracket_step = 0.09 * spread;
    let top = if levels > 0 {
        bracket_base + bracket_step * levels as f64
    } else {
        hi + 0.05 * spread
    };

    Figure {
        order,
        categories,
        brackets,
        hue,
        labels,
        y_range: (lo - 0.05 * spread, top),
        bracket_base,
        bracket_step,
    }
}

/// Stacking level of each bracket: narrowest pairs first, then leftmost.
pub fn bracket_levels(comparisons: &[Comparison]) -> Vec<(usize, &Comparison)> {
    let mut sorted: Vec<&Comparison> = comparisons.iter().collect();
    sorted.sort_by_key(|c| (c.span(), c.left_index, c.right_index));
    sorted.into_iter().enumerate().collect()
}

/// Horizontal pixel offsets that keep markers of `diameter` from overlapping.
///
/// Points are placed in order of their vertical pixel position; each one
/// takes the free position closest to the category centre.
pub fn swarm_offsets(ys: &[f64], diameter: f64) -> Vec<f64> {
    let mut order: Vec<usize> = (0..ys.len()).collect();
    order.sort_by(|&a, &b| ys[a].total_cmp(&ys[b]));

    let mut offsets = vec![0.0; ys.len()];
    let mut placed: Vec<(f64, f64)> = Vec::with_capacity(ys.len());
    let min_dist = diameter * diameter - 1e-9;

    for idx in order {
        let y = ys[idx];
        let neighbours: Vec<(f64, f64)> = placed
            .iter()
            .copied()
            .filter(|(py, _)| (py - y).abs() < diameter)
            .collect();

        let mut candidates = vec![0.0];
        for (py, px) in &neighbours {
            let dy = py - y;
            let dx = (diameter * diameter - dy * dy).sqrt();
            candidates.push(px - dx);
            candidates.push(px + dx);
        }
        candidates.sort_by(|a: &f64, b: &f64| a.abs().total_cmp(&b.abs()).then(a.total_cmp(b)));

        let x = candidates
            .into_iter()
            .find(|x| {
                neighbours
                    .iter()
                    .all(|(py, px)| (px - x).powi(2) + (py - y).powi(2) >= min_dist)
            })
            .unwrap_or(0.0);
        offsets[idx] = x;
        placed.push((y, x));
    }
    offsets
}

fn draw_svg(path: &Path, figure: &Figure, config: &PlotConfig) -> anyhow::Result<()> {
    let root = SVGBackend::new(path, (config.width, config.height)).into_drawing_area();
    draw_figure_impl(&root, figure, config).context("Failed to draw genotype plot")?;
    root.present().context("Failed to write SVG")?;
    Ok(())
}

#[cfg(feature = "png")]
fn draw_png(path: &Path, figure: &Figure, config: &PlotConfig) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, (config.width, config.height)).into_drawing_area();
    draw_figure_impl(&root, figure, config).context("Failed to draw genotype plot")?;
    root.present().context("Failed to write PNG")?;
    Ok(())
}

fn draw_figure_impl<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    figure: &Figure,
    config: &PlotConfig,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let (plot_area, legend_area) = match figure.hue {
        Some(_) => {
            let (left, right) =
                root.split_horizontally(config.width.saturating_sub(LEGEND_WIDTH) as i32);
            (left, Some(right))
        }
        None => (root.clone(), None),
    };

    let k = figure.order.len().max(1) as f64;
    let (y_min, y_max) = figure.y_range;

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5..(k - 0.5), y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(figure.order.len().max(1))
        .x_label_formatter(&|_| String::new())
        .x_desc(figure.labels.x.as_str())
        .y_desc(figure.labels.y.as_str())
        .label_style(("sans-serif", 14).into_font().color(&BLACK))
        .axis_desc_style(("sans-serif", 16).into_font().color(&BLACK))
        .draw()?;

    // category ticks sit on the x axis, in pixel space
    let tick_style = ("sans-serif", 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Top));
    for (i, genotype) in figure.order.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(i as f64, y_min));
        plot_area.draw(&PathElement::new(vec![(px, py), (px, py + 5)], BLACK))?;
        plot_area.draw(&Text::new(genotype.as_str(), (px, py + 8), tick_style.clone()))?;
    }

    if config.point_size > 0 {
        let diameter = config.marker_diameter();
        let radius = ((diameter / 2.0).round() as u32).max(1);
        let unit = {
            let (x0, _) = chart.backend_coord(&(0.0, y_min));
            let (x1, _) = chart.backend_coord(&(1.0, y_min));
            (x1 - x0).max(1) as f64
        };
        let half_slot = unit * 0.4;
        let mut clamped = 0usize;

        for (i, category) in figure.categories.iter().enumerate() {
            let ys: Vec<f64> = category
                .markers
                .iter()
                .map(|m| chart.backend_coord(&(i as f64, m.value)).1 as f64)
                .collect();
            let offsets = swarm_offsets(&ys, diameter);

            for (marker, offset) in category.markers.iter().zip(offsets) {
                let offset = if offset.abs() > half_slot {
                    clamped += 1;
                    offset.signum() * half_slot
                } else {
                    offset
                };
                let x = i as f64 + offset / unit;
                let color = config.color(marker.color);
                chart.draw_series(std::iter::once(Circle::new(
                    (x, marker.value),
                    radius,
                    color.filled(),
                )))?;
            }
        }

        if clamped > 0 {
            warn!(
                "{} swarm points could not be placed without overlap; consider a smaller --point-size",
                clamped
            );
        }
    }

    let half_box = config.box_width / 2.0;
    let box_style = BOX_COLOR.stroke_width(1);
    for (i, category) in figure.categories.iter().enumerate() {
        let summary = match &category.summary {
            Some(summary) => summary,
            None => continue,
        };
        let x = i as f64;

        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - half_box, summary.q1), (x + half_box, summary.q3)],
            box_style,
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x - half_box, summary.median), (x + half_box, summary.median)],
            BOX_COLOR.stroke_width(2),
        )))?;

        let cap = half_box / 2.0;
        for (edge, whisker) in [(summary.q1, summary.whisker_low), (summary.q3, summary.whisker_high)] {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, edge), (x, whisker)],
                box_style,
            )))?;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x - cap, whisker), (x + cap, whisker)],
                box_style,
            )))?;
        }

        chart.draw_series(
            summary
                .outliers
                .iter()
                .map(|&v| Circle::new((x, v), 3, BOX_COLOR.stroke_width(1))),
        )?;
    }

    let tick = figure.bracket_step * 0.2;
    let star_style = ("sans-serif", 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    for (level, comparison) in &figure.brackets {
        let y = figure.bracket_base + figure.bracket_step * *level as f64;
        let (x1, x2) = (comparison.left_index as f64, comparison.right_index as f64);
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x1, y - tick), (x1, y), (x2, y), (x2, y - tick)],
            BLACK.stroke_width(1),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            comparison.stars,
            ((x1 + x2) / 2.0, y),
            star_style.clone(),
        )))?;
    }

    if let (Some(hue), Some(legend)) = (figure.hue, legend_area.as_ref()) {
        draw_legend(legend, hue, config)?;
    }

    info!(
        "Drew {} categories and {} significance brackets",
        figure.order.len(),
        figure.brackets.len()
    );
    Ok(())
}

fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    hue: &HueSpec,
    config: &PlotConfig,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let label_style = ("sans-serif", 13)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));

    area.draw(&Text::new(
        "Subpopulation",
        (10, 30),
        ("sans-serif", 14).into_font().color(&BLACK),
    ))?;
    for (j, level) in hue.levels.iter().enumerate() {
        let y = 60 + 22 * j as i32;
        area.draw(&Circle::new((18, y), 5, config.color(j).filled()))?;
        area.draw(&Text::new(level.as_str(), (30, y), label_style.clone()))?;
    }
    Ok(())
}
