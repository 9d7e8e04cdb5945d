use crate::join::{PlotRow, PlotTable};
use crate::parse::{parse_highlights, PhenotypeValue};
use crate::plot::*;
use crate::process::AnalysisError;
use crate::stats::{pairwise_comparisons, Comparison, Correction, StatTest};

use std::path::Path;

fn grouped_row(sample: &str, genotype: &str, value: f64, group: Option<&str>) -> PlotRow {
    PlotRow {
        sample: sample.to_string(),
        genotype: Some(genotype.to_string()),
        phenotype: Some(PhenotypeValue {
            raw: value.to_string(),
            value: Some(value),
        }),
        subpopulation: group.map(str::to_string),
    }
}

fn comparison(left_index: usize, right_index: usize) -> Comparison {
    Comparison {
        left: left_index.to_string(),
        right: right_index.to_string(),
        left_index,
        right_index,
        left_n: 3,
        right_n: 3,
        statistic: 0.0,
        p_value: 0.5,
        adjusted_p: 1.0,
        stars: "ns",
    }
}

/// Number of `<text>` elements whose content is exactly `text`.
fn svg_text_count(svg: &str, text: &str) -> usize {
    svg.matches(&format!(">\n{}\n</text>", text)).count()
}

fn labels() -> AxisLabels {
    AxisLabels {
        x: "Sbicolor v3 Chr01_1000".to_string(),
        y: "height".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path(Path::new("fig.svg")).unwrap(), OutputFormat::Svg);
        assert_eq!(OutputFormat::from_path(Path::new("fig.SVG")).unwrap(), OutputFormat::Svg);
        assert_eq!(OutputFormat::from_path(Path::new("figure")).unwrap(), OutputFormat::Svg);
        assert!(matches!(
            OutputFormat::from_path(Path::new("fig.pdf")),
            Err(AnalysisError::UnsupportedFormat(ref ext)) if ext == "pdf"
        ));
        if cfg!(feature = "png") {
            assert_eq!(OutputFormat::from_path(Path::new("fig.png")).unwrap(), OutputFormat::Png);
        } else {
            assert!(OutputFormat::from_path(Path::new("fig.png")).is_err());
        }
    }

    #[test]
    fn test_marker_diameter() {
        let config = PlotConfig {
            point_size: 72,
            ..PlotConfig::default()
        };
        assert!((config.marker_diameter() - 100.0).abs() < 1e-9);
        assert_eq!(PlotConfig::default().width, 800);
        assert_eq!(PlotConfig::default().height, 600);
    }

    #[test]
    fn test_swarm_offsets_do_not_overlap() {
        let ys = [100.0, 100.0, 100.0, 101.0, 150.0, 99.5];
        let diameter = 6.0;
        let offsets = swarm_offsets(&ys, diameter);
        assert_eq!(offsets.len(), ys.len());

        for i in 0..ys.len() {
            for j in (i + 1)..ys.len() {
                let d = ((offsets[i] - offsets[j]).powi(2) + (ys[i] - ys[j]).powi(2)).sqrt();
                assert!(d >= diameter - 1e-6, "points {} and {} overlap ({})", i, j, d);
            }
        }
        // an isolated point stays on the centre line
        assert_eq!(offsets[4], 0.0);
    }

    #[test]
    fn test_swarm_offsets_spread_identical_values() {
        let offsets = swarm_offsets(&[10.0, 10.0, 10.0], 4.0);
        let mut sorted = offsets.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(sorted, vec![-4.0, 0.0, 4.0]);
    }

    #[test]
    fn test_bracket_levels_stack_narrow_first() {
        let comparisons = vec![comparison(0, 1), comparison(0, 2), comparison(1, 2)];
        let levels = bracket_levels(&comparisons);
        let order: Vec<(usize, usize, usize)> = levels
            .iter()
            .map(|(level, c)| (*level, c.left_index, c.right_index))
            .collect();
        assert_eq!(order, vec![(0, 0, 1), (1, 1, 2), (2, 0, 2)]);
    }

    #[test]
    fn test_hue_levels() {
        let table = PlotTable::new(
            "height",
            vec![
                grouped_row("S1", "0/0", 1.0, Some("milo")),
                grouped_row("S2", "0/0", 2.0, Some("durra")),
                grouped_row("S3", "1/1", 3.0, Some("milo")),
            ],
        );
        let all = HueSpec::from_table(&table, &parse_highlights("all"));
        assert_eq!(all.levels, vec!["milo", "durra"]);

        let only = HueSpec::from_table(&table, &parse_highlights("durra,kafir"));
        assert_eq!(only.levels, vec!["other", "durra", "kafir"]);
        assert_eq!(only.index_of("kafir"), Some(2));
        assert_eq!(only.index_of("milo"), None);
    }

    #[test]
    fn test_render_plot_writes_svg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("figure.svg");
        let mut rows = Vec::new();
        for (g, genotype) in ["0/0", "0/1", "1/1"].iter().enumerate() {
            for k in 0..5 {
                let value = 10.0 * (g + 1) as f64 + 0.5 * k as f64;
                rows.push(grouped_row(&format!("S{}{}", g, k), genotype, value, None));
            }
        }
        let table = PlotTable::new("height", rows);
        let order = table.genotype_order();
        let comparisons =
            pairwise_comparisons(&table, &order, StatTest::TTestInd, Correction::Bonferroni).unwrap();
        assert_eq!(comparisons.len(), 3);
        assert!(comparisons.iter().all(|c| c.stars == "****"));

        render_plot(
            &table,
            &order,
            &comparisons,
            None,
            &labels(),
            &PlotConfig::default(),
            &path,
        )
        .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        for genotype in &order {
            assert_eq!(svg_text_count(&svg, genotype), 1, "tick label {}", genotype);
        }
        assert_eq!(svg_text_count(&svg, "****"), comparisons.len());
        assert_eq!(svg_text_count(&svg, &labels().x), 1);
        assert_eq!(svg_text_count(&svg, &labels().y), 1);
    }

    #[test]
    fn test_render_plot_with_hue_and_no_points() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("figure");
        let table = PlotTable::new(
            "height",
            vec![
                grouped_row("S1", "0/0", 10.0, Some("other")),
                grouped_row("S2", "1/1", 12.0, Some("durra")),
            ],
        );
        let hue = HueSpec::from_table(&table, &parse_highlights("durra"));
        let config = PlotConfig {
            point_size: 0,
            ..PlotConfig::default()
        };
        let order = table.genotype_order();

        render_plot(&table, &order, &[], Some(&hue), &labels(), &config, &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_render_plot_rejects_format_before_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("figure.pdf");
        let table = PlotTable::new("height", vec![grouped_row("S1", "0/0", 1.0, None)]);

        let result = render_plot(
            &table,
            &table.genotype_order(),
            &[],
            None,
            &labels(),
            &PlotConfig::default(),
            &path,
        );
        assert!(matches!(result, Err(AnalysisError::UnsupportedFormat(_))));
        assert!(!path.exists());
    }
}
