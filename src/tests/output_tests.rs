use super::write_file;
use crate::join::{PlotRow, PlotTable};
use crate::output::*;
use crate::parse::{GroupTable, PhenotypeValue, SamplesOfInterest};
use crate::process::AnalysisError;
use crate::stats::{Comparison, Correction, StatTest};

use std::path::PathBuf;

fn row(sample: &str, genotype: Option<&str>, raw: Option<&str>) -> PlotRow {
    PlotRow {
        sample: sample.to_string(),
        genotype: genotype.map(str::to_string),
        phenotype: raw.map(|r| PhenotypeValue {
            raw: r.to_string(),
            value: r.parse().ok(),
        }),
        subpopulation: None,
    }
}

fn sample_table() -> PlotTable {
    PlotTable::new(
        "height",
        vec![
            row("S1", Some("0/0"), Some("10")),
            row("S2", Some("0/1"), Some("NA")),
            row("S3", Some("1/1"), Some("30.5")),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_derived_csv_path() {
        assert_eq!(derived_csv_path("fig.svg"), PathBuf::from("fig.plot_df.csv"));
        assert_eq!(derived_csv_path("out/fig.svg"), PathBuf::from("out/fig.plot_df.csv"));
        assert_eq!(derived_csv_path("fig"), PathBuf::from("fig.plot_df.csv"));
        assert_eq!(derived_csv_path("fig.v2.svg"), PathBuf::from("fig.plot_df.csv"));
        assert_eq!(derived_csv_path("run.1/fig.svg"), PathBuf::from("run.plot_df.csv"));
    }

    #[test]
    fn test_write_plot_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fig.plot_df.csv");
        write_plot_table(&sample_table(), &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, ",Genotype,height\nS1,0/0,10\nS2,0/1,\nS3,1/1,30.5\n");
    }

    #[test]
    fn test_write_plot_table_with_groups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fig.plot_df.csv");

        let mut groups = GroupTable::default();
        groups.insert("S1", "durra");
        groups.insert("S0", "durra");
        let table = crate::join::attach_groups(
            sample_table(),
            &groups,
            &crate::parse::parse_highlights("durra"),
        );
        write_plot_table(&table, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            ",Genotype,height,Subpopulation\nS0,,,durra\nS1,0/0,10,durra\nS2,0/1,,other\nS3,1/1,30.5,other\n"
        );
    }

    #[test]
    fn test_report_samples_of_interest() {
        let dir = tempdir().unwrap();
        let soi = write_file(dir.path(), "soi.csv", "CommonName,CUSO,PI\nX,S2,PI1\nY,S3,PI2\n");
        let samples = SamplesOfInterest::from_path(&soi).unwrap();

        let mut out = Vec::new();
        report_samples_of_interest(&mut out, &sample_table(), &samples).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "X 0/1\nY 1/1\n");
    }

    #[test]
    fn test_report_samples_of_interest_missing_sample() {
        let dir = tempdir().unwrap();
        let soi = write_file(dir.path(), "soi.csv", "CommonName,CUSO,PI\nX,S2,PI1\nZ,S9,PI3\n");
        let samples = SamplesOfInterest::from_path(&soi).unwrap();

        let mut out = Vec::new();
        let result = report_samples_of_interest(&mut out, &sample_table(), &samples);
        assert!(matches!(result, Err(AnalysisError::SampleNotInTable(ref s)) if s == "S9"));
        // samples before the missing one were already reported
        assert_eq!(String::from_utf8(out).unwrap(), "X 0/1\n");
    }

    #[test]
    fn test_print_comparison_summary() {
        let comparisons = vec![Comparison {
            left: "0/0".to_string(),
            right: "1/1".to_string(),
            left_index: 0,
            right_index: 1,
            left_n: 3,
            right_n: 3,
            statistic: -3.674,
            p_value: 0.0213,
            adjusted_p: 0.0213,
            stars: "*",
        }];
        let mut out = Vec::new();
        print_comparison_summary(&mut out, StatTest::TTestInd, Correction::Uncorrected, &comparisons)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("p-value annotation legend:"));
        assert!(text.contains("****: p <= 1.00e-04"));
        assert!(text.contains("0/0 v.s. 1/1"));
        assert!(text.contains("2.130e-2"));

        let mut empty = Vec::new();
        print_comparison_summary(&mut empty, StatTest::Levene, Correction::Bonferroni, &[]).unwrap();
        assert!(String::from_utf8(empty).unwrap().contains("No pairwise comparisons"));
    }
}
