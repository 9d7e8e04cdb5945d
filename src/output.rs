use crate::join::PlotTable;
use crate::parse::SamplesOfInterest;
use crate::process::AnalysisError;
use crate::stats::{Comparison, Correction, StatTest};

use colored::*;
use prettytable::{row, Table};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the plot table written next to the figure.
pub const PLOT_TABLE_SUFFIX: &str = ".plot_df.csv";

/// Everything before the first `.` of the output argument, plus the suffix.
///
/// `results/fig.svg` gives `results/fig.plot_df.csv`; note that a dot in a
/// directory name cuts the path there.
pub fn derived_csv_path(output: &str) -> PathBuf {
    let stem = output.split('.').next().unwrap_or(output);
    PathBuf::from(format!("{}{}", stem, PLOT_TABLE_SUFFIX))
}

/// Snapshot of the plotted table: sample, Genotype, phenotype and, when
/// groups were merged, Subpopulation. Absent and missing cells are left empty.
pub fn write_plot_table(table: &PlotTable, path: &Path) -> Result<(), AnalysisError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["", "Genotype", table.phenotype()];
    if table.has_groups() {
        header.push("Subpopulation");
    }
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![
            row.sample.as_str(),
            row.genotype.as_deref().unwrap_or(""),
            row.phenotype
                .as_ref()
                .filter(|p| p.value.is_some())
                .map(|p| p.raw.as_str())
                .unwrap_or(""),
        ];
        if table.has_groups() {
            record.push(row.subpopulation.as_deref().unwrap_or(""));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Prints `<CommonName> <Genotype>` for every listed sample.
///
/// Fails on the first sample that has no genotype in the plotted table.
pub fn report_samples_of_interest<W: Write>(
    out: &mut W,
    table: &PlotTable,
    samples: &SamplesOfInterest,
) -> Result<(), AnalysisError> {
    for sample in samples.iter() {
        let genotype = table
            .get(&sample.key)
            .and_then(|row| row.genotype.as_deref())
            .ok_or_else(|| AnalysisError::SampleNotInTable(sample.key.clone()))?;
        writeln!(out, "{} {}", sample.common_name, genotype)?;
    }
    Ok(())
}

/// Star legend followed by one table row per comparison.
pub fn print_comparison_summary<W: Write>(
    out: &mut W,
    test: StatTest,
    correction: Correction,
    comparisons: &[Comparison],
) -> Result<(), AnalysisError> {
    writeln!(out, "{}", "p-value annotation legend:".bold())?;
    writeln!(out, "ns: 5.00e-02 < p <= 1.00e+00")?;
    writeln!(out, "*: 1.00e-02 < p <= 5.00e-02")?;
    writeln!(out, "**: 1.00e-03 < p <= 1.00e-02")?;
    writeln!(out, "***: 1.00e-04 < p <= 1.00e-03")?;
    writeln!(out, "****: p <= 1.00e-04")?;

    if comparisons.is_empty() {
        writeln!(out, "{}", "No pairwise comparisons to annotate.".yellow())?;
        return Ok(());
    }

    writeln!(
        out,
        "\n{}",
        format!("{} with {} correction:", test.description(), correction)
            .green()
            .bold()
    )?;

    let mut table = Table::new();
    table.add_row(row![
        "Pair", "n", "Statistic", "P_val", "Adjusted P_val", "Annotation"
    ]);
    for c in comparisons {
        table.add_row(row![
            format!("{} v.s. {}", c.left, c.right),
            format!("{} / {}", c.left_n, c.right_n),
            format!("{:.3}", c.statistic),
            format!("{:.3e}", c.p_value),
            format!("{:.3e}", c.adjusted_p),
            c.stars
        ]);
    }
    table.print(out)?;
    Ok(())
}
