use crate::join::{attach_groups, build_plot_table};
use crate::output::{
    derived_csv_path, print_comparison_summary, report_samples_of_interest, write_plot_table,
};
use crate::parse::{parse_highlights, parse_position, GroupTable, PhenotypeTable, SamplesOfInterest};
use crate::plot::{render_plot, AxisLabels, HueSpec, PlotConfig};
use crate::stats::{pairwise_comparisons, Correction, StatTest};
use crate::variants::extract_locus;

use clap::Parser;
use colored::*;
use log::{info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

// Define command-line arguments using clap
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Plot the distribution of a phenotype for every genotype found at one position of a tabix-indexed VCF",
    long_about = None
)]
pub struct Args {
    /// bgzip-compressed VCF; must be tabix indexed (<file>.tbi)
    #[arg(long = "gzvcf")]
    pub gzvcf: String,

    /// CSV of phenotypes with taxa in the first column. A header row is required
    #[arg(long = "phenotype-file")]
    pub phenotype_file: String,

    /// Phenotype column to use from the phenotype file
    #[arg(long = "phenotype")]
    pub phenotype: String,

    /// Position of interest in Chr01_Position format (or whatever matches the VCF)
    #[arg(long = "position")]
    pub position: String,

    /// Output figure; the plotted table is written next to it as <stem>.plot_df.csv
    #[arg(long = "output")]
    pub output: String,

    /// Test type: t-test_ind, t-test_welch, t-test_paired, Mann-Whitney,
    /// Mann-Whitney-gt, Mann-Whitney-ls, Levene, Wilcoxon, Kruskal
    #[arg(long = "test", default_value = "t-test_ind")]
    pub test: String,

    /// Size of the swarm points. 0 removes the points
    #[arg(long = "point-size", default_value_t = 2)]
    pub point_size: u32,

    /// CSV without header containing taxa,groupid
    #[arg(long = "groups")]
    pub groups: Option<String>,

    /// Comma-separated list of groups to highlight, e.g. durra,milo
    #[arg(long = "highlights", default_value = "all")]
    pub highlights: String,

    /// Gene name put in front of the position on the x axis
    #[arg(long = "geneid", default_value = "Sbicolor v3")]
    pub geneid: String,

    /// CSV of samples whose genotype is printed. Header (CommonName,CUSO,PI); the second column is the sample key
    #[arg(long = "sample-of-interest")]
    pub sample_of_interest: Option<String>,

    /// Multiple-comparison correction applied to the pairwise p-values
    #[arg(long = "correction", value_enum, default_value_t = Correction::Bonferroni)]
    pub correction: Correction,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("Invalid position '{0}': expected <chromosome>_<position>")]
    InvalidPosition(String),

    #[error("Missing tabix index {0}")]
    MissingIndex(PathBuf),

    #[error("Malformed VCF record: {0}")]
    MalformedRecord(String),

    #[error("No variant found at {chrom}:{pos}")]
    LocusNotFound { chrom: String, pos: u64 },

    #[error("Phenotype column '{0}' not found in phenotype file")]
    UnknownPhenotype(String),

    #[error("Non-numeric phenotype value '{value}' for taxon '{taxon}'")]
    InvalidPhenotypeValue { taxon: String, value: String },

    #[error("Malformed table {path}, line {line}: {msg}")]
    MalformedTable { path: PathBuf, line: usize, msg: String },

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Unsupported test '{0}'. Valid tests: {1}")]
    UnsupportedTest(String, String),

    #[error("Statistics error: {0}")]
    Stats(String),

    #[error("Sample of interest '{0}' is not in the plotted table")]
    SampleNotInTable(String),

    #[error("Unsupported figure format '{0}'")]
    UnsupportedFormat(String),

    #[error("Plotting error: {0}")]
    Plot(String),
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Samples drawn; group-only rows and missing phenotypes are not counted.
    pub rows: usize,
    pub categories: Vec<String>,
    pub comparisons: usize,
    pub figure: PathBuf,
    pub table: PathBuf,
}

pub fn run(args: &Args) -> Result<RunSummary, AnalysisError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    run_with_writer(args, &mut handle)
}

/// Runs the whole pipeline, writing the human-facing report to `out`.
pub fn run_with_writer<W: Write>(args: &Args, out: &mut W) -> Result<RunSummary, AnalysisError> {
    writeln!(out, "{}", "Starting genotype/phenotype analysis...".green())?;

    let locus = parse_position(&args.position)?;
    info!("Locus: {}:{}", locus.chrom, locus.pos);

    let phenotypes = PhenotypeTable::from_path(Path::new(&args.phenotype_file))?;
    info!(
        "Loaded {} taxa from {}",
        phenotypes.len(),
        args.phenotype_file
    );

    let variant_table = extract_locus(Path::new(&args.gzvcf), &locus)?;
    let mut plot_table = build_plot_table(&variant_table, &locus, &phenotypes, &args.phenotype)?;

    let order = plot_table.genotype_order();
    info!(
        "{} samples with a genotype call and phenotype; genotypes: {}",
        plot_table.len(),
        order.join(", ")
    );
    if order.len() < 2 {
        warn!(
            "Only {} genotype class(es) at {}; no pairwise comparison is possible",
            order.len(),
            args.position
        );
    }

    let hue = match args.groups.as_ref() {
        Some(groups_path) => {
            let highlights = parse_highlights(&args.highlights);
            let groups = GroupTable::from_path(Path::new(groups_path))?;
            plot_table = attach_groups(plot_table, &groups, &highlights);
            info!("{} rows after joining groups from {}", plot_table.len(), groups_path);
            Some(HueSpec::from_table(&plot_table, &highlights))
        }
        None => None,
    };

    let test: StatTest = args.test.parse()?;
    let comparisons = pairwise_comparisons(&plot_table, &order, test, args.correction)?;
    print_comparison_summary(out, test, args.correction, &comparisons)?;

    let config = PlotConfig {
        point_size: args.point_size,
        ..PlotConfig::default()
    };
    let labels = AxisLabels {
        x: format!("{} {}", args.geneid, args.position),
        y: args.phenotype.clone(),
    };
    let figure = PathBuf::from(&args.output);
    render_plot(
        &plot_table,
        &order,
        &comparisons,
        hue.as_ref(),
        &labels,
        &config,
        &figure,
    )?;
    info!("Figure written to {}", figure.display());

    let table = derived_csv_path(&args.output);
    write_plot_table(&plot_table, &table)?;
    info!("Plot table written to {}", table.display());

    if let Some(soi_path) = args.sample_of_interest.as_ref() {
        let samples = SamplesOfInterest::from_path(Path::new(soi_path))?;
        report_samples_of_interest(out, &plot_table, &samples)?;
    }

    Ok(RunSummary {
        rows: plot_table.plotted_len(),
        categories: order,
        comparisons: comparisons.len(),
        figure,
        table,
    })
}
