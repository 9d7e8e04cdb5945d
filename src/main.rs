use clap::Parser;
use colored::*;
use env_logger::Builder;
use genopheno::process::{run, AnalysisError, Args};
use log::{info, LevelFilter};

fn main() -> Result<(), AnalysisError> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    info!("VCF: {}", args.gzvcf);
    info!("Phenotype file: {} (column {})", args.phenotype_file, args.phenotype);
    info!("Position: {}", args.position);
    info!("Test: {}", args.test);

    let summary = run(&args)?;

    println!(
        "{}",
        format!(
            "Plotted {} samples in {} genotype classes ({} comparisons): {} and {}",
            summary.rows,
            summary.categories.len(),
            summary.comparisons,
            summary.figure.display(),
            summary.table.display()
        )
        .green()
    );
    Ok(())
}
