use crate::parse::{GroupTable, Highlights, PhenotypeTable, PhenotypeValue};
use crate::process::AnalysisError;
use crate::variants::{Locus, VariantTable, MISSING_CALL};

use itertools::Itertools;
use log::info;
use std::collections::BTreeMap;

/// Subpopulation given to taxa outside the highlighted groups.
pub const FALLBACK_GROUP: &str = "other";

/// One sample of the plotted table.
///
/// `genotype` and `phenotype` are empty only for taxa brought in by an outer
/// join with the group table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRow {
    pub sample: String,
    pub genotype: Option<String>,
    pub phenotype: Option<PhenotypeValue>,
    pub subpopulation: Option<String>,
}

impl PlotRow {
    /// Numeric phenotype, if the row has one.
    pub fn value(&self) -> Option<f64> {
        self.phenotype.as_ref().and_then(|p| p.value)
    }
}

#[derive(Debug, Clone)]
pub struct PlotTable {
    phenotype: String,
    rows: Vec<PlotRow>,
    grouped: bool,
}

impl PlotTable {
    pub fn new(phenotype: &str, rows: Vec<PlotRow>) -> Self {
        PlotTable {
            phenotype: phenotype.to_string(),
            rows,
            grouped: false,
        }
    }

    pub fn phenotype(&self) -> &str {
        &self.phenotype
    }

    pub fn rows(&self) -> &[PlotRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that are drawn: a genotype call and a numeric phenotype.
    pub fn plotted_len(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.genotype.is_some() && row.value().is_some())
            .count()
    }

    /// True once a group table has been merged in.
    pub fn has_groups(&self) -> bool {
        self.grouped
    }

    pub fn get(&self, sample: &str) -> Option<&PlotRow> {
        self.rows.iter().find(|row| row.sample == sample)
    }

    /// Distinct genotypes, sorted lexicographically.
    pub fn genotype_order(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.genotype.clone())
            .sorted()
            .dedup()
            .collect()
    }

    /// Numeric phenotype values of one genotype class, in table order.
    pub fn values_for(&self, genotype: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|row| row.genotype.as_deref() == Some(genotype))
            .filter_map(PlotRow::value)
            .collect()
    }
}

/// How group labels are merged into the plot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Keep only samples present in both tables, in plot table order.
    Inner,
    /// Keep every key of both tables, sorted by key, filling absent labels.
    OuterWithFallback(&'static str),
}

/// Transposes the record at `locus` into one row per sample and inner-joins
/// it with the selected phenotype column, dropping missing calls.
pub fn build_plot_table(
    variants: &VariantTable,
    locus: &Locus,
    phenotypes: &PhenotypeTable,
    phenotype: &str,
) -> Result<PlotTable, AnalysisError> {
    let column = phenotypes.column(phenotype)?;
    let record = variants.select_locus(locus)?;

    let mut rows = Vec::new();
    let mut missing = 0usize;
    for (sample, call) in variants.samples().iter().zip(&record.calls) {
        let value = match column.get(sample) {
            Some(value) => value,
            None => continue,
        };
        if call == MISSING_CALL {
            missing += 1;
            continue;
        }
        rows.push(PlotRow {
            sample: sample.clone(),
            genotype: Some(call.clone()),
            phenotype: Some(value.clone()),
            subpopulation: None,
        });
    }

    info!(
        "{} of {} VCF samples have a phenotype and a genotype call ({} missing calls dropped)",
        rows.len(),
        variants.samples().len(),
        missing
    );
    Ok(PlotTable::new(phenotype, rows))
}

/// Merges subpopulation labels with the policy implied by `highlights`.
pub fn attach_groups(table: PlotTable, groups: &GroupTable, highlights: &Highlights) -> PlotTable {
    match highlights {
        Highlights::All => merge_groups(table, groups, JoinPolicy::Inner),
        Highlights::Only(_) => merge_groups(
            table,
            &groups.restricted(highlights),
            JoinPolicy::OuterWithFallback(FALLBACK_GROUP),
        ),
    }
}

pub fn merge_groups(table: PlotTable, groups: &GroupTable, policy: JoinPolicy) -> PlotTable {
    let PlotTable { phenotype, rows, .. } = table;

    let rows = match policy {
        JoinPolicy::Inner => rows
            .into_iter()
            .filter_map(|mut row| {
                let group = groups.get(&row.sample)?;
                row.subpopulation = Some(group.to_string());
                Some(row)
            })
            .collect(),
        JoinPolicy::OuterWithFallback(fallback) => {
            let mut merged: BTreeMap<String, PlotRow> = BTreeMap::new();
            for mut row in rows {
                row.subpopulation = Some(
                    groups
                        .get(&row.sample)
                        .unwrap_or(fallback)
                        .to_string(),
                );
                merged.insert(row.sample.clone(), row);
            }
            for (taxon, group) in groups.entries() {
                merged.entry(taxon.to_string()).or_insert_with(|| PlotRow {
                    sample: taxon.to_string(),
                    genotype: None,
                    phenotype: None,
                    subpopulation: Some(group.to_string()),
                });
            }
            merged.into_values().collect()
        }
    };

    PlotTable {
        phenotype,
        rows,
        grouped: true,
    }
}
