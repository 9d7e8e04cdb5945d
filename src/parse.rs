use crate::process::AnalysisError;
use crate::variants::Locus;

use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Literal accepted by `--highlights` to disable group filtering.
pub const ALL_GROUPS: &str = "all";

/// Phenotype cells read as missing values, besides the empty cell.
pub const NA_VALUES: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Splits `Chr01_1234` into chromosome and 1-based position.
pub fn parse_position(position: &str) -> Result<Locus, AnalysisError> {
    let parts: Vec<&str> = position.split('_').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(AnalysisError::InvalidPosition(position.to_string()));
    }

    let pos: u64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| AnalysisError::InvalidPosition(position.to_string()))?;
    if pos == 0 {
        return Err(AnalysisError::InvalidPosition(position.to_string()));
    }

    Ok(Locus {
        chrom: parts[0].to_string(),
        pos,
    })
}

/// Which subpopulations keep their own colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Highlights {
    All,
    Only(Vec<String>),
}

impl Highlights {
    pub fn allows(&self, group: &str) -> bool {
        match self {
            Highlights::All => true,
            Highlights::Only(groups) => groups.iter().any(|g| g == group),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Highlights::All)
    }
}

pub fn parse_highlights(value: &str) -> Highlights {
    if value == ALL_GROUPS {
        return Highlights::All;
    }
    let mut groups: Vec<String> = Vec::new();
    for group in value.split(',').map(str::trim).filter(|g| !g.is_empty()) {
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
    }
    Highlights::Only(groups)
}

/// A phenotype cell: the text as written plus its numeric value, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeValue {
    pub raw: String,
    pub value: Option<f64>,
}

impl PhenotypeValue {
    /// Empty cells and [`NA_VALUES`] are missing; anything else must be a number.
    pub fn parse(taxon: &str, raw: &str) -> Result<Self, AnalysisError> {
        let trimmed = raw.trim();
        let value = if trimmed.is_empty() || NA_VALUES.contains(&trimmed) {
            None
        } else {
            let parsed: f64 = trimmed
                .parse()
                .map_err(|_| AnalysisError::InvalidPhenotypeValue {
                    taxon: taxon.to_string(),
                    value: raw.to_string(),
                })?;
            if parsed.is_finite() {
                Some(parsed)
            } else {
                None
            }
        };
        Ok(PhenotypeValue {
            raw: raw.to_string(),
            value,
        })
    }
}

/// Phenotype CSV keyed by its first column.
#[derive(Debug, Clone)]
pub struct PhenotypeTable {
    path: PathBuf,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl PhenotypeTable {
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let file = File::open(path)?;
        Self::from_reader(file, path)
    }

    fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(AnalysisError::MalformedTable {
                path: path.to_path_buf(),
                line: 1,
                msg: "expected a key column and at least one phenotype column".to_string(),
            });
        }
        // the key column header is not a phenotype
        let columns: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

        let mut index = HashMap::new();
        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result?;
            let taxon = record.get(0).unwrap_or("").to_string();
            if index.contains_key(&taxon) {
                warn!(
                    "Duplicate taxon '{}' on line {} of {}; keeping the first entry",
                    taxon,
                    line_num + 2,
                    path.display()
                );
                continue;
            }
            index.insert(taxon, rows.len());
            rows.push(record.iter().skip(1).map(|c| c.to_string()).collect());
        }

        Ok(PhenotypeTable {
            path: path.to_path_buf(),
            columns,
            index,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selects one phenotype column as a taxon lookup, validating its values.
    pub fn column(&self, name: &str) -> Result<PhenotypeColumn, AnalysisError> {
        let col = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AnalysisError::UnknownPhenotype(name.to_string()))?;

        let mut values = HashMap::with_capacity(self.index.len());
        for (taxon, &row) in &self.index {
            let raw = self.rows[row].get(col).map(String::as_str).unwrap_or("");
            values.insert(taxon.clone(), PhenotypeValue::parse(taxon, raw)?);
        }

        Ok(PhenotypeColumn {
            name: name.to_string(),
            values,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PhenotypeColumn {
    pub name: String,
    values: HashMap<String, PhenotypeValue>,
}

impl PhenotypeColumn {
    pub fn get(&self, taxon: &str) -> Option<&PhenotypeValue> {
        self.values.get(taxon)
    }
}

/// Headerless `taxon,group` CSV, kept in file order.
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl GroupTable {
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut table = GroupTable::default();
        for (line_num, result) in reader.records().enumerate() {
            let record = result?;
            if record.len() != 2 {
                return Err(AnalysisError::MalformedTable {
                    path: path.to_path_buf(),
                    line: line_num + 1,
                    msg: format!("expected 2 fields (taxon,group), found {}", record.len()),
                });
            }
            let taxon = &record[0];
            if table.index.contains_key(taxon) {
                warn!(
                    "Duplicate taxon '{}' on line {} of {}; keeping the first group",
                    taxon,
                    line_num + 1,
                    path.display()
                );
                continue;
            }
            table.insert(taxon, &record[1]);
        }
        Ok(table)
    }

    pub fn insert(&mut self, taxon: &str, group: &str) {
        if self.index.contains_key(taxon) {
            return;
        }
        self.index.insert(taxon.to_string(), self.entries.len());
        self.entries.push((taxon.to_string(), group.to_string()));
    }

    pub fn get(&self, taxon: &str) -> Option<&str> {
        self.index
            .get(taxon)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, g)| (t.as_str(), g.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only taxa whose group is on the allow-list.
    pub fn restricted(&self, highlights: &Highlights) -> GroupTable {
        let mut table = GroupTable::default();
        for (taxon, group) in self.entries() {
            if highlights.allows(group) {
                table.insert(taxon, group);
            }
        }
        table
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOfInterest {
    pub key: String,
    pub common_name: String,
}

/// Samples to report, keyed by the file's second column.
#[derive(Debug, Clone, Default)]
pub struct SamplesOfInterest {
    entries: Vec<SampleOfInterest>,
}

impl SamplesOfInterest {
    pub fn from_path(path: &Path) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(AnalysisError::MalformedTable {
                path: path.to_path_buf(),
                line: 1,
                msg: "the second column is used as the sample key".to_string(),
            });
        }
        let name_col = headers
            .iter()
            .enumerate()
            .position(|(i, h)| i != 1 && h == "CommonName")
            .ok_or_else(|| AnalysisError::MissingColumn {
                column: "CommonName".to_string(),
                path: path.to_path_buf(),
            })?;

        let mut entries = Vec::new();
        for result in reader.records() {
            let record = result?;
            entries.push(SampleOfInterest {
                key: record.get(1).unwrap_or("").to_string(),
                common_name: record.get(name_col).unwrap_or("").to_string(),
            });
        }
        Ok(SamplesOfInterest { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleOfInterest> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
