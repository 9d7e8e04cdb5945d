use crate::process::AnalysisError;

use log::{debug, info, warn};
use rust_htslib::bcf::record::{GenotypeAllele, Numeric};
use rust_htslib::bcf::{IndexedReader, Read, Record};
use std::path::{Path, PathBuf};

/// Normalized genotype of a sample with no call.
pub const MISSING_CALL: &str = "./.";

/// Decompression threads handed to htslib when reading the VCF.
pub const READER_THREADS: usize = 4;

/// Fixed VCF columns kept in a [`VariantTable`], before the sample columns.
pub const FIXED_COLUMNS: [&str; 7] = ["#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER"];

/// A chromosome and a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    pub chrom: String,
    pub pos: u64,
}

/// One VCF record with its per-sample calls already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRow {
    pub chrom: String,
    pub pos: u64,
    pub id: String,
    pub reference: String,
    pub alternates: String,
    pub qual: String,
    pub filter: String,
    /// One normalized genotype per sample, in header order.
    pub calls: Vec<String>,
}

/// Records overlapping a query, one row per record and one call column per sample.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    samples: Vec<String>,
    rows: Vec<VariantRow>,
}

impl VariantTable {
    pub fn new(samples: Vec<String>) -> Self {
        VariantTable {
            samples,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: VariantRow) -> Result<(), AnalysisError> {
        if row.calls.len() != self.samples.len() {
            return Err(AnalysisError::MalformedRecord(format!(
                "record at {}:{} has {} calls for {} samples",
                row.chrom,
                row.pos,
                row.calls.len(),
                self.samples.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn rows(&self) -> &[VariantRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names: the fixed VCF fields followed by the sample names.
    pub fn columns(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.samples.iter().cloned())
            .collect()
    }

    /// Returns the record whose CHROM and POS equal the locus exactly.
    ///
    /// When several records share the position (duplicated lines, split
    /// multi-allelics) the first one in file order is used.
    pub fn select_locus(&self, locus: &Locus) -> Result<&VariantRow, AnalysisError> {
        let mut matches = self
            .rows
            .iter()
            .filter(|row| row.chrom == locus.chrom && row.pos == locus.pos);

        let first = matches.next().ok_or_else(|| AnalysisError::LocusNotFound {
            chrom: locus.chrom.clone(),
            pos: locus.pos,
        })?;

        let extra = matches.count();
        if extra > 0 {
            warn!(
                "{} records found at {}:{}; using the first (REF {} ALT {})",
                extra + 1,
                locus.chrom,
                locus.pos,
                first.reference,
                first.alternates
            );
        }
        Ok(first)
    }
}

/// Keeps the leading colon-delimited field and unphases it: `0|1:30:99` becomes `0/1`.
pub fn normalize_call(cell: &str) -> String {
    cell.split(':').next().unwrap_or("").replace('|', "/")
}

/// Renders GT alleles as VCF text, e.g. `0|1` or `./.`.
///
/// htslib pads lower-ploidy calls with a vector-end sentinel which decodes to a
/// negative allele index; those entries are skipped.
pub fn format_genotype(alleles: &[GenotypeAllele]) -> String {
    let mut text = String::new();
    let present = alleles.iter().filter(|allele| {
        !matches!(allele, GenotypeAllele::Phased(i) | GenotypeAllele::Unphased(i) if *i < 0)
    });

    for (n, allele) in present.enumerate() {
        if n > 0 {
            let sep = match allele {
                GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing => '|',
                GenotypeAllele::Unphased(_) | GenotypeAllele::UnphasedMissing => '/',
            };
            text.push(sep);
        }
        match allele.index() {
            Some(index) => text.push_str(&index.to_string()),
            None => text.push('.'),
        }
    }

    if text.is_empty() {
        text.push('.');
    }
    text
}

/// The companion index htslib looks for next to a bgzipped VCF.
pub fn tabix_index_path(path: &Path) -> PathBuf {
    let mut index = path.as_os_str().to_owned();
    index.push(".tbi");
    PathBuf::from(index)
}

/// Fetches every record overlapping `[pos, pos + 1]` on the locus chromosome.
///
/// A chromosome that the VCF header does not know yields an empty table.
pub fn extract_locus(path: &Path, locus: &Locus) -> Result<VariantTable, AnalysisError> {
    let index = tabix_index_path(path);
    if !index.exists() {
        return Err(AnalysisError::MissingIndex(index));
    }

    let mut reader = IndexedReader::from_path(path)?;
    reader.set_threads(READER_THREADS)?;

    let samples: Vec<String> = reader
        .header()
        .samples()
        .iter()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    info!("Opened {} ({} samples)", path.display(), samples.len());

    let mut table = VariantTable::new(samples);

    let rid = match reader.header().name2rid(locus.chrom.as_bytes()) {
        Ok(rid) => rid,
        Err(_) => {
            warn!("Contig {} is not declared in {}", locus.chrom, path.display());
            return Ok(table);
        }
    };

    // fetch takes 0-based inclusive bounds
    let start = locus.pos.saturating_sub(1);
    reader.fetch(rid, start, Some(locus.pos))?;

    for result in reader.records() {
        let record = result?;
        let row = variant_row(&record)?;
        debug!("Record {}:{} {}>{}", row.chrom, row.pos, row.reference, row.alternates);
        table.push(row)?;
    }

    info!(
        "{} record(s) overlap {}:{}-{}",
        table.len(),
        locus.chrom,
        locus.pos,
        locus.pos + 1
    );
    Ok(table)
}

fn variant_row(record: &Record) -> Result<VariantRow, AnalysisError> {
    let header = record.header();

    let chrom = match record.rid() {
        Some(rid) => String::from_utf8_lossy(header.rid2name(rid)?).into_owned(),
        None => ".".to_string(),
    };

    let alleles = record.alleles();
    let reference = alleles
        .first()
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .unwrap_or_else(|| ".".to_string());
    let alternates = if alleles.len() > 1 {
        alleles[1..]
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect::<Vec<_>>()
            .join(",")
    } else {
        ".".to_string()
    };

    let qual = if record.qual().is_missing() {
        ".".to_string()
    } else {
        record.qual().to_string()
    };

    let filters: Vec<String> = record
        .filters()
        .map(|id| String::from_utf8_lossy(&header.id_to_name(id)).into_owned())
        .collect();
    let filter = if filters.is_empty() {
        ".".to_string()
    } else {
        filters.join(";")
    };

    let genotypes = record.genotypes()?;
    let calls = (0..record.sample_count() as usize)
        .map(|i| normalize_call(&format_genotype(&genotypes.get(i))))
        .collect();

    Ok(VariantRow {
        chrom,
        pos: (record.pos() + 1) as u64,
        id: String::from_utf8_lossy(&record.id()).into_owned(),
        reference,
        alternates,
        qual,
        filter,
        calls,
    })
}
