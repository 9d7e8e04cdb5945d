mod output_tests;
mod plot_tests;

use rust_htslib::bcf::index::{self, Type};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) const VCF_HEADER: &str = "\
##fileformat=VCFv4.2
##contig=<ID=Chr01,length=100000>
##contig=<ID=Chr02,length=100000>
##FILTER=<ID=LowQual,Description=\"Low quality\">
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\tS4
";

/// Three records on Chr01 (two of them adjacent) and one on Chr02.
pub(crate) const VCF_BODY: &str = "\
Chr01\t1000\tsnp1\tA\tG\t50\tPASS\t.\tGT:DP\t0|0:10\t0|1:12\t1|1:8\t./.:0
Chr01\t1001\tsnp2\tC\tT,G\t.\tLowQual\t.\tGT\t0/0\t0/2\t0/1\t1/1
Chr01\t5000\tsnp3\tG\tA\t30\tPASS\t.\tGT\t0/0\t1/1\t0/1\t0/0
Chr02\t1000\tsnp4\tT\tC\t20\tPASS\t.\tGT\t1/1\t1/1\t0/0\t0/1
";

/// Writes a bgzipped VCF plus its `.tbi` into `dir`.
pub(crate) fn write_indexed_vcf(dir: &Path, body: &str) -> PathBuf {
    let vcf_path = dir.join("test.vcf.gz");
    {
        let mut writer =
            rust_htslib::bgzf::Writer::from_path(&vcf_path).expect("Failed to open bgzf writer");
        writer
            .write_all(VCF_HEADER.as_bytes())
            .expect("Failed to write VCF header");
        writer
            .write_all(body.as_bytes())
            .expect("Failed to write VCF records");
    }
    let tbi_path = dir.join("test.vcf.gz.tbi");
    index::build(&vcf_path, Some(&tbi_path), 1u32, Type::Tbx).expect("Failed to build tabix index");
    vcf_path
}

/// Writes `contents` to `dir/name` and returns the path.
pub(crate) fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Scratch directory without a dot in its name; the plot table path is cut
/// at the first dot of the figure path.
pub(crate) fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("genopheno")
        .tempdir()
        .expect("Failed to create scratch directory")
}
