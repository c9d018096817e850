//! VCF 4.2 output: writes `VariantCall`s with the custom INFO fields this
//! pipeline defines (§6) -- `bio`/`needletail` have no VCF writer, so this is
//! a small hand-rolled formatter in the teacher's `io`-module streaming style.

use crate::bio::kmer::kmer_to_string;
use crate::error::PipelineError;
use crate::types::VariantCall;
use std::io::Write;

const INFO_HEADERS: &[&str] = &[
    r#"##INFO=<ID=RW,Number=.,Type=String,Description="Reference window k-mers spanning the variant locus">"#,
    r#"##INFO=<ID=VW,Number=.,Type=String,Description="Variant window k-mers spanning the variant locus">"#,
    r#"##INFO=<ID=ALTWINDOW,Number=1,Type=Integer,Description="Count of variant window k-mers">"#,
    r#"##INFO=<ID=REFRWINDOW,Number=1,Type=Integer,Description="Count of reference window k-mers">"#,
    r#"##INFO=<ID=LIKESCORE,Number=1,Type=Float,Description="De novo genotype log-likelihood score">"#,
    r#"##INFO=<ID=CALLCLASS,Number=1,Type=String,Description="Variant kind (SNV/INSERTION/DELETION/MNV)">"#,
];

const FILTER_HEADERS: &[&str] = &[
    r#"##FILTER=<ID=PASS,Description="All filters passed">"#,
    r#"##FILTER=<ID=LikelihoodFail,Description="De novo log-likelihood score is negative">"#,
    r#"##FILTER=<ID=ControlAbundance,Description="Supporting k-mer abundant in a control sample">"#,
    r#"##FILTER=<ID=AbundMismatch,Description="Case abundance inconsistent across the variant locus">"#,
    r#"##FILTER=<ID=NoReferenceMatch,Description="Contig could not be localized to the reference">"#,
    r#"##FILTER=<ID=PartitionTooSmall,Description="Partition dropped below the minimum read count">"#,
    r#"##FILTER=<ID=Homopolymer,Description="Variant falls within a homopolymer run">"#,
    r#"##FILTER=<ID=ContigEndTooClose,Description="Variant too close to a contig end">"#,
];

/// Streaming VCF 4.2 writer. Holds no buffered records; the caller sorts
/// calls by `(seqid, pos)` before writing if a sorted file is required (§5:
/// "the writer sorts by (seqid, pos) if requested").
pub struct VcfWriter<W: Write> {
    out: W,
    k: usize,
}

impl<W: Write> VcfWriter<W> {
    pub fn new(mut out: W, sample_name: &str, k: usize) -> std::io::Result<Self> {
        writeln!(out, "##fileformat=VCFv4.2")?;
        writeln!(out, "##source=denovo_kmer")?;
        for header in INFO_HEADERS {
            writeln!(out, "{header}")?;
        }
        for header in FILTER_HEADERS {
            writeln!(out, "{header}")?;
        }
        writeln!(
            out,
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{sample_name}"
        )?;
        Ok(VcfWriter { out, k })
    }

    pub fn write_call(&mut self, call: &VariantCall) -> Result<(), PipelineError> {
        let rw: Vec<String> = call
            .reference_window_kmers
            .iter()
            .map(|k| kmer_to_string(*k, self.k))
            .collect();
        let vw: Vec<String> = call
            .variant_window_kmers
            .iter()
            .map(|k| kmer_to_string(*k, self.k))
            .collect();

        let ref_allele = String::from_utf8_lossy(&call.ref_allele);
        let alt_allele = String::from_utf8_lossy(&call.alt_allele);
        let filter_field = if call.filters.is_empty() {
            "PASS".to_string()
        } else {
            call.filters.join(";")
        };
        let info = format!(
            "RW={};VW={};ALTWINDOW={};REFRWINDOW={};LIKESCORE={:.4};CALLCLASS={}",
            rw.join(","),
            vw.join(","),
            vw.len(),
            rw.len(),
            call.likelihood,
            call.kind
        );

        writeln!(
            self.out,
            "{}\t{}\t.\t{}\t{}\t.\t{}\t{}\tGT\t0/1",
            call.seqid,
            call.pos + 1, // VCF positions are 1-based
            ref_allele,
            alt_allele,
            filter_field,
            info
        )
        .map_err(PipelineError::Io)
    }
}
