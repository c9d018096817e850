//! Shared data model: reads, partitions, contigs, reference windows, and
//! variant calls, passed between pipeline stages as plain owned values.

use crate::bio::kmer::EncodedKmer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single k-mer annotation attached to a read, contig, or window offset:
/// `(offset, canonical_kmer, abundances)` where `abundances[0]` is the case
/// count and `abundances[1..]` are per-control counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmerAnnotation {
    pub offset: usize,
    pub kmer: EncodedKmer,
    pub abundances: Vec<u16>,
}

impl KmerAnnotation {
    pub fn case_abundance(&self) -> u16 {
        self.abundances.first().copied().unwrap_or(0)
    }

    pub fn control_abundances(&self) -> &[u16] {
        &self.abundances[1.min(self.abundances.len())..]
    }
}

/// A raw sequencing read, optionally paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub id: String,
    pub sequence: Vec<u8>,
    pub qualities: Option<Vec<u8>>,
    pub mate_refs: Vec<String>,
}

/// A read annotated with the novel k-mers it carries, in ascending offset order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedRead {
    pub read: Read,
    pub novel_kmers: Vec<KmerAnnotation>,
}

impl AugmentedRead {
    pub fn sequence(&self) -> &[u8] {
        &self.read.sequence
    }

    pub fn id(&self) -> &str {
        &self.read.id
    }

    pub fn is_empty_annotation(&self) -> bool {
        self.novel_kmers.is_empty()
    }
}

/// A connected component of reads sharing novel k-mers, transitively.
#[derive(Debug, Clone)]
pub struct Partition {
    pub label: String,
    pub reads: Vec<AugmentedRead>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Total count of novel k-mer occurrences across every read in the partition.
    pub fn total_novel_kmers(&self) -> usize {
        self.reads.iter().map(|r| r.novel_kmers.len()).sum()
    }
}

/// An assembled sequence, with its supporting read ids and k-mer annotations
/// projected to contig coordinates.
#[derive(Debug, Clone)]
pub struct Contig {
    pub partition_label: String,
    pub sequence: Vec<u8>,
    pub support: Vec<String>,
    pub novel_kmers: Vec<KmerAnnotation>,
}

impl Contig {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// A slice of the reference extracted around seed matches.
#[derive(Debug, Clone)]
pub struct ReferenceWindow {
    pub seqid: String,
    pub start: u64,
    pub end: u64,
    pub sequence: Vec<u8>,
}

impl ReferenceWindow {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKind {
    Snv,
    Insertion,
    Deletion,
    Mnv,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariantKind::Snv => "SNV",
            VariantKind::Insertion => "INSERTION",
            VariantKind::Deletion => "DELETION",
            VariantKind::Mnv => "MNV",
        };
        f.write_str(s)
    }
}

/// A single emitted variant, already populated with the RW/VW k-mer sets
/// and its genotype likelihood score, ready to render as a VCF record.
#[derive(Debug, Clone)]
pub struct VariantCall {
    pub seqid: String,
    pub pos: u64,
    pub ref_allele: Vec<u8>,
    pub alt_allele: Vec<u8>,
    pub kind: VariantKind,
    pub supporting_kmers: Vec<EncodedKmer>,
    pub reference_window_kmers: Vec<EncodedKmer>,
    pub variant_window_kmers: Vec<EncodedKmer>,
    pub likelihood: f64,
    pub filters: Vec<String>,
}

impl VariantCall {
    pub fn passes(&self) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f == "PASS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmer_annotation_splits_case_and_control() {
        let annotation = KmerAnnotation {
            offset: 0,
            kmer: EncodedKmer(0),
            abundances: vec![10, 0, 1],
        };
        assert_eq!(annotation.case_abundance(), 10);
        assert_eq!(annotation.control_abundances(), &[0, 1]);
    }

    #[test]
    fn test_partition_len_and_total_novel_kmers() {
        let read = AugmentedRead {
            read: Read {
                id: "r1".into(),
                sequence: b"ACGT".to_vec(),
                qualities: None,
                mate_refs: vec![],
            },
            novel_kmers: vec![KmerAnnotation {
                offset: 0,
                kmer: EncodedKmer(0),
                abundances: vec![9],
            }],
        };
        let partition = Partition {
            label: "cc0".into(),
            reads: vec![read],
        };
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.total_novel_kmers(), 1);
    }

    #[test]
    fn test_variant_call_passes() {
        let mut call = VariantCall {
            seqid: "chr1".into(),
            pos: 100,
            ref_allele: b"A".to_vec(),
            alt_allele: b"T".to_vec(),
            kind: VariantKind::Snv,
            supporting_kmers: vec![],
            reference_window_kmers: vec![],
            variant_window_kmers: vec![],
            likelihood: 1.0,
            filters: vec![],
        };
        assert!(call.passes());
        call.filters.push("LikelihoodFail".to_string());
        assert!(!call.passes());
    }
}
