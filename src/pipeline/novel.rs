//! Stage C: the core streaming novelty filter.
//!
//! Scans the proband read stream and emits only reads carrying at least one
//! k-mer abundant in the case sketch and scarce in every control sketch,
//! annotated with the positions and abundances of those k-mers. Single
//! pass, input order preserved, sequences never modified.

use crate::bio::kmer::CanonicalKmerIter;
use crate::error::PipelineError;
use crate::sketch::Sketch;
use crate::types::{AugmentedRead, KmerAnnotation, Read};

pub struct NovelParams {
    pub k: usize,
    pub case_min: u16,
    pub ctrl_max: u16,
    pub abund_screen: Option<u16>,
}

/// Applies the novelty predicate to one read, per §4.C steps 1-3. Returns
/// `None` if the read is discarded (screened out, or no surviving k-mer).
pub fn annotate_read(
    read: Read,
    case: &Sketch,
    controls: &[&Sketch],
    params: &NovelParams,
) -> Option<AugmentedRead> {
    if let Some(screen) = params.abund_screen {
        let below_screen = CanonicalKmerIter::new(&read.sequence, params.k)
            .any(|(_, kmer)| case.count(kmer) < screen);
        if below_screen {
            return None;
        }
    }

    let mut novel_kmers = Vec::new();
    for (offset, kmer) in CanonicalKmerIter::new(&read.sequence, params.k) {
        let case_count = case.count(kmer);
        if case_count < params.case_min {
            continue;
        }
        let control_counts: Vec<u16> = controls.iter().map(|c| c.count(kmer)).collect();
        if control_counts.iter().all(|&c| c <= params.ctrl_max) {
            let mut abundances = Vec::with_capacity(1 + control_counts.len());
            abundances.push(case_count);
            abundances.extend(control_counts);
            novel_kmers.push(KmerAnnotation {
                offset,
                kmer,
                abundances,
            });
        }
    }

    if novel_kmers.is_empty() {
        None
    } else {
        Some(AugmentedRead { read, novel_kmers })
    }
}

/// Streams `reads` through [`annotate_read`], dropping discarded reads and
/// propagating upstream I/O errors.
pub fn novel_stream<'a>(
    reads: impl Iterator<Item = Result<Read, PipelineError>> + 'a,
    case: &'a Sketch,
    controls: &'a [&'a Sketch],
    params: &'a NovelParams,
) -> impl Iterator<Item = Result<AugmentedRead, PipelineError>> + 'a {
    reads.filter_map(move |read_result| match read_result {
        Ok(read) => annotate_read(read, case, controls, params).map(Ok),
        Err(e) => Some(Err(e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::kmer::canonical_kmers;

    fn build_sketch(seqs: &[&[u8]], k: usize, reps: u16) -> Sketch {
        let mut sketch = Sketch::new_counting(k as u8, 3, 65536, 65535);
        for seq in seqs {
            for kmer in canonical_kmers(seq, k) {
                for _ in 0..reps {
                    sketch.add(kmer);
                }
            }
        }
        sketch
    }

    fn read(id: &str, seq: &[u8]) -> Read {
        Read {
            id: id.to_string(),
            sequence: seq.to_vec(),
            qualities: None,
            mate_refs: vec![],
        }
    }

    #[test]
    fn test_invariant_case_and_control_thresholds_hold() {
        let case = build_sketch(&[b"ACGTACGTACGT"], 4, 12);
        let control = build_sketch(&[b"TTTTTTTT"], 4, 12);
        let params = NovelParams {
            k: 4,
            case_min: 8,
            ctrl_max: 1,
            abund_screen: None,
        };
        let augmented =
            annotate_read(read("r1", b"ACGTACGTACGT"), &case, &[&control], &params).unwrap();
        for annotation in &augmented.novel_kmers {
            assert!(annotation.case_abundance() >= params.case_min);
            assert!(annotation
                .control_abundances()
                .iter()
                .all(|&c| c <= params.ctrl_max));
        }
    }

    #[test]
    fn test_shared_variant_with_control_is_dropped() {
        let case = build_sketch(&[b"ACGTACGTACGT"], 4, 12);
        let control = build_sketch(&[b"ACGTACGTACGT"], 4, 12); // also abundant in control
        let params = NovelParams {
            k: 4,
            case_min: 8,
            ctrl_max: 1,
            abund_screen: None,
        };
        let result = annotate_read(read("r1", b"ACGTACGTACGT"), &case, &[&control], &params);
        assert!(result.is_none());
    }

    #[test]
    fn test_abund_screen_drops_whole_read() {
        let case = build_sketch(&[b"ACGT"], 4, 2); // count = 2 for this one k-mer
        let control = build_sketch(&[], 4, 0);
        let params = NovelParams {
            k: 4,
            case_min: 1,
            ctrl_max: 0,
            abund_screen: Some(5), // above observed count(s) -> whole read screened
        };
        let result = annotate_read(read("r1", b"ACGTTTTT"), &case, &[&control], &params);
        assert!(result.is_none());
    }

    #[test]
    fn test_all_ambiguous_bases_yield_no_novel_kmers() {
        let case = build_sketch(&[b"ACGTACGT"], 4, 10);
        let control = build_sketch(&[], 4, 0);
        let params = NovelParams {
            k: 4,
            case_min: 1,
            ctrl_max: 0,
            abund_screen: None,
        };
        let result = annotate_read(read("r1", b"NNNNNNNN"), &case, &[&control], &params);
        assert!(result.is_none());
    }

    #[test]
    fn test_ctrl_max_infinite_disables_control_test() {
        let case = build_sketch(&[b"ACGTACGT"], 4, 10);
        let control = build_sketch(&[b"ACGTACGT"], 4, 10);
        let params = NovelParams {
            k: 4,
            case_min: 1,
            ctrl_max: u16::MAX,
            abund_screen: None,
        };
        let result = annotate_read(read("r1", b"ACGTACGT"), &case, &[&control], &params);
        assert!(result.is_some());
    }
}
