//! Stage D: refine the Novel stream's annotations against a reference
//! sketch, a freshly built case sketch over the (much smaller) novel-read
//! corpus, and an optional contamination sketch.

use crate::bio::kmer::canonical_kmers;
use crate::sketch::Sketch;
use crate::types::AugmentedRead;

/// Builds a case sketch from only the novel-read corpus, used to re-check
/// each annotation's case abundance at finer resolution than the original
/// genome-wide sketch.
pub fn build_refined_case_sketch(reads: &[AugmentedRead], k: usize, bytes_budget: u64) -> Sketch {
    let mut sketch = Sketch::new_counting(k as u8, 4, bytes_budget, 65535);
    for read in reads {
        for kmer in canonical_kmers(&read.read.sequence, k) {
            sketch.add(kmer);
        }
    }
    sketch
}

/// Re-validates one read's annotations: drops any k-mer present in the
/// reference (masked), below `case_min` in the refined case sketch, or
/// present in the optional contamination sketch. Returns `None` if every
/// annotation is drained.
pub fn refine_read(
    mut read: AugmentedRead,
    reference: &Sketch,
    refined_case: &Sketch,
    case_min: u16,
    contamination: Option<&Sketch>,
) -> Option<AugmentedRead> {
    read.novel_kmers.retain(|annotation| {
        if reference.contains(annotation.kmer) {
            return false; // masked: hits the reference
        }
        if refined_case.count(annotation.kmer) < case_min {
            return false;
        }
        if let Some(contam) = contamination {
            if contam.contains(annotation.kmer) {
                return false;
            }
        }
        true
    });

    if read.novel_kmers.is_empty() {
        None
    } else {
        Some(read)
    }
}

/// Refines a whole corpus, building the refined case sketch once up front.
pub fn refine_corpus(
    reads: Vec<AugmentedRead>,
    k: usize,
    reference: &Sketch,
    case_min: u16,
    contamination: Option<&Sketch>,
    refined_case_bytes: u64,
) -> Vec<AugmentedRead> {
    let refined_case = build_refined_case_sketch(&reads, k, refined_case_bytes);
    reads
        .into_iter()
        .filter_map(|read| refine_read(read, reference, &refined_case, case_min, contamination))
        .collect()
}
