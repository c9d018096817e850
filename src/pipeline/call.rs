//! Stage H: banded affine-gap alignment of a contig to its localized
//! reference window, and CIGAR interpretation into variant records.

use crate::bio::kmer::{canonical_kmers, EncodedKmer};
use crate::types::{Contig, ReferenceWindow, VariantCall, VariantKind};
use bio::alignment::pairwise::banded::Aligner;
use bio::alignment::AlignmentOperation;

pub struct CallParams {
    pub k: usize,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub window_pad: u64,
    pub indel_merge_window: u64,
    pub terminal_snv_distance: u64,
    pub allow_terminal_snv: bool,
    /// Seed k-mer length and window width for the banded aligner.
    pub band_seed_k: usize,
    pub band_width: usize,
}

/// A single un-merged alignment event, in reference-window-relative coordinates.
#[derive(Debug, Clone)]
enum RawEvent {
    Snv { ref_offset: u64 },
    Ins { ref_offset: u64, contig_start: usize, contig_end: usize, overhang: bool },
    Del { ref_offset: u64, ref_len: u64 },
}

fn event_ref_offset(event: &RawEvent) -> u64 {
    match event {
        RawEvent::Snv { ref_offset } => *ref_offset,
        RawEvent::Ins { ref_offset, .. } => *ref_offset,
        RawEvent::Del { ref_offset, .. } => *ref_offset,
    }
}

/// Aligns `contig` globally-in-query/locally-in-reference against `window`
/// (bio's `semiglobal` alignment mode) and returns the alignment score
/// alongside the variant calls its CIGAR implies -- the score lets a caller
/// pick the best-scoring window when a contig localizes to several (§4.H:
/// "best scoring alignment per contig wins"). Returns `Err(())` on
/// alignment failure (empty input).
pub fn call_variants(
    contig: &Contig,
    window: &ReferenceWindow,
    params: &CallParams,
) -> Result<(i32, Vec<VariantCall>), ()> {
    if contig.sequence.is_empty() || window.sequence.is_empty() {
        return Err(());
    }

    let score = |a: u8, b: u8| -> i32 {
        if a == b {
            params.match_score
        } else {
            params.mismatch_score
        }
    };
    let mut aligner = Aligner::new(
        params.gap_open,
        params.gap_extend,
        score,
        params.band_seed_k,
        params.band_width,
    );
    let alignment = aligner.semiglobal(&contig.sequence, &window.sequence);

    let events = interpret_operations(&alignment.operations, &contig.sequence, &window.sequence);
    let merged = merge_adjacent(events, params.indel_merge_window);

    let mut calls = Vec::new();
    for event in merged {
        if let Some(call) = render_call(&event, contig, window, params) {
            calls.push(call);
        }
    }
    Ok((alignment.score, calls))
}

fn interpret_operations(
    ops: &[AlignmentOperation],
    contig_seq: &[u8],
    ref_seq: &[u8],
) -> Vec<RawEvent> {
    let mut events = Vec::new();
    let (mut qi, mut ri) = (0usize, 0usize);

    for op in ops {
        match op {
            AlignmentOperation::Match => {
                qi += 1;
                ri += 1;
            }
            AlignmentOperation::Subst => {
                let _ = contig_seq.get(qi);
                let _ = ref_seq.get(ri);
                events.push(RawEvent::Snv {
                    ref_offset: ri as u64,
                });
                qi += 1;
                ri += 1;
            }
            AlignmentOperation::Ins => {
                events.push(RawEvent::Ins {
                    ref_offset: ri as u64,
                    contig_start: qi,
                    contig_end: qi + 1,
                    overhang: false,
                });
                qi += 1;
            }
            AlignmentOperation::Del => {
                events.push(RawEvent::Del {
                    ref_offset: ri as u64,
                    ref_len: 1,
                });
                ri += 1;
            }
            AlignmentOperation::Xclip(len) => {
                // Leading/trailing query bases clipped by the semiglobal
                // alignment: the contig overhangs the reference window.
                // Preserved as an insertion event (§4.H) rather than dropped.
                if ri == 0 || ri == ref_seq.len() {
                    events.push(RawEvent::Ins {
                        ref_offset: ri as u64,
                        contig_start: qi,
                        contig_end: qi + len,
                        overhang: true,
                    });
                }
                qi += len;
            }
            AlignmentOperation::Yclip(len) => {
                ri += len;
            }
        }
    }

    coalesce_runs(events)
}

/// Merges consecutive single-base Ins/Del events of the same kind at
/// adjacent positions into one multi-base event (the raw alignment walk
/// above emits one event per base).
fn coalesce_runs(events: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut out: Vec<RawEvent> = Vec::new();
    for event in events {
        match (out.last_mut(), &event) {
            (
                Some(RawEvent::Ins {
                    ref_offset,
                    contig_end,
                    overhang,
                    ..
                }),
                RawEvent::Ins {
                    ref_offset: next_ref,
                    contig_end: next_end,
                    overhang: next_overhang,
                    ..
                },
            ) if *ref_offset == *next_ref && *overhang == *next_overhang => {
                *contig_end = *next_end;
            }
            (
                Some(RawEvent::Del { ref_offset, ref_len }),
                RawEvent::Del {
                    ref_offset: next_ref,
                    ..
                },
            ) if *ref_offset + *ref_len == *next_ref => {
                *ref_len += 1;
            }
            _ => out.push(event),
        }
    }
    out
}

/// Merges events whose reference offsets fall within `window` of one
/// another into a single complex-call span (§4.H: "adjacent M/I/D events
/// within a configured window are merged").
fn merge_adjacent(events: Vec<RawEvent>, window: u64) -> Vec<RawEvent> {
    if events.is_empty() {
        return events;
    }
    let mut out: Vec<RawEvent> = Vec::new();
    for event in events {
        let should_merge = out
            .last()
            .map(|prev| event_ref_offset(&event).saturating_sub(event_ref_offset(prev)) <= window)
            .unwrap_or(false);
        if should_merge {
            // Keep the earlier event's start but let a following indel win
            // the representative span; SNV-over-SNV keeps the first.
            if !matches!(out.last().unwrap(), RawEvent::Snv { .. }) {
                continue;
            }
            out.pop();
            out.push(event);
        } else {
            out.push(event);
        }
    }
    out
}

fn render_call(
    event: &RawEvent,
    contig: &Contig,
    window: &ReferenceWindow,
    params: &CallParams,
) -> Option<VariantCall> {
    let ref_offset = event_ref_offset(event);

    if let RawEvent::Ins { overhang: true, contig_start, contig_end, .. } = event {
        let has_support = contig
            .novel_kmers
            .iter()
            .any(|a| a.offset >= *contig_start && a.offset < *contig_end);
        if !has_support {
            return None; // overhang insertion with no novel k-mer support
        }
    }

    // `call_pos` is the window-relative offset the rendered `ref_allele`
    // actually starts at, which for Ins/Del is one base before the first
    // affected reference base (the anchor) rather than `ref_offset` itself.
    let (kind, ref_allele, alt_allele, contig_pos, call_pos) = match event {
        RawEvent::Snv { ref_offset } => {
            let ref_base = *window.sequence.get(*ref_offset as usize)?;
            let contig_pos = *ref_offset as usize; // semiglobal: offsets track 1:1 outside indels
            let alt_base = *contig.sequence.get(contig_pos.min(contig.sequence.len().saturating_sub(1)))?;
            (VariantKind::Snv, vec![ref_base], vec![alt_base], contig_pos, *ref_offset)
        }
        RawEvent::Ins {
            ref_offset,
            contig_start,
            contig_end,
            ..
        } => {
            let start = ref_offset.saturating_sub(1);
            let anchor = *window.sequence.get(start as usize)?;
            let inserted = contig.sequence.get(*contig_start..*contig_end)?.to_vec();
            let mut alt = vec![anchor];
            alt.extend(inserted);
            (VariantKind::Insertion, vec![anchor], alt, *contig_start, start)
        }
        RawEvent::Del { ref_offset, ref_len } => {
            let start = ref_offset.saturating_sub(1);
            let end = (*ref_offset + *ref_len) as usize;
            let deleted = window.sequence.get(start as usize..end)?.to_vec();
            let anchor = *deleted.first()?;
            (
                VariantKind::Deletion,
                deleted,
                vec![anchor],
                (start as usize).min(contig.sequence.len().saturating_sub(1)),
                start,
            )
        }
    };

    if matches!(kind, VariantKind::Snv) {
        let pad = params.window_pad;
        if ref_offset < pad || (window.sequence.len() as u64).saturating_sub(ref_offset) <= pad {
            return None; // inside reference padding
        }
        if !params.allow_terminal_snv {
            let distance_from_end = contig
                .sequence
                .len()
                .saturating_sub(contig_pos)
                .min(contig_pos);
            if (distance_from_end as u64) < params.terminal_snv_distance {
                return None;
            }
        }
    }

    let k = params.k;
    let locus_start = (ref_offset as usize).saturating_sub(k);
    let locus_end = (ref_offset as usize + k).min(window.sequence.len());
    let rw: Vec<EncodedKmer> = if locus_end > locus_start {
        canonical_kmers(&window.sequence[locus_start..locus_end], k).collect()
    } else {
        Vec::new()
    };

    let contig_locus_start = contig_pos.saturating_sub(k);
    let contig_locus_end = (contig_pos + k).min(contig.sequence.len());
    let vw: Vec<EncodedKmer> = if contig_locus_end > contig_locus_start {
        canonical_kmers(&contig.sequence[contig_locus_start..contig_locus_end], k).collect()
    } else {
        Vec::new()
    };

    let contig_kmer_set: std::collections::HashSet<EncodedKmer> =
        contig.novel_kmers.iter().map(|a| a.kmer).collect();
    let supporting_kmers: Vec<EncodedKmer> = vw
        .iter()
        .copied()
        .filter(|k| contig_kmer_set.contains(k))
        .collect();

    Some(VariantCall {
        seqid: window.seqid.clone(),
        pos: window.start + call_pos,
        ref_allele,
        alt_allele,
        kind,
        supporting_kmers,
        reference_window_kmers: rw,
        variant_window_kmers: vw,
        likelihood: 0.0,
        filters: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KmerAnnotation;

    fn params() -> CallParams {
        CallParams {
            k: 4,
            match_score: 1,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
            window_pad: 2,
            indel_merge_window: 3,
            terminal_snv_distance: 2,
            allow_terminal_snv: false,
            band_seed_k: 4,
            band_width: 10,
        }
    }

    fn contig_from(seq: &[u8]) -> Contig {
        Contig {
            partition_label: "cc0".into(),
            sequence: seq.to_vec(),
            support: vec![],
            novel_kmers: vec![],
        }
    }

    fn window_from(seq: &[u8]) -> ReferenceWindow {
        ReferenceWindow {
            seqid: "chr1".into(),
            start: 1000,
            end: 1000 + seq.len() as u64,
            sequence: seq.to_vec(),
        }
    }

    #[test]
    fn test_identical_sequences_yield_no_calls() {
        let seq = b"AAACCCGGGTTTAAACCCGGGTTT";
        let contig = contig_from(seq);
        let window = window_from(seq);
        let (_, calls) = call_variants(&contig, &window, &params()).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_reference_window_satisfies_ref_allele_invariant() {
        let ref_seq = b"AAACCCGGGTTTAAACCCGGGTTT";
        let mut contig_seq = ref_seq.to_vec();
        contig_seq[12] = b'A'; // introduce a mismatch away from both ends
        let contig = contig_from(&contig_seq);
        let window = window_from(ref_seq);
        let (_, calls) = call_variants(&contig, &window, &params()).unwrap();
        for call in &calls {
            let local_pos = (call.pos - window.start) as usize;
            let slice = &window.sequence[local_pos..local_pos + call.ref_allele.len()];
            assert_eq!(slice, call.ref_allele.as_slice());
        }
    }

    #[test]
    fn test_empty_inputs_are_alignment_failures() {
        let contig = contig_from(b"");
        let window = window_from(b"ACGT");
        assert!(call_variants(&contig, &window, &params()).is_err());
    }

    // The following tests drive `render_call` directly on hand-built
    // `RawEvent`s rather than through the aligner, to pin down exactly
    // where `pos` lands relative to `ref_allele` for indels.

    #[test]
    fn test_deletion_pos_matches_ref_allele_start() {
        let ref_seq = b"AAAACCCCGGGGTTTTAAAACCCCGGGGTTTT";
        let contig_seq = b"AAAACCCCGGGGAAAACCCCGGGGTTTT"; // "TTTT" at [12..16) removed
        let window = window_from(ref_seq);
        let contig = contig_from(contig_seq);
        let mut call_params = params();
        call_params.window_pad = 15; // larger than ref_offset: would wrongly suppress if pad applied to Del

        let event = RawEvent::Del { ref_offset: 12, ref_len: 4 };
        let call = render_call(&event, &contig, &window, &call_params).unwrap();

        let local_pos = (call.pos - window.start) as usize;
        let slice = &window.sequence[local_pos..local_pos + call.ref_allele.len()];
        assert_eq!(slice, call.ref_allele.as_slice());
        assert_eq!(call.pos, window.start + 11);
    }

    #[test]
    fn test_insertion_pos_matches_ref_allele_start() {
        let ref_seq = b"AAAACCCCGGGGTTTTAAAACCCCGGGGTTTT";
        let contig_seq = b"AAAACCCCGGGGNNNNTTTTAAAACCCCGGGGTTTT"; // "NNNN" inserted at contig offset 12
        let window = window_from(ref_seq);
        let contig = contig_from(contig_seq);
        let mut call_params = params();
        call_params.window_pad = 15; // would wrongly suppress an Ins if pad applied

        let event = RawEvent::Ins {
            ref_offset: 12,
            contig_start: 12,
            contig_end: 16,
            overhang: false,
        };
        let call = render_call(&event, &contig, &window, &call_params).unwrap();

        let local_pos = (call.pos - window.start) as usize;
        let slice = &window.sequence[local_pos..local_pos + call.ref_allele.len()];
        assert_eq!(slice, call.ref_allele.as_slice());
        assert_eq!(call.pos, window.start + 11);
    }

    #[test]
    fn test_overhang_insertion_without_novel_kmer_support_is_dropped() {
        let window = window_from(b"AAAACCCCGGGGTTTTAAAACCCCGGGGTTTT");
        let contig = contig_from(b"NNNNAAAACCCCGGGGTTTT");
        let event = RawEvent::Ins { ref_offset: 0, contig_start: 0, contig_end: 4, overhang: true };
        assert!(render_call(&event, &contig, &window, &params()).is_none());
    }

    #[test]
    fn test_overhang_insertion_with_novel_kmer_support_is_kept() {
        let window = window_from(b"AAAACCCCGGGGTTTTAAAACCCCGGGGTTTT");
        let mut contig = contig_from(b"NNNNAAAACCCCGGGGTTTT");
        contig.novel_kmers.push(KmerAnnotation {
            offset: 2,
            kmer: EncodedKmer::encode(b"ACGA").unwrap(),
            abundances: vec![5],
        });
        let event = RawEvent::Ins { ref_offset: 0, contig_start: 0, contig_end: 4, overhang: true };
        assert!(render_call(&event, &contig, &window, &params()).is_some());
    }
}
