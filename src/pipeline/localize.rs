//! Stage G: anchor a contig to the reference via seed k-mers and extract
//! the implicated reference window(s).

use crate::bio::kmer::CanonicalKmerIter;
use crate::io::reference::ReferenceIndex;
use crate::types::{Contig, ReferenceWindow};

pub struct LocalizeParams {
    pub seed_k: usize,
    pub seed_spacing: usize,
    /// Band ΔL: hits on the same sequence within this distance cluster together.
    pub cluster_band: u64,
    pub window_pad: u64,
}

/// One cluster of nearby seed hits on the same reference sequence.
struct SeedCluster {
    seqid: String,
    min_pos: u64,
    max_pos: u64,
}

/// Extracts the reference window(s) implicated by `contig`'s seed k-mers.
/// Empty output means "no reference match" (§4.G.4) -- the caller reports
/// the contig without a variant, it does not treat this as an error.
pub fn localize_contig(
    contig: &Contig,
    reference: &ReferenceIndex,
    params: &LocalizeParams,
) -> Vec<ReferenceWindow> {
    if contig.sequence.len() < params.seed_k {
        return Vec::new();
    }

    let mut hits: Vec<(String, u64)> = Vec::new();
    for (offset, kmer) in CanonicalKmerIter::new(&contig.sequence, params.seed_k) {
        if offset % params.seed_spacing.max(1) != 0 {
            continue;
        }
        for (seqid, pos) in reference.lookup(kmer) {
            hits.push((seqid.clone(), *pos as u64));
        }
    }
    if hits.is_empty() {
        return Vec::new();
    }

    hits.sort();
    let clusters = cluster_hits(&hits, params.cluster_band);

    clusters
        .into_iter()
        .filter_map(|cluster| {
            let start = cluster.min_pos.saturating_sub(params.window_pad);
            let end = cluster.max_pos + contig.sequence.len() as u64 + params.window_pad;
            reference.window(&cluster.seqid, start, end)
        })
        .collect()
}

fn cluster_hits(hits: &[(String, u64)], band: u64) -> Vec<SeedCluster> {
    let mut clusters: Vec<SeedCluster> = Vec::new();
    for (seqid, pos) in hits {
        if let Some(last) = clusters.last_mut() {
            if &last.seqid == seqid && pos.saturating_sub(last.max_pos) <= band {
                last.max_pos = (*pos).max(last.max_pos);
                continue;
            }
        }
        clusters.push(SeedCluster {
            seqid: seqid.clone(),
            min_pos: *pos,
            max_pos: *pos,
        });
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn reference_with(seq: &str) -> ReferenceIndex {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ref.fa");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, ">chr1\n{seq}").unwrap();
        ReferenceIndex::load(&path, 8).unwrap()
    }

    fn contig_from(seq: &[u8]) -> Contig {
        Contig {
            partition_label: "cc0".into(),
            sequence: seq.to_vec(),
            support: vec![],
            novel_kmers: vec![],
        }
    }

    #[test]
    fn test_localize_finds_matching_window() {
        let reference_seq = "AAAAAAAAGGGGCCCCTTTTACGTACGTACGTTTTTGGGGAAAAAAAA";
        let reference = reference_with(reference_seq);
        let contig = contig_from(b"GGGGCCCCTTTTACGTACGTACGT");

        let params = LocalizeParams {
            seed_k: 8,
            seed_spacing: 1,
            cluster_band: 10,
            window_pad: 5,
        };
        let windows = localize_contig(&contig, &reference, &params);
        assert!(!windows.is_empty());
        assert_eq!(windows[0].seqid, "chr1");
    }

    #[test]
    fn test_no_seed_hits_means_no_reference_match() {
        let reference = reference_with("AAAAAAAAAAAAAAAAAAAAAAAA");
        let contig = contig_from(b"TTTTGGGGCCCCTTTTGGGGCCCC");
        let params = LocalizeParams {
            seed_k: 8,
            seed_spacing: 1,
            cluster_band: 10,
            window_pad: 5,
        };
        let windows = localize_contig(&contig, &reference, &params);
        assert!(windows.is_empty());
    }

    #[test]
    fn test_short_contig_yields_no_windows() {
        let reference = reference_with("ACGTACGTACGTACGT");
        let contig = contig_from(b"AC");
        let params = LocalizeParams {
            seed_k: 8,
            seed_spacing: 1,
            cluster_band: 10,
            window_pad: 5,
        };
        assert!(localize_contig(&contig, &reference, &params).is_empty());
    }
}
