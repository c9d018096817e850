//! Stage F: per-partition local assembly.
//!
//! Two interchangeable strategies behind one capability, per §9's
//! re-architecture note ("wrap behind a narrow capability
//! `Assembler{assemble(reads) -> Contigs}` with two implementations so the
//! fallback can be selected transparently"). No de-Bruijn assembler crate
//! appears anywhere in the retrieval pack, so the primary path is a small
//! in-house unitig walker over a (K-1)-mer overlap graph -- the same
//! algorithm family external assemblers like SPAdes/Velvet use, just
//! without their repeat-resolution machinery.

use crate::types::{AugmentedRead, Contig, KmerAnnotation, Partition};
use std::collections::{HashMap, HashSet};

pub trait Assembler {
    fn assemble(&self, partition: &Partition, k: usize, min_contig_len: usize) -> Vec<Contig>;
}

/// Runs the primary de-Bruijn-style assembler, falling back to the greedy
/// overlap assembler when it yields nothing (§7: "Assembly failure in
/// primary path: transparently invoke fallback").
pub fn assemble_partition(
    partition: &Partition,
    k: usize,
    min_overlap: usize,
    min_contig_len: usize,
) -> Vec<Contig> {
    let primary = DeBruijnAssembler;
    let contigs = primary.assemble(partition, k, min_contig_len);
    if !contigs.is_empty() {
        return contigs;
    }
    log::debug!(
        "partition {}: primary assembler produced no contigs, falling back to greedy",
        partition.label
    );
    let fallback = GreedyAssembler { min_overlap };
    fallback.assemble(partition, k, min_contig_len)
}

/// Projects a partition's novel k-mer annotations onto offsets within an
/// assembled contig, matching either the k-mer's forward or
/// reverse-complement byte form (contigs are not themselves canonicalized).
fn project_annotations(
    contig_seq: &[u8],
    support: &[&AugmentedRead],
    k: usize,
) -> Vec<KmerAnnotation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for read in support {
        for annotation in &read.novel_kmers {
            if !seen.insert(annotation.kmer) {
                continue;
            }
            let forward = annotation.kmer.decode(k);
            let revcomp = crate::bio::reverse_complement(&forward);
            let offset = find_subslice(contig_seq, &forward).or_else(|| find_subslice(contig_seq, &revcomp));
            if let Some(offset) = offset {
                out.push(KmerAnnotation {
                    offset,
                    kmer: annotation.kmer,
                    abundances: annotation.abundances.clone(),
                });
            }
        }
    }
    out.sort_by_key(|a| a.offset);
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// De-Bruijn-style unitig assembler: builds a (K-1)-mer overlap graph from
/// every read's K-mers and walks maximal non-branching paths.
pub struct DeBruijnAssembler;

impl Assembler for DeBruijnAssembler {
    fn assemble(&self, partition: &Partition, k: usize, min_contig_len: usize) -> Vec<Contig> {
        if k < 2 {
            return Vec::new();
        }
        let mut out_edges: HashMap<Vec<u8>, Vec<Vec<u8>>> = HashMap::new();
        let mut in_degree: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut all_nodes: HashSet<Vec<u8>> = HashSet::new();

        for read in &partition.reads {
            let seq = &read.read.sequence;
            if seq.len() < k {
                continue;
            }
            for window in seq.windows(k) {
                if !window.iter().all(|&b| crate::bio::is_valid_base(b)) {
                    continue;
                }
                let prefix = window[..k - 1].to_vec();
                let suffix = window[1..].to_vec();
                out_edges.entry(prefix.clone()).or_default().push(suffix.clone());
                *in_degree.entry(suffix.clone()).or_insert(0) += 1;
                all_nodes.insert(prefix);
                all_nodes.insert(suffix);
            }
        }

        if all_nodes.is_empty() {
            return Vec::new();
        }

        self.build_contigs_from_edges(partition, &out_edges, &in_degree, k, min_contig_len)
    }
}

impl DeBruijnAssembler {
    fn build_contigs_from_edges(
        &self,
        partition: &Partition,
        out_edges: &HashMap<Vec<u8>, Vec<Vec<u8>>>,
        in_degree: &HashMap<Vec<u8>, usize>,
        k: usize,
        min_contig_len: usize,
    ) -> Vec<Contig> {
        let mut visited_edges: HashSet<(Vec<u8>, Vec<u8>)> = HashSet::new();
        let mut nodes: Vec<Vec<u8>> = out_edges.keys().cloned().collect();
        for suffixes in out_edges.values() {
            for s in suffixes {
                if !out_edges.contains_key(s) {
                    nodes.push(s.clone());
                }
            }
        }
        nodes.sort();
        nodes.dedup();

        let starts: Vec<Vec<u8>> = nodes
            .iter()
            .filter(|node| {
                let outdeg = out_edges.get(*node).map(Vec::len).unwrap_or(0);
                let indeg = in_degree.get(*node).copied().unwrap_or(0);
                outdeg > 0 && (indeg == 0 || outdeg > 1 || indeg > 1)
            })
            .cloned()
            .collect();
        let ordered_starts: Vec<Vec<u8>> = starts.into_iter().chain(nodes.into_iter()).collect();

        let mut contigs = Vec::new();
        let support: Vec<&AugmentedRead> = partition.reads.iter().collect();

        for start in ordered_starts {
            let mut node = start.clone();
            let mut seq = start.clone();
            loop {
                let candidates = match out_edges.get(&node) {
                    Some(c) if !c.is_empty() => c,
                    _ => break,
                };
                let mut sorted_candidates: Vec<&Vec<u8>> = candidates.iter().collect();
                sorted_candidates.sort();
                let next = sorted_candidates
                    .into_iter()
                    .find(|suffix| !visited_edges.contains(&(node.clone(), (*suffix).clone())));
                let next = match next {
                    Some(n) => n.clone(),
                    None => break,
                };
                visited_edges.insert((node.clone(), next.clone()));
                seq.push(*next.last().unwrap());
                let indeg_next = in_degree.get(&next).copied().unwrap_or(0);
                let outdeg_next = out_edges.get(&next).map(Vec::len).unwrap_or(0);
                node = next;
                if indeg_next != 1 || outdeg_next != 1 {
                    break;
                }
            }
            if seq.len() >= min_contig_len && seq.len() >= k {
                let novel_kmers = project_annotations(&seq, &support, k);
                contigs.push(Contig {
                    partition_label: partition.label.clone(),
                    sequence: seq,
                    support: partition.reads.iter().map(|r| r.id().to_string()).collect(),
                    novel_kmers,
                });
            }
        }
        contigs
    }
}

/// Greedy overlap-extension fallback (§4.F's homegrown strategy).
pub struct GreedyAssembler {
    pub min_overlap: usize,
}

impl Assembler for GreedyAssembler {
    fn assemble(&self, partition: &Partition, k: usize, min_contig_len: usize) -> Vec<Contig> {
        let mut remaining: Vec<usize> = (0..partition.reads.len()).collect();
        let mut contigs = Vec::new();

        while !remaining.is_empty() {
            // Seed with the read carrying the most novel k-mers; tie-break by read id.
            remaining.sort_by(|&a, &b| {
                let ra = &partition.reads[a];
                let rb = &partition.reads[b];
                rb.novel_kmers
                    .len()
                    .cmp(&ra.novel_kmers.len())
                    .then(ra.id().cmp(rb.id()))
            });
            let seed_idx = remaining.remove(0);
            let mut contig_seq = partition.reads[seed_idx].read.sequence.clone();
            let mut support_idxs = vec![seed_idx];

            loop {
                let extension = remaining
                    .iter()
                    .enumerate()
                    .filter_map(|(pos, &idx)| {
                        let candidate = &partition.reads[idx].read.sequence;
                        best_overlap(&contig_seq, candidate, k, self.min_overlap)
                            .map(|(side, overlap_len)| (pos, idx, side, overlap_len))
                    })
                    .max_by(|a, b| {
                        a.3.cmp(&b.3)
                            .then(
                                partition.reads[a.1]
                                    .novel_kmers
                                    .len()
                                    .cmp(&partition.reads[b.1].novel_kmers.len()),
                            )
                            .then(partition.reads[b.1].id().cmp(partition.reads[a.1].id()))
                    });

                let Some((pos, idx, side, overlap_len)) = extension else {
                    break;
                };
                let candidate = &partition.reads[idx].read.sequence;
                match side {
                    OverlapSide::Suffix => {
                        contig_seq.extend_from_slice(&candidate[overlap_len..]);
                    }
                    OverlapSide::Prefix => {
                        let mut new_seq = candidate[..candidate.len() - overlap_len].to_vec();
                        new_seq.extend_from_slice(&contig_seq);
                        contig_seq = new_seq;
                    }
                }
                support_idxs.push(idx);
                remaining.remove(pos);
            }

            if contig_seq.len() >= min_contig_len {
                let support: Vec<&AugmentedRead> =
                    support_idxs.iter().map(|&i| &partition.reads[i]).collect();
                let novel_kmers = project_annotations(&contig_seq, &support, k);
                contigs.push(Contig {
                    partition_label: partition.label.clone(),
                    sequence: contig_seq,
                    support: support.iter().map(|r| r.id().to_string()).collect(),
                    novel_kmers,
                });
            }
        }
        contigs
    }
}

#[derive(Debug, Clone, Copy)]
enum OverlapSide {
    /// `candidate` extends the contig's right end: `contig[..] + candidate[overlap..]`.
    Suffix,
    /// `candidate` extends the contig's left end: `candidate[..len-overlap] + contig[..]`.
    Prefix,
}

/// Largest exact overlap (>= `min_overlap` and >= K) between `contig` and
/// `candidate` on either end, or `None` if no qualifying overlap exists.
fn best_overlap(
    contig: &[u8],
    candidate: &[u8],
    k: usize,
    min_overlap: usize,
) -> Option<(OverlapSide, usize)> {
    let floor = min_overlap.max(k);
    let max_len = contig.len().min(candidate.len());

    let mut best: Option<(OverlapSide, usize)> = None;
    for len in (floor..=max_len).rev() {
        if contig[contig.len() - len..] == candidate[..len] {
            best = Some((OverlapSide::Suffix, len));
            break;
        }
    }
    for len in (floor..=max_len).rev() {
        if candidate[candidate.len() - len..] == contig[..len] {
            if best.map(|(_, l)| len > l).unwrap_or(true) {
                best = Some((OverlapSide::Prefix, len));
            }
            break;
        }
    }
    best
}
