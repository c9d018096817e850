//! Stage E: group reads into connected components over shared novel
//! k-mers, via an inverted index and union-find rather than an explicit
//! quadratic edge set (§9: "never materialize the quadratic edge set").

use crate::types::{AugmentedRead, Partition};
use std::collections::HashMap;

/// Caps the cost of edge-pruning's pairwise bookkeeping: a k-mer bucket
/// larger than this (typical of a repeat region) is still used for
/// connectivity but skipped for the O(n^2) shared-count tally.
const MAX_BUCKET_FOR_PAIR_COUNTING: usize = 64;

pub struct PartitionParams {
    /// Minimum number of shared novel k-mers a read pair must have to stay connected.
    pub min_shared_kmers: usize,
    /// Partitions below this many reads are dropped by the caller (reported `PartitionTooSmall`).
    pub min_partition_size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Partitions `reads` into connected components. Components are labeled
/// `cc0`, `cc1`, ... in descending size order; ties break lexicographically
/// on the smallest read id in the component. Within each component, reads
/// whose sequence (or canonical/reverse-complement sequence) duplicates an
/// earlier member are dropped.
pub fn partition_reads(reads: Vec<AugmentedRead>, params: &PartitionParams) -> Vec<Partition> {
    let n = reads.len();
    if n == 0 {
        return Vec::new();
    }

    let mut inverted: HashMap<_, Vec<usize>> = HashMap::new();
    for (idx, read) in reads.iter().enumerate() {
        for annotation in &read.novel_kmers {
            inverted.entry(annotation.kmer).or_default().push(idx);
        }
    }

    let mut shared_counts: HashMap<(usize, usize), usize> = HashMap::new();
    let mut uf = UnionFind::new(n);

    for bucket in inverted.values() {
        if bucket.len() < 2 {
            continue;
        }
        if bucket.len() <= MAX_BUCKET_FOR_PAIR_COUNTING {
            for i in 0..bucket.len() {
                for j in (i + 1)..bucket.len() {
                    let (a, b) = (bucket[i].min(bucket[j]), bucket[i].max(bucket[j]));
                    *shared_counts.entry((a, b)).or_insert(0) += 1;
                }
            }
        } else {
            // Large repetitive bucket: connect without per-pair accounting,
            // since pruning a highly shared k-mer would defeat the point of
            // edge pruning (separating distinct, lightly-linked variants).
            let first = bucket[0];
            for &other in &bucket[1..] {
                uf.union(first, other);
            }
        }
    }

    for ((a, b), count) in shared_counts {
        if count >= params.min_shared_kmers.max(1) {
            uf.union(a, b);
        }
    }

    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in 0..n {
        let root = uf.find(idx);
        components.entry(root).or_default().push(idx);
    }

    let mut reads: Vec<Option<AugmentedRead>> = reads.into_iter().map(Some).collect();
    let mut partitions: Vec<(Vec<AugmentedRead>, String)> = Vec::new();

    for member_idxs in components.into_values() {
        let mut seen_sequences: Vec<Vec<u8>> = Vec::new();
        let mut members = Vec::new();
        let mut smallest_id: Option<String> = None;

        let mut sorted_idxs = member_idxs;
        sorted_idxs.sort_unstable();
        for idx in sorted_idxs {
            let read = reads[idx].take().expect("each read index visited once");
            let canonical_seq = canonical_sequence(&read.read.sequence);
            if seen_sequences.contains(&canonical_seq) {
                continue;
            }
            seen_sequences.push(canonical_seq);
            let replace = match smallest_id.as_deref() {
                Some(s) => read.id() < s,
                None => true,
            };
            if replace {
                smallest_id = Some(read.id().to_string());
            }
            members.push(read);
        }
        if members.is_empty() {
            continue;
        }
        partitions.push((members, smallest_id.unwrap_or_default()));
    }

    partitions.sort_by(|(a_reads, a_id), (b_reads, b_id)| {
        b_reads.len().cmp(&a_reads.len()).then(a_id.cmp(b_id))
    });

    partitions
        .into_iter()
        .enumerate()
        .map(|(i, (reads, _))| Partition {
            label: format!("cc{i}"),
            reads,
        })
        .collect()
}

fn canonical_sequence(seq: &[u8]) -> Vec<u8> {
    let rc = crate::bio::reverse_complement(seq);
    if seq <= rc.as_slice() {
        seq.to_vec()
    } else {
        rc
    }
}
