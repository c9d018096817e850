//! Reference FASTA loading and the seed k-mer index used by Localize
//! (spec §4.G: "a precomputed reference index" mapping sequence id to the
//! positions of each k-mer).

use crate::bio::kmer::{CanonicalKmerIter, EncodedKmer};
use crate::error::PipelineError;
use crate::types::ReferenceWindow;
use needletail::parse_fastx_file;
use std::collections::HashMap;
use std::path::Path;

/// A loaded reference genome plus a canonical-k-mer position index built
/// over every sequence at construction time.
pub struct ReferenceIndex {
    sequences: HashMap<String, Vec<u8>>,
    seed_k: usize,
    /// canonical k-mer -> (seqid, position) occurrences.
    index: HashMap<EncodedKmer, Vec<(String, u32)>>,
}

impl ReferenceIndex {
    /// Loads every record from `path` and indexes its canonical `seed_k`-mers.
    pub fn load(path: impl AsRef<Path>, seed_k: usize) -> Result<Self, PipelineError> {
        let mut reader = parse_fastx_file(path.as_ref())
            .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let mut sequences = HashMap::new();
        let mut index: HashMap<EncodedKmer, Vec<(String, u32)>> = HashMap::new();

        while let Some(record) = reader.next() {
            let record = record.map_err(|e| {
                PipelineError::MalformedInput(format!("reference FASTA: {e}"))
            })?;
            let seqid = String::from_utf8_lossy(record.id()).into_owned();
            let sequence = record.seq().into_owned();

            for (offset, kmer) in CanonicalKmerIter::new(&sequence, seed_k) {
                index
                    .entry(kmer)
                    .or_default()
                    .push((seqid.clone(), offset as u32));
            }
            sequences.insert(seqid, sequence);
        }

        Ok(ReferenceIndex {
            sequences,
            seed_k,
            index,
        })
    }

    pub fn seed_k(&self) -> usize {
        self.seed_k
    }

    /// Positions of a canonical seed k-mer across the reference.
    pub fn lookup(&self, kmer: EncodedKmer) -> &[(String, u32)] {
        self.index.get(&kmer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sequence(&self, seqid: &str) -> Option<&[u8]> {
        self.sequences.get(seqid).map(Vec::as_slice)
    }

    /// Extracts `[start, end)` from `seqid`, clamped to the sequence bounds.
    pub fn window(&self, seqid: &str, start: u64, end: u64) -> Option<ReferenceWindow> {
        let sequence = self.sequences.get(seqid)?;
        let start = start.min(sequence.len() as u64);
        let end = end.min(sequence.len() as u64).max(start);
        Some(ReferenceWindow {
            seqid: seqid.to_string(),
            start,
            end,
            sequence: sequence[start as usize..end as usize].to_vec(),
        })
    }
}
