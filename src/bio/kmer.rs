//! Canonical k-mer encoding.
//!
//! A k-mer is represented either as a packed 2-bit-per-base `u64`
//! (`EncodedKmer`, for K <= 32, which covers every K this pipeline supports)
//! or as a plain byte slice (`Kmer`) when an owned/borrowed string form is
//! more convenient (e.g. writing the augmented-FASTX annotation line).
//!
//! Only canonical k-mers -- the lexicographic minimum of a k-mer and its
//! reverse complement -- are ever counted or compared. Because bases are
//! packed most-significant-base-first with the order A=0 < C=1 < G=2 < T=3,
//! comparing two `u64` encodings of the same K is equivalent to comparing
//! the underlying base strings lexicographically.

/// Largest K this crate can pack into a `u64`. Typical pipeline K (25-31)
/// comfortably fits.
pub const MAX_ENCODED_K: usize = 32;

pub type Kmer<'a> = &'a [u8];

fn base_code(b: u8) -> Option<u64> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn code_base(code: u64) -> u8 {
    match code & 0b11 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// A k-mer packed into the low `2*k` bits of a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct EncodedKmer(pub u64);

impl EncodedKmer {
    /// Encodes a k-mer of length `k <= MAX_ENCODED_K`. Returns `None` if the
    /// k-mer contains a non-ACGT base or is out of range.
    pub fn encode(kmer: &[u8]) -> Option<Self> {
        if kmer.is_empty() || kmer.len() > MAX_ENCODED_K {
            return None;
        }
        let mut bits: u64 = 0;
        for &b in kmer {
            bits = (bits << 2) | base_code(b)?;
        }
        Some(EncodedKmer(bits))
    }

    /// Decodes back to an owned uppercase ACGT byte string of length `k`.
    pub fn decode(&self, k: usize) -> Vec<u8> {
        let mut out = vec![0u8; k];
        let mut bits = self.0;
        for slot in out.iter_mut().rev() {
            *slot = code_base(bits);
            bits >>= 2;
        }
        out
    }

    fn mask(k: usize) -> u64 {
        if k >= 32 {
            u64::MAX
        } else {
            (1u64 << (2 * k)) - 1
        }
    }

    /// Reverse complement of this encoding, interpreted as a k-mer of length `k`.
    pub fn reverse_complement(&self, k: usize) -> Self {
        let mut bits = self.0;
        let mut rc: u64 = 0;
        for _ in 0..k {
            let base = bits & 0b11;
            let complement = 3 - base; // A<->T (0<->3), C<->G (1<->2)
            rc = (rc << 2) | complement;
            bits >>= 2;
        }
        EncodedKmer(rc & Self::mask(k))
    }

    /// Canonical form (lexicographic min of self and its reverse complement).
    pub fn canonical(&self, k: usize) -> Self {
        let rc = self.reverse_complement(k);
        if self.0 <= rc.0 {
            *self
        } else {
            rc
        }
    }
}

/// Renders an encoded k-mer as an owned ASCII string, for annotation lines
/// and VCF fields.
pub fn kmer_to_string(kmer: EncodedKmer, k: usize) -> String {
    String::from_utf8(kmer.decode(k)).expect("decoded k-mer is always valid ASCII")
}

/// Canonical form of a k-mer given as bytes, without packing into a `u64`.
/// Used as the K > 32 fallback and for tests that want byte-level checks.
pub fn canonical_kmer_bytes(kmer: &[u8]) -> Vec<u8> {
    let rc = crate::bio::reverse_complement(kmer);
    if kmer <= rc.as_slice() {
        kmer.to_vec()
    } else {
        rc
    }
}

/// Streams canonical k-mers (with their start offset in the input sequence)
/// using an O(1)-amortized rolling 2-bit encoding. A run of consecutive valid
/// (ACGT) bases shorter than `k` yields nothing; any non-ACGT base restarts
/// the window, so a k-mer spanning an `N` is never emitted (spec: "reads with
/// any N split at that position").
pub struct CanonicalKmerIter<'a> {
    seq: &'a [u8],
    k: usize,
    mask: u64,
    pos: usize,
    valid_run: usize,
    fwd: u64,
    rev: u64,
}

impl<'a> CanonicalKmerIter<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        assert!(
            (1..=MAX_ENCODED_K).contains(&k),
            "k must be in 1..={MAX_ENCODED_K}, got {k}"
        );
        CanonicalKmerIter {
            seq,
            k,
            mask: EncodedKmer::mask(k),
            pos: 0,
            valid_run: 0,
            fwd: 0,
            rev: 0,
        }
    }
}

impl<'a> Iterator for CanonicalKmerIter<'a> {
    /// `(offset, canonical k-mer)`.
    type Item = (usize, EncodedKmer);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.seq.len() {
            let byte = self.seq[self.pos];
            self.pos += 1;
            match base_code(byte) {
                Some(code) => {
                    self.fwd = ((self.fwd << 2) | code) & self.mask;
                    let complement = 3 - code;
                    self.rev = (self.rev >> 2) | (complement << (2 * (self.k - 1)));
                    self.valid_run += 1;
                    if self.valid_run >= self.k {
                        let offset = self.pos - self.k;
                        let canonical = if self.fwd <= self.rev {
                            self.fwd
                        } else {
                            self.rev
                        };
                        return Some((offset, EncodedKmer(canonical)));
                    }
                }
                None => {
                    self.valid_run = 0;
                    self.fwd = 0;
                    self.rev = 0;
                }
            }
        }
        None
    }
}

/// Convenience: canonical k-mers without offsets, for callers that only need the set.
pub fn canonical_kmers(seq: &[u8], k: usize) -> impl Iterator<Item = EncodedKmer> + '_ {
    CanonicalKmerIter::new(seq, k).map(|(_, kmer)| kmer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_invariant_matches_revcomp() {
        for seq in [
            b"ACGTACGTACGTACGTACGTACGTACGTACGT".as_slice(),
            b"TTTTTTTTTTTTTTTTTTTTTTTTT".as_slice(),
            b"GATTACAGATTACAGATTACAGATTACA".as_slice(),
        ] {
            for k in [3usize, 11, 25, 31] {
                if seq.len() < k {
                    continue;
                }
                for (_, kmer) in CanonicalKmerIter::new(seq, k) {
                    assert_eq!(kmer, kmer.reverse_complement(k).canonical(k));
                    assert_eq!(kmer.canonical(k).0, kmer.reverse_complement(k).canonical(k).0);
                }
            }
        }
    }

    #[test]
    fn test_short_read_yields_no_kmers() {
        let seq = b"ACGT";
        let out: Vec<_> = CanonicalKmerIter::new(seq, 5).collect();
        assert!(out.is_empty());
    }

    #[test]
    fn test_n_splits_window() {
        // "ACGTN ACGT" (no space) with k=4: the N must prevent any 4-mer from
        // spanning it.
        let seq = b"ACGTNACGT";
        let out: Vec<_> = CanonicalKmerIter::new(seq, 4).collect();
        for (offset, _) in &out {
            assert!(*offset + 4 <= 4 || *offset >= 5, "kmer spans the N at offset {offset}");
        }
        assert_eq!(out.len(), 2); // "ACGT" (0..4) and "ACGT" (5..9)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let kmer = b"ACGTGGTTCA";
        let encoded = EncodedKmer::encode(kmer).unwrap();
        assert_eq!(encoded.decode(kmer.len()), kmer);
    }

    #[test]
    fn test_reverse_complement_encoded() {
        let kmer = EncodedKmer::encode(b"ACGT").unwrap();
        let rc = kmer.reverse_complement(4);
        assert_eq!(rc.decode(4), b"ACGT"); // palindrome
        let kmer2 = EncodedKmer::encode(b"AAAA").unwrap();
        assert_eq!(kmer2.reverse_complement(4).decode(4), b"TTTT");
    }

    #[test]
    fn test_canonical_is_lexicographic_min() {
        let a = EncodedKmer::encode(b"CGTA").unwrap();
        let canon = a.canonical(4);
        let rc = canonical_kmer_bytes(b"CGTA");
        assert_eq!(canon.decode(4), rc);
    }

    #[test]
    fn test_k32_does_not_overflow() {
        let seq = vec![b'A'; 40];
        let out: Vec<_> = CanonicalKmerIter::new(&seq, 32).collect();
        assert_eq!(out.len(), 9);
    }
}
