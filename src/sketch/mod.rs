//! Probabilistic k-mer abundance sketches.
//!
//! A [`Sketch`] is a Count-Min-style array of `h` independent hash tables of
//! width `w`. `add` increments all `h` cells for a k-mer (saturating at
//! [`Sketch::ceiling`]); `count` returns the min across tables. A
//! presence-only variant (`SketchKind::Presence`) uses 1-bit cells and
//! `contains` requires all `h` bits set. Only canonical k-mers
//! ([`crate::bio::kmer`]) are ever inserted or queried.
//!
//! Hashing follows the spec's double-hashing scheme: two independent 64-bit
//! hashes `(h1, h2)` are combined as `h1 + i*h2` for table `i` (Kirsch-
//! Mitzenmacher), using `fxhash` for both (teacher crate already depends on
//! a fast non-cryptographic hasher family via `rustc-hash`-adjacent choices
//! in the retrieval pack; `fxhash` is the one the pack's reference-genome
//! tool, `LudvigOlsen-reference`, ships).

use crate::bio::kmer::EncodedKmer;
use crate::error::PipelineError;
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"KVSK";
const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchKind {
    /// Saturating counters, one `u16` per cell.
    Counting,
    /// Single-bit presence cells.
    Presence,
}

impl SketchKind {
    fn as_byte(self) -> u8 {
        match self {
            SketchKind::Counting => 0,
            SketchKind::Presence => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self, PipelineError> {
        match b {
            0 => Ok(SketchKind::Counting),
            1 => Ok(SketchKind::Presence),
            other => Err(PipelineError::InvariantViolated(format!(
                "unknown sketch kind byte {other}"
            ))),
        }
    }
}

enum Cells {
    Counting(Vec<u16>),
    /// One bit per cell, packed into `u64` words.
    Presence(Vec<u64>),
}

/// A Count-Min/Bloom-style abundance sketch over canonical k-mers.
pub struct Sketch {
    k: u8,
    h: u8,
    w: u64,
    ceiling: u32,
    kind: SketchKind,
    cells: Cells,
    /// Number of `add()` calls observed, used for the FPR estimate.
    n_inserted: u64,
}

/// Target byte budget -> per-table width, sizing helper for §4.A's
/// "W per table ≈ M/H rounded to a prime".
fn width_from_budget(bytes_budget: u64, h: u8, bytes_per_cell: u64) -> u64 {
    let per_table = (bytes_budget / (h as u64).max(1) / bytes_per_cell.max(1)).max(2);
    next_prime(per_table)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3u64;
    while i.saturating_mul(i) <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

fn next_prime(mut n: u64) -> u64 {
    if n < 2 {
        n = 2;
    }
    if n % 2 == 0 {
        n += 1;
    }
    while !is_prime(n) {
        n += 2;
    }
    n
}

fn hash_pair(kmer: EncodedKmer) -> (u64, u64) {
    let h1 = fxhash::hash64(&kmer.0);
    let h2 = fxhash::hash64(&(kmer.0 ^ 0x9E37_79B9_7F4A_7C15u64));
    (h1, h2)
}

impl Sketch {
    /// Builds a new counting sketch sized to a byte budget `bytes_budget`
    /// split across `h` hash tables, with saturating ceiling `ceiling`.
    pub fn new_counting(k: u8, h: u8, bytes_budget: u64, ceiling: u32) -> Self {
        let w = width_from_budget(bytes_budget, h, 2);
        let ceiling = ceiling.min(u16::MAX as u32);
        Sketch {
            k,
            h,
            w,
            ceiling,
            kind: SketchKind::Counting,
            cells: Cells::Counting(vec![0u16; h as usize * w as usize]),
            n_inserted: 0,
        }
    }

    /// Builds a new presence-only sketch sized to a byte budget.
    pub fn new_presence(k: u8, h: u8, bytes_budget: u64) -> Self {
        let w = width_from_budget(bytes_budget, h, 1).max(64);
        let words = (h as u64 * w).div_ceil(64) as usize;
        Sketch {
            k,
            h,
            w,
            ceiling: 1,
            kind: SketchKind::Presence,
            cells: Cells::Presence(vec![0u64; words]),
            n_inserted: 0,
        }
    }

    pub fn k(&self) -> u8 {
        self.k
    }

    pub fn h(&self) -> u8 {
        self.h
    }

    pub fn w(&self) -> u64 {
        self.w
    }

    pub fn kind(&self) -> SketchKind {
        self.kind
    }

    fn slot(&self, kmer: EncodedKmer, table: u8) -> u64 {
        let (h1, h2) = hash_pair(kmer);
        let combined = h1.wrapping_add((table as u64).wrapping_mul(h2));
        combined % self.w
    }

    fn bit_index(&self, table: u8, slot: u64) -> u64 {
        table as u64 * self.w + slot
    }

    /// Inserts a canonical k-mer, saturating all `h` cells at `ceiling`.
    pub fn add(&mut self, kmer: EncodedKmer) {
        self.n_inserted += 1;
        for table in 0..self.h {
            let slot = self.slot(kmer, table) as usize;
            let bit = self.bit_index(table, slot as u64);
            match &mut self.cells {
                Cells::Counting(cells) => {
                    let idx = table as usize * self.w as usize + slot;
                    let ceiling = self.ceiling as u16;
                    if cells[idx] < ceiling {
                        cells[idx] += 1;
                    }
                }
                Cells::Presence(words) => {
                    let (word, offset) = ((bit / 64) as usize, bit % 64);
                    words[word] |= 1u64 << offset;
                }
            }
        }
    }

    /// Count-min estimate (minimum across the `h` cells); for a presence
    /// sketch this is `1` if present, `0` otherwise.
    pub fn count(&self, kmer: EncodedKmer) -> u16 {
        match &self.cells {
            Cells::Counting(cells) => (0..self.h)
                .map(|table| {
                    let slot = self.slot(kmer, table) as usize;
                    cells[table as usize * self.w as usize + slot]
                })
                .min()
                .unwrap_or(0),
            Cells::Presence(_) => u16::from(self.contains(kmer)),
        }
    }

    /// `true` if every one of the `h` cells for this k-mer is non-zero
    /// (counting sketch) or set (presence sketch).
    pub fn contains(&self, kmer: EncodedKmer) -> bool {
        match &self.cells {
            Cells::Counting(cells) => (0..self.h).all(|table| {
                let slot = self.slot(kmer, table) as usize;
                cells[table as usize * self.w as usize + slot] > 0
            }),
            Cells::Presence(words) => (0..self.h).all(|table| {
                let slot = self.slot(kmer, table);
                let bit = self.bit_index(table, slot);
                let (word, offset) = ((bit / 64) as usize, bit % 64);
                (words[word] >> offset) & 1 == 1
            }),
        }
    }

    /// Non-zero cell values from the sketch's first hash table, a cheap
    /// stand-in for the true k-mer abundance histogram used to estimate
    /// haploid coverage (μ, σ) for genotype likelihoods. Collisions inflate
    /// a minority of cells but the bulk of the distribution is unaffected
    /// at typical fill ratios.
    pub fn table0_nonzero_counts(&self) -> Vec<u16> {
        match &self.cells {
            Cells::Counting(cells) => cells[..self.w as usize]
                .iter()
                .copied()
                .filter(|&c| c > 0)
                .collect(),
            Cells::Presence(_) => Vec::new(),
        }
    }

    /// `(1 - e^{-n/W})^H`. With uniform width across all `h` tables, the
    /// "product across tables" and "max across tables" pessimism the spec
    /// allows for collapse to this single expression.
    pub fn estimated_fpr(&self) -> f64 {
        let fill = 1.0 - (-(self.n_inserted as f64) / (self.w as f64)).exp();
        fill.powi(self.h as i32)
    }

    pub fn serialize<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        out.write_all(MAGIC)?;
        out.write_all(&[FORMAT_VERSION, self.kind.as_byte(), self.k, self.h])?;
        out.write_all(&self.w.to_le_bytes())?;
        out.write_all(&self.ceiling.to_le_bytes())?;
        match &self.cells {
            Cells::Counting(cells) => {
                for cell in cells {
                    out.write_all(&cell.to_le_bytes())?;
                }
            }
            Cells::Presence(words) => {
                for word in words {
                    out.write_all(&word.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    pub fn load<R: Read>(mut input: R) -> Result<Self, PipelineError> {
        let mut magic = [0u8; 4];
        input
            .read_exact(&mut magic)
            .map_err(|_| PipelineError::InvariantViolated("truncated sketch header".into()))?;
        if &magic != MAGIC {
            return Err(PipelineError::InvariantViolated(
                "bad sketch magic: not a KVSK sketch file".into(),
            ));
        }
        let mut header = [0u8; 4];
        input
            .read_exact(&mut header)
            .map_err(|e| PipelineError::Io(e))?;
        let [version, kind_byte, k, h] = header;
        if version != FORMAT_VERSION {
            return Err(PipelineError::InvariantViolated(format!(
                "unsupported sketch version {version}"
            )));
        }
        let kind = SketchKind::from_byte(kind_byte)?;
        let mut w_bytes = [0u8; 8];
        input.read_exact(&mut w_bytes).map_err(PipelineError::Io)?;
        let w = u64::from_le_bytes(w_bytes);
        let mut ceiling_bytes = [0u8; 4];
        input
            .read_exact(&mut ceiling_bytes)
            .map_err(PipelineError::Io)?;
        let ceiling = u32::from_le_bytes(ceiling_bytes);

        let cells = match kind {
            SketchKind::Counting => {
                let mut cells = vec![0u16; h as usize * w as usize];
                let mut buf = [0u8; 2];
                for cell in cells.iter_mut() {
                    input.read_exact(&mut buf).map_err(PipelineError::Io)?;
                    *cell = u16::from_le_bytes(buf);
                }
                Cells::Counting(cells)
            }
            SketchKind::Presence => {
                let words_len = (h as u64 * w).div_ceil(64) as usize;
                let mut words = vec![0u64; words_len];
                let mut buf = [0u8; 8];
                for word in words.iter_mut() {
                    input.read_exact(&mut buf).map_err(PipelineError::Io)?;
                    *word = u64::from_le_bytes(buf);
                }
                Cells::Presence(words)
            }
        };

        Ok(Sketch {
            k,
            h,
            w,
            ceiling,
            kind,
            cells,
            n_inserted: 0,
        })
    }

    /// Fatal check used whenever two sketches (or a sketch and a run
    /// parameter) must agree on K -- §7: "K mismatch across inputs: Fatal".
    pub fn check_k_matches(&self, expected_k: u8) -> Result<(), PipelineError> {
        if self.k != expected_k {
            return Err(PipelineError::InvariantViolated(format!(
                "sketch K={} does not match pipeline K={}",
                self.k, expected_k
            )));
        }
        Ok(())
    }
}
