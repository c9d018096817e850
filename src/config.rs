//! Pipeline run configuration.
//!
//! Parameters live in one `RunConfig`, loadable from a JSON file and
//! overridable by CLI flags (config file first, flags win), mirroring the
//! teacher's use of `serde_json` for its results sidecar.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Canonical k-mer length, fixed for the whole run.
    pub k: usize,

    /// Target byte budget per sketch.
    pub sketch_bytes: u64,
    /// Number of independent hash tables per sketch.
    pub sketch_hashes: u8,
    /// Saturating count ceiling (e.g. 255 or 65535).
    pub sketch_ceiling: u32,

    /// Minimum case-sketch count for a k-mer to be considered novel.
    pub case_min: u16,
    /// Maximum control-sketch count (inclusive) for a k-mer to still count as novel.
    pub ctrl_max: u16,
    /// Below this case count, the whole read is dropped before the novelty test.
    /// `None` disables the screen.
    pub abund_screen: Option<u16>,

    /// Cascaded sizing: fraction of sample-0-present k-mers admitted into downstream sketches.
    pub cascade_fraction: f64,

    /// Minimum shared-k-mer edge weight kept by Partition's edge pruning.
    pub min_shared_kmers: usize,
    /// Partitions below this many reads are dropped with `PartitionTooSmall`.
    pub min_partition_size: usize,

    /// Minimum exact overlap for the greedy assembly fallback.
    pub min_overlap: usize,
    /// Minimum contig length to emit.
    pub min_contig_len: usize,

    /// Spacing between seed k-mers extracted from a contig for localization.
    pub seed_spacing: usize,
    /// Band width for clustering seed hits on the same reference sequence.
    pub cluster_band: u64,
    /// Padding added on either side of a localized reference window.
    pub window_pad: u64,

    /// Distance from a merge to adjacent M/I/D events before they are combined into one call.
    pub indel_merge_window: u64,
    /// Distance from a contig end within which SNVs are suppressed.
    pub terminal_snv_distance: u64,
    /// Allow SNVs within `terminal_snv_distance` of a contig end.
    pub allow_terminal_snv: bool,

    /// Affine-gap alignment scoring.
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,

    /// Number of worker threads for the Assemble->Localize->Call->Likelihood pool.
    /// `0` means "use all available cores".
    pub threads: usize,

    /// Malformed-record budget before a stream aborts outright.
    pub max_malformed_records: u64,

    /// Sketch FPR above which a run is marked low-confidence.
    pub fpr_ceiling: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            k: 25,
            sketch_bytes: 256 * 1024 * 1024,
            sketch_hashes: 4,
            sketch_ceiling: 255,
            case_min: 8,
            ctrl_max: 1, // inclusive, per spec's Open Question resolution
            abund_screen: None,
            cascade_fraction: 1.0,
            min_shared_kmers: 1,
            min_partition_size: 2,
            min_overlap: 25,
            min_contig_len: 50,
            seed_spacing: 10,
            cluster_band: 5_000,
            window_pad: 150,
            indel_merge_window: 10,
            terminal_snv_distance: 12, // source default, "not sacred" per spec
            allow_terminal_snv: false,
            match_score: 1,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
            threads: 0,
            max_malformed_records: 1_000,
            fpr_ceiling: 0.01,
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn worker_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }

    pub fn ctrl_max_u16(&self) -> u16 {
        self.ctrl_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_spec_open_questions() {
        let config = RunConfig::default();
        assert_eq!(config.ctrl_max, 1);
        assert_eq!(config.terminal_snv_distance, 12);
        assert!(!config.allow_terminal_snv);
    }

    #[test]
    fn test_load_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"k":31,"sketch_bytes":1024,"sketch_hashes":3,"sketch_ceiling":255,"case_min":10,"ctrl_max":0,"abund_screen":null,"cascade_fraction":0.5,"min_shared_kmers":2,"min_partition_size":3,"min_overlap":31,"min_contig_len":80,"seed_spacing":12,"cluster_band":2000,"window_pad":100,"indel_merge_window":8,"terminal_snv_distance":12,"allow_terminal_snv":true,"match_score":1,"mismatch_score":-2,"gap_open":-5,"gap_extend":-1,"threads":2,"max_malformed_records":10,"fpr_ceiling":0.05}"#).unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.k, 31);
        assert_eq!(config.ctrl_max, 0);
        assert!(config.allow_terminal_snv);
    }
}
