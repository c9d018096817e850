//! Stage I: trio genotype-likelihood scoring.
//!
//! Estimates each sample's haploid coverage (μ, σ) from its sketch's
//! abundance histogram, scores the three genotypes `{0/0, 0/1, 1/1}` for
//! proband and parents from the variant's RW/VW k-mer sets, and reduces
//! that to the *de novo* log-likelihood score: `log P(parents hom-ref) -
//! log P(parents transmitting)` (the shared "proband het" term cancels out
//! of the spec's `log P(proband het, parents hom-ref) - log P(proband het,
//! parents transmitting)` difference).

use crate::sketch::Sketch;
use crate::types::VariantCall;
use statrs::distribution::{Continuous, Normal};

#[derive(Debug, Clone, Copy)]
pub struct CoverageStats {
    pub mu: f64,
    pub sigma: f64,
}

/// Estimates haploid coverage from the non-zero cells of a sample's
/// sketch, trimming the top `tail_fraction` of values (spec: "excluding
/// the tail") before taking mean/sd.
pub fn estimate_coverage_stats(sketch: &Sketch, tail_fraction: f64) -> CoverageStats {
    let mut counts: Vec<f64> = sketch
        .table0_nonzero_counts()
        .into_iter()
        .map(f64::from)
        .collect();
    if counts.is_empty() {
        return CoverageStats { mu: 1.0, sigma: 1.0 };
    }
    counts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let keep = ((counts.len() as f64) * (1.0 - tail_fraction.clamp(0.0, 0.99))).ceil() as usize;
    let trimmed = &counts[..keep.max(1).min(counts.len())];

    let mu = trimmed.iter().sum::<f64>() / trimmed.len() as f64;
    let variance = trimmed.iter().map(|c| (c - mu).powi(2)).sum::<f64>() / trimmed.len() as f64;
    CoverageStats {
        mu: mu.max(1.0),
        sigma: variance.sqrt().max(0.5),
    }
}

/// Mean abundance of `kmers` in `sketch`, `0.0` for an empty set.
fn mean_abundance(sketch: &Sketch, kmers: &[crate::bio::kmer::EncodedKmer]) -> f64 {
    if kmers.is_empty() {
        return 0.0;
    }
    let sum: u64 = kmers.iter().map(|&k| sketch.count(k) as u64).sum();
    sum as f64 / kmers.len() as f64
}

/// `P(observed alt-kmer abundance | genotype g)` under `Normal(mu*g,
/// sigma*sqrt(g))`, with a variance floor at `g=0` (hom-ref) so the
/// distribution stays well-defined around the sequencing-error baseline.
fn genotype_density(observed: f64, stats: CoverageStats, g: f64) -> f64 {
    let mean = stats.mu * g;
    let sd = (stats.sigma * g.sqrt()).max(stats.sigma * 0.1);
    Normal::new(mean, sd)
        .map(|dist| dist.pdf(observed))
        .unwrap_or(f64::MIN_POSITIVE)
        .max(f64::MIN_POSITIVE)
}

/// Scores one sample's three genotype likelihoods from its VW-kmer mean
/// abundance (alt support).
pub fn genotype_likelihoods(sketch: &Sketch, call: &VariantCall, stats: CoverageStats) -> [f64; 3] {
    let observed_alt = mean_abundance(sketch, &call.variant_window_kmers);
    [
        genotype_density(observed_alt, stats, 0.0),
        genotype_density(observed_alt, stats, 1.0),
        genotype_density(observed_alt, stats, 2.0),
    ]
}

/// Computes the de novo log-likelihood score for one proband/parents trio
/// and attaches the result (and `LikelihoodFail` filter, if negative) to `call`.
pub fn score_call(
    call: &mut VariantCall,
    proband_sketch: &Sketch,
    proband_stats: CoverageStats,
    parent_sketches: &[&Sketch],
    parent_stats: &[CoverageStats],
) {
    let proband_likelihoods = genotype_likelihoods(proband_sketch, call, proband_stats);
    let proband_het_log = proband_likelihoods[1].ln();

    let mut parents_hom_ref_log = 0.0;
    let mut parents_transmitting_log = 0.0;
    for (sketch, stats) in parent_sketches.iter().zip(parent_stats) {
        let likelihoods = genotype_likelihoods(sketch, call, *stats);
        parents_hom_ref_log += likelihoods[0].ln();
        parents_transmitting_log += likelihoods[1].max(likelihoods[2]).ln();
    }

    let score =
        (proband_het_log + parents_hom_ref_log) - (proband_het_log + parents_transmitting_log);
    call.likelihood = score;
    if score < 0.0 {
        call.filters.push("LikelihoodFail".to_string());
    } else if call.filters.is_empty() {
        call.filters.push("PASS".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::kmer::EncodedKmer;
    use crate::types::VariantKind;

    fn sketch_with_abundance(kmer: EncodedKmer, count: u16) -> Sketch {
        let mut sketch = Sketch::new_counting(4, 3, 65536, 65535);
        for _ in 0..count {
            sketch.add(kmer);
        }
        sketch
    }

    fn call_with_vw(kmer: EncodedKmer) -> VariantCall {
        VariantCall {
            seqid: "chr1".into(),
            pos: 100,
            ref_allele: vec![b'A'],
            alt_allele: vec![b'T'],
            kind: VariantKind::Snv,
            supporting_kmers: vec![],
            reference_window_kmers: vec![],
            variant_window_kmers: vec![kmer],
            likelihood: 0.0,
            filters: vec![],
        }
    }

    #[test]
    fn test_de_novo_variant_scores_positive() {
        let kmer = EncodedKmer::encode(b"ACGT").unwrap();
        let proband = sketch_with_abundance(kmer, 15); // ~het coverage
        let mom = sketch_with_abundance(kmer, 0); // hom-ref
        let dad = sketch_with_abundance(kmer, 0); // hom-ref
        let stats = CoverageStats { mu: 30.0, sigma: 5.0 };

        let mut call = call_with_vw(kmer);
        score_call(&mut call, &proband, stats, &[&mom, &dad], &[stats, stats]);
        assert!(call.likelihood > 0.0);
        assert!(call.filters.contains(&"PASS".to_string()));
    }

    #[test]
    fn test_inherited_variant_scores_negative() {
        let kmer = EncodedKmer::encode(b"ACGT").unwrap();
        let proband = sketch_with_abundance(kmer, 15);
        let mom = sketch_with_abundance(kmer, 15); // mom also het: transmitting
        let dad = sketch_with_abundance(kmer, 0);
        let stats = CoverageStats { mu: 30.0, sigma: 5.0 };

        let mut call = call_with_vw(kmer);
        score_call(&mut call, &proband, stats, &[&mom, &dad], &[stats, stats]);
        assert!(call.likelihood < 0.0);
        assert!(call.filters.contains(&"LikelihoodFail".to_string()));
    }

    #[test]
    fn test_coverage_stats_on_empty_sketch_has_sane_defaults() {
        let sketch = Sketch::new_counting(4, 3, 4096, 255);
        let stats = estimate_coverage_stats(&sketch, 0.05);
        assert!(stats.mu > 0.0);
        assert!(stats.sigma > 0.0);
    }
}
