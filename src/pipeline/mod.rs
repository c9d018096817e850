//! Pipeline stage modules (A-I) and the `run` orchestration that wires them
//! end to end: Sketch/Count -> Novel -> Filter -> Partition -> a
//! worker-pool-parallel Assemble -> Localize -> Call -> Likelihood block,
//! writing completed variant calls to a single VCF sink (§5).

pub mod assemble;
pub mod call;
pub mod count;
pub mod filter;
pub mod likelihood;
pub mod localize;
pub mod novel;
pub mod partition;

use crate::config::RunConfig;
use crate::error::{LossReason, PipelineError, RunSummary};
use crate::io::{ReadStream, ReferenceIndex};
use crate::sketch::Sketch;
use crate::types::{AugmentedRead, Partition, VariantCall};
use crate::vcf::VcfWriter;
use log::{debug, info, warn};
use std::io::Write;

/// Paths consumed by one full pipeline run: one proband stream, one or more
/// control streams (typically parents), and a reference FASTA.
pub struct RunInputs {
    pub proband_path: String,
    pub control_paths: Vec<String>,
    pub reference_path: String,
}

/// Builds a presence sketch over every canonical k-mer in `path` (a FASTA or
/// FASTQ file), reusing [`count::count_sample`] the same way a sample sketch
/// is built -- the reference is just another sequence stream.
fn build_reference_sketch(
    path: &str,
    k: usize,
    bytes_budget: u64,
) -> Result<Sketch, PipelineError> {
    let mut sketch = Sketch::new_presence(k as u8, 3, bytes_budget);
    let reads = ReadStream::open(path)?;
    count::count_sample(reads, k, &mut sketch, None)?;
    Ok(sketch)
}

/// Stages A+B: build the proband's case sketch and every control sketch,
/// cascaded off the proband (§4.A: "any k-mer missing from sample 0 is
/// missing from all").
fn build_sample_sketches(
    inputs: &RunInputs,
    config: &RunConfig,
) -> Result<(Sketch, Vec<Sketch>), PipelineError> {
    let mut case_sketch = Sketch::new_counting(
        config.k as u8,
        config.sketch_hashes,
        config.sketch_bytes,
        config.sketch_ceiling,
    );
    let proband_reads = ReadStream::open(&inputs.proband_path)?;
    let case_report = count::count_sample(proband_reads, config.k, &mut case_sketch, None)?;
    info!(
        "proband sketch: {} reads, {} k-mers stored, FPR {:.5}",
        case_report.reads_processed, case_report.kmers_stored, case_report.estimated_fpr
    );

    let mut control_sketches = Vec::with_capacity(inputs.control_paths.len());
    for path in &inputs.control_paths {
        let mut control_sketch = Sketch::new_counting(
            config.k as u8,
            config.sketch_hashes,
            config.sketch_bytes,
            config.sketch_ceiling,
        );
        let control_reads = ReadStream::open(path)?;
        let report = count::count_sample(
            control_reads,
            config.k,
            &mut control_sketch,
            Some((&case_sketch, config.cascade_fraction)),
        )?;
        info!(
            "control sketch {path}: {} reads, {} k-mers stored",
            report.reads_processed, report.kmers_stored
        );
        control_sketches.push(control_sketch);
    }

    Ok((case_sketch, control_sketches))
}

/// Stages C+D: stream the proband reads a second time through the novelty
/// filter, then refine the surviving annotations against the reference.
fn novel_and_filter(
    inputs: &RunInputs,
    config: &RunConfig,
    case_sketch: &Sketch,
    control_sketches: &[Sketch],
    reference_sketch: &Sketch,
    summary: &mut RunSummary,
) -> Result<Vec<AugmentedRead>, PipelineError> {
    let control_refs: Vec<&Sketch> = control_sketches.iter().collect();
    let novel_params = novel::NovelParams {
        k: config.k,
        case_min: config.case_min,
        ctrl_max: config.ctrl_max_u16(),
        abund_screen: config.abund_screen,
    };

    let proband_reads = ReadStream::open(&inputs.proband_path)?;
    let mut novel_reads = Vec::new();
    let mut malformed = 0u64;
    for read_result in proband_reads {
        summary.reads_processed += 1;
        match read_result {
            Ok(read) => {
                if let Some(augmented) =
                    novel::annotate_read(read, case_sketch, &control_refs, &novel_params)
                {
                    novel_reads.push(augmented);
                }
            }
            Err(e) => {
                malformed += 1;
                warn!("malformed proband record skipped: {e}");
                if malformed > config.max_malformed_records {
                    return Err(PipelineError::MalformedInput(format!(
                        "exceeded malformed-record budget ({malformed})"
                    )));
                }
            }
        }
    }
    summary.malformed_records_skipped += malformed;
    summary.reads_novel = novel_reads.len() as u64;
    info!("novel: {} reads retained", novel_reads.len());

    let refined = filter::refine_corpus(
        novel_reads,
        config.k,
        reference_sketch,
        config.case_min,
        None,
        config.sketch_bytes / 8,
    );
    info!("filter: {} reads survived refinement", refined.len());
    Ok(refined)
}

/// Runs Assemble -> Localize -> Call -> Likelihood for one partition,
/// returning its calls and, on total failure, the loss reason to record.
fn process_partition(
    partition: &Partition,
    config: &RunConfig,
    reference: &ReferenceIndex,
    case_sketch: &Sketch,
    control_sketches: &[Sketch],
    case_stats: likelihood::CoverageStats,
    control_stats: &[likelihood::CoverageStats],
) -> (Vec<VariantCall>, Option<LossReason>) {
    let contigs =
        assemble::assemble_partition(partition, config.k, config.min_overlap, config.min_contig_len);
    if contigs.is_empty() {
        return (Vec::new(), Some(LossReason::AssemblyFail));
    }

    let localize_params = localize::LocalizeParams {
        seed_k: config.k.min(reference.seed_k()),
        seed_spacing: config.seed_spacing,
        cluster_band: config.cluster_band,
        window_pad: config.window_pad,
    };
    let call_params = call::CallParams {
        k: config.k,
        match_score: config.match_score,
        mismatch_score: config.mismatch_score,
        gap_open: config.gap_open,
        gap_extend: config.gap_extend,
        window_pad: config.window_pad,
        indel_merge_window: config.indel_merge_window,
        terminal_snv_distance: config.terminal_snv_distance,
        allow_terminal_snv: config.allow_terminal_snv,
        band_seed_k: config.k.min(8),
        band_width: 50,
    };

    let mut calls = Vec::new();
    let mut any_localized = false;
    let mut any_aligned = false;

    for contig in &contigs {
        let windows = localize::localize_contig(contig, reference, &localize_params);
        if windows.is_empty() {
            continue;
        }
        any_localized = true;

        // A contig may localize to several candidate windows; only the
        // best-scoring alignment's calls are kept (§4.H).
        let mut best: Option<(i32, Vec<VariantCall>)> = None;
        for window in &windows {
            match call::call_variants(contig, window, &call_params) {
                Ok((score, contig_calls)) => {
                    any_aligned = true;
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, contig_calls));
                    }
                }
                Err(()) => continue,
            }
        }

        if let Some((_, contig_calls)) = best {
            for mut vcall in contig_calls {
                let control_refs: Vec<&Sketch> = control_sketches.iter().collect();
                likelihood::score_call(
                    &mut vcall,
                    case_sketch,
                    case_stats,
                    &control_refs,
                    control_stats,
                );
                calls.push(vcall);
            }
        }
    }

    if !any_localized {
        return (Vec::new(), Some(LossReason::NoReferenceMatch));
    }
    if !any_aligned {
        return (Vec::new(), Some(LossReason::AlignmentFail));
    }
    calls.sort_by(|a, b| (a.seqid.clone(), a.pos).cmp(&(b.seqid.clone(), b.pos)));
    calls.dedup_by(|a, b| a.seqid == b.seqid && a.pos == b.pos && a.ref_allele == b.ref_allele && a.alt_allele == b.alt_allele);
    (calls, None)
}

/// Runs the full A->I pipeline and writes a VCF to `output`. The
/// Assemble->Localize->Call->Likelihood block runs on a bounded worker pool
/// (§5): a fixed number of threads pull partitions from a shared
/// `crossbeam_channel` queue, and the main thread is the sole writer.
pub fn run<W: Write>(
    inputs: &RunInputs,
    config: &RunConfig,
    output: W,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new();

    let (case_sketch, control_sketches) = build_sample_sketches(inputs, config)?;
    if case_sketch.estimated_fpr() > config.fpr_ceiling {
        warn!(
            "case sketch FPR {:.5} exceeds ceiling {:.5}; marking run low-confidence",
            case_sketch.estimated_fpr(),
            config.fpr_ceiling
        );
        summary.low_confidence = true;
    }

    let reference = ReferenceIndex::load(&inputs.reference_path, config.k.min(16).max(8))?;
    let reference_sketch =
        build_reference_sketch(&inputs.reference_path, config.k, config.sketch_bytes)?;

    let refined_reads = novel_and_filter(
        inputs,
        config,
        &case_sketch,
        &control_sketches,
        &reference_sketch,
        &mut summary,
    )?;

    let partition_params = partition::PartitionParams {
        min_shared_kmers: config.min_shared_kmers,
        min_partition_size: config.min_partition_size,
    };
    let mut partitions = partition::partition_reads(refined_reads, &partition_params);
    summary.partitions_total = partitions.len() as u64;

    partitions.retain(|p| {
        if p.len() < config.min_partition_size {
            summary.record_loss(p.label.clone(), LossReason::PartitionTooSmall);
            false
        } else {
            true
        }
    });

    let case_stats = likelihood::estimate_coverage_stats(&case_sketch, 0.05);
    let control_stats: Vec<likelihood::CoverageStats> = control_sketches
        .iter()
        .map(|s| likelihood::estimate_coverage_stats(s, 0.05))
        .collect();

    let worker_count = config.worker_threads().max(1);
    debug!("assemble/localize/call/likelihood pool: {worker_count} workers");

    let (partition_tx, partition_rx) = crossbeam_channel::unbounded::<Partition>();
    let (result_tx, result_rx) =
        crossbeam_channel::unbounded::<(String, Vec<VariantCall>, Option<LossReason>)>();
    for p in partitions {
        partition_tx.send(p).expect("partition channel is open");
    }
    drop(partition_tx);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let partition_rx = partition_rx.clone();
            let result_tx = result_tx.clone();
            let reference = &reference;
            let case_sketch = &case_sketch;
            let control_sketches = &control_sketches;
            let case_stats = case_stats;
            let control_stats = &control_stats;
            scope.spawn(move || {
                while let Ok(partition) = partition_rx.recv() {
                    let label = partition.label.clone();
                    let (calls, loss) = process_partition(
                        &partition,
                        config,
                        reference,
                        case_sketch,
                        control_sketches,
                        case_stats,
                        control_stats,
                    );
                    result_tx
                        .send((label, calls, loss))
                        .expect("result channel is open");
                }
            });
        }
        drop(result_tx);

        let mut writer = VcfWriter::new(output, "proband", config.k)
            .map_err(PipelineError::Io)?;
        for (label, calls, loss) in result_rx {
            if let Some(reason) = loss {
                summary.record_loss(label, reason);
                continue;
            }
            for call in &calls {
                writer.write_call(call)?;
                summary.variants_emitted += 1;
            }
        }
        Ok::<(), PipelineError>(())
    })?;

    summary.log_final();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(path: &std::path::Path, content: &str) {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn small_config() -> RunConfig {
        RunConfig {
            k: 4,
            sketch_bytes: 4096,
            sketch_hashes: 3,
            sketch_ceiling: 255,
            case_min: 1,
            ctrl_max: 1,
            abund_screen: None,
            cascade_fraction: 1.0,
            min_shared_kmers: 1,
            min_partition_size: 1,
            min_overlap: 4,
            min_contig_len: 4,
            seed_spacing: 1,
            cluster_band: 50,
            window_pad: 2,
            indel_merge_window: 2,
            terminal_snv_distance: 0,
            allow_terminal_snv: true,
            match_score: 1,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
            threads: 1,
            max_malformed_records: 10,
            fpr_ceiling: 1.0,
        }
    }

    #[test]
    fn test_run_with_no_proband_unique_kmers_emits_nothing() {
        let dir = tempdir().unwrap();
        let proband_path = dir.path().join("proband.fq");
        let control_path = dir.path().join("control.fq");
        let reference_path = dir.path().join("reference.fa");

        write_file(&proband_path, "@r1\nACGTACGTACGTACGT\n+\n!!!!!!!!!!!!!!!!\n");
        write_file(&control_path, "@c1\nACGTACGTACGTACGT\n+\n!!!!!!!!!!!!!!!!\n");
        write_file(&reference_path, ">chr1\nACGTACGTACGTACGT\n");

        let inputs = RunInputs {
            proband_path: proband_path.to_string_lossy().into_owned(),
            control_paths: vec![control_path.to_string_lossy().into_owned()],
            reference_path: reference_path.to_string_lossy().into_owned(),
        };

        let mut output = Vec::new();
        let summary = run(&inputs, &small_config(), &mut output).unwrap();
        assert_eq!(summary.reads_novel, 0);
        assert_eq!(summary.variants_emitted, 0);
    }
}
