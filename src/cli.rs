//! Thin `clap`-derive CLI wiring the library's pipeline stages to files.
//! Carries no pipeline logic of its own (§10.4): it parses arguments, opens
//! files, and calls into `denovo_kmer::pipeline`.

use denovo_kmer::config::RunConfig;
use denovo_kmer::error::PipelineError;
use denovo_kmer::io::ReadStream;
use denovo_kmer::pipeline::{self, count, novel};
use denovo_kmer::sketch::Sketch;
use denovo_kmer::types::Read;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Reference-free k-mer novelty de novo variant caller")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum SketchCommand {
    /// Build a sketch from a read stream.
    Build {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 'k', long, default_value_t = 25)]
        k: usize,
        #[arg(long, default_value_t = 4)]
        hashes: u8,
        #[arg(long, default_value_t = 256 * 1024 * 1024)]
        bytes: u64,
        #[arg(long, default_value_t = 255)]
        ceiling: u32,
        #[arg(long)]
        presence: bool,
    },
    /// Build a sketch cascaded off an existing sample-0 sketch.
    Cascade {
        #[arg(short, long)]
        input: String,
        #[arg(long)]
        sample0: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 'k', long, default_value_t = 25)]
        k: usize,
        #[arg(long, default_value_t = 4)]
        hashes: u8,
        #[arg(long, default_value_t = 256 * 1024 * 1024)]
        bytes: u64,
        #[arg(long, default_value_t = 255)]
        ceiling: u32,
        #[arg(long, default_value_t = 1.0)]
        fraction: f64,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sketch construction.
    Sketch {
        #[command(subcommand)]
        command: SketchCommand,
    },
    /// Stage C: stream novel reads out of a proband file against case/control sketches.
    Novel {
        #[arg(short, long)]
        input: String,
        #[arg(long)]
        case_sketch: PathBuf,
        #[arg(long)]
        control_sketch: Vec<PathBuf>,
        #[arg(long, default_value_t = 25)]
        k: usize,
        #[arg(long, default_value_t = 8)]
        case_min: u16,
        #[arg(long, default_value_t = 1)]
        ctrl_max: u16,
    },
    /// Run the full A->I pipeline and emit a VCF.
    Run {
        #[arg(long)]
        proband: String,
        #[arg(long)]
        control: Vec<String>,
        #[arg(long)]
        reference: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
}

pub fn run_cli(cli: Cli) -> Result<(), PipelineError> {
    match cli.command {
        Commands::Sketch { command } => run_sketch_command(command),
        Commands::Novel {
            input,
            case_sketch,
            control_sketch,
            k,
            case_min,
            ctrl_max,
        } => run_novel_command(input, case_sketch, control_sketch, k, case_min, ctrl_max),
        Commands::Run {
            proband,
            control,
            reference,
            output,
            config,
            summary_json,
        } => run_full_pipeline(proband, control, reference, output, config, summary_json),
    }
}

fn run_sketch_command(command: SketchCommand) -> Result<(), PipelineError> {
    match command {
        SketchCommand::Build {
            input,
            output,
            k,
            hashes,
            bytes,
            ceiling,
            presence,
        } => {
            let mut sketch = if presence {
                Sketch::new_presence(k as u8, hashes, bytes)
            } else {
                Sketch::new_counting(k as u8, hashes, bytes, ceiling)
            };
            let reads = ReadStream::open(&input)?;
            let report = count::count_sample(reads, k, &mut sketch, None)?;
            log::info!(
                "sketch build: {} reads, {} k-mers, FPR {:.5}",
                report.reads_processed,
                report.kmers_stored,
                report.estimated_fpr
            );
            let file = File::create(&output)?;
            sketch.serialize(BufWriter::new(file))?;
            Ok(())
        }
        SketchCommand::Cascade {
            input,
            sample0,
            output,
            k,
            hashes,
            bytes,
            ceiling,
            fraction,
        } => {
            let sample0_sketch = Sketch::load(File::open(&sample0)?)?;
            sample0_sketch.check_k_matches(k as u8)?;
            let mut sketch = Sketch::new_counting(k as u8, hashes, bytes, ceiling);
            let reads = ReadStream::open(&input)?;
            let report = count::count_sample(
                reads,
                k,
                &mut sketch,
                Some((&sample0_sketch, fraction)),
            )?;
            log::info!(
                "sketch cascade: {} reads, {} k-mers admitted",
                report.reads_processed,
                report.kmers_stored
            );
            let file = File::create(&output)?;
            sketch.serialize(BufWriter::new(file))?;
            Ok(())
        }
    }
}

fn run_novel_command(
    input: String,
    case_sketch_path: PathBuf,
    control_sketch_paths: Vec<PathBuf>,
    k: usize,
    case_min: u16,
    ctrl_max: u16,
) -> Result<(), PipelineError> {
    let case_sketch = Sketch::load(File::open(&case_sketch_path)?)?;
    case_sketch.check_k_matches(k as u8)?;
    let mut control_sketches = Vec::new();
    for path in &control_sketch_paths {
        let sketch = Sketch::load(File::open(path)?)?;
        sketch.check_k_matches(k as u8)?;
        control_sketches.push(sketch);
    }
    let control_refs: Vec<&Sketch> = control_sketches.iter().collect();
    let params = novel::NovelParams {
        k,
        case_min,
        ctrl_max,
        abund_screen: None,
    };
    let reads = ReadStream::open(&input)?;
    let mut emitted = 0u64;
    for read_result in reads {
        let read: Read = read_result?;
        if novel::annotate_read(read, &case_sketch, &control_refs, &params).is_some() {
            emitted += 1;
        }
    }
    log::info!("novel: {emitted} reads retained");
    Ok(())
}

fn run_full_pipeline(
    proband: String,
    control: Vec<String>,
    reference: String,
    output: PathBuf,
    config_path: Option<PathBuf>,
    summary_json: Option<PathBuf>,
) -> Result<(), PipelineError> {
    let config = match config_path {
        Some(path) => RunConfig::load(path)
            .map_err(|e| PipelineError::Usage(format!("bad config file: {e}")))?,
        None => RunConfig::default(),
    };

    let inputs = pipeline::RunInputs {
        proband_path: proband,
        control_paths: control,
        reference_path: reference,
    };

    let file = File::create(&output)?;
    let summary = pipeline::run(&inputs, &config, BufWriter::new(file))?;

    if let Some(path) = summary_json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| PipelineError::InvariantViolated(format!("summary serialization: {e}")))?;
        std::fs::write(path, text)?;
    }

    Ok(())
}
