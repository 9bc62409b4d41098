//! Chromosome-parallel driver for a complete run.
//!
//! A run indexes the input (sorting it first if needed), splits it into one
//! partition per reference contig plus an optional unmapped partition,
//! sanitizes the partitions on a rayon pool, then concatenates the parts in
//! header order and indexes the result.
//!
//! Partitions share nothing: each opens its own BAM reader, reference reader
//! and output file. The first failing partition fails the whole run and no
//! output is published.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use noodles::sam::Header;
use rayon::prelude::*;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::error::{Result, SanitizeError};
use crate::core::header::{add_pg_record, reference_sequence_names, PROGRAM_ID};
use crate::core::sanitizer::{sanitize_partition, PartitionContext};
use crate::core::types::{
    ContigPartition, Partition, PartitionSummary, RunSummary, SanitizeOptions,
};
use crate::io::bam::read_header;
use crate::io::concat::concat;
use crate::io::fasta::{IndexedFasta, ReferenceAccessor};
use crate::io::index::{ensure_indexed, index_path};
use crate::utils::validation::{partition_file_name, validate_paths, validate_processes};

/// Crate version, recorded in the `@PG` header line
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PROCESSES: usize = 10;

/// Above this many processes, each partition gets a second I/O thread
const IO_SPLIT_THRESHOLD: usize = 20;

/// How the process budget is divided between partitions and their I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPlan {
    /// BGZF compression threads per partition writer
    pub io_threads: usize,
    /// Partitions processed at the same time
    pub concurrent_partitions: usize,
}

impl WorkerPlan {
    #[must_use]
    pub fn from_processes(processes: usize) -> Self {
        let processes = processes.max(1);
        if processes > IO_SPLIT_THRESHOLD {
            Self {
                io_threads: 2,
                concurrent_partitions: processes / 2,
            }
        } else {
            Self {
                io_threads: 1,
                concurrent_partitions: processes,
            }
        }
    }
}

/// Everything needed for one run
#[derive(Debug, Clone)]
pub struct SanitizeConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub reference: PathBuf,
    pub processes: usize,
    pub options: SanitizeOptions,

    /// Where partition files are written; defaults to the output's directory
    pub tmp_dir: Option<PathBuf>,
}

impl SanitizeConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            reference: reference.into(),
            processes: DEFAULT_PROCESSES,
            options: SanitizeOptions::default(),
            tmp_dir: None,
        }
    }

    #[must_use]
    pub fn processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    #[must_use]
    pub fn options(mut self, options: SanitizeOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    /// # Errors
    ///
    /// Returns `SanitizeError::InvalidConfig` if the process count is zero,
    /// the input is missing, or the output would overwrite the input.
    pub fn validate(&self) -> Result<()> {
        validate_processes(self.processes)
            .map_err(|e| SanitizeError::InvalidConfig(e.to_string()))?;
        validate_paths(&self.input, &self.output)
            .map_err(|e| SanitizeError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// Command line equivalent to this configuration, for the `@PG CL` field
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut cl = format!(
            "{PROGRAM_ID} --bam {} --out {} --fa {} --p {}",
            self.input.display(),
            self.output.display(),
            self.reference.display(),
            self.processes
        );
        if self.options.is_strict() {
            cl.push_str(" --strict");
        }
        if self.options.keep_unmapped {
            cl.push_str(" --keepunmapped");
        }
        if self.options.keep_secondary {
            cl.push_str(" --keepsecondary");
        }
        cl
    }

    fn work_dir(&self) -> PathBuf {
        self.tmp_dir
            .clone()
            .or_else(|| {
                self.output
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Header contigs the reference can serve, in header order, then the unmapped
/// partition if requested.
pub fn plan_partitions<R: ReferenceAccessor + ?Sized>(
    header: &Header,
    reference: &R,
    keep_unmapped: bool,
) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = reference_sequence_names(header)
        .into_iter()
        .filter(|name| {
            let present = reference.contains(name);
            if !present {
                debug!(contig = %name, "Skipping contig absent from the reference");
            }
            present
        })
        .map(Partition::Contig)
        .collect();

    if keep_unmapped {
        partitions.push(Partition::Unmapped);
    }

    partitions
}

/// De-identify `config.input` into `config.output`.
///
/// # Errors
///
/// Returns the first fatal error: invalid configuration, an unindexed
/// reference, a failed partition, a failed reassembly, or indexing that
/// still fails after sorting.
pub fn run(config: &SanitizeConfig) -> Result<RunSummary> {
    config.validate()?;
    info!("{PROGRAM_ID} v{VERSION}");

    let plan = WorkerPlan::from_processes(config.processes);
    let reference = IndexedFasta::open(&config.reference)?;
    debug!(
        reference = %reference.path().display(),
        contigs = reference.contig_names().len(),
        "Opened reference"
    );

    let input = indexed_input(&config.input, config.processes)?;
    let header = add_pg_record(read_header(&input)?, VERSION, &config.command_line())?;

    let work_dir = config.work_dir();
    let tmp = tempfile::Builder::new()
        .prefix(".bamboozle.")
        .tempdir_in(&work_dir)?;

    let jobs: Vec<ContigPartition> =
        plan_partitions(&header, &reference, config.options.keep_unmapped)
            .into_iter()
            .enumerate()
            .map(|(i, partition)| {
                let name = partition_file_name(i, partition.label());
                ContigPartition::new(partition, tmp.path().join(name))
            })
            .collect();
    drop(reference);

    info!(
        partitions = jobs.len(),
        concurrent = plan.concurrent_partitions,
        io_threads = plan.io_threads,
        "Sanitizing partitions"
    );

    let ctx = PartitionContext {
        input: &input,
        header: &header,
        options: config.options,
        io_threads: plan.io_threads,
    };
    let summaries = run_partitions(&ctx, &jobs, &config.reference, plan)?;

    info!(output = %config.output.display(), "Creating final output");
    let merged = reassemble(&tmp, &jobs, &header, config.processes)?;

    info!("Indexing final output");
    let sorted = tmp.path().join("merged.sorted.bam");
    let indexed = ensure_indexed(&merged, &sorted, config.processes)?;

    publish(&indexed, &config.output)?;
    publish(&index_path(&indexed), &index_path(&config.output))?;

    let summary = RunSummary::new(config.output.clone(), config.options.mode, summaries);
    info!(
        output = %config.output.display(),
        written = summary.records_written,
        dropped = summary.records_dropped,
        "Done"
    );

    Ok(summary)
}

/// The input itself if it already has a `.bai`, otherwise whichever of the
/// input or its sorted copy could be indexed.
fn indexed_input(input: &Path, threads: usize) -> Result<PathBuf> {
    if index_path(input).is_file() {
        debug!(bam = %input.display(), "Using existing index");
        return Ok(input.to_path_buf());
    }

    info!(bam = %input.display(), "Input index not found, indexing");
    ensure_indexed(input, &input.with_extension("sorted.bam"), threads)
}

fn run_partitions(
    ctx: &PartitionContext<'_>,
    jobs: &[ContigPartition],
    reference: &Path,
    plan: WorkerPlan,
) -> Result<Vec<PartitionSummary>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(plan.concurrent_partitions)
        .thread_name(|i| format!("bamboozle-partition-{i}"))
        .build()
        .map_err(|e| SanitizeError::InvalidConfig(format!("Failed to create thread pool: {e}")))?;

    // Collecting into Result stops handing out jobs after the first error
    pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                IndexedFasta::open(reference)
                    .and_then(|mut fasta| sanitize_partition(ctx, job, &mut fasta))
                    .map_err(|e| SanitizeError::partition(job.label(), e))
            })
            .collect::<Result<Vec<_>>>()
    })
}

fn reassemble(
    tmp: &TempDir,
    jobs: &[ContigPartition],
    header: &Header,
    threads: usize,
) -> Result<PathBuf> {
    let merged = tmp.path().join("merged.bam");
    let parts: Vec<PathBuf> = jobs.iter().map(|job| job.output.clone()).collect();

    let written = concat(&merged, &parts, header, threads).map_err(|e| {
        SanitizeError::Reassembly {
            reason: e.to_string(),
        }
    })?;
    debug!(records = written, parts = parts.len(), "Concatenated partitions");

    Ok(merged)
}

/// Move `from` to `to`, copying when they live on different filesystems.
fn publish(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
