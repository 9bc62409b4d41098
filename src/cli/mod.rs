//! Command-line interface for bamboozle.
//!
//! ## Usage
//!
//! ```text
//! # De-identify with 10 processes (the default)
//! bamboozle --bam sample.bam --out sample.anon.bam --fa GRCh38.fa
//!
//! # Also neutralize alignment scores and mapping qualities, keep unmapped reads
//! bamboozle --bam sample.bam --out sample.anon.bam --fa GRCh38.fa --p 32 --strict --keepunmapped
//!
//! # Write per-contig counts as JSON
//! bamboozle --bam sample.bam --out sample.anon.bam --fa GRCh38.fa --summary counts.json
//! ```
//!
//! The reference must be indexed (`samtools faidx`). The input BAM is indexed,
//! or sorted and indexed, if it has no `.bai`.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::core::orchestrator::{self, SanitizeConfig};
use crate::core::types::{SanitizeMode, SanitizeOptions};

#[derive(Parser, Debug)]
#[command(name = "bamboozle")]
#[command(version)]
#[command(about = "De-identify BAM files by replacing read bases with the reference")]
#[command(
    long_about = "bamboozle removes genotype information from aligned reads.\n\nEvery mapped read's bases are replaced with the reference bases it aligns to, its CIGAR is rewritten to plain matches (keeping splice junctions), and tags that reveal mismatches are zeroed or removed. Contigs are processed in parallel and reassembled into one indexed BAM."
)]
pub struct Cli {
    /// Input BAM file
    #[arg(long = "bam", value_name = "FILE")]
    pub bam: PathBuf,

    /// Output BAM file
    #[arg(long = "out", value_name = "FILE")]
    pub out: PathBuf,

    /// Reference FASTA, indexed with `samtools faidx`
    #[arg(long = "fa", value_name = "FILE")]
    pub fa: PathBuf,

    /// Number of processes
    #[arg(long = "p", value_name = "N", default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub processes: u32,

    /// Also neutralize alignment scores, hit counts and mapping quality
    #[arg(long)]
    pub strict: bool,

    /// Keep unmapped reads
    #[arg(long = "keepunmapped", visible_alias = "keep-unmapped")]
    pub keep_unmapped: bool,

    /// Keep secondary alignments
    #[arg(long = "keepsecondary", visible_alias = "keep-secondary")]
    pub keep_secondary: bool,

    /// Directory for temporary partition files [default: the output's directory]
    #[arg(long, value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Write a JSON summary of records written and dropped per contig
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub fn options(&self) -> SanitizeOptions {
        SanitizeOptions {
            mode: if self.strict {
                SanitizeMode::Strict
            } else {
                SanitizeMode::Lenient
            },
            keep_unmapped: self.keep_unmapped,
            keep_secondary: self.keep_secondary,
        }
    }

    #[must_use]
    pub fn config(&self) -> SanitizeConfig {
        let config = SanitizeConfig::new(&self.bam, &self.out, &self.fa)
            .processes(self.processes as usize)
            .options(self.options());

        match &self.tmp_dir {
            Some(dir) => config.tmp_dir(dir),
            None => config,
        }
    }
}

/// Run a full de-identification from parsed arguments.
///
/// # Errors
///
/// Returns an error if the run fails or the summary cannot be written.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let summary = orchestrator::run(&cli.config())?;

    if let Some(path) = &cli.summary {
        fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!(summary = %path.display(), "Wrote run summary");
    }

    Ok(())
}
