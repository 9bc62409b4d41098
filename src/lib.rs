//! # bamboozle
//!
//! De-identification of aligned sequencing reads.
//!
//! A BAM file carries the genotype of the person it was sequenced from in every
//! mismatch, indel and clipped base of its reads. `bamboozle` rewrites each
//! mapped read so that it carries only the reference:
//!
//! - read bases are replaced with the reference bases the read aligns to
//! - the CIGAR becomes plain matches, keeping `N` splice junctions
//! - leading clips and deletions of single-end reads are folded into the alignment
//! - mismatch-derived tags (`NM`, `nM`, `MD`, ...) are zeroed, rewritten or removed
//!
//! Expression-level information (which reads map where, and how many) survives.
//! Strict mode additionally neutralizes alignment scores, hit counts and mapping
//! quality.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bamboozle::{run, SanitizeConfig, SanitizeMode, SanitizeOptions};
//!
//! let config = SanitizeConfig::new("sample.bam", "sample.anon.bam", "GRCh38.fa")
//!     .processes(16)
//!     .options(SanitizeOptions {
//!         mode: SanitizeMode::Strict,
//!         keep_unmapped: false,
//!         keep_secondary: false,
//!     });
//!
//! let summary = run(&config).unwrap();
//! println!("{} reads written", summary.records_written);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: tag policy, sequence reconstruction, read sanitizing and the parallel driver
//! - [`io`]: BAM, FASTA and index access, sorting and concatenation
//! - [`utils`]: file-name and configuration validation
//! - [`cli`]: command-line interface implementation

pub mod cli;
pub mod core;
pub mod io;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::error::{Result, SanitizeError};
pub use crate::core::orchestrator::{run, SanitizeConfig, WorkerPlan};
pub use crate::core::sanitizer::ReadSanitizer;
pub use crate::core::tags::TagPolicy;
pub use crate::core::types::*;
pub use crate::io::fasta::{IndexedFasta, ReferenceAccessor};
