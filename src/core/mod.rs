//! De-identification engine.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`tags`] | Which optional fields are kept, recomputed, or dropped |
//! | [`splice`] | Rebuilding a read's bases from the reference along its CIGAR |
//! | [`sanitizer`] | Per-record rewrite and per-partition processing |
//! | [`orchestrator`] | Chromosome-parallel run with indexing and reassembly |
//! | [`header`] | Output header with the `@PG` record |
//! | [`types`] | Modes, options, partitions and summaries |
//! | [`error`] | [`error::SanitizeError`] |
//!
//! ## Modes
//!
//! | Field | Lenient | Strict |
//! |-------|---------|--------|
//! | Bases, CIGAR | from the reference | from the reference |
//! | `NM`, `nM` | 0 | 0 |
//! | `MD` | read length | read length |
//! | `AS`, `MQ` | kept | read length, doubled for pairs |
//! | `NH` | kept | 1 |
//! | MAPQ | kept | 255 |

pub mod error;
pub mod header;
pub mod orchestrator;
pub mod sanitizer;
pub mod splice;
pub mod tags;
pub mod types;
