use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for sanitization operations
pub type Result<T> = std::result::Result<T, SanitizeError>;

/// Fatal errors raised while de-identifying an alignment file.
///
/// Each variant names the stage that failed so the top-level message tells the
/// user where to look (indexing, reference access, a partition, reassembly).
#[derive(Error, Debug)]
pub enum SanitizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error(
        "Reference FASTA '{}' is not indexed; please run `samtools faidx {}` first",
        path.display(),
        path.display()
    )]
    ReferenceNotIndexed { path: PathBuf },

    #[error("Reference access failed: contig '{contig}' not found in the reference")]
    ReferenceNotFound { contig: String },

    #[error("Reference access failed for {contig}:{start}-{end}: {reason}")]
    ReferenceFetch {
        contig: String,
        start: usize,
        end: usize,
        reason: String,
    },

    #[error("Invalid record '{name}': {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error("Indexing failed for '{}': {reason}", path.display())]
    Indexing { path: PathBuf, reason: String },

    #[error("Failed to sanitize partition '{label}'")]
    Partition {
        label: String,
        #[source]
        source: Box<SanitizeError>,
    },

    #[error("Reassembly failed: {reason}")]
    Reassembly { reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SanitizeError {
    /// Wrap an error raised while processing one partition.
    pub fn partition(label: impl Into<String>, source: SanitizeError) -> Self {
        Self::Partition {
            label: label.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn invalid_record(name: &[u8], reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            name: String::from_utf8_lossy(name).into_owned(),
            reason: reason.into(),
        }
    }
}
