use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How aggressively alignment metadata is neutralized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMode {
    /// Replace bases and the tags derived from them (NM, nM, MD)
    #[default]
    Lenient,
    /// Additionally neutralize alignment-confidence metadata (AS, MQ, NH, MAPQ, ...)
    Strict,
}

impl std::fmt::Display for SanitizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lenient => write!(f, "lenient"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Per-record behaviour knobs shared by every partition of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeOptions {
    pub mode: SanitizeMode,

    /// Keep unmapped reads (both unplaced and those stored at their mate's position)
    pub keep_unmapped: bool,

    /// Keep secondary alignments
    pub keep_secondary: bool,
}

impl SanitizeOptions {
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.mode == SanitizeMode::Strict
    }
}

/// Label used for the partition holding reads without a reference position
pub const UNMAPPED_LABEL: &str = "unmapped";

/// The region of the input a partition covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// All records whose alignment lies on this reference contig
    Contig(String),
    /// Records with no reference position
    Unmapped,
}

impl Partition {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Contig(name) => name,
            Self::Unmapped => UNMAPPED_LABEL,
        }
    }

    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Self::Unmapped)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A unit of work: one partition and the temporary file its records go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigPartition {
    pub partition: Partition,
    pub output: PathBuf,
}

impl ContigPartition {
    pub fn new(partition: Partition, output: impl Into<PathBuf>) -> Self {
        Self {
            partition,
            output: output.into(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.partition.label()
    }
}

/// Terminal state of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Written,
    Dropped,
}

/// Counts for one processed partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub label: String,
    pub records_read: u64,
    pub records_written: u64,
    pub records_dropped: u64,

    /// Whether the partition was re-sorted after start positions moved
    pub resorted: bool,
}

impl PartitionSummary {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, disposition: Disposition) {
        self.records_read += 1;
        match disposition {
            Disposition::Written => self.records_written += 1,
            Disposition::Dropped => self.records_dropped += 1,
        }
    }
}

/// Outcome of a complete run, in reassembly order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub mode: SanitizeMode,
    pub records_written: u64,
    pub records_dropped: u64,
    pub partitions: Vec<PartitionSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn new(output: PathBuf, mode: SanitizeMode, partitions: Vec<PartitionSummary>) -> Self {
        let records_written = partitions.iter().map(|p| p.records_written).sum();
        let records_dropped = partitions.iter().map(|p| p.records_dropped).sum();

        Self {
            output,
            mode,
            records_written,
            records_dropped,
            partitions,
        }
    }
}
