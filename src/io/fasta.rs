//! Random access to reference bases.
//!
//! | Type | Backing store |
//! |------|---------------|
//! | [`IndexedFasta`] | FASTA on disk with a samtools `.fai` index |
//! | `HashMap<String, Vec<u8>>` | in-memory contigs, handy for tests and small references |
//!
//! Coordinates are 0-based and half-open. Requests running past the end of a
//! contig are clamped to its length, so callers may receive fewer bases than
//! they asked for.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use noodles::core::{Position, Region};
use noodles::fasta;

use crate::core::error::{Result, SanitizeError};
use crate::io::fai::{contig_lengths, find_fai_path, read_fai_index};

/// Source of reference bases for a contig interval
pub trait ReferenceAccessor {
    /// Fetch upper-cased bases for `contig[start..end)`, clamping `end` to the contig length.
    ///
    /// # Errors
    ///
    /// Returns `SanitizeError::ReferenceNotFound` for unknown contigs and
    /// `SanitizeError::ReferenceFetch` if the bases cannot be read.
    fn fetch(&mut self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>>;

    fn contains(&self, contig: &str) -> bool;

    /// Contig names in reference order
    fn contig_names(&self) -> Vec<String>;
}

/// Reference FASTA opened through its `.fai` index
pub struct IndexedFasta {
    path: PathBuf,
    reader: fasta::io::IndexedReader<fasta::io::BufReader<File>>,
    names: Vec<String>,
    lengths: HashMap<String, usize>,
}

impl IndexedFasta {
    /// Open `path` using the index at `<path>.fai`.
    ///
    /// # Errors
    ///
    /// Returns `SanitizeError::ReferenceNotIndexed` if no index exists, or an
    /// I/O / noodles error if the index or FASTA cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let fai = find_fai_path(path).ok_or_else(|| SanitizeError::ReferenceNotIndexed {
            path: path.to_path_buf(),
        })?;
        let index = read_fai_index(&fai)?;

        let contigs = contig_lengths(&index);
        let names = contigs.iter().map(|(name, _)| name.clone()).collect();
        let lengths = contigs.into_iter().collect();

        let reader = fasta::io::indexed_reader::Builder::default()
            .set_index(index)
            .build_from_path(path)
            .map_err(|e| {
                SanitizeError::Noodles(format!(
                    "Failed to open reference '{}': {e}",
                    path.display()
                ))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            names,
            lengths,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn contig_length(&self, contig: &str) -> Option<usize> {
        self.lengths.get(contig).copied()
    }
}

impl ReferenceAccessor for IndexedFasta {
    fn fetch(&mut self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>> {
        let length = self
            .contig_length(contig)
            .ok_or_else(|| SanitizeError::ReferenceNotFound {
                contig: contig.to_string(),
            })?;

        let end = end.min(length);
        if start >= end {
            return Ok(Vec::new());
        }

        let fetch_error = |reason: String| SanitizeError::ReferenceFetch {
            contig: contig.to_string(),
            start,
            end,
            reason,
        };

        // 0-based half-open to 1-based closed
        let from = Position::new(start + 1)
            .ok_or_else(|| fetch_error("invalid start position".to_string()))?;
        let to =
            Position::new(end).ok_or_else(|| fetch_error("invalid end position".to_string()))?;
        let region = Region::new(contig, from..=to);

        let record = self
            .reader
            .query(&region)
            .map_err(|e| fetch_error(e.to_string()))?;

        Ok(record.sequence().as_ref().to_ascii_uppercase())
    }

    fn contains(&self, contig: &str) -> bool {
        self.lengths.contains_key(contig)
    }

    fn contig_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

impl ReferenceAccessor for HashMap<String, Vec<u8>> {
    fn fetch(&mut self, contig: &str, start: usize, end: usize) -> Result<Vec<u8>> {
        let bases = self
            .get(contig)
            .ok_or_else(|| SanitizeError::ReferenceNotFound {
                contig: contig.to_string(),
            })?;

        let end = end.min(bases.len());
        if start >= end {
            return Ok(Vec::new());
        }

        Ok(bases[start..end].to_ascii_uppercase())
    }

    fn contains(&self, contig: &str) -> bool {
        self.contains_key(contig)
    }

    fn contig_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys().cloned().collect();
        names.sort();
        names
    }
}
