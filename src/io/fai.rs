//! Reader for FASTA index (.fai) files using noodles.
//!
//! The index supplies the name and length of every contig, which is all the
//! sanitizer needs to decide which partitions exist and to clamp reference
//! fetches at contig ends.
//!
//! Format: `name\tlength\toffset\tline_bases\tline_width`

use std::ffi::OsString;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use noodles::fasta;

use crate::core::error::{Result, SanitizeError};

/// Path of the samtools-style index for a FASTA file (`<fasta>.fai`)
#[must_use]
pub fn fai_path(fasta: &Path) -> PathBuf {
    let mut path = OsString::from(fasta.as_os_str());
    path.push(".fai");
    PathBuf::from(path)
}

/// Locate the index for `fasta`, if one exists on disk.
#[must_use]
pub fn find_fai_path(fasta: &Path) -> Option<PathBuf> {
    let path = fai_path(fasta);
    path.is_file().then_some(path)
}

/// Read a FASTA index (.fai) file using noodles
///
/// # Errors
///
/// Returns `SanitizeError::Io` if the file cannot be read, `SanitizeError::Noodles` if
/// parsing fails, or `SanitizeError::InvalidConfig` if the index lists no contigs.
pub fn read_fai_index(path: &Path) -> Result<fasta::fai::Index> {
    let reader = std::fs::File::open(path).map(BufReader::new)?;

    let index = fasta::fai::io::Reader::new(reader)
        .read_index()
        .map_err(|e| SanitizeError::Noodles(format!("Failed to parse FAI file: {e}")))?;

    if index.as_ref().is_empty() {
        return Err(SanitizeError::InvalidConfig(format!(
            "No contigs found in FAI file '{}'",
            path.display()
        )));
    }

    Ok(index)
}

/// Contig names and lengths in index order
#[must_use]
pub fn contig_lengths(index: &fasta::fai::Index) -> Vec<(String, usize)> {
    index
        .as_ref()
        .iter()
        .map(|record| {
            let name = String::from_utf8_lossy(record.name()).to_string();
            let length = usize::try_from(record.length()).unwrap_or(usize::MAX);
            (name, length)
        })
        .collect()
}
