//! BAI construction with a sort-and-retry fallback.
//!
//! [`build_index`] scans a BAM once and refuses inputs that are not coordinate
//! sorted. [`ensure_indexed`] wraps it: when indexing fails, the BAM is sorted
//! to a sibling path and that copy is indexed instead.

use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use noodles::bam::{self, bai};
use noodles::core::Position;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::csi::binning_index::index::reference_sequence::index::LinearIndex;
use noodles::csi::binning_index::Indexer;
use noodles::sam::alignment::Record as _;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::error::{Result, SanitizeError};
use crate::io::sort::{sort_by_coordinate, SortOptions};

/// Recoverable indexing failure
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("record {record} is out of coordinate order")]
    Unsorted { record: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Path of the index for a BAM file (`<bam>.bai`)
#[must_use]
pub fn index_path(bam: &Path) -> PathBuf {
    let mut path = OsString::from(bam.as_os_str());
    path.push(".bai");
    PathBuf::from(path)
}

/// Build a BAI for a coordinate-sorted BAM.
///
/// # Errors
///
/// Returns `IndexError::Unsorted` on the first record out of coordinate order,
/// or `IndexError::Io` if the file cannot be read.
pub fn build_index(path: &Path) -> std::result::Result<bai::Index, IndexError> {
    let mut reader = File::open(path).map(bam::io::Reader::new)?;
    let header = reader.read_header()?;

    let mut indexer = Indexer::<LinearIndex>::default();
    let mut record = bam::Record::default();
    let mut order = CoordinateOrder::default();
    let mut n = 0u64;

    let mut start_position = reader.get_ref().virtual_position();

    while reader.read_record(&mut record)? != 0 {
        let end_position = reader.get_ref().virtual_position();
        let chunk = Chunk::new(start_position, end_position);

        let context = alignment_context(&record)?;
        order.check(n, context.map(|(id, start, _, _)| (id, start)))?;

        indexer.add_record(context, chunk).map_err(io::Error::other)?;

        start_position = end_position;
        n += 1;
    }

    Ok(indexer.build(header.reference_sequences().len()))
}

/// Write `index` next to `bam` as `<bam>.bai`.
///
/// # Errors
///
/// Returns an error if the index file cannot be created or written.
pub fn write_index(bam: &Path, index: &bai::Index) -> Result<()> {
    let file = File::create(index_path(bam))?;
    let mut writer = bai::io::Writer::new(file);
    writer.write_index(index)?;
    Ok(())
}

/// Index `bam`, sorting it to `sorted_path` first if direct indexing fails.
///
/// Returns the path that ended up indexed: `bam` itself, or `sorted_path`.
///
/// # Errors
///
/// Returns `SanitizeError::Indexing` if the sorted copy still cannot be
/// indexed, or the sort's own error if sorting fails.
pub fn ensure_indexed(bam: &Path, sorted_path: &Path, threads: usize) -> Result<PathBuf> {
    match build_index(bam) {
        Ok(index) => {
            write_index(bam, &index)?;
            Ok(bam.to_path_buf())
        }
        Err(e) => {
            warn!(bam = %bam.display(), error = %e, "Indexing failed, trying to sort");

            sort_by_coordinate(bam, sorted_path, &SortOptions::default().threads(threads))
                .map_err(|sort_error| SanitizeError::Indexing {
                    path: bam.to_path_buf(),
                    reason: format!("{e}; sorting failed: {sort_error}"),
                })?;

            let index = build_index(sorted_path).map_err(|e| SanitizeError::Indexing {
                path: sorted_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            write_index(sorted_path, &index)?;

            info!(bam = %sorted_path.display(), "Indexed sorted copy");
            Ok(sorted_path.to_path_buf())
        }
    }
}

type AlignmentContext = (usize, Position, Position, bool);

fn alignment_context(record: &bam::Record) -> io::Result<Option<AlignmentContext>> {
    match (
        record.reference_sequence_id().transpose()?,
        record.alignment_start().transpose()?,
        record.alignment_end().transpose()?,
    ) {
        (Some(id), Some(start), Some(end)) => {
            Ok(Some((id, start, end, !record.flags().is_unmapped())))
        }
        _ => Ok(None),
    }
}

/// Tracks the last placed position; unplaced records must come last.
#[derive(Debug, Default)]
struct CoordinateOrder {
    last: Option<(usize, Position)>,
    seen_unplaced: bool,
}

impl CoordinateOrder {
    fn check(
        &mut self,
        record: u64,
        placement: Option<(usize, Position)>,
    ) -> std::result::Result<(), IndexError> {
        match placement {
            Some(key) => {
                let out_of_order = self.seen_unplaced || self.last.is_some_and(|last| key < last);
                if out_of_order {
                    return Err(IndexError::Unsorted { record });
                }
                self.last = Some(key);
            }
            None => self.seen_unplaced = true,
        }

        Ok(())
    }
}
