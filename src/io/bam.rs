//! BAM reader and writer construction.
//!
//! Writers compress on a single thread when given one I/O thread and through a
//! multi-threaded BGZF writer otherwise. Either way the writer must be closed
//! with [`finish_writer`] so the BGZF EOF block is written and errors surface.

use std::fs::File;
use std::io::{self, Write};
use std::num::NonZero;
use std::path::Path;

use noodles::bam;
use noodles::bgzf;
use noodles::sam::Header;

use crate::core::error::{Result, SanitizeError};

/// Single- or multi-threaded BGZF writer
pub enum BgzfWriter {
    SingleThreaded(bgzf::io::Writer<File>),
    MultiThreaded(bgzf::io::MultithreadedWriter<File>),
}

impl Write for BgzfWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::SingleThreaded(w) => w.write(buf),
            Self::MultiThreaded(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::SingleThreaded(w) => w.flush(),
            Self::MultiThreaded(w) => w.flush(),
        }
    }
}

impl BgzfWriter {
    /// Flush all blocks and write the EOF marker.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or finalizing the stream fails.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::SingleThreaded(mut w) => w.try_finish(),
            Self::MultiThreaded(mut w) => {
                w.finish()?;
                Ok(())
            }
        }
    }
}

pub type BamWriter = bam::io::Writer<BgzfWriter>;

pub type BamReader = bam::io::Reader<bgzf::io::Reader<File>>;

pub type IndexedBamReader = bam::io::IndexedReader<bgzf::io::Reader<File>>;

/// Create a BAM at `path` and write `header` to it.
///
/// # Errors
///
/// Returns an error if the file cannot be created or the header cannot be written.
pub fn create_writer(path: &Path, header: &Header, threads: usize) -> Result<BamWriter> {
    let file = File::create(path)?;

    let bgzf_writer = match NonZero::new(threads).filter(|n| n.get() > 1) {
        Some(worker_count) => BgzfWriter::MultiThreaded(
            bgzf::io::multithreaded_writer::Builder::default()
                .set_worker_count(worker_count)
                .build_from_writer(file),
        ),
        None => BgzfWriter::SingleThreaded(bgzf::io::Writer::new(file)),
    };

    let mut writer = bam::io::Writer::from(bgzf_writer);
    writer.write_header(header).map_err(|e| {
        SanitizeError::Noodles(format!(
            "Failed to write header to '{}': {e}",
            path.display()
        ))
    })?;

    Ok(writer)
}

/// Close a writer created by [`create_writer`].
///
/// # Errors
///
/// Returns an error if the final blocks cannot be written.
pub fn finish_writer(writer: BamWriter) -> Result<()> {
    writer.into_inner().finish()?;
    Ok(())
}

/// Open a BAM for sequential reading and read its header.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header is malformed.
pub fn open_reader(path: &Path) -> Result<(BamReader, Header)> {
    let mut reader = File::open(path).map(bam::io::Reader::new)?;

    let header = reader.read_header().map_err(|e| {
        SanitizeError::Noodles(format!(
            "Failed to read BAM header from '{}': {e}",
            path.display()
        ))
    })?;

    Ok((reader, header))
}

/// Read only the header of a BAM file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header is malformed.
pub fn read_header(path: &Path) -> Result<Header> {
    open_reader(path).map(|(_, header)| header)
}

/// Open a BAM together with its `.bai` for region queries.
///
/// # Errors
///
/// Returns an error if the file or its index cannot be opened.
pub fn open_indexed_reader(path: &Path) -> Result<(IndexedBamReader, Header)> {
    let mut reader = bam::io::indexed_reader::Builder::default()
        .build_from_path(path)
        .map_err(|e| {
            SanitizeError::Noodles(format!(
                "Failed to open indexed BAM '{}': {e}",
                path.display()
            ))
        })?;

    let header = reader.read_header().map_err(|e| {
        SanitizeError::Noodles(format!(
            "Failed to read BAM header from '{}': {e}",
            path.display()
        ))
    })?;

    Ok((reader, header))
}
