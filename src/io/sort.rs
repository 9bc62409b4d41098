//! External coordinate sort for BAM files.
//!
//! Records are accumulated in memory up to a fixed count, sorted, and spilled
//! to temporary BAM chunks. The chunks are then merged with a k-way heap merge.
//! Inputs small enough to fit in one batch skip the spill entirely.
//!
//! Order is `(reference id, start, reverse strand, name)`. Records with no
//! reference position sort after all placed records.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use bstr::BString;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::header::record::value::map::header::tag as header_tag;
use noodles::sam::Header;
use rayon::prelude::*;
use tempfile::TempDir;
use tracing::debug;

use crate::core::error::Result;
use crate::io::bam::{create_writer, finish_writer, open_reader, BamReader};

/// Default number of records held in memory before spilling a chunk
pub const DEFAULT_MAX_RECORDS_IN_MEMORY: usize = 500_000;

#[derive(Debug, Clone)]
pub struct SortOptions {
    pub max_records_in_memory: usize,
    pub threads: usize,

    /// Directory for spill chunks; defaults to the output's directory
    pub tmp_dir: Option<PathBuf>,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            max_records_in_memory: DEFAULT_MAX_RECORDS_IN_MEMORY,
            threads: 1,
            tmp_dir: None,
        }
    }
}

impl SortOptions {
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn max_records_in_memory(mut self, n: usize) -> Self {
        self.max_records_in_memory = n.max(1);
        self
    }

    #[must_use]
    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SortStats {
    pub records: u64,
    pub chunks: usize,
}

/// Coordinate sort key; field order defines the ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoordinateKey {
    tid: usize,
    pos: usize,
    reverse: bool,
    name: Vec<u8>,
}

impl CoordinateKey {
    #[must_use]
    pub fn from_record(record: &RecordBuf) -> Self {
        let placed = record
            .reference_sequence_id()
            .zip(record.alignment_start());

        let (tid, pos) = match placed {
            Some((tid, start)) => (tid, usize::from(start)),
            None => (usize::MAX, usize::MAX),
        };

        Self {
            tid,
            pos,
            reverse: record.flags().is_reverse_complemented(),
            name: record.name().map(|n| n.to_vec()).unwrap_or_default(),
        }
    }
}

/// Sort `input` by coordinate into `output`, marking the header `SO:coordinate`.
///
/// # Errors
///
/// Returns an error if reading the input, writing chunks, or writing the output fails.
pub fn sort_by_coordinate(input: &Path, output: &Path, options: &SortOptions) -> Result<SortStats> {
    let (mut reader, header) = open_reader(input)?;
    let output_header = coordinate_sorted_header(&header);

    let mut stats = SortStats::default();
    let mut batch: Vec<(CoordinateKey, RecordBuf)> = Vec::new();
    let mut chunk_files: Vec<PathBuf> = Vec::new();
    let mut spill_dir: Option<TempDir> = None;

    loop {
        let mut record = RecordBuf::default();
        if reader.read_record_buf(&header, &mut record)? == 0 {
            break;
        }

        stats.records += 1;
        batch.push((CoordinateKey::from_record(&record), record));

        if batch.len() >= options.max_records_in_memory {
            if spill_dir.is_none() {
                spill_dir = Some(create_spill_dir(output, options)?);
            }
            if let Some(dir) = &spill_dir {
                spill_chunk(dir, &mut chunk_files, &output_header, &mut batch, options.threads)?;
            }
        }
    }

    match &spill_dir {
        Some(dir) => {
            if !batch.is_empty() {
                spill_chunk(dir, &mut chunk_files, &output_header, &mut batch, options.threads)?;
            }
            merge_chunks(&chunk_files, &output_header, output, options.threads)?;
        }
        None => write_sorted(output, &output_header, &mut batch, options.threads)?,
    }

    stats.chunks = chunk_files.len();
    debug!(
        input = %input.display(),
        records = stats.records,
        chunks = stats.chunks,
        "Sorted by coordinate"
    );

    Ok(stats)
}

/// Copy of `header` with `@HD SO:coordinate`
#[must_use]
pub fn coordinate_sorted_header(header: &Header) -> Header {
    let mut header = header.clone();

    let mut hd = header.header().cloned().unwrap_or_default();
    hd.other_fields_mut()
        .insert(header_tag::SORT_ORDER, BString::from("coordinate"));
    *header.header_mut() = Some(hd);

    header
}

fn create_spill_dir(output: &Path, options: &SortOptions) -> Result<TempDir> {
    let base = match &options.tmp_dir {
        Some(dir) => dir.clone(),
        None => output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    };

    Ok(tempfile::Builder::new()
        .prefix(".bamboozle-sort.")
        .tempdir_in(base)?)
}

fn spill_chunk(
    dir: &TempDir,
    chunk_files: &mut Vec<PathBuf>,
    header: &Header,
    batch: &mut Vec<(CoordinateKey, RecordBuf)>,
    threads: usize,
) -> Result<()> {
    let path = dir.path().join(format!("chunk_{:04}.bam", chunk_files.len()));
    write_sorted(&path, header, batch, threads)?;
    chunk_files.push(path);
    batch.clear();
    Ok(())
}

fn write_sorted(
    path: &Path,
    header: &Header,
    batch: &mut [(CoordinateKey, RecordBuf)],
    threads: usize,
) -> Result<()> {
    if threads > 1 {
        batch.par_sort_by(|a, b| a.0.cmp(&b.0));
    } else {
        batch.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut writer = create_writer(path, header, threads)?;
    for (_, record) in batch.iter() {
        writer.write_alignment_record(header, record)?;
    }
    finish_writer(writer)
}

fn merge_chunks(chunk_files: &[PathBuf], header: &Header, output: &Path, threads: usize) -> Result<()> {
    let mut readers = chunk_files
        .iter()
        .enumerate()
        .map(|(idx, path)| ChunkReader::open(path, idx))
        .collect::<Result<Vec<_>>>()?;

    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(readers.len());
    for reader in &mut readers {
        if let Some(entry) = reader.next(header)? {
            heap.push(Reverse(entry));
        }
    }

    let mut writer = create_writer(output, header, threads)?;
    while let Some(Reverse(entry)) = heap.pop() {
        writer.write_alignment_record(header, &entry.record)?;

        if let Some(next) = readers[entry.chunk_idx].next(header)? {
            heap.push(Reverse(next));
        }
    }
    finish_writer(writer)
}

struct ChunkReader {
    reader: BamReader,
    idx: usize,
}

impl ChunkReader {
    fn open(path: &Path, idx: usize) -> Result<Self> {
        let (reader, _) = open_reader(path)?;
        Ok(Self { reader, idx })
    }

    fn next(&mut self, header: &Header) -> Result<Option<HeapEntry>> {
        let mut record = RecordBuf::default();
        if self.reader.read_record_buf(header, &mut record)? == 0 {
            return Ok(None);
        }

        Ok(Some(HeapEntry {
            key: CoordinateKey::from_record(&record),
            record,
            chunk_idx: self.idx,
        }))
    }
}

/// Entry in the merge heap; ties fall back to chunk order so the merge is stable.
struct HeapEntry {
    key: CoordinateKey,
    record: RecordBuf,
    chunk_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.chunk_idx.cmp(&other.chunk_idx))
    }
}
