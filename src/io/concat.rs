//! Ordered concatenation of per-partition BAMs into one file.

use std::fs;
use std::path::{Path, PathBuf};

use noodles::bam;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::Header;
use tracing::debug;

use crate::core::error::Result;
use crate::io::bam::{create_writer, finish_writer, open_reader};

/// Stream every record of `parts`, in order, into `output` under `header`.
///
/// The parts are deleted once the output has been finished. Returns the number
/// of records written.
///
/// # Errors
///
/// Returns an error if any part cannot be read or the output cannot be written.
/// Parts are left on disk in that case.
pub fn concat(output: &Path, parts: &[PathBuf], header: &Header, threads: usize) -> Result<u64> {
    let mut writer = create_writer(output, header, threads)?;
    let mut record = bam::Record::default();
    let mut written = 0u64;

    for part in parts {
        let (mut reader, _) = open_reader(part)?;
        let mut n = 0u64;

        while reader.read_record(&mut record)? != 0 {
            writer.write_alignment_record(header, &record)?;
            n += 1;
        }

        debug!(part = %part.display(), records = n, "Appended partition");
        written += n;
    }

    finish_writer(writer)?;

    for part in parts {
        fs::remove_file(part)?;
    }

    Ok(written)
}
