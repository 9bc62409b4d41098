//! Output header construction.
//!
//! The sanitized BAM keeps the input header (reference sequences, read groups,
//! comments) and gains one `@PG` record describing this run, chained to the
//! last program already present.

use std::collections::HashSet;

use bstr::BString;
use noodles::sam::header::record::value::map::program::tag;
use noodles::sam::header::record::value::map::Program;
use noodles::sam::header::record::value::Map;
use noodles::sam::Header;

use crate::core::error::{Result, SanitizeError};

/// Program ID and name used in the `@PG` record
pub const PROGRAM_ID: &str = "bamboozle";

/// ID of the last program in the `@PG` chain, i.e. the one no other program names as `PP`.
#[must_use]
pub fn last_program_id(header: &Header) -> Option<String> {
    let programs = header.programs();
    let program_map = programs.as_ref();

    let referenced: HashSet<&[u8]> = program_map
        .values()
        .filter_map(|pg| pg.other_fields().get(&tag::PREVIOUS_PROGRAM_ID))
        .map(|pp| pp.as_slice())
        .collect();

    program_map
        .keys()
        .find(|id| !referenced.contains(id.as_slice()))
        .or_else(|| program_map.keys().next())
        .map(|id| String::from_utf8_lossy(id).to_string())
}

/// `base_id`, or `base_id.N` for the first free `N` if it is already taken.
#[must_use]
pub fn unique_program_id(header: &Header, base_id: &str) -> String {
    let programs = header.programs();
    let program_map = programs.as_ref();

    if !program_map.contains_key(base_id.as_bytes()) {
        return base_id.to_string();
    }

    (1..)
        .map(|i| format!("{base_id}.{i}"))
        .find(|candidate| !program_map.contains_key(candidate.as_bytes()))
        .unwrap_or_else(|| base_id.to_string())
}

/// Build the `@PG` record for this run.
///
/// # Errors
///
/// Returns `SanitizeError::Noodles` if the record cannot be built.
pub fn build_program_record(
    version: &str,
    command_line: &str,
    previous_program: Option<&str>,
) -> Result<Map<Program>> {
    let mut builder = Map::<Program>::builder()
        .insert(tag::NAME, PROGRAM_ID)
        .insert(tag::VERSION, version)
        .insert(tag::COMMAND_LINE, command_line);

    if let Some(pp) = previous_program {
        builder = builder.insert(tag::PREVIOUS_PROGRAM_ID, pp);
    }

    builder
        .build()
        .map_err(|e| SanitizeError::Noodles(format!("Failed to build @PG record: {e}")))
}

/// Append this run's `@PG` record to `header`.
///
/// # Errors
///
/// Returns `SanitizeError::Noodles` if the record cannot be built or added.
pub fn add_pg_record(mut header: Header, version: &str, command_line: &str) -> Result<Header> {
    let previous_program = last_program_id(&header);
    let id = unique_program_id(&header, PROGRAM_ID);
    let record = build_program_record(version, command_line, previous_program.as_deref())?;

    header
        .programs_mut()
        .add(BString::from(id), record)
        .map_err(|e| SanitizeError::Noodles(format!("Failed to add @PG record: {e}")))?;

    Ok(header)
}

/// Reference sequence names in header order
#[must_use]
pub fn reference_sequence_names(header: &Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| String::from_utf8_lossy(name).to_string())
        .collect()
}
