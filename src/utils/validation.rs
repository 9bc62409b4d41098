//! Centralized validation and helper functions.

use std::path::{Path, PathBuf};

/// Longest file name most filesystems accept
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Room left for the `NNNN.` prefix and `.unsorted.bam` suffix of partition files
pub const MAX_LABEL_LENGTH: usize = MAX_FILENAME_LENGTH - 32;

/// Run configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Process count must be at least 1")]
    NoProcesses,
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("Output directory does not exist: {}", .0.display())]
    MissingOutputDir(PathBuf),
    #[error("Output path is the same as the input: {}", .0.display())]
    OutputIsInput(PathBuf),
}

/// Make a contig name safe to embed in a file name.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, a leading `.` is replaced
/// so the file is not hidden, and the result is capped at [`MAX_LABEL_LENGTH`].
///
/// # Examples
///
/// ```
/// use bamboozle::utils::validation::sanitize_label;
///
/// assert_eq!(sanitize_label("chr1"), "chr1");
/// assert_eq!(sanitize_label("HLA-A*01:01"), "HLA-A_01_01");
/// assert_eq!(sanitize_label("../etc"), "_._etc");
/// ```
#[must_use]
pub fn sanitize_label(label: &str) -> String {
    let mut sanitized: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LABEL_LENGTH)
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if sanitized.starts_with('.') {
        sanitized.replace_range(..1, "_");
    }

    sanitized
}

/// File name of the temporary output for the `index`-th partition
#[must_use]
pub fn partition_file_name(index: usize, label: &str) -> String {
    format!("{index:04}.{}.bam", sanitize_label(label))
}

/// # Errors
///
/// Returns `ValidationError::NoProcesses` if `processes` is zero.
pub fn validate_processes(processes: usize) -> Result<usize, ValidationError> {
    if processes == 0 {
        return Err(ValidationError::NoProcesses);
    }
    Ok(processes)
}

/// Check that the input exists and the output can be created next to it.
///
/// # Errors
///
/// Returns a `ValidationError` naming the first problem found.
pub fn validate_paths(input: &Path, output: &Path) -> Result<(), ValidationError> {
    if !input.is_file() {
        return Err(ValidationError::MissingInput(input.to_path_buf()));
    }

    if let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(ValidationError::MissingOutputDir(dir.to_path_buf()));
        }
    }

    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(ValidationError::OutputIsInput(output.to_path_buf()));
    }

    Ok(())
}
