//! Splice-aware reconstruction of a read from reference bases.
//!
//! A read without `N` (skip) operations is replaced by the reference bases
//! under it and a single `M` of the read length. A spliced read is cut into one
//! exonic segment per block between skips; each segment is filled from the
//! reference and the skips are kept, so the read still spans the same introns.
//!
//! Segment lengths come from the reference-consuming operations between skips,
//! except the final segment which takes whatever read length is left. When
//! deletions use up the read before the next skip, the segment is cut short and
//! the remaining skips are discarded.

use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use thiserror::Error;

use crate::core::error::Result;
use crate::io::fasta::ReferenceAccessor;

/// One exonic block of a reconstructed read, 0-based half-open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplicedSegment {
    pub reference_start: usize,
    pub reference_end: usize,
    pub len: usize,
}

impl SplicedSegment {
    #[must_use]
    pub fn new(reference_start: usize, len: usize) -> Self {
        Self {
            reference_start,
            reference_end: reference_start + len,
            len,
        }
    }
}

/// Segments of a read and the skip lengths retained between them.
///
/// `skips.len()` is always `segments.len() - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplicePlan {
    pub segments: Vec<SplicedSegment>,
    pub skips: Vec<usize>,
}

impl SplicePlan {
    /// `M` per segment, interleaved with the retained `N` operations
    #[must_use]
    pub fn cigar(&self) -> Vec<Op> {
        let mut ops = Vec::with_capacity(self.segments.len() + self.skips.len());

        for (i, segment) in self.segments.iter().enumerate() {
            ops.push(Op::new(Kind::Match, segment.len));
            if let Some(&skip) = self.skips.get(i) {
                ops.push(Op::new(Kind::Skip, skip));
            }
        }

        ops
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }
}

#[must_use]
pub fn consumes_reference(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match | Kind::Deletion | Kind::SequenceMatch | Kind::SequenceMismatch
    )
}

/// Sum of reference-consuming lengths, excluding skips
#[must_use]
pub fn reference_span(ops: &[Op]) -> usize {
    ops.iter()
        .filter(|op| consumes_reference(op.kind()))
        .map(|op| op.len())
        .sum()
}

/// Lay out the segments of a read starting at `reference_start`.
#[must_use]
pub fn plan_segments(ops: &[Op], reference_start: usize, read_len: usize) -> SplicePlan {
    let skip_idx: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| op.kind() == Kind::Skip)
        .map(|(i, _)| i)
        .collect();

    if skip_idx.is_empty() {
        return SplicePlan {
            segments: vec![SplicedSegment::new(reference_start, read_len)],
            skips: Vec::new(),
        };
    }

    let skips: Vec<usize> = skip_idx.iter().map(|&i| ops[i].len()).collect();
    let mut segments = Vec::with_capacity(skips.len() + 1);
    let mut remaining = read_len;
    let mut start = reference_start;

    for i in 0..=skips.len() {
        let is_last = i == skips.len();

        let declared = if is_last {
            remaining
        } else {
            let from = if i == 0 { 0 } else { skip_idx[i - 1] + 1 };
            reference_span(&ops[from..skip_idx[i]])
        };

        // The read runs out before reaching the next skip
        if declared > remaining || (declared == remaining && !is_last) {
            segments.push(SplicedSegment::new(start, remaining));
            return SplicePlan {
                segments,
                skips: skips[..i].to_vec(),
            };
        }

        segments.push(SplicedSegment::new(start, declared));
        remaining -= declared;

        if let Some(&skip) = skips.get(i) {
            start += declared + skip;
        }
    }

    SplicePlan { segments, skips }
}

/// Replacement bases and CIGAR for one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub sequence: Vec<u8>,
    pub cigar: Vec<Op>,
}

/// The reference ended before the read, by more than the final match can absorb.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("reference is {shortfall} bases short of the read but the final match is only {last_len} long")]
pub struct ReferenceShortfall {
    pub shortfall: usize,
    pub last_len: usize,
}

impl Reconstruction {
    /// Fit the CIGAR and qualities to a sequence clamped at the contig end.
    ///
    /// Only the final match is shortened. Empty qualities (`*`) stay empty.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceShortfall` if the final operation is not a match long
    /// enough to absorb the missing bases.
    pub fn reconcile(
        &mut self,
        read_len: usize,
        qualities: &mut Vec<u8>,
    ) -> std::result::Result<(), ReferenceShortfall> {
        let shortfall = read_len.saturating_sub(self.sequence.len());

        if shortfall > 0 {
            let last_len = match self.cigar.last() {
                Some(op) if op.kind() == Kind::Match => op.len(),
                _ => 0,
            };

            if shortfall >= last_len {
                return Err(ReferenceShortfall {
                    shortfall,
                    last_len,
                });
            }

            if let Some(last) = self.cigar.last_mut() {
                *last = Op::new(Kind::Match, last_len - shortfall);
            }
        }

        if !qualities.is_empty() {
            qualities.truncate(self.sequence.len());
        }

        Ok(())
    }
}

/// Rebuild the sequence and CIGAR of a read from the reference.
///
/// # Errors
///
/// Returns an error if the reference cannot supply bases for `contig`.
pub fn reconstruct<R: ReferenceAccessor + ?Sized>(
    ops: &[Op],
    reference_start: usize,
    read_len: usize,
    reference: &mut R,
    contig: &str,
) -> Result<Reconstruction> {
    let plan = plan_segments(ops, reference_start, read_len);

    let mut sequence = Vec::with_capacity(read_len);
    for segment in &plan.segments {
        let bases = reference.fetch(contig, segment.reference_start, segment.reference_end)?;
        sequence.extend_from_slice(&bases);
    }

    Ok(Reconstruction {
        sequence,
        cigar: plan.cigar(),
    })
}

/// CIGAR for a read with no stored bases: the splice layout of its reference footprint.
#[must_use]
pub fn rebuild_layout(ops: &[Op]) -> Vec<Op> {
    plan_segments(ops, 0, reference_span(ops)).cigar()
}
