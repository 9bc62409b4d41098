//! Per-record and per-partition sanitization.
//!
//! Mapped reads go through a fixed sequence of steps:
//!
//! 1. Secondary alignments are dropped unless requested.
//! 2. Tags are rewritten or dropped by the [`TagPolicy`]; strict mode also
//!    clears the mapping quality (255).
//! 3. Unmapped reads stored at their mate's position are kept unchanged or dropped.
//! 4. Single-end reads starting with a clip or deletion have their start moved
//!    left so the reconstructed read still covers the clipped bases.
//! 5. Sequence and CIGAR are rebuilt from the reference and the qualities are
//!    fitted to the new sequence.
//!
//! Reads in the unmapped partition only lose tags.

use std::fs;
use std::path::Path;

use noodles::core::{Position, Region};
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, Sequence};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::Header;
use tracing::debug;

use crate::core::error::{Result, SanitizeError};
use crate::core::splice::{rebuild_layout, reconstruct};
use crate::core::tags::{TagContext, TagPolicy};
use crate::core::types::{
    ContigPartition, Disposition, Partition, PartitionSummary, SanitizeOptions,
};
use crate::io::bam::{create_writer, finish_writer, open_indexed_reader};
use crate::io::fasta::ReferenceAccessor;
use crate::io::sort::{sort_by_coordinate, SortOptions};

/// A CIGAR and 0-based start after moving a leading clip into the alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadingClipCorrection {
    pub ops: Vec<Op>,
    pub reference_start: usize,
}

fn is_leading_fill(kind: Kind) -> bool {
    matches!(kind, Kind::SoftClip | Kind::HardClip | Kind::Deletion)
}

/// Fold a leading run of soft clips, hard clips and deletions into the first match.
///
/// The run's total length `L` moves the start left by `L + 1`, never below 1.
/// `L` is added to the following match, or becomes a match of its own if the
/// next operation is anything else. Returns `None` if the CIGAR does not start
/// with such a run.
#[must_use]
pub fn correct_leading_clip(ops: &[Op], reference_start: usize) -> Option<LeadingClipCorrection> {
    let run = ops.iter().take_while(|op| is_leading_fill(op.kind())).count();
    if run == 0 {
        return None;
    }

    let fill: usize = ops[..run].iter().map(|op| op.len()).sum();
    let rest = &ops[run..];

    let mut corrected = Vec::with_capacity(rest.len() + 1);
    match rest.first() {
        Some(next) if next.kind() == Kind::Match => {
            corrected.push(Op::new(Kind::Match, next.len() + fill));
            corrected.extend_from_slice(&rest[1..]);
        }
        _ => {
            corrected.push(Op::new(Kind::Match, fill));
            corrected.extend_from_slice(rest);
        }
    }

    Some(LeadingClipCorrection {
        ops: corrected,
        reference_start: reference_start.saturating_sub(fill + 1).max(1),
    })
}

/// Applies the per-record rules for one run
#[derive(Debug, Clone, Copy)]
pub struct ReadSanitizer {
    options: SanitizeOptions,
    policy: TagPolicy,
}

impl ReadSanitizer {
    #[must_use]
    pub fn new(options: SanitizeOptions) -> Self {
        Self {
            options,
            policy: TagPolicy::new(options.mode),
        }
    }

    #[must_use]
    pub fn options(&self) -> SanitizeOptions {
        self.options
    }

    /// Strip a read from the unmapped partition. Its bases are never touched.
    pub fn sanitize_unmapped(&self, record: &mut RecordBuf) -> Disposition {
        self.policy.apply_unmapped(record.data_mut());
        Disposition::Written
    }

    /// Rewrite a read from a contig partition in place.
    ///
    /// # Errors
    ///
    /// Returns `SanitizeError::InvalidRecord` for reads with no start or CIGAR,
    /// or reads the reference cannot cover, and reference errors from `reference`.
    pub fn sanitize_mapped<R: ReferenceAccessor + ?Sized>(
        &self,
        record: &mut RecordBuf,
        contig: &str,
        reference: &mut R,
    ) -> Result<Disposition> {
        let flags = record.flags();

        if flags.is_secondary() && !self.options.keep_secondary {
            return Ok(Disposition::Dropped);
        }

        let read_len = record.sequence().len();
        let ctx = TagContext {
            read_len,
            is_paired: flags.is_segmented(),
        };
        self.policy.apply(record.data_mut(), &ctx);

        if self.options.is_strict() {
            *record.mapping_quality_mut() = None;
        }

        if flags.is_unmapped() {
            return Ok(if self.options.keep_unmapped {
                Disposition::Written
            } else {
                Disposition::Dropped
            });
        }

        let name = record.name().map(|n| n.to_vec()).unwrap_or_default();

        let mut start = record
            .alignment_start()
            .map(|p| usize::from(p) - 1)
            .ok_or_else(|| {
                SanitizeError::invalid_record(&name, "mapped read has no alignment start")
            })?;

        let mut ops = record.cigar().as_ref().to_vec();
        if ops.is_empty() {
            return Err(SanitizeError::invalid_record(
                &name,
                "mapped read has an empty CIGAR",
            ));
        }

        // Moving the start of a paired read would break its mate fields
        if !flags.is_segmented() {
            if let Some(correction) = correct_leading_clip(&ops, start) {
                ops = correction.ops;
                start = correction.reference_start;
                *record.alignment_start_mut() = Position::new(start + 1);
            }
        }

        if read_len == 0 {
            *record.cigar_mut() = Cigar::from(rebuild_layout(&ops));
            return Ok(Disposition::Written);
        }

        let mut reconstruction = reconstruct(&ops, start, read_len, reference, contig)?;

        let mut qualities = record.quality_scores().as_ref().to_vec();
        reconstruction
            .reconcile(read_len, &mut qualities)
            .map_err(|e| SanitizeError::invalid_record(&name, e.to_string()))?;

        *record.sequence_mut() = Sequence::from(reconstruction.sequence);
        *record.quality_scores_mut() = QualityScores::from(qualities);
        *record.cigar_mut() = Cigar::from(reconstruction.cigar);

        Ok(Disposition::Written)
    }
}

/// Shared, read-only inputs for sanitizing one partition
#[derive(Debug, Clone, Copy)]
pub struct PartitionContext<'a> {
    /// Indexed, coordinate-sorted input BAM
    pub input: &'a Path,
    /// Header written to the partition output
    pub header: &'a Header,
    pub options: SanitizeOptions,
    pub io_threads: usize,
}

/// Sanitize every record of one partition into `job.output`.
///
/// Records are written in source order. If any single-end read was rewritten,
/// its start may have moved, so the output is re-sorted by coordinate.
///
/// # Errors
///
/// Returns the first error from reading, sanitizing, writing, or sorting.
pub fn sanitize_partition<R: ReferenceAccessor + ?Sized>(
    ctx: &PartitionContext<'_>,
    job: &ContigPartition,
    reference: &mut R,
) -> Result<PartitionSummary> {
    let (mut reader, input_header) = open_indexed_reader(ctx.input)?;
    let sanitizer = ReadSanitizer::new(ctx.options);

    let unsorted = job.output.with_extension("unsorted.bam");
    let mut writer = create_writer(&unsorted, ctx.header, ctx.io_threads)?;
    let mut summary = PartitionSummary::new(job.label());
    let mut needs_resort = false;

    match &job.partition {
        Partition::Contig(contig) => {
            let region = Region::new(contig.as_str(), ..);
            let query = reader.query(&input_header, &region)?;

            for result in query {
                let mut record = RecordBuf::try_from_alignment_record(&input_header, &result?)?;
                let single_end =
                    !record.flags().is_segmented() && !record.flags().is_unmapped();

                let disposition = sanitizer.sanitize_mapped(&mut record, contig, reference)?;
                if disposition == Disposition::Written {
                    writer.write_alignment_record(ctx.header, &record)?;
                    needs_resort |= single_end;
                }
                summary.record(disposition);
            }
        }
        Partition::Unmapped => {
            for result in reader.query_unmapped()? {
                let record = result?;

                // Unmapped mates placed at their mate's position belong to that contig
                if record.reference_sequence_id().is_some() {
                    continue;
                }

                let mut record = RecordBuf::try_from_alignment_record(&input_header, &record)?;

                let disposition = sanitizer.sanitize_unmapped(&mut record);
                if disposition == Disposition::Written {
                    writer.write_alignment_record(ctx.header, &record)?;
                }
                summary.record(disposition);
            }
        }
    }

    finish_writer(writer)?;

    if needs_resort {
        let mut options = SortOptions::default().threads(ctx.io_threads);
        if let Some(dir) = job.output.parent() {
            options = options.tmp_dir(dir);
        }
        sort_by_coordinate(&unsorted, &job.output, &options)?;
        fs::remove_file(&unsorted)?;
        summary.resorted = true;
    } else {
        fs::rename(&unsorted, &job.output)?;
    }

    debug!(
        contig = %job.label(),
        written = summary.records_written,
        dropped = summary.records_dropped,
        resorted = summary.resorted,
        "Partition complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use noodles::sam::alignment::record::data::field::Tag;
    use noodles::sam::alignment::record::{Flags, MappingQuality};
    use noodles::sam::alignment::record_buf::data::field::Value;
    use noodles::sam::alignment::record_buf::Data;

    use crate::core::types::SanitizeMode;

    fn op(kind: Kind, len: usize) -> Op {
        Op::new(kind, len)
    }

    fn reference() -> HashMap<String, Vec<u8>> {
        let bases = (0..5000).map(|i| b"ACGT"[i % 4]).collect();
        HashMap::from([("chr1".to_string(), bases)])
    }

    /// A mapped read at 0-based `start` with `len` bases of `T` and quality 30
    fn mapped(flags: Flags, start: usize, ops: Vec<Op>, len: usize) -> RecordBuf {
        RecordBuf::builder()
            .set_name("read1")
            .set_flags(flags)
            .set_reference_sequence_id(0)
            .set_alignment_start(Position::new(start + 1).unwrap())
            .set_mapping_quality(MappingQuality::new(60).unwrap())
            .set_cigar(Cigar::from(ops))
            .set_sequence(Sequence::from(vec![b'T'; len]))
            .set_quality_scores(QualityScores::from(vec![30; len]))
            .build()
    }

    fn tag(key: &[u8; 2]) -> Tag {
        Tag::from(*key)
    }

    fn start_of(record: &RecordBuf) -> usize {
        usize::from(record.alignment_start().unwrap()) - 1
    }

    fn lenient() -> ReadSanitizer {
        ReadSanitizer::new(SanitizeOptions::default())
    }

    fn strict() -> ReadSanitizer {
        ReadSanitizer::new(SanitizeOptions {
            mode: SanitizeMode::Strict,
            ..SanitizeOptions::default()
        })
    }

    #[test]
    fn test_leading_soft_clip_single_end() {
        let mut fasta = reference();
        let mut record = mapped(
            Flags::empty(),
            100,
            vec![op(Kind::SoftClip, 5), op(Kind::Match, 40)],
            45,
        );

        let disposition = lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(disposition, Disposition::Written);
        assert_eq!(start_of(&record), 94);
        assert_eq!(record.cigar().as_ref(), &[op(Kind::Match, 45)]);
        assert_eq!(record.sequence().as_ref(), &fasta["chr1"][94..139]);
        assert_eq!(record.quality_scores().as_ref().len(), 45);
    }

    #[test]
    fn test_spliced_paired_read_keeps_start() {
        let mut fasta = reference();
        let mut record = mapped(
            Flags::SEGMENTED,
            1000,
            vec![op(Kind::Match, 20), op(Kind::Skip, 500), op(Kind::Match, 30)],
            50,
        );

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(start_of(&record), 1000);
        assert_eq!(
            record.cigar().as_ref(),
            &[op(Kind::Match, 20), op(Kind::Skip, 500), op(Kind::Match, 30)]
        );
        let mut expected = fasta["chr1"][1000..1020].to_vec();
        expected.extend_from_slice(&fasta["chr1"][1520..1550]);
        assert_eq!(record.sequence().as_ref(), expected.as_slice());
    }

    #[test]
    fn test_paired_read_position_stable() {
        let shapes = vec![
            vec![op(Kind::SoftClip, 5), op(Kind::Match, 40)],
            vec![op(Kind::HardClip, 3), op(Kind::Match, 45)],
            vec![op(Kind::Deletion, 2), op(Kind::Match, 45)],
            vec![op(Kind::Match, 20), op(Kind::Insertion, 5), op(Kind::Match, 20)],
        ];

        let mut fasta = reference();
        for ops in shapes {
            let mut record = mapped(Flags::SEGMENTED | Flags::PROPERLY_SEGMENTED, 300, ops, 45);
            lenient()
                .sanitize_mapped(&mut record, "chr1", &mut fasta)
                .unwrap();
            assert_eq!(start_of(&record), 300);
        }
    }

    #[test]
    fn test_unspliced_output_shape() {
        let mut fasta = reference();
        let mut record = mapped(
            Flags::SEGMENTED,
            10,
            vec![
                op(Kind::Match, 10),
                op(Kind::Insertion, 3),
                op(Kind::Match, 10),
                op(Kind::Deletion, 4),
                op(Kind::Match, 7),
                op(Kind::SoftClip, 2),
            ],
            32,
        );

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(record.cigar().as_ref(), &[op(Kind::Match, 32)]);
        assert_eq!(record.sequence().len(), 32);
        assert_eq!(record.quality_scores().as_ref().len(), 32);
    }

    #[test]
    fn test_clip_correction_clamps_to_one() {
        let mut fasta = reference();
        let mut record = mapped(
            Flags::empty(),
            3,
            vec![op(Kind::SoftClip, 20), op(Kind::Match, 30)],
            50,
        );

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();
        assert_eq!(start_of(&record), 1);
        assert_eq!(record.cigar().as_ref(), &[op(Kind::Match, 50)]);
    }

    #[test]
    fn test_correct_leading_clip_shapes() {
        // Single leading op followed by a non-match becomes its own match
        let corrected = correct_leading_clip(
            &[op(Kind::Deletion, 4), op(Kind::Insertion, 2), op(Kind::Match, 10)],
            50,
        )
        .unwrap();
        assert_eq!(corrected.reference_start, 45);
        assert_eq!(
            corrected.ops,
            vec![op(Kind::Match, 4), op(Kind::Insertion, 2), op(Kind::Match, 10)]
        );

        // A run of leading ops is collapsed
        let corrected = correct_leading_clip(
            &[op(Kind::HardClip, 5), op(Kind::SoftClip, 3), op(Kind::Match, 40)],
            100,
        )
        .unwrap();
        assert_eq!(corrected.reference_start, 91);
        assert_eq!(corrected.ops, vec![op(Kind::Match, 48)]);

        assert!(correct_leading_clip(&[op(Kind::Match, 40)], 100).is_none());
    }

    #[test]
    fn test_clip_start_never_below_one() {
        for clip in [1, 5, 50, 500, 5000] {
            for start in [0, 1, 2, 10, 100] {
                let corrected =
                    correct_leading_clip(&[op(Kind::SoftClip, clip), op(Kind::Match, 10)], start)
                        .unwrap();
                assert!(corrected.reference_start >= 1);
            }
        }
    }

    #[test]
    fn test_secondary_dropped_unless_requested() {
        let mut fasta = reference();
        let secondary = mapped(Flags::SECONDARY, 10, vec![op(Kind::Match, 20)], 20);

        let mut record = secondary.clone();
        let disposition = lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();
        assert_eq!(disposition, Disposition::Dropped);

        let keep = ReadSanitizer::new(SanitizeOptions {
            keep_secondary: true,
            ..SanitizeOptions::default()
        });
        let mut record = secondary;
        let disposition = keep.sanitize_mapped(&mut record, "chr1", &mut fasta).unwrap();
        assert_eq!(disposition, Disposition::Written);
    }

    #[test]
    fn test_placed_unmapped_read() {
        let mut fasta = reference();
        let mut original = mapped(
            Flags::SEGMENTED | Flags::UNMAPPED,
            10,
            vec![op(Kind::SoftClip, 5), op(Kind::Match, 15)],
            20,
        );
        *original.data_mut() = [(tag(b"NM"), Value::UInt8(4))].into_iter().collect();

        let mut record = original.clone();
        let disposition = lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();
        assert_eq!(disposition, Disposition::Dropped);

        let keep = ReadSanitizer::new(SanitizeOptions {
            keep_unmapped: true,
            ..SanitizeOptions::default()
        });
        let mut record = original.clone();
        let disposition = keep.sanitize_mapped(&mut record, "chr1", &mut fasta).unwrap();
        assert_eq!(disposition, Disposition::Written);
        assert_eq!(record.sequence(), original.sequence());
        assert_eq!(record.cigar(), original.cigar());
        assert_eq!(record.data().get(&tag(b"NM")), Some(&Value::UInt32(0)));
    }

    #[test]
    fn test_strict_paired_tags() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 200, vec![op(Kind::Match, 50)], 50);
        *record.data_mut() = [
            (tag(b"AS"), Value::UInt8(42)),
            (tag(b"NH"), Value::UInt8(3)),
            (tag(b"XS"), Value::UInt8(40)),
            (tag(b"MD"), Value::from("20A29")),
            (tag(b"RG"), Value::from("rg1")),
        ]
        .into_iter()
        .collect::<Data>();

        strict()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(record.data().get(&tag(b"AS")), Some(&Value::UInt32(100)));
        assert_eq!(record.data().get(&tag(b"NH")), Some(&Value::UInt32(1)));
        assert_eq!(record.data().get(&tag(b"MD")), Some(&Value::from("50")));
        assert!(record.data().get(&tag(b"XS")).is_none());
        assert_eq!(record.data().get(&tag(b"RG")), Some(&Value::from("rg1")));
        assert!(record.mapping_quality().is_none());
    }

    #[test]
    fn test_lenient_keeps_mapping_quality() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 200, vec![op(Kind::Match, 50)], 50);

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();
        assert_eq!(record.mapping_quality(), MappingQuality::new(60));
    }

    #[test]
    fn test_read_past_contig_end() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 4980, vec![op(Kind::Match, 50)], 50);

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(record.sequence().len(), 20);
        assert_eq!(record.quality_scores().as_ref().len(), 20);
        assert_eq!(record.cigar().as_ref(), &[op(Kind::Match, 20)]);
    }

    #[test]
    fn test_deletions_shrink_quality() {
        let mut fasta = reference();
        let mut record = mapped(
            Flags::SEGMENTED,
            100,
            vec![
                op(Kind::Match, 20),
                op(Kind::Deletion, 15),
                op(Kind::Match, 10),
                op(Kind::Skip, 100),
                op(Kind::Match, 10),
            ],
            40,
        );

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();

        assert_eq!(record.cigar().as_ref(), &[op(Kind::Match, 40)]);
        assert_eq!(record.sequence().len(), record.quality_scores().as_ref().len());
    }

    #[test]
    fn test_empty_sequence_gets_layout_cigar() {
        let mut fasta = reference();
        let mut record = RecordBuf::builder()
            .set_name("sec")
            .set_flags(Flags::SECONDARY | Flags::SEGMENTED)
            .set_reference_sequence_id(0)
            .set_alignment_start(Position::new(101).unwrap())
            .set_cigar(Cigar::from(vec![
                op(Kind::Match, 10),
                op(Kind::Deletion, 2),
                op(Kind::Match, 8),
                op(Kind::Skip, 100),
                op(Kind::Match, 30),
            ]))
            .build();

        let keep = ReadSanitizer::new(SanitizeOptions {
            keep_secondary: true,
            ..SanitizeOptions::default()
        });
        keep.sanitize_mapped(&mut record, "chr1", &mut fasta).unwrap();

        assert!(record.sequence().is_empty());
        assert!(record.quality_scores().as_ref().is_empty());
        assert_eq!(
            record.cigar().as_ref(),
            &[op(Kind::Match, 20), op(Kind::Skip, 100), op(Kind::Match, 30)]
        );
    }

    #[test]
    fn test_missing_qualities_stay_empty() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 10, vec![op(Kind::Match, 20)], 20);
        *record.quality_scores_mut() = QualityScores::default();

        lenient()
            .sanitize_mapped(&mut record, "chr1", &mut fasta)
            .unwrap();
        assert_eq!(record.sequence().len(), 20);
        assert!(record.quality_scores().as_ref().is_empty());
    }

    #[test]
    fn test_missing_start_is_invalid() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 10, vec![op(Kind::Match, 20)], 20);
        *record.alignment_start_mut() = None;

        let result = lenient().sanitize_mapped(&mut record, "chr1", &mut fasta);
        assert!(matches!(result, Err(SanitizeError::InvalidRecord { .. })));
    }

    #[test]
    fn test_unknown_contig_fails() {
        let mut fasta = reference();
        let mut record = mapped(Flags::SEGMENTED, 10, vec![op(Kind::Match, 20)], 20);

        let result = lenient().sanitize_mapped(&mut record, "chrUn", &mut fasta);
        assert!(matches!(result, Err(SanitizeError::ReferenceNotFound { .. })));
    }

    #[test]
    fn test_unmapped_partition_tags() {
        let mut record = RecordBuf::builder()
            .set_name("u1")
            .set_flags(Flags::UNMAPPED)
            .set_sequence(Sequence::from(b"ACGTN".to_vec()))
            .set_data(
                [
                    (tag(b"uT"), Value::UInt8(1)),
                    (tag(b"NM"), Value::UInt8(0)),
                    (tag(b"XA"), Value::from("chr2,+100,50M,0")),
                ]
                .into_iter()
                .collect(),
            )
            .build();

        let disposition = lenient().sanitize_unmapped(&mut record);
        assert_eq!(disposition, Disposition::Written);
        assert!(record.data().get(&tag(b"uT")).is_none());
        assert!(record.data().get(&tag(b"NM")).is_none());
        assert!(record.data().get(&tag(b"XA")).is_some());
        assert_eq!(record.sequence().as_ref(), b"ACGTN");

        strict().sanitize_unmapped(&mut record);
        assert!(record.data().get(&tag(b"XA")).is_none());
    }
}
