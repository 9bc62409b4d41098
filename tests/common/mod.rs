//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use bamboozle::io::bam::{create_writer, finish_writer, open_reader};
use noodles::core::Position;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar, Data, QualityScores, Sequence};
use noodles::sam::alignment::RecordBuf;
use noodles::sam::header::record::value::{map::ReferenceSequence, Map};
use noodles::sam::Header;

const LINE_WIDTH: usize = 60;

/// Deterministic, non-repetitive bases so every offset is distinguishable
pub fn bases(len: usize, seed: usize) -> Vec<u8> {
    (0..len)
        .map(|i| b"ACGT"[(i * 7 + i / 5 + seed) % 4])
        .collect()
}

pub fn chr1() -> Vec<u8> {
    bases(240, 0)
}

pub fn chr2() -> Vec<u8> {
    bases(120, 1)
}

/// Write a FASTA with `LINE_WIDTH` columns and its `.fai`.
pub fn write_fasta(path: &Path, contigs: &[(&str, &[u8])], with_index: bool) {
    let mut fasta = Vec::new();
    let mut fai = String::new();

    for (name, seq) in contigs {
        fasta.extend_from_slice(format!(">{name}\n").as_bytes());
        let offset = fasta.len();
        for line in seq.chunks(LINE_WIDTH) {
            fasta.extend_from_slice(line);
            fasta.push(b'\n');
        }
        fai.push_str(&format!(
            "{name}\t{}\t{offset}\t{LINE_WIDTH}\t{}\n",
            seq.len(),
            LINE_WIDTH + 1
        ));
    }

    fs::write(path, fasta).unwrap();
    if with_index {
        let mut fai_path = path.as_os_str().to_owned();
        fai_path.push(".fai");
        fs::write(PathBuf::from(fai_path), fai).unwrap();
    }
}

/// Writes the standard reference (`chr1`, `chr2`) into `dir`.
pub fn write_reference(dir: &Path) -> PathBuf {
    let path = dir.join("ref.fa");
    write_fasta(&path, &[("chr1", &chr1()), ("chr2", &chr2())], true);
    path
}

/// `chr1`, `chr2`, and `chrX`, which the reference does not contain
pub fn header() -> Header {
    let seq = |len| Map::<ReferenceSequence>::new(NonZeroUsize::new(len).unwrap());
    Header::builder()
        .add_reference_sequence("chr1", seq(240))
        .add_reference_sequence("chr2", seq(120))
        .add_reference_sequence("chrX", seq(100))
        .build()
}

pub fn write_bam(path: &Path, records: &[RecordBuf]) {
    let header = header();
    let mut writer = create_writer(path, &header, 1).unwrap();
    for record in records {
        writer.write_alignment_record(&header, record).unwrap();
    }
    finish_writer(writer).unwrap();
}

pub fn read_bam(path: &Path) -> (Header, Vec<RecordBuf>) {
    let (mut reader, header) = open_reader(path).unwrap();
    let records = reader
        .record_bufs(&header)
        .collect::<std::io::Result<Vec<_>>>()
        .unwrap();
    (header, records)
}

pub fn parse_cigar(ops: &[(Kind, usize)]) -> Cigar {
    Cigar::from(
        ops.iter()
            .map(|&(kind, len)| Op::new(kind, len))
            .collect::<Vec<_>>(),
    )
}

/// A mapped read on `contig_id` at 0-based `start`, all `T`, quality 30
pub fn mapped(
    name: &str,
    flags: Flags,
    contig_id: usize,
    start: usize,
    ops: &[(Kind, usize)],
    len: usize,
) -> RecordBuf {
    let data: Data = [
        (Tag::from(*b"NM"), Value::UInt8(3)),
        (Tag::from(*b"MD"), Value::from("2A3C1")),
        (Tag::from(*b"AS"), Value::UInt8(12)),
        (Tag::from(*b"NH"), Value::UInt8(4)),
    ]
    .into_iter()
    .collect();

    let mut builder = RecordBuf::builder()
        .set_name(name)
        .set_flags(flags)
        .set_reference_sequence_id(contig_id)
        .set_alignment_start(Position::new(start + 1).unwrap())
        .set_mapping_quality(MappingQuality::new(37).unwrap())
        .set_cigar(parse_cigar(ops))
        .set_sequence(Sequence::from(vec![b'T'; len]))
        .set_quality_scores(QualityScores::from(vec![30; len]))
        .set_data(data);

    if flags.is_segmented() {
        builder = builder
            .set_mate_reference_sequence_id(contig_id)
            .set_mate_alignment_start(Position::new(start + 101).unwrap())
            .set_template_length(110);
    }

    builder.build()
}

/// An unplaced, unmapped read carrying a `uT` and an `XA` tag
pub fn unmapped(name: &str) -> RecordBuf {
    let data: Data = [
        (Tag::from(*b"uT"), Value::from("1")),
        (Tag::from(*b"XA"), Value::from("chr1,+10,10M,0")),
    ]
    .into_iter()
    .collect();

    RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(b"GATTACAGAT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![20; 10]))
        .set_data(data)
        .build()
}

pub fn start_of(record: &RecordBuf) -> usize {
    usize::from(record.alignment_start().unwrap()) - 1
}

pub fn name_of(record: &RecordBuf) -> String {
    record
        .name()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .unwrap_or_default()
}

/// An unmapped mate stored at its mapped mate's position on `contig_id`
pub fn placed_unmapped(name: &str, contig_id: usize, start: usize) -> RecordBuf {
    RecordBuf::builder()
        .set_name(name)
        .set_flags(Flags::SEGMENTED | Flags::UNMAPPED | Flags::LAST_SEGMENT)
        .set_reference_sequence_id(contig_id)
        .set_alignment_start(Position::new(start + 1).unwrap())
        .set_cigar(parse_cigar(&[(Kind::Match, 10)]))
        .set_mate_reference_sequence_id(contig_id)
        .set_mate_alignment_start(Position::new(start + 1).unwrap())
        .set_sequence(Sequence::from(b"CCCCAAAATT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![25; 10]))
        .build()
}
