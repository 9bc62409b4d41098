//! File access for alignments and references.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`bam`] | BAM readers and single/multi-threaded BGZF writers |
//! | [`concat`] | Ordered concatenation of partition outputs |
//! | [`fai`] | FASTA index (`.fai`) reading |
//! | [`fasta`] | [`fasta::ReferenceAccessor`] and the indexed FASTA implementation |
//! | [`index`] | BAI construction with sort-and-retry fallback |
//! | [`sort`] | External coordinate sort |

pub mod bam;
pub mod concat;
pub mod fai;
pub mod fasta;
pub mod index;
pub mod sort;
