//! Auxiliary tag policy.
//!
//! Decides, per two-character tag key and per [`SanitizeMode`], whether a tag is kept,
//! zeroed, rewritten, or dropped. Decisions are a pure function of key and mode; the
//! record-dependent values (read length, pairing) only enter when a decision is applied.
//!
//! | Tag | Lenient | Strict |
//! |-----|---------|--------|
//! | `NM`, `nM` | zero | zero |
//! | `MD` | read length | read length |
//! | `MC`, `XN`, `XM`, `XO`, `XG` | drop | drop |
//! | `AS`, `MQ` | keep | perfect score |
//! | `NH` | keep | 1 |
//! | `HI`, `IH`, `H1`, `H2`, `OA`, `OC`, `OP`, `OQ`, `SA`, `SM`, `XA`, `XS` | keep | drop |
//!
//! Reads in the unmapped partition only ever have tags dropped.

use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::Data;

use crate::core::types::SanitizeMode;

/// A two-character SAM tag key, e.g. `*b"NM"`
pub type TagKey = [u8; 2];

const ZEROED: &[TagKey] = &[*b"NM", *b"nM"];
const READ_LENGTH: &[TagKey] = &[*b"MD"];
const TRIMMED: &[TagKey] = &[*b"MC", *b"XN", *b"XM", *b"XO", *b"XG"];

const STRICT_SCORED: &[TagKey] = &[*b"AS", *b"MQ"];
const STRICT_HIT_COUNT: &[TagKey] = &[*b"NH"];
const STRICT_TRIMMED: &[TagKey] = &[
    *b"HI", *b"IH", *b"H1", *b"H2", *b"OA", *b"OC", *b"OP", *b"OQ", *b"SA", *b"SM", *b"XA", *b"XS",
];

const UNMAPPED_TRIMMED: &[TagKey] = &[*b"uT", *b"nM", *b"NM", *b"XN", *b"XM", *b"XO", *b"XG"];
const UNMAPPED_STRICT_TRIMMED: &[TagKey] = &[
    *b"NH", *b"HI", *b"IH", *b"AS", *b"MQ", *b"H1", *b"H2", *b"OA", *b"OC", *b"OP", *b"OQ",
    *b"SA", *b"SM", *b"XA", *b"XS",
];

/// Every key a mapped-read decision can change, in application order
const MAPPED_GOVERNED: &[&[TagKey]] = &[
    ZEROED,
    READ_LENGTH,
    STRICT_SCORED,
    STRICT_HIT_COUNT,
    TRIMMED,
    STRICT_TRIMMED,
];

const UNMAPPED_GOVERNED: &[&[TagKey]] = &[UNMAPPED_TRIMMED, UNMAPPED_STRICT_TRIMMED];

/// What to do with one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Keep,
    /// Set to integer 0
    Zero,
    /// Set to the read length, as a string (an MD string of all matches)
    RewriteToReadLength,
    /// Set to the best possible score: read length times the number of segments (2 if paired)
    RewriteToPerfectScore,
    RewriteToConstant(u32),
    Drop,
}

/// Decision for a tag on a mapped read.
#[must_use]
pub fn decide(key: TagKey, mode: SanitizeMode) -> TagAction {
    if ZEROED.contains(&key) {
        return TagAction::Zero;
    }
    if READ_LENGTH.contains(&key) {
        return TagAction::RewriteToReadLength;
    }
    if TRIMMED.contains(&key) {
        return TagAction::Drop;
    }

    match mode {
        SanitizeMode::Lenient => TagAction::Keep,
        SanitizeMode::Strict => {
            if STRICT_SCORED.contains(&key) {
                TagAction::RewriteToPerfectScore
            } else if STRICT_HIT_COUNT.contains(&key) {
                TagAction::RewriteToConstant(1)
            } else if STRICT_TRIMMED.contains(&key) {
                TagAction::Drop
            } else {
                TagAction::Keep
            }
        }
    }
}

/// Decision for a tag on a read in the unmapped partition.
#[must_use]
pub fn decide_unmapped(key: TagKey, mode: SanitizeMode) -> TagAction {
    let dropped = UNMAPPED_TRIMMED.contains(&key)
        || (mode == SanitizeMode::Strict && UNMAPPED_STRICT_TRIMMED.contains(&key));

    if dropped {
        TagAction::Drop
    } else {
        TagAction::Keep
    }
}

/// Record-dependent inputs needed to apply rewrite actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagContext {
    pub read_len: usize,
    pub is_paired: bool,
}

impl TagContext {
    #[must_use]
    pub fn perfect_score(&self) -> u32 {
        let ploidy = if self.is_paired { 2 } else { 1 };
        u32::try_from(self.read_len)
            .unwrap_or(u32::MAX)
            .saturating_mul(ploidy)
    }
}

/// Apply one action to a tag map. Absent tags are never created.
pub fn apply_action(data: &mut Data, key: TagKey, action: TagAction, ctx: &TagContext) {
    let tag = Tag::from(key);

    if data.get(&tag).is_none() {
        return;
    }

    match action {
        TagAction::Keep => {}
        TagAction::Zero => {
            data.insert(tag, Value::UInt32(0));
        }
        TagAction::RewriteToReadLength => {
            data.insert(tag, Value::from(ctx.read_len.to_string()));
        }
        TagAction::RewriteToPerfectScore => {
            data.insert(tag, Value::UInt32(ctx.perfect_score()));
        }
        TagAction::RewriteToConstant(value) => {
            data.insert(tag, Value::UInt32(value));
        }
        TagAction::Drop => {
            data.remove(&tag);
        }
    }
}

/// The tag policy for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPolicy {
    mode: SanitizeMode,
}

impl TagPolicy {
    #[must_use]
    pub fn new(mode: SanitizeMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> SanitizeMode {
        self.mode
    }

    #[must_use]
    pub fn decide(&self, key: TagKey) -> TagAction {
        decide(key, self.mode)
    }

    #[must_use]
    pub fn decide_unmapped(&self, key: TagKey) -> TagAction {
        decide_unmapped(key, self.mode)
    }

    /// Rewrite the tags of a mapped read.
    pub fn apply(&self, data: &mut Data, ctx: &TagContext) {
        for &key in MAPPED_GOVERNED.iter().flat_map(|keys| keys.iter()) {
            apply_action(data, key, self.decide(key), ctx);
        }
    }

    /// Strip the tags of a read in the unmapped partition.
    pub fn apply_unmapped(&self, data: &mut Data) {
        // Drop actions ignore the context
        let ctx = TagContext {
            read_len: 0,
            is_paired: false,
        };
        for &key in UNMAPPED_GOVERNED.iter().flat_map(|keys| keys.iter()) {
            apply_action(data, key, self.decide_unmapped(key), &ctx);
        }
    }
}
