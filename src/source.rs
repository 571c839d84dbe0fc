//! Types related to source files.
//!
//! The pipeline never reads source text itself; positions are carried
//! through from elaboration so that an ill-typed tree can be reported at
//! the place in the user's program that produced it.

use std::fmt;
use std::ops::Range;

/// File handles, as issued by the driver's file database.
pub type FileId = usize;

/// Byte offsets into source files.
pub type BytePos = u32;

/// A byte range within a single source file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: BytePos,
    pub end: BytePos,
}

impl ByteRange {
    pub const fn new(start: BytePos, end: BytePos) -> ByteRange {
        ByteRange { start, end }
    }

    pub fn merge(&self, other: &ByteRange) -> ByteRange {
        ByteRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(range: ByteRange) -> Range<usize> {
        range.start as usize..range.end as usize
    }
}

/// A byte range in an identified source file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileRange {
    pub file_id: FileId,
    pub range: ByteRange,
}

impl FileRange {
    pub const fn new(file_id: FileId, range: ByteRange) -> FileRange {
        FileRange { file_id, range }
    }

    pub fn merge(&self, other: &FileRange) -> Option<FileRange> {
        (self.file_id == other.file_id).then(|| FileRange {
            file_id: self.file_id,
            range: self.range.merge(&other.range),
        })
    }
}

/// A source position attached to an IR node.
///
/// Synthesised nodes (fresh temporaries, reified continuations) carry
/// [`Span::Empty`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Span {
    Range(FileRange),
    Empty,
}

impl Span {
    pub const fn new(file_id: FileId, start: BytePos, end: BytePos) -> Span {
        Span::Range(FileRange::new(file_id, ByteRange::new(start, end)))
    }

    pub fn merge(&self, other: &Span) -> Span {
        match (self, other) {
            (Span::Range(a), Span::Range(b)) => {
                a.merge(b).map(Span::Range).unwrap_or(Span::Empty)
            }
            (Span::Range(a), Span::Empty) => Span::Range(*a),
            (Span::Empty, Span::Range(b)) => Span::Range(*b),
            (Span::Empty, Span::Empty) => Span::Empty,
        }
    }

    pub fn range(&self) -> Option<FileRange> {
        match self {
            Span::Range(range) => Some(*range),
            Span::Empty => None,
        }
    }
}

impl From<FileRange> for Span {
    fn from(range: FileRange) -> Span {
        Span::Range(range)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Span::Range(range) => write!(
                f,
                "file {}:{}-{}",
                range.file_id, range.range.start, range.range.end
            ),
            Span::Empty => write!(f, "(unknown location)"),
        }
    }
}
