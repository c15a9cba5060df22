#![forbid(unsafe_code)]

//! Rich-text content units.
//!
//! Buffer content is a sequence of [`Cell`]s. A cell is either one character
//! or one embedded object (image, widget anchor) plus the set of formatting
//! tags applied to it. Positions everywhere in this crate are cell offsets.
//!
//! A [`Fragment`] is an owned run of cells. Deletions capture the removed
//! fragment so that re-inserting it restores text, objects and formatting
//! verbatim.

use std::collections::BTreeSet;
use std::fmt;

/// Placeholder character used when an embedded object is rendered as text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Identifier of a formatting tag (bold, italic, font family, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagId(pub u32);

/// Identifier of an embedded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(pub u64);

/// What occupies one buffer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Piece {
    /// A single character.
    Char(char),
    /// An embedded object.
    Object(ObjectId),
}

impl Piece {
    /// Text rendering of this piece.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Char(c) => c,
            Self::Object(_) => OBJECT_REPLACEMENT,
        }
    }
}

/// One buffer position with its formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub piece: Piece,
    pub tags: BTreeSet<TagId>,
}

impl Cell {
    /// An untagged character cell.
    #[must_use]
    pub fn plain(c: char) -> Self {
        Self {
            piece: Piece::Char(c),
            tags: BTreeSet::new(),
        }
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.tags.len() * std::mem::size_of::<TagId>()
    }
}

/// An owned run of cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fragment {
    cells: Vec<Cell>,
}

impl Fragment {
    /// Empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Untagged text.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self {
            cells: text.chars().map(Cell::plain).collect(),
        }
    }

    /// Text carrying the given tags on every character.
    #[must_use]
    pub fn from_tagged_text(text: &str, tags: &BTreeSet<TagId>) -> Self {
        Self {
            cells: text
                .chars()
                .map(|c| Cell {
                    piece: Piece::Char(c),
                    tags: tags.clone(),
                })
                .collect(),
        }
    }

    /// A single embedded object.
    #[must_use]
    pub fn object(id: ObjectId) -> Self {
        Self {
            cells: vec![Cell {
                piece: Piece::Object(id),
                tags: BTreeSet::new(),
            }],
        }
    }

    /// Wrap existing cells.
    #[must_use]
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Number of positions this fragment occupies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Append another fragment.
    pub fn extend(&mut self, other: &Fragment) {
        self.cells.extend(other.cells.iter().cloned());
    }

    /// Text rendering; objects become [`OBJECT_REPLACEMENT`].
    #[must_use]
    pub fn text(&self) -> String {
        self.cells.iter().map(|c| c.piece.as_char()).collect()
    }

    /// True when the fragment contains a line break.
    #[must_use]
    pub fn contains_newline(&self) -> bool {
        self.cells.iter().any(|c| c.piece == Piece::Char('\n'))
    }

    /// True when the fragment ends with whitespace.
    #[must_use]
    pub fn ends_with_whitespace(&self) -> bool {
        matches!(self.cells.last(), Some(Cell { piece: Piece::Char(c), .. }) if c.is_whitespace())
    }

    /// Approximate heap + inline size for history budgeting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.cells.iter().map(Cell::size_bytes).sum::<usize>()
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

/// Presence of one tag over a contiguous sub-range, as captured before a
/// tag change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagRun {
    pub start: usize,
    pub end: usize,
    pub present: bool,
}

/// Collapse per-cell presence flags starting at `offset` into runs.
#[must_use]
pub fn runs_from_flags(offset: usize, flags: &[bool]) -> Vec<TagRun> {
    let mut runs: Vec<TagRun> = Vec::new();
    for (i, &present) in flags.iter().enumerate() {
        let pos = offset + i;
        match runs.last_mut() {
            Some(run) if run.present == present && run.end == pos => run.end = pos + 1,
            _ => runs.push(TagRun {
                start: pos,
                end: pos + 1,
                present,
            }),
        }
    }
    runs
}
