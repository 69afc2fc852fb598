//! Turns an editor selection into the source text to execute.
//!
//! Rows are 1-based as editors report them, columns 0-based. Columns count
//! characters.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Rectangular selection: the column bounds apply to every row.
    Block { start: Position, end: Position },
    /// Whole lines `first..=last`.
    Lines { first: usize, last: usize },
    CurrentLine(usize),
}

impl Selection {
    /// Builds a selection from the visual marks and the command range of an
    /// editor command. Marks on row 0 mean there was no visual selection.
    pub fn from_marks(start: Position, end: Position, range: (usize, usize)) -> Self {
        if start.row == 0 && end.row == 0 {
            let (first, last) = range;
            if first == last {
                Selection::CurrentLine(first)
            } else {
                Selection::Lines { first, last }
            }
        } else {
            Selection::Block { start, end }
        }
    }

    fn span(&self) -> (Range<usize>, Columns) {
        match *self {
            Selection::Block { start, end } => {
                let first = start.row.min(end.row);
                let last = start.row.max(end.row);
                (first.saturating_sub(1)..last, Columns::Span(start.col, end.col))
            }
            Selection::Lines { first, last } => {
                (first.min(last).saturating_sub(1)..first.max(last), Columns::Full)
            }
            Selection::CurrentLine(row) => (row.saturating_sub(1)..row, Columns::Full),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
    Full,
    /// Inclusive bounds, in either order.
    Span(usize, usize),
}

impl Columns {
    fn bounds(&self) -> (usize, usize) {
        match *self {
            Columns::Full => (0, usize::MAX),
            Columns::Span(x0, x1) => (x0.min(x1), x0.max(x1).saturating_add(1)),
        }
    }
}

pub fn extract<S: AsRef<str>>(lines: &[S], selection: &Selection) -> String {
    let (rows, columns) = selection.span();
    extract_span(lines, rows, columns)
}

/// Slices `columns` out of the rows in `rows` and joins them with newlines.
///
/// A single row is trimmed on both sides, so a fragment picked out of the
/// middle of a line runs as its own statement. Several rows only lose trailing
/// whitespace to keep their indentation.
pub fn extract_span<S: AsRef<str>>(lines: &[S], rows: Range<usize>, columns: Columns) -> String {
    // Decided by the requested rows, before clamping to the buffer.
    let single_row = rows.end.saturating_sub(rows.start) == 1;

    let end = rows.end.min(lines.len());
    if rows.start >= end {
        return String::new();
    }

    let (x0, x1) = columns.bounds();

    lines[rows.start..end]
        .iter()
        .map(|line| {
            let slice = slice_chars(line.as_ref(), x0, x1);
            if single_row {
                slice.trim()
            } else {
                slice.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn slice_chars(line: &str, start: usize, end: usize) -> &str {
    let byte_at = |n: usize| {
        line.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    };

    let from = byte_at(start);
    let to = if end == usize::MAX { line.len() } else { byte_at(end) };

    if from >= to {
        ""
    } else {
        &line[from..to]
    }
}
