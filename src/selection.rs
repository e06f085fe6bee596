//! Text selection over the unified history+screen coordinate space.
//!
//! Four modes: linear, word-wise, full-line and rectangular. Coordinates
//! follow [`UNIFIED_COORDINATES`]: visible rows are `1..=rows`, history
//! rows extend to `<= 0` with row 0 the newest saved line.

use crate::commands::Coordinate;
use crate::screen_buffer::ScreenBuffer;

/// Coordinate convention used by the selector: screen rows are 1-based,
/// history rows are zero and negative (0 = newest history line, -1 the one
/// above it, down to `1 - history_line_count`).
pub const UNIFIED_COORDINATES: &str = "history rows <= 0, screen rows 1..=rows";

/// Word delimiters used by word-wise selection when none are configured.
pub const DEFAULT_WORD_DELIMITERS: &str = " ,";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    /// Anchor to cursor, spanning whole lines in between.
    Linear,
    /// Like linear, expanded to word boundaries.
    LinearWordWise,
    /// Whole lines.
    FullLine,
    /// The rectangle spanned by anchor and cursor.
    Rectangular,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    /// Constructed but not yet extended.
    Waiting,
    InProgress,
    Complete,
}

/// One selected span on a single (unified) row; columns are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionRange {
    pub row: i32,
    pub from_column: i32,
    pub to_column: i32,
}

impl SelectionRange {
    pub fn length(&self) -> i32 {
        self.to_column - self.from_column + 1
    }
}

/// The selection state machine: Waiting → InProgress → Complete.
#[derive(Clone, Debug)]
pub struct Selector {
    mode: SelectionMode,
    state: SelectionState,
    word_delimiters: Vec<char>,
    /// Where the selection was started (never moves).
    start: Coordinate,
    from: Coordinate,
    to: Coordinate,
    total_columns: i32,
}

impl Selector {
    /// Begin a selection at `from`. Full-line and word-wise modes expand
    /// immediately; linear and rectangular wait for the first extend.
    pub fn new(
        mode: SelectionMode,
        word_delimiters: &str,
        buffer: &ScreenBuffer,
        from: Coordinate,
    ) -> Self {
        let mut selector = Self {
            mode,
            state: SelectionState::Waiting,
            word_delimiters: word_delimiters.chars().collect(),
            start: from,
            from,
            to: from,
            total_columns: buffer.size().columns,
        };

        match mode {
            SelectionMode::FullLine => {
                selector.state = SelectionState::InProgress;
                selector.from = Coordinate::new(from.row, 1);
                selector.to = Coordinate::new(from.row, selector.total_columns);
            }
            SelectionMode::LinearWordWise => {
                selector.state = SelectionState::InProgress;
                selector.from = selector.expand_backward(buffer, from);
                selector.to = selector.expand_forward(buffer, from);
            }
            _ => {}
        }

        selector
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn from(&self) -> Coordinate {
        self.from
    }

    pub fn to(&self) -> Coordinate {
        self.to
    }

    /// Extend the selection toward `coord`.
    pub fn extend(&mut self, buffer: &ScreenBuffer, coord: Coordinate) {
        if self.state == SelectionState::Complete {
            return;
        }
        self.state = SelectionState::InProgress;

        let coord = Coordinate::new(coord.row, coord.column.clamp(1, self.total_columns));

        match self.mode {
            SelectionMode::Linear | SelectionMode::Rectangular => {
                self.to = stretched_column(buffer, coord);
            }
            SelectionMode::FullLine => {
                if coord.row >= self.start.row {
                    self.from = Coordinate::new(self.start.row, 1);
                    self.to = Coordinate::new(coord.row, self.total_columns);
                } else {
                    self.from = Coordinate::new(coord.row, 1);
                    self.to = Coordinate::new(self.start.row, self.total_columns);
                }
            }
            SelectionMode::LinearWordWise => {
                if coord >= self.start {
                    self.from = self.expand_backward(buffer, self.start);
                    self.to = self.expand_forward(buffer, coord);
                } else {
                    self.from = self.expand_backward(buffer, coord);
                    self.to = self.expand_forward(buffer, self.start);
                }
            }
        }
    }

    /// Finish the selection; further extends are ignored.
    pub fn stop(&mut self) {
        if self.state == SelectionState::InProgress {
            self.state = SelectionState::Complete;
        }
    }

    /// The ordered per-row spans of the current selection.
    pub fn ranges(&self) -> Vec<SelectionRange> {
        let (from, to) = if self.to < self.from {
            (self.to, self.from)
        } else {
            (self.from, self.to)
        };

        match self.mode {
            SelectionMode::FullLine => (from.row..=to.row)
                .map(|row| SelectionRange {
                    row,
                    from_column: 1,
                    to_column: self.total_columns,
                })
                .collect(),
            SelectionMode::Rectangular => {
                let left = from.column.min(to.column);
                let right = from.column.max(to.column);
                (from.row..=to.row)
                    .map(|row| SelectionRange {
                        row,
                        from_column: left,
                        to_column: right,
                    })
                    .collect()
            }
            SelectionMode::Linear | SelectionMode::LinearWordWise => {
                if from.row == to.row {
                    return vec![SelectionRange {
                        row: from.row,
                        from_column: from.column,
                        to_column: to.column,
                    }];
                }
                let mut ranges = Vec::with_capacity((to.row - from.row + 1) as usize);
                ranges.push(SelectionRange {
                    row: from.row,
                    from_column: from.column,
                    to_column: self.total_columns,
                });
                for row in from.row + 1..to.row {
                    ranges.push(SelectionRange {
                        row,
                        from_column: 1,
                        to_column: self.total_columns,
                    });
                }
                ranges.push(SelectionRange {
                    row: to.row,
                    from_column: 1,
                    to_column: to.column,
                });
                ranges
            }
        }
    }

    /// Whether a unified coordinate falls inside the selection.
    pub fn contains(&self, coord: Coordinate) -> bool {
        self.ranges().iter().any(|range| {
            range.row == coord.row
                && range.from_column <= coord.column
                && coord.column <= range.to_column
        })
    }

    fn is_delimiter(&self, buffer: &ScreenBuffer, coord: Coordinate) -> bool {
        match buffer.cell_at(coord) {
            None => true,
            Some(cell) => {
                cell.is_empty()
                    || cell
                        .codepoint(0)
                        .is_some_and(|ch| ch.is_whitespace() || self.word_delimiters.contains(&ch))
            }
        }
    }

    /// Walk left from `coord` to the start of the word. Never crosses a
    /// line boundary unless the previous line wraps into this one.
    fn expand_backward(&self, buffer: &ScreenBuffer, coord: Coordinate) -> Coordinate {
        let mut last = coord;
        let mut current = coord;
        loop {
            if current.column > 1 {
                current.column -= 1;
            } else if buffer.row_wrapped(current.row - 1) {
                current.row -= 1;
                current.column = self.total_columns;
            } else {
                break;
            }

            if self.is_delimiter(buffer, current) {
                break;
            }
            last = current;
        }
        last
    }

    /// Walk right from `coord` to the end of the word. Never crosses a
    /// line boundary unless this line wraps into the next one.
    fn expand_forward(&self, buffer: &ScreenBuffer, coord: Coordinate) -> Coordinate {
        let mut last = coord;
        let mut current = coord;
        loop {
            if current.column < self.total_columns {
                current.column += 1;
            } else if buffer.row_wrapped(current.row) {
                current.row += 1;
                current.column = 1;
            } else {
                break;
            }

            if self.is_delimiter(buffer, current) {
                break;
            }
            last = current;
        }
        stretched_column(buffer, last)
    }
}

/// Snap a coordinate right so it covers a full wide glyph.
fn stretched_column(buffer: &ScreenBuffer, coord: Coordinate) -> Coordinate {
    if let Some(cell) = buffer.cell_at(coord) {
        if cell.width() > 1 {
            return Coordinate::new(coord.row, coord.column + cell.width() - 1);
        }
    }
    coord
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen_buffer::{BufferKind, ScreenSize};

    fn fixture() -> ScreenBuffer {
        // The 5x5 grid from the screen end-to-end scenario:
        //   12 45 / 678 0 / A CDE / FGHIJ / KLMNO
        let mut buffer = ScreenBuffer::new(BufferKind::Primary, ScreenSize::new(5, 5), 50);
        for (row, text) in ["12 45", "678 0", "A CDE", "FGHIJ", "KLMNO"]
            .iter()
            .enumerate()
        {
            buffer.move_cursor_to(Coordinate::new(row as i32 + 1, 1));
            for ch in text.chars() {
                buffer.write_char(ch);
            }
        }
        buffer
    }

    fn text_of(buffer: &ScreenBuffer, ranges: &[SelectionRange]) -> String {
        let mut out = String::new();
        for (i, range) in ranges.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for column in range.from_column..=range.to_column {
                if let Some(cell) = buffer.cell_at(Coordinate::new(range.row, column)) {
                    if cell.width() > 0 {
                        out.push_str(&cell.text());
                    }
                }
            }
        }
        out
    }

    #[test]
    fn linear_single_line() {
        let buffer = fixture();
        let mut selector = Selector::new(
            SelectionMode::Linear,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(2, 2),
        );
        selector.extend(&buffer, Coordinate::new(2, 4));
        selector.stop();

        assert_eq!(selector.state(), SelectionState::Complete);
        let ranges = selector.ranges();
        assert_eq!(
            ranges,
            vec![SelectionRange {
                row: 2,
                from_column: 2,
                to_column: 4
            }]
        );
        assert_eq!(text_of(&buffer, &ranges), "78 ");
    }

    #[test]
    fn linear_multi_line_and_reversed() {
        let buffer = fixture();
        let mut selector = Selector::new(
            SelectionMode::Linear,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(2, 4),
        );
        selector.extend(&buffer, Coordinate::new(4, 2));
        assert_eq!(
            selector.ranges(),
            vec![
                SelectionRange {
                    row: 2,
                    from_column: 4,
                    to_column: 5
                },
                SelectionRange {
                    row: 3,
                    from_column: 1,
                    to_column: 5
                },
                SelectionRange {
                    row: 4,
                    from_column: 1,
                    to_column: 2
                },
            ]
        );

        // Dragging upwards yields the same normalized ranges.
        let mut reversed = Selector::new(
            SelectionMode::Linear,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(4, 2),
        );
        reversed.extend(&buffer, Coordinate::new(2, 4));
        assert_eq!(reversed.ranges(), selector.ranges());
    }

    #[test]
    fn full_line_spans_whole_rows() {
        let buffer = fixture();
        let mut selector = Selector::new(
            SelectionMode::FullLine,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(3, 4),
        );
        assert_eq!(
            selector.ranges(),
            vec![SelectionRange {
                row: 3,
                from_column: 1,
                to_column: 5
            }]
        );

        selector.extend(&buffer, Coordinate::new(2, 1));
        assert_eq!(selector.ranges().len(), 2);
        assert_eq!(text_of(&buffer, &selector.ranges()), "678 0\nA CDE");
    }

    #[test]
    fn word_wise_expands_to_word_boundaries() {
        let buffer = fixture();
        let selector = Selector::new(
            SelectionMode::LinearWordWise,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(2, 2),
        );
        // "678" is the word around (2,2)
        assert_eq!(
            selector.ranges(),
            vec![SelectionRange {
                row: 2,
                from_column: 1,
                to_column: 3
            }]
        );
    }

    #[test]
    fn word_wise_does_not_cross_hard_line_breaks() {
        let buffer = fixture();
        // "FGHIJ" fills row 4 but the line is not wrap-flagged, so the word
        // stops at the line edges.
        let selector = Selector::new(
            SelectionMode::LinearWordWise,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(4, 3),
        );
        assert_eq!(
            selector.ranges(),
            vec![SelectionRange {
                row: 4,
                from_column: 1,
                to_column: 5
            }]
        );
    }

    #[test]
    fn word_wise_follows_wrapped_lines() {
        let mut buffer = ScreenBuffer::new(BufferKind::Primary, ScreenSize::new(3, 2), 10);
        buffer.cursor.auto_wrap = true;
        for ch in "abcde".chars() {
            buffer.write_char(ch);
        }
        assert!(buffer.row_wrapped(1));

        let selector = Selector::new(
            SelectionMode::LinearWordWise,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(1, 2),
        );
        assert_eq!(selector.from(), Coordinate::new(1, 1));
        assert_eq!(selector.to(), Coordinate::new(2, 2));
    }

    #[test]
    fn rectangular_normalizes_columns() {
        let buffer = fixture();
        let mut selector = Selector::new(
            SelectionMode::Rectangular,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(2, 4),
        );
        selector.extend(&buffer, Coordinate::new(4, 2));
        assert_eq!(
            selector.ranges(),
            vec![
                SelectionRange {
                    row: 2,
                    from_column: 2,
                    to_column: 4
                },
                SelectionRange {
                    row: 3,
                    from_column: 2,
                    to_column: 4
                },
                SelectionRange {
                    row: 4,
                    from_column: 2,
                    to_column: 4
                },
            ]
        );
        assert_eq!(text_of(&buffer, &selector.ranges()), "78 \n CD\nGHI");
    }

    #[test]
    fn selection_into_history_rows() {
        let mut buffer = fixture();
        buffer.scroll_up(1); // "12 45" becomes history row 0
        let mut selector = Selector::new(
            SelectionMode::Linear,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(0, 1),
        );
        selector.extend(&buffer, Coordinate::new(1, 3));
        let ranges = selector.ranges();
        assert_eq!(ranges[0].row, 0);
        assert_eq!(text_of(&buffer, &ranges), "12 45\n678");
    }

    #[test]
    fn state_machine_transitions() {
        let buffer = fixture();
        let mut selector = Selector::new(
            SelectionMode::Linear,
            DEFAULT_WORD_DELIMITERS,
            &buffer,
            Coordinate::new(1, 1),
        );
        assert_eq!(selector.state(), SelectionState::Waiting);
        selector.extend(&buffer, Coordinate::new(1, 3));
        assert_eq!(selector.state(), SelectionState::InProgress);
        selector.stop();
        assert_eq!(selector.state(), SelectionState::Complete);
        // extends after completion are ignored
        selector.extend(&buffer, Coordinate::new(5, 5));
        assert_eq!(selector.to(), Coordinate::new(1, 3));
    }
}
