//! The grid data structure of a single screen buffer.
//!
//! A [`ScreenBuffer`] owns the visible lines, the scrollback ring, margins,
//! tab stops, the cursor (with its pen and charset state) and implements
//! the cell-level algorithms: writing codepoints with wrap-pending
//! tracking, scrolling inside margins, erase/insert/delete, and resize.
//!
//! Coordinates are 1-based. Rows `<= 0` address the scrollback where row 0
//! is the newest history line.

use crate::charset::CharsetMapping;
use crate::color::Color;
use crate::commands::{Coordinate, Mode};
use bitflags::bitflags;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use unicode_width::UnicodeWidthChar;

/// Screen dimensions in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenSize {
    pub columns: i32,
    pub rows: i32,
}

impl ScreenSize {
    pub const fn new(columns: i32, rows: i32) -> Self {
        Self { columns, rows }
    }
}

bitflags! {
    /// Character style bit set (SGR attributes minus colors).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CellStyle: u16 {
        const BOLD              = 1 << 0;
        const FAINT             = 1 << 1;
        const ITALIC            = 1 << 2;
        const UNDERLINE         = 1 << 3;
        const BLINKING          = 1 << 4;
        const INVERSE           = 1 << 5;
        const HIDDEN            = 1 << 6;
        const CROSSED_OUT       = 1 << 7;
        const DOUBLY_UNDERLINED = 1 << 8;
        const CURLY_UNDERLINED  = 1 << 9;
        const DOTTED_UNDERLINE  = 1 << 10;
        const DASHED_UNDERLINE  = 1 << 11;
        const FRAMED            = 1 << 12;
        const ENCIRCLED         = 1 << 13;
        const OVERLINE          = 1 << 14;
    }
}

/// The pen: everything newly written cells inherit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphicsAttributes {
    pub foreground: Color,
    pub background: Color,
    pub underline_color: Color,
    pub styles: CellStyle,
}

/// A hyperlink shared by all cells written while it was active (OSC 8).
///
/// The record lives exactly as long as some cell references it; the
/// id-keyed registry holds weak references only.
#[derive(Debug)]
pub struct HyperlinkInfo {
    pub id: String,
    pub uri: String,
    hover: AtomicBool,
}

impl HyperlinkInfo {
    pub fn new(id: String, uri: String) -> Self {
        Self {
            id,
            uri,
            hover: AtomicBool::new(false),
        }
    }

    pub fn set_hover(&self, hover: bool) {
        self.hover.store(hover, Ordering::Relaxed);
    }

    pub fn is_hovered(&self) -> bool {
        self.hover.load(Ordering::Relaxed)
    }
}

/// A single grid cell: a codepoint cluster, its display width, the pen it
/// was written with and an optional hyperlink.
#[derive(Clone, Debug)]
pub struct Cell {
    codepoints: [char; Cell::MAX_CODEPOINTS],
    codepoint_count: u8,
    width: u8,
    pub attributes: GraphicsAttributes,
    hyperlink: Option<Arc<HyperlinkInfo>>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            codepoints: ['\0'; Cell::MAX_CODEPOINTS],
            codepoint_count: 0,
            width: 1,
            attributes: GraphicsAttributes::default(),
            hyperlink: None,
        }
    }
}

impl Cell {
    /// Base codepoint plus at most eight combining codepoints.
    pub const MAX_CODEPOINTS: usize = 9;

    pub fn new(ch: char, attributes: GraphicsAttributes) -> Self {
        let mut cell = Self {
            attributes,
            ..Self::default()
        };
        cell.set_character(ch);
        cell
    }

    /// An empty cell carrying the given pen (background color erase).
    pub fn blank(attributes: GraphicsAttributes) -> Self {
        Self {
            attributes,
            width: 1,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.codepoint_count == 0
    }

    /// Display width in columns: 1 or 2, or 0 for the continuation cell of
    /// a wide character.
    pub fn width(&self) -> i32 {
        i32::from(self.width)
    }

    pub fn set_width(&mut self, width: u8) {
        self.width = width;
    }

    pub fn codepoint(&self, i: usize) -> Option<char> {
        (i < self.codepoint_count as usize).then(|| self.codepoints[i])
    }

    pub fn codepoints(&self) -> impl Iterator<Item = char> + '_ {
        self.codepoints[..self.codepoint_count as usize]
            .iter()
            .copied()
    }

    pub fn set_character(&mut self, ch: char) {
        self.codepoints[0] = ch;
        self.codepoint_count = 1;
        self.width = ch.width().unwrap_or(1).max(1) as u8;
    }

    /// Attach a combining codepoint to this cell.
    pub fn append_codepoint(&mut self, ch: char) {
        let count = self.codepoint_count as usize;
        if count > 0 && count < Self::MAX_CODEPOINTS {
            self.codepoints[count] = ch;
            self.codepoint_count += 1;
        }
    }

    /// Clear content, keeping nothing but the given pen and hyperlink.
    pub fn reset(&mut self, attributes: GraphicsAttributes, hyperlink: Option<Arc<HyperlinkInfo>>) {
        self.codepoint_count = 0;
        self.width = 1;
        self.attributes = attributes;
        self.hyperlink = hyperlink;
    }

    pub fn hyperlink(&self) -> Option<&Arc<HyperlinkInfo>> {
        self.hyperlink.as_ref()
    }

    pub fn set_hyperlink(&mut self, hyperlink: Option<Arc<HyperlinkInfo>>) {
        self.hyperlink = hyperlink;
    }

    /// The cell's text content, or a space for empty cells.
    pub fn text(&self) -> String {
        if self.is_empty() {
            " ".to_string()
        } else {
            self.codepoints().collect()
        }
    }
}

/// One screen or history line.
#[derive(Clone, Debug, Default)]
pub struct Line {
    cells: Vec<Cell>,
    /// Set by scroll-to-mark (SETMARK).
    pub marked: bool,
    /// Set when the line overflowed into the next one under auto-wrap.
    pub wrapped: bool,
}

impl Line {
    pub fn blank(columns: i32, cell: Cell) -> Self {
        Self {
            cells: vec![cell; columns.max(0) as usize],
            marked: false,
            wrapped: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at 1-based column.
    pub fn cell(&self, column: i32) -> Option<&Cell> {
        if column >= 1 {
            self.cells.get(column as usize - 1)
        } else {
            None
        }
    }

    pub fn cell_mut(&mut self, column: i32) -> Option<&mut Cell> {
        if column >= 1 {
            self.cells.get_mut(column as usize - 1)
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn fill(&mut self, cell: &Cell) {
        self.cells.fill(cell.clone());
    }

    pub fn resize(&mut self, columns: i32, blank: Cell) {
        self.cells.resize(columns.max(0) as usize, blank);
    }

    /// Rendered text of the line; empty cells become spaces.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| cell.width() > 0)
            .map(Cell::text)
            .collect()
    }
}

/// Fixed-capacity ring buffer of history lines.
///
/// All slots are allocated lazily; once full, pushing overwrites the
/// oldest line with plain index arithmetic and no per-push allocation.
#[derive(Debug, Default)]
pub struct Scrollback {
    lines: Vec<Line>,
    start: usize,
    count: usize,
    capacity: usize,
}

impl Scrollback {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Vec::with_capacity(capacity.min(1024)),
            start: 0,
            count: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a line, evicting the oldest one when full. A zero-capacity
    /// scrollback (alternate buffer) drops the line.
    pub fn push(&mut self, line: Line) {
        if self.capacity == 0 {
            return;
        }
        let index = (self.start + self.count) % self.capacity;
        if self.count == self.capacity {
            self.start = (self.start + 1) % self.capacity;
            self.lines[index] = line;
        } else {
            if index >= self.lines.len() {
                self.lines.push(line);
            } else {
                self.lines[index] = line;
            }
            self.count += 1;
        }
    }

    /// Remove and return the newest line (used to rebalance on resize).
    pub fn pop_newest(&mut self) -> Option<Line> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        let index = (self.start + self.count) % self.capacity;
        Some(std::mem::take(&mut self.lines[index]))
    }

    /// Line `n` counted from the newest (0 = newest).
    pub fn from_newest(&self, n: usize) -> Option<&Line> {
        if n >= self.count {
            return None;
        }
        let index = (self.start + self.count - 1 - n) % self.capacity;
        Some(&self.lines[index])
    }

    pub fn from_newest_mut(&mut self, n: usize) -> Option<&mut Line> {
        if n >= self.count {
            return None;
        }
        let index = (self.start + self.count - 1 - n) % self.capacity;
        Some(&mut self.lines[index])
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.count = 0;
    }

    fn resize_lines(&mut self, columns: i32, blank: Cell) {
        for line in &mut self.lines {
            line.resize(columns, blank.clone());
        }
    }
}

/// An inclusive 1-based margin range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarginRange {
    pub from: i32,
    pub to: i32,
}

impl MarginRange {
    pub fn length(self) -> i32 {
        self.to - self.from + 1
    }

    pub fn contains(self, value: i32) -> bool {
        self.from <= value && value <= self.to
    }
}

/// Top/bottom and left/right scroll margins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Margin {
    pub vertical: MarginRange,
    pub horizontal: MarginRange,
}

impl Margin {
    pub fn full(size: ScreenSize) -> Self {
        Self {
            vertical: MarginRange {
                from: 1,
                to: size.rows,
            },
            horizontal: MarginRange {
                from: 1,
                to: size.columns,
            },
        }
    }
}

/// Cursor state. DECSC/DECRC save and restore this struct as a whole.
#[derive(Clone, Debug)]
pub struct Cursor {
    pub position: Coordinate,
    pub auto_wrap: bool,
    pub origin_mode: bool,
    pub visible: bool,
    pub pen: GraphicsAttributes,
    pub charsets: CharsetMapping,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            position: Coordinate::new(1, 1),
            auto_wrap: false,
            origin_mode: false,
            visible: true,
            pen: GraphicsAttributes::default(),
            charsets: CharsetMapping::default(),
        }
    }
}

/// Which of the two screen buffers this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Primary,
    Alternate,
}

/// Grid, scrollback, margins and cursor of one buffer.
#[derive(Debug)]
pub struct ScreenBuffer {
    kind: BufferKind,
    size: ScreenSize,
    pub margin: Margin,
    pub cursor: Cursor,
    lines: VecDeque<Line>,
    scrollback: Scrollback,
    /// Set after writing into the last column with auto-wrap on; the next
    /// printable character wraps first.
    pub wrap_pending: bool,
    tab_width: i32,
    tabs: Vec<i32>,
    pub insert_mode: bool,
    pub lrm_enabled: bool,
    current_hyperlink: Option<Arc<HyperlinkInfo>>,
    hyperlinks: HashMap<String, Weak<HyperlinkInfo>>,
    /// Grid position of the most recently written base cell; combining
    /// marks attach here. Invalidated by scrolling.
    last_written: Option<Coordinate>,
}

impl ScreenBuffer {
    pub fn new(kind: BufferKind, size: ScreenSize, max_history: usize) -> Self {
        let history = match kind {
            BufferKind::Primary => max_history,
            // The alternate buffer never keeps scrollback.
            BufferKind::Alternate => 0,
        };
        let blank = Cell::default();
        Self {
            kind,
            size,
            margin: Margin::full(size),
            cursor: Cursor::default(),
            lines: (0..size.rows.max(0))
                .map(|_| Line::blank(size.columns, blank.clone()))
                .collect(),
            scrollback: Scrollback::new(history),
            wrap_pending: false,
            tab_width: 8,
            tabs: Vec::new(),
            insert_mode: false,
            lrm_enabled: false,
            current_hyperlink: None,
            hyperlinks: HashMap::new(),
            last_written: None,
        }
    }

    pub fn reset(&mut self) {
        let capacity = self.scrollback.capacity();
        *self = Self::new(self.kind, self.size, capacity);
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn history_line_count(&self) -> i32 {
        self.scrollback.len() as i32
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
    }

    /// Visible line by 1-based row; out-of-range rows are clamped.
    pub fn line(&self, row: i32) -> &Line {
        let index = (row - 1).clamp(0, self.size.rows - 1).max(0) as usize;
        &self.lines[index]
    }

    pub fn line_mut(&mut self, row: i32) -> &mut Line {
        let index = (row - 1).clamp(0, self.size.rows - 1).max(0) as usize;
        &mut self.lines[index]
    }

    /// Cell at a unified coordinate: visible rows are `1..=rows`, history
    /// rows are `<= 0` with 0 the newest saved line.
    pub fn cell_at(&self, coord: Coordinate) -> Option<&Cell> {
        if coord.row >= 1 {
            if coord.row > self.size.rows {
                return None;
            }
            self.lines[(coord.row - 1) as usize].cell(coord.column)
        } else {
            self.scrollback
                .from_newest((-coord.row) as usize)
                .and_then(|line| line.cell(coord.column))
        }
    }

    /// Whether a unified row carries the scroll-to-mark marker.
    pub fn row_marked(&self, row: i32) -> bool {
        if row >= 1 {
            row <= self.size.rows && self.lines[(row - 1) as usize].marked
        } else {
            self.scrollback
                .from_newest((-row) as usize)
                .is_some_and(|line| line.marked)
        }
    }

    /// Whether a unified row is soft-wrapped into the following one.
    pub fn row_wrapped(&self, row: i32) -> bool {
        if row >= 1 {
            row <= self.size.rows && self.lines[(row - 1) as usize].wrapped
        } else {
            self.scrollback
                .from_newest((-row) as usize)
                .is_some_and(|line| line.wrapped)
        }
    }

    fn blank_cell(&self) -> Cell {
        Cell::blank(self.cursor.pen)
    }

    // ---- cursor addressing ------------------------------------------------

    pub fn real_cursor_position(&self) -> Coordinate {
        self.cursor.position
    }

    /// Cursor position in logical (origin-mode adjusted) coordinates.
    pub fn cursor_position(&self) -> Coordinate {
        if !self.cursor.origin_mode {
            self.cursor.position
        } else {
            Coordinate::new(
                self.cursor.position.row - self.margin.vertical.from + 1,
                self.cursor.position.column - self.margin.horizontal.from + 1,
            )
        }
    }

    /// Translate logical coordinates to grid coordinates under DECOM.
    pub fn to_real_coordinate(&self, pos: Coordinate) -> Coordinate {
        if !self.cursor.origin_mode {
            pos
        } else {
            Coordinate::new(
                pos.row + self.margin.vertical.from - 1,
                pos.column + self.margin.horizontal.from - 1,
            )
        }
    }

    pub fn clamp_to_screen(&self, coord: Coordinate) -> Coordinate {
        Coordinate::new(
            coord.row.clamp(1, self.size.rows),
            coord.column.clamp(1, self.size.columns),
        )
    }

    /// Clamp to the margins when origin mode is on, the screen otherwise.
    fn clamp_cursor_target(&self, coord: Coordinate) -> Coordinate {
        if self.cursor.origin_mode {
            Coordinate::new(
                coord.row.clamp(self.margin.vertical.from, self.margin.vertical.to),
                coord
                    .column
                    .clamp(self.margin.horizontal.from, self.margin.horizontal.to),
            )
        } else {
            self.clamp_to_screen(coord)
        }
    }

    /// Move the cursor to a logical coordinate, clearing wrap-pending.
    pub fn move_cursor_to(&mut self, to: Coordinate) {
        self.wrap_pending = false;
        let real = self.to_real_coordinate(to);
        self.cursor.position = self.clamp_cursor_target(real);
    }

    /// Set the cursor column by logical column number.
    pub fn set_current_column(&mut self, column: i32) {
        let real = if self.cursor.origin_mode {
            self.margin.horizontal.from + column - 1
        } else {
            column
        };
        self.cursor.position.column = real.clamp(1, self.size.columns);
    }

    /// Move right by up to `n` columns, stopping at the margin. Returns
    /// whether the full distance was covered.
    pub fn increment_cursor_column(&mut self, n: i32) -> bool {
        let available = (self.margin.horizontal.length() - self.cursor.position.column).max(0);
        let step = n.min(available);
        self.cursor.position.column += step;
        self.wrap_pending = false;
        step == n
    }

    pub fn is_cursor_inside_margins(&self) -> bool {
        let inside_vertical = self.margin.vertical.contains(self.cursor.position.row);
        let inside_horizontal =
            !self.lrm_enabled || self.margin.horizontal.contains(self.cursor.position.column);
        inside_vertical && inside_horizontal
    }

    // ---- modes -------------------------------------------------------------

    /// Buffer-local consequences of a mode flip.
    pub fn set_mode(&mut self, mode: Mode, enable: bool) {
        match mode {
            Mode::AutoWrap => self.cursor.auto_wrap = enable,
            Mode::Origin => self.cursor.origin_mode = enable,
            Mode::VisibleCursor => self.cursor.visible = enable,
            Mode::Insert => self.insert_mode = enable,
            Mode::LeftRightMargin => {
                self.lrm_enabled = enable;
                // Resetting DECLRMM also resets the horizontal margins.
                if !enable {
                    self.margin.horizontal = MarginRange {
                        from: 1,
                        to: self.size.columns,
                    };
                }
            }
            _ => {}
        }
    }

    // ---- writing ------------------------------------------------------------

    /// Write one printable codepoint at the cursor, honoring charset
    /// translation, wrap-pending, insert mode and wide characters.
    pub fn write_char(&mut self, ch: char) {
        if self.wrap_pending && self.cursor.auto_wrap {
            let row = self.cursor.position.row;
            self.line_mut(row).wrapped = true;
            let column = self.margin.horizontal.from;
            self.linefeed(column);
        }

        let ch = if (ch as u32) < 0x7F {
            self.cursor.charsets.map(ch)
        } else if ch == '\u{7F}' {
            ' '
        } else {
            ch
        };

        let width = ch.width().unwrap_or(1) as i32;
        if width == 0 {
            // Combining mark: attach to the previously written cell.
            if let Some(pos) = self.last_written {
                if pos.row >= 1 {
                    if let Some(cell) = self.line_mut(pos.row).cell_mut(pos.column) {
                        cell.append_codepoint(ch);
                    }
                }
            }
            return;
        }

        // A wide character that cannot fit before the right edge leaves the
        // remaining cells blank and wraps as a unit.
        if width > self.right_edge() - self.cursor.position.column + 1 {
            if !self.cursor.auto_wrap {
                return;
            }
            let pen = self.cursor.pen;
            let pos = self.cursor.position;
            if let Some(cell) = self.line_mut(pos.row).cell_mut(pos.column) {
                *cell = Cell::blank(pen);
            }
            self.line_mut(pos.row).wrapped = true;
            let column = self.margin.horizontal.from;
            self.linefeed(column);
        }

        if self.insert_mode {
            let row = self.cursor.position.row;
            self.insert_chars(row, width);
        }

        let pen = self.cursor.pen;
        let link = self.current_hyperlink.clone();
        let pos = self.cursor.position;
        let right = self.right_edge();

        if let Some(cell) = self.line_mut(pos.row).cell_mut(pos.column) {
            cell.set_character(ch);
            cell.set_width(width.clamp(0, 2) as u8);
            cell.attributes = pen;
            cell.set_hyperlink(link.clone());
        }
        for offset in 1..width {
            if let Some(cont) = self.line_mut(pos.row).cell_mut(pos.column + offset) {
                cont.reset(pen, link.clone());
                cont.set_width(0);
            }
        }
        self.last_written = Some(pos);

        let next = pos.column + width;
        if next > right {
            self.cursor.position.column = right;
            if self.cursor.auto_wrap {
                self.wrap_pending = true;
            }
        } else {
            self.cursor.position.column = next;
        }
    }

    /// Rightmost writable column for the cursor: the right margin when
    /// DECLRMM is on and the cursor is inside the margins, else the last
    /// screen column.
    fn right_edge(&self) -> i32 {
        if self.lrm_enabled && self.is_cursor_inside_margins() {
            self.margin.horizontal.to
        } else {
            self.size.columns
        }
    }

    /// Line feed, also moving the cursor to the given grid column.
    pub fn linefeed(&mut self, column: i32) {
        self.wrap_pending = false;
        let row = self.cursor.position.row;
        if row == self.margin.vertical.to || row == self.size.rows {
            self.scroll_up(1);
        } else {
            self.cursor.position.row += 1;
        }
        self.cursor.position.column = column.clamp(1, self.size.columns);
    }

    /// Set or reuse the active hyperlink. An empty uri closes it.
    pub fn set_hyperlink(&mut self, id: &str, uri: &str) {
        if uri.is_empty() {
            self.current_hyperlink = None;
        } else if id.is_empty() {
            self.current_hyperlink = Some(Arc::new(HyperlinkInfo::new(String::new(), uri.into())));
        } else if let Some(existing) = self.hyperlinks.get(id).and_then(Weak::upgrade) {
            self.current_hyperlink = Some(existing);
        } else {
            let link = Arc::new(HyperlinkInfo::new(id.into(), uri.into()));
            self.hyperlinks.insert(id.into(), Arc::downgrade(&link));
            self.current_hyperlink = Some(link);
        }
    }

    pub fn current_hyperlink(&self) -> Option<&Arc<HyperlinkInfo>> {
        self.current_hyperlink.as_ref()
    }

    // ---- scrolling ----------------------------------------------------------

    pub fn scroll_up(&mut self, n: i32) {
        let margin = self.margin;
        self.scroll_up_in_margin(n, margin);
    }

    /// Scroll up inside a margin rectangle. With full-width margins at
    /// full height, evicted lines go to the scrollback (primary only).
    pub fn scroll_up_in_margin(&mut self, n: i32, margin: Margin) {
        self.last_written = None;
        let full_width = margin.horizontal == Margin::full(self.size).horizontal;

        if !full_width {
            // Only the sub-rectangle scrolls; cells outside are untouched.
            let height = margin.vertical.length();
            let n = n.clamp(0, height);
            let left = (margin.horizontal.from - 1) as usize;
            let right = margin.horizontal.to as usize;
            if n < height {
                for row in margin.vertical.from..=(margin.vertical.to - n) {
                    let source = self.lines[(row + n - 1) as usize].cells()[left..right].to_vec();
                    self.lines[(row - 1) as usize].cells_mut()[left..right]
                        .clone_from_slice(&source);
                }
            }
            let blank = self.blank_cell();
            for row in (margin.vertical.to - n + 1).max(margin.vertical.from)..=margin.vertical.to {
                self.lines[(row - 1) as usize].cells_mut()[left..right].fill(blank.clone());
            }
        } else if margin.vertical == Margin::full(self.size).vertical {
            // Full-screen scroll: evicted lines enter the history.
            let n = n.clamp(0, self.size.rows);
            for _ in 0..n {
                if let Some(line) = self.lines.pop_front() {
                    self.scrollback.push(line);
                }
                self.lines
                    .push_back(Line::blank(self.size.columns, self.blank_cell()));
            }
        } else {
            // Vertical margin with full horizontal extent: rotate in place.
            let height = margin.vertical.length();
            let n = n.clamp(0, height);
            let from = (margin.vertical.from - 1) as usize;
            let to = margin.vertical.to as usize;
            if n < height {
                self.lines.make_contiguous()[from..to].rotate_left(n as usize);
            }
            let blank = self.blank_cell();
            for row in (margin.vertical.to - n + 1).max(margin.vertical.from)..=margin.vertical.to {
                self.lines[(row - 1) as usize].fill(&blank);
                self.lines[(row - 1) as usize].marked = false;
                self.lines[(row - 1) as usize].wrapped = false;
            }
        }
    }

    pub fn scroll_down(&mut self, n: i32) {
        let margin = self.margin;
        self.scroll_down_in_margin(n, margin);
    }

    pub fn scroll_down_in_margin(&mut self, n: i32, margin: Margin) {
        self.last_written = None;
        let height = margin.vertical.length();
        let n = n.clamp(0, height);
        let full_width = margin.horizontal == Margin::full(self.size).horizontal;

        if !full_width {
            let left = (margin.horizontal.from - 1) as usize;
            let right = margin.horizontal.to as usize;
            if n < height {
                for row in (margin.vertical.from..=(margin.vertical.to - n)).rev() {
                    let source = self.lines[(row - 1) as usize].cells()[left..right].to_vec();
                    self.lines[(row + n - 1) as usize].cells_mut()[left..right]
                        .clone_from_slice(&source);
                }
            }
            let blank = self.blank_cell();
            let clear_to = (margin.vertical.from + n - 1).min(margin.vertical.to);
            for row in margin.vertical.from..=clear_to {
                self.lines[(row - 1) as usize].cells_mut()[left..right].fill(blank.clone());
            }
        } else {
            let from = (margin.vertical.from - 1) as usize;
            let to = margin.vertical.to as usize;
            if n < height {
                self.lines.make_contiguous()[from..to].rotate_right(n as usize);
            }
            let blank = self.blank_cell();
            let clear_to = (margin.vertical.from + n - 1).min(margin.vertical.to);
            for row in margin.vertical.from..=clear_to {
                self.lines[(row - 1) as usize].fill(&blank);
                self.lines[(row - 1) as usize].marked = false;
                self.lines[(row - 1) as usize].wrapped = false;
            }
        }
    }

    // ---- insert / delete -----------------------------------------------------

    /// DCH at the given line: shift the tail left, blank-fill at the right
    /// margin.
    pub fn delete_chars(&mut self, line_no: i32, n: i32) {
        let from = (self.cursor.position.column - 1).max(0) as usize;
        let to = self.margin.horizontal.to as usize;
        if from >= to {
            return;
        }
        let n = (n.max(0) as usize).min(to - from);
        let blank = self.blank_cell();
        let line = self.line_mut(line_no);
        line.cells_mut()[from..to].rotate_left(n);
        line.cells_mut()[to - n..to].fill(blank);
    }

    /// ICH at the given line: shift the tail right, blank-fill at the
    /// cursor.
    pub fn insert_chars(&mut self, line_no: i32, n: i32) {
        let from = (self.cursor.position.column - 1).max(0) as usize;
        let to = self.margin.horizontal.to as usize;
        if from >= to {
            return;
        }
        let n = (n.max(0) as usize).min(to - from);
        let blank = self.blank_cell();
        let line = self.line_mut(line_no);
        line.cells_mut()[from..to].rotate_right(n);
        line.cells_mut()[from..from + n].fill(blank);
    }

    /// DECIC: insert blank columns at the cursor, within margins.
    pub fn insert_columns(&mut self, n: i32) {
        for line_no in self.margin.vertical.from..=self.margin.vertical.to {
            self.insert_chars(line_no, n);
        }
    }

    /// DECDC: delete columns at the cursor, within margins.
    pub fn delete_columns(&mut self, n: i32) {
        for line_no in self.margin.vertical.from..=self.margin.vertical.to {
            self.delete_chars(line_no, n);
        }
    }

    // ---- erase ---------------------------------------------------------------

    pub fn erase_characters(&mut self, n: i32) {
        let n = (self.size.columns - self.cursor.position.column + 1).min(n.max(1));
        let blank = self.blank_cell();
        let from = (self.cursor.position.column - 1) as usize;
        let row = self.cursor.position.row;
        let line = self.line_mut(row);
        let to = (from + n as usize).min(line.len());
        line.cells_mut()[from..to].fill(blank);
    }

    pub fn clear_to_end_of_line(&mut self) {
        let blank = self.blank_cell();
        let from = (self.cursor.position.column - 1).max(0) as usize;
        let row = self.cursor.position.row;
        let line = self.line_mut(row);
        let len = line.len();
        line.cells_mut()[from.min(len)..].fill(blank);
    }

    pub fn clear_to_begin_of_line(&mut self) {
        let blank = self.blank_cell();
        let to = self.cursor.position.column.max(1) as usize;
        let row = self.cursor.position.row;
        let line = self.line_mut(row);
        let to = to.min(line.len());
        line.cells_mut()[..to].fill(blank);
    }

    pub fn clear_line(&mut self) {
        let blank = self.blank_cell();
        let row = self.cursor.position.row;
        self.line_mut(row).fill(&blank);
    }

    pub fn clear_to_end_of_screen(&mut self) {
        self.clear_to_end_of_line();
        let blank = self.blank_cell();
        for row in (self.cursor.position.row + 1)..=self.size.rows {
            self.line_mut(row).fill(&blank);
        }
    }

    pub fn clear_to_begin_of_screen(&mut self) {
        self.clear_to_begin_of_line();
        let blank = self.blank_cell();
        for row in 1..self.cursor.position.row {
            self.line_mut(row).fill(&blank);
        }
    }

    /// ED 2: erase all visible cells in place. Cursor and scrollback stay
    /// untouched.
    pub fn clear_screen(&mut self) {
        let blank = self.blank_cell();
        for line in &mut self.lines {
            line.fill(&blank);
            line.marked = false;
            line.wrapped = false;
        }
        self.last_written = None;
    }

    /// DECALN fill.
    pub fn fill_screen(&mut self, ch: char) {
        let cell = Cell::new(ch, self.cursor.pen);
        for line in &mut self.lines {
            line.fill(&cell);
        }
    }

    // ---- tab stops ------------------------------------------------------------

    pub fn tab_width(&self) -> i32 {
        self.tab_width
    }

    pub fn tabs(&self) -> &[i32] {
        &self.tabs
    }

    pub fn clear_all_tabs(&mut self) {
        self.tabs.clear();
        self.tab_width = 0;
    }

    pub fn clear_tab_under_cursor(&mut self) {
        // Materialize the default stops before removing one of them.
        if self.tabs.is_empty() && self.tab_width != 0 {
            let mut column = self.tab_width;
            while column <= self.size.columns {
                self.tabs.push(column);
                column += self.tab_width;
            }
        }
        let column = self.cursor.position.column;
        self.tabs.retain(|&tab| tab != column);
    }

    pub fn set_tab_under_cursor(&mut self) {
        let column = self.cursor.position.column;
        if !self.tabs.contains(&column) {
            self.tabs.push(column);
            self.tabs.sort_unstable();
        }
    }

    // ---- markers ----------------------------------------------------------------

    pub fn mark_current_line(&mut self) {
        let row = self.cursor.position.row;
        self.line_mut(row).marked = true;
    }

    /// Nearest marked row strictly above `current` in unified coordinates.
    pub fn find_marker_backward(&self, current: i32) -> Option<i32> {
        let history = self.history_line_count();
        if current > self.size.rows || (current < 0 && -current >= history) {
            return None;
        }

        for row in (1..current).rev() {
            if self.lines[(row - 1) as usize].marked {
                return Some(row);
            }
        }

        let scroll_offset = if current <= 0 { -current + 1 } else { 0 };
        for i in scroll_offset..history {
            if self
                .scrollback
                .from_newest(i as usize)
                .is_some_and(|line| line.marked)
            {
                return Some(-i);
            }
        }

        None
    }

    /// Nearest marked row strictly below `current` in unified coordinates.
    pub fn find_marker_forward(&self, current: i32) -> Option<i32> {
        for i in (current + 1)..=0 {
            if self
                .scrollback
                .from_newest((-i) as usize)
                .is_some_and(|line| line.marked)
            {
                return Some(i);
            }
        }

        for row in (current + 1).max(1)..=self.size.rows {
            if self.lines[(row - 1) as usize].marked {
                return Some(row);
            }
        }

        None
    }

    // ---- resize -----------------------------------------------------------------

    /// Deterministic truncate/pad resize. Shrinking the height with the
    /// cursor on the last row splices top lines into the scrollback;
    /// growing pulls lines back out of it.
    pub fn resize(&mut self, new_size: ScreenSize) {
        let blank = Cell::default();

        if new_size.rows > self.size.rows {
            let extend = new_size.rows - self.size.rows;
            let take_back = (extend as usize).min(self.scrollback.len());
            for _ in 0..take_back {
                if let Some(mut line) = self.scrollback.pop_newest() {
                    line.resize(new_size.columns, blank.clone());
                    self.lines.push_front(line);
                }
            }
            self.cursor.position.row += take_back as i32;
            for _ in 0..(extend as usize - take_back) {
                self.lines
                    .push_back(Line::blank(new_size.columns, blank.clone()));
            }
        } else if new_size.rows < self.size.rows {
            if self.cursor.position.row == self.size.rows {
                for _ in 0..(self.size.rows - new_size.rows) {
                    if let Some(line) = self.lines.pop_front() {
                        self.scrollback.push(line);
                    }
                }
            } else {
                self.lines.truncate(new_size.rows.max(0) as usize);
            }
        }

        if new_size.columns != self.size.columns {
            for line in &mut self.lines {
                line.resize(new_size.columns, blank.clone());
            }
            self.scrollback.resize_lines(new_size.columns, blank);
            if new_size.columns > self.size.columns {
                if self.wrap_pending {
                    self.cursor.position.column += 1;
                }
                self.wrap_pending = false;
            } else {
                if self.cursor.position.column >= new_size.columns {
                    self.wrap_pending = self.cursor.auto_wrap;
                }
                self.tabs.retain(|&tab| tab <= new_size.columns);
            }
        }

        self.size = new_size;
        self.margin = Margin::full(new_size);
        self.cursor.position = self.clamp_to_screen(self.cursor.position);
        self.last_written = None;

        debug_assert!(self.lines.len() == new_size.rows.max(0) as usize);
    }

    // ---- rendering ---------------------------------------------------------------

    /// Text of a unified row (history rows allowed); empty cells render as
    /// spaces.
    pub fn render_text_line(&self, row: i32) -> String {
        if row >= 1 {
            if row > self.size.rows {
                return String::new();
            }
            return self.lines[(row - 1) as usize].text();
        }
        self.scrollback
            .from_newest((-row) as usize)
            .map(Line::text)
            .unwrap_or_default()
    }

    /// Full visible screen as text, lines terminated by `\n`.
    pub fn render_text(&self) -> String {
        let mut text = String::with_capacity((self.size.rows * (self.size.columns + 1)) as usize);
        for row in 1..=self.size.rows {
            text.push_str(&self.render_text_line(row));
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(columns: i32, rows: i32) -> ScreenBuffer {
        ScreenBuffer::new(BufferKind::Primary, ScreenSize::new(columns, rows), 100)
    }

    fn write_str(buf: &mut ScreenBuffer, text: &str) {
        for ch in text.chars() {
            buf.write_char(ch);
        }
    }

    #[test]
    fn write_and_render() {
        let mut buf = buffer(5, 2);
        write_str(&mut buf, "AB");
        assert_eq!(buf.render_text_line(1), "AB   ");
        assert_eq!(buf.cursor.position, Coordinate::new(1, 3));
    }

    #[test]
    fn wrap_pending_holds_cursor_on_last_column() {
        let mut buf = buffer(3, 2);
        buf.cursor.auto_wrap = true;
        write_str(&mut buf, "ABC");
        assert_eq!(buf.cursor.position, Coordinate::new(1, 3));
        assert!(buf.wrap_pending);
        write_str(&mut buf, "D");
        assert_eq!(buf.render_text_line(1), "ABC");
        assert_eq!(buf.render_text_line(2), "D  ");
        assert_eq!(buf.cursor.position, Coordinate::new(2, 2));
        assert!(buf.line(1).wrapped);
    }

    #[test]
    fn no_autowrap_overwrites_last_column() {
        let mut buf = buffer(3, 1);
        buf.cursor.auto_wrap = false;
        write_str(&mut buf, "ABCD");
        assert_eq!(buf.render_text_line(1), "ABD");
    }

    #[test]
    fn wide_char_occupies_two_cells() {
        let mut buf = buffer(4, 1);
        buf.write_char('世');
        assert_eq!(buf.cursor.position.column, 3);
        assert_eq!(buf.line(1).cell(1).unwrap().width(), 2);
        assert_eq!(buf.line(1).cell(2).unwrap().width(), 0);
    }

    #[test]
    fn combining_mark_attaches_to_previous_cell() {
        let mut buf = buffer(4, 1);
        buf.write_char('e');
        buf.write_char('\u{0301}');
        let cell = buf.line(1).cell(1).unwrap();
        assert_eq!(cell.codepoints().collect::<String>(), "e\u{0301}");
        assert_eq!(buf.cursor.position.column, 2);
    }

    #[test]
    fn scroll_up_pushes_into_scrollback() {
        let mut buf = buffer(3, 2);
        write_str(&mut buf, "AAA");
        buf.move_cursor_to(Coordinate::new(2, 1));
        write_str(&mut buf, "BBB");
        buf.scroll_up(1);
        assert_eq!(buf.history_line_count(), 1);
        assert_eq!(buf.render_text_line(0), "AAA");
        assert_eq!(buf.render_text_line(1), "BBB");
        assert_eq!(buf.render_text_line(2), "   ");
    }

    #[test]
    fn alternate_buffer_has_no_scrollback() {
        let mut buf = ScreenBuffer::new(BufferKind::Alternate, ScreenSize::new(3, 2), 100);
        write_str(&mut buf, "AAA");
        buf.scroll_up(1);
        assert_eq!(buf.history_line_count(), 0);
    }

    #[test]
    fn scroll_inside_vertical_margin() {
        let mut buf = buffer(2, 4);
        for (row, text) in ["11", "22", "33", "44"].iter().enumerate() {
            buf.move_cursor_to(Coordinate::new(row as i32 + 1, 1));
            write_str(&mut buf, text);
        }
        buf.margin.vertical = MarginRange { from: 2, to: 3 };
        buf.scroll_up(1);
        assert_eq!(buf.render_text(), "11\n33\n  \n44\n");
        // nothing entered the scrollback
        assert_eq!(buf.history_line_count(), 0);
    }

    #[test]
    fn scroll_inside_horizontal_margin_leaves_outside_cells() {
        let mut buf = buffer(4, 3);
        for (row, text) in ["abcd", "efgh", "ijkl"].iter().enumerate() {
            buf.move_cursor_to(Coordinate::new(row as i32 + 1, 1));
            write_str(&mut buf, text);
        }
        buf.margin = Margin {
            vertical: MarginRange { from: 1, to: 3 },
            horizontal: MarginRange { from: 2, to: 3 },
        };
        buf.scroll_up_in_margin(1, buf.margin);
        assert_eq!(buf.render_text(), "afgd\nejkh\ni  l\n");
    }

    #[test]
    fn delete_chars_shifts_left() {
        let mut buf = buffer(5, 1);
        write_str(&mut buf, "ABCDE");
        buf.move_cursor_to(Coordinate::new(1, 2));
        buf.delete_chars(1, 2);
        assert_eq!(buf.render_text_line(1), "ADE  ");
    }

    #[test]
    fn insert_chars_shifts_right() {
        let mut buf = buffer(5, 1);
        write_str(&mut buf, "ABCDE");
        buf.move_cursor_to(Coordinate::new(1, 2));
        buf.insert_chars(1, 2);
        assert_eq!(buf.render_text_line(1), "A  BC");
    }

    #[test]
    fn erase_characters_is_clamped() {
        let mut buf = buffer(5, 1);
        write_str(&mut buf, "ABCDE");
        buf.move_cursor_to(Coordinate::new(1, 4));
        buf.erase_characters(9);
        assert_eq!(buf.render_text_line(1), "ABC  ");
        assert_eq!(buf.cursor.position.column, 4);
    }

    #[test]
    fn tab_stops_default_and_custom() {
        let mut buf = buffer(20, 1);
        assert_eq!(buf.tab_width(), 8);
        buf.move_cursor_to(Coordinate::new(1, 5));
        buf.set_tab_under_cursor();
        assert_eq!(buf.tabs(), &[5]);
        buf.clear_tab_under_cursor();
        assert_eq!(buf.tabs(), &[] as &[i32]);
        buf.clear_all_tabs();
        assert_eq!(buf.tab_width(), 0);
    }

    #[test]
    fn markers_found_in_both_areas() {
        let mut buf = buffer(2, 2);
        buf.mark_current_line();
        buf.scroll_up(1); // marked line now in history (row 0)
        assert_eq!(buf.find_marker_backward(1), Some(0));
        buf.move_cursor_to(Coordinate::new(2, 1));
        buf.mark_current_line();
        assert_eq!(buf.find_marker_forward(0), Some(2));
    }

    #[test]
    fn resize_grow_pulls_lines_from_history() {
        let mut buf = buffer(3, 2);
        write_str(&mut buf, "AAA");
        buf.move_cursor_to(Coordinate::new(2, 1));
        write_str(&mut buf, "BBB");
        buf.scroll_up(1);
        assert_eq!(buf.history_line_count(), 1);

        buf.resize(ScreenSize::new(3, 3));
        assert_eq!(buf.history_line_count(), 0);
        assert_eq!(buf.render_text(), "AAA\nBBB\n   \n");
    }

    #[test]
    fn resize_shrink_truncates_or_scrolls() {
        let mut buf = buffer(3, 3);
        write_str(&mut buf, "AAA");
        buf.move_cursor_to(Coordinate::new(1, 1));
        buf.resize(ScreenSize::new(3, 2));
        // cursor was not on the last row: bottom lines are cut
        assert_eq!(buf.render_text(), "AAA\n   \n");
        assert_eq!(buf.history_line_count(), 0);
    }

    #[test]
    fn resize_width_is_deterministic_truncate_pad() {
        let mut buf = buffer(4, 1);
        write_str(&mut buf, "ABCD");
        buf.resize(ScreenSize::new(2, 1));
        assert_eq!(buf.render_text_line(1), "AB");
        buf.resize(ScreenSize::new(5, 1));
        assert_eq!(buf.render_text_line(1), "AB   ");
    }

    #[test]
    fn hyperlink_reused_by_id_and_dropped_with_cells() {
        let mut buf = buffer(4, 1);
        buf.set_hyperlink("x", "https://example.com");
        buf.write_char('H');
        buf.set_hyperlink("x", "https://example.com");
        buf.write_char('i');
        let a = buf.line(1).cell(1).unwrap().hyperlink().cloned().unwrap();
        let b = buf.line(1).cell(2).unwrap().hyperlink().cloned().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.uri, "https://example.com");
        assert_eq!(a.id, "x");

        buf.set_hyperlink("", "");
        buf.write_char('!');
        assert!(buf.line(1).cell(3).unwrap().hyperlink().is_none());
    }

    #[test]
    fn scrollback_ring_evicts_fifo() {
        let mut ring = Scrollback::new(2);
        for text in ["1", "2", "3"] {
            let mut line = Line::blank(1, Cell::default());
            if let Some(cell) = line.cell_mut(1) {
                cell.set_character(text.chars().next().unwrap());
            }
            ring.push(line);
        }
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.from_newest(0).unwrap().text(), "3");
        assert_eq!(ring.from_newest(1).unwrap().text(), "2");
        assert!(ring.from_newest(2).is_none());
    }
}
