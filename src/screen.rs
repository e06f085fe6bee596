//! The terminal screen: buffers, modes, executors and replies.
//!
//! [`Screen`] owns the parser, the command builder, a primary and an
//! alternate [`ScreenBuffer`], the viewport scroll offset and the active
//! selection. Bytes go in through [`Screen::write_bytes`]; every resulting
//! command is applied through the executor: directly, or queued while
//! synchronized output (mode 2026) is active.

use crate::builder::CommandBuilder;
use crate::color::Color;
use crate::commands::{
    Command, Coordinate, CursorDisplay, CursorShape, GraphicsRendition, Mode, StatusTarget, VTType,
};
use crate::config::ScreenConfig;
use crate::events::ScreenEvents;
use crate::input::MouseWheelMode;
use crate::output::OutputGenerator;
use crate::parser::Parser;
use crate::screen_buffer::{
    BufferKind, Cell, CellStyle, Cursor, Margin, MarginRange, ScreenBuffer, ScreenSize,
};
use crate::selection::{SelectionMode, SelectionRange, Selector};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Synchronized output flushes after this much wall-clock time even if no
/// end-sync arrived, bounding output latency.
const SYNC_FLUSH_BUDGET: Duration = Duration::from_millis(200);

/// Tracked ANSI/DEC mode switches.
#[derive(Debug, Default)]
pub struct Modes {
    enabled: HashSet<Mode>,
}

impl Modes {
    pub fn set(&mut self, mode: Mode, enabled: bool) {
        if enabled {
            self.enabled.insert(mode);
        } else {
            self.enabled.remove(&mode);
        }
    }

    pub fn enabled(&self, mode: Mode) -> bool {
        self.enabled.contains(&mode)
    }
}

/// A VT-compatible terminal screen.
pub struct Screen<E: ScreenEvents> {
    events: E,
    parser: Parser,
    builder: CommandBuilder,
    modes: Modes,
    primary: ScreenBuffer,
    alternate: ScreenBuffer,
    active: BufferKind,
    size: ScreenSize,
    terminal_id: VTType,
    window_title: String,
    saved_window_titles: Vec<String>,
    saved_cursors: Vec<Cursor>,
    cursor_style: (CursorDisplay, CursorShape),
    /// Viewport offset into the scrollback; 0 shows the live screen.
    scroll_offset: i32,
    auto_scroll_on_update: bool,
    word_delimiters: String,
    selector: Option<Selector>,
    /// Drawing commands held back while mode 2026 is active.
    queued_commands: Vec<Command>,
    sync_started: Option<Instant>,
    closed: bool,
}

impl<E: ScreenEvents> Screen<E> {
    pub fn new(size: ScreenSize, max_history: usize, events: E) -> Self {
        let mut screen = Self {
            events,
            parser: Parser::new(),
            builder: CommandBuilder::new(),
            modes: Modes::default(),
            primary: ScreenBuffer::new(BufferKind::Primary, size, max_history),
            alternate: ScreenBuffer::new(BufferKind::Alternate, size, 0),
            active: BufferKind::Primary,
            size,
            terminal_id: VTType::VT420,
            window_title: String::new(),
            saved_window_titles: Vec::new(),
            saved_cursors: Vec::new(),
            cursor_style: (CursorDisplay::Blink, CursorShape::Block),
            scroll_offset: 0,
            auto_scroll_on_update: false,
            word_delimiters: crate::selection::DEFAULT_WORD_DELIMITERS.to_string(),
            selector: None,
            queued_commands: Vec::new(),
            sync_started: None,
            closed: false,
        };
        screen.set_mode(Mode::AutoWrap, true);
        screen
    }

    pub fn with_config(config: &ScreenConfig, events: E) -> Self {
        let size = ScreenSize::new(config.columns, config.rows);
        let mut screen = Self::new(size, config.max_history_line_count, events);
        screen.terminal_id = config.terminal_id;
        screen.word_delimiters = config.word_delimiters.clone();
        screen.auto_scroll_on_update = config.auto_scroll_on_update;
        screen
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    pub fn set_terminal_id(&mut self, id: VTType) {
        self.terminal_id = id;
    }

    pub fn buffer(&self) -> &ScreenBuffer {
        match self.active {
            BufferKind::Primary => &self.primary,
            BufferKind::Alternate => &self.alternate,
        }
    }

    fn buffer_mut(&mut self) -> &mut ScreenBuffer {
        match self.active {
            BufferKind::Primary => &mut self.primary,
            BufferKind::Alternate => &mut self.alternate,
        }
    }

    pub fn is_primary_screen(&self) -> bool {
        self.active == BufferKind::Primary
    }

    pub fn is_alternate_screen(&self) -> bool {
        self.active == BufferKind::Alternate
    }

    pub fn is_mode_enabled(&self, mode: Mode) -> bool {
        self.modes.enabled(mode)
    }

    pub fn window_title(&self) -> &str {
        &self.window_title
    }

    pub fn cursor_position(&self) -> Coordinate {
        self.buffer().cursor_position()
    }

    pub fn real_cursor_position(&self) -> Coordinate {
        self.buffer().real_cursor_position()
    }

    pub fn history_line_count(&self) -> i32 {
        self.buffer().history_line_count()
    }

    // ---- input ----------------------------------------------------------

    /// Consume a chunk of PTY bytes: parse, build commands, apply.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        self.parser.parse(data, &mut self.builder);
        let commands = self.builder.take_commands();
        for command in commands {
            self.dispatch(command);
        }
    }

    pub fn write_str(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Apply a single command through the active executor.
    pub fn write_command(&mut self, command: Command) {
        self.dispatch(command);
    }

    /// Signal that the byte source is gone; further input is dropped.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.events.on_closed();
        }
    }

    fn dispatch(&mut self, command: Command) {
        if self.modes.enabled(Mode::BatchedRendering) {
            if self
                .sync_started
                .is_some_and(|started| started.elapsed() >= SYNC_FLUSH_BUDGET)
            {
                // Budget exhausted: flush what we have to bound latency,
                // then keep batching.
                self.flush_queued();
            }
            if command.affects_drawing() {
                if self.sync_started.is_none() {
                    self.sync_started = Some(Instant::now());
                }
                self.queued_commands.push(command);
                return;
            }
        }
        self.apply(command);
    }

    fn flush_queued(&mut self) {
        let queued = std::mem::take(&mut self.queued_commands);
        self.sync_started = None;
        for command in queued {
            self.apply(command);
        }
    }

    /// Pending synchronized-output commands (empty unless mode 2026 is on).
    pub fn queued_command_count(&self) -> usize {
        self.queued_commands.len()
    }

    fn reply(&mut self, text: String) {
        self.events.reply(text.as_bytes());
    }

    // ---- command application -------------------------------------------

    fn apply(&mut self, command: Command) {
        if self.auto_scroll_on_update && command.affects_drawing() {
            self.scroll_offset = 0;
        }

        match command {
            Command::AppendChar(ch) => self.buffer_mut().write_char(ch),
            Command::ApplicationKeypadMode(enable) => {
                self.events.set_application_keypad_mode(enable);
            }
            Command::BackIndex => {
                let pos = self.buffer().real_cursor_position();
                if pos.column != self.buffer().margin.horizontal.from {
                    let to = self.buffer().cursor_position();
                    self.buffer_mut()
                        .move_cursor_to(Coordinate::new(to.row, to.column - 1));
                }
            }
            Command::Backspace => {
                let pos = self.buffer().cursor_position();
                self.buffer_mut()
                    .move_cursor_to(Coordinate::new(pos.row, (pos.column - 1).max(1)));
            }
            Command::Bell => self.events.bell(),
            Command::ChangeIconTitle(_) => {}
            Command::ChangeWindowTitle(title) => {
                self.window_title = title.clone();
                self.events.set_window_title(&title);
            }
            Command::ClearLine => self.buffer_mut().clear_line(),
            Command::ClearScreen => self.buffer_mut().clear_screen(),
            Command::ClearScrollbackBuffer => {
                self.selector = None;
                self.scroll_offset = 0;
                self.buffer_mut().clear_scrollback();
            }
            Command::ClearToBeginOfLine => self.buffer_mut().clear_to_begin_of_line(),
            Command::ClearToBeginOfScreen => self.buffer_mut().clear_to_begin_of_screen(),
            Command::ClearToEndOfLine => self.buffer_mut().clear_to_end_of_line(),
            Command::ClearToEndOfScreen => self.buffer_mut().clear_to_end_of_screen(),
            Command::CopyToClipboard(data) => self.events.copy_to_clipboard(&data),
            Command::CursorBackwardTab(n) => self.cursor_backward_tab(n),
            Command::CursorNextLine(n) => {
                let row = self.buffer().cursor_position().row;
                self.buffer_mut()
                    .move_cursor_to(Coordinate::new(row + n.max(1), 1));
            }
            Command::CursorPreviousLine(n) => {
                let row = self.buffer().cursor_position().row;
                let n = n.max(1).min(row - 1).max(0);
                self.buffer_mut().move_cursor_to(Coordinate::new(row - n, 1));
            }
            Command::DeleteCharacters(n) => {
                if self.buffer().is_cursor_inside_margins() && n != 0 {
                    let row = self.buffer().real_cursor_position().row;
                    self.buffer_mut().delete_chars(row, n);
                }
            }
            Command::DeleteColumns(n) => {
                if self.buffer().is_cursor_inside_margins() {
                    self.buffer_mut().delete_columns(n);
                }
            }
            Command::DeleteLines(n) => {
                if self.buffer().is_cursor_inside_margins() {
                    let margin = Margin {
                        vertical: MarginRange {
                            from: self.buffer().real_cursor_position().row,
                            to: self.buffer().margin.vertical.to,
                        },
                        horizontal: self.buffer().margin.horizontal,
                    };
                    self.buffer_mut().scroll_up_in_margin(n, margin);
                }
            }
            Command::DesignateCharset { table, charset } => {
                self.buffer_mut().cursor.charsets.select(table, charset);
            }
            Command::DeviceStatusReport => self.reply("\x1b[0n".to_string()),
            Command::EraseCharacters(n) => self.buffer_mut().erase_characters(n),
            Command::ForwardIndex => {
                let pos = self.buffer().real_cursor_position();
                if pos.column != self.buffer().margin.horizontal.to {
                    let to = self.buffer().cursor_position();
                    self.buffer_mut()
                        .move_cursor_to(Coordinate::new(to.row, to.column + 1));
                }
            }
            Command::FullReset => self.reset_hard(),
            Command::HorizontalPositionAbsolute(n) => self.apply(Command::MoveCursorToColumn(n)),
            Command::HorizontalPositionRelative(n) => self.apply(Command::MoveCursorForward(n)),
            Command::HorizontalTabClear(which) => match which {
                crate::commands::TabClear::AllTabs => self.buffer_mut().clear_all_tabs(),
                crate::commands::TabClear::UnderCursor => self.buffer_mut().clear_tab_under_cursor(),
            },
            Command::HorizontalTabSet => self.buffer_mut().set_tab_under_cursor(),
            Command::Hyperlink { id, uri } => self.buffer_mut().set_hyperlink(&id, &uri),
            Command::Index => {
                if self.buffer().real_cursor_position().row == self.buffer().margin.vertical.to {
                    self.buffer_mut().scroll_up(1);
                } else {
                    let pos = self.buffer().cursor_position();
                    self.buffer_mut()
                        .move_cursor_to(Coordinate::new(pos.row + 1, pos.column));
                }
            }
            Command::InsertCharacters(n) => {
                if self.buffer().is_cursor_inside_margins() {
                    let row = self.buffer().real_cursor_position().row;
                    self.buffer_mut().insert_chars(row, n);
                }
            }
            Command::InsertColumns(n) => {
                if self.buffer().is_cursor_inside_margins() {
                    self.buffer_mut().insert_columns(n);
                }
            }
            Command::InsertLines(n) => {
                if self.buffer().is_cursor_inside_margins() {
                    let margin = Margin {
                        vertical: MarginRange {
                            from: self.buffer().real_cursor_position().row,
                            to: self.buffer().margin.vertical.to,
                        },
                        horizontal: self.buffer().margin.horizontal,
                    };
                    self.buffer_mut().scroll_down_in_margin(n, margin);
                }
            }
            Command::Linefeed => {
                let column = if self.modes.enabled(Mode::AutomaticNewLine) {
                    self.buffer().margin.horizontal.from
                } else {
                    self.buffer().real_cursor_position().column
                };
                self.buffer_mut().linefeed(column);
            }
            Command::MoveCursorBackward(n) => {
                let buffer = self.buffer_mut();
                buffer.wrap_pending = false;
                let step = n.max(0).min(buffer.cursor.position.column - 1);
                buffer.cursor.position.column -= step;
            }
            Command::MoveCursorDown(n) => {
                let buffer = self.buffer_mut();
                buffer.wrap_pending = false;
                let row = buffer.cursor.position.row;
                let max_row = if row <= buffer.margin.vertical.to {
                    buffer.margin.vertical.to
                } else {
                    buffer.size().rows
                };
                buffer.cursor.position.row = (row + n.max(1)).min(max_row);
            }
            Command::MoveCursorForward(n) => {
                self.buffer_mut().increment_cursor_column(n.max(1));
            }
            Command::MoveCursorTo { row, column } => {
                self.buffer_mut().move_cursor_to(Coordinate::new(row, column));
            }
            Command::MoveCursorToBeginOfLine => {
                let buffer = self.buffer_mut();
                buffer.wrap_pending = false;
                buffer.set_current_column(1);
            }
            Command::MoveCursorToColumn(column) => {
                let buffer = self.buffer_mut();
                buffer.wrap_pending = false;
                buffer.set_current_column(column);
            }
            Command::MoveCursorToLine(row) => {
                let column = self.buffer().cursor_position().column;
                self.buffer_mut().move_cursor_to(Coordinate::new(row, column));
            }
            Command::MoveCursorToNextTab => self.move_to_next_tab(),
            Command::MoveCursorUp(n) => {
                let buffer = self.buffer_mut();
                buffer.wrap_pending = false;
                let row = buffer.cursor.position.row;
                let min_row = if row >= buffer.margin.vertical.from {
                    buffer.margin.vertical.from
                } else {
                    1
                };
                buffer.cursor.position.row = (row - n.max(1)).max(min_row);
            }
            Command::Notify { title, body } => self.events.notify(&title, &body),
            Command::ReportCursorPosition => {
                let pos = self.buffer().cursor_position();
                self.reply(format!("\x1b[{};{}R", pos.row, pos.column));
            }
            Command::ReportExtendedCursorPosition => {
                let pos = self.buffer().cursor_position();
                self.reply(format!("\x1b[?{};{};0R", pos.row, pos.column));
            }
            Command::RequestDynamicColor(name) => {
                if let Some(color) = self.events.request_dynamic_color(name) {
                    self.reply(format!(
                        "\x1b]{};{}\x07",
                        name.set_code(),
                        color.to_x11_spec()
                    ));
                }
            }
            Command::RequestMode(mode) => {
                let status = if self.modes.enabled(mode) { 1 } else { 2 };
                if mode.is_ansi() {
                    self.reply(format!("\x1b[{};{}$y", mode.code(), status));
                } else {
                    self.reply(format!("\x1b[?{};{}$y", mode.code(), status));
                }
            }
            Command::RequestStatusString(target) => self.reply_status_string(target),
            Command::RequestTabStops => self.reply_tab_stops(),
            Command::ResetDynamicColor(name) => self.events.reset_dynamic_color(name),
            Command::ResizeWindow {
                width,
                height,
                unit,
            } => {
                let in_pixels = unit == crate::commands::ResizeUnit::Pixels;
                self.events.resize_window(width, height, in_pixels);
            }
            Command::RestoreCursor => self.restore_cursor(),
            Command::RestoreWindowTitle => {
                if let Some(title) = self.saved_window_titles.pop() {
                    self.window_title = title.clone();
                    self.events.set_window_title(&title);
                }
            }
            Command::ReverseIndex => {
                if self.buffer().real_cursor_position().row == self.buffer().margin.vertical.from {
                    self.buffer_mut().scroll_down(1);
                } else {
                    let pos = self.buffer().cursor_position();
                    self.buffer_mut()
                        .move_cursor_to(Coordinate::new(pos.row - 1, pos.column));
                }
            }
            Command::SaveCursor => self.save_cursor(),
            Command::SaveWindowTitle => {
                self.saved_window_titles.push(self.window_title.clone());
            }
            Command::ScreenAlignmentPattern => {
                let size = self.size;
                let buffer = self.buffer_mut();
                buffer.margin = Margin::full(size);
                buffer.move_cursor_to(Coordinate::new(1, 1));
                buffer.fill_screen('E');
            }
            Command::ScrollDown(n) => self.buffer_mut().scroll_down(n),
            Command::ScrollUp(n) => self.buffer_mut().scroll_up(n),
            Command::SelectConformanceLevel { level, .. } => self.terminal_id = level,
            Command::SendDeviceAttributes => {
                let id = self.terminal_id.da1_id();
                self.reply(format!("\x1b[?{id};1;2;6;9;15;21;22c"));
            }
            Command::SendMouseEvents { protocol, enable } => {
                self.events.set_mouse_protocol(protocol, enable);
            }
            Command::SendTerminalId => {
                let id = self.terminal_id.da1_id();
                let version = pkg_version_number();
                self.reply(format!("\x1b[>{id};{version};0c"));
            }
            Command::SetBackgroundColor(color) => {
                self.buffer_mut().cursor.pen.background = color;
            }
            Command::SetCursorStyle { display, shape } => {
                self.cursor_style = (display, shape);
                self.events.set_cursor_style(display, shape);
            }
            Command::SetDynamicColor { name, color } => {
                self.events.set_dynamic_color(name, color);
            }
            Command::SetForegroundColor(color) => {
                self.buffer_mut().cursor.pen.foreground = color;
            }
            Command::SetGraphicsRendition(rendition) => self.apply_rendition(rendition),
            Command::SetLeftRightMargin { left, right } => {
                if self.modes.enabled(Mode::LeftRightMargin) {
                    let columns = self.size.columns;
                    let right = right.map_or(columns, |r| r.min(columns));
                    let left = left.unwrap_or(1);
                    if left + 1 < right {
                        let buffer = self.buffer_mut();
                        buffer.margin.horizontal = MarginRange {
                            from: left,
                            to: right,
                        };
                        buffer.move_cursor_to(Coordinate::new(1, 1));
                    }
                }
            }
            Command::SetMark => self.buffer_mut().mark_current_line(),
            Command::SetMode { mode, enable } => self.set_mode(mode, enable),
            Command::SetTopBottomMargin { top, bottom } => {
                let rows = self.size.rows;
                let bottom = bottom.map_or(rows, |b| b.min(rows));
                let top = top.unwrap_or(1);
                if top < bottom {
                    let buffer = self.buffer_mut();
                    buffer.margin.vertical = MarginRange {
                        from: top,
                        to: bottom,
                    };
                    buffer.move_cursor_to(Coordinate::new(1, 1));
                }
            }
            Command::SetUnderlineColor(color) => {
                self.buffer_mut().cursor.pen.underline_color = color;
            }
            Command::SingleShiftSelect(table) => {
                self.buffer_mut().cursor.charsets.single_shift(table);
            }
            Command::SoftTerminalReset => self.reset_soft(),
        }
    }

    fn apply_rendition(&mut self, rendition: GraphicsRendition) {
        use GraphicsRendition::*;
        let pen = &mut self.buffer_mut().cursor.pen;
        match rendition {
            Reset => *pen = Default::default(),
            Bold => pen.styles |= CellStyle::BOLD,
            Faint => pen.styles |= CellStyle::FAINT,
            Italic => pen.styles |= CellStyle::ITALIC,
            Underline => pen.styles |= CellStyle::UNDERLINE,
            Blinking => pen.styles |= CellStyle::BLINKING,
            Inverse => pen.styles |= CellStyle::INVERSE,
            Hidden => pen.styles |= CellStyle::HIDDEN,
            CrossedOut => pen.styles |= CellStyle::CROSSED_OUT,
            DoublyUnderlined => pen.styles |= CellStyle::DOUBLY_UNDERLINED,
            CurlyUnderlined => pen.styles |= CellStyle::CURLY_UNDERLINED,
            DottedUnderline => pen.styles |= CellStyle::DOTTED_UNDERLINE,
            DashedUnderline => pen.styles |= CellStyle::DASHED_UNDERLINE,
            Framed => pen.styles |= CellStyle::FRAMED,
            Encircled => pen.styles |= CellStyle::ENCIRCLED,
            Overline => pen.styles |= CellStyle::OVERLINE,
            Normal => pen.styles &= !(CellStyle::BOLD | CellStyle::FAINT),
            NoItalic => pen.styles &= !CellStyle::ITALIC,
            NoUnderline => {
                pen.styles &= !(CellStyle::UNDERLINE
                    | CellStyle::DOUBLY_UNDERLINED
                    | CellStyle::CURLY_UNDERLINED
                    | CellStyle::DOTTED_UNDERLINE
                    | CellStyle::DASHED_UNDERLINE);
            }
            NoBlinking => pen.styles &= !CellStyle::BLINKING,
            NoInverse => pen.styles &= !CellStyle::INVERSE,
            NoHidden => pen.styles &= !CellStyle::HIDDEN,
            NoCrossedOut => pen.styles &= !CellStyle::CROSSED_OUT,
            NoFramed => pen.styles &= !CellStyle::FRAMED,
            NoOverline => pen.styles &= !CellStyle::OVERLINE,
        }
    }

    // ---- tab movement ----------------------------------------------------

    fn move_to_next_tab(&mut self) {
        let tabs = self.buffer().tabs().to_vec();
        let column = self.buffer().real_cursor_position().column;
        let right_margin = self.buffer().margin.horizontal.to;

        if !tabs.is_empty() {
            match tabs.iter().find(|&&tab| tab > column) {
                Some(&tab) => self.apply(Command::MoveCursorForward(tab - column)),
                None if column < right_margin => {
                    self.apply(Command::MoveCursorForward(right_margin - column));
                }
                None => self.apply(Command::CursorNextLine(1)),
            }
        } else if self.buffer().tab_width() != 0 {
            let tab_width = self.buffer().tab_width();
            if column < right_margin {
                let step = (tab_width - (column - 1) % tab_width).min(right_margin - column);
                self.apply(Command::MoveCursorForward(step));
            } else {
                self.apply(Command::CursorNextLine(1));
            }
        } else if column < right_margin {
            // No tab stops at all: jump to the right margin.
            self.apply(Command::MoveCursorToColumn(right_margin));
        } else {
            self.apply(Command::CursorNextLine(1));
        }
    }

    fn cursor_backward_tab(&mut self, count: i32) {
        if count <= 0 {
            return;
        }
        let tabs = self.buffer().tabs().to_vec();

        if !tabs.is_empty() {
            for _ in 0..count {
                let column = self.buffer().real_cursor_position().column;
                match tabs.iter().rev().find(|&&tab| tab < column) {
                    Some(&tab) => self.apply(Command::MoveCursorToColumn(tab)),
                    None => {
                        let left = self.buffer().margin.horizontal.from;
                        self.apply(Command::MoveCursorToColumn(left));
                        break;
                    }
                }
            }
        } else if self.buffer().tab_width() != 0 {
            let tab_width = self.buffer().tab_width();
            for _ in 0..count {
                let column = self.buffer().real_cursor_position().column;
                if column <= tab_width + 1 {
                    self.apply(Command::MoveCursorToBeginOfLine);
                    break;
                }
                // Default stops sit at columns k * tab_width + 1.
                let target = ((column - 2) / tab_width) * tab_width + 1;
                self.apply(Command::MoveCursorToColumn(target));
            }
        } else {
            self.apply(Command::MoveCursorToBeginOfLine);
        }
    }

    // ---- save / restore, resets -----------------------------------------

    /// DECSC: push the full cursor state (position, pen, charsets, modes).
    pub fn save_cursor(&mut self) {
        let cursor = self.buffer().cursor.clone();
        self.saved_cursors.push(cursor);
    }

    /// DECRC: restore the most recently saved cursor state.
    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved_cursors.pop() {
            self.modes.set(Mode::AutoWrap, saved.auto_wrap);
            self.modes.set(Mode::Origin, saved.origin_mode);
            let buffer = self.buffer_mut();
            buffer.wrap_pending = false;
            let clamped = buffer.clamp_to_screen(saved.position);
            buffer.cursor = saved;
            buffer.cursor.position = clamped;
        }
    }

    /// DECSTR.
    pub fn reset_soft(&mut self) {
        self.apply(Command::SetMode {
            mode: Mode::BatchedRendering,
            enable: false,
        });
        self.apply(Command::SetGraphicsRendition(GraphicsRendition::Reset));
        self.apply(Command::MoveCursorTo { row: 1, column: 1 });
        for (mode, enable) in [
            (Mode::VisibleCursor, true),
            (Mode::Origin, false),
            (Mode::KeyboardAction, false),
            (Mode::AutoWrap, false),
            (Mode::Insert, false),
            (Mode::UseApplicationCursorKeys, false),
        ] {
            self.apply(Command::SetMode { mode, enable });
        }
        self.apply(Command::SetTopBottomMargin {
            top: Some(1),
            bottom: Some(self.size.rows),
        });
        self.apply(Command::SetLeftRightMargin {
            left: Some(1),
            right: Some(self.size.columns),
        });
    }

    /// RIS: reset both buffers and all modes to their power-on state.
    pub fn reset_hard(&mut self) {
        self.primary.reset();
        self.alternate.reset();
        self.modes = Modes::default();
        self.saved_cursors.clear();
        self.saved_window_titles.clear();
        self.window_title.clear();
        self.selector = None;
        self.queued_commands.clear();
        self.sync_started = None;
        self.scroll_offset = 0;
        self.cursor_style = (CursorDisplay::Blink, CursorShape::Block);
        if self.active != BufferKind::Primary {
            self.set_buffer(BufferKind::Primary);
        }
        self.set_mode(Mode::AutoWrap, true);
    }

    // ---- modes -----------------------------------------------------------

    pub fn set_mode(&mut self, mode: Mode, enable: bool) {
        match mode {
            Mode::UseAlternateScreen => {
                self.set_buffer(if enable {
                    BufferKind::Alternate
                } else {
                    BufferKind::Primary
                });
            }
            Mode::UseApplicationCursorKeys => {
                self.events.use_application_cursor_keys(enable);
                if self.is_alternate_screen() {
                    let wheel = if enable {
                        MouseWheelMode::ApplicationCursorKeys
                    } else {
                        MouseWheelMode::NormalCursorKeys
                    };
                    self.events.set_mouse_wheel_mode(wheel);
                }
            }
            Mode::BracketedPaste => self.events.set_bracketed_paste(enable),
            Mode::MouseSgr => {
                let transport = if enable {
                    crate::input::MouseTransport::Sgr
                } else {
                    crate::input::MouseTransport::Default
                };
                self.events.set_mouse_transport(transport);
            }
            Mode::MouseExtended => {
                let transport = if enable {
                    crate::input::MouseTransport::Extended
                } else {
                    crate::input::MouseTransport::Default
                };
                self.events.set_mouse_transport(transport);
            }
            Mode::MouseUrxvt => {
                let transport = if enable {
                    crate::input::MouseTransport::Urxvt
                } else {
                    crate::input::MouseTransport::Default
                };
                self.events.set_mouse_transport(transport);
            }
            Mode::MouseAlternateScroll => {
                let wheel = if enable {
                    MouseWheelMode::ApplicationCursorKeys
                } else {
                    MouseWheelMode::NormalCursorKeys
                };
                self.events.set_mouse_wheel_mode(wheel);
            }
            Mode::FocusTracking => self.events.set_generate_focus_events(enable),
            _ => {}
        }

        self.modes.set(mode, enable);
        // Modes are global; both buffers cache the flags they consult.
        self.primary.set_mode(mode, enable);
        self.alternate.set_mode(mode, enable);

        if mode == Mode::BatchedRendering && !enable {
            self.flush_queued();
        }
    }

    fn set_buffer(&mut self, kind: BufferKind) {
        if self.active == kind {
            return;
        }
        match kind {
            BufferKind::Primary => self.events.set_mouse_wheel_mode(MouseWheelMode::Default),
            BufferKind::Alternate => {
                let wheel = if self.modes.enabled(Mode::MouseAlternateScroll) {
                    MouseWheelMode::ApplicationCursorKeys
                } else {
                    MouseWheelMode::NormalCursorKeys
                };
                self.events.set_mouse_wheel_mode(wheel);
            }
        }
        self.selector = None;
        self.active = kind;
        self.events.buffer_changed(kind);
    }

    // ---- replies ----------------------------------------------------------

    fn reply_status_string(&mut self, target: StatusTarget) {
        let payload = match target {
            StatusTarget::GraphicsRendition => Some(format!("{}m", self.pen_sgr_params())),
            StatusTarget::TopBottomMargin => {
                let margin = self.buffer().margin.vertical;
                Some(format!("{};{}r", margin.from, margin.to))
            }
            StatusTarget::LeftRightMargin => {
                let margin = self.buffer().margin.horizontal;
                Some(format!("{};{}s", margin.from, margin.to))
            }
            StatusTarget::CursorStyle => {
                let code = match self.cursor_style {
                    (CursorDisplay::Blink, CursorShape::Block) => 1,
                    (CursorDisplay::Steady, CursorShape::Block) => 2,
                    (CursorDisplay::Blink, CursorShape::Underscore) => 3,
                    (CursorDisplay::Steady, CursorShape::Underscore) => 4,
                    (CursorDisplay::Blink, CursorShape::Bar) => 5,
                    (CursorDisplay::Steady, CursorShape::Bar) => 6,
                };
                Some(format!("{code} q"))
            }
            StatusTarget::ConformanceLevel => {
                let level = match self.terminal_id {
                    VTType::VT100 => 61,
                    VTType::VT220 | VTType::VT240 => 62,
                    VTType::VT320 | VTType::VT330 | VTType::VT340 => 63,
                    VTType::VT420 => 64,
                    _ => 65,
                };
                Some(format!("{level};1\"p"))
            }
            _ => None,
        };

        match payload {
            Some(payload) => self.reply(format!("\x1bP1$r{payload}\x1b\\")),
            None => self.reply("\x1bP0$r\x1b\\".to_string()),
        }
    }

    fn pen_sgr_params(&self) -> String {
        let pen = self.buffer().cursor.pen;
        let mut params = vec!["0".to_string()];
        for (style, code) in [
            (CellStyle::BOLD, 1),
            (CellStyle::FAINT, 2),
            (CellStyle::ITALIC, 3),
            (CellStyle::UNDERLINE, 4),
            (CellStyle::BLINKING, 5),
            (CellStyle::INVERSE, 7),
            (CellStyle::HIDDEN, 8),
            (CellStyle::CROSSED_OUT, 9),
        ] {
            if pen.styles.contains(style) {
                params.push(code.to_string());
            }
        }
        push_color_params(&mut params, pen.foreground, 30);
        push_color_params(&mut params, pen.background, 40);
        params.join(";")
    }

    fn reply_tab_stops(&mut self) {
        let buffer = self.buffer();
        let mut stops = String::new();
        if !buffer.tabs().is_empty() {
            for (i, tab) in buffer.tabs().iter().enumerate() {
                if i > 0 {
                    stops.push('/');
                }
                stops.push_str(&tab.to_string());
            }
        } else if buffer.tab_width() != 0 {
            let tab_width = buffer.tab_width();
            let mut column = tab_width + 1;
            while column <= self.size.columns {
                if !stops.is_empty() {
                    stops.push('/');
                }
                stops.push_str(&column.to_string());
                column += tab_width;
            }
        }
        self.reply(format!("\x1bP2$u{stops}\x1b\\"));
    }

    // ---- viewport ----------------------------------------------------------

    pub fn scroll_offset(&self) -> i32 {
        self.scroll_offset
    }

    /// Whether a unified row is inside the current viewport.
    pub fn is_line_visible(&self, row: i32) -> bool {
        1 - self.scroll_offset <= row && row <= self.size.rows - self.scroll_offset
    }

    pub fn scroll_viewport_up(&mut self, lines: i32) -> bool {
        if self.is_alternate_screen() {
            return false;
        }
        let new_offset = (self.scroll_offset + lines.max(0)).min(self.history_line_count());
        let changed = new_offset != self.scroll_offset;
        self.scroll_offset = new_offset;
        changed
    }

    pub fn scroll_viewport_down(&mut self, lines: i32) -> bool {
        if self.is_alternate_screen() {
            return false;
        }
        let new_offset = (self.scroll_offset - lines.max(0)).max(0);
        let changed = new_offset != self.scroll_offset;
        self.scroll_offset = new_offset;
        changed
    }

    pub fn scroll_to_top(&mut self) -> bool {
        let top = self.history_line_count();
        let changed = self.scroll_offset != top;
        self.scroll_offset = top;
        changed
    }

    pub fn scroll_to_bottom(&mut self) -> bool {
        let changed = self.scroll_offset != 0;
        self.scroll_offset = 0;
        changed
    }

    /// Jump the viewport to the nearest marker above it.
    pub fn scroll_mark_up(&mut self) -> bool {
        if let Some(mark) = self.buffer().find_marker_backward(-self.scroll_offset) {
            self.scroll_offset = 1 - mark;
            true
        } else {
            false
        }
    }

    /// Jump the viewport to the nearest marker below it.
    pub fn scroll_mark_down(&mut self) -> bool {
        if let Some(mark) = self.buffer().find_marker_forward(1 - self.scroll_offset) {
            self.scroll_offset = if mark < 0 { 1 - mark } else { 0 };
            true
        } else {
            false
        }
    }

    // ---- rendering ----------------------------------------------------------

    /// Iterate every viewport cell in row-major order, honoring the scroll
    /// offset: display row `r` shows unified row `r - offset`.
    pub fn render<F: FnMut(Coordinate, &Cell)>(&self, mut render: F) {
        let offset = self.scroll_offset.clamp(0, self.history_line_count());
        let buffer = self.buffer();

        for display_row in 1..=self.size.rows {
            let source_row = display_row - offset;
            for column in 1..=self.size.columns {
                if let Some(cell) = buffer.cell_at(Coordinate::new(source_row, column)) {
                    render(Coordinate::new(display_row, column), cell);
                }
            }
        }
    }

    /// The VT byte sequences that would reproduce the current visible
    /// screen on another terminal (styles, colors and text, one CR/LF per
    /// row).
    pub fn screenshot(&self) -> Vec<u8> {
        let mut generator = OutputGenerator::new();
        let buffer = self.buffer();
        for row in 1..=self.size.rows {
            for column in 1..=self.size.columns {
                let Some(cell) = buffer.cell_at(Coordinate::new(row, column)) else {
                    continue;
                };
                if cell.width() == 0 {
                    continue;
                }
                let rendition = if cell.attributes.styles.contains(CellStyle::BOLD) {
                    GraphicsRendition::Bold
                } else {
                    GraphicsRendition::Normal
                };
                generator.emit(&Command::SetGraphicsRendition(rendition));
                generator.emit(&Command::SetForegroundColor(cell.attributes.foreground));
                generator.emit(&Command::SetBackgroundColor(cell.attributes.background));
                if cell.is_empty() {
                    generator.emit(&Command::AppendChar(' '));
                } else {
                    for ch in cell.codepoints() {
                        generator.emit(&Command::AppendChar(ch));
                    }
                }
            }
            generator.emit(&Command::SetGraphicsRendition(GraphicsRendition::Reset));
            generator.emit(&Command::MoveCursorToBeginOfLine);
            generator.emit(&Command::Linefeed);
        }
        generator.take()
    }

    /// Rendered text of a unified row (history rows `<= 0` allowed).
    pub fn render_text_line(&self, row: i32) -> String {
        self.buffer().render_text_line(row)
    }

    /// The whole visible screen as text, rows separated by `\n`.
    pub fn render_text(&self) -> String {
        self.buffer().render_text()
    }

    // ---- selection -----------------------------------------------------------

    pub fn begin_selection(&mut self, mode: SelectionMode, at: Coordinate) {
        let buffer = match self.active {
            BufferKind::Primary => &self.primary,
            BufferKind::Alternate => &self.alternate,
        };
        self.selector = Some(Selector::new(mode, &self.word_delimiters, buffer, at));
    }

    pub fn extend_selection(&mut self, to: Coordinate) {
        let buffer = match self.active {
            BufferKind::Primary => &self.primary,
            BufferKind::Alternate => &self.alternate,
        };
        if let Some(selector) = self.selector.as_mut() {
            selector.extend(buffer, to);
        }
    }

    pub fn complete_selection(&mut self) {
        if let Some(selector) = self.selector.as_mut() {
            selector.stop();
            self.events.on_selection_complete();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selector = None;
    }

    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    pub fn is_selection_available(&self) -> bool {
        self.selector
            .as_ref()
            .is_some_and(|s| s.state() != crate::selection::SelectionState::Waiting)
    }

    pub fn selection_ranges(&self) -> Vec<SelectionRange> {
        self.selector.as_ref().map(Selector::ranges).unwrap_or_default()
    }

    /// Text covered by the current selection, rows joined with `\n`.
    pub fn selected_text(&self) -> String {
        let ranges = self.selection_ranges();
        let buffer = self.buffer();
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

    // ---- resize ----------------------------------------------------------------

    pub fn resize(&mut self, size: ScreenSize) {
        if size == self.size {
            return;
        }
        log::debug!(
            "screen resize {}x{} -> {}x{}",
            self.size.columns,
            self.size.rows,
            size.columns,
            size.rows
        );
        self.primary.resize(size);
        self.alternate.resize(size);
        self.size = size;
        self.selector = None;
        self.scroll_offset = self.scroll_offset.min(self.history_line_count());
    }
}

fn push_color_params(params: &mut Vec<String>, color: Color, base: u16) {
    match color {
        Color::Default => {}
        Color::Indexed(index) if index < 8 => params.push((base + u16::from(index)).to_string()),
        Color::Indexed(index) => {
            params.push((base + 8).to_string());
            params.push("5".to_string());
            params.push(index.to_string());
        }
        Color::Bright(index) => params.push((base + 60 + u16::from(index)).to_string()),
        Color::Rgb(rgb) => {
            params.push((base + 8).to_string());
            params.push("2".to_string());
            params.push(rgb.red.to_string());
            params.push(rgb.green.to_string());
            params.push(rgb.blue.to_string());
        }
    }
}

/// `(major * 100 + minor) * 100 + patch`, reported by secondary DA.
fn pkg_version_number() -> u32 {
    let parse = |s: &str| s.parse::<u32>().unwrap_or(0);
    (parse(env!("CARGO_PKG_VERSION_MAJOR")) * 100 + parse(env!("CARGO_PKG_VERSION_MINOR"))) * 100
        + parse(env!("CARGO_PKG_VERSION_PATCH"))
}
