//! Byte-exact realization of outgoing commands.
//!
//! The inverse of the parser+builder for the subset of commands the
//! terminal emits itself (replies, screenshots, forwarding). Consecutive
//! style and color commands coalesce into a single `CSI … m` holding at
//! most sixteen parameters; redundant color changes are suppressed by
//! comparing against the last emitted pen.

use crate::color::Color;
use crate::commands::{
    CharsetTable, Command, CursorDisplay, CursorShape, GraphicsRendition, ResizeUnit,
    StatusTarget, VTType,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Maximum parameters per coalesced SGR sequence.
const MAX_SGR_PARAMS: usize = 16;

/// Accumulates commands into their wire encoding.
#[derive(Debug, Default)]
pub struct OutputGenerator {
    out: Vec<u8>,
    sgr: Vec<u16>,
    current_foreground: Color,
    current_background: Color,
    current_underline: Color,
    application_cursor_keys: bool,
}

impl OutputGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch CUU/CUD emission between `CSI A` and `SS3 A` forms.
    pub fn set_application_cursor_keys(&mut self, enable: bool) {
        self.application_cursor_keys = enable;
    }

    /// Flush pending SGR state and hand out the generated bytes.
    pub fn take(&mut self) -> Vec<u8> {
        self.flush_sgr();
        std::mem::take(&mut self.out)
    }

    pub fn emit_all(&mut self, commands: &[Command]) {
        for command in commands {
            self.emit(command);
        }
    }

    fn put(&mut self, text: &str) {
        self.flush_sgr();
        self.out.extend_from_slice(text.as_bytes());
    }

    fn flush_sgr(&mut self) {
        if self.sgr.is_empty() {
            return;
        }
        let params = std::mem::take(&mut self.sgr);
        let body = if params == [0] {
            String::new()
        } else {
            params
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(";")
        };
        self.out.extend_from_slice(b"\x1b[");
        self.out.extend_from_slice(body.as_bytes());
        self.out.push(b'm');
    }

    fn sgr_add(&mut self, param: u16) {
        if param == 0 {
            self.sgr.clear();
            self.sgr.push(0);
            return;
        }
        if self.sgr.last() != Some(&param) {
            self.sgr.push(param);
        }
        if self.sgr.len() >= MAX_SGR_PARAMS {
            self.flush_sgr();
        }
    }

    fn sgr_color(&mut self, color: Color, base: u16) {
        match color {
            Color::Default => self.sgr_add(base + 9),
            Color::Indexed(index) if index < 8 => self.sgr_add(base + u16::from(index)),
            Color::Indexed(index) => {
                self.sgr_add(base + 8);
                self.sgr_add(5);
                self.sgr_add(u16::from(index));
            }
            Color::Bright(index) => self.sgr_add(base + 60 + u16::from(index)),
            Color::Rgb(rgb) => {
                self.sgr_add(base + 8);
                self.sgr_add(2);
                self.sgr_add(u16::from(rgb.red));
                self.sgr_add(u16::from(rgb.green));
                self.sgr_add(u16::from(rgb.blue));
            }
        }
    }

    pub fn emit(&mut self, command: &Command) {
        use Command::*;
        match command {
            AppendChar(ch) => {
                self.flush_sgr();
                let mut buf = [0u8; 4];
                self.out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            ApplicationKeypadMode(enable) => self.put(if *enable { "\x1b=" } else { "\x1b>" }),
            BackIndex => self.put("\x1b6"),
            Backspace => self.put("\x08"),
            Bell => self.put("\x07"),
            ChangeIconTitle(title) => self.put(&format!("\x1b]1;{title}\x1b\\")),
            ChangeWindowTitle(title) => self.put(&format!("\x1b]2;{title}\x1b\\")),
            ClearLine => self.put("\x1b[2K"),
            ClearScreen => self.put("\x1b[2J"),
            ClearScrollbackBuffer => self.put("\x1b[3J"),
            ClearToBeginOfLine => self.put("\x1b[1K"),
            ClearToBeginOfScreen => self.put("\x1b[1J"),
            ClearToEndOfLine => self.put("\x1b[K"),
            ClearToEndOfScreen => self.put("\x1b[0J"),
            CopyToClipboard(data) => {
                self.put(&format!("\x1b]52;c;{}\x1b\\", BASE64.encode(data)));
            }
            CursorBackwardTab(n) => self.put(&format!("\x1b[{n}Z")),
            CursorNextLine(n) => self.put(&format!("\x1b[{n}E")),
            CursorPreviousLine(n) => self.put(&format!("\x1b[{n}F")),
            DeleteCharacters(n) => self.put(&format!("\x1b[{n}P")),
            DeleteColumns(n) => self.put(&format!("\x1b[{n}'~")),
            DeleteLines(n) => self.put(&format!("\x1b[{n}M")),
            DesignateCharset { table, charset } => {
                let slot = match table {
                    CharsetTable::G0 => '(',
                    CharsetTable::G1 => ')',
                    CharsetTable::G2 => '*',
                    CharsetTable::G3 => '+',
                };
                self.put(&format!("\x1b{}{}", slot, charset.final_byte() as char));
            }
            DeviceStatusReport => self.put("\x1b[5n"),
            EraseCharacters(n) => self.put(&format!("\x1b[{n}X")),
            ForwardIndex => self.put("\x1b9"),
            FullReset => self.put("\x1bc"),
            HorizontalPositionAbsolute(n) => self.put(&format!("\x1b[{n}`")),
            HorizontalPositionRelative(n) => self.put(&format!("\x1b[{n}a")),
            HorizontalTabClear(which) => match which {
                crate::commands::TabClear::UnderCursor => self.put("\x1b[g"),
                crate::commands::TabClear::AllTabs => self.put("\x1b[3g"),
            },
            HorizontalTabSet => self.put("\x1bH"),
            Hyperlink { id, uri } => {
                if id.is_empty() {
                    self.put(&format!("\x1b]8;;{uri}\x1b\\"));
                } else {
                    self.put(&format!("\x1b]8;id={id};{uri}\x1b\\"));
                }
            }
            Index => self.put("\x1bD"),
            InsertCharacters(n) => self.put(&format!("\x1b[{n}@")),
            InsertColumns(n) => self.put(&format!("\x1b[{n}'}}")),
            InsertLines(n) => self.put(&format!("\x1b[{n}L")),
            Linefeed => self.put("\n"),
            MoveCursorBackward(n) => self.put(&format!("\x1b[{n}D")),
            MoveCursorDown(n) => {
                if self.application_cursor_keys {
                    for _ in 0..*n {
                        self.put("\x1bOB");
                    }
                } else {
                    self.put(&format!("\x1b[{n}B"));
                }
            }
            MoveCursorForward(n) => self.put(&format!("\x1b[{n}C")),
            MoveCursorTo { row, column } => {
                self.put(&format!("\x1b[{}H", pair_or_none(1, *row, *column)));
            }
            MoveCursorToBeginOfLine => self.put("\r"),
            MoveCursorToColumn(column) => self.put(&format!("\x1b[{column}G")),
            MoveCursorToLine(row) => self.put(&format!("\x1b[{row}d")),
            MoveCursorToNextTab => self.put("\t"),
            MoveCursorUp(n) => {
                if self.application_cursor_keys {
                    for _ in 0..*n {
                        self.put("\x1bOA");
                    }
                } else {
                    self.put(&format!("\x1b[{n}A"));
                }
            }
            Notify { title, body } => {
                self.put(&format!("\x1b]777;notify;{title};{body}\x1b\\"));
            }
            ReportCursorPosition => self.put("\x1b[6n"),
            ReportExtendedCursorPosition => self.put("\x1b[?6n"),
            RequestDynamicColor(name) => self.put(&format!("\x1b]{};?\x07", name.set_code())),
            RequestMode(mode) => {
                if mode.is_ansi() {
                    self.put(&format!("\x1b[{}$p", mode.code()));
                } else {
                    self.put(&format!("\x1b[?{}$p", mode.code()));
                }
            }
            RequestStatusString(target) => {
                let tag = match target {
                    StatusTarget::GraphicsRendition => "m",
                    StatusTarget::ConformanceLevel => "\"p",
                    StatusTarget::CursorStyle => " q",
                    StatusTarget::ProtectedAttribute => "\"q",
                    StatusTarget::TopBottomMargin => "r",
                    StatusTarget::LeftRightMargin => "s",
                    StatusTarget::LinesPerPage => "t",
                    StatusTarget::ColumnsPerPage => "$|",
                    StatusTarget::LinesPerScreen => "*|",
                };
                self.put(&format!("\x1bP$q{tag}\x1b\\"));
            }
            RequestTabStops => self.put("\x1b[2$w"),
            ResetDynamicColor(name) => self.put(&format!("\x1b]{}\x07", name.reset_code())),
            ResizeWindow {
                width,
                height,
                unit,
            } => {
                let op = if *unit == ResizeUnit::Pixels { 4 } else { 8 };
                self.put(&format!("\x1b[{op};{height};{width}t"));
            }
            RestoreCursor => self.put("\x1b8"),
            RestoreWindowTitle => self.put("\x1b[23;0;0t"),
            ReverseIndex => self.put("\x1bM"),
            SaveCursor => self.put("\x1b7"),
            SaveWindowTitle => self.put("\x1b[22;0;0t"),
            ScreenAlignmentPattern => self.put("\x1b#8"),
            ScrollDown(n) => self.put(&format!("\x1b[{n}T")),
            ScrollUp(n) => self.put(&format!("\x1b[{n}S")),
            SelectConformanceLevel {
                level,
                eight_bit_controls,
            } => {
                let code = match level {
                    VTType::VT100 => 61,
                    VTType::VT220 | VTType::VT240 => 62,
                    VTType::VT320 | VTType::VT330 | VTType::VT340 => 63,
                    VTType::VT420 => 64,
                    _ => 65,
                };
                let c1t = if *eight_bit_controls { 0 } else { 1 };
                self.put(&format!("\x1b[{code};{c1t}\"p"));
            }
            SendDeviceAttributes => self.put("\x1b[c"),
            SendMouseEvents { protocol, enable } => {
                self.put(&format!(
                    "\x1b[?{}{}",
                    protocol.code(),
                    if *enable { 'h' } else { 'l' }
                ));
            }
            SendTerminalId => self.put("\x1b[>c"),
            SetBackgroundColor(color) => {
                if *color != self.current_background {
                    self.current_background = *color;
                    self.sgr_color(*color, 40);
                }
            }
            SetCursorStyle { display, shape } => {
                let code = match (display, shape) {
                    (CursorDisplay::Blink, CursorShape::Block) => 1,
                    (CursorDisplay::Steady, CursorShape::Block) => 2,
                    (CursorDisplay::Blink, CursorShape::Underscore) => 3,
                    (CursorDisplay::Steady, CursorShape::Underscore) => 4,
                    (CursorDisplay::Blink, CursorShape::Bar) => 5,
                    (CursorDisplay::Steady, CursorShape::Bar) => 6,
                };
                self.put(&format!("\x1b[{code} q"));
            }
            SetDynamicColor { name, color } => {
                self.put(&format!(
                    "\x1b]{};{}\x07",
                    name.set_code(),
                    color.to_x11_spec()
                ));
            }
            SetForegroundColor(color) => {
                if *color != self.current_foreground {
                    self.current_foreground = *color;
                    self.sgr_color(*color, 30);
                }
            }
            SetGraphicsRendition(rendition) => match rendition {
                // The styled underlines only exist as 4:x sub-parameters,
                // which the coalescing buffer cannot hold.
                GraphicsRendition::CurlyUnderlined => self.put("\x1b[4:3m"),
                GraphicsRendition::DottedUnderline => self.put("\x1b[4:4m"),
                GraphicsRendition::DashedUnderline => self.put("\x1b[4:5m"),
                GraphicsRendition::Reset => {
                    self.sgr_add(0);
                    // After SGR 0 the terminal pen is defaults; forget ours
                    // so following colors are re-emitted.
                    self.current_foreground = Color::Default;
                    self.current_background = Color::Default;
                    self.current_underline = Color::Default;
                }
                other => self.sgr_add(other.sgr_code()),
            },
            SetLeftRightMargin { left, right } => match (left, right) {
                (None, None) => self.put("\x1b[s"),
                (Some(l), None) => self.put(&format!("\x1b[{l}s")),
                (None, Some(r)) => self.put(&format!("\x1b[;{r}s")),
                (Some(l), Some(r)) => self.put(&format!("\x1b[{l};{r}s")),
            },
            SetMark => self.put("\x1b[>M"),
            SetMode { mode, enable } => {
                let suffix = if *enable { 'h' } else { 'l' };
                if mode.is_ansi() {
                    self.put(&format!("\x1b[{}{}", mode.code(), suffix));
                } else {
                    self.put(&format!("\x1b[?{}{}", mode.code(), suffix));
                }
            }
            SetTopBottomMargin { top, bottom } => match (top, bottom) {
                (None, None) => self.put("\x1b[r"),
                (Some(t), None) => self.put(&format!("\x1b[{t}r")),
                (None, Some(b)) => self.put(&format!("\x1b[;{b}r")),
                (Some(t), Some(b)) => self.put(&format!("\x1b[{t};{b}r")),
            },
            SetUnderlineColor(color) => {
                if *color != self.current_underline {
                    self.current_underline = *color;
                    match color {
                        Color::Indexed(index) => {
                            self.sgr_add(58);
                            self.sgr_add(5);
                            self.sgr_add(u16::from(*index));
                        }
                        Color::Rgb(rgb) => {
                            self.sgr_add(58);
                            self.sgr_add(2);
                            self.sgr_add(u16::from(rgb.red));
                            self.sgr_add(u16::from(rgb.green));
                            self.sgr_add(u16::from(rgb.blue));
                        }
                        _ => {}
                    }
                }
            }
            SingleShiftSelect(table) => match table {
                CharsetTable::G2 => self.put("\x1bN"),
                CharsetTable::G3 => self.put("\x1bO"),
                _ => {}
            },
            SoftTerminalReset => self.put("\x1b[!p"),
        }
    }
}

/// `row;column` with defaults elided, as CUP encodes them.
fn pair_or_none(default: i32, a: i32, b: i32) -> String {
    if a == default && b == default {
        String::new()
    } else if a == default {
        format!(";{b}")
    } else if b == default {
        format!("{a};")
    } else {
        format!("{a};{b}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CommandBuilder;
    use crate::color::RgbColor;
    use crate::commands::Mode;
    use crate::parser::Parser;

    fn emit(commands: &[Command]) -> Vec<u8> {
        let mut generator = OutputGenerator::new();
        generator.emit_all(commands);
        generator.take()
    }

    fn emit_str(commands: &[Command]) -> String {
        String::from_utf8(emit(commands)).unwrap()
    }

    #[test]
    fn sgr_coalescing() {
        let bytes = emit_str(&[
            Command::SetGraphicsRendition(GraphicsRendition::Bold),
            Command::SetForegroundColor(Color::Indexed(1)),
            Command::AppendChar('x'),
        ]);
        assert_eq!(bytes, "\x1b[1;31mx");
    }

    #[test]
    fn sgr_reset_collapses_to_bare_m() {
        let bytes = emit_str(&[
            Command::SetGraphicsRendition(GraphicsRendition::Reset),
            Command::AppendChar('x'),
        ]);
        assert_eq!(bytes, "\x1b[mx");
    }

    #[test]
    fn redundant_color_changes_suppressed() {
        let bytes = emit_str(&[
            Command::SetForegroundColor(Color::Indexed(2)),
            Command::AppendChar('a'),
            Command::SetForegroundColor(Color::Indexed(2)),
            Command::AppendChar('b'),
        ]);
        assert_eq!(bytes, "\x1b[32mab");
    }

    #[test]
    fn reset_forgets_remembered_pen() {
        let bytes = emit_str(&[
            Command::SetForegroundColor(Color::Indexed(2)),
            Command::AppendChar('a'),
            Command::SetGraphicsRendition(GraphicsRendition::Reset),
            Command::SetForegroundColor(Color::Indexed(2)),
            Command::AppendChar('b'),
        ]);
        assert_eq!(bytes, "\x1b[32ma\x1b[32mb");
    }

    #[test]
    fn sgr_flushes_at_sixteen_params() {
        let mut generator = OutputGenerator::new();
        // four distinct truecolor changes are twenty parameters
        for value in 0..4u8 {
            generator.emit(&Command::SetForegroundColor(Color::Rgb(RgbColor::new(
                value, value, value,
            ))));
        }
        let bytes = String::from_utf8(generator.take()).unwrap();
        assert_eq!(bytes.matches('m').count(), 2);
    }

    #[test]
    fn truecolor_bytes() {
        let bytes = emit_str(&[
            Command::SetForegroundColor(Color::Rgb(RgbColor::new(10, 20, 30))),
            Command::AppendChar('A'),
        ]);
        assert_eq!(bytes, "\x1b[38;2;10;20;30mA");
    }

    #[test]
    fn cup_elides_defaults() {
        assert_eq!(
            emit_str(&[Command::MoveCursorTo { row: 1, column: 1 }]),
            "\x1b[H"
        );
        assert_eq!(
            emit_str(&[Command::MoveCursorTo { row: 3, column: 7 }]),
            "\x1b[3;7H"
        );
    }

    #[test]
    fn hyperlink_encoding() {
        assert_eq!(
            emit_str(&[Command::Hyperlink {
                id: "x".into(),
                uri: "https://example.com".into()
            }]),
            "\x1b]8;id=x;https://example.com\x1b\\"
        );
        assert_eq!(
            emit_str(&[Command::Hyperlink {
                id: String::new(),
                uri: String::new()
            }]),
            "\x1b]8;;\x1b\\"
        );
    }

    #[test]
    fn mode_and_margin_encoding() {
        assert_eq!(
            emit_str(&[Command::SetMode {
                mode: Mode::VisibleCursor,
                enable: false
            }]),
            "\x1b[?25l"
        );
        assert_eq!(
            emit_str(&[Command::SetTopBottomMargin {
                top: None,
                bottom: None
            }]),
            "\x1b[r"
        );
        assert_eq!(
            emit_str(&[Command::SetTopBottomMargin {
                top: Some(2),
                bottom: Some(5)
            }]),
            "\x1b[2;5r"
        );
    }

    #[test]
    fn application_cursor_keys_use_ss3() {
        let mut generator = OutputGenerator::new();
        generator.set_application_cursor_keys(true);
        generator.emit(&Command::MoveCursorUp(2));
        assert_eq!(String::from_utf8(generator.take()).unwrap(), "\x1bOA\x1bOA");
    }

    #[test]
    fn generator_then_parser_is_identity() {
        let commands = vec![
            Command::SetGraphicsRendition(GraphicsRendition::Bold),
            Command::SetForegroundColor(Color::Rgb(RgbColor::new(1, 2, 3))),
            Command::SetBackgroundColor(Color::Indexed(100)),
            Command::AppendChar('H'),
            Command::AppendChar('i'),
            Command::MoveCursorTo { row: 5, column: 6 },
            Command::SetMode {
                mode: Mode::BracketedPaste,
                enable: true,
            },
            Command::Hyperlink {
                id: "k".into(),
                uri: "https://example.com".into(),
            },
            Command::SendDeviceAttributes,
            Command::ReportCursorPosition,
            Command::ScrollUp(3),
            Command::SetMode {
                mode: Mode::Insert,
                enable: false,
            },
        ];

        let bytes = emit(&commands);
        let mut parser = Parser::new();
        let mut builder = CommandBuilder::new();
        parser.parse(&bytes, &mut builder);
        assert_eq!(builder.take_commands(), commands);
    }

    #[test]
    fn styled_underline_uses_subparameter_form() {
        let command = Command::SetGraphicsRendition(GraphicsRendition::CurlyUnderlined);
        let bytes = emit(&[command.clone()]);
        assert_eq!(String::from_utf8(bytes.clone()).unwrap(), "\x1b[4:3m");

        let mut parser = Parser::new();
        let mut builder = CommandBuilder::new();
        parser.parse(&bytes, &mut builder);
        assert_eq!(builder.take_commands(), vec![command]);
    }

    #[test]
    fn clipboard_roundtrip() {
        let command = Command::CopyToClipboard("Hello".into());
        let bytes = emit(&[command.clone()]);
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            "\x1b]52;c;SGVsbG8=\x1b\\"
        );
        let mut parser = Parser::new();
        let mut builder = CommandBuilder::new();
        parser.parse(&bytes, &mut builder);
        assert_eq!(builder.take_commands(), vec![command]);
    }
}
