//! Translates parser actions into [`Command`]s.
//!
//! The builder buffers collected bytes into a [`Sequence`] and, on a
//! dispatch action, resolves the function keyed by (category, private
//! marker, intermediates, final byte) — a single exhaustive `match` — and
//! validates its arguments. Invalid or unsupported sequences emit no
//! commands; they are logged and the screen stays untouched.

use crate::color::{Color, RgbColor};
use crate::commands::{
    CharsetId, CharsetTable, Command, CursorDisplay, CursorShape, DynamicColorName,
    GraphicsRendition, Mode, MouseProtocol, ResizeUnit, StatusTarget, TabClear, VTType,
};
use crate::parser;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;

/// Outcome of applying one complete sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqResult {
    /// Commands were emitted.
    Ok,
    /// Recognized function with malformed arguments; dropped.
    Invalid,
    /// Sequence not implemented by this terminal; dropped.
    Unsupported,
}

/// Category of a buffered sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FunctionCategory {
    #[default]
    Esc,
    Csi,
    Osc,
    Dcs,
}

/// Maximum parameter groups kept per sequence.
const MAX_PARAMETERS: usize = 32;
/// Parameters are capped at five decimal digits.
const MAX_PARAM_VALUE: i32 = 99_999;

/// A parsed-but-not-yet-interpreted control sequence.
#[derive(Clone, Debug, Default)]
pub struct Sequence {
    category: FunctionCategory,
    /// Private marker byte (`?`, `>`, `<`, `=`), 0 if none.
    leader: u8,
    intermediates: Vec<u8>,
    /// Parameter groups; within a group, element 0 is the parameter and the
    /// rest are its `:`-separated sub-parameters.
    parameters: Vec<Vec<i32>>,
    final_byte: u8,
    /// OSC or DCS payload, byte-accurate.
    data: Vec<u8>,
}

impl Sequence {
    fn clear(&mut self) {
        self.category = FunctionCategory::Esc;
        self.leader = 0;
        self.intermediates.clear();
        self.parameters.clear();
        self.final_byte = 0;
        self.data.clear();
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Parameter `i`, or 0 when absent.
    pub fn param(&self, i: usize) -> i32 {
        self.parameters.get(i).map_or(0, |group| group[0])
    }

    /// Parameter `i`, or `default` when absent or zero.
    pub fn param_or(&self, i: usize, default: i32) -> i32 {
        match self.param(i) {
            0 => default,
            value => value,
        }
    }

    /// Parameter `i` when present and non-zero.
    pub fn param_opt(&self, i: usize) -> Option<i32> {
        match self.parameters.get(i) {
            Some(group) if group[0] != 0 => Some(group[0]),
            _ => None,
        }
    }

    /// Number of `:`-separated sub-parameters of group `i`.
    pub fn subparam_count(&self, i: usize) -> usize {
        self.parameters.get(i).map_or(0, |group| group.len() - 1)
    }

    /// Sub-parameter `k` of group `i`, or 0 when absent.
    pub fn subparam(&self, i: usize, k: usize) -> i32 {
        self.parameters
            .get(i)
            .and_then(|group| group.get(k + 1))
            .copied()
            .unwrap_or(0)
    }

    fn push_param_byte(&mut self, byte: u8) {
        match byte {
            b';' => {
                if self.parameters.is_empty() {
                    self.parameters.push(vec![0]);
                }
                if self.parameters.len() < MAX_PARAMETERS {
                    self.parameters.push(vec![0]);
                }
            }
            b':' => {
                if self.parameters.is_empty() {
                    self.parameters.push(vec![0]);
                }
                if let Some(group) = self.parameters.last_mut() {
                    group.push(0);
                }
            }
            b'0'..=b'9' => {
                if self.parameters.is_empty() {
                    self.parameters.push(vec![0]);
                }
                if let Some(value) = self.parameters.last_mut().and_then(|g| g.last_mut()) {
                    *value = (*value * 10 + i32::from(byte - b'0')).min(MAX_PARAM_VALUE);
                }
            }
            _ => {}
        }
    }

    fn data_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            FunctionCategory::Esc => write!(f, "ESC")?,
            FunctionCategory::Csi => write!(f, "CSI")?,
            FunctionCategory::Osc => write!(f, "OSC")?,
            FunctionCategory::Dcs => write!(f, "DCS")?,
        }
        if self.leader != 0 {
            write!(f, " {}", self.leader as char)?;
        }
        for (i, group) in self.parameters.iter().enumerate() {
            write!(f, "{}", if i == 0 { ' ' } else { ';' })?;
            for (k, value) in group.iter().enumerate() {
                if k > 0 {
                    write!(f, ":")?;
                }
                write!(f, "{value}")?;
            }
        }
        for &byte in &self.intermediates {
            write!(f, " {}", byte as char)?;
        }
        if self.final_byte != 0 {
            write!(f, " {}", self.final_byte as char)?;
        }
        if !self.data.is_empty() {
            write!(f, " \"{}\"", self.data_str())?;
        }
        Ok(())
    }
}

/// Accumulates parser actions and emits normalized commands.
#[derive(Debug, Default)]
pub struct CommandBuilder {
    sequence: Sequence,
    commands: Vec<Command>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The commands produced since the last [`CommandBuilder::take_commands`].
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    fn emit(&mut self, command: Command) -> SeqResult {
        self.commands.push(command);
        SeqResult::Ok
    }

    fn settle(&mut self, result: SeqResult) {
        match result {
            SeqResult::Ok => {}
            SeqResult::Invalid => {
                log::trace!("invalid sequence dropped: {}", self.sequence);
            }
            SeqResult::Unsupported => {
                log::debug!("unsupported sequence dropped: {}", self.sequence);
            }
        }
    }

    // ---- ESC -------------------------------------------------------------

    fn dispatch_esc(&mut self) -> SeqResult {
        let fin = self.sequence.final_byte;
        let intermediates = self.sequence.intermediates.clone();
        match (intermediates.as_slice(), fin) {
            ([], b'6') => self.emit(Command::BackIndex),
            ([], b'7') => self.emit(Command::SaveCursor),
            ([], b'8') => self.emit(Command::RestoreCursor),
            ([b'#'], b'8') => self.emit(Command::ScreenAlignmentPattern),
            ([], b'9') => self.emit(Command::ForwardIndex),
            ([], b'=') => self.emit(Command::ApplicationKeypadMode(true)),
            ([], b'>') => self.emit(Command::ApplicationKeypadMode(false)),
            ([], b'D') => self.emit(Command::Index),
            ([], b'E') => self.emit(Command::CursorNextLine(1)),
            ([], b'H') => self.emit(Command::HorizontalTabSet),
            ([], b'M') => self.emit(Command::ReverseIndex),
            ([], b'N') => self.emit(Command::SingleShiftSelect(CharsetTable::G2)),
            ([], b'O') => self.emit(Command::SingleShiftSelect(CharsetTable::G3)),
            ([], b'c') => self.emit(Command::FullReset),
            // String terminator of a preceding OSC/DCS.
            ([], b'\\') => SeqResult::Ok,
            ([b'('], f) => self.designate(CharsetTable::G0, f),
            ([b')'] | [b'-'], f) => self.designate(CharsetTable::G1, f),
            ([b'*'] | [b'.'], f) => self.designate(CharsetTable::G2, f),
            ([b'+'] | [b'/'], f) => self.designate(CharsetTable::G3, f),
            _ => SeqResult::Unsupported,
        }
    }

    fn designate(&mut self, table: CharsetTable, final_byte: u8) -> SeqResult {
        match CharsetId::from_final_byte(final_byte) {
            Some(charset) => self.emit(Command::DesignateCharset { table, charset }),
            None => SeqResult::Unsupported,
        }
    }

    // ---- CSI -------------------------------------------------------------

    fn dispatch_csi(&mut self) -> SeqResult {
        let leader = self.sequence.leader;
        let fin = self.sequence.final_byte;
        let n = self.sequence.param_or(0, 1).max(1);
        let intermediates = self.sequence.intermediates.clone();

        match (leader, intermediates.as_slice(), fin) {
            (0, [], b'@') => self.emit(Command::InsertCharacters(n)),
            (0, [], b'A') => self.emit(Command::MoveCursorUp(n)),
            (0, [], b'B') => self.emit(Command::MoveCursorDown(n)),
            (0, [], b'C') => self.emit(Command::MoveCursorForward(n)),
            (0, [], b'D') => self.emit(Command::MoveCursorBackward(n)),
            (0, [], b'E') => self.emit(Command::CursorNextLine(n)),
            (0, [], b'F') => self.emit(Command::CursorPreviousLine(n)),
            (0, [], b'G') => self.emit(Command::MoveCursorToColumn(n)),
            (0, [], b'H') | (0, [], b'f') => self.emit(Command::MoveCursorTo {
                row: self.sequence.param_or(0, 1).max(1),
                column: self.sequence.param_or(1, 1).max(1),
            }),
            (0, [], b'J') => self.erase_in_display(),
            (0, [], b'K') => self.erase_in_line(),
            (0, [], b'L') => self.emit(Command::InsertLines(n)),
            (0, [], b'M') => self.emit(Command::DeleteLines(n)),
            (0, [], b'P') => self.emit(Command::DeleteCharacters(n)),
            (0, [], b'S') => self.emit(Command::ScrollUp(n)),
            (0, [], b'T') => self.emit(Command::ScrollDown(n)),
            (0, [], b'X') => self.emit(Command::EraseCharacters(n)),
            (0, [], b'Z') => self.emit(Command::CursorBackwardTab(n)),
            (0, [], b'`') => self.emit(Command::HorizontalPositionAbsolute(n)),
            (0, [], b'a') => self.emit(Command::HorizontalPositionRelative(n)),
            (0, [], b'c') => match self.sequence.param(0) {
                0 => self.emit(Command::SendDeviceAttributes),
                _ => SeqResult::Unsupported,
            },
            (b'>', [], b'c') => self.emit(Command::SendTerminalId),
            (0, [], b'd') => self.emit(Command::MoveCursorToLine(n)),
            (0, [], b'g') => self.tab_clear(),
            (0, [], b'h') => self.set_modes_ansi(true),
            (0, [], b'l') => self.set_modes_ansi(false),
            (b'?', [], b'h') => self.set_modes_dec(true),
            (b'?', [], b'l') => self.set_modes_dec(false),
            (0, [], b'm') => self.select_graphics_rendition(),
            (0, [], b'n') => match self.sequence.param(0) {
                5 => self.emit(Command::DeviceStatusReport),
                6 => self.emit(Command::ReportCursorPosition),
                _ => SeqResult::Unsupported,
            },
            (b'?', [], b'n') => match self.sequence.param(0) {
                6 => self.emit(Command::ReportExtendedCursorPosition),
                _ => SeqResult::Unsupported,
            },
            (0, [b' '], b'q') => self.cursor_style(),
            (0, [b'"'], b'p') => self.conformance_level(),
            (0, [b'!'], b'p') => self.emit(Command::SoftTerminalReset),
            (0, [b'$'], b'p') => self.request_mode(true),
            (b'?', [b'$'], b'p') => self.request_mode(false),
            (0, [b'$'], b'w') => match self.sequence.param(0) {
                2 => self.emit(Command::RequestTabStops),
                _ => SeqResult::Invalid,
            },
            (0, [], b'r') => self.emit(Command::SetTopBottomMargin {
                top: self.sequence.param_opt(0),
                bottom: self.sequence.param_opt(1),
            }),
            (0, [], b's') => {
                if self.sequence.parameter_count() == 0 {
                    self.emit(Command::SaveCursor)
                } else {
                    self.emit(Command::SetLeftRightMargin {
                        left: self.sequence.param_opt(0),
                        right: self.sequence.param_opt(1),
                    })
                }
            }
            (0, [], b'u') => self.emit(Command::RestoreCursor),
            (0, [], b't') => self.window_manipulation(),
            (0, [b'\''], b'}') => self.emit(Command::InsertColumns(n)),
            (0, [b'\''], b'~') => self.emit(Command::DeleteColumns(n)),
            (b'>', [], b'M') => self.emit(Command::SetMark),
            _ => SeqResult::Unsupported,
        }
    }

    fn erase_in_display(&mut self) -> SeqResult {
        if self.sequence.parameter_count() == 0 {
            return self.emit(Command::ClearToEndOfScreen);
        }
        let mut result = SeqResult::Invalid;
        for i in 0..self.sequence.parameter_count() {
            result = match self.sequence.param(i) {
                0 => self.emit(Command::ClearToEndOfScreen),
                1 => self.emit(Command::ClearToBeginOfScreen),
                2 => self.emit(Command::ClearScreen),
                3 => self.emit(Command::ClearScrollbackBuffer),
                _ => result,
            };
        }
        result
    }

    fn erase_in_line(&mut self) -> SeqResult {
        match self.sequence.param(0) {
            0 => self.emit(Command::ClearToEndOfLine),
            1 => self.emit(Command::ClearToBeginOfLine),
            2 => self.emit(Command::ClearLine),
            _ => SeqResult::Invalid,
        }
    }

    fn tab_clear(&mut self) -> SeqResult {
        match self.sequence.param(0) {
            0 => self.emit(Command::HorizontalTabClear(TabClear::UnderCursor)),
            3 => self.emit(Command::HorizontalTabClear(TabClear::AllTabs)),
            _ => SeqResult::Invalid,
        }
    }

    fn cursor_style(&mut self) -> SeqResult {
        if self.sequence.parameter_count() > 1 {
            return SeqResult::Invalid;
        }
        let (display, shape) = match self.sequence.param(0) {
            0 | 1 => (CursorDisplay::Blink, CursorShape::Block),
            2 => (CursorDisplay::Steady, CursorShape::Block),
            3 => (CursorDisplay::Blink, CursorShape::Underscore),
            4 => (CursorDisplay::Steady, CursorShape::Underscore),
            5 => (CursorDisplay::Blink, CursorShape::Bar),
            6 => (CursorDisplay::Steady, CursorShape::Bar),
            _ => return SeqResult::Invalid,
        };
        self.emit(Command::SetCursorStyle { display, shape })
    }

    fn conformance_level(&mut self) -> SeqResult {
        let level = match self.sequence.param_or(0, 61) {
            61 => VTType::VT100,
            62 => VTType::VT220,
            63 => VTType::VT320,
            64 => VTType::VT420,
            65 => VTType::VT520,
            _ => return SeqResult::Invalid,
        };
        let eight_bit_controls = self.sequence.param(1) == 0;
        self.emit(Command::SelectConformanceLevel {
            level,
            eight_bit_controls,
        })
    }

    fn request_mode(&mut self, ansi: bool) -> SeqResult {
        let code = self.sequence.param(0);
        match mode_from_code(code, ansi) {
            Some(mode) => self.emit(Command::RequestMode(mode)),
            None => SeqResult::Unsupported,
        }
    }

    fn set_modes_ansi(&mut self, enable: bool) -> SeqResult {
        let mut result = SeqResult::Unsupported;
        for i in 0..self.sequence.parameter_count().max(1) {
            result = match mode_from_code(self.sequence.param(i), true) {
                Some(mode) => self.emit(Command::SetMode { mode, enable }),
                None => result,
            };
        }
        result
    }

    fn set_modes_dec(&mut self, enable: bool) -> SeqResult {
        let mut result = SeqResult::Unsupported;
        for i in 0..self.sequence.parameter_count().max(1) {
            result = self.set_mode_dec(self.sequence.param(i), enable, result);
        }
        result
    }

    fn set_mode_dec(&mut self, code: i32, enable: bool, prior: SeqResult) -> SeqResult {
        let send_mouse = |protocol| Command::SendMouseEvents {
            protocol,
            enable,
        };
        match code {
            9 => self.emit(send_mouse(MouseProtocol::X10)),
            1000 => self.emit(send_mouse(MouseProtocol::NormalTracking)),
            1002 => self.emit(send_mouse(MouseProtocol::ButtonTracking)),
            1003 => self.emit(send_mouse(MouseProtocol::AnyEventTracking)),
            1048 => {
                if enable {
                    self.emit(Command::SaveCursor)
                } else {
                    self.emit(Command::RestoreCursor)
                }
            }
            1049 => {
                if enable {
                    self.emit(Command::SaveCursor);
                    self.emit(Command::SetMode {
                        mode: Mode::UseAlternateScreen,
                        enable: true,
                    });
                    self.emit(Command::ClearScreen)
                } else {
                    self.emit(Command::SetMode {
                        mode: Mode::UseAlternateScreen,
                        enable: false,
                    });
                    self.emit(Command::RestoreCursor)
                }
            }
            _ => match mode_from_code(code, false) {
                Some(mode) => self.emit(Command::SetMode { mode, enable }),
                None => prior,
            },
        }
    }

    // ---- SGR -------------------------------------------------------------

    fn select_graphics_rendition(&mut self) -> SeqResult {
        if self.sequence.parameter_count() == 0 {
            return self.emit(Command::SetGraphicsRendition(GraphicsRendition::Reset));
        }

        let mut i = 0;
        while i < self.sequence.parameter_count() {
            use GraphicsRendition::*;
            let emit_sgr = |builder: &mut Self, r| {
                builder.emit(Command::SetGraphicsRendition(r));
            };
            match self.sequence.param(i) {
                0 => emit_sgr(self, Reset),
                1 => emit_sgr(self, Bold),
                2 => emit_sgr(self, Faint),
                3 => emit_sgr(self, Italic),
                4 => {
                    let rendition = match (self.sequence.subparam_count(i) == 1)
                        .then(|| self.sequence.subparam(i, 0))
                    {
                        Some(0) => NoUnderline,
                        Some(2) => DoublyUnderlined,
                        Some(3) => CurlyUnderlined,
                        Some(4) => DottedUnderline,
                        Some(5) => DashedUnderline,
                        _ => Underline,
                    };
                    emit_sgr(self, rendition);
                }
                5 => emit_sgr(self, Blinking),
                7 => emit_sgr(self, Inverse),
                8 => emit_sgr(self, Hidden),
                9 => emit_sgr(self, CrossedOut),
                21 => emit_sgr(self, DoublyUnderlined),
                22 => emit_sgr(self, Normal),
                23 => emit_sgr(self, NoItalic),
                24 => emit_sgr(self, NoUnderline),
                25 => emit_sgr(self, NoBlinking),
                27 => emit_sgr(self, NoInverse),
                28 => emit_sgr(self, NoHidden),
                29 => emit_sgr(self, NoCrossedOut),
                p @ 30..=37 => {
                    let color = Color::Indexed((p - 30) as u8);
                    self.emit(Command::SetForegroundColor(color));
                }
                38 => {
                    i = self.extended_color(i, Command::SetForegroundColor);
                    continue;
                }
                39 => {
                    self.emit(Command::SetForegroundColor(Color::Default));
                }
                p @ 40..=47 => {
                    let color = Color::Indexed((p - 40) as u8);
                    self.emit(Command::SetBackgroundColor(color));
                }
                48 => {
                    i = self.extended_color(i, Command::SetBackgroundColor);
                    continue;
                }
                49 => {
                    self.emit(Command::SetBackgroundColor(Color::Default));
                }
                51 => emit_sgr(self, Framed),
                52 => emit_sgr(self, Encircled),
                53 => emit_sgr(self, Overline),
                54 => emit_sgr(self, NoFramed),
                55 => emit_sgr(self, NoOverline),
                58 => {
                    i = self.extended_color(i, Command::SetUnderlineColor);
                    continue;
                }
                p @ 90..=97 => {
                    let color = Color::Bright((p - 90) as u8);
                    self.emit(Command::SetForegroundColor(color));
                }
                p @ 100..=107 => {
                    let color = Color::Bright((p - 100) as u8);
                    self.emit(Command::SetBackgroundColor(color));
                }
                other => log::trace!("ignoring unknown SGR parameter {other}"),
            }
            i += 1;
        }
        SeqResult::Ok
    }

    /// Parse an extended color at group `i` (SGR 38/48/58), in either the
    /// `;2;r;g;b` / `;5;n` or the `:2::r:g:b` / `:5:n` form. Returns the
    /// index of the next unconsumed group.
    fn extended_color(&mut self, i: usize, wrap: fn(Color) -> Command) -> usize {
        let subs = self.sequence.subparam_count(i);

        if subs >= 1 {
            let color = match self.sequence.subparam(i, 0) {
                5 if subs >= 2 => Some(Color::Indexed(clamp_u8(self.sequence.subparam(i, 1)))),
                // 38:2:r:g:b and 38:2:<colorspace>:r:g:b
                2 if subs == 4 => Some(Color::Rgb(RgbColor::new(
                    clamp_u8(self.sequence.subparam(i, 1)),
                    clamp_u8(self.sequence.subparam(i, 2)),
                    clamp_u8(self.sequence.subparam(i, 3)),
                ))),
                2 if subs >= 5 => Some(Color::Rgb(RgbColor::new(
                    clamp_u8(self.sequence.subparam(i, 2)),
                    clamp_u8(self.sequence.subparam(i, 3)),
                    clamp_u8(self.sequence.subparam(i, 4)),
                ))),
                _ => None,
            };
            if let Some(color) = color {
                self.emit(wrap(color));
            } else {
                log::trace!("invalid extended color in {}", self.sequence);
            }
            return i + 1;
        }

        match self.sequence.param(i + 1) {
            5 if self.sequence.parameter_count() > i + 2 => {
                let color = Color::Indexed(clamp_u8(self.sequence.param(i + 2)));
                self.emit(wrap(color));
                i + 3
            }
            2 if self.sequence.parameter_count() > i + 4 => {
                let color = Color::Rgb(RgbColor::new(
                    clamp_u8(self.sequence.param(i + 2)),
                    clamp_u8(self.sequence.param(i + 3)),
                    clamp_u8(self.sequence.param(i + 4)),
                ));
                self.emit(wrap(color));
                i + 5
            }
            _ => {
                log::trace!("invalid extended color in {}", self.sequence);
                i + 2
            }
        }
    }

    fn window_manipulation(&mut self) -> SeqResult {
        match self.sequence.param(0) {
            4 if self.sequence.parameter_count() == 3 => self.emit(Command::ResizeWindow {
                width: self.sequence.param(2),
                height: self.sequence.param(1),
                unit: ResizeUnit::Pixels,
            }),
            8 if self.sequence.parameter_count() == 3 => self.emit(Command::ResizeWindow {
                width: self.sequence.param(2),
                height: self.sequence.param(1),
                unit: ResizeUnit::Characters,
            }),
            22 => self.emit(Command::SaveWindowTitle),
            23 => self.emit(Command::RestoreWindowTitle),
            _ => SeqResult::Unsupported,
        }
    }

    // ---- OSC -------------------------------------------------------------

    fn dispatch_osc(&mut self) -> SeqResult {
        let data = self.sequence.data_str().into_owned();
        let (code, rest) = split_osc_code(&data);

        match code {
            Some(0) => {
                self.emit(Command::ChangeIconTitle(rest.to_string()));
                self.emit(Command::ChangeWindowTitle(rest.to_string()))
            }
            Some(1) => self.emit(Command::ChangeIconTitle(rest.to_string())),
            Some(2) => self.emit(Command::ChangeWindowTitle(rest.to_string())),
            Some(8) => self.hyperlink(rest),
            Some(code @ 10..=14) => self.dynamic_color(code as u16, rest),
            Some(52) => self.clipboard(rest),
            Some(code @ 110..=114) => {
                match DynamicColorName::from_reset_code(code as u16) {
                    Some(name) => self.emit(Command::ResetDynamicColor(name)),
                    None => SeqResult::Invalid,
                }
            }
            Some(777) => self.notify(rest),
            _ => SeqResult::Unsupported,
        }
    }

    /// OSC 8: `params ; uri` where params are `key=value` pairs separated
    /// by `:`. An empty uri closes the active hyperlink.
    fn hyperlink(&mut self, rest: &str) -> SeqResult {
        let Some((params, uri)) = rest.split_once(';') else {
            return SeqResult::Invalid;
        };
        let id = params
            .split(':')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value.to_string())
            .unwrap_or_default();
        self.emit(Command::Hyperlink {
            id,
            uri: uri.to_string(),
        })
    }

    fn dynamic_color(&mut self, code: u16, rest: &str) -> SeqResult {
        let Some(name) = DynamicColorName::from_set_code(code) else {
            return SeqResult::Invalid;
        };
        if rest == "?" {
            self.emit(Command::RequestDynamicColor(name))
        } else if let Some(color) = RgbColor::parse(rest) {
            self.emit(Command::SetDynamicColor { name, color })
        } else {
            SeqResult::Invalid
        }
    }

    /// OSC 52: `c ; base64-data`. Only setting the clipboard is supported.
    fn clipboard(&mut self, rest: &str) -> SeqResult {
        let Some((selection, payload)) = rest.split_once(';') else {
            return SeqResult::Invalid;
        };
        if selection != "c" {
            return SeqResult::Unsupported;
        }
        match BASE64.decode(payload) {
            Ok(decoded) => {
                let text = String::from_utf8_lossy(&decoded).into_owned();
                self.emit(Command::CopyToClipboard(text))
            }
            Err(_) => SeqResult::Invalid,
        }
    }

    fn notify(&mut self, rest: &str) -> SeqResult {
        let mut parts = rest.splitn(3, ';');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("notify"), Some(title), Some(body)) => self.emit(Command::Notify {
                title: title.to_string(),
                body: body.to_string(),
            }),
            _ => SeqResult::Unsupported,
        }
    }

    // ---- DCS -------------------------------------------------------------

    fn dispatch_dcs(&mut self) -> SeqResult {
        if self.sequence.intermediates == [b'$'] && self.sequence.final_byte == b'q' {
            self.request_status_string()
        } else {
            SeqResult::Unsupported
        }
    }

    fn request_status_string(&mut self) -> SeqResult {
        let target = match self.sequence.data_str().as_ref() {
            "m" => StatusTarget::GraphicsRendition,
            "\"p" => StatusTarget::ConformanceLevel,
            " q" => StatusTarget::CursorStyle,
            "\"q" => StatusTarget::ProtectedAttribute,
            "r" => StatusTarget::TopBottomMargin,
            "s" => StatusTarget::LeftRightMargin,
            "t" => StatusTarget::LinesPerPage,
            "$|" => StatusTarget::ColumnsPerPage,
            "*|" => StatusTarget::LinesPerScreen,
            _ => return SeqResult::Invalid,
        };
        self.emit(Command::RequestStatusString(target))
    }
}

impl parser::Handler for CommandBuilder {
    fn print(&mut self, ch: char) {
        self.commands.push(Command::AppendChar(ch));
    }

    fn execute(&mut self, control: u8) {
        match control {
            0x07 => self.commands.push(Command::Bell),
            0x08 => self.commands.push(Command::Backspace),
            0x09 => self.commands.push(Command::MoveCursorToNextTab),
            0x0A => self.commands.push(Command::Linefeed),
            // VT and FF behave like IND, following xterm.
            0x0B | 0x0C => self.commands.push(Command::Index),
            0x0D => self.commands.push(Command::MoveCursorToBeginOfLine),
            // 8-bit C1 controls.
            0x84 => self.commands.push(Command::Index),
            0x85 => self.commands.push(Command::CursorNextLine(1)),
            0x88 => self.commands.push(Command::HorizontalTabSet),
            0x8D => self.commands.push(Command::ReverseIndex),
            0x8E => self
                .commands
                .push(Command::SingleShiftSelect(CharsetTable::G2)),
            0x8F => self
                .commands
                .push(Command::SingleShiftSelect(CharsetTable::G3)),
            other => log::trace!("ignoring control 0x{other:02x}"),
        }
    }

    fn clear(&mut self) {
        self.sequence.clear();
    }

    fn collect(&mut self, byte: u8) {
        if (0x3C..=0x3F).contains(&byte) {
            self.sequence.leader = byte;
        } else if self.sequence.intermediates.len() < 2 {
            self.sequence.intermediates.push(byte);
        }
    }

    fn param(&mut self, byte: u8) {
        self.sequence.push_param_byte(byte);
    }

    fn esc_dispatch(&mut self, final_byte: u8) {
        self.sequence.category = FunctionCategory::Esc;
        self.sequence.final_byte = final_byte;
        let result = self.dispatch_esc();
        self.settle(result);
    }

    fn csi_dispatch(&mut self, final_byte: u8) {
        self.sequence.category = FunctionCategory::Csi;
        self.sequence.final_byte = final_byte;
        let result = self.dispatch_csi();
        self.settle(result);
    }

    fn osc_start(&mut self) {
        self.sequence.clear();
        self.sequence.category = FunctionCategory::Osc;
    }

    fn osc_put(&mut self, byte: u8) {
        self.sequence.data.push(byte);
    }

    fn osc_end(&mut self) {
        let result = self.dispatch_osc();
        self.settle(result);
        self.sequence.clear();
    }

    fn dcs_hook(&mut self, final_byte: u8) {
        self.sequence.category = FunctionCategory::Dcs;
        self.sequence.final_byte = final_byte;
        self.sequence.data.clear();
    }

    fn dcs_put(&mut self, byte: u8) {
        self.sequence.data.push(byte);
    }

    fn dcs_unhook(&mut self) {
        let result = self.dispatch_dcs();
        self.settle(result);
        self.sequence.clear();
    }
}

/// Resolve a numeric mode parameter to a [`Mode`].
fn mode_from_code(code: i32, ansi: bool) -> Option<Mode> {
    if ansi {
        match code {
            2 => Some(Mode::KeyboardAction),
            4 => Some(Mode::Insert),
            12 => Some(Mode::SendReceive),
            20 => Some(Mode::AutomaticNewLine),
            _ => None,
        }
    } else {
        match code {
            1 => Some(Mode::UseApplicationCursorKeys),
            2 => Some(Mode::DesignateCharsetUsAscii),
            3 => Some(Mode::Columns132),
            4 => Some(Mode::SmoothScroll),
            5 => Some(Mode::ReverseVideo),
            6 => Some(Mode::Origin),
            7 => Some(Mode::AutoWrap),
            10 => Some(Mode::ShowToolbar),
            12 => Some(Mode::BlinkingCursor),
            19 => Some(Mode::PrinterExtend),
            25 => Some(Mode::VisibleCursor),
            30 => Some(Mode::ShowScrollbar),
            47 | 1047 => Some(Mode::UseAlternateScreen),
            69 => Some(Mode::LeftRightMargin),
            1004 => Some(Mode::FocusTracking),
            1005 => Some(Mode::MouseExtended),
            1006 => Some(Mode::MouseSgr),
            1007 => Some(Mode::MouseAlternateScroll),
            1015 => Some(Mode::MouseUrxvt),
            2004 => Some(Mode::BracketedPaste),
            2026 => Some(Mode::BatchedRendering),
            _ => None,
        }
    }
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Split an OSC payload into its numeric code and the remaining data.
fn split_osc_code(data: &str) -> (Option<i64>, &str) {
    let digits = data.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, data);
    }
    let code = data[..digits].parse().ok();
    let rest = &data[digits..];
    (code, rest.strip_prefix(';').unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(input: &[u8]) -> Vec<Command> {
        let mut parser = Parser::new();
        let mut builder = CommandBuilder::new();
        parser.parse(input, &mut builder);
        builder.take_commands()
    }

    #[test]
    fn cup_with_defaults() {
        assert_eq!(
            build(b"\x1b[H"),
            vec![Command::MoveCursorTo { row: 1, column: 1 }]
        );
        assert_eq!(
            build(b"\x1b[3;4H"),
            vec![Command::MoveCursorTo { row: 3, column: 4 }]
        );
        assert_eq!(
            build(b"\x1b[;7f"),
            vec![Command::MoveCursorTo { row: 1, column: 7 }]
        );
    }

    #[test]
    fn cursor_visibility_mode() {
        assert_eq!(
            build(b"\x1b[?25h"),
            vec![Command::SetMode {
                mode: Mode::VisibleCursor,
                enable: true
            }]
        );
        assert_eq!(
            build(b"\x1b[?25l"),
            vec![Command::SetMode {
                mode: Mode::VisibleCursor,
                enable: false
            }]
        );
    }

    #[test]
    fn sgr_truecolor_both_forms() {
        let expected = vec![Command::SetForegroundColor(Color::Rgb(RgbColor::new(
            10, 20, 30,
        )))];
        assert_eq!(build(b"\x1b[38;2;10;20;30m"), expected);
        assert_eq!(build(b"\x1b[38:2::10:20:30m"), expected);
        assert_eq!(build(b"\x1b[38:2:10:20:30m"), expected);
    }

    #[test]
    fn sgr_256_color_both_forms() {
        let expected = vec![Command::SetBackgroundColor(Color::Indexed(160))];
        assert_eq!(build(b"\x1b[48;5;160m"), expected);
        assert_eq!(build(b"\x1b[48:5:160m"), expected);
    }

    #[test]
    fn sgr_mixed_list() {
        assert_eq!(
            build(b"\x1b[1;31;4m"),
            vec![
                Command::SetGraphicsRendition(GraphicsRendition::Bold),
                Command::SetForegroundColor(Color::Indexed(1)),
                Command::SetGraphicsRendition(GraphicsRendition::Underline),
            ]
        );
    }

    #[test]
    fn sgr_underline_styles() {
        assert_eq!(
            build(b"\x1b[4:3m"),
            vec![Command::SetGraphicsRendition(
                GraphicsRendition::CurlyUnderlined
            )]
        );
    }

    #[test]
    fn osc_hyperlink() {
        assert_eq!(
            build(b"\x1b]8;id=x;https://example.com\x1b\\"),
            vec![Command::Hyperlink {
                id: "x".into(),
                uri: "https://example.com".into()
            }]
        );
        assert_eq!(
            build(b"\x1b]8;;\x1b\\"),
            vec![Command::Hyperlink {
                id: String::new(),
                uri: String::new()
            }]
        );
    }

    #[test]
    fn osc_clipboard() {
        assert_eq!(
            build(b"\x1b]52;c;SGVsbG8=\x07"),
            vec![Command::CopyToClipboard("Hello".into())]
        );
        // Broken base64 is invalid and emits nothing.
        assert_eq!(build(b"\x1b]52;c;@@@\x07"), vec![]);
    }

    #[test]
    fn osc_titles() {
        assert_eq!(
            build(b"\x1b]2;hello\x07"),
            vec![Command::ChangeWindowTitle("hello".into())]
        );
        assert_eq!(
            build(b"\x1b]0;t\x07"),
            vec![
                Command::ChangeIconTitle("t".into()),
                Command::ChangeWindowTitle("t".into())
            ]
        );
    }

    #[test]
    fn osc_dynamic_colors() {
        assert_eq!(
            build(b"\x1b]10;?\x07"),
            vec![Command::RequestDynamicColor(
                DynamicColorName::DefaultForegroundColor
            )]
        );
        assert_eq!(
            build(b"\x1b]11;#102030\x07"),
            vec![Command::SetDynamicColor {
                name: DynamicColorName::DefaultBackgroundColor,
                color: RgbColor::new(0x10, 0x20, 0x30)
            }]
        );
        assert_eq!(
            build(b"\x1b]111;\x07"),
            vec![Command::ResetDynamicColor(
                DynamicColorName::DefaultBackgroundColor
            )]
        );
    }

    #[test]
    fn osc_notify() {
        assert_eq!(
            build(b"\x1b]777;notify;Title;Body text\x1b\\"),
            vec![Command::Notify {
                title: "Title".into(),
                body: "Body text".into()
            }]
        );
    }

    #[test]
    fn alternate_screen_1049_compound() {
        assert_eq!(
            build(b"\x1b[?1049h"),
            vec![
                Command::SaveCursor,
                Command::SetMode {
                    mode: Mode::UseAlternateScreen,
                    enable: true
                },
                Command::ClearScreen,
            ]
        );
        assert_eq!(
            build(b"\x1b[?1049l"),
            vec![
                Command::SetMode {
                    mode: Mode::UseAlternateScreen,
                    enable: false
                },
                Command::RestoreCursor,
            ]
        );
    }

    #[test]
    fn mouse_protocol_modes() {
        assert_eq!(
            build(b"\x1b[?1002h"),
            vec![Command::SendMouseEvents {
                protocol: MouseProtocol::ButtonTracking,
                enable: true
            }]
        );
    }

    #[test]
    fn decstbm_with_defaults() {
        assert_eq!(
            build(b"\x1b[2;5r"),
            vec![Command::SetTopBottomMargin {
                top: Some(2),
                bottom: Some(5)
            }]
        );
        assert_eq!(
            build(b"\x1b[r"),
            vec![Command::SetTopBottomMargin {
                top: None,
                bottom: None
            }]
        );
    }

    #[test]
    fn ansi_save_restore_vs_margins() {
        assert_eq!(build(b"\x1b[s"), vec![Command::SaveCursor]);
        assert_eq!(
            build(b"\x1b[1;40s"),
            vec![Command::SetLeftRightMargin {
                left: Some(1),
                right: Some(40)
            }]
        );
        assert_eq!(build(b"\x1b[u"), vec![Command::RestoreCursor]);
    }

    #[test]
    fn decrqss_sgr() {
        assert_eq!(
            build(b"\x1bP$qm\x1b\\"),
            vec![Command::RequestStatusString(
                StatusTarget::GraphicsRendition
            )]
        );
    }

    #[test]
    fn control_functions() {
        assert_eq!(
            build(b"a\r\n"),
            vec![
                Command::AppendChar('a'),
                Command::MoveCursorToBeginOfLine,
                Command::Linefeed,
            ]
        );
    }

    #[test]
    fn unsupported_sequences_emit_nothing() {
        assert_eq!(build(b"\x1b[?9999h"), vec![]);
        assert_eq!(build(b"\x1b]99999;x\x07"), vec![]);
    }

    #[test]
    fn set_mark() {
        assert_eq!(build(b"\x1b[>M"), vec![Command::SetMark]);
    }

    #[test]
    fn ed_with_multiple_params() {
        assert_eq!(
            build(b"\x1b[0;3J"),
            vec![Command::ClearToEndOfScreen, Command::ClearScrollbackBuffer]
        );
    }
}
