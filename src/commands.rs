//! The normalized VT command algebra.
//!
//! Every escape sequence the builder recognizes is translated into one of
//! the `Command` variants below. Executors apply commands with a single
//! exhaustive `match`, so adding a variant is caught at compile time in
//! every executor.

use crate::color::{Color, RgbColor};
use serde::{Deserialize, Serialize};

/// Screen coordinate, 1-based and inclusive.
///
/// Rows `1..=rows` address the visible screen. Rows `<= 0` address the
/// scrollback: row 0 is the newest history line, -1 the one before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Coordinate {
    pub row: i32,
    pub column: i32,
}

impl Coordinate {
    pub const fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }
}

impl PartialOrd for Coordinate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coordinate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.row, self.column).cmp(&(other.row, other.column))
    }
}

/// Character style change requested by a single SGR parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphicsRendition {
    /// Reset style and colors.
    Reset,
    Bold,
    Faint,
    Italic,
    Underline,
    Blinking,
    Inverse,
    Hidden,
    CrossedOut,
    DoublyUnderlined,
    CurlyUnderlined,
    DottedUnderline,
    DashedUnderline,
    Framed,
    Encircled,
    Overline,
    /// Neither bold nor faint (SGR 22).
    Normal,
    NoItalic,
    NoUnderline,
    NoBlinking,
    NoInverse,
    NoHidden,
    NoCrossedOut,
    NoFramed,
    NoOverline,
}

impl GraphicsRendition {
    /// The single-parameter SGR code realizing this rendition. The styled
    /// underline variants have no single-parameter form; they degrade to
    /// plain underline here and emitters use the `4:x` sub-parameter form.
    pub fn sgr_code(self) -> u16 {
        use GraphicsRendition::*;
        match self {
            Reset => 0,
            Bold => 1,
            Faint => 2,
            Italic => 3,
            Underline | CurlyUnderlined | DottedUnderline | DashedUnderline => 4,
            Blinking => 5,
            Inverse => 7,
            Hidden => 8,
            CrossedOut => 9,
            DoublyUnderlined => 21,
            Normal => 22,
            NoItalic => 23,
            NoUnderline => 24,
            NoBlinking => 25,
            NoInverse => 27,
            NoHidden => 28,
            NoCrossedOut => 29,
            Framed => 51,
            Encircled => 52,
            Overline => 53,
            NoFramed => 54,
            NoOverline => 55,
        }
    }
}

/// ANSI and DEC-private terminal modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    // ANSI modes
    KeyboardAction,
    Insert,
    SendReceive,
    AutomaticNewLine,
    // DEC private modes
    UseApplicationCursorKeys,
    DesignateCharsetUsAscii,
    Columns132,
    SmoothScroll,
    ReverseVideo,
    /// DECOM. Cursor addressing becomes relative to the margins and the
    /// cursor cannot leave them.
    Origin,
    /// DECAWM. Characters written past the right border wrap to the next
    /// line instead of overwriting the last column.
    AutoWrap,
    PrinterExtend,
    /// DECLRMM. Enables DECSLRM left/right margins.
    LeftRightMargin,
    ShowToolbar,
    BlinkingCursor,
    /// DECTCEM.
    VisibleCursor,
    ShowScrollbar,
    UseAlternateScreen,
    BracketedPaste,
    FocusTracking,
    /// Mode 1005, UTF-8 mouse coordinate encoding.
    MouseExtended,
    /// Mode 1006, SGR mouse encoding.
    MouseSgr,
    /// Mode 1015, urxvt mouse encoding.
    MouseUrxvt,
    /// Mode 1007, wheel events become cursor keys in the alternate screen.
    MouseAlternateScroll,
    /// Mode 2026, synchronized output.
    BatchedRendering,
}

impl Mode {
    /// Whether this is an ANSI mode (`CSI Pm h`) as opposed to a DEC
    /// private mode (`CSI ? Pm h`).
    pub fn is_ansi(self) -> bool {
        matches!(
            self,
            Mode::KeyboardAction | Mode::Insert | Mode::SendReceive | Mode::AutomaticNewLine
        )
    }

    /// The numeric parameter selecting this mode on the wire.
    pub fn code(self) -> u16 {
        use Mode::*;
        match self {
            KeyboardAction => 2,
            Insert => 4,
            SendReceive => 12,
            AutomaticNewLine => 20,
            UseApplicationCursorKeys => 1,
            DesignateCharsetUsAscii => 2,
            Columns132 => 3,
            SmoothScroll => 4,
            ReverseVideo => 5,
            Origin => 6,
            AutoWrap => 7,
            ShowToolbar => 10,
            BlinkingCursor => 12,
            PrinterExtend => 19,
            VisibleCursor => 25,
            ShowScrollbar => 30,
            UseAlternateScreen => 47,
            LeftRightMargin => 69,
            FocusTracking => 1004,
            MouseExtended => 1005,
            MouseSgr => 1006,
            MouseAlternateScroll => 1007,
            MouseUrxvt => 1015,
            BracketedPaste => 2004,
            BatchedRendering => 2026,
        }
    }
}

/// Mutually exclusive mouse reporting protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseProtocol {
    /// Mode 9. Button press only.
    X10,
    /// Mode 1000. Press and release.
    NormalTracking,
    /// Mode 1002. Press, release and drag motion.
    ButtonTracking,
    /// Mode 1003. All motion.
    AnyEventTracking,
}

impl MouseProtocol {
    pub fn code(self) -> u16 {
        match self {
            MouseProtocol::X10 => 9,
            MouseProtocol::NormalTracking => 1000,
            MouseProtocol::ButtonTracking => 1002,
            MouseProtocol::AnyEventTracking => 1003,
        }
    }
}

/// The four designable charset slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharsetTable {
    G0 = 0,
    G1 = 1,
    G2 = 2,
    G3 = 3,
}

/// Character sets this terminal can designate into a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CharsetId {
    /// DEC Special Character and Line Drawing Set.
    Special,
    British,
    German,
    #[default]
    UsAscii,
}

/// Cursor blink state selected by DECSCUSR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorDisplay {
    Steady,
    Blink,
}

/// Cursor shape selected by DECSCUSR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorShape {
    Block,
    Underscore,
    Bar,
}

/// Colors that OSC 10..14 / 110..114 can set, query and reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DynamicColorName {
    DefaultForegroundColor,
    DefaultBackgroundColor,
    TextCursorColor,
    MouseForegroundColor,
    MouseBackgroundColor,
}

impl DynamicColorName {
    /// OSC code that sets or queries this color.
    pub fn set_code(self) -> u16 {
        match self {
            DynamicColorName::DefaultForegroundColor => 10,
            DynamicColorName::DefaultBackgroundColor => 11,
            DynamicColorName::TextCursorColor => 12,
            DynamicColorName::MouseForegroundColor => 13,
            DynamicColorName::MouseBackgroundColor => 14,
        }
    }

    /// OSC code that resets this color to its configured default.
    pub fn reset_code(self) -> u16 {
        self.set_code() + 100
    }

    pub fn from_set_code(code: u16) -> Option<Self> {
        match code {
            10 => Some(DynamicColorName::DefaultForegroundColor),
            11 => Some(DynamicColorName::DefaultBackgroundColor),
            12 => Some(DynamicColorName::TextCursorColor),
            13 => Some(DynamicColorName::MouseForegroundColor),
            14 => Some(DynamicColorName::MouseBackgroundColor),
            _ => None,
        }
    }

    pub fn from_reset_code(code: u16) -> Option<Self> {
        if code >= 100 {
            Self::from_set_code(code - 100)
        } else {
            None
        }
    }
}

/// VT conformance levels, as selected by DECSCL and reported by DA1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VTType {
    VT100,
    VT220,
    VT240,
    VT320,
    VT330,
    VT340,
    VT420,
    VT510,
    VT520,
    VT525,
}

impl VTType {
    /// The architectural class id reported in the primary DA response.
    pub fn da1_id(self) -> u16 {
        match self {
            VTType::VT100 => 1,
            VTType::VT220 | VTType::VT240 => 62,
            VTType::VT320 | VTType::VT330 | VTType::VT340 => 63,
            VTType::VT420 => 64,
            VTType::VT510 | VTType::VT520 | VTType::VT525 => 65,
        }
    }
}

/// TBC parameter: which tab stops to clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TabClear {
    AllTabs,
    UnderCursor,
}

/// Unit of an XTWINOPS resize request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeUnit {
    Characters,
    Pixels,
}

/// DECRQSS status string targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTarget {
    GraphicsRendition,
    ConformanceLevel,
    CursorStyle,
    ProtectedAttribute,
    TopBottomMargin,
    LeftRightMargin,
    LinesPerPage,
    ColumnsPerPage,
    LinesPerScreen,
}

/// A normalized VT operation.
///
/// Numeric payloads are the (defaulted) sequence parameters; coordinates
/// are 1-based.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    AppendChar(char),
    ApplicationKeypadMode(bool),
    BackIndex,
    Backspace,
    Bell,
    ChangeIconTitle(String),
    ChangeWindowTitle(String),
    ClearLine,
    ClearScreen,
    ClearScrollbackBuffer,
    ClearToBeginOfLine,
    ClearToBeginOfScreen,
    ClearToEndOfLine,
    ClearToEndOfScreen,
    CopyToClipboard(String),
    CursorBackwardTab(i32),
    CursorNextLine(i32),
    CursorPreviousLine(i32),
    DeleteCharacters(i32),
    DeleteColumns(i32),
    DeleteLines(i32),
    DesignateCharset {
        table: CharsetTable,
        charset: CharsetId,
    },
    DeviceStatusReport,
    EraseCharacters(i32),
    ForwardIndex,
    FullReset,
    HorizontalPositionAbsolute(i32),
    HorizontalPositionRelative(i32),
    HorizontalTabClear(TabClear),
    HorizontalTabSet,
    Hyperlink {
        id: String,
        uri: String,
    },
    Index,
    InsertCharacters(i32),
    InsertColumns(i32),
    InsertLines(i32),
    Linefeed,
    MoveCursorBackward(i32),
    MoveCursorDown(i32),
    MoveCursorForward(i32),
    MoveCursorTo {
        row: i32,
        column: i32,
    },
    MoveCursorToBeginOfLine,
    MoveCursorToColumn(i32),
    MoveCursorToLine(i32),
    MoveCursorToNextTab,
    MoveCursorUp(i32),
    Notify {
        title: String,
        body: String,
    },
    ReportCursorPosition,
    ReportExtendedCursorPosition,
    RequestDynamicColor(DynamicColorName),
    RequestMode(Mode),
    RequestStatusString(StatusTarget),
    RequestTabStops,
    ResetDynamicColor(DynamicColorName),
    ResizeWindow {
        width: i32,
        height: i32,
        unit: ResizeUnit,
    },
    RestoreCursor,
    RestoreWindowTitle,
    ReverseIndex,
    SaveCursor,
    SaveWindowTitle,
    ScreenAlignmentPattern,
    ScrollDown(i32),
    ScrollUp(i32),
    SelectConformanceLevel {
        level: VTType,
        eight_bit_controls: bool,
    },
    SendDeviceAttributes,
    SendMouseEvents {
        protocol: MouseProtocol,
        enable: bool,
    },
    SendTerminalId,
    SetBackgroundColor(Color),
    SetCursorStyle {
        display: CursorDisplay,
        shape: CursorShape,
    },
    SetDynamicColor {
        name: DynamicColorName,
        color: RgbColor,
    },
    SetForegroundColor(Color),
    SetGraphicsRendition(GraphicsRendition),
    SetLeftRightMargin {
        left: Option<i32>,
        right: Option<i32>,
    },
    SetMark,
    SetMode {
        mode: Mode,
        enable: bool,
    },
    SetTopBottomMargin {
        top: Option<i32>,
        bottom: Option<i32>,
    },
    SetUnderlineColor(Color),
    SingleShiftSelect(CharsetTable),
    SoftTerminalReset,
}

impl Command {
    /// Whether the synchronized executor (mode 2026) must queue this
    /// command. Replies, host notifications and mode plumbing always pass
    /// through so that queries stay responsive and the end-sync sequence
    /// itself can terminate the batch.
    pub fn affects_drawing(&self) -> bool {
        use Command::*;
        !matches!(
            self,
            Bell | ChangeIconTitle(_)
                | ChangeWindowTitle(_)
                | CopyToClipboard(_)
                | DeviceStatusReport
                | Notify { .. }
                | ReportCursorPosition
                | ReportExtendedCursorPosition
                | RequestDynamicColor(_)
                | RequestMode(_)
                | RequestStatusString(_)
                | RequestTabStops
                | RestoreWindowTitle
                | SaveWindowTitle
                | SelectConformanceLevel { .. }
                | SendDeviceAttributes
                | SendMouseEvents { .. }
                | SendTerminalId
                | SetMode { .. }
                | ApplicationKeypadMode(_)
                | SoftTerminalReset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes() {
        assert_eq!(Mode::VisibleCursor.code(), 25);
        assert_eq!(Mode::BracketedPaste.code(), 2004);
        assert_eq!(Mode::BatchedRendering.code(), 2026);
        assert!(Mode::Insert.is_ansi());
        assert!(!Mode::Origin.is_ansi());
    }

    #[test]
    fn dynamic_color_codes_roundtrip() {
        for name in [
            DynamicColorName::DefaultForegroundColor,
            DynamicColorName::DefaultBackgroundColor,
            DynamicColorName::TextCursorColor,
            DynamicColorName::MouseForegroundColor,
            DynamicColorName::MouseBackgroundColor,
        ] {
            assert_eq!(DynamicColorName::from_set_code(name.set_code()), Some(name));
            assert_eq!(
                DynamicColorName::from_reset_code(name.reset_code()),
                Some(name)
            );
        }
    }

    #[test]
    fn mode_set_passes_through_synchronized_queue() {
        assert!(!Command::SetMode {
            mode: Mode::BatchedRendering,
            enable: false
        }
        .affects_drawing());
        assert!(Command::AppendChar('x').affects_drawing());
        assert!(Command::ClearScreen.affects_drawing());
        assert!(!Command::ReportCursorPosition.affects_drawing());
    }
}
