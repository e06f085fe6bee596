//! Encodes user input events into host-bound byte sequences.
//!
//! Key and mouse encodings depend on the modes negotiated by the
//! application (cursor key mode, keypad mode, mouse protocol and
//! transport, bracketed paste). The screen signals mode changes through
//! [`crate::events::ScreenEvents`]; the host forwards them here.

use crate::commands::MouseProtocol;
use bitflags::bitflags;

bitflags! {
    /// Keyboard modifiers, encoded as `1 + bits` in CSI parameters.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 1;
        const ALT   = 2;
        const CTRL  = 4;
        const SUPER = 8;
    }
}

impl Modifiers {
    /// The xterm modifier parameter, or `None` when no modifier is held.
    pub fn encode(self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(1 + self.bits())
        }
    }
}

/// Keys with a VT encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key F1..=F12.
    F(u8),
    /// A numeric keypad key (`0`..`9`, `.`, `+`, `-`, `*`, `/`, `=`) or
    /// keypad Enter (`\r`), affected by DECKPAM.
    Keypad(char),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    /// Pointer motion; reported only by the button-event and any-event
    /// protocols.
    Motion,
}

/// A mouse event in 1-based cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub kind: MouseEventKind,
    pub column: u16,
    pub row: u16,
    pub modifiers: Modifiers,
}

/// How mouse coordinates travel on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseTransport {
    /// Classic X10 single-byte coordinates, limited to column/row 223.
    #[default]
    Default,
    /// Mode 1005: coordinates as UTF-8 codepoints.
    Extended,
    /// Mode 1006: `CSI < b ; x ; y M/m`.
    Sgr,
    /// Mode 1015: `CSI b ; x ; y M`.
    Urxvt,
}

/// What wheel events turn into when no mouse protocol is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseWheelMode {
    /// Host scrolls the viewport itself.
    #[default]
    Default,
    NormalCursorKeys,
    ApplicationCursorKeys,
}

/// Stateful encoder of key, mouse and paste events.
#[derive(Debug, Default)]
pub struct InputEncoder {
    application_cursor_keys: bool,
    application_keypad: bool,
    bracketed_paste: bool,
    mouse_protocol: Option<MouseProtocol>,
    mouse_transport: MouseTransport,
    mouse_wheel_mode: MouseWheelMode,
    focus_events: bool,
}

impl InputEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_application_cursor_keys(&mut self, enable: bool) {
        self.application_cursor_keys = enable;
    }

    pub fn set_application_keypad(&mut self, enable: bool) {
        self.application_keypad = enable;
    }

    pub fn set_bracketed_paste(&mut self, enable: bool) {
        self.bracketed_paste = enable;
    }

    pub fn set_mouse_protocol(&mut self, protocol: MouseProtocol, enable: bool) {
        if enable {
            self.mouse_protocol = Some(protocol);
        } else if self.mouse_protocol == Some(protocol) {
            self.mouse_protocol = None;
        }
    }

    pub fn set_mouse_transport(&mut self, transport: MouseTransport) {
        self.mouse_transport = transport;
    }

    pub fn set_mouse_wheel_mode(&mut self, mode: MouseWheelMode) {
        self.mouse_wheel_mode = mode;
    }

    pub fn set_generate_focus_events(&mut self, enable: bool) {
        self.focus_events = enable;
    }

    // ---- keys -------------------------------------------------------------

    /// Encode a key press. Returns the bytes to write to the PTY; empty
    /// when the key has no encoding under the current modes.
    pub fn encode_key(&self, key: Key, modifiers: Modifiers) -> Vec<u8> {
        match key {
            Key::Char(ch) => self.encode_char(ch, modifiers),
            Key::Enter => vec![b'\r'],
            Key::Tab => {
                if modifiers.contains(Modifiers::SHIFT) {
                    b"\x1b[Z".to_vec()
                } else {
                    vec![b'\t']
                }
            }
            Key::Backspace => {
                if modifiers.contains(Modifiers::CTRL) {
                    vec![0x08]
                } else {
                    vec![0x7F]
                }
            }
            Key::Escape => vec![0x1B],
            Key::Up => self.cursor_key(b'A', modifiers),
            Key::Down => self.cursor_key(b'B', modifiers),
            Key::Right => self.cursor_key(b'C', modifiers),
            Key::Left => self.cursor_key(b'D', modifiers),
            Key::Home => self.cursor_key(b'H', modifiers),
            Key::End => self.cursor_key(b'F', modifiers),
            Key::Insert => tilde_key(2, modifiers),
            Key::Delete => tilde_key(3, modifiers),
            Key::PageUp => tilde_key(5, modifiers),
            Key::PageDown => tilde_key(6, modifiers),
            Key::F(n @ 1..=4) => {
                let final_byte = b'P' + (n - 1);
                match modifiers.encode() {
                    None => vec![0x1B, b'O', final_byte],
                    Some(modifier) => format!("\x1b[1;{}{}", modifier, final_byte as char)
                        .into_bytes(),
                }
            }
            Key::F(n @ 5..=12) => {
                let code = match n {
                    5 => 15,
                    6 => 17,
                    7 => 18,
                    8 => 19,
                    9 => 20,
                    10 => 21,
                    11 => 23,
                    _ => 24,
                };
                tilde_key(code, modifiers)
            }
            Key::F(_) => Vec::new(),
            Key::Keypad(ch) => self.encode_keypad(ch),
        }
    }

    /// Keypad keys send SS3 sequences in application keypad mode.
    fn encode_keypad(&self, ch: char) -> Vec<u8> {
        if !self.application_keypad {
            return if ch == '\r' {
                vec![b'\r']
            } else {
                ch.to_string().into_bytes()
            };
        }
        let code = match ch {
            '0'..='9' => b'p' + (ch as u8 - b'0'),
            '.' => b'n',
            '+' => b'k',
            '-' => b'm',
            '*' => b'j',
            '/' => b'o',
            '=' => b'X',
            '\r' => b'M',
            _ => return ch.to_string().into_bytes(),
        };
        vec![0x1B, b'O', code]
    }

    fn encode_char(&self, ch: char, modifiers: Modifiers) -> Vec<u8> {
        let mut bytes = Vec::new();
        if modifiers.contains(Modifiers::ALT) {
            bytes.push(0x1B);
        }
        if modifiers.contains(Modifiers::CTRL) {
            if let Some(control) = control_code(ch) {
                bytes.push(control);
                return bytes;
            }
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        bytes
    }

    fn cursor_key(&self, final_byte: u8, modifiers: Modifiers) -> Vec<u8> {
        match modifiers.encode() {
            Some(modifier) => format!("\x1b[1;{}{}", modifier, final_byte as char).into_bytes(),
            None if self.application_cursor_keys => vec![0x1B, b'O', final_byte],
            None => vec![0x1B, b'[', final_byte],
        }
    }

    // ---- mouse -------------------------------------------------------------

    /// Encode a mouse event per the active protocol and transport. Returns
    /// an empty vector when the event is not reported.
    pub fn encode_mouse(&self, event: MouseEvent) -> Vec<u8> {
        let is_wheel = matches!(event.button, MouseButton::WheelUp | MouseButton::WheelDown);

        let Some(protocol) = self.mouse_protocol else {
            // No protocol: wheel may still turn into cursor keys (alternate
            // scroll mode).
            if is_wheel && event.kind == MouseEventKind::Press {
                let up = event.button == MouseButton::WheelUp;
                return match self.mouse_wheel_mode {
                    MouseWheelMode::Default => Vec::new(),
                    MouseWheelMode::NormalCursorKeys => {
                        if up { b"\x1b[A".to_vec() } else { b"\x1b[B".to_vec() }
                    }
                    MouseWheelMode::ApplicationCursorKeys => {
                        if up { b"\x1bOA".to_vec() } else { b"\x1bOB".to_vec() }
                    }
                };
            }
            return Vec::new();
        };

        let reportable = match protocol {
            MouseProtocol::X10 => event.kind == MouseEventKind::Press,
            MouseProtocol::NormalTracking => event.kind != MouseEventKind::Motion,
            MouseProtocol::ButtonTracking | MouseProtocol::AnyEventTracking => true,
        };
        if !reportable {
            return Vec::new();
        }

        let mut code: u16 = match event.button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::WheelUp => 64,
            MouseButton::WheelDown => 65,
        };
        if event.kind == MouseEventKind::Motion {
            code += 32;
        }
        if event.modifiers.contains(Modifiers::SHIFT) {
            code += 4;
        }
        if event.modifiers.contains(Modifiers::ALT) {
            code += 8;
        }
        if event.modifiers.contains(Modifiers::CTRL) {
            code += 16;
        }

        match self.mouse_transport {
            MouseTransport::Sgr => {
                let suffix = if event.kind == MouseEventKind::Release {
                    'm'
                } else {
                    'M'
                };
                format!("\x1b[<{};{};{}{}", code, event.column, event.row, suffix).into_bytes()
            }
            MouseTransport::Urxvt => {
                let code = self.legacy_code(code, event.kind);
                format!("\x1b[{};{};{}M", code + 32, event.column, event.row).into_bytes()
            }
            MouseTransport::Default => {
                let code = self.legacy_code(code, event.kind);
                let clamp = |v: u16| (v.min(223) as u8) + 32;
                vec![
                    0x1B,
                    b'[',
                    b'M',
                    (code as u8) + 32,
                    clamp(event.column),
                    clamp(event.row),
                ]
            }
            MouseTransport::Extended => {
                let code = self.legacy_code(code, event.kind);
                let mut bytes = b"\x1b[M".to_vec();
                let mut push = |value: u16| {
                    let Some(ch) = char::from_u32(u32::from(value) + 32) else {
                        return;
                    };
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                };
                push(code);
                push(event.column);
                push(event.row);
                bytes
            }
        }
    }

    /// Legacy encodings cannot express which button was released.
    fn legacy_code(&self, code: u16, kind: MouseEventKind) -> u16 {
        if kind == MouseEventKind::Release {
            (code & !0b11) | 3
        } else {
            code
        }
    }

    // ---- paste and focus -----------------------------------------------------

    /// Encode pasted text, wrapped in bracketed-paste markers when the
    /// application asked for them. Newlines are normalized to CR.
    pub fn encode_paste(&self, text: &str) -> Vec<u8> {
        let normalized = text.replace("\r\n", "\r").replace('\n', "\r");
        if self.bracketed_paste {
            let mut bytes = b"\x1b[200~".to_vec();
            bytes.extend_from_slice(normalized.as_bytes());
            bytes.extend_from_slice(b"\x1b[201~");
            bytes
        } else {
            normalized.into_bytes()
        }
    }

    /// Focus change report (mode 1004), if enabled.
    pub fn encode_focus(&self, focused: bool) -> Vec<u8> {
        if self.focus_events {
            if focused {
                b"\x1b[I".to_vec()
            } else {
                b"\x1b[O".to_vec()
            }
        } else {
            Vec::new()
        }
    }
}

fn tilde_key(code: u16, modifiers: Modifiers) -> Vec<u8> {
    match modifiers.encode() {
        None => format!("\x1b[{code}~").into_bytes(),
        Some(modifier) => format!("\x1b[{code};{modifier}~").into_bytes(),
    }
}

/// The C0 byte produced by Ctrl plus a character, if any.
fn control_code(ch: char) -> Option<u8> {
    match ch {
        ' ' | '@' => Some(0x00),
        'a'..='z' => Some(ch as u8 & 0x1F),
        'A'..='Z' => Some(ch as u8 & 0x1F),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' => Some(0x1F),
        '?' => Some(0x7F),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(button: MouseButton, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            button,
            kind: MouseEventKind::Press,
            column,
            row,
            modifiers: Modifiers::empty(),
        }
    }

    #[test]
    fn plain_and_control_chars() {
        let encoder = InputEncoder::new();
        assert_eq!(encoder.encode_key(Key::Char('a'), Modifiers::empty()), b"a");
        assert_eq!(
            encoder.encode_key(Key::Char('c'), Modifiers::CTRL),
            vec![0x03]
        );
        assert_eq!(
            encoder.encode_key(Key::Char('x'), Modifiers::ALT),
            vec![0x1B, b'x']
        );
        assert_eq!(
            encoder.encode_key(Key::Char('ä'), Modifiers::empty()),
            "ä".as_bytes()
        );
    }

    #[test]
    fn cursor_keys_normal_and_application() {
        let mut encoder = InputEncoder::new();
        assert_eq!(encoder.encode_key(Key::Up, Modifiers::empty()), b"\x1b[A");
        encoder.set_application_cursor_keys(true);
        assert_eq!(encoder.encode_key(Key::Up, Modifiers::empty()), b"\x1bOA");
        // modifiers force the CSI form
        assert_eq!(
            encoder.encode_key(Key::Up, Modifiers::CTRL),
            b"\x1b[1;5A"
        );
    }

    #[test]
    fn editing_keys() {
        let encoder = InputEncoder::new();
        assert_eq!(
            encoder.encode_key(Key::PageUp, Modifiers::empty()),
            b"\x1b[5~"
        );
        assert_eq!(
            encoder.encode_key(Key::Delete, Modifiers::SHIFT),
            b"\x1b[3;2~"
        );
        assert_eq!(
            encoder.encode_key(Key::Tab, Modifiers::SHIFT),
            b"\x1b[Z"
        );
    }

    #[test]
    fn function_keys() {
        let encoder = InputEncoder::new();
        assert_eq!(encoder.encode_key(Key::F(1), Modifiers::empty()), b"\x1bOP");
        assert_eq!(
            encoder.encode_key(Key::F(5), Modifiers::empty()),
            b"\x1b[15~"
        );
        assert_eq!(
            encoder.encode_key(Key::F(1), Modifiers::SHIFT),
            b"\x1b[1;2P"
        );
    }

    #[test]
    fn keypad_modes() {
        let mut encoder = InputEncoder::new();
        assert_eq!(
            encoder.encode_key(Key::Keypad('5'), Modifiers::empty()),
            b"5"
        );
        encoder.set_application_keypad(true);
        assert_eq!(
            encoder.encode_key(Key::Keypad('5'), Modifiers::empty()),
            b"\x1bOu"
        );
        assert_eq!(
            encoder.encode_key(Key::Keypad('\r'), Modifiers::empty()),
            b"\x1bOM"
        );
    }

    #[test]
    fn mouse_not_reported_without_protocol() {
        let encoder = InputEncoder::new();
        assert!(encoder.encode_mouse(press(MouseButton::Left, 1, 1)).is_empty());
    }

    #[test]
    fn x10_default_transport() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        let bytes = encoder.encode_mouse(press(MouseButton::Left, 5, 3));
        assert_eq!(bytes, vec![0x1B, b'[', b'M', 32, 37, 35]);

        // releases lose the button number
        let mut release = press(MouseButton::Left, 5, 3);
        release.kind = MouseEventKind::Release;
        let bytes = encoder.encode_mouse(release);
        assert_eq!(bytes, vec![0x1B, b'[', b'M', 35, 37, 35]);

        // coordinates clamp at 223
        let bytes = encoder.encode_mouse(press(MouseButton::Left, 500, 3));
        assert_eq!(bytes[4], 255);
    }

    #[test]
    fn sgr_transport_keeps_release_button() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        encoder.set_mouse_transport(MouseTransport::Sgr);
        assert_eq!(
            encoder.encode_mouse(press(MouseButton::Right, 10, 20)),
            b"\x1b[<2;10;20M"
        );
        let mut release = press(MouseButton::Right, 10, 20);
        release.kind = MouseEventKind::Release;
        assert_eq!(encoder.encode_mouse(release), b"\x1b[<2;10;20m");
    }

    #[test]
    fn urxvt_transport() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        encoder.set_mouse_transport(MouseTransport::Urxvt);
        assert_eq!(
            encoder.encode_mouse(press(MouseButton::Middle, 4, 7)),
            b"\x1b[33;4;7M"
        );
    }

    #[test]
    fn motion_gated_by_protocol() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        let mut motion = press(MouseButton::Left, 2, 2);
        motion.kind = MouseEventKind::Motion;
        assert!(encoder.encode_mouse(motion).is_empty());

        encoder.set_mouse_protocol(MouseProtocol::ButtonTracking, true);
        let bytes = encoder.encode_mouse(motion);
        assert_eq!(bytes[3], 32 + 32); // button 0 + motion flag
    }

    #[test]
    fn wheel_as_cursor_keys() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_wheel_mode(MouseWheelMode::ApplicationCursorKeys);
        assert_eq!(
            encoder.encode_mouse(press(MouseButton::WheelUp, 1, 1)),
            b"\x1bOA"
        );
        encoder.set_mouse_wheel_mode(MouseWheelMode::NormalCursorKeys);
        assert_eq!(
            encoder.encode_mouse(press(MouseButton::WheelDown, 1, 1)),
            b"\x1b[B"
        );
    }

    #[test]
    fn wheel_reported_when_protocol_active() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::NormalTracking, true);
        encoder.set_mouse_transport(MouseTransport::Sgr);
        assert_eq!(
            encoder.encode_mouse(press(MouseButton::WheelUp, 3, 4)),
            b"\x1b[<64;3;4M"
        );
    }

    #[test]
    fn bracketed_paste() {
        let mut encoder = InputEncoder::new();
        assert_eq!(encoder.encode_paste("hi\nthere"), b"hi\rthere");
        encoder.set_bracketed_paste(true);
        assert_eq!(
            encoder.encode_paste("hi"),
            b"\x1b[200~hi\x1b[201~"
        );
    }

    #[test]
    fn focus_events_when_enabled() {
        let mut encoder = InputEncoder::new();
        assert!(encoder.encode_focus(true).is_empty());
        encoder.set_generate_focus_events(true);
        assert_eq!(encoder.encode_focus(true), b"\x1b[I");
        assert_eq!(encoder.encode_focus(false), b"\x1b[O");
    }

    #[test]
    fn disabling_other_protocol_keeps_current() {
        let mut encoder = InputEncoder::new();
        encoder.set_mouse_protocol(MouseProtocol::AnyEventTracking, true);
        encoder.set_mouse_protocol(MouseProtocol::X10, false);
        let mut motion = press(MouseButton::Left, 2, 2);
        motion.kind = MouseEventKind::Motion;
        assert!(!encoder.encode_mouse(motion).is_empty());
    }
}
