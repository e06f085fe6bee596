//! DEC-compatible ANSI/VT escape sequence parser.
//!
//! A byte-level state machine following Paul Williams' reference parser
//! (vt100.net), with two practical extensions:
//!
//! - UTF-8 is decoded lazily in ground state through a dedicated sub-state;
//!   ill-formed sequences yield U+FFFD and resync at the offending byte.
//! - `:` is accepted as a sub-parameter separator in CSI/DCS parameters
//!   (required for `38:2::r:g:b` style SGR).
//!
//! The parser itself never fails: malformed input lands in an ignore state
//! and parsing resumes at the next recognizable boundary. It holds no
//! semantic state; all meaning lives in the [`Handler`] implementation
//! (normally the command builder).

/// Receiver of parser actions.
///
/// One method per action of the reference state machine. Implementations
/// accumulate these into complete sequences.
pub trait Handler {
    /// A printable codepoint for the grid.
    fn print(&mut self, ch: char);
    /// A C0 control (or 8-bit C1 control byte) outside any sequence.
    fn execute(&mut self, control: u8);
    /// Forget any partially collected sequence state.
    fn clear(&mut self);
    /// An intermediate byte (0x20..=0x2F) or private marker (0x3C..=0x3F).
    fn collect(&mut self, byte: u8);
    /// A parameter byte: digit, `;` or `:`.
    fn param(&mut self, byte: u8);
    /// Final byte of an ESC sequence.
    fn esc_dispatch(&mut self, final_byte: u8);
    /// Final byte of a CSI sequence.
    fn csi_dispatch(&mut self, final_byte: u8);
    /// Start of an OSC string.
    fn osc_start(&mut self);
    /// One payload byte of an OSC string.
    fn osc_put(&mut self, byte: u8);
    /// OSC string terminated (ST or BEL).
    fn osc_end(&mut self);
    /// DCS header complete; `final_byte` selects the function.
    fn dcs_hook(&mut self, final_byte: u8);
    /// One payload byte of a DCS string.
    fn dcs_put(&mut self, byte: u8);
    /// DCS string terminated.
    fn dcs_unhook(&mut self);
}

/// Parser states, matching the reference machine plus the UTF-8 sub-state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString,
    Utf8,
}

/// The byte-stream state machine.
#[derive(Debug, Default)]
pub struct Parser {
    state: State,
    utf8_bytes: [u8; 4],
    utf8_len: usize,
    utf8_expected: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current machine state (useful for tests and tracing).
    pub fn state(&self) -> State {
        self.state
    }

    /// Feed a buffer of bytes, emitting actions into `handler`.
    pub fn parse<H: Handler>(&mut self, data: &[u8], handler: &mut H) {
        for &byte in data {
            self.advance(byte, handler);
        }
    }

    fn advance<H: Handler>(&mut self, byte: u8, handler: &mut H) {
        // A state may bounce a byte back for reprocessing after a state
        // change (UTF-8 resync, stray high bytes inside sequences). Each
        // bounce consumes or lands in ground, so this terminates.
        let mut again = self.step(byte, handler);
        while again {
            again = self.step(byte, handler);
        }
    }

    fn step<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match self.state {
            State::Ground => self.ground(byte, handler),
            State::Utf8 => self.utf8(byte, handler),
            State::Escape => self.escape(byte, handler),
            State::EscapeIntermediate => self.escape_intermediate(byte, handler),
            State::CsiEntry => self.csi_entry(byte, handler),
            State::CsiParam => self.csi_param(byte, handler),
            State::CsiIntermediate => self.csi_intermediate(byte, handler),
            State::CsiIgnore => self.csi_ignore(byte, handler),
            State::DcsEntry => self.dcs_entry(byte, handler),
            State::DcsParam => self.dcs_param(byte, handler),
            State::DcsIntermediate => self.dcs_intermediate(byte, handler),
            State::DcsPassthrough => self.dcs_passthrough(byte, handler),
            State::DcsIgnore => self.dcs_ignore(byte, handler),
            State::OscString => self.osc_string(byte, handler),
            State::SosPmApcString => self.sos_pm_apc(byte, handler),
        }
    }

    fn enter_escape<H: Handler>(&mut self, handler: &mut H) {
        handler.clear();
        self.state = State::Escape;
    }

    // ---- ground + UTF-8 -------------------------------------------------

    fn ground<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x18 | 0x1A => handler.execute(byte),
            0x20..=0x7F => handler.print(byte as char),
            // 8-bit C1 controls. These only look like C1 when we are not
            // inside a multi-byte UTF-8 sequence, which holds here.
            0x80..=0x9F => self.c1_dispatch(byte, handler),
            0xA0..=0xFF => self.utf8_begin(byte, handler),
        }
        false
    }

    fn c1_dispatch<H: Handler>(&mut self, byte: u8, handler: &mut H) {
        match byte {
            0x90 => {
                handler.clear();
                self.state = State::DcsEntry;
            }
            0x98 | 0x9E | 0x9F => self.state = State::SosPmApcString,
            0x9B => {
                handler.clear();
                self.state = State::CsiEntry;
            }
            0x9C => {} // stray ST
            0x9D => {
                handler.osc_start();
                self.state = State::OscString;
            }
            _ => handler.execute(byte),
        }
    }

    fn utf8_begin<H: Handler>(&mut self, byte: u8, handler: &mut H) {
        let expected = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => {
                // Stray continuation byte or invalid lead.
                handler.print(char::REPLACEMENT_CHARACTER);
                return;
            }
        };
        self.utf8_bytes[0] = byte;
        self.utf8_len = 1;
        self.utf8_expected = expected;
        self.state = State::Utf8;
    }

    fn utf8<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        if !(0x80..=0xBF).contains(&byte) {
            // Ill-formed: emit the replacement character and resync on the
            // offending byte from ground state.
            handler.print(char::REPLACEMENT_CHARACTER);
            self.state = State::Ground;
            return true;
        }

        self.utf8_bytes[self.utf8_len] = byte;
        self.utf8_len += 1;
        if self.utf8_len < self.utf8_expected {
            return false;
        }

        // Full validation (overlong forms, surrogates, out of range) is
        // delegated to the standard library.
        match std::str::from_utf8(&self.utf8_bytes[..self.utf8_len]) {
            Ok(s) => {
                if let Some(ch) = s.chars().next() {
                    handler.print(ch);
                }
            }
            Err(_) => handler.print(char::REPLACEMENT_CHARACTER),
        }
        self.state = State::Ground;
        false
    }

    // ---- escape ----------------------------------------------------------

    fn escape<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x20..=0x2F => {
                handler.collect(byte);
                self.state = State::EscapeIntermediate;
            }
            0x50 => {
                handler.clear();
                self.state = State::DcsEntry;
            }
            0x58 | 0x5E | 0x5F => self.state = State::SosPmApcString,
            0x5B => {
                handler.clear();
                self.state = State::CsiEntry;
            }
            0x5D => {
                handler.osc_start();
                self.state = State::OscString;
            }
            0x30..=0x4F | 0x51..=0x57 | 0x59 | 0x5A | 0x5C | 0x60..=0x7E => {
                handler.esc_dispatch(byte);
                self.state = State::Ground;
            }
            0x7F => {}
            0x80..=0xFF => {
                self.state = State::Ground;
                return true;
            }
        }
        false
    }

    fn escape_intermediate<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x20..=0x2F => handler.collect(byte),
            0x30..=0x7E => {
                handler.esc_dispatch(byte);
                self.state = State::Ground;
            }
            0x7F => {}
            0x80..=0xFF => {
                self.state = State::Ground;
                return true;
            }
        }
        false
    }

    // ---- CSI -------------------------------------------------------------

    fn csi_entry<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x20..=0x2F => {
                handler.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x30..=0x3B => {
                handler.param(byte);
                self.state = State::CsiParam;
            }
            0x3C..=0x3F => {
                handler.collect(byte);
                self.state = State::CsiParam;
            }
            0x40..=0x7E => {
                handler.csi_dispatch(byte);
                self.state = State::Ground;
            }
            0x7F => {}
            0x80..=0xFF => {
                self.state = State::Ground;
                return true;
            }
        }
        false
    }

    fn csi_param<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x30..=0x3B => handler.param(byte),
            // Private markers are only valid before the first parameter.
            0x3C..=0x3F => self.state = State::CsiIgnore,
            0x20..=0x2F => {
                handler.collect(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => {
                handler.csi_dispatch(byte);
                self.state = State::Ground;
            }
            0x7F => {}
            0x80..=0xFF => {
                self.state = State::Ground;
                return true;
            }
        }
        false
    }

    fn csi_intermediate<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x20..=0x2F => handler.collect(byte),
            0x30..=0x3F => self.state = State::CsiIgnore,
            0x40..=0x7E => {
                handler.csi_dispatch(byte);
                self.state = State::Ground;
            }
            0x7F => {}
            0x80..=0xFF => {
                self.state = State::Ground;
                return true;
            }
        }
        false
    }

    fn csi_ignore<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => {
                handler.execute(byte);
                self.state = State::Ground;
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => handler.execute(byte),
            0x40..=0x7E => self.state = State::Ground,
            _ => {}
        }
        false
    }

    // ---- DCS -------------------------------------------------------------

    fn dcs_entry<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => self.state = State::Ground,
            0x20..=0x2F => {
                handler.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x30..=0x3B => {
                handler.param(byte);
                self.state = State::DcsParam;
            }
            0x3C..=0x3F => {
                handler.collect(byte);
                self.state = State::DcsParam;
            }
            0x40..=0x7E => {
                handler.dcs_hook(byte);
                self.state = State::DcsPassthrough;
            }
            _ => {}
        }
        false
    }

    fn dcs_param<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => self.state = State::Ground,
            0x30..=0x3B => handler.param(byte),
            0x3C..=0x3F => self.state = State::DcsIgnore,
            0x20..=0x2F => {
                handler.collect(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => {
                handler.dcs_hook(byte);
                self.state = State::DcsPassthrough;
            }
            _ => {}
        }
        false
    }

    fn dcs_intermediate<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x18 | 0x1A => self.state = State::Ground,
            0x20..=0x2F => handler.collect(byte),
            0x30..=0x3F => self.state = State::DcsIgnore,
            0x40..=0x7E => {
                handler.dcs_hook(byte);
                self.state = State::DcsPassthrough;
            }
            _ => {}
        }
        false
    }

    fn dcs_passthrough<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => {
                handler.dcs_unhook();
                self.enter_escape(handler);
            }
            0x9C => {
                handler.dcs_unhook();
                self.state = State::Ground;
            }
            0x18 | 0x1A => {
                handler.dcs_unhook();
                self.state = State::Ground;
            }
            0x7F => {}
            _ => handler.dcs_put(byte),
        }
        false
    }

    fn dcs_ignore<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x9C | 0x18 | 0x1A => self.state = State::Ground,
            _ => {}
        }
        false
    }

    // ---- OSC / SOS / PM / APC ---------------------------------------------

    fn osc_string<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x07 | 0x9C => {
                handler.osc_end();
                self.state = State::Ground;
            }
            0x1B => {
                // ESC \ terminator; the following backslash dispatches as a
                // plain ESC final and is a no-op in the builder.
                handler.osc_end();
                self.enter_escape(handler);
            }
            0x18 | 0x1A => {
                handler.osc_end();
                self.state = State::Ground;
            }
            0x00..=0x06 | 0x08..=0x17 | 0x19 | 0x1C..=0x1F => {}
            _ => handler.osc_put(byte),
        }
        false
    }

    fn sos_pm_apc<H: Handler>(&mut self, byte: u8, handler: &mut H) -> bool {
        match byte {
            0x1B => self.enter_escape(handler),
            0x9C | 0x18 | 0x1A => self.state = State::Ground,
            _ => {}
        }
        false
    }
}
