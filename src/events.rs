//! Host-side collaborator interface of the screen.
//!
//! The screen invokes these callbacks synchronously from command
//! application. Every method has a default no-op implementation so hosts
//! (and tests) only wire what they care about.

use crate::color::RgbColor;
use crate::commands::{CursorDisplay, CursorShape, DynamicColorName, MouseProtocol};
use crate::input::{MouseTransport, MouseWheelMode};
use crate::screen_buffer::BufferKind;

pub trait ScreenEvents {
    /// Push reply bytes toward the PTY (CPR, DA, DSR, DECRQM, ...).
    fn reply(&mut self, _response: &[u8]) {}

    fn bell(&mut self) {}

    fn copy_to_clipboard(&mut self, _data: &str) {}

    fn notify(&mut self, _title: &str, _body: &str) {}

    fn set_window_title(&mut self, _title: &str) {}

    fn resize_window(&mut self, _width: i32, _height: i32, _in_pixels: bool) {}

    fn buffer_changed(&mut self, _kind: BufferKind) {}

    /// The byte source closed; no further input will be consumed.
    fn on_closed(&mut self) {}

    fn on_selection_complete(&mut self) {}

    /// Ask the host for the current value of a dynamic color; `None`
    /// suppresses the reply.
    fn request_dynamic_color(&mut self, _name: DynamicColorName) -> Option<RgbColor> {
        None
    }

    fn set_dynamic_color(&mut self, _name: DynamicColorName, _color: RgbColor) {}

    fn reset_dynamic_color(&mut self, _name: DynamicColorName) {}

    // Input-encoder wiring. The host forwards these to its InputEncoder.

    fn use_application_cursor_keys(&mut self, _enable: bool) {}

    fn set_application_keypad_mode(&mut self, _enable: bool) {}

    fn set_bracketed_paste(&mut self, _enable: bool) {}

    fn set_mouse_protocol(&mut self, _protocol: MouseProtocol, _enable: bool) {}

    fn set_mouse_transport(&mut self, _transport: MouseTransport) {}

    fn set_mouse_wheel_mode(&mut self, _mode: MouseWheelMode) {}

    fn set_generate_focus_events(&mut self, _enable: bool) {}

    fn set_cursor_style(&mut self, _display: CursorDisplay, _shape: CursorShape) {}
}

/// Captures replies and notifications; the test double used throughout the
/// crate's own tests.
#[derive(Debug, Default)]
pub struct MockScreenEvents {
    pub replies: Vec<u8>,
    pub bells: usize,
    pub clipboard: Option<String>,
    pub notifications: Vec<(String, String)>,
    pub window_title: Option<String>,
    pub selection_completions: usize,
    pub closed: bool,
}

impl MockScreenEvents {
    pub fn reply_text(&self) -> String {
        String::from_utf8_lossy(&self.replies).into_owned()
    }
}

impl ScreenEvents for MockScreenEvents {
    fn reply(&mut self, response: &[u8]) {
        self.replies.extend_from_slice(response);
    }

    fn bell(&mut self) {
        self.bells += 1;
    }

    fn copy_to_clipboard(&mut self, data: &str) {
        self.clipboard = Some(data.to_string());
    }

    fn notify(&mut self, title: &str, body: &str) {
        self.notifications
            .push((title.to_string(), body.to_string()));
    }

    fn set_window_title(&mut self, title: &str) {
        self.window_title = Some(title.to_string());
    }

    fn on_selection_complete(&mut self) {
        self.selection_completions += 1;
    }

    fn on_closed(&mut self) {
        self.closed = true;
    }
}
