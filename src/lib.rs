//! vtcore - the byte-stream-to-screen core of a VT-compatible terminal.
//!
//! Bytes from a pseudo-terminal enter the [`parser`], come out as a
//! normalized [`commands::Command`] stream via the [`builder`], and are
//! applied to a [`screen::Screen`] holding primary/alternate grids with
//! scrollback, margins and selection. Replies flow back through
//! [`events::ScreenEvents`]; outgoing sequences are realized by
//! [`output::OutputGenerator`] and user input by [`input::InputEncoder`].

pub mod builder;
pub mod charset;
pub mod color;
pub mod commands;
pub mod config;
pub mod events;
pub mod input;
pub mod output;
pub mod parser;
pub mod screen;
pub mod screen_buffer;
pub mod selection;
pub mod sync;

pub use builder::{CommandBuilder, SeqResult};
pub use color::{Color, RgbColor};
pub use commands::{Command, Coordinate, Mode};
pub use config::ScreenConfig;
pub use events::ScreenEvents;
pub use input::{InputEncoder, Key, Modifiers, MouseEvent};
pub use output::OutputGenerator;
pub use parser::Parser;
pub use screen::Screen;
pub use screen_buffer::{BufferKind, Cell, Line, ScreenBuffer, ScreenSize};
pub use selection::{SelectionMode, SelectionRange, Selector};
pub use sync::SharedScreen;
