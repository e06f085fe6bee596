//! Shared-screen wrapper for the two thread boundaries of the core.
//!
//! The PTY reader feeds bytes from its own thread while renderers read the
//! grid. A reader/writer lock fits: writes dominate and must be
//! linearizable, readers only need a consistent snapshot of the viewport.

use crate::events::ScreenEvents;
use crate::screen::Screen;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// A clonable, thread-safe handle to a [`Screen`].
pub struct SharedScreen<E: ScreenEvents> {
    inner: Arc<RwLock<Screen<E>>>,
}

impl<E: ScreenEvents> Clone for SharedScreen<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ScreenEvents> SharedScreen<E> {
    pub fn new(screen: Screen<E>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(screen)),
        }
    }

    /// Feed PTY bytes. Takes the write lock; byte chunks from one reader
    /// apply atomically with respect to viewport readers.
    pub fn write_bytes(&self, data: &[u8]) {
        self.inner.write().write_bytes(data);
    }

    /// Scoped read access for renderers: a consistent snapshot of the
    /// visible region.
    pub fn read(&self) -> RwLockReadGuard<'_, Screen<E>> {
        self.inner.read()
    }

    /// Scoped write access for resize, selection and viewport control.
    pub fn lock(&self) -> RwLockWriteGuard<'_, Screen<E>> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MockScreenEvents;
    use crate::screen_buffer::ScreenSize;
    use std::thread;

    #[test]
    fn concurrent_writes_and_reads() {
        let screen = SharedScreen::new(Screen::new(
            ScreenSize::new(20, 4),
            100,
            MockScreenEvents::default(),
        ));

        let writer = {
            let screen = screen.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    screen.write_bytes(b"line of text\r\n");
                }
            })
        };
        let reader = {
            let screen = screen.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let guard = screen.read();
                    let text = guard.render_text();
                    assert_eq!(text.lines().count(), 4);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();

        assert!(screen.read().history_line_count() > 0);
    }

    #[test]
    fn lock_gives_mutable_access() {
        let screen = SharedScreen::new(Screen::new(
            ScreenSize::new(10, 2),
            10,
            MockScreenEvents::default(),
        ));
        screen.lock().resize(ScreenSize::new(5, 5));
        assert_eq!(screen.read().size(), ScreenSize::new(5, 5));
    }
}
