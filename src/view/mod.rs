//! Presentation layer
//!
//! The console pushes its text to a [`PresentationSink`]. The sink decides how
//! to show it: an in-memory record for tests and headless runs, or a crossterm
//! drawing of the tail of the text for the terminal binary.

pub mod memory_sink;
#[cfg(feature = "runtime")]
pub mod terminal_sink;

pub use memory_sink::{MemorySink, SinkCall};
#[cfg(feature = "runtime")]
pub use terminal_sink::TerminalSink;

/// A text-box-like surface the console renders into.
pub trait PresentationSink {
    /// Replace the whole displayed text. Scroll position is left alone.
    fn set_text(&mut self, text: &str);

    /// Scroll to the bottom of the text.
    fn scroll_to_end(&mut self);

    fn set_visible(&mut self, visible: bool);

    /// Drop keyboard focus.
    fn blur(&mut self);

    fn has_focus(&self) -> bool {
        true
    }
}
