//! Consoles that sit on a serial port's channel.

pub mod console;
pub mod emulator;
pub mod input;
pub mod recording;

pub use console::ConsoleAdapter;
pub use emulator::{EmulatorBridge, TerminalEmulator};
pub use input::{InputEvent, SurfaceEvent};
pub use recording::RecordingAdapter;
