//! Host terminal modes for the console binary.
//!
//! Raw mode lets every key through unechoed, the alternate screen keeps the
//! user's scrollback intact, mouse capture drives focus and wheel scrolling,
//! bracketed paste delivers a paste as one event, and focus reporting tells
//! us when the host window loses focus.
//!
//! `TerminalModes` remembers what it turned on and turns it off again in
//! reverse order, on `undo()` or on drop.

use anyhow::{Context, Result};
use crossterm::{
    cursor::Show,
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use std::io::{self, stdout, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    Raw,
    AlternateScreen,
    MouseCapture,
    BracketedPaste,
    FocusChange,
}

impl TerminalMode {
    const ALL: [TerminalMode; 5] = [
        TerminalMode::Raw,
        TerminalMode::AlternateScreen,
        TerminalMode::MouseCapture,
        TerminalMode::BracketedPaste,
        TerminalMode::FocusChange,
    ];

    /// The console cannot run without these.
    fn required(self) -> bool {
        matches!(self, TerminalMode::Raw | TerminalMode::AlternateScreen)
    }

    fn enable(self) -> io::Result<()> {
        let mut out = stdout();
        match self {
            TerminalMode::Raw => enable_raw_mode(),
            TerminalMode::AlternateScreen => out.execute(EnterAlternateScreen).map(drop),
            TerminalMode::MouseCapture => out.execute(EnableMouseCapture).map(drop),
            TerminalMode::BracketedPaste => out.execute(EnableBracketedPaste).map(drop),
            TerminalMode::FocusChange => out.execute(EnableFocusChange).map(drop),
        }
    }

    fn disable(self) -> io::Result<()> {
        let mut out = stdout();
        match self {
            TerminalMode::Raw => disable_raw_mode(),
            TerminalMode::AlternateScreen => out.execute(LeaveAlternateScreen).map(drop),
            TerminalMode::MouseCapture => out.execute(DisableMouseCapture).map(drop),
            TerminalMode::BracketedPaste => out.execute(DisableBracketedPaste).map(drop),
            TerminalMode::FocusChange => out.execute(DisableFocusChange).map(drop),
        }
    }
}

/// Modes currently switched on, in the order they were enabled.
#[derive(Debug, Default)]
pub struct TerminalModes {
    enabled: Vec<TerminalMode>,
}

impl TerminalModes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the terminal into console mode.
    ///
    /// Without `alternate_screen` (raw pass-through), the host terminal shows
    /// device output itself and mouse capture is skipped too. If a required
    /// mode fails, everything enabled so far is undone.
    pub fn enable(alternate_screen: bool) -> Result<Self> {
        let mut modes = Self::new();
        let wanted = TerminalMode::ALL.into_iter().filter(|mode| {
            alternate_screen
                || !matches!(
                    mode,
                    TerminalMode::AlternateScreen | TerminalMode::MouseCapture
                )
        });

        for mode in wanted {
            match mode.enable() {
                Ok(()) => {
                    tracing::debug!("Enabled {:?}", mode);
                    modes.enabled.push(mode);
                }
                Err(e) if mode.required() => {
                    tracing::error!("Failed to enable {:?}: {}", mode, e);
                    modes.undo();
                    return Err(e).with_context(|| format!("Failed to enable {:?}", mode));
                }
                Err(e) => tracing::warn!("Continuing without {:?}: {}", mode, e),
            }
        }
        Ok(modes)
    }

    pub fn is_enabled(&self, mode: TerminalMode) -> bool {
        self.enabled.contains(&mode)
    }

    /// Restore the terminal. Safe to call more than once.
    pub fn undo(&mut self) {
        if self.enabled.is_empty() {
            return;
        }
        let _ = stdout().execute(Show);
        while let Some(mode) = self.enabled.pop() {
            match mode.disable() {
                Ok(()) => tracing::debug!("Disabled {:?}", mode),
                Err(e) => tracing::warn!("Failed to disable {:?}: {}", mode, e),
            }
        }
        let _ = stdout().flush();
    }
}

impl Drop for TerminalModes {
    fn drop(&mut self) {
        self.undo();
    }
}

/// Turn every mode off without knowing which were on.
///
/// For the panic hook, where the `TerminalModes` value is out of reach.
pub fn emergency_cleanup() {
    let _ = stdout().execute(Show);
    for mode in TerminalMode::ALL.into_iter().rev() {
        let _ = mode.disable();
    }
    let _ = stdout().flush();
}
