//! Text accumulated by the console, plus the "scroll to bottom" flag.

/// Backspace as sent by the device.
pub const BACKSPACE: char = '\x08';
/// Carriage return, dropped on output.
pub const CARRIAGE_RETURN: char = '\r';

/// What applying one output character did to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharEffect {
    /// Text changed (or a backspace was applied); a render is due.
    Changed,
    /// Character dropped; nothing to render.
    Ignored,
}

/// Everything the device has printed, minus erased characters.
///
/// Only ever grows by one character or shrinks by one character. Nothing is
/// evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleText {
    text: String,
    newline_pending: bool,
}

impl ConsoleText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one output character.
    ///
    /// Backspace erases the last character (no-op when empty) but still counts
    /// as a change. Carriage return is dropped. A newline sets the
    /// scroll-to-bottom flag.
    pub fn apply(&mut self, c: char) -> CharEffect {
        match c {
            BACKSPACE => {
                self.text.pop();
                CharEffect::Changed
            }
            CARRIAGE_RETURN => CharEffect::Ignored,
            '\n' => {
                self.text.push(c);
                self.newline_pending = true;
                CharEffect::Changed
            }
            _ => {
                self.text.push(c);
                CharEffect::Changed
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn newline_pending(&self) -> bool {
        self.newline_pending
    }

    /// Clear the newline flag, returning whether it was set.
    pub fn take_newline(&mut self) -> bool {
        std::mem::take(&mut self.newline_pending)
    }
}
