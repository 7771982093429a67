//! Crossterm sink: draws the console text into the host terminal.
//!
//! The console area takes every row but the last, which holds a status line.
//! Like a text box, replacing the text keeps the scroll position; only
//! `scroll_to_end` (or the user) moves it.

use super::PresentationSink;
use crossterm::{
    cursor::{Hide, MoveTo},
    queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

pub struct TerminalSink<W: Write> {
    out: W,
    lines: Vec<String>,
    /// Index of the first visible line.
    top: usize,
    width: u16,
    height: u16,
    visible: bool,
    focused: bool,
    status: String,
    dirty: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, width: u16, height: u16) -> Self {
        Self {
            out,
            lines: vec![String::new()],
            top: 0,
            width,
            height,
            visible: false,
            focused: true,
            status: String::new(),
            dirty: true,
        }
    }

    /// Rows available for console text.
    pub fn console_rows(&self) -> usize {
        self.height.saturating_sub(1) as usize
    }

    /// Whether a screen row belongs to the console area.
    pub fn contains_row(&self, row: u16) -> bool {
        (row as usize) < self.console_rows()
    }

    pub fn top_line(&self) -> usize {
        self.top
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn max_top(&self) -> usize {
        self.lines.len().saturating_sub(self.console_rows())
    }

    /// Move the view by `delta` lines (negative is up).
    pub fn scroll_by(&mut self, delta: isize) {
        let top = self.top.saturating_add_signed(delta).min(self.max_top());
        if top != self.top {
            self.top = top;
            self.dirty = true;
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.top = self.top.min(self.max_top());
        self.dirty = true;
    }

    pub fn focus(&mut self) {
        if !self.focused {
            self.focused = true;
            self.dirty = true;
        }
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        if status != self.status {
            self.status = status;
            self.dirty = true;
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Draw the screen if anything changed since the last call.
    pub fn present(&mut self) -> io::Result<()> {
        if !self.dirty || !self.visible {
            return Ok(());
        }
        self.dirty = false;

        let width = self.width as usize;
        queue!(self.out, Hide)?;
        for row in 0..self.console_rows() {
            queue!(self.out, MoveTo(0, row as u16), Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.lines.get(self.top + row) {
                let shown: String = line.chars().take(width).collect();
                queue!(self.out, Print(shown))?;
            }
        }

        if self.height > 0 {
            let focus = if self.focused { "" } else { " [unfocused]" };
            let status: String = format!("{}{}", self.status, focus)
                .chars()
                .take(width)
                .collect();
            queue!(
                self.out,
                MoveTo(0, self.height - 1),
                Clear(ClearType::CurrentLine),
                SetAttribute(Attribute::Reverse),
                Print(format!("{status:<width$}")),
                SetAttribute(Attribute::Reset)
            )?;
        }
        self.out.flush()
    }
}

/// Make a device character safe to print on the host terminal.
fn display_char(c: char) -> char {
    match c {
        '\t' => ' ',
        c if c.is_control() => '\u{fffd}',
        c => c,
    }
}

impl<W: Write> PresentationSink for TerminalSink<W> {
    fn set_text(&mut self, text: &str) {
        self.lines = text
            .split('\n')
            .map(|line| line.chars().map(display_char).collect())
            .collect();
        self.top = self.top.min(self.max_top());
        self.dirty = true;
    }

    fn scroll_to_end(&mut self) {
        self.top = self.max_top();
        self.dirty = true;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.dirty = true;
    }

    fn blur(&mut self) {
        if self.focused {
            self.focused = false;
            self.dirty = true;
        }
    }

    fn has_focus(&self) -> bool {
        self.focused
    }
}
