//! Translate host terminal events into console input.
//!
//! In text-box mode keys become the surface events the console expects:
//! printable keys as key-presses, Backspace/Tab as raw key-downs, pastes as
//! paste events. In raw mode keys are encoded as the byte strings a VT-style
//! terminal would send.

use crate::adapter::input::{SurfaceEvent, KEY_BACKSPACE, KEY_TAB};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};

/// Lines moved per mouse wheel notch.
const WHEEL_LINES: isize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Deliver to the console surface.
    Surface(SurfaceEvent),
    PointerDown { column: u16, row: u16 },
    Scroll(isize),
    Resize { width: u16, height: u16 },
    FocusGained,
    FocusLost,
    ToggleInput,
    Quit,
    Ignore,
}

fn is_quit(key: &KeyEvent) -> bool {
    // Ctrl+] arrives as Ctrl+5 on terminals without keyboard enhancement.
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
}

fn is_press(key: &KeyEvent) -> bool {
    matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat)
}

/// Map a host event for the text-box console.
pub fn translate(event: &Event) -> HostAction {
    match event {
        Event::Key(key) if is_press(key) => translate_key(key),
        Event::Key(_) => HostAction::Ignore,
        Event::Paste(text) => HostAction::Surface(SurfaceEvent::paste(text.clone())),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(_) => HostAction::PointerDown {
                column: mouse.column,
                row: mouse.row,
            },
            MouseEventKind::ScrollUp => HostAction::Scroll(-WHEEL_LINES),
            MouseEventKind::ScrollDown => HostAction::Scroll(WHEEL_LINES),
            _ => HostAction::Ignore,
        },
        Event::Resize(width, height) => HostAction::Resize {
            width: *width,
            height: *height,
        },
        Event::FocusGained => HostAction::FocusGained,
        Event::FocusLost => HostAction::FocusLost,
    }
}

fn translate_key(key: &KeyEvent) -> HostAction {
    if is_quit(key) {
        return HostAction::Quit;
    }

    let surface = match key.code {
        KeyCode::F(2) => return HostAction::ToggleInput,
        KeyCode::Backspace => SurfaceEvent::key_down(KEY_BACKSPACE),
        KeyCode::Tab => SurfaceEvent::key_down(KEY_TAB),
        KeyCode::Enter => SurfaceEvent::key_press(13),
        KeyCode::Esc => SurfaceEvent::key_press(27),
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            match control_code(c) {
                Some(code) => SurfaceEvent::key_press(code),
                None => return HostAction::Ignore,
            }
        }
        KeyCode::Char(c) => SurfaceEvent::key_press(c as u32),
        _ => return HostAction::Ignore,
    };
    HostAction::Surface(surface)
}

/// Control code for Ctrl+`c`, for the ASCII range that has one.
fn control_code(c: char) -> Option<u32> {
    match c.to_ascii_lowercase() {
        c @ ('a'..='z' | '@' | '[' | '\\' | ']' | '^' | '_') => Some(c as u32 & 0x1f),
        ' ' => Some(0),
        _ => None,
    }
}

/// Encode a key the way a VT-style terminal sends it, for raw mode.
pub fn encode_keystroke(key: &KeyEvent) -> Option<String> {
    if !is_press(key) {
        return None;
    }
    let encoded = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            char::from_u32(control_code(c)?)?.to_string()
        }
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::ALT) => format!("\x1b{c}"),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "\r".to_string(),
        KeyCode::Backspace => "\x7f".to_string(),
        KeyCode::Tab => "\t".to_string(),
        KeyCode::BackTab => "\x1b[Z".to_string(),
        KeyCode::Esc => "\x1b".to_string(),
        KeyCode::Up => "\x1b[A".to_string(),
        KeyCode::Down => "\x1b[B".to_string(),
        KeyCode::Right => "\x1b[C".to_string(),
        KeyCode::Left => "\x1b[D".to_string(),
        KeyCode::Home => "\x1b[H".to_string(),
        KeyCode::End => "\x1b[F".to_string(),
        KeyCode::Insert => "\x1b[2~".to_string(),
        KeyCode::Delete => "\x1b[3~".to_string(),
        KeyCode::PageUp => "\x1b[5~".to_string(),
        KeyCode::PageDown => "\x1b[6~".to_string(),
        KeyCode::F(n @ 1..=4) => format!("\x1bO{}", (b'P' + n - 1) as char),
        _ => return None,
    };
    Some(encoded)
}

/// Whether a raw-mode key should end the session.
pub fn is_quit_key(event: &Event) -> bool {
    matches!(event, Event::Key(key) if is_press(key) && is_quit(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, MouseButton, MouseEvent};

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn surface(action: HostAction) -> SurfaceEvent {
        match action {
            HostAction::Surface(event) => event,
            other => panic!("expected surface event, got {other:?}"),
        }
    }

    #[test]
    fn printable_keys_become_key_presses() {
        assert_eq!(
            surface(translate(&key(KeyCode::Char('q')))),
            SurfaceEvent::key_press('q' as u32)
        );
        assert_eq!(
            surface(translate(&key(KeyCode::Enter))),
            SurfaceEvent::key_press(13)
        );
        assert_eq!(surface(translate(&ctrl('c'))), SurfaceEvent::key_press(3));
    }

    #[test]
    fn backspace_and_tab_become_key_downs() {
        assert_eq!(
            surface(translate(&key(KeyCode::Backspace))),
            SurfaceEvent::key_down(8)
        );
        assert_eq!(
            surface(translate(&key(KeyCode::Tab))),
            SurfaceEvent::key_down(9)
        );
    }

    #[test]
    fn ctrl_bracket_quits() {
        assert_eq!(translate(&ctrl(']')), HostAction::Quit);
        assert_eq!(translate(&ctrl('5')), HostAction::Quit);
        assert!(is_quit_key(&ctrl(']')));
        assert!(!is_quit_key(&key(KeyCode::Char(']'))));
    }

    #[test]
    fn key_release_is_ignored() {
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(translate(&release), HostAction::Ignore);
    }

    #[test]
    fn mouse_and_paste() {
        let click = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 4,
            row: 7,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(translate(&click), HostAction::PointerDown { column: 4, row: 7 });

        let wheel = Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(translate(&wheel), HostAction::Scroll(-3));

        assert_eq!(
            surface(translate(&Event::Paste("echo hi".into()))),
            SurfaceEvent::paste("echo hi")
        );
    }

    #[test]
    fn f2_toggles_input() {
        assert_eq!(translate(&key(KeyCode::F(2))), HostAction::ToggleInput);
    }

    #[test]
    fn keystroke_encoding() {
        let enc = |e: Event| match e {
            Event::Key(k) => encode_keystroke(&k),
            _ => None,
        };
        assert_eq!(enc(key(KeyCode::Char('x'))).as_deref(), Some("x"));
        assert_eq!(enc(key(KeyCode::Up)).as_deref(), Some("\x1b[A"));
        assert_eq!(enc(key(KeyCode::Backspace)).as_deref(), Some("\x7f"));
        assert_eq!(enc(key(KeyCode::F(1))).as_deref(), Some("\x1bOP"));
        assert_eq!(enc(key(KeyCode::F(4))).as_deref(), Some("\x1bOS"));
        assert_eq!(enc(ctrl('d')).as_deref(), Some("\x04"));
        assert_eq!(enc(key(KeyCode::F(9))), None);
    }
}
