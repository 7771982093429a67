//! Raw input events as delivered by an input surface.

/// Key code of Backspace on a raw key-down.
pub const KEY_BACKSPACE: u32 = 8;
/// Key code of Tab on a raw key-down.
pub const KEY_TAB: u32 = 9;
/// What the device receives for Backspace.
pub const DEL: u32 = 127;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A key that produced a character; `code` is that character's code.
    KeyPress { code: u32 },
    /// A key went down; `key_code` identifies the key, not a character.
    KeyDown { key_code: u32 },
    /// Plain text pasted from the clipboard.
    Paste { text: String },
}

impl InputEvent {
    /// Code to send for a raw key-down, for the keys that produce no
    /// character on their own.
    pub fn intercepted_key_code(&self) -> Option<u32> {
        match self {
            InputEvent::KeyDown {
                key_code: KEY_BACKSPACE,
            } => Some(DEL),
            InputEvent::KeyDown { key_code: KEY_TAB } => Some(KEY_TAB),
            _ => None,
        }
    }
}

/// An input event plus its "prevent default" flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceEvent {
    event: InputEvent,
    default_prevented: bool,
}

impl SurfaceEvent {
    pub fn new(event: InputEvent) -> Self {
        Self {
            event,
            default_prevented: false,
        }
    }

    pub fn key_press(code: u32) -> Self {
        Self::new(InputEvent::KeyPress { code })
    }

    pub fn key_down(key_code: u32) -> Self {
        Self::new(InputEvent::KeyDown { key_code })
    }

    pub fn paste(text: impl Into<String>) -> Self {
        Self::new(InputEvent::Paste { text: text.into() })
    }

    pub fn event(&self) -> &InputEvent {
        &self.event
    }

    /// Tell the surface not to run its own handling for this event.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}
