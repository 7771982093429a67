//! Named-topic event bus connecting the emulated serial device to listeners.
//!
//! - Events are (topic, payload) pairs
//! - Topics are plain strings: "serial0-output-char", "serial0-input"
//! - Listeners register with a topic pattern; `*` is a wildcard
//! - A bounded history of sent events is kept for diagnostics and tests
//!
//! The bus is single-threaded. Handlers may send, register or unregister
//! while being dispatched to.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Well-known topics for the first serial port.
pub mod topics {
    /// Device → console: one character per event.
    pub const SERIAL0_OUTPUT_CHAR: &str = "serial0-output-char";
    /// Console → device: a character code or a run of text.
    pub const SERIAL0_INPUT: &str = "serial0-input";
}

/// Input sent towards the device.
///
/// The text-box console sends one code per keystroke, while an external
/// terminal emulator sends whole strings. Both arrive on the same topic and the
/// far end must accept either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialInput {
    SingleChar(u32),
    TextRun(String),
}

impl SerialInput {
    /// Bytes to put on the wire, encoded as by [`wire_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SerialInput::SingleChar(code) => code_to_bytes(*code),
            SerialInput::TextRun(text) => wire_bytes(text),
        }
    }

    /// Number of character codes this input carries.
    pub fn char_count(&self) -> usize {
        match self {
            SerialInput::SingleChar(_) => 1,
            SerialInput::TextRun(text) => text.chars().count(),
        }
    }
}

/// Encode text for a byte-oriented line.
///
/// Chars up to U+00FF become the single byte of the same value, which undoes
/// the one-char-per-byte mapping of device output. Higher code points are
/// UTF-8 encoded. The result is ambiguous for bytes 0x80..=0xFF: `"é"` gives
/// `[0xE9]` while `"ĕ"` gives `[0xC4, 0x95]`, which the far end cannot tell
/// apart from `"Ä\u{95}"`. Keyboards and device output stay below U+0100, so
/// the mix only shows up for pasted or configured text.
pub fn wire_bytes(text: &str) -> Vec<u8> {
    text.chars().flat_map(|c| code_to_bytes(u32::from(c))).collect()
}

fn code_to_bytes(code: u32) -> Vec<u8> {
    if let Ok(byte) = u8::try_from(code) {
        return vec![byte];
    }
    match char::from_u32(code) {
        Some(c) => c.to_string().into_bytes(),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusPayload {
    OutputChar(char),
    Input(SerialInput),
}

/// A single bus event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub topic: String,
    pub payload: BusPayload,
}

impl BusEvent {
    pub fn new(topic: impl Into<String>, payload: BusPayload) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Check if the topic matches a pattern
    /// Patterns can use "*" as wildcard: "serial0-*", "*-input", "*"
    pub fn matches(&self, pattern: &str) -> bool {
        topic_matches(&self.topic, pattern)
    }
}

fn topic_matches(topic: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') {
        return topic == pattern;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 2 {
        let (prefix, suffix) = (parts[0], parts[1]);
        topic.len() >= prefix.len() + suffix.len()
            && topic.starts_with(prefix)
            && topic.ends_with(suffix)
    } else {
        // More complex patterns only match literally
        topic == pattern
    }
}

/// Handle returned by [`Bus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<dyn FnMut(&BusEvent)>>;

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    handler: Handler,
}

struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
    history: VecDeque<BusEvent>,
    history_limit: usize,
}

/// Cheaply clonable handle to a shared bus.
#[derive(Clone)]
pub struct Bus {
    inner: Rc<RefCell<BusInner>>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Bus")
            .field("subscriptions", &inner.subscriptions.len())
            .field("history", &inner.history.len())
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Bus {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                next_id: 0,
                subscriptions: Vec::new(),
                history: VecDeque::with_capacity(history_limit.min(1024)),
                history_limit,
            })),
        }
    }

    /// Register a handler for every event whose topic matches `pattern`.
    pub fn register(
        &self,
        pattern: impl Into<String>,
        handler: impl FnMut(&BusEvent) + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        let pattern = pattern.into();
        tracing::debug!("bus: {:?} registered for {:?}", id, pattern);
        inner.subscriptions.push(Subscription {
            id,
            pattern,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        let removed = inner.subscriptions.len() != before;
        if removed {
            tracing::debug!("bus: {:?} unregistered", id);
        }
        removed
    }

    pub fn is_registered(&self, id: SubscriptionId) -> bool {
        self.inner.borrow().subscriptions.iter().any(|s| s.id == id)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .subscriptions
            .iter()
            .filter(|s| topic_matches(topic, &s.pattern))
            .count()
    }

    /// Deliver an event to every matching handler, in registration order.
    pub fn send(&self, topic: impl Into<String>, payload: BusPayload) {
        let event = BusEvent::new(topic, payload);

        let targets: Vec<(SubscriptionId, Handler)> = {
            let mut inner = self.inner.borrow_mut();
            if inner.history_limit > 0 {
                if inner.history.len() >= inner.history_limit {
                    inner.history.pop_front();
                }
                inner.history.push_back(event.clone());
            }
            inner
                .subscriptions
                .iter()
                .filter(|s| event.matches(&s.pattern))
                .map(|s| (s.id, s.handler.clone()))
                .collect()
        };

        for (id, handler) in targets {
            // An earlier handler may have unregistered this one.
            if !self.is_registered(id) {
                continue;
            }
            match handler.try_borrow_mut() {
                Ok(mut handler) => (*handler)(&event),
                Err(_) => {
                    tracing::warn!(
                        "bus: dropped re-entrant delivery of {:?} to {:?}",
                        event.topic,
                        id
                    );
                }
            }
        }
    }

    /// Check if any recorded event matches the topic pattern
    pub fn has_match(&self, pattern: &str) -> bool {
        self.inner.borrow().history.iter().any(|e| e.matches(pattern))
    }

    /// Take first recorded event matching the pattern (removes it and all events before it)
    pub fn take_match(&self, pattern: &str) -> Option<BusEvent> {
        let mut inner = self.inner.borrow_mut();
        let idx = inner.history.iter().position(|e| e.matches(pattern))?;
        let event = inner.history.get(idx).cloned();
        inner.history.drain(..=idx);
        event
    }

    /// Drain recorded events
    pub fn drain(&self) -> Vec<BusEvent> {
        self.inner.borrow_mut().history.drain(..).collect()
    }

    /// Peek at recorded events
    pub fn history(&self) -> Vec<BusEvent> {
        self.inner.borrow().history.iter().cloned().collect()
    }
}
