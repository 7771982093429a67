//! Alternate presentation: hand the raw stream to an external terminal emulator.
//!
//! The emulator does all escape-sequence interpretation and keystroke
//! encoding. The bridge only feeds it output characters and forwards the
//! strings it produces to the device as [`SerialInput::TextRun`]s.
//!
//! [`SerialInput::TextRun`]: crate::model::bus::SerialInput::TextRun

use crate::config::EmulatorConfig;
use crate::model::bus::SubscriptionId;
use crate::services::channel_port::ChannelPort;
use crate::services::event_loop::{EventLoop, TimerId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A terminal emulator the bridge can drive.
pub trait TerminalEmulator {
    /// Print device output. The emulator interprets control sequences itself.
    fn print(&mut self, text: &str);

    /// Attach the emulator to its display (again).
    fn decorate(&mut self);
}

struct BridgeState<E> {
    emulator: Option<E>,
    output_subscription: Option<SubscriptionId>,
    init_timer: Option<TimerId>,
}

pub struct EmulatorBridge<E: TerminalEmulator + 'static> {
    state: Rc<RefCell<BridgeState<E>>>,
    port: ChannelPort,
    event_loop: Rc<EventLoop>,
}

impl<E: TerminalEmulator + 'static> EmulatorBridge<E> {
    /// Schedule emulator start-up after `config.init_delay_ms`.
    ///
    /// `factory` runs once the delay has passed; returning `None` means no
    /// emulator is available and the bridge stays inert.
    pub fn new(
        port: ChannelPort,
        event_loop: Rc<EventLoop>,
        config: &EmulatorConfig,
        factory: impl FnOnce() -> Option<E> + 'static,
    ) -> Self {
        let state = Rc::new(RefCell::new(BridgeState {
            emulator: None,
            output_subscription: None,
            init_timer: None,
        }));

        let weak = Rc::downgrade(&state);
        let init_port = port.clone();
        let banner = config.banner.clone();
        let timer = event_loop.set_timeout(config.init_delay(), move || {
            initialize(&weak, &init_port, &banner, factory);
        });
        state.borrow_mut().init_timer = Some(timer);

        Self {
            state,
            port,
            event_loop,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().emulator.is_some()
    }

    /// Forward an encoded keystroke. Ignored until the emulator is ready.
    pub fn on_keystroke(&self, keys: &str) -> bool {
        if !self.is_ready() || keys.is_empty() {
            return false;
        }
        self.port.send_text(keys);
        true
    }

    /// Forward a string the emulator generated itself (a paste, a report).
    pub fn send_string(&self, text: &str) -> bool {
        self.on_keystroke(text)
    }

    /// Re-decorate the display, if the emulator is up.
    pub fn show(&self) {
        if let Some(emulator) = self.state.borrow_mut().emulator.as_mut() {
            emulator.decorate();
        }
    }

    pub fn with_emulator<R>(&self, f: impl FnOnce(&E) -> R) -> Option<R> {
        self.state.borrow().emulator.as_ref().map(f)
    }

    pub fn with_emulator_mut<R>(&self, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        self.state.borrow_mut().emulator.as_mut().map(f)
    }
}

fn initialize<E: TerminalEmulator + 'static>(
    state: &Weak<RefCell<BridgeState<E>>>,
    port: &ChannelPort,
    banner: &str,
    factory: impl FnOnce() -> Option<E>,
) {
    let Some(state_rc) = state.upgrade() else {
        return;
    };
    state_rc.borrow_mut().init_timer = None;

    let Some(mut emulator) = factory() else {
        tracing::info!("emulator: not available, staying inert");
        return;
    };

    if !banner.is_empty() {
        emulator.print(banner);
    }

    let weak = Rc::downgrade(&state_rc);
    let subscription = port.on_output_char(move |c| {
        let Some(state) = weak.upgrade() else {
            return;
        };
        let mut state = state.borrow_mut();
        if let Some(emulator) = state.emulator.as_mut() {
            let mut buf = [0u8; 4];
            emulator.print(c.encode_utf8(&mut buf));
        }
    });
    emulator.decorate();

    let mut state = state_rc.borrow_mut();
    state.emulator = Some(emulator);
    state.output_subscription = Some(subscription);
    tracing::info!("emulator: ready");
}

impl<E: TerminalEmulator + 'static> Drop for EmulatorBridge<E> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if let Some(timer) = state.init_timer.take() {
            self.event_loop.clear_timeout(timer);
        }
        if let Some(subscription) = state.output_subscription.take() {
            self.port.unsubscribe(subscription);
        }
    }
}
