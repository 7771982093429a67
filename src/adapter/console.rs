//! Text-box serial console.
//!
//! Output side: characters from the bus are applied to a [`ConsoleText`] and
//! pushed to the sink through a [`FlushThrottle`], so a flood of single
//! characters costs at most one render per flush interval.
//!
//! Input side: key-press and paste events are turned into character codes and
//! sent to the device, gated by the input-enabled switch. Backspace and Tab
//! key-downs are intercepted regardless of that switch.

use super::input::{InputEvent, SurfaceEvent};
use crate::config::ConsoleConfig;
use crate::model::bus::SubscriptionId;
use crate::model::console_text::{CharEffect, ConsoleText};
use crate::services::channel_port::ChannelPort;
use crate::services::event_loop::{EventLoop, TimerId};
use crate::services::focus::{FocusCoordinator, FocusRegistration, SurfaceId};
use crate::services::throttle::{FlushDecision, FlushThrottle, ThrottleState};
use crate::services::time_source::SharedTimeSource;
use crate::view::PresentationSink;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type InputFilter = Box<dyn Fn(&InputEvent) -> bool>;

/// State shared between the adapter, its bus subscription and its flush timer.
struct ConsoleCore<S> {
    text: ConsoleText,
    throttle: FlushThrottle,
    flush_timer: Option<TimerId>,
    /// Set when a scheduled flush was dropped on detach.
    stale: bool,
    renders: u64,
    sink: S,
}

impl<S: PresentationSink> ConsoleCore<S> {
    fn render(&mut self) {
        self.sink.set_text(self.text.as_str());
        if self.text.take_newline() {
            self.sink.scroll_to_end();
        }
        self.stale = false;
        self.renders += 1;
    }
}

/// Apply one output character and run it through the throttle.
fn show_char<S: PresentationSink + 'static>(
    core_rc: &Rc<RefCell<ConsoleCore<S>>>,
    event_loop: &EventLoop,
    c: char,
) {
    let mut core = core_rc.borrow_mut();
    if core.text.apply(c) == CharEffect::Ignored {
        return;
    }
    request_flush(core_rc, &mut core, event_loop);
}

/// Run a change through the throttle: render now, schedule, or coalesce.
fn request_flush<S: PresentationSink + 'static>(
    core_rc: &Rc<RefCell<ConsoleCore<S>>>,
    core: &mut ConsoleCore<S>,
    event_loop: &EventLoop,
) {
    match core.throttle.on_mutation(event_loop.now()) {
        FlushDecision::Immediate { cancel_pending } => {
            let timer = core.flush_timer.take();
            debug_assert_eq!(cancel_pending, timer.is_some());
            if let Some(timer) = timer {
                event_loop.clear_timeout(timer);
            }
            core.render();
        }
        FlushDecision::Schedule(wait) => {
            let weak = Rc::downgrade(core_rc);
            let time = event_loop.time().clone();
            let timer = event_loop.set_timeout(wait, move || flush_on_timer(&weak, &time));
            core.flush_timer = Some(timer);
            tracing::trace!("console: flush scheduled in {:?}", wait);
        }
        FlushDecision::Coalesced => {}
    }
}

fn flush_on_timer<S: PresentationSink>(core: &Weak<RefCell<ConsoleCore<S>>>, time: &SharedTimeSource) {
    let Some(core) = core.upgrade() else {
        return;
    };
    let mut core = core.borrow_mut();
    core.flush_timer = None;
    core.throttle.on_timer_fired(time.now());
    core.render();
}

/// The text-box console attached to one serial port.
pub struct ConsoleAdapter<S: PresentationSink + 'static> {
    core: Rc<RefCell<ConsoleCore<S>>>,
    port: ChannelPort,
    event_loop: Rc<EventLoop>,
    focus: Rc<FocusCoordinator>,
    surface: SurfaceId,
    output_subscription: Option<SubscriptionId>,
    /// Present while attached.
    focus_registration: Option<FocusRegistration>,
    input_enabled: bool,
    input_filter: Option<InputFilter>,
    cancel_flush_on_detach: bool,
}

impl<S: PresentationSink + 'static> ConsoleAdapter<S> {
    /// Create an attached console that reports focus to the thread's global
    /// [`FocusCoordinator`].
    pub fn new(
        sink: S,
        port: ChannelPort,
        event_loop: Rc<EventLoop>,
        config: &ConsoleConfig,
    ) -> Self {
        Self::with_focus(sink, port, event_loop, FocusCoordinator::global(), config)
    }

    pub fn with_focus(
        sink: S,
        port: ChannelPort,
        event_loop: Rc<EventLoop>,
        focus: Rc<FocusCoordinator>,
        config: &ConsoleConfig,
    ) -> Self {
        let core = Rc::new(RefCell::new(ConsoleCore {
            text: ConsoleText::new(),
            throttle: FlushThrottle::new(config.flush_interval()),
            flush_timer: None,
            stale: false,
            renders: 0,
            sink,
        }));

        let weak = Rc::downgrade(&core);
        let loop_for_output = event_loop.clone();
        let output_subscription = port.on_output_char(move |c| {
            if let Some(core) = weak.upgrade() {
                show_char(&core, &loop_for_output, c);
            }
        });

        let mut adapter = Self {
            core,
            port,
            event_loop,
            focus,
            surface: SurfaceId::next(),
            output_subscription: Some(output_subscription),
            focus_registration: None,
            input_enabled: config.input_enabled,
            input_filter: None,
            cancel_flush_on_detach: config.cancel_flush_on_detach,
        };
        adapter.attach();
        adapter
    }

    /// Show the surface and start handling its input.
    ///
    /// Any previous listeners are removed first, so calling this again is safe.
    pub fn attach(&mut self) {
        self.remove_listeners();

        let weak = Rc::downgrade(&self.core);
        let registration = self.focus.register(self.surface, move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            match core.try_borrow_mut() {
                Ok(mut core) => core.sink.blur(),
                Err(_) => tracing::warn!("console: blur skipped, console busy"),
            };
        });
        self.focus_registration = Some(registration);

        let mut core = self.core.borrow_mut();
        core.sink.set_visible(true);
        if core.stale && core.flush_timer.is_none() {
            request_flush(&self.core, &mut core, &self.event_loop);
        }
        tracing::info!("console {:?} attached", self.surface);
    }

    /// Stop handling input. Output keeps being buffered.
    ///
    /// A scheduled render is dropped if `cancel_flush_on_detach` is set; the
    /// next attach requests it again through the throttle.
    pub fn detach(&mut self) {
        let was_attached = self.remove_listeners();
        if self.cancel_flush_on_detach {
            self.cancel_pending_flush();
        }
        if was_attached {
            tracing::info!("console {:?} detached", self.surface);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.focus_registration.is_some()
    }

    fn remove_listeners(&mut self) -> bool {
        match self.focus_registration.take() {
            Some(registration) => {
                self.focus.unregister(registration);
                true
            }
            None => false,
        }
    }

    fn cancel_pending_flush(&mut self) {
        let mut core = self.core.borrow_mut();
        if let Some(timer) = core.flush_timer.take() {
            self.event_loop.clear_timeout(timer);
        }
        if core.throttle.cancel() {
            core.stale = true;
            tracing::debug!("console: pending flush dropped");
        }
    }

    /// Feed one output character directly, as if it came from the bus.
    pub fn show_char(&self, c: char) {
        show_char(&self.core, &self.event_loop, c);
    }

    /// Handle an event from the input surface. Returns true if it was consumed.
    pub fn dispatch(&self, event: &mut SurfaceEvent) -> bool {
        if !self.is_attached() {
            return false;
        }

        match event.event() {
            InputEvent::KeyPress { code } => {
                if !self.may_handle(event.event()) {
                    return false;
                }
                self.port.send_char(*code);
                event.prevent_default();
                true
            }
            InputEvent::KeyDown { .. } => match event.event().intercepted_key_code() {
                Some(code) => {
                    self.port.send_char(code);
                    event.prevent_default();
                    true
                }
                None => false,
            },
            InputEvent::Paste { text } => {
                if !self.may_handle(event.event()) {
                    return false;
                }
                for c in text.chars() {
                    self.port.send_char(c as u32);
                }
                event.prevent_default();
                true
            }
        }
    }

    fn may_handle(&self, event: &InputEvent) -> bool {
        if !self.input_enabled {
            return false;
        }
        self.input_filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        tracing::debug!("console: input {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Extra check on key-press and paste events, on top of input-enabled.
    pub fn set_input_filter(&mut self, filter: impl Fn(&InputEvent) -> bool + 'static) {
        self.input_filter = Some(Box::new(filter));
    }

    pub fn clear_input_filter(&mut self) {
        self.input_filter = None;
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface
    }

    pub fn port(&self) -> &ChannelPort {
        &self.port
    }

    /// Everything buffered so far, rendered or not.
    pub fn text(&self) -> String {
        self.core.borrow().text.as_str().to_string()
    }

    pub fn throttle_state(&self) -> ThrottleState {
        self.core.borrow().throttle.state()
    }

    pub fn has_pending_flush(&self) -> bool {
        self.core.borrow().flush_timer.is_some()
    }

    /// Number of renders pushed to the sink.
    pub fn render_count(&self) -> u64 {
        self.core.borrow().renders
    }

    pub fn has_focus(&self) -> bool {
        self.core.borrow().sink.has_focus()
    }

    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.core.borrow().sink)
    }

    pub fn with_sink_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.core.borrow_mut().sink)
    }
}

impl<S: PresentationSink + 'static> Drop for ConsoleAdapter<S> {
    fn drop(&mut self) {
        self.remove_listeners();
        if let Some(timer) = self.core.borrow_mut().flush_timer.take() {
            self.event_loop.clear_timeout(timer);
        }
        if let Some(subscription) = self.output_subscription.take() {
            self.port.unsubscribe(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bus::{topics, Bus, BusPayload, SerialInput};
    use crate::services::time_source::TestTimeSource;
    use crate::view::{MemorySink, SinkCall};
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        time: Arc<TestTimeSource>,
        event_loop: Rc<EventLoop>,
        bus: Bus,
        focus: Rc<FocusCoordinator>,
        console: ConsoleAdapter<MemorySink>,
    }

    fn harness_with(config: ConsoleConfig) -> Harness {
        let time = TestTimeSource::shared();
        let event_loop = Rc::new(EventLoop::new(time.clone()));
        let bus = Bus::default();
        let focus = Rc::new(FocusCoordinator::new());
        let console = ConsoleAdapter::with_focus(
            MemorySink::new(),
            ChannelPort::new(bus.clone()),
            event_loop.clone(),
            focus.clone(),
            &config,
        );
        Harness {
            time,
            event_loop,
            bus,
            focus,
            console,
        }
    }

    fn harness() -> Harness {
        harness_with(ConsoleConfig::default())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    impl Harness {
        fn output(&self, s: &str) {
            let port = ChannelPort::new(self.bus.clone());
            for c in s.chars() {
                port.push_output(c);
            }
        }

        fn sent(&self) -> Vec<SerialInput> {
            self.bus
                .history()
                .into_iter()
                .filter(|e| e.topic == topics::SERIAL0_INPUT)
                .filter_map(|e| match e.payload {
                    BusPayload::Input(input) => Some(input),
                    BusPayload::OutputChar(_) => None,
                })
                .collect()
        }

        fn renders(&self) -> Vec<String> {
            self.console
                .with_sink(|s| s.renders().into_iter().map(String::from).collect())
        }
    }

    #[test]
    fn attach_on_creation_shows_surface() {
        let h = harness();
        assert!(h.console.is_attached());
        assert!(h.console.with_sink(|s| s.is_visible()));
        assert_eq!(h.focus.len(), 1);
    }

    #[test]
    fn first_char_renders_immediately() {
        let h = harness();
        h.output("$");
        assert_eq!(h.renders(), vec!["$"]);
        assert!(!h.console.has_pending_flush());
    }

    #[test]
    fn chars_within_window_coalesce_into_one_render() {
        let h = harness();
        h.output("a");
        h.time.advance(ms(3));
        h.output("bcd");

        assert_eq!(h.renders(), vec!["a"]);
        assert!(h.console.has_pending_flush());
        assert_eq!(h.event_loop.pending_timers(), 1);

        h.event_loop.run_for(ms(12));
        assert_eq!(h.renders(), vec!["a"]);
        h.event_loop.run_for(ms(1));
        assert_eq!(h.renders(), vec!["a", "abcd"]);
        assert_eq!(h.time.millis(), 16);
        assert!(matches!(h.console.throttle_state(), ThrottleState::Idle { .. }));
    }

    #[test]
    fn char_after_quiet_period_renders_immediately() {
        let h = harness();
        h.output("a");
        h.time.advance(ms(16));
        h.output("b");
        assert_eq!(h.renders(), vec!["a", "ab"]);
    }

    #[test]
    fn stalled_timer_is_replaced_by_immediate_render() {
        let h = harness();
        h.output("a");
        h.time.advance(ms(1));
        h.output("b");
        assert!(h.console.has_pending_flush());

        // Loop did not get to run the timer before the next char arrived.
        h.time.advance(ms(30));
        h.output("c");

        assert_eq!(h.renders(), vec!["a", "abc"]);
        assert!(!h.console.has_pending_flush());
        assert_eq!(h.event_loop.pending_timers(), 0);
    }

    #[test]
    fn carriage_return_never_renders() {
        let h = harness();
        h.output("\r");
        assert_eq!(h.console.render_count(), 0);
        assert_eq!(h.event_loop.pending_timers(), 0);
        assert_eq!(h.console.text(), "");
    }

    #[test]
    fn newline_scrolls_once() {
        let h = harness();
        h.output("line\n");
        h.event_loop.run_until_idle();
        h.time.advance(ms(20));
        h.output("x");
        h.event_loop.run_until_idle();

        let calls = h.console.with_sink(|s| s.calls().to_vec());
        let scrolls = calls.iter().filter(|c| **c == SinkCall::ScrollToEnd).count();
        assert_eq!(scrolls, 1);
        assert_eq!(calls.last(), Some(&SinkCall::SetText("line\nx".into())));
    }

    #[test]
    fn scroll_follows_the_render_that_contains_the_newline() {
        let h = harness();
        h.output("a");
        h.output("\n");
        h.event_loop.run_until_idle();

        let calls = h.console.with_sink(|s| s.calls().to_vec());
        assert_eq!(
            &calls[calls.len() - 2..],
            &[SinkCall::SetText("a\n".into()), SinkCall::ScrollToEnd]
        );
    }

    #[test]
    fn key_press_sends_code_and_prevents_default() {
        let h = harness();
        let mut event = SurfaceEvent::key_press('x' as u32);
        assert!(h.console.dispatch(&mut event));
        assert!(event.default_prevented());
        assert_eq!(h.sent(), vec![SerialInput::SingleChar(120)]);
    }

    #[test]
    fn backspace_key_down_sends_del() {
        let h = harness();
        let mut backspace = SurfaceEvent::key_down(8);
        let mut tab = SurfaceEvent::key_down(9);
        let mut enter = SurfaceEvent::key_down(13);

        assert!(h.console.dispatch(&mut backspace));
        assert!(h.console.dispatch(&mut tab));
        assert!(!h.console.dispatch(&mut enter));

        assert!(backspace.default_prevented());
        assert!(tab.default_prevented());
        assert!(!enter.default_prevented());
        assert_eq!(
            h.sent(),
            vec![SerialInput::SingleChar(127), SerialInput::SingleChar(9)]
        );
    }

    #[test]
    fn paste_sends_each_char_in_order() {
        let h = harness();
        let mut event = SurfaceEvent::paste("ls -l\n");
        assert!(h.console.dispatch(&mut event));
        assert!(event.default_prevented());

        let codes: Vec<SerialInput> = "ls -l\n"
            .chars()
            .map(|c| SerialInput::SingleChar(c as u32))
            .collect();
        assert_eq!(h.sent(), codes);
    }

    #[test]
    fn empty_paste_sends_nothing() {
        let h = harness();
        let mut event = SurfaceEvent::paste("");
        h.console.dispatch(&mut event);
        assert!(h.sent().is_empty());
    }

    #[test]
    fn disabled_input_only_lets_backspace_and_tab_through() {
        let mut h = harness();
        h.console.set_input_enabled(false);

        let mut press = SurfaceEvent::key_press('a' as u32);
        let mut paste = SurfaceEvent::paste("abc");
        let mut backspace = SurfaceEvent::key_down(8);
        let mut tab = SurfaceEvent::key_down(9);

        assert!(!h.console.dispatch(&mut press));
        assert!(!h.console.dispatch(&mut paste));
        assert!(!press.default_prevented());
        assert!(!paste.default_prevented());

        assert!(h.console.dispatch(&mut backspace));
        assert!(h.console.dispatch(&mut tab));
        assert_eq!(
            h.sent(),
            vec![SerialInput::SingleChar(127), SerialInput::SingleChar(9)]
        );
    }

    #[test]
    fn input_filter_gates_key_press_and_paste() {
        let mut h = harness();
        h.console
            .set_input_filter(|event| !matches!(event, InputEvent::Paste { .. }));

        h.console.dispatch(&mut SurfaceEvent::paste("no"));
        h.console.dispatch(&mut SurfaceEvent::key_press(121));
        assert_eq!(h.sent(), vec![SerialInput::SingleChar(121)]);

        h.console.clear_input_filter();
        h.console.dispatch(&mut SurfaceEvent::paste("z"));
        assert_eq!(h.sent().len(), 2);
    }

    #[test]
    fn detached_console_ignores_input_but_buffers_output() {
        let mut h = harness();
        h.console.detach();
        assert!(!h.console.is_attached());
        assert!(h.focus.is_empty());

        assert!(!h.console.dispatch(&mut SurfaceEvent::key_down(8)));
        assert!(h.sent().is_empty());

        h.output("still here");
        assert_eq!(h.console.text(), "still here");
    }

    #[test]
    fn reattach_does_not_duplicate_listeners() {
        let mut h = harness();
        h.console.attach();
        h.console.attach();
        assert_eq!(h.focus.len(), 1);

        h.console.dispatch(&mut SurfaceEvent::key_press(65));
        assert_eq!(h.sent().len(), 1);
    }

    #[test]
    fn detach_cancels_pending_flush_and_attach_catches_up() {
        let mut h = harness();
        h.output("a");
        h.output("b");
        assert!(h.console.has_pending_flush());

        h.console.detach();
        assert_eq!(h.event_loop.pending_timers(), 0);
        h.event_loop.run_until_idle();
        assert_eq!(h.renders(), vec!["a"]);

        h.console.attach();
        assert_eq!(h.renders(), vec!["a"]);
        assert!(h.console.has_pending_flush());
        h.event_loop.run_until_idle();
        assert_eq!(h.renders(), vec!["a", "ab"]);
        assert_eq!(h.time.millis(), 16);
    }

    #[test]
    fn catch_up_after_reattach_respects_window() {
        let mut h = harness();
        h.output("a");
        h.output("b");
        h.event_loop.run_for(ms(15));
        h.console.detach();
        h.console.attach();
        h.event_loop.run_for(ms(1));
        h.output("c");

        assert_eq!(h.renders(), vec!["a", "ab"]);
        assert_eq!(h.time.millis(), 16);
        assert!(h.console.has_pending_flush());

        h.event_loop.run_until_idle();
        assert_eq!(h.renders(), vec!["a", "ab", "abc"]);
        assert_eq!(h.time.millis(), 32);
    }

    #[test]
    fn catch_up_after_long_detach_renders_at_once() {
        let mut h = harness();
        h.output("a");
        h.output("b");
        h.console.detach();
        h.time.advance(ms(40));
        h.console.attach();
        assert_eq!(h.renders(), vec!["a", "ab"]);
        assert!(!h.console.has_pending_flush());
    }

    #[test]
    fn detach_keeps_pending_flush_when_configured() {
        let mut h = harness_with(ConsoleConfig {
            cancel_flush_on_detach: false,
            ..ConsoleConfig::default()
        });
        h.output("a");
        h.output("b");

        h.console.detach();
        h.event_loop.run_until_idle();
        assert_eq!(h.renders(), vec!["a", "ab"]);
    }

    #[test]
    fn pointer_down_elsewhere_blurs_console() {
        let h = harness();
        h.focus.pointer_down(Some(h.console.surface_id()));
        assert!(h.console.has_focus());

        h.focus.pointer_down(None);
        assert!(!h.console.has_focus());
        assert_eq!(
            h.console
                .with_sink(|s| s.calls().iter().filter(|c| **c == SinkCall::Blur).count()),
            1
        );
    }

    #[test]
    fn dropping_console_releases_everything() {
        let h = harness();
        h.output("a");
        h.output("b");
        let Harness {
            event_loop,
            bus,
            focus,
            console,
            ..
        } = h;

        drop(console);
        assert_eq!(event_loop.pending_timers(), 0);
        assert_eq!(bus.subscriber_count(topics::SERIAL0_OUTPUT_CHAR), 0);
        assert!(focus.is_empty());
    }

    #[test]
    fn custom_interval_is_respected() {
        let h = harness_with(ConsoleConfig {
            flush_interval_ms: 100,
            ..ConsoleConfig::default()
        });
        h.output("a");
        h.time.advance(ms(40));
        h.output("b");

        h.event_loop.run_for(ms(59));
        assert_eq!(h.console.render_count(), 1);
        h.event_loop.run_for(ms(1));
        assert_eq!(h.console.render_count(), 2);
    }
}
