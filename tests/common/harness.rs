//! A console wired to a logical clock, an in-memory sink and a private bus.

use serial_console::adapter::ConsoleAdapter;
use serial_console::config::ConsoleConfig;
use serial_console::model::bus::{topics, Bus, BusPayload, SerialInput};
use serial_console::services::channel_port::ChannelPort;
use serial_console::services::event_loop::EventLoop;
use serial_console::services::focus::FocusCoordinator;
use serial_console::services::time_source::TestTimeSource;
use serial_console::view::{MemorySink, PresentationSink};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

pub struct ConsoleHarness<S: PresentationSink + 'static = MemorySink> {
    pub time: Arc<TestTimeSource>,
    pub event_loop: Rc<EventLoop>,
    pub bus: Bus,
    pub focus: Rc<FocusCoordinator>,
    pub console: ConsoleAdapter<S>,
}

impl ConsoleHarness<MemorySink> {
    pub fn new() -> Self {
        Self::with_sink(MemorySink::new(), ConsoleConfig::default())
    }

    pub fn with_config(config: ConsoleConfig) -> Self {
        Self::with_sink(MemorySink::new(), config)
    }

    pub fn renders(&self) -> Vec<String> {
        self.console
            .with_sink(|sink| sink.renders().into_iter().map(String::from).collect())
    }

    pub fn scroll_count(&self) -> usize {
        self.console.with_sink(|sink| sink.scroll_count())
    }

    pub fn clear_calls(&self) {
        self.console.with_sink_mut(|sink| sink.clear_calls());
    }

    /// Render once so the next burst lands inside a throttle window.
    pub fn prime(&self, c: char) {
        self.output(&c.to_string());
        assert_eq!(self.console.render_count(), 1, "priming render");
        self.clear_calls();
    }
}

impl<S: PresentationSink + 'static> ConsoleHarness<S> {
    pub fn with_sink(sink: S, config: ConsoleConfig) -> Self {
        let time = TestTimeSource::shared();
        let event_loop = Rc::new(EventLoop::new(time.clone()));
        let bus = Bus::default();
        let focus = Rc::new(FocusCoordinator::new());
        let console = ConsoleAdapter::with_focus(
            sink,
            ChannelPort::new(bus.clone()),
            event_loop.clone(),
            focus.clone(),
            &config,
        );
        Self {
            time,
            event_loop,
            bus,
            focus,
            console,
        }
    }

    /// Publish `text` on the output topic, one char per event.
    pub fn output(&self, text: &str) {
        for c in text.chars() {
            self.bus
                .send(topics::SERIAL0_OUTPUT_CHAR, BusPayload::OutputChar(c));
        }
    }

    /// Let `ms` milliseconds pass, firing timers on the way.
    pub fn wait_ms(&self, ms: u64) -> usize {
        self.event_loop.run_for(Duration::from_millis(ms))
    }

    /// Everything published on the input topic, in order.
    pub fn sent(&self) -> Vec<SerialInput> {
        self.bus
            .history()
            .into_iter()
            .filter(|event| event.topic == topics::SERIAL0_INPUT)
            .filter_map(|event| match event.payload {
                BusPayload::Input(input) => Some(input),
                BusPayload::OutputChar(_) => None,
            })
            .collect()
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent().iter().flat_map(SerialInput::to_bytes).collect()
    }
}
