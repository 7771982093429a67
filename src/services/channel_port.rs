//! Thin shim over the bus for one serial port.
//!
//! Consoles subscribe to the output-character topic and publish character
//! codes on the input topic. The port holds no state besides the bus handle and
//! the two topic names.

use crate::config::BusConfig;
use crate::model::bus::{topics, Bus, BusPayload, SerialInput, SubscriptionId};

#[derive(Debug, Clone)]
pub struct ChannelPort {
    bus: Bus,
    output_topic: String,
    input_topic: String,
}

impl ChannelPort {
    /// Port on the default `serial0` topics.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            output_topic: topics::SERIAL0_OUTPUT_CHAR.to_string(),
            input_topic: topics::SERIAL0_INPUT.to_string(),
        }
    }

    pub fn with_config(bus: Bus, config: &BusConfig) -> Self {
        Self {
            bus,
            output_topic: config.output_topic.clone(),
            input_topic: config.input_topic.clone(),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    /// Call `handler` for every character the device outputs.
    pub fn on_output_char(&self, mut handler: impl FnMut(char) + 'static) -> SubscriptionId {
        self.bus.register(self.output_topic.clone(), move |event| {
            if let BusPayload::OutputChar(c) = event.payload {
                handler(c);
            }
        })
    }

    /// Send one character code towards the device.
    pub fn send_char(&self, code: u32) {
        self.bus.send(
            self.input_topic.clone(),
            BusPayload::Input(SerialInput::SingleChar(code)),
        );
    }

    /// Send a run of text towards the device (terminal emulator keystrokes).
    pub fn send_text(&self, text: &str) {
        self.bus.send(
            self.input_topic.clone(),
            BusPayload::Input(SerialInput::TextRun(text.to_string())),
        );
    }

    /// Device side: call `handler` for every input event, in either shape.
    pub fn on_input(&self, mut handler: impl FnMut(&SerialInput) + 'static) -> SubscriptionId {
        self.bus.register(self.input_topic.clone(), move |event| {
            if let BusPayload::Input(input) = &event.payload {
                handler(input);
            }
        })
    }

    /// Device side: publish one output character.
    pub fn push_output(&self, c: char) {
        self.bus
            .send(self.output_topic.clone(), BusPayload::OutputChar(c));
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unregister(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn output_chars_reach_subscriber() {
        let port = ChannelPort::new(Bus::default());
        let seen = Rc::new(RefCell::new(String::new()));
        let s = seen.clone();
        port.on_output_char(move |c| s.borrow_mut().push(c));

        for c in "ok\n".chars() {
            port.push_output(c);
        }
        assert_eq!(*seen.borrow(), "ok\n");
    }

    #[test]
    fn input_of_both_shapes_reaches_device() {
        let port = ChannelPort::new(Bus::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        port.on_input(move |input| s.borrow_mut().push(input.clone()));

        port.send_char(97);
        port.send_text("\x1b[A");

        assert_eq!(
            *seen.borrow(),
            vec![
                SerialInput::SingleChar(97),
                SerialInput::TextRun("\x1b[A".into())
            ]
        );
    }

    #[test]
    fn input_is_published_on_input_topic_only() {
        let bus = Bus::default();
        let port = ChannelPort::new(bus.clone());
        let outputs = Rc::new(RefCell::new(0));
        let o = outputs.clone();
        port.on_output_char(move |_| *o.borrow_mut() += 1);

        port.send_char(9);

        assert_eq!(*outputs.borrow(), 0);
        let event = bus.take_match(topics::SERIAL0_INPUT).unwrap();
        assert_eq!(event.payload, BusPayload::Input(SerialInput::SingleChar(9)));
    }

    #[test]
    fn configured_topics_are_used() {
        let config = BusConfig {
            output_topic: "com2-out".into(),
            input_topic: "com2-in".into(),
            ..BusConfig::default()
        };
        let bus = Bus::default();
        let port = ChannelPort::with_config(bus.clone(), &config);

        port.send_char(1);
        port.push_output('z');

        let topics: Vec<String> = bus.history().into_iter().map(|e| e.topic).collect();
        assert_eq!(topics, vec!["com2-in", "com2-out"]);
        assert_eq!(port.input_topic(), "com2-in");
        assert_eq!(port.output_topic(), "com2-out");
    }

    #[test]
    fn unsubscribe_stops_output() {
        let port = ChannelPort::new(Bus::default());
        let seen = Rc::new(RefCell::new(String::new()));
        let s = seen.clone();
        let id = port.on_output_char(move |c| s.borrow_mut().push(c));

        port.push_output('a');
        assert!(port.unsubscribe(id));
        port.push_output('b');
        assert_eq!(*seen.borrow(), "a");
    }
}
