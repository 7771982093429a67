//! Headless transcript of everything the device prints.

use crate::model::bus::SubscriptionId;
use crate::services::channel_port::ChannelPort;
use std::cell::RefCell;
use std::rc::Rc;

/// Appends every output character verbatim: no carriage-return dropping, no
/// backspace handling, no throttling.
pub struct RecordingAdapter {
    port: ChannelPort,
    text: Rc<RefCell<String>>,
    subscription: Option<SubscriptionId>,
}

impl RecordingAdapter {
    pub fn new(port: ChannelPort) -> Self {
        let text = Rc::new(RefCell::new(String::new()));
        let sink = text.clone();
        let subscription = port.on_output_char(move |c| sink.borrow_mut().push(c));
        Self {
            port,
            text,
            subscription: Some(subscription),
        }
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.text.borrow().chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.borrow().is_empty()
    }

    /// Take the transcript so far, leaving it empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.text.borrow_mut())
    }
}

impl Drop for RecordingAdapter {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.port.unsubscribe(subscription);
        }
    }
}
