use super::PresentationSink;

/// One call made on a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    SetText(String),
    ScrollToEnd,
    SetVisible(bool),
    Blur,
}

/// Sink that keeps the text in memory and records every call made on it.
#[derive(Debug, Clone)]
pub struct MemorySink {
    text: String,
    visible: bool,
    focused: bool,
    calls: Vec<SinkCall>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            visible: false,
            focused: true,
            calls: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Give focus back, as a click on the surface would.
    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    /// Texts pushed by `set_text`, in order.
    pub fn renders(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SinkCall::SetText(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn render_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::SetText(_)))
            .count()
    }

    pub fn scroll_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SinkCall::ScrollToEnd))
            .count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl PresentationSink for MemorySink {
    fn set_text(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.calls.push(SinkCall::SetText(text.to_string()));
    }

    fn scroll_to_end(&mut self) {
        self.calls.push(SinkCall::ScrollToEnd);
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.calls.push(SinkCall::SetVisible(visible));
    }

    fn blur(&mut self) {
        self.focused = false;
        self.calls.push(SinkCall::Blur);
    }

    fn has_focus(&self) -> bool {
        self.focused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let mut sink = MemorySink::new();
        sink.set_visible(true);
        sink.set_text("a");
        sink.scroll_to_end();
        sink.set_text("ab");

        assert_eq!(sink.text(), "ab");
        assert_eq!(sink.renders(), vec!["a", "ab"]);
        assert_eq!(sink.render_count(), 2);
        assert_eq!(sink.scroll_count(), 1);
        assert_eq!(sink.calls()[0], SinkCall::SetVisible(true));
    }

    #[test]
    fn blur_and_focus() {
        let mut sink = MemorySink::new();
        assert!(sink.has_focus());
        sink.blur();
        assert!(!sink.has_focus());
        sink.focus();
        assert!(sink.has_focus());
    }
}
