/// Where an output event is shown by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Chat,
    Debug,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputEvent {
    pub channel: Channel,
    pub text: String,
}

impl OutputEvent {
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Chat,
            text: text.into(),
        }
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Debug,
            text: text.into(),
        }
    }
}

/// Receives every side effect a script produces. The evaluator never
/// writes to a process stream itself.
pub trait OutputSink {
    fn emit(&mut self, event: OutputEvent);
}

/// Captures events in order.
impl OutputSink for Vec<OutputEvent> {
    fn emit(&mut self, event: OutputEvent) {
        self.push(event);
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct Discard;

impl OutputSink for Discard {
    fn emit(&mut self, _: OutputEvent) {}
}
