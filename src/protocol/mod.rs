//! Wire protocol for the bus
//!
//! Defines the canonical message envelope, its codec, and channel name
//! construction for routed publishes.

pub mod envelope;

pub use envelope::{
    EncoderStrategy, EventType, MessageEnvelope, CURRENT_SCHEMA_VERSION, SCHEMA_VERSION_KEY,
};

/// Channel name construction for routed publishes
///
/// Events are routed by type under a configurable prefix; the probe channel
/// is reserved for gateway health pings.
pub struct ChannelBuilder;

impl ChannelBuilder {
    /// Build event channel: `{prefix}/{event_type}`
    pub fn event_channel(prefix: &str, event_type: EventType) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), event_type)
    }

    /// Build the reserved health probe channel: `{prefix}/probe`
    pub fn probe_channel(prefix: &str) -> String {
        format!("{}/probe", prefix.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel_construction() {
        assert_eq!(
            ChannelBuilder::event_channel("bus/events", EventType::PromptTrace),
            "bus/events/prompt_trace"
        );
        assert_eq!(
            ChannelBuilder::event_channel("bus/events/", EventType::EventLog),
            "bus/events/event_log"
        );
    }

    #[test]
    fn test_probe_channel_construction() {
        assert_eq!(ChannelBuilder::probe_channel("bus/events"), "bus/events/probe");
    }
}
