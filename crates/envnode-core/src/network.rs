//! Transport seen by the network phase.

use heapless::String;

use crate::publish::TOPIC_BYTES;

pub const INBOUND_PAYLOAD_BYTES: usize = 64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundMessage {
    pub topic: String<TOPIC_BYTES>,
    pub payload: String<INBOUND_PAYLOAD_BYTES>,
}

impl InboundMessage {
    /// `None` when either part does not fit.
    pub fn new(topic: &str, payload: &str) -> Option<Self> {
        let mut message = Self {
            topic: String::new(),
            payload: String::new(),
        };
        message.topic.push_str(topic).ok()?;
        message.payload.push_str(payload).ok()?;
        Some(message)
    }

    /// Same as [`InboundMessage::new`] for a raw payload, which must be UTF-8.
    pub fn from_bytes(topic: &str, payload: &[u8]) -> Option<Self> {
        Self::new(topic, core::str::from_utf8(payload).ok()?)
    }
}

/// Publish/subscribe link with a bounded outbound batch.
///
/// Every async method takes its own budget and must return once it is spent.
#[allow(async_fn_in_trait)]
pub trait NetworkTransport {
    type Error: core::fmt::Debug;

    async fn connect(&mut self, budget_ms: u32) -> Result<(), Self::Error>;

    fn is_connected(&self) -> bool;

    async fn subscribe(&mut self, topic_filter: &str) -> Result<(), Self::Error>;

    /// Adds to the outbound batch; `false` means the batch was full and the
    /// message was dropped.
    fn queue_publish(&mut self, topic: &str, payload: &str, retain: bool) -> bool;

    /// Sends the batch, returning how many messages went out.
    async fn flush(&mut self, budget_ms: u32) -> Result<usize, Self::Error>;

    /// Next inbound message, waiting at most `wait_ms`.
    async fn poll_inbound(&mut self, wait_ms: u32) -> Result<Option<InboundMessage>, Self::Error>;

    async fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_payload_must_be_text_that_fits() {
        let message = InboundMessage::from_bytes("envnode/node/cmd", b"refresh").unwrap();
        assert_eq!(message.topic.as_str(), "envnode/node/cmd");
        assert_eq!(message.payload.as_str(), "refresh");

        assert_eq!(InboundMessage::from_bytes("envnode/node/cmd", &[0xFF, 0xFE]), None);
        assert_eq!(
            InboundMessage::from_bytes("envnode/node/cmd", &[b'x'; INBOUND_PAYLOAD_BYTES + 1]),
            None
        );
    }
}
