//! Outbound MQTT batching and topic naming.

use core::fmt::Write;

use heapless::{String, Vec};

pub const TOPIC_BYTES: usize = 64;
pub const PAYLOAD_BYTES: usize = 256;
pub const DEFAULT_QUEUE_DEPTH: usize = 12;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundMessage {
    pub topic: String<TOPIC_BYTES>,
    pub payload: String<PAYLOAD_BYTES>,
    pub retain: bool,
}

impl OutboundMessage {
    /// `None` when topic or payload exceed their fixed capacity.
    pub fn new(topic: &str, payload: &str, retain: bool) -> Option<Self> {
        let mut message = Self {
            topic: String::new(),
            payload: String::new(),
            retain,
        };
        message.topic.push_str(topic).ok()?;
        message.payload.push_str(payload).ok()?;
        Some(message)
    }
}

/// Fixed-capacity batch flushed once per cycle.
///
/// When full, the newest message is rejected and counted; earlier entries are
/// never evicted.
#[derive(Debug, Default)]
pub struct PublishQueue<const N: usize = DEFAULT_QUEUE_DEPTH> {
    items: Vec<OutboundMessage, N>,
    dropped: u32,
}

impl<const N: usize> PublishQueue<N> {
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, topic: &str, payload: &str, retain: bool) -> bool {
        let accepted = OutboundMessage::new(topic, payload, retain)
            .map(|message| self.items.push(message).is_ok())
            .unwrap_or(false);
        if !accepted {
            self.dropped = self.dropped.saturating_add(1);
        }
        accepted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn front(&self) -> Option<&OutboundMessage> {
        self.items.first()
    }

    /// Removes the oldest message after it was sent.
    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Leaf names under `<prefix>/<device>/`.
pub mod leaf {
    pub const STATE: &str = "state";
    pub const BATTERY: &str = "battery";
    pub const DIAGNOSTICS: &str = "diag";
    pub const CRASH: &str = "crash";
    pub const MEMORY: &str = "memory";
    pub const SLEEP: &str = "sleep";
    pub const COMMAND: &str = "cmd";
}

/// Leaf names under `<prefix>/outside/`, published by the home server.
pub mod outside {
    pub const TEMPERATURE: &str = "temp_f";
    pub const HUMIDITY: &str = "rh";
    pub const ICON: &str = "icon";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Topics {
    prefix: &'static str,
    device_id: &'static str,
}

impl Topics {
    pub const fn new(prefix: &'static str, device_id: &'static str) -> Self {
        Self { prefix, device_id }
    }

    /// `<prefix>/<device>/<leaf>`
    pub fn device(&self, leaf: &str) -> String<TOPIC_BYTES> {
        let mut topic = String::new();
        let _ = write!(topic, "{}/{}/{}", self.prefix, self.device_id, leaf);
        topic
    }

    /// `<prefix>/outside/<leaf>`
    pub fn outside(&self, leaf: &str) -> String<TOPIC_BYTES> {
        let mut topic = String::new();
        let _ = write!(topic, "{}/outside/{}", self.prefix, leaf);
        topic
    }

    pub fn outside_filter(&self) -> String<TOPIC_BYTES> {
        self.outside("#")
    }

    /// Leaf of an outside-data topic, if `topic` is one.
    pub fn match_outside<'t>(&self, topic: &'t str) -> Option<&'t str> {
        topic
            .strip_prefix(self.prefix)?
            .strip_prefix("/outside/")
    }

    pub fn is_command(&self, topic: &str) -> bool {
        self.device(leaf::COMMAND).as_str() == topic
    }
}

/// Small JSON object writer over a fixed buffer. Overflow truncates silently;
/// callers size payloads well under [`PAYLOAD_BYTES`].
pub struct JsonObject {
    out: String<PAYLOAD_BYTES>,
    first: bool,
}

impl Default for JsonObject {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonObject {
    pub fn new() -> Self {
        let mut out = String::new();
        let _ = out.push('{');
        Self { out, first: true }
    }

    fn key(&mut self, key: &str) {
        if !self.first {
            let _ = self.out.push(',');
        }
        self.first = false;
        let _ = write!(self.out, "\"{}\":", key);
    }

    /// Non-finite values are written as `null`.
    pub fn float(mut self, key: &str, value: f32, precision: usize) -> Self {
        self.key(key);
        if value.is_finite() {
            let _ = write!(self.out, "{:.*}", precision, value);
        } else {
            let _ = self.out.push_str("null");
        }
        self
    }

    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.key(key);
        let _ = write!(self.out, "{}", value);
        self
    }

    pub fn boolean(mut self, key: &str, value: bool) -> Self {
        self.key(key);
        let _ = self.out.push_str(if value { "true" } else { "false" });
        self
    }

    /// `value` is written verbatim between quotes; only `"` and `\` are escaped.
    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.key(key);
        let _ = self.out.push('"');
        for ch in value.chars() {
            if ch == '"' || ch == '\\' {
                let _ = self.out.push('\\');
            }
            let _ = self.out.push(ch);
        }
        let _ = self.out.push('"');
        self
    }

    pub fn finish(mut self) -> String<PAYLOAD_BYTES> {
        let _ = self.out.push('}');
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest_and_counts() {
        let mut queue: PublishQueue<2> = PublishQueue::new();
        assert!(queue.push("a", "1", false));
        assert!(queue.push("b", "2", false));
        assert!(!queue.push("c", "3", true));
        assert!(!queue.push("d", "4", true));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.front().unwrap().topic.as_str(), "a");
        assert_eq!(queue.pop_front().unwrap().payload.as_str(), "1");
        assert_eq!(queue.pop_front().unwrap().topic.as_str(), "b");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn oversized_message_counts_as_drop() {
        let mut queue: PublishQueue = PublishQueue::new();
        let long_topic = [b'x'; TOPIC_BYTES + 1];
        let long_topic = core::str::from_utf8(&long_topic).unwrap();

        assert!(!queue.push(long_topic, "{}", false));
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn topics_follow_prefix_device_leaf() {
        let topics = Topics::new("envnode", "porch");
        assert_eq!(topics.device(leaf::STATE).as_str(), "envnode/porch/state");
        assert_eq!(topics.outside_filter().as_str(), "envnode/outside/#");
        assert_eq!(topics.match_outside("envnode/outside/temp_f"), Some("temp_f"));
        assert_eq!(topics.match_outside("other/outside/temp_f"), None);
        assert!(topics.is_command("envnode/porch/cmd"));
        assert!(!topics.is_command("envnode/kitchen/cmd"));
    }

    #[test]
    fn json_object_writes_nulls_for_missing_values() {
        let payload = JsonObject::new()
            .float("temp_f", 72.54, 1)
            .float("rh", f32::NAN, 0)
            .int("percent", -1)
            .boolean("rapid", true)
            .text("fn", "say \"hi\"")
            .finish();
        assert_eq!(
            payload.as_str(),
            "{\"temp_f\":72.5,\"rh\":null,\"percent\":-1,\"rapid\":true,\"fn\":\"say \\\"hi\\\"\"}"
        );
    }
}
