//! Broadcast message type and SSE wire formatting

use bytes::{BufMut, Bytes, BytesMut};

/// Payload written to a subscriber right before it is disconnected for
/// falling behind
pub const CLOSING_PAYLOAD: &str = "closing connection";

/// Payload written when a subscribe request fails authentication
pub const INVALID_AUTH_PAYLOAD: &str = "invalid auth";

/// An event to be fanned out to subscribers
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Optional SSE event name (`event:` field)
    pub event: Option<String>,
    /// Namespace the event originates from, e.g. `/rooms/1/chat`
    pub namespace: String,
    /// Event body
    pub data: Bytes,
}

impl SseMessage {
    /// Create a message without an event name
    pub fn new(namespace: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            event: None,
            namespace: namespace.into(),
            data: data.into(),
        }
    }

    /// Set the SSE event name
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Format the message for the wire
    ///
    /// Each payload line becomes its own `data:` field so that embedded
    /// line breaks (`\r\n`, `\r` or `\n`) cannot terminate the event early or
    /// start a new field.
    pub fn sse_format(&self) -> Bytes {
        let event_len = self.event.as_ref().map_or(0, |e| e.len() + 7);
        let mut buf = BytesMut::with_capacity(event_len + self.data.len() + 8);

        if let Some(ref event) = self.event {
            buf.put_slice(b"event:");
            buf.put_slice(event.as_bytes());
            buf.put_u8(b'\n');
        }

        for line in lines(&self.data) {
            buf.put_slice(b"data:");
            buf.put_slice(line);
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');

        buf.freeze()
    }
}

/// Split on the line terminators an event stream parser recognises
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(data);

    std::iter::from_fn(move || {
        let data = rest?;
        match data.iter().position(|b| *b == b'\r' || *b == b'\n') {
            Some(i) => {
                let skip = if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                rest = Some(&data[i + skip..]);
                Some(&data[..i])
            }
            None => {
                rest = None;
                Some(data)
            }
        }
    })
}

/// Format a bare `data:` event
pub fn sse_data(payload: &str) -> Bytes {
    Bytes::from(format!("data:{}\n\n", payload))
}

/// Namespace matching rule
///
/// A subscription matches when the message namespace starts with it. This is
/// a plain string prefix test: `/ab` matches `/ab/c` and also `/abc`.
pub fn namespace_matches(subscription: &str, namespace: &str) -> bool {
    namespace.starts_with(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain() {
        let msg = SseMessage::new("/rooms/1", "hello");
        assert_eq!(&msg.sse_format()[..], b"data:hello\n\n");
    }

    #[test]
    fn test_format_with_event() {
        let msg = SseMessage::new("/rooms/1", "{\"id\":1}").with_event("chat");
        assert_eq!(&msg.sse_format()[..], b"event:chat\ndata:{\"id\":1}\n\n");
    }

    #[test]
    fn test_format_multiline() {
        let msg = SseMessage::new("/", "line one\nline two");
        assert_eq!(&msg.sse_format()[..], b"data:line one\ndata:line two\n\n");
    }

    #[test]
    fn test_format_carriage_returns() {
        let msg = SseMessage::new("/", "x\revent:foo\r\ny\n");
        assert_eq!(
            &msg.sse_format()[..],
            b"data:x\ndata:event:foo\ndata:y\ndata:\n\n"
        );
    }

    #[test]
    fn test_format_empty_payload() {
        let msg = SseMessage::new("/", Bytes::new());
        assert_eq!(&msg.sse_format()[..], b"data:\n\n");
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(&sse_data(CLOSING_PAYLOAD)[..], b"data:closing connection\n\n");
        assert_eq!(&sse_data(INVALID_AUTH_PAYLOAD)[..], b"data:invalid auth\n\n");
    }

    #[test]
    fn test_namespace_matches() {
        assert!(namespace_matches("/rooms/1", "/rooms/1/chat"));
        assert!(namespace_matches("/rooms/1", "/rooms/1"));
        assert!(namespace_matches("", "/anything"));
        assert!(!namespace_matches("/rooms/1", "/rooms/2"));
        assert!(!namespace_matches("/rooms/1/chat", "/rooms/1"));
    }

    #[test]
    fn test_namespace_match_is_not_segment_aware() {
        assert!(namespace_matches("/ab", "/abc"));
        assert!(namespace_matches("/ab", "/ab/c"));
    }
}
