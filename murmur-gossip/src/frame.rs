// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-format frame encoders.
//!
//! Wrapping a byte sink with an encoder is explicit composition: a
//! [`MessageSink`] owns its inner [`ByteSink`] and turns each message into
//! one wire frame. Classic feeds (and binary feeds asked for as JSON) use
//! the key/value envelope; binary feeds otherwise get a length-prefixed
//! stream of their native encoding.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::StoredMessage;
use serde_json::json;

use crate::sink::{ByteSink, SinkError};

/// A sink of decoded messages, one wire frame per message.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &StoredMessage) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError>;
}

/// JSON envelope framing.
///
/// With `keys` enabled each frame is
/// `{"key": …, "value": …, "timestamp": …}`; otherwise the bare message
/// value is emitted as a raw JSON document.
pub struct KeyValueSink {
    inner: Arc<dyn ByteSink>,
    keys: bool,
}

impl KeyValueSink {
    pub fn new(inner: Arc<dyn ByteSink>, keys: bool) -> Self {
        Self { inner, keys }
    }
}

#[async_trait]
impl MessageSink for KeyValueSink {
    async fn send(&self, message: &StoredMessage) -> Result<(), SinkError> {
        let frame = if self.keys {
            json!({
                "key": message.key().to_string(),
                "value": message.value(),
                "timestamp": message.received(),
            })
        } else {
            message.value().clone()
        };
        let bytes =
            serde_json::to_vec(&frame).map_err(|err| SinkError::Encode(err.to_string()))?;
        self.inner.send(bytes).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.inner.close().await
    }
}

/// Length-prefixed binary stream framing.
///
/// Each frame is the message's native binary encoding preceded by its
/// length as a big-endian `u32`. Messages that arrived without a binary
/// transport form are encoded as CBOR of their value.
pub struct BinaryStreamSink {
    inner: Arc<dyn ByteSink>,
}

impl BinaryStreamSink {
    pub fn new(inner: Arc<dyn ByteSink>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MessageSink for BinaryStreamSink {
    async fn send(&self, message: &StoredMessage) -> Result<(), SinkError> {
        let native = if message.transport_bytes().is_empty() {
            let mut bytes = Vec::new();
            ciborium::ser::into_writer(message.value(), &mut bytes)
                .map_err(|err| SinkError::Encode(err.to_string()))?;
            bytes
        } else {
            message.transport_bytes().to_vec()
        };

        let mut frame = Vec::with_capacity(native.len() + 4);
        frame.extend_from_slice(&(native.len() as u32).to_be_bytes());
        frame.extend_from_slice(&native);
        self.inner.send(frame).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use murmur_core::{
        FeedAlgorithm, FeedRef, MessageAlgorithm, MessageRef, StoredMessage,
    };
    use serde_json::{json, Value};

    use crate::sink::ChannelSink;

    use super::{BinaryStreamSink, KeyValueSink, MessageSink};

    fn message(raw: Vec<u8>) -> StoredMessage {
        let author = FeedRef::new(FeedAlgorithm::Classic, [1; 32]);
        let content = json!({ "type": "post", "text": "hi" });
        let value = json!({
            "author": author.to_string(),
            "sequence": 3,
            "content": content,
        });
        StoredMessage::new(
            MessageRef::new(MessageAlgorithm::Sha256, [2; 32]),
            author,
            3,
            1000.0,
            1234.5,
            content,
            value,
            raw,
        )
    }

    #[tokio::test]
    async fn key_value_envelope() {
        let (sink, mut rx) = ChannelSink::new(4);
        let wrapped = KeyValueSink::new(Arc::new(sink), true);

        wrapped.send(&message(Vec::new())).await.unwrap();
        let frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["key"], message(Vec::new()).key().to_string());
        assert_eq!(frame["value"]["sequence"], 3);
        assert_eq!(frame["timestamp"], 1234.5);
    }

    #[tokio::test]
    async fn bare_value_without_keys() {
        let (sink, mut rx) = ChannelSink::new(4);
        let wrapped = KeyValueSink::new(Arc::new(sink), false);

        wrapped.send(&message(Vec::new())).await.unwrap();
        let frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["sequence"], 3);
        assert!(frame.get("key").is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_length_prefixed() {
        let (sink, mut rx) = ChannelSink::new(4);
        let wrapped = BinaryStreamSink::new(Arc::new(sink));

        wrapped.send(&message(vec![0xaa, 0xbb, 0xcc])).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..4], &3u32.to_be_bytes());
        assert_eq!(&frame[4..], &[0xaa, 0xbb, 0xcc]);
    }
}
