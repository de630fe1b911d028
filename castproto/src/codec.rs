//! Length-prefixed JSON frame codec for the duplex channel.
//!
//! One frame = 4-byte little-endian payload length + UTF-8 JSON document.
//! A frame whose payload fails to parse is reported as
//! [`DecodedFrame::Malformed`] and the stream continues; only a broken
//! underlying stream (or an absurd length prefix) terminates the channel.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::ProtoError;
use crate::message::Envelope;

/// Upper bound on a single frame payload. Anything larger is treated as a
/// corrupted transport rather than a recoverable bad frame.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// One decoded frame off the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedFrame {
    Message(Envelope),
    Malformed { error: String },
}

#[derive(Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = DecodedFrame;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DecodedFrame>, ProtoError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_LEN {
            return Err(ProtoError::FrameTooLarge(len));
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let payload = src.split_to(len);

        match serde_json::from_slice::<Envelope>(&payload) {
            Ok(envelope) => Ok(Some(DecodedFrame::Message(envelope))),
            Err(err) => {
                warn!("Discarding malformed frame ({} bytes): {}", len, err);
                Ok(Some(DecodedFrame::Malformed {
                    error: err.to_string(),
                }))
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<DecodedFrame>, ProtoError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    // Truncated trailing frame: log and drop, the stream is
                    // ending anyway.
                    warn!("Discarding {} trailing bytes of a truncated frame", buf.len());
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let payload = serde_json::to_vec(&item)?;
        dst.reserve(4 + payload.len());
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn envelope(subject: &str) -> Envelope {
        Envelope {
            subject: subject.to_string(),
            data: serde_json::json!({ "key": [1, 2, 3], "nested": { "ok": true } }),
            id: Some("x1".to_string()),
        }
    }

    #[tokio::test]
    async fn round_trip_deep_equal() {
        let mut buffer = Vec::new();
        {
            let mut writer = FramedWrite::new(&mut buffer, FrameCodec::new());
            writer.send(envelope("bridge:getInfo")).await.unwrap();
            writer.send(envelope("shim:session/connected")).await.unwrap();
        }

        let mut reader = FramedRead::new(buffer.as_slice(), FrameCodec::new());
        assert_eq!(
            reader.next().await.unwrap().unwrap(),
            DecodedFrame::Message(envelope("bridge:getInfo"))
        );
        assert_eq!(
            reader.next().await.unwrap().unwrap(),
            DecodedFrame::Message(envelope("shim:session/connected"))
        );
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_frame_does_not_kill_stream() {
        let mut buffer = BytesMut::new();

        // A frame that is valid length-wise but not JSON.
        let junk = b"this is not json";
        buffer.put_u32_le(junk.len() as u32);
        buffer.put_slice(junk);

        let mut codec = FrameCodec::new();
        codec.encode(envelope("bridge:getInfo"), &mut buffer).unwrap();

        let mut reader = FramedRead::new(&buffer[..], FrameCodec::new());
        assert!(matches!(
            reader.next().await.unwrap().unwrap(),
            DecodedFrame::Malformed { .. }
        ));
        assert_eq!(
            reader.next().await.unwrap().unwrap(),
            DecodedFrame::Message(envelope("bridge:getInfo"))
        );
    }

    #[tokio::test]
    async fn truncated_trailing_frame_is_dropped() {
        let mut buffer = BytesMut::new();
        let mut codec = FrameCodec::new();
        codec.encode(envelope("bridge:getInfo"), &mut buffer).unwrap();
        // Promise more bytes than the stream delivers.
        buffer.put_u32_le(1000);
        buffer.put_slice(b"partial");

        let mut reader = FramedRead::new(&buffer[..], FrameCodec::new());
        assert!(matches!(
            reader.next().await.unwrap().unwrap(),
            DecodedFrame::Message(_)
        ));
        assert!(reader.next().await.is_none());
    }

    #[test]
    fn oversized_length_prefix_is_fatal() {
        let mut buffer = BytesMut::new();
        buffer.put_u32_le(u32::MAX);
        buffer.put_slice(&[0u8; 16]);

        let mut codec = FrameCodec::new();
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtoError::FrameTooLarge(_))
        ));
    }
}
