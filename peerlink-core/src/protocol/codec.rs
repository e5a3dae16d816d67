//! Binary envelope codec

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Codec, DecodeError, Envelope};
use crate::connection::PeerId;

/// Envelope header: 4-byte big-endian request id + sender public key.
pub const HEADER_LEN: usize = 4 + PeerId::LEN;

/// Default wire codec.
///
/// Lays frames out as the request id, the sender's public key, and the
/// payload bytes. Stamps outgoing frames with the local node identity.
#[derive(Debug, Clone)]
pub struct BinaryCodec {
    sender: PeerId,
}

impl BinaryCodec {
    /// Creates a codec that stamps outgoing frames as sent by `sender`.
    pub fn new(sender: PeerId) -> Self {
        Self { sender }
    }
}

impl Codec for BinaryCodec {
    fn encode(&self, request_id: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u32(request_id);
        buf.put_slice(self.sender.as_bytes());
        buf.put_slice(payload);
        buf.freeze()
    }

    fn decode(&self, frame: &[u8]) -> Result<Envelope, DecodeError> {
        if frame.len() < HEADER_LEN {
            return Err(DecodeError::Truncated { len: frame.len() });
        }

        let mut buf = frame;
        let request_id = buf.get_u32();
        let mut key = [0u8; PeerId::LEN];
        buf.copy_to_slice(&mut key);

        Ok(Envelope {
            request_id,
            sender: PeerId::new(key),
            payload: Bytes::copy_from_slice(buf),
        })
    }
}
