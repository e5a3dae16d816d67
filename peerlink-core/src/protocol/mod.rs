//! Wire envelope framing for request/response correlation

pub mod codec;

pub use codec::BinaryCodec;

use bytes::Bytes;

use crate::connection::PeerId;

/// Wire frame pairing a correlation id with an opaque payload.
///
/// Produced by a connection actor on send and consumed on receive. The
/// connection layer inspects only `request_id`; the payload belongs to
/// whatever protocol the node speaks above this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Correlation id matched against the outstanding-request backlog
    pub request_id: u32,
    /// Identity of the node that produced the frame
    pub sender: PeerId,
    /// Opaque application payload
    pub payload: Bytes,
}

/// Frame encoder/decoder used by connection actors.
///
/// Implementations turn an outgoing request id and payload into a wire
/// frame and decode inbound frames back into envelopes. Outer framing
/// (length prefixes, checksums) is the transport's concern.
pub trait Codec: Send + Sync {
    /// Encodes an outgoing envelope into a wire frame.
    fn encode(&self, request_id: u32, payload: &[u8]) -> Bytes;

    /// Decodes an inbound wire frame.
    ///
    /// # Errors
    /// - `DecodeError::Truncated` - Frame shorter than the envelope header
    fn decode(&self, frame: &[u8]) -> Result<Envelope, DecodeError>;
}

/// Errors from decoding inbound frames.
///
/// Undecodable frames are dropped by the connection actor without
/// failing any outstanding request.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame of {len} bytes is shorter than the envelope header")]
    Truncated { len: usize },
}
