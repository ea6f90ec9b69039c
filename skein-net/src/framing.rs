use borsh::{BorshDeserialize, BorshSerialize};

use skein_types::constants::MAX_MESSAGE_SIZE;

use crate::error::NetError;
use crate::protocol::WIRE_VERSION;

/// Encode a message into a versioned, length-prefixed frame.
///
/// Wire format: `[4-byte BE length][1-byte wire version][borsh payload]`.
/// The length prefix covers the version byte plus the payload.
pub fn encode_frame<T: BorshSerialize>(msg: &T) -> Result<Vec<u8>, NetError> {
    let data = borsh::to_vec(msg).map_err(|e| NetError::Codec {
        reason: e.to_string(),
    })?;

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let len = ((1 + data.len()) as u32).to_be_bytes();
    let mut out = Vec::with_capacity(4 + 1 + data.len());
    out.extend_from_slice(&len);
    out.push(WIRE_VERSION);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Reassembly buffer for a stream delivering arbitrary byte chunks.
///
/// Chunks append via [`FrameBuffer::extend`]; complete frames drain via
/// [`FrameBuffer::next_frame`], which may yield several messages after a
/// single read event and keeps any trailing partial frame buffered.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Oversized frames,
    /// unsupported wire versions, and undecodable payloads are errors; the
    /// stream cannot be resynchronized after any of them.
    pub fn next_frame<T: BorshDeserialize>(&mut self) -> Result<Option<T>, NetError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(NetError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if len < 1 {
            return Err(NetError::Codec {
                reason: "frame too short: missing wire version byte".to_string(),
            });
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }

        let version = self.buf[4];
        if version != WIRE_VERSION {
            return Err(NetError::VersionMismatch {
                peer: version,
                ours: WIRE_VERSION,
            });
        }

        let msg = T::try_from_slice(&self.buf[5..4 + len]).map_err(|e| NetError::Codec {
            reason: e.to_string(),
        })?;
        self.buf.drain(..4 + len);
        Ok(Some(msg))
    }
}
