//! Gateway frame codec.
//!
//! A [`GatewayFrame`] is one relay unit: the gateway's mac, a command byte, a
//! wrapping sequence number, an encryption flag that is carried but unused,
//! and a payload of batched tag records. Frames are immutable once built and
//! discarded after being merged into aggregate state or sent.

use crate::error::{ProtocolError, ProtocolResult};
use crate::tag::TagRecord;
use crate::{FRAME_MAGIC, FRAME_OVERHEAD};
use byteorder::{BigEndian, ByteOrder};
use types::Mac;

/// Frame command issued by batching gateways.
const CMD_REPORT: u8 = 0x01;

/// One complete wire-format gateway message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFrame {
    /// Declared total frame size, always `16 + payload.len()` after encode.
    pub length: u16,
    /// Gateway mac.
    pub device_id: Mac,
    pub command: u8,
    /// Wraps mod 256, monotonically increasing per run.
    pub sequence: u8,
    /// Encryption flag, carried but unused.
    pub flags: u8,
    /// Concatenation of a count byte and fixed-size tag records.
    pub payload: Vec<u8>,
    /// Byte-sum of the serialized frame excluding this byte, mod 256.
    pub checksum: u8,
}

impl GatewayFrame {
    /// Build a frame from a batch of tag records.
    ///
    /// The payload is the `count | TagRecord x count` layout; length and
    /// checksum are computed on encode.
    pub fn from_records(device_id: Mac, sequence: u8, records: &[TagRecord]) -> Self {
        let mut payload = Vec::with_capacity(1 + records.len() * crate::TAG_RECORD_LEN);
        payload.push(records.len() as u8);
        for record in records {
            payload.extend_from_slice(&record.encode());
        }
        let mut frame = Self {
            length: (FRAME_OVERHEAD + payload.len()) as u16,
            device_id,
            command: CMD_REPORT,
            sequence,
            flags: 0x01,
            payload,
            checksum: 0,
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// Decode an inbound buffer.
    ///
    /// Rejects anything whose first four bytes are not the frame magic; this
    /// is the cheap filter that lets random UDP garbage be dropped silently
    /// upstream. The carried checksum is not verified - deployed gateways
    /// emit frames whose checksum the receiver has never gated on.
    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        if buf.len() < 4 {
            return Err(ProtocolError::truncated(4, buf.len(), "frame magic"));
        }
        let magic = BigEndian::read_u32(&buf[0..4]);
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::bad_magic(FRAME_MAGIC, magic));
        }
        if buf.len() < FRAME_OVERHEAD {
            return Err(ProtocolError::truncated(
                FRAME_OVERHEAD,
                buf.len(),
                "frame header",
            ));
        }
        let length = BigEndian::read_u16(&buf[4..6]);
        let total = length as usize;
        if total < FRAME_OVERHEAD || buf.len() < total {
            return Err(ProtocolError::truncated(
                total.max(FRAME_OVERHEAD),
                buf.len(),
                "frame body",
            ));
        }
        let mut device_id = [0u8; 6];
        device_id.copy_from_slice(&buf[6..12]);
        let payload = buf[15..total - 1].to_vec();
        Ok(Self {
            length,
            device_id: Mac(device_id),
            command: buf[12],
            sequence: buf[13],
            flags: buf[14],
            payload,
            checksum: buf[total - 1],
        })
    }

    /// Serialize, always recomputing length and checksum first.
    pub fn encode(&self) -> Vec<u8> {
        let total = FRAME_OVERHEAD + self.payload.len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
        buf.extend_from_slice(&(total as u16).to_be_bytes());
        buf.extend_from_slice(self.device_id.as_bytes());
        buf.push(self.command);
        buf.push(self.sequence);
        buf.push(self.flags);
        buf.extend_from_slice(&self.payload);
        buf.push(0); // checksum placeholder
        let sum = byte_sum(&buf[..total - 1]);
        buf[total - 1] = sum;
        buf
    }

    fn compute_checksum(&self) -> u8 {
        let encoded = self.encode();
        encoded[encoded.len() - 1]
    }
}

/// Byte-wise sum mod 256, the frame checksum primitive.
fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
