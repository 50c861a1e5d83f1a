/*!
Bus packet parsing and manipulation.

A packet is what the bridge chip hands to the host between two `pktend`
pulses: a two byte header followed by pixel bytes, low byte first.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{HEADER_FIXED, HEADER_LEN, HEADER_TAG};

/// Mask of the fixed upper pattern in header byte 1
const FLAGS_FIXED_MASK: u8 = 0xFC;

/// Errors that can occur during packet parsing
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet length: expected at least 2 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Unexpected header tag: {0:#04x}")]
    UnexpectedTag(u8),

    #[error("Invalid header flags: {0:08b}")]
    InvalidFlags(u8),

    #[error("Odd payload length: {0} bytes")]
    OddPayload(usize),
}

/// Two byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub tag: u8,
    /// Frame-id bit, toggles once per frame
    pub fid: bool,
    /// Last packet of the frame
    pub eof: bool,
}

impl PacketHeader {
    pub fn new(fid: bool, eof: bool) -> Self {
        Self {
            tag: HEADER_TAG,
            fid,
            eof,
        }
    }

    /// Parse a header from the first two bytes of a packet
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::InvalidLength(bytes.len()));
        }
        let (tag, flags) = (bytes[0], bytes[1]);
        if flags & FLAGS_FIXED_MASK != HEADER_FIXED {
            return Err(PacketError::InvalidFlags(flags));
        }

        Ok(Self {
            tag,
            fid: flags & 0x01 != 0,
            eof: flags & 0x02 != 0,
        })
    }

    /// Parse and require a specific tag
    pub fn from_bytes_tagged(bytes: &[u8], tag: u8) -> Result<Self, PacketError> {
        let header = Self::from_bytes(bytes)?;
        if header.tag != tag {
            return Err(PacketError::UnexpectedTag(header.tag));
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        [self.tag, HEADER_FIXED | ((self.eof as u8) << 1) | self.fid as u8]
    }
}

/// A complete packet as seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Split raw packet bytes into header and payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;
        let payload = bytes[HEADER_LEN..].to_vec();
        if payload.len() % 2 != 0 {
            return Err(PacketError::OddPayload(payload.len()));
        }
        Ok(Self { header, payload })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Total size on the bus, header included
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Payload as 16-bit pixel words
    pub fn pixels(&self) -> impl Iterator<Item = u16> + '_ {
        self.payload
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    }
}
