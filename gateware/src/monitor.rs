//! Host-side view of the byte bus.
//!
//! [`BusMonitor`] plays the bridge chip: it latches every strobed byte into
//! the current endpoint buffer and commits the buffer as a packet on `pktend`
//! or when the buffer is full.

use tracing::warn;

use crate::packet::{Packet, PacketError};
use crate::packetizer::{BusInputs, BusOutputs};
use crate::tick::Tick;

#[derive(Debug, Clone)]
pub struct BusMonitor {
    max_packet_bytes: usize,
    tag: u8,
    buffer: Vec<u8>,
    packets: u64,
    writes_while_full: u64,
    zero_length_packets: u64,
    malformed: u64,
}

impl BusMonitor {
    pub fn new(max_packet_bytes: usize, tag: u8) -> Self {
        Self {
            max_packet_bytes,
            tag,
            buffer: Vec::with_capacity(max_packet_bytes),
            packets: 0,
            writes_while_full: 0,
            zero_length_packets: 0,
            malformed: 0,
        }
    }

    /// Packets committed so far, malformed ones included
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Strobes seen while the bus reported `full`
    pub fn writes_while_full(&self) -> u64 {
        self.writes_while_full
    }

    /// `pktend` pulses on an empty buffer
    pub fn zero_length_packets(&self) -> u64 {
        self.zero_length_packets
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Bytes latched into the packet still being filled
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn commit(&mut self) -> Result<Packet, PacketError> {
        self.packets += 1;
        let bytes = std::mem::take(&mut self.buffer);
        let parsed = Packet::from_bytes(&bytes).and_then(|packet| {
            if packet.header.tag != self.tag {
                return Err(PacketError::UnexpectedTag(packet.header.tag));
            }
            Ok(packet)
        });
        if let Err(e) = &parsed {
            self.malformed += 1;
            warn!("bus monitor: packet {} malformed: {}", self.packets, e);
        }
        parsed
    }
}

impl Tick<(BusInputs, BusOutputs), Result<Packet, PacketError>> for BusMonitor {
    fn tick(&mut self, (inputs, outputs): (BusInputs, BusOutputs)) -> Option<Result<Packet, PacketError>> {
        if outputs.write_strobe() {
            if inputs.full {
                self.writes_while_full += 1;
                warn!("bus monitor: write strobe while full, byte {:#04x} lost", outputs.data);
            } else {
                self.buffer.push(outputs.data);
                if self.buffer.len() >= self.max_packet_bytes {
                    return Some(self.commit());
                }
            }
        }

        if outputs.packet_end() {
            if self.buffer.is_empty() {
                self.zero_length_packets += 1;
                return None;
            }
            return Some(self.commit());
        }

        None
    }
}
