/*!
# Camera Controller Gateware Model

Cycle-accurate model of the controller that sits between a bit-serial image
sensor and a byte-wide USB bridge bus. Every block is a plain value with a
`tick` method; the [`Controller`] wires them together and advances the
primary (sensor) and bus clock domains.

## Core Types

- [`Controller`] - Top level, owns all blocks and both clock domains
- [`ControllerConfig`] - Timing, geometry and bus settings
- [`ElasticQueue`] - Bounded FIFO between blocks
- [`BusPacketizer`] - Host bus packets with frame-id/EOF headers
- [`BusMonitor`] - Host-side packet decoder
- [`Frame`] - Reassembled frame data

## Modules

- [`queue`] - Elastic queue and its reader/writer views
- [`shift_out`] - Bit-serial shift-out engine
- [`deserializer`] - Bit-serial deserializer
- [`commands`] - Sensor command table
- [`sequencer`] - Frame sequencer
- [`packetizer`] - Bus packetizer and pixel sources
- [`clock`] - PLL model and reset synchronizers
- [`controller`] - Top level
- [`packet`] - Packet header parsing
- [`monitor`] - Bus monitor
- [`frame`] - Frames and frame files
- [`sensor`] - Synthetic sensor for benches
- [`tick`] - Observer trait and decode adaptor
- [`error`] - Common error types
*/

pub mod clock;
pub mod commands;
pub mod config;
pub mod controller;
pub mod deserializer;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod packet;
pub mod packetizer;
pub mod queue;
pub mod sensor;
pub mod sequencer;
pub mod shift_out;
pub mod tick;

// Re-export commonly used types
pub use clock::{ClockSource, FixedClock, Pll, ResetSync};
pub use config::{BusConfig, ControllerConfig, PixelSourceKind, SequencerTiming};
pub use controller::{Controller, ControllerStatus, DomainEdges, SensorLinkInputs, SensorLinkOutputs};
pub use error::{GatewareError, Result};
pub use frame::{Frame, FrameInfo};
pub use monitor::BusMonitor;
pub use packet::{Packet, PacketError, PacketHeader};
pub use packetizer::{BusInputs, BusOutputs, BusPacketizer, PixelSource, TestPattern};
pub use queue::ElasticQueue;
pub use sensor::SyntheticSensor;
pub use tick::{decode, Tick};

/// Version information for the gateware library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bus protocol constants
pub mod protocol {
    /// Header bytes at the start of every packet
    pub const HEADER_LEN: usize = 2;

    /// Bytes per pixel pair (two 16-bit pixels)
    pub const BYTES_PER_PAIR: usize = 4;

    /// Header byte 0
    pub const HEADER_TAG: u8 = 0x02;

    /// Fixed upper pattern of header byte 1
    pub const HEADER_FIXED: u8 = 0x80;

    /// Largest packet the bridge accepts
    pub const MAX_PACKET_BYTES: usize = 1024;
}
