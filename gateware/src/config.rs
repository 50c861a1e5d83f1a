/*!
Controller configuration.

All geometry and timing constants of the controller live here. They are fixed
once a [`Controller`](crate::Controller) is built; the state machines never
re-check them while running, so [`ControllerConfig::validate`] is the one
place where inconsistent offsets are caught.
*/

use serde::{Deserialize, Serialize};

use crate::deserializer::PIXEL_WORD_WIDTH;
use crate::error::{GatewareError, Result};
use crate::protocol::{BYTES_PER_PAIR, HEADER_LEN, HEADER_TAG, MAX_PACKET_BYTES};

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub clock: ClockConfig,
    pub sequencer: SequencerTiming,
    pub commands: CommandConfig,
    pub queues: QueueConfig,
    pub bus: BusConfig,
}

impl ControllerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            clock: ClockConfig::default(),
            sequencer: SequencerTiming::default(),
            commands: CommandConfig::default(),
            queues: QueueConfig::default(),
            bus: BusConfig::default(),
        }
    }

    /// Pixels per frame for the selected pixel source
    pub fn frame_pixels(&self) -> u32 {
        match self.bus.source {
            PixelSourceKind::TestPattern => self.bus.pattern_frame_pixels,
            PixelSourceKind::Sensor => self.sequencer.pixels_per_frame(),
        }
    }

    /// Check that all constants are usable and mutually consistent
    pub fn validate(&self) -> Result<()> {
        self.clock.validate()?;
        self.sequencer.validate()?;
        self.queues.validate()?;
        self.bus.validate()?;

        if self.commands.buffer.len() % 2 != 0 {
            return Err(GatewareError::config("command buffer must hold register/value pairs"));
        }

        let pixels = self.frame_pixels();
        if pixels == 0 || pixels % 2 != 0 {
            return Err(GatewareError::config(format!(
                "frame must hold a positive, even number of pixels, got {}",
                pixels
            )));
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference clock, PLL and bus clock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Board reference oscillator
    pub reference_hz: u64,

    pub multiplier: u32,

    pub divider: u32,

    /// PLL output cycles before lock
    pub lock_cycles: u64,

    /// Bus domain clock
    pub bus_clock_hz: u64,
}

impl ClockConfig {
    /// Primary domain frequency produced by the PLL
    pub fn primary_hz(&self) -> u64 {
        self.reference_hz * self.multiplier as u64 / self.divider.max(1) as u64
    }

    fn validate(&self) -> Result<()> {
        if self.divider == 0 || self.multiplier == 0 {
            return Err(GatewareError::config("PLL multiplier and divider must be non-zero"));
        }
        if self.primary_hz() == 0 || self.bus_clock_hz == 0 {
            return Err(GatewareError::config("clock frequencies must be non-zero"));
        }
        Ok(())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            reference_hz: 25_000_000,
            multiplier: 2,
            divider: 1,
            lock_cycles: 64,
            bus_clock_hz: 48_000_000,
        }
    }
}

/// Frame sequencer timing, in primary-domain ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerTiming {
    /// INIT hold while the PLL settles
    pub init_hold_ticks: u32,

    /// Ticks from command completion to the first line start
    pub frame_start_offset_ticks: u32,

    /// Latch window per line
    pub line_read_ticks: u32,

    /// Line start to next line start
    pub line_period_ticks: u32,

    pub rows_per_frame: u32,

    /// Gap after the last line before the next INIT
    pub inter_frame_ticks: u32,

    /// How far ahead of a line start bias injection begins
    pub bias_lead_ticks: u32,

    /// Bias words fed per line
    pub bias_words_per_line: u32,

    /// 7-bit bias constant
    pub bias_value: u8,
}

impl SequencerTiming {
    /// Words per line on each of the even/odd channels
    pub fn words_per_line(&self) -> u32 {
        self.line_read_ticks / PIXEL_WORD_WIDTH
    }

    pub fn pixels_per_line(&self) -> u32 {
        2 * self.words_per_line()
    }

    pub fn pixels_per_frame(&self) -> u32 {
        self.rows_per_frame * self.pixels_per_line()
    }

    fn validate(&self) -> Result<()> {
        if self.line_read_ticks == 0 || self.line_read_ticks % PIXEL_WORD_WIDTH != 0 {
            return Err(GatewareError::config(format!(
                "line_read_ticks must be a positive multiple of {}, got {}",
                PIXEL_WORD_WIDTH, self.line_read_ticks
            )));
        }
        if self.rows_per_frame == 0 {
            return Err(GatewareError::config("rows_per_frame must be non-zero"));
        }
        if self.line_period_ticks <= self.line_read_ticks + self.bias_lead_ticks {
            return Err(GatewareError::config(format!(
                "line_period_ticks ({}) must exceed line_read_ticks + bias_lead_ticks ({})",
                self.line_period_ticks,
                self.line_read_ticks + self.bias_lead_ticks
            )));
        }
        if self.frame_start_offset_ticks <= self.bias_lead_ticks {
            return Err(GatewareError::config(format!(
                "frame_start_offset_ticks ({}) must exceed bias_lead_ticks ({})",
                self.frame_start_offset_ticks, self.bias_lead_ticks
            )));
        }
        if self.bias_words_per_line == 0 || self.bias_lead_ticks < 2 * self.bias_words_per_line {
            return Err(GatewareError::config(format!(
                "bias_lead_ticks ({}) must leave two ticks per bias word ({} words)",
                self.bias_lead_ticks, self.bias_words_per_line
            )));
        }
        if self.bias_value > 0x7F {
            return Err(GatewareError::config(format!(
                "bias_value {:#04x} does not fit in 7 bits",
                self.bias_value
            )));
        }
        Ok(())
    }
}

impl Default for SequencerTiming {
    fn default() -> Self {
        Self {
            init_hold_ticks: 1024,
            frame_start_offset_ticks: 128,
            line_read_ticks: 40 * PIXEL_WORD_WIDTH,
            line_period_ticks: 640,
            rows_per_frame: 60,
            inter_frame_ticks: 4096,
            bias_lead_ticks: 24,
            bias_words_per_line: 1,
            bias_value: 0x40,
        }
    }
}

/// Command sequence sent after every INIT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub preamble: Vec<u8>,

    /// Register/value pairs
    pub buffer: Vec<u8>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            preamble: vec![0xFF, 0x00],
            buffer: vec![0x01, 0x20, 0x02, 0x40, 0x03, 0x0F, 0x04, 0x80],
        }
    }
}

/// Elastic queue depths, in words
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub command_depth: usize,
    pub bias_depth: usize,
    pub pixel_depth: usize,
}

impl QueueConfig {
    fn validate(&self) -> Result<()> {
        if self.command_depth == 0 || self.bias_depth == 0 || self.pixel_depth == 0 {
            return Err(GatewareError::config("queue depths must be non-zero"));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            command_depth: 32,
            bias_depth: 4,
            pixel_depth: 64,
        }
    }
}

/// Where the packetizer takes its pixels from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelSourceKind {
    TestPattern,
    Sensor,
}

/// Host bus packetizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Upper bound on bytes per packet, header included
    pub max_packet_bytes: usize,

    /// Header byte 0
    pub header_tag: u8,

    /// Frame size of the synthetic pattern
    pub pattern_frame_pixels: u32,

    pub source: PixelSourceKind,
}

impl BusConfig {
    fn validate(&self) -> Result<()> {
        if self.max_packet_bytes < HEADER_LEN + BYTES_PER_PAIR {
            return Err(GatewareError::config(format!(
                "max_packet_bytes ({}) must fit the header and one pixel pair",
                self.max_packet_bytes
            )));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_packet_bytes: MAX_PACKET_BYTES,
            header_tag: HEADER_TAG,
            pattern_frame_pixels: 256 * 256,
            source: PixelSourceKind::TestPattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ControllerConfig::new();

        assert_eq!(config.clock.primary_hz(), 50_000_000);
        assert_eq!(config.sequencer.words_per_line(), 40);
        assert_eq!(config.sequencer.pixels_per_frame(), 60 * 80);
        assert_eq!(config.bus.max_packet_bytes, 1024);
        assert_eq!(config.frame_pixels(), 65_536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sensor_source_uses_geometry() {
        let mut config = ControllerConfig::new();
        config.bus.source = PixelSourceKind::Sensor;
        assert_eq!(config.frame_pixels(), 4800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_line_timing_is_rejected() {
        let mut config = ControllerConfig::new();
        config.sequencer.line_period_ticks = config.sequencer.line_read_ticks;
        assert!(matches!(config.validate(), Err(GatewareError::Config(_))));

        let mut config = ControllerConfig::new();
        config.sequencer.line_read_ticks = 100;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::new();
        config.sequencer.bias_value = 0x80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_odd_frame_is_rejected() {
        let mut config = ControllerConfig::new();
        config.bus.pattern_frame_pixels = 65_535;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ControllerConfig = serde_json::from_str(r#"{"bus": {"max_packet_bytes": 512}}"#).unwrap();
        assert_eq!(config.bus.max_packet_bytes, 512);
        assert_eq!(config.bus.header_tag, 0x02);
        assert_eq!(config.sequencer, SequencerTiming::default());
    }
}
