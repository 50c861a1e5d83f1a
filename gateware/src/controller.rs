/*!
Top-level controller.

Owns every state machine and queue and advances the two clock domains:

- primary (PLL output): command and bias shift-out engines, deserializer,
  frame sequencer
- bus (bridge chip clock): packetizer

Within a primary tick components are advanced consumer-first, so each one
sees the others' registered outputs from the previous tick. The pixel queue
is the only state shared by both domains.
*/

use tracing::{debug, info};

use crate::clock::{ClockSource, Pll, ResetSync};
use crate::commands::CommandTable;
use crate::config::{ControllerConfig, PixelSourceKind};
use crate::deserializer::{Deserializer, PIXEL_WORD_WIDTH};
use crate::error::Result;
use crate::packetizer::{BusInputs, BusOutputs, BusPacketizer, TestPattern};
use crate::queue::ElasticQueue;
use crate::sequencer::{FrameSequencer, SequencerOutputs};
use crate::shift_out::{BitOrder, ShiftOut, ShiftOutput};

const COMMAND_WORD_WIDTH: u32 = 8;
const BIAS_WORD_WIDTH: u32 = 7;
const PICOS_PER_SECOND: u64 = 1_000_000_000_000;

/// Sensor data lines sampled by the deserializer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorLinkInputs {
    pub even: bool,
    pub odd: bool,
}

/// Lines driven towards the sensor for one primary tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorLinkOutputs {
    pub cmd: bool,
    pub bias: bool,
    pub ena: bool,
    /// Data pins output enable, always low (pins are inputs)
    pub data_oe: bool,
    /// Latch window, for benches that model the sensor
    pub latch: bool,
}

/// Phase codes of both domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    pub sequencer: u8,
    pub packetizer: u8,
    pub primary_reset: bool,
    pub bus_reset: bool,
}

/// Outputs of whichever domains had an edge in one [`Controller::step`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainEdges {
    pub primary: Option<SensorLinkOutputs>,
    pub bus: Option<BusOutputs>,
}

pub struct Controller<C: ClockSource = Pll> {
    config: ControllerConfig,
    clock: C,
    primary_reset: ResetSync,
    bus_reset: ResetSync,

    sequencer: FrameSequencer,
    cmd_queue: ElasticQueue<u8>,
    cmd_engine: ShiftOut<u8>,
    bias_queue: ElasticQueue<u8>,
    bias_engine: ShiftOut<u8>,
    deserializer: Deserializer,
    pixel_queue: ElasticQueue<u16>,
    packetizer: BusPacketizer,
    pattern: TestPattern,

    last_cmd: ShiftOutput,
    last_seq: SequencerOutputs,
    last_bus: BusOutputs,

    primary_ticks: u64,
    bus_ticks: u64,
    primary_period_ps: u64,
    bus_period_ps: u64,
    next_primary_ps: u64,
    next_bus_ps: u64,
}

impl Controller<Pll> {
    /// Build a controller clocked by the configured PLL
    pub fn from_config(config: ControllerConfig) -> Result<Self> {
        let pll = Pll::from_config(&config.clock);
        Self::new(config, pll)
    }
}

impl<C: ClockSource> Controller<C> {
    /// Validate `config` and build every component from it.
    pub fn new(config: ControllerConfig, clock: C) -> Result<Self> {
        config.validate()?;

        let commands = CommandTable::build(&config.commands.preamble, &config.commands.buffer)?;
        let frame_pixels = config.frame_pixels();
        let primary_period_ps = PICOS_PER_SECOND / clock.frequency_hz();
        let bus_period_ps = PICOS_PER_SECOND / config.clock.bus_clock_hz;

        info!(
            "controller: primary {} Hz, bus {} Hz, {:?} source, {} pixels per frame",
            clock.frequency_hz(),
            config.clock.bus_clock_hz,
            config.bus.source,
            frame_pixels
        );

        Ok(Self {
            sequencer: FrameSequencer::new(config.sequencer.clone(), commands),
            cmd_queue: ElasticQueue::new(config.queues.command_depth, COMMAND_WORD_WIDTH),
            cmd_engine: ShiftOut::new(COMMAND_WORD_WIDTH, BitOrder::MsbFirst),
            bias_queue: ElasticQueue::new(config.queues.bias_depth, BIAS_WORD_WIDTH),
            bias_engine: ShiftOut::new(BIAS_WORD_WIDTH, BitOrder::LsbFirst),
            deserializer: Deserializer::new(PIXEL_WORD_WIDTH),
            pixel_queue: ElasticQueue::new(config.queues.pixel_depth, PIXEL_WORD_WIDTH),
            packetizer: BusPacketizer::new(&config.bus, frame_pixels),
            pattern: TestPattern,
            clock,
            primary_reset: ResetSync::new(),
            bus_reset: ResetSync::new(),
            last_cmd: ShiftOutput::default(),
            last_seq: SequencerOutputs::default(),
            last_bus: BusOutputs::default(),
            primary_ticks: 0,
            bus_ticks: 0,
            primary_period_ps,
            bus_period_ps,
            next_primary_ps: primary_period_ps,
            next_bus_ps: bus_period_ps,
            config,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    pub fn packetizer(&self) -> &BusPacketizer {
        &self.packetizer
    }

    pub fn deserializer(&self) -> &Deserializer {
        &self.deserializer
    }

    pub fn pixel_queue(&self) -> &ElasticQueue<u16> {
        &self.pixel_queue
    }

    pub fn primary_ticks(&self) -> u64 {
        self.primary_ticks
    }

    pub fn bus_ticks(&self) -> u64 {
        self.bus_ticks
    }

    /// Simulated time of the last processed edge
    pub fn now_ps(&self) -> u64 {
        (self.next_primary_ps - self.primary_period_ps).max(self.next_bus_ps - self.bus_period_ps)
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            sequencer: self.last_seq.status,
            packetizer: self.last_bus.status,
            primary_reset: self.primary_reset.asserted(),
            bus_reset: self.bus_reset.asserted(),
        }
    }

    /// Advance to the next clock edge. Coincident edges tick the primary
    /// domain first.
    pub fn step(&mut self, link: SensorLinkInputs, bus: BusInputs) -> DomainEdges {
        let mut edges = DomainEdges::default();
        let now = self.next_primary_ps.min(self.next_bus_ps);

        if self.next_primary_ps == now {
            edges.primary = Some(self.tick_primary(link));
            self.next_primary_ps += self.primary_period_ps;
        }
        if self.next_bus_ps == now {
            edges.bus = Some(self.tick_bus(bus));
            self.next_bus_ps += self.bus_period_ps;
        }
        edges
    }

    /// One primary-domain edge
    pub fn tick_primary(&mut self, link: SensorLinkInputs) -> SensorLinkOutputs {
        self.primary_ticks += 1;
        let locked = self.clock.tick();
        let was_reset = self.primary_reset.asserted();
        if self.primary_reset.tick(!locked) {
            self.reset_primary();
            return SensorLinkOutputs::default();
        }
        if was_reset {
            debug!("controller: primary domain out of reset at tick {}", self.primary_ticks);
        }

        let cmd = self.cmd_engine.tick(self.cmd_queue.reader());
        let bias = self.bias_engine.tick(self.bias_queue.reader());
        self.deserializer
            .tick(self.last_seq.latch, link.even, link.odd, self.pixel_queue.writer());
        let seq = self
            .sequencer
            .tick(self.last_cmd.done, self.cmd_queue.writer(), self.bias_queue.writer());

        self.last_cmd = cmd;
        self.last_seq = seq;

        SensorLinkOutputs {
            cmd: cmd.data,
            bias: bias.data,
            ena: seq.ena,
            data_oe: false,
            latch: seq.latch,
        }
    }

    /// One bus-domain edge
    pub fn tick_bus(&mut self, inputs: BusInputs) -> BusOutputs {
        self.bus_ticks += 1;
        if self.bus_reset.tick(self.primary_reset.asserted()) {
            self.packetizer.reset();
            self.last_bus = BusOutputs::default();
            return self.last_bus;
        }

        self.last_bus = match self.config.bus.source {
            PixelSourceKind::TestPattern => self.packetizer.tick(inputs, &mut self.pattern),
            PixelSourceKind::Sensor => self.packetizer.tick(inputs, &mut self.pixel_queue.reader()),
        };
        self.last_bus
    }

    fn reset_primary(&mut self) {
        self.sequencer.reset();
        self.cmd_queue.clear();
        self.cmd_engine.reset();
        self.bias_queue.clear();
        self.bias_engine.reset();
        self.deserializer.reset();
        self.pixel_queue.clear();
        self.last_cmd = ShiftOutput::default();
        self.last_seq = SequencerOutputs::default();
    }
}
