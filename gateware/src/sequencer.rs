/*!
Frame sequencer state machine.

Drives the sensor through power-up, sends the command table through the
command shift-out engine, then paces every frame line by line: the
deserializer's latch window opens for a fixed span per line and bias words
are fed to the bias engine shortly before each window opens.

```text
POWERUP -> INIT -> SEND_CMD -> SEND_CMD_LATCH -> SEND_CMD_ADVANCE -+-> WAIT_FRAME_START
                     ^                                             |          |
                     +---------------------------------------------+          v
           INIT <- INTER_FRAME <- READ_LINE (last row) <-------------- READ_LINE <-> WAIT_LINE
```
*/

use tracing::{debug, trace};

use crate::commands::CommandTable;
use crate::config::SequencerTiming;
use crate::queue::Writer;

/// Status codes per high-level phase
pub mod status {
    pub const POWERUP: u8 = 0x01;
    pub const INIT: u8 = 0x02;
    pub const SEND_CMD: u8 = 0x04;
    pub const WAIT_FRAME: u8 = 0x08;
    pub const LINES: u8 = 0x10;
    pub const INTER_FRAME: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    PowerUp,
    Init,
    SendCmd,
    SendCmdLatch,
    SendCmdAdvance,
    WaitFrameStart,
    ReadLine,
    WaitLine,
    InterFrame,
}

impl SequencerState {
    pub fn status(self) -> u8 {
        match self {
            Self::PowerUp => status::POWERUP,
            Self::Init => status::INIT,
            Self::SendCmd | Self::SendCmdLatch | Self::SendCmdAdvance => status::SEND_CMD,
            Self::WaitFrameStart => status::WAIT_FRAME,
            Self::ReadLine | Self::WaitLine => status::LINES,
            Self::InterFrame => status::INTER_FRAME,
        }
    }
}

/// Write and strobe-release ticks of the bias feeder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BiasPhase {
    Write,
    Release,
}

/// Registered outputs of the sequencer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerOutputs {
    /// Deserializer latch enable
    pub latch: bool,
    /// Sensor enable
    pub ena: bool,
    pub status: u8,
}

#[derive(Debug, Clone)]
pub struct FrameSequencer {
    timing: SequencerTiming,
    commands: CommandTable,
    state: SequencerState,
    counter: u32,
    cmd_index: usize,
    cmd_settled: bool,
    row: u32,
    frames: u64,
    latch: bool,
    ena: bool,
    latch_bias: bool,
    bias_phase: BiasPhase,
    bias_count: u32,
}

impl FrameSequencer {
    pub fn new(timing: SequencerTiming, commands: CommandTable) -> Self {
        Self {
            timing,
            commands,
            state: SequencerState::PowerUp,
            counter: 0,
            cmd_index: 0,
            cmd_settled: false,
            row: 0,
            frames: 0,
            latch: false,
            ena: false,
            latch_bias: false,
            bias_phase: BiasPhase::Write,
            bias_count: 0,
        }
    }

    /// Back to POWERUP with all counters cleared
    pub fn reset(&mut self) {
        self.state = SequencerState::PowerUp;
        self.counter = 0;
        self.cmd_index = 0;
        self.cmd_settled = false;
        self.row = 0;
        self.frames = 0;
        self.latch = false;
        self.ena = false;
        self.latch_bias = false;
        self.bias_phase = BiasPhase::Write;
        self.bias_count = 0;
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn command_index(&self) -> usize {
        self.cmd_index
    }

    /// Frames whose last line has been read
    pub fn frames_completed(&self) -> u64 {
        self.frames
    }

    pub fn bias_pending(&self) -> bool {
        self.latch_bias
    }

    pub fn timing(&self) -> &SequencerTiming {
        &self.timing
    }

    pub fn outputs(&self) -> SequencerOutputs {
        SequencerOutputs {
            latch: self.latch,
            ena: self.ena,
            status: self.state.status(),
        }
    }

    /// One primary-domain tick. `cmd_done` is the command engine's registered
    /// `done` from the previous tick.
    pub fn tick(&mut self, cmd_done: bool, mut cmd: Writer<'_, u8>, bias: Writer<'_, u8>) -> SequencerOutputs {
        self.feed_bias(bias);

        match self.state {
            SequencerState::PowerUp => {
                self.ena = true;
                self.counter = 0;
                self.state = SequencerState::Init;
            }
            SequencerState::Init => {
                if self.counter + 1 >= self.timing.init_hold_ticks {
                    self.counter = 0;
                    self.cmd_index = 0;
                    self.state = SequencerState::SendCmd;
                    debug!("sequencer: sending {} command words", self.commands.len());
                } else {
                    self.counter += 1;
                }
            }
            SequencerState::SendCmd => match self.commands.get(self.cmd_index) {
                Some(word) => {
                    if cmd.ready() {
                        cmd.write(word);
                        self.state = SequencerState::SendCmdLatch;
                    }
                }
                None => self.enter_wait_frame_start(),
            },
            SequencerState::SendCmdLatch => {
                self.state = SequencerState::SendCmdAdvance;
            }
            SequencerState::SendCmdAdvance => {
                // Compared after the increment: the last entry has been sent.
                self.cmd_index += 1;
                if self.cmd_index == self.commands.len() {
                    self.enter_wait_frame_start();
                } else {
                    self.state = SequencerState::SendCmd;
                }
            }
            SequencerState::WaitFrameStart => {
                if !self.cmd_settled {
                    self.cmd_settled = cmd_done;
                } else {
                    self.counter += 1;
                    self.line_boundary(self.timing.frame_start_offset_ticks);
                }
            }
            SequencerState::ReadLine => {
                self.counter += 1;
                if self.counter >= self.timing.line_read_ticks {
                    self.latch = false;
                    self.counter = 0;
                    self.row += 1;
                    if self.row == self.timing.rows_per_frame {
                        debug!("sequencer: frame {} read ({} rows)", self.frames, self.row);
                        self.state = SequencerState::InterFrame;
                    } else {
                        self.state = SequencerState::WaitLine;
                    }
                }
            }
            SequencerState::WaitLine => {
                self.counter += 1;
                self.line_boundary(self.timing.line_period_ticks - self.timing.line_read_ticks);
            }
            SequencerState::InterFrame => {
                self.counter += 1;
                if self.counter >= self.timing.inter_frame_ticks {
                    self.counter = 0;
                    self.cmd_index = 0;
                    self.row = 0;
                    self.frames += 1;
                    self.state = SequencerState::Init;
                }
            }
        }

        self.outputs()
    }

    fn enter_wait_frame_start(&mut self) {
        self.counter = 0;
        self.cmd_settled = false;
        self.state = SequencerState::WaitFrameStart;
    }

    /// Arm the bias feeder `bias_lead_ticks` ahead of the line start and open
    /// the latch window when `wait` ticks have passed.
    fn line_boundary(&mut self, wait: u32) {
        if self.counter + self.timing.bias_lead_ticks == wait {
            self.latch_bias = true;
            self.bias_count = 0;
            self.bias_phase = BiasPhase::Write;
        }
        if self.counter >= wait {
            trace!("sequencer: line {} start", self.row);
            self.counter = 0;
            self.latch = true;
            self.state = SequencerState::ReadLine;
        }
    }

    fn feed_bias(&mut self, mut bias: Writer<'_, u8>) {
        if !self.latch_bias {
            return;
        }
        match self.bias_phase {
            BiasPhase::Write => {
                if bias.ready() {
                    bias.write(self.timing.bias_value);
                    self.bias_count += 1;
                    self.bias_phase = BiasPhase::Release;
                }
            }
            BiasPhase::Release => {
                self.bias_phase = BiasPhase::Write;
                if self.bias_count >= self.timing.bias_words_per_line {
                    self.latch_bias = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ElasticQueue;

    fn timing() -> SequencerTiming {
        SequencerTiming {
            init_hold_ticks: 4,
            frame_start_offset_ticks: 10,
            line_read_ticks: 28,
            line_period_ticks: 40,
            rows_per_frame: 3,
            inter_frame_ticks: 8,
            bias_lead_ticks: 6,
            bias_words_per_line: 2,
            bias_value: 0x40,
        }
    }

    struct Bench {
        seq: FrameSequencer,
        cmd: ElasticQueue<u8>,
        bias: ElasticQueue<u8>,
        tick: u32,
        cmd_writes: Vec<(u32, u8)>,
        bias_writes: Vec<u32>,
        latch: Vec<bool>,
    }

    impl Bench {
        fn new() -> Self {
            let table = CommandTable::build(&[0xFF, 0x00], &[0x01, 0x20, 0x02, 0x40]).unwrap();
            Self {
                seq: FrameSequencer::new(timing(), table),
                cmd: ElasticQueue::new(32, 8),
                bias: ElasticQueue::new(4, 7),
                tick: 0,
                cmd_writes: Vec::new(),
                bias_writes: Vec::new(),
                latch: Vec::new(),
            }
        }

        // Queues are drained every tick so neither side ever back-pressures.
        fn run(&mut self, ticks: u32, cmd_done: bool) {
            for _ in 0..ticks {
                self.tick += 1;
                let out = self.seq.tick(cmd_done, self.cmd.writer(), self.bias.writer());
                self.latch.push(out.latch);
                while let Some(word) = self.cmd.reader().read() {
                    self.cmd_writes.push((self.tick, word));
                }
                while self.bias.reader().read().is_some() {
                    self.bias_writes.push(self.tick);
                }
            }
        }

        fn rising_edges(&self) -> Vec<u32> {
            (1..self.latch.len())
                .filter(|&i| self.latch[i] && !self.latch[i - 1])
                .map(|i| i as u32 + 1)
                .collect()
        }
    }

    #[test]
    fn test_command_table_one_word_per_three_ticks() {
        let mut bench = Bench::new();
        bench.run(22, true);

        // POWERUP at tick 1, INIT holds ticks 2..=5
        assert_eq!(
            bench.cmd_writes,
            vec![(6, 0xFF), (9, 0x00), (12, 0x02), (15, 0x40), (18, 0x01), (21, 0x20)]
        );
        assert_eq!(bench.seq.state(), SequencerState::SendCmdAdvance);

        bench.run(1, true);
        assert_eq!(bench.seq.state(), SequencerState::WaitFrameStart);
        assert_eq!(bench.seq.command_index(), 6);
    }

    #[test]
    fn test_frame_start_waits_for_command_engine() {
        let mut bench = Bench::new();
        bench.run(100, false);
        assert_eq!(bench.seq.state(), SequencerState::WaitFrameStart);
        assert!(bench.latch.iter().all(|&l| !l));

        bench.run(100, true);
        assert!(!bench.rising_edges().is_empty());
    }

    #[test]
    fn test_line_windows_and_period() {
        let mut bench = Bench::new();
        bench.run(145, true);

        let rises = bench.rising_edges();
        // command phase ends at tick 23, done seen at 24, offset counted from 25
        assert_eq!(rises, vec![34, 74, 114]);

        let high = bench.latch.iter().filter(|&&l| l).count() as u32;
        assert_eq!(high, 3 * 28);
        assert_eq!(bench.seq.state(), SequencerState::InterFrame);
    }

    #[test]
    fn test_bias_lands_before_each_line() {
        let mut bench = Bench::new();
        bench.run(150, true);

        let rises = bench.rising_edges();
        assert_eq!(bench.bias_writes.len(), 2 * rises.len());
        for (line, rise) in rises.iter().enumerate() {
            let writes = &bench.bias_writes[2 * line..2 * line + 2];
            assert!(writes.iter().all(|&t| t > rise - 6 && t < *rise), "line {} bias at {:?}", line, writes);
        }
        assert!(!bench.seq.bias_pending());
    }

    #[test]
    fn test_inter_frame_restarts_command_sequence() {
        let mut bench = Bench::new();
        bench.run(200, true);

        assert_eq!(bench.seq.frames_completed(), 1);
        assert_eq!(bench.cmd_writes.len(), 12);
        // second pass starts after INTER_FRAME (ends tick 150) and INIT (151..=154)
        assert_eq!(bench.cmd_writes[6], (155, 0xFF));
    }

    #[test]
    fn test_status_tracks_phase() {
        let mut bench = Bench::new();
        assert_eq!(bench.seq.outputs().status, status::POWERUP);
        bench.run(1, true);
        assert_eq!(bench.seq.outputs().status, status::INIT);
        assert!(bench.seq.outputs().ena);
        bench.run(5, true);
        assert_eq!(bench.seq.outputs().status, status::SEND_CMD);
        bench.run(30, true);
        assert_eq!(bench.seq.outputs().status, status::LINES);
    }
}
