/*!
Clock sources and reset synchronization.

The primary domain runs from a PLL fed by the board oscillator. Until the PLL
reports lock the primary domain is held in reset; the bus domain is released
from the primary domain's reset through its own synchronizer.
*/

use tracing::debug;

use crate::config::ClockConfig;

/// A clock that may need time before its output is usable
pub trait ClockSource {
    /// Output frequency
    fn frequency_hz(&self) -> u64;

    /// Advance one output cycle, returning the lock state after it
    fn tick(&mut self) -> bool;
}

/// Multiply/divide PLL locking after a fixed number of output cycles
#[derive(Debug, Clone)]
pub struct Pll {
    reference_hz: u64,
    multiplier: u32,
    divider: u32,
    lock_cycles: u64,
    elapsed: u64,
}

impl Pll {
    pub fn new(reference_hz: u64, multiplier: u32, divider: u32, lock_cycles: u64) -> Self {
        Self {
            reference_hz,
            multiplier,
            divider: divider.max(1),
            lock_cycles,
            elapsed: 0,
        }
    }

    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(config.reference_hz, config.multiplier, config.divider, config.lock_cycles)
    }

    pub fn locked(&self) -> bool {
        self.elapsed >= self.lock_cycles
    }
}

impl ClockSource for Pll {
    fn frequency_hz(&self) -> u64 {
        self.reference_hz * self.multiplier as u64 / self.divider as u64
    }

    fn tick(&mut self) -> bool {
        if !self.locked() {
            self.elapsed += 1;
            if self.locked() {
                debug!("pll: locked at {} Hz after {} cycles", self.frequency_hz(), self.elapsed);
            }
        }
        self.locked()
    }
}

/// Clock with no lock latency, for benches that start in steady state
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub hz: u64,
}

impl ClockSource for FixedClock {
    fn frequency_hz(&self) -> u64 {
        self.hz
    }

    fn tick(&mut self) -> bool {
        true
    }
}

/// Two-flop reset synchronizer, asserted at power-on
#[derive(Debug, Clone)]
pub struct ResetSync {
    stages: [bool; 2],
}

impl ResetSync {
    pub fn new() -> Self {
        Self { stages: [true, true] }
    }

    /// Domain reset as seen by the synchronous logic
    pub fn asserted(&self) -> bool {
        self.stages[1]
    }

    /// Clock one edge with the asynchronous reset input
    pub fn tick(&mut self, async_reset: bool) -> bool {
        if async_reset {
            self.stages = [true, true];
        } else {
            self.stages = [false, self.stages[0]];
        }
        self.asserted()
    }
}

impl Default for ResetSync {
    fn default() -> Self {
        Self::new()
    }
}
