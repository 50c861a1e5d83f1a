//! Synthetic sensor for benches.
//!
//! Answers the controller's latch window with counting pixel words, MSB
//! first: pair `k` of a frame carries even word `2k` and odd word `2k + 1`
//! (masked to 14 bits), so a frame read through the whole pipeline comes out
//! as `0, 1, 2, ...`.

use crate::controller::SensorLinkInputs;
use crate::deserializer::PIXEL_WORD_WIDTH;

const WORD_MASK: u32 = (1 << PIXEL_WORD_WIDTH) - 1;

#[derive(Debug, Clone)]
pub struct SyntheticSensor {
    pairs_per_frame: u32,
    pair: u32,
    bit: u32,
}

impl SyntheticSensor {
    pub fn new(pixels_per_frame: u32) -> Self {
        Self {
            pairs_per_frame: (pixels_per_frame / 2).max(1),
            pair: 0,
            bit: 0,
        }
    }

    /// Pairs fully sent in the current frame
    pub fn pair(&self) -> u32 {
        self.pair
    }

    /// Drive the data lines for the next primary tick, given the latch seen
    /// on the previous one.
    pub fn tick(&mut self, latch: bool) -> SensorLinkInputs {
        if !latch {
            self.bit = 0;
            return SensorLinkInputs::default();
        }

        let even = (2 * self.pair) & WORD_MASK;
        let odd = (2 * self.pair + 1) & WORD_MASK;
        let shift = PIXEL_WORD_WIDTH - 1 - self.bit;
        let out = SensorLinkInputs {
            even: (even >> shift) & 1 == 1,
            odd: (odd >> shift) & 1 == 1,
        };

        self.bit += 1;
        if self.bit == PIXEL_WORD_WIDTH {
            self.bit = 0;
            self.pair = (self.pair + 1) % self.pairs_per_frame;
        }
        out
    }
}
