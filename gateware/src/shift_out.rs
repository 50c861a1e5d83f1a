/*!
Bit-serial shift-out engine.

Pops words from an elastic queue and drives them onto a single output line,
one bit per tick. The line's clock is the driving clock itself, so each tick
is one clock cycle on the wire. Used twice: the command channel (8 bits, MSB
first) and the bias channel (7 bits, LSB first).
*/

use num_traits::{PrimInt, Unsigned};
use serde::{Deserialize, Serialize};

use crate::queue::Reader;

/// Order in which a word's bits go onto the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Registered outputs of a shift-out engine for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftOutput {
    /// Serial data line
    pub data: bool,
    /// No word in flight and the source queue is empty
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct ShiftOut<W> {
    order: BitOrder,
    width: u32,
    shift_reg: W,
    bits_left: u32,
}

impl<W: PrimInt + Unsigned> ShiftOut<W> {
    pub fn new(width: u32, order: BitOrder) -> Self {
        assert!(width > 0 && width <= W::zero().count_zeros(), "shift width {} out of range", width);
        Self {
            order,
            width,
            shift_reg: W::zero(),
            bits_left: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// A word is partially shifted out
    pub fn busy(&self) -> bool {
        self.bits_left > 0
    }

    pub fn reset(&mut self) {
        self.shift_reg = W::zero();
        self.bits_left = 0;
    }

    /// Advance one tick: load a word if none is in flight, then emit one bit.
    pub fn tick(&mut self, mut source: Reader<'_, W>) -> ShiftOutput {
        if self.bits_left == 0 {
            if let Some(word) = source.read() {
                self.shift_reg = word;
                self.bits_left = self.width;
            }
        }

        let data = if self.bits_left > 0 {
            let bit = match self.order {
                BitOrder::MsbFirst => {
                    let bit = (self.shift_reg >> (self.width as usize - 1)) & W::one();
                    self.shift_reg = self.shift_reg << 1;
                    bit
                }
                BitOrder::LsbFirst => {
                    let bit = self.shift_reg & W::one();
                    self.shift_reg = self.shift_reg >> 1;
                    bit
                }
            };
            self.bits_left -= 1;
            bit == W::one()
        } else {
            false
        };

        ShiftOutput {
            data,
            done: self.bits_left == 0 && !source.ready(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ElasticQueue;

    fn run<W: PrimInt + Unsigned>(engine: &mut ShiftOut<W>, queue: &mut ElasticQueue<W>, ticks: usize) -> Vec<ShiftOutput> {
        (0..ticks).map(|_| engine.tick(queue.reader())).collect()
    }

    fn bits(out: &[ShiftOutput]) -> Vec<u8> {
        out.iter().map(|o| o.data as u8).collect()
    }

    #[test]
    fn test_msb_first_command_word() {
        let mut queue: ElasticQueue<u8> = ElasticQueue::new(4, 8);
        let mut engine = ShiftOut::new(8, BitOrder::MsbFirst);
        queue.writer().write(0xA5);

        let out = run(&mut engine, &mut queue, 8);
        assert_eq!(bits(&out), vec![1, 0, 1, 0, 0, 1, 0, 1]);
        assert!(out[..7].iter().all(|o| !o.done));
        assert!(out[7].done);
    }

    #[test]
    fn test_lsb_first_bias_word() {
        let mut queue: ElasticQueue<u8> = ElasticQueue::new(4, 7);
        let mut engine = ShiftOut::new(7, BitOrder::LsbFirst);
        queue.writer().write(0x43);

        let out = run(&mut engine, &mut queue, 7);
        assert_eq!(bits(&out), vec![1, 1, 0, 0, 0, 0, 1]);
        assert!(out[6].done);
    }

    #[test]
    fn test_back_to_back_words_have_no_gap() {
        let mut queue: ElasticQueue<u8> = ElasticQueue::new(4, 8);
        let mut engine = ShiftOut::new(8, BitOrder::MsbFirst);
        queue.writer().write(0xFF);
        queue.writer().write(0x00);
        queue.writer().write(0xFF);

        let out = run(&mut engine, &mut queue, 24);
        let expected: Vec<u8> = [1u8; 8].iter().chain([0u8; 8].iter()).chain([1u8; 8].iter()).copied().collect();
        assert_eq!(bits(&out), expected);
        // done only after the last bit of the last word
        assert_eq!(out.iter().filter(|o| o.done).count(), 1);
    }

    #[test]
    fn test_idle_engine_reports_done_and_rechecks() {
        let mut queue: ElasticQueue<u8> = ElasticQueue::new(4, 8);
        let mut engine = ShiftOut::new(8, BitOrder::MsbFirst);

        let idle = run(&mut engine, &mut queue, 3);
        assert!(idle.iter().all(|o| o.done && !o.data));

        queue.writer().write(0x80);
        let out = engine.tick(queue.reader());
        assert!(out.data);
        assert!(!out.done);
        assert!(engine.busy());
    }
}
