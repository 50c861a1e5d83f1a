/*!
Bit-serial deserializer for the sensor's two data lines.

The sensor streams even and odd columns on separate lines, one bit per clock.
While the sequencer holds `latch`, each tick shifts one bit of each line into
its accumulator; after 14 bits both words are completed and handed to a small
handshake that pushes them into the pixel queue, even word first.
*/

use tracing::trace;

use crate::queue::Writer;

/// Width of a sensor pixel word
pub const PIXEL_WORD_WIDTH: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Idle,
    EmitEven,
    EmitOdd,
}

#[derive(Debug, Clone)]
pub struct Deserializer {
    width: u32,
    bit_count: u32,
    acc_even: u16,
    acc_odd: u16,
    even_word: u16,
    odd_word: u16,
    have_data: bool,
    handshake: Handshake,
    words_completed: u64,
    overruns: u64,
}

impl Deserializer {
    pub fn new(width: u32) -> Self {
        assert!(width > 0 && width <= 16, "deserializer width {} out of range", width);
        Self {
            width,
            bit_count: 0,
            acc_even: 0,
            acc_odd: 0,
            even_word: 0,
            odd_word: 0,
            have_data: false,
            handshake: Handshake::Idle,
            words_completed: 0,
            overruns: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.width);
    }

    /// A completed even/odd pair is waiting to be queued
    pub fn have_data(&self) -> bool {
        self.have_data
    }

    /// Last completed (even, odd) pair, as presented downstream
    pub fn words(&self) -> (u16, u16) {
        (self.even_word, self.odd_word)
    }

    /// Pairs completed since reset
    pub fn words_completed(&self) -> u64 {
        self.words_completed
    }

    /// Pairs overwritten before the handshake queued them
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// One sensor clock: drain a pending pair, then sample both lines.
    pub fn tick(&mut self, latch: bool, even: bool, odd: bool, mut out: Writer<'_, u16>) {
        match self.handshake {
            Handshake::Idle => {
                if self.have_data {
                    self.handshake = Handshake::EmitEven;
                }
            }
            Handshake::EmitEven => {
                if out.ready() {
                    out.write(self.even_word);
                    self.handshake = Handshake::EmitOdd;
                }
            }
            Handshake::EmitOdd => {
                if out.ready() {
                    out.write(self.odd_word);
                    self.have_data = false;
                    self.handshake = Handshake::Idle;
                }
            }
        }

        if !latch {
            self.acc_even = 0;
            self.acc_odd = 0;
            self.bit_count = 0;
            return;
        }

        self.acc_even |= (even as u16) << self.bit_count;
        self.acc_odd |= (odd as u16) << self.bit_count;
        self.bit_count += 1;

        if self.bit_count == self.width {
            if self.have_data {
                self.overruns += 1;
            }
            // First sampled bit becomes the MSB of the emitted word.
            self.even_word = self.reverse(self.acc_even);
            self.odd_word = self.reverse(self.acc_odd);
            self.acc_even = 0;
            self.acc_odd = 0;
            self.bit_count = 0;
            self.have_data = true;
            self.handshake = Handshake::EmitEven;
            self.words_completed += 1;
            trace!("deserializer pair {:04x}/{:04x}", self.even_word, self.odd_word);
        }
    }

    fn reverse(&self, acc: u16) -> u16 {
        acc.reverse_bits() >> (16 - self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ElasticQueue;

    fn drain(queue: &mut ElasticQueue<u16>) -> Vec<u16> {
        let mut words = Vec::new();
        while let Some(word) = queue.reader().read() {
            words.push(word);
        }
        words
    }

    #[test]
    fn test_alternating_pattern_is_bit_reversed() {
        let mut queue = ElasticQueue::new(8, PIXEL_WORD_WIDTH);
        let mut des = Deserializer::new(PIXEL_WORD_WIDTH);

        for i in 0..14 {
            let bit = i % 2 == 0;
            des.tick(true, bit, !bit, queue.writer());
        }
        assert!(des.have_data());
        assert_eq!(des.words(), (0x2AAA, 0x1555));
        assert_eq!(queue.level(), 0);

        // have-data drains within the following two ticks
        des.tick(false, false, false, queue.writer());
        assert!(des.have_data());
        assert_eq!(queue.level(), 1);
        des.tick(false, false, false, queue.writer());
        assert!(!des.have_data());

        assert_eq!(drain(&mut queue), vec![0x2AAA, 0x1555]);
    }

    #[test]
    fn test_msb_first_stream_recovers_word() {
        let mut queue = ElasticQueue::new(8, PIXEL_WORD_WIDTH);
        let mut des = Deserializer::new(PIXEL_WORD_WIDTH);
        let (even, odd) = (0x2ABCu16, 0x0123u16);

        for shift in (0..14).rev() {
            des.tick(true, (even >> shift) & 1 == 1, (odd >> shift) & 1 == 1, queue.writer());
        }
        des.tick(false, false, false, queue.writer());
        des.tick(false, false, false, queue.writer());

        assert_eq!(drain(&mut queue), vec![even, odd]);
        assert_eq!(des.words_completed(), 1);
    }

    #[test]
    fn test_latch_low_discards_partial_word() {
        let mut queue = ElasticQueue::new(8, PIXEL_WORD_WIDTH);
        let mut des = Deserializer::new(PIXEL_WORD_WIDTH);

        for _ in 0..10 {
            des.tick(true, true, true, queue.writer());
        }
        des.tick(false, true, true, queue.writer());
        for _ in 0..13 {
            des.tick(true, true, true, queue.writer());
        }
        assert!(!des.have_data());

        des.tick(true, true, true, queue.writer());
        assert!(des.have_data());
        assert_eq!(des.words(), (0x3FFF, 0x3FFF));
    }

    #[test]
    fn test_full_queue_holds_handshake() {
        let mut queue = ElasticQueue::new(1, PIXEL_WORD_WIDTH);
        let mut des = Deserializer::new(PIXEL_WORD_WIDTH);

        for _ in 0..14 {
            des.tick(true, true, false, queue.writer());
        }
        for _ in 0..4 {
            des.tick(false, false, false, queue.writer());
        }
        // even queued, odd waiting for space
        assert!(des.have_data());
        assert_eq!(queue.reader().read(), Some(0x3FFF));

        des.tick(false, false, false, queue.writer());
        assert!(!des.have_data());
        assert_eq!(queue.reader().read(), Some(0));
        assert_eq!(queue.dropped_writes(), 0);
    }
}
