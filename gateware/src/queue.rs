/*!
Elastic queue: the bounded FIFO that decouples the state machines.

Every queue has exactly one producer and one consumer. Components never hold
the queue itself; on each tick the owner lends a [`Writer`] to the producer
and a [`Reader`] to the consumer, so the single-writer/single-reader
discipline holds by construction instead of by locking.
*/

use std::collections::VecDeque;

use num_traits::{PrimInt, Unsigned};
use tracing::warn;

/// Fixed-capacity FIFO of fixed-width words
#[derive(Debug, Clone)]
pub struct ElasticQueue<W> {
    slots: VecDeque<W>,
    depth: usize,
    width: u32,
    mask: W,
    high_water: usize,
    dropped_writes: u64,
}

impl<W: PrimInt + Unsigned> ElasticQueue<W> {
    /// Create an empty queue holding `depth` words of `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero or `width` does not fit in `W`.
    pub fn new(depth: usize, width: u32) -> Self {
        let bits = W::zero().count_zeros();
        assert!(depth > 0, "queue depth must be non-zero");
        assert!(width > 0 && width <= bits, "word width {} does not fit in {} bits", width, bits);

        let mask = if width == bits {
            W::max_value()
        } else {
            (W::one() << width as usize) - W::one()
        };

        Self {
            slots: VecDeque::with_capacity(depth),
            depth,
            width,
            mask,
            high_water: 0,
            dropped_writes: 0,
        }
    }

    /// Queue not full
    pub fn ready_to_write(&self) -> bool {
        self.slots.len() < self.depth
    }

    /// Queue not empty
    pub fn ready_to_read(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of words currently held
    pub fn level(&self) -> usize {
        self.slots.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Highest level seen since construction or the last [`clear`](Self::clear)
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Writes attempted while the queue was full
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes
    }

    /// Empty the queue (reset)
    pub fn clear(&mut self) {
        self.slots.clear();
        self.high_water = 0;
    }

    /// Producer side of the queue for one tick
    pub fn writer(&mut self) -> Writer<'_, W> {
        Writer { queue: self }
    }

    /// Consumer side of the queue for one tick
    pub fn reader(&mut self) -> Reader<'_, W> {
        Reader { queue: self }
    }

    fn push(&mut self, word: W) {
        if !self.ready_to_write() {
            // Callers check ready_to_write first; reaching this is a wiring bug.
            self.dropped_writes += 1;
            warn!("elastic queue full ({} words), write dropped", self.depth);
            return;
        }
        self.slots.push_back(word & self.mask);
        self.high_water = self.high_water.max(self.slots.len());
    }

    fn pop(&mut self) -> Option<W> {
        self.slots.pop_front()
    }
}

/// Write side of an [`ElasticQueue`]
pub struct Writer<'a, W> {
    queue: &'a mut ElasticQueue<W>,
}

impl<W: PrimInt + Unsigned> Writer<'_, W> {
    /// `ready-to-write`
    pub fn ready(&self) -> bool {
        self.queue.ready_to_write()
    }

    /// Push one word, masked to the queue width. Ignored when the queue is full.
    pub fn write(&mut self, word: W) {
        self.queue.push(word);
    }
}

/// Read side of an [`ElasticQueue`]
pub struct Reader<'a, W> {
    queue: &'a mut ElasticQueue<W>,
}

impl<W: PrimInt + Unsigned> Reader<'_, W> {
    /// `ready-to-read`
    pub fn ready(&self) -> bool {
        self.queue.ready_to_read()
    }

    /// Pop the oldest word, `None` when the queue is empty.
    pub fn read(&mut self) -> Option<W> {
        self.queue.pop()
    }
}
