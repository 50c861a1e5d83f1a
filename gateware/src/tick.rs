// Host-side observers are sequence processors built out of:
//
//   - Tick: run a state machine for one clock tick, feeding it one
//     sample of the bus, possibly producing a parsed element.
//
//   - Decode: apply the rate-reducer to a sample sequence, collect
//     the result sequence.

use std::marker::PhantomData;

/// One clock tick of an observer state machine.
pub trait Tick<I, O> {
    fn tick(&mut self, input: I) -> Option<O>;
}

/// Iterator adaptor returned by [`decode`].
pub struct Decode<'a, S, T, O> {
    stream: S,
    tick: &'a mut T,
    _out: PhantomData<fn() -> O>,
}

/// Feed every sample of `stream` to `tick`, yielding only the parsed elements.
pub fn decode<I, O, S, T>(tick: &mut T, stream: S) -> Decode<'_, S, T, O>
where
    S: Iterator<Item = I>,
    T: Tick<I, O>,
{
    Decode { stream, tick, _out: PhantomData }
}

impl<I, O, S, T> Iterator for Decode<'_, S, T, O>
where
    S: Iterator<Item = I>,
    T: Tick<I, O>,
{
    type Item = O;

    #[inline(always)]
    fn next(&mut self) -> Option<O> {
        for input in self.stream.by_ref() {
            if let Some(out) = self.tick.tick(input) {
                return Some(out);
            }
        }
        None
    }
}
