/*!
Sensor command sequence.

The sensor is configured after every INIT with a fixed preamble followed by
its register/value pairs. The pairs go out last-register-first while each
pair keeps its own byte order, so the table is computed once here and the
sequencer only ever reads it by index.
*/

use crate::error::{GatewareError, Result};

/// Immutable, precomputed command table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    entries: Vec<u8>,
}

impl CommandTable {
    /// Build the table from a preamble and a buffer of register/value pairs.
    pub fn build(preamble: &[u8], buffer: &[u8]) -> Result<Self> {
        if buffer.len() % 2 != 0 {
            return Err(GatewareError::config(format!(
                "command buffer must hold register/value pairs, got {} bytes",
                buffer.len()
            )));
        }

        let len = buffer.len();
        let mut entries = Vec::with_capacity(preamble.len() + len);
        entries.extend_from_slice(preamble);
        // pair i/2 counted from the end, byte i%2 within the pair
        entries.extend((0..len).map(|i| buffer[len - 2 - 2 * (i / 2) + i % 2]));

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, `None` past the end
    pub fn get(&self, index: usize) -> Option<u8> {
        self.entries.get(index).copied()
    }
}
