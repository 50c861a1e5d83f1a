/*!
Bus packetizer for the host-facing slave FIFO.

Streams pixel pairs to the bridge chip as bounded packets. Every packet opens
with a two byte header (class tag, then frame-id and end-of-frame flags) and is
closed with a one-tick `pktend` pulse, either when the frame runs out of
pixels or when another pair would not fit. Each write tick is followed by a
latch tick with the strobe released, and no write tick is entered while the
bus reports `full`.

```text
INIT -> HOLD -> HEADER(0) -> HEADER_LATCH(0) -> HEADER(1) -> HEADER_LATCH(1)
          ^                                                         |
          |                                                         v
        CLOSE <- NEXT <- PIXEL_LATCH(3) <- ... <- PIXEL(0) <- PIXEL_LATCH(p)
                   |                                  ^
                   +----------------------------------+
```
*/

use tracing::{debug, trace};

use crate::config::BusConfig;
use crate::protocol::{BYTES_PER_PAIR, HEADER_FIXED, HEADER_LEN};
use crate::queue::Reader;

/// Status codes per packetizer phase
pub mod status {
    pub const INIT: u8 = 0x01;
    pub const HEADER: u8 = 0x02;
    pub const PIXEL: u8 = 0x04;
    pub const NEXT: u8 = 0x08;
    pub const CLOSE: u8 = 0x10;
    pub const HOLD: u8 = 0x20;
    /// Or-ed in while the strobe is released after a write
    pub const LATCH: u8 = 0x80;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketizerState {
    Init,
    Hold,
    Header(u8),
    HeaderLatch(u8),
    Pixel(u8),
    PixelLatch(u8),
    Next,
    Close,
}

impl PacketizerState {
    pub fn status(self) -> u8 {
        match self {
            Self::Init => status::INIT,
            Self::Hold => status::HOLD,
            Self::Header(_) => status::HEADER,
            Self::HeaderLatch(_) => status::HEADER | status::LATCH,
            Self::Pixel(_) => status::PIXEL,
            Self::PixelLatch(_) => status::PIXEL | status::LATCH,
            Self::Next => status::NEXT,
            Self::Close => status::CLOSE,
        }
    }

    fn is_write(self) -> bool {
        matches!(self, Self::Header(_) | Self::Pixel(_))
    }
}

/// Status inputs from the bridge chip, as logical levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusInputs {
    /// The endpoint buffer cannot take another byte
    pub full: bool,
    pub empty: bool,
}

/// Pin-level outputs of the packetizer for one bus tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOutputs {
    pub data: u8,
    /// FIFO address, always endpoint 0
    pub addr: u8,
    pub clk_out: bool,
    /// Output enable, held high (inactive)
    pub sloe: bool,
    /// Read strobe, held high (inactive)
    pub slrd: bool,
    /// Active-low write strobe
    pub slwr_n: bool,
    /// Active-low packet end
    pub pktend_n: bool,
    pub status: u8,
}

impl BusOutputs {
    /// `data` is being written this tick
    pub fn write_strobe(&self) -> bool {
        !self.slwr_n
    }

    /// The current packet ends this tick
    pub fn packet_end(&self) -> bool {
        !self.pktend_n
    }
}

impl Default for BusOutputs {
    fn default() -> Self {
        Self {
            data: 0,
            addr: 0,
            clk_out: false,
            sloe: true,
            slrd: true,
            slwr_n: true,
            pktend_n: true,
            status: status::INIT,
        }
    }
}

/// Where the packetizer pulls pixel words from
pub trait PixelSource {
    /// Next pixel word, `index` being its position in the frame. `None`
    /// stalls the packetizer until a word is available.
    fn next_pixel(&mut self, index: u32) -> Option<u16>;
}

impl PixelSource for Reader<'_, u16> {
    fn next_pixel(&mut self, _index: u32) -> Option<u16> {
        self.read()
    }
}

/// Synthetic frame: luma counts up with the pixel index, chroma fixed at 0x7F
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestPattern;

impl TestPattern {
    pub const CHROMA: u8 = 0x7F;

    pub fn pixel(index: u32) -> u16 {
        ((Self::CHROMA as u16) << 8) | (index & 0xFF) as u16
    }
}

impl PixelSource for TestPattern {
    fn next_pixel(&mut self, index: u32) -> Option<u16> {
        Some(Self::pixel(index))
    }
}

#[derive(Debug, Clone)]
pub struct BusPacketizer {
    max_packet_bytes: usize,
    header_tag: u8,
    frame_pixels: u32,
    state: PacketizerState,
    data: u8,
    clk_out: bool,
    pixel: u16,
    pixel_count: u32,
    byte_count: usize,
    fid: bool,
    eof: bool,
    packets_sent: u64,
    frames_sent: u64,
}

impl BusPacketizer {
    pub fn new(config: &BusConfig, frame_pixels: u32) -> Self {
        Self {
            max_packet_bytes: config.max_packet_bytes,
            header_tag: config.header_tag,
            frame_pixels,
            state: PacketizerState::Init,
            data: 0,
            clk_out: false,
            pixel: 0,
            pixel_count: 0,
            byte_count: 0,
            fid: false,
            eof: false,
            packets_sent: 0,
            frames_sent: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = PacketizerState::Init;
        self.data = 0;
        self.clk_out = false;
        self.pixel = 0;
        self.pixel_count = 0;
        self.byte_count = 0;
        self.fid = false;
        self.eof = false;
    }

    pub fn state(&self) -> PacketizerState {
        self.state
    }

    /// Current frame-id bit
    pub fn fid(&self) -> bool {
        self.fid
    }

    /// End-of-frame flag for the packet being sent
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Pixels of the current frame already sent
    pub fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    pub fn frame_pixels(&self) -> u32 {
        self.frame_pixels
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Largest pair-aligned payload after the header
    pub fn payload_capacity(&self) -> usize {
        (self.max_packet_bytes - HEADER_LEN) / BYTES_PER_PAIR * BYTES_PER_PAIR
    }

    /// Header byte 1 for the packet being sent
    pub fn flags_byte(&self) -> u8 {
        HEADER_FIXED | ((self.eof as u8) << 1) | self.fid as u8
    }

    pub fn outputs(&self) -> BusOutputs {
        BusOutputs {
            data: self.data,
            addr: 0,
            clk_out: self.clk_out,
            sloe: true,
            slrd: true,
            slwr_n: !self.state.is_write(),
            pktend_n: self.state != PacketizerState::Close,
            status: self.state.status(),
        }
    }

    /// One bus tick. The returned outputs are the ones driven during this tick.
    pub fn tick<S: PixelSource + ?Sized>(&mut self, inputs: BusInputs, source: &mut S) -> BusOutputs {
        self.clk_out = !self.clk_out;
        let ready = !inputs.full;

        match self.state {
            PacketizerState::Init => {
                self.fid = false;
                self.pixel_count = 0;
                self.byte_count = 0;
                self.eof = self.fits(self.frame_pixels);
                self.state = PacketizerState::Hold;
            }
            PacketizerState::Hold => {
                if ready {
                    self.write_byte(self.header_tag);
                    self.state = PacketizerState::Header(0);
                }
            }
            PacketizerState::Header(i) => {
                self.state = PacketizerState::HeaderLatch(i);
            }
            PacketizerState::HeaderLatch(0) => {
                if ready {
                    self.write_byte(self.flags_byte());
                    self.state = PacketizerState::Header(1);
                }
            }
            PacketizerState::HeaderLatch(_) => self.start_pair(ready, source),
            PacketizerState::Pixel(p) => {
                if p % 2 == 1 {
                    self.pixel_count += 1;
                }
                self.state = PacketizerState::PixelLatch(p);
            }
            PacketizerState::PixelLatch(p) if p >= 3 => {
                self.state = PacketizerState::Next;
            }
            PacketizerState::PixelLatch(p) => {
                // low byte is on the bus; the high byte needs no new pixel
                let next = p + 1;
                if next == 2 {
                    if ready {
                        if let Some(word) = source.next_pixel(self.pixel_count) {
                            self.pixel = word;
                            self.write_byte(word as u8);
                            self.state = PacketizerState::Pixel(next);
                        }
                    }
                } else if ready {
                    self.write_byte((self.pixel >> 8) as u8);
                    self.state = PacketizerState::Pixel(next);
                }
            }
            PacketizerState::Next => {
                if self.pixel_count == self.frame_pixels
                    || self.byte_count + BYTES_PER_PAIR > self.max_packet_bytes
                {
                    self.byte_count = 0;
                    self.state = PacketizerState::Close;
                } else {
                    self.start_pair(ready, source);
                }
            }
            PacketizerState::Close => {
                self.close_packet();
                self.state = PacketizerState::Hold;
            }
        }

        self.outputs()
    }

    fn start_pair<S: PixelSource + ?Sized>(&mut self, ready: bool, source: &mut S) {
        if !ready {
            return;
        }
        if let Some(word) = source.next_pixel(self.pixel_count) {
            self.pixel = word;
            self.write_byte(word as u8);
            self.state = PacketizerState::Pixel(0);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.data = byte;
        self.byte_count += 1;
    }

    fn close_packet(&mut self) {
        self.packets_sent += 1;
        trace!(
            "packetizer: packet {} closed, fid={} eof={} at pixel {}",
            self.packets_sent,
            self.fid as u8,
            self.eof as u8,
            self.pixel_count
        );

        if self.pixel_count == self.frame_pixels {
            self.pixel_count = 0;
            self.fid = !self.fid;
            self.frames_sent += 1;
            self.eof = self.fits(self.frame_pixels);
            debug!("packetizer: frame {} sent", self.frames_sent);
        } else {
            self.eof = self.fits(self.frame_pixels - self.pixel_count);
        }
    }

    /// `remaining` pixels fit in one packet
    fn fits(&self, remaining: u32) -> bool {
        2 * remaining as usize <= self.payload_capacity()
    }
}
