/*!
Frame-id based frame synchronization state machine.

Packets carry no frame number, only a toggling frame-id bit and an EOF flag
on the last packet of each frame. Capture may start mid-frame, so the engine
first waits for an EOF packet, then assembles frames from the packets that
follow until the next EOF.
*/

use bytes::BytesMut;
use gateware::{Frame, Packet};
use tracing::{debug, info, warn};

/// Frame synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSyncState {
    /// Dropping packets until the end of a (partial) frame
    WaitingForSync,
    /// Next packet opens a frame
    WaitingForFrame,
    /// Collecting packets of one frame
    Collecting { fid: bool, packets: u32 },
}

/// Synchronizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub packets: u64,
    pub frames_completed: u64,
    /// Frame-id changed before EOF, or did not toggle between frames
    pub sync_errors: u64,
    /// Frames whose pixel count differs from the expected one
    pub size_errors: u64,
    /// Packets dropped while waiting for sync
    pub packets_dropped: u64,
}

/// Frame synchronization engine
pub struct FrameSyncEngine {
    state: FrameSyncState,
    frame_buffer: BytesMut,
    expected_pixels: Option<usize>,
    next_number: u32,
    last_fid: Option<bool>,
    stats: SyncStats,
}

impl FrameSyncEngine {
    /// Create a new frame synchronization engine
    pub fn new() -> Self {
        Self {
            state: FrameSyncState::WaitingForSync,
            frame_buffer: BytesMut::new(),
            expected_pixels: None,
            next_number: 0,
            last_fid: None,
            stats: SyncStats::default(),
        }
    }

    /// Check every completed frame against a known pixel count
    pub fn with_expected_pixels(mut self, pixels: usize) -> Self {
        self.expected_pixels = Some(pixels);
        self.frame_buffer.reserve(2 * pixels);
        self
    }

    /// Number given to the first completed frame
    pub fn with_first_number(mut self, number: u32) -> Self {
        self.next_number = number;
        self
    }

    /// Get current state
    pub fn state(&self) -> FrameSyncState {
        self.state
    }

    /// Get statistics
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Bytes of the frame being collected
    pub fn current_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    /// Feed one packet. Returns a frame when this packet completes one.
    pub fn process_packet(&mut self, packet: &Packet) -> Option<Frame> {
        self.stats.packets += 1;
        let header = packet.header;

        match self.state {
            FrameSyncState::WaitingForSync => {
                self.stats.packets_dropped += 1;
                if header.eof {
                    info!("Synchronized on EOF packet (fid {})", header.fid as u8);
                    self.last_fid = Some(header.fid);
                    self.state = FrameSyncState::WaitingForFrame;
                }
                None
            }

            FrameSyncState::WaitingForFrame => self.start_frame(packet),

            FrameSyncState::Collecting { fid, packets } => {
                if header.fid != fid {
                    warn!(
                        "Frame-id changed from {} to {} after {} packets, restarting frame",
                        fid as u8, header.fid as u8, packets
                    );
                    self.stats.sync_errors += 1;
                    return self.start_frame(packet);
                }

                self.frame_buffer.extend_from_slice(&packet.payload);
                let packets = packets + 1;
                if header.eof {
                    return Some(self.complete_frame(fid, packets));
                }
                self.state = FrameSyncState::Collecting { fid, packets };
                None
            }
        }
    }

    fn start_frame(&mut self, packet: &Packet) -> Option<Frame> {
        let fid = packet.header.fid;
        if self.last_fid == Some(fid) {
            warn!("Frame-id {} did not toggle, a frame was lost", fid as u8);
            self.stats.sync_errors += 1;
        }

        self.frame_buffer.clear();
        self.frame_buffer.extend_from_slice(&packet.payload);
        debug!("Frame start (fid {})", fid as u8);

        if packet.header.eof {
            return Some(self.complete_frame(fid, 1));
        }
        self.state = FrameSyncState::Collecting { fid, packets: 1 };
        None
    }

    fn complete_frame(&mut self, fid: bool, packets: u32) -> Frame {
        let frame = Frame {
            number: self.next_number,
            fid,
            payload: self.frame_buffer.split().to_vec(),
            packets,
        };

        if let Some(expected) = self.expected_pixels {
            if frame.num_pixels() != expected {
                warn!(
                    "Frame {:08X}: expected {} pixels, got {}",
                    frame.number,
                    expected,
                    frame.num_pixels()
                );
                self.stats.size_errors += 1;
            }
        }

        debug!("Frame {:08X} complete: {} packets, {} bytes", frame.number, packets, frame.payload.len());
        self.next_number += 1;
        self.last_fid = Some(fid);
        self.stats.frames_completed += 1;
        self.state = FrameSyncState::WaitingForFrame;
        frame
    }
}

impl Default for FrameSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateware::PacketHeader;

    fn packet(fid: bool, eof: bool, payload: &[u8]) -> Packet {
        Packet {
            header: PacketHeader::new(fid, eof),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_waits_for_first_eof() {
        let mut sync = FrameSyncEngine::new();
        assert!(sync.process_packet(&packet(false, false, &[1, 0])).is_none());
        assert!(sync.process_packet(&packet(false, true, &[2, 0])).is_none());
        assert_eq!(sync.state(), FrameSyncState::WaitingForFrame);
        assert_eq!(sync.stats().packets_dropped, 2);

        assert!(sync.process_packet(&packet(true, false, &[3, 0, 4, 0])).is_none());
        let frame = sync.process_packet(&packet(true, true, &[5, 0])).unwrap();
        assert_eq!(frame.number, 0);
        assert!(frame.fid);
        assert_eq!(frame.packets, 2);
        assert_eq!(frame.pixels(), vec![3, 4, 5]);
        assert_eq!(sync.stats().sync_errors, 0);
    }

    #[test]
    fn test_fid_change_restarts_frame() {
        let mut sync = FrameSyncEngine::new().with_expected_pixels(2).with_first_number(7);
        sync.process_packet(&packet(false, true, &[]));

        sync.process_packet(&packet(true, false, &[9, 0]));
        // EOF packet of fid 1 lost, fid 0 frame begins
        assert!(sync.process_packet(&packet(false, false, &[1, 0])).is_none());
        let frame = sync.process_packet(&packet(false, true, &[2, 0])).unwrap();

        assert_eq!(frame.number, 7);
        assert_eq!(frame.pixels(), vec![1, 2]);
        // fid change mid-frame, then no toggle relative to the sync packet
        assert_eq!(sync.stats().sync_errors, 2);
        assert_eq!(sync.stats().size_errors, 0);
    }

    #[test]
    fn test_size_check() {
        let mut sync = FrameSyncEngine::new().with_expected_pixels(4);
        sync.process_packet(&packet(true, true, &[]));
        let frame = sync.process_packet(&packet(false, true, &[1, 0, 2, 0])).unwrap();
        assert_eq!(frame.num_pixels(), 2);
        assert_eq!(sync.stats().size_errors, 1);
        assert_eq!(sync.stats().frames_completed, 1);
    }
}
