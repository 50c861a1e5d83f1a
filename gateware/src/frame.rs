/*!
Frame data structures and frame files.

A frame is the payload of every packet between two frame-id changes, the last
one carrying the EOF flag. Frames are saved as raw payload bytes named after
the frame number (`0000002A.raw`) with a small JSON sidecar holding the
metadata.
*/

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GatewareError, Result};
use crate::packet::Packet;

/// Metadata stored next to a raw frame file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub number: u32,
    pub fid: bool,
    pub packets: u32,
    pub pixels: usize,
}

/// Complete frame reassembled from bus packets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub number: u32,
    pub fid: bool,
    pub payload: Vec<u8>,
    pub packets: u32,
}

impl Frame {
    /// Create an empty frame
    pub fn new(number: u32, fid: bool) -> Self {
        Self {
            number,
            fid,
            payload: Vec::new(),
            packets: 0,
        }
    }

    /// Assemble a frame from its packets, in bus order.
    ///
    /// All packets must share one frame-id and only the last may carry EOF.
    pub fn from_packets(number: u32, packets: &[Packet]) -> Result<Self> {
        let (last, body) = packets
            .split_last()
            .ok_or_else(|| GatewareError::invalid_frame("no packets"))?;
        if !last.header.eof {
            return Err(GatewareError::invalid_frame("last packet does not carry EOF"));
        }

        let fid = last.header.fid;
        let mut frame = Frame::new(number, fid);
        for (i, packet) in body.iter().enumerate() {
            if packet.header.eof {
                return Err(GatewareError::invalid_frame(format!("EOF on packet {} of {}", i, packets.len())));
            }
            if packet.header.fid != fid {
                return Err(GatewareError::invalid_frame(format!("frame-id changes at packet {}", i)));
            }
        }
        for packet in packets {
            frame.push(packet);
        }
        Ok(frame)
    }

    /// Append one packet's payload
    pub fn push(&mut self, packet: &Packet) {
        self.payload.extend_from_slice(&packet.payload);
        self.packets += 1;
    }

    /// Get the frame number
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn num_pixels(&self) -> usize {
        self.payload.len() / 2
    }

    /// Payload as little-endian 16-bit pixel words
    pub fn pixels(&self) -> Vec<u16> {
        self.payload
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            number: self.number,
            fid: self.fid,
            packets: self.packets,
            pixels: self.num_pixels(),
        }
    }

    /// File name of this frame's raw payload
    pub fn file_name(&self) -> String {
        format!("{:08X}.raw", self.number)
    }

    /// Write the raw payload and its sidecar into `dir`, returning the raw file path
    pub fn to_file<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.file_name());
        std::fs::write(&path, &self.payload)?;
        std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&self.info())?)?;
        Ok(path)
    }

    /// Load a frame from a raw file, using the sidecar when present
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let number = extract_frame_number_from_path(path)?;
        let payload = std::fs::read(path)?;
        if payload.len() % 2 != 0 {
            return Err(GatewareError::invalid_file_format(format!(
                "file size {} is not a whole number of pixels",
                payload.len()
            )));
        }

        let sidecar = path.with_extension("json");
        let (fid, packets) = if sidecar.exists() {
            let info: FrameInfo = serde_json::from_slice(&std::fs::read(&sidecar)?)?;
            (info.fid, info.packets)
        } else {
            (false, 0)
        };

        Ok(Self {
            number,
            fid,
            payload,
            packets,
        })
    }
}

/// Extract the frame number from a frame file path
pub fn extract_frame_number_from_path(path: &Path) -> Result<u32> {
    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| GatewareError::invalid_file_format("Invalid filename"))?;

    // 8-digit hex, as written by to_file
    if filename.len() == 8 {
        if let Ok(number) = u32::from_str_radix(filename, 16) {
            return Ok(number);
        }
    }

    if let Ok(number) = filename.parse::<u32>() {
        return Ok(number);
    }

    // e.g. "frame_123"
    let re = Regex::new(r"(\d+)").map_err(|e| GatewareError::invalid_file_format(e.to_string()))?;
    re.find(filename)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| GatewareError::invalid_file_format(format!("no frame number in {:?}", filename)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketHeader;

    fn packet(fid: bool, eof: bool, payload: &[u8]) -> Packet {
        Packet {
            header: PacketHeader::new(fid, eof),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_frame_number_extraction() {
        use std::path::PathBuf;

        assert_eq!(extract_frame_number_from_path(&PathBuf::from("00000001.raw")).unwrap(), 1);
        assert_eq!(extract_frame_number_from_path(&PathBuf::from("000000FF.raw")).unwrap(), 255);
        assert_eq!(extract_frame_number_from_path(&PathBuf::from("123.raw")).unwrap(), 123);
        assert_eq!(extract_frame_number_from_path(&PathBuf::from("frame_77.raw")).unwrap(), 77);
        assert!(extract_frame_number_from_path(&PathBuf::from("capture.raw")).is_err());
    }

    #[test]
    fn test_from_packets() {
        let frame = Frame::from_packets(
            3,
            &[packet(true, false, &[0x00, 0x7F, 0x01, 0x7F]), packet(true, true, &[0x02, 0x7F])],
        )
        .unwrap();

        assert_eq!(frame.number(), 3);
        assert!(frame.fid);
        assert_eq!(frame.packets, 2);
        assert_eq!(frame.pixels(), vec![0x7F00, 0x7F01, 0x7F02]);
    }

    #[test]
    fn test_from_packets_rejects_broken_frames() {
        assert!(Frame::from_packets(0, &[]).is_err());
        assert!(Frame::from_packets(0, &[packet(false, false, &[0, 0])]).is_err());
        assert!(Frame::from_packets(0, &[packet(false, false, &[0, 0]), packet(true, true, &[0, 0])]).is_err());
        assert!(Frame::from_packets(0, &[packet(false, true, &[0, 0]), packet(false, true, &[0, 0])]).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::from_packets(42, &[packet(true, true, &[0x34, 0x12, 0x78, 0x56])]).unwrap();

        let path = frame.to_file(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "0000002A.raw");

        let loaded = Frame::from_file(&path).unwrap();
        assert_eq!(loaded, frame);
        assert_eq!(loaded.pixels(), vec![0x1234, 0x5678]);
    }
}
