/*!
Capture session.

Two threads connected by a bounded channel:

1. Simulation thread: runs the controller model against a synthetic sensor
   and a `full` stall schedule, decodes the byte bus into packets and forwards
   them.
2. Writer thread: reassembles frames and writes them as `.raw` files into a
   timestamped session directory, or prints them as JSON lines in live mode.
*/

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use gateware::frame::extract_frame_number_from_path;
use gateware::{
    BusInputs, BusMonitor, Controller, Frame, Packet, SensorLinkInputs, SyntheticSensor, Tick,
};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, CaptureConfig};
use crate::frame_sync::{FrameSyncEngine, SyncStats};

/// How often the simulation loop looks at the running flag, in bus ticks
const RUNNING_CHECK_TICKS: u64 = 1024;

/// Counters reported when a session ends
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub bus_ticks: u64,
    pub packets: u64,
    pub frames_written: u64,
    pub file_write_errors: u64,
    pub sync: SyncStats,
}

/// Statistics of the simulation thread
#[derive(Debug, Clone, Copy, Default)]
struct SimulationStats {
    bus_ticks: u64,
    packets: u64,
    malformed: u64,
    writes_while_full: u64,
}

/// Counters of the writer thread
#[derive(Debug, Clone, Default)]
struct WriterStats {
    frames_written: u64,
    file_write_errors: u64,
    sync: SyncStats,
}

pub struct CaptureSession {
    config: AppConfig,
    session_dir: PathBuf,
    running: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Create a session; frames go to a timestamped subdirectory of the output directory
    pub fn new(config: AppConfig) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let session_dir = Path::new(&config.capture.output_directory).join(&timestamp);

        if config.capture.enable_storage {
            info!("Capture session timestamp: {}", timestamp);
            info!("Files will be saved to: {}", session_dir.display());
        }

        Self {
            config,
            session_dir,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Run until the tick or frame limit is reached or the running flag clears
    pub fn start(&mut self) -> Result<CaptureSummary> {
        self.config.controller.validate().context("Invalid controller configuration")?;

        let (packet_tx, packet_rx) = bounded::<Packet>(self.config.capture.channel_buffer_size.max(1));

        let sim_config = self.config.clone();
        let sim_running = Arc::clone(&self.running);
        let sim_handle = thread::spawn(move || {
            let result = Self::simulation_thread(sim_config, packet_tx, sim_running);
            if let Err(e) = &result {
                error!("Simulation thread failed: {:#}", e);
            }
            result
        });

        let frame_pixels = self.config.controller.frame_pixels() as usize;
        let capture = self.config.capture.clone();
        let session_dir = self.session_dir.clone();
        let writer_running = Arc::clone(&self.running);
        let writer_handle = thread::spawn(move || {
            let result = Self::writer_thread(capture, session_dir, frame_pixels, packet_rx, writer_running);
            if let Err(e) = &result {
                error!("Writer thread failed: {:#}", e);
            }
            result
        });

        let sim = sim_handle.join().map_err(|_| anyhow!("Simulation thread panicked"))??;
        let writer = writer_handle.join().map_err(|_| anyhow!("Writer thread panicked"))??;

        Ok(CaptureSummary {
            bus_ticks: sim.bus_ticks,
            packets: sim.packets,
            frames_written: writer.frames_written,
            file_write_errors: writer.file_write_errors,
            sync: writer.sync,
        })
    }

    fn simulation_thread(config: AppConfig, packet_tx: Sender<Packet>, running: Arc<AtomicBool>) -> Result<SimulationStats> {
        let capture = &config.capture;
        let frame_pixels = config.controller.frame_pixels();
        let max_packet_bytes = config.controller.bus.max_packet_bytes;
        let tag = config.controller.bus.header_tag;

        let mut ctrl = Controller::from_config(config.controller.clone()).context("Failed to build controller")?;
        let mut sensor = SyntheticSensor::new(frame_pixels);
        let mut monitor = BusMonitor::new(max_packet_bytes, tag);

        let mut stats = SimulationStats::default();
        let mut link = SensorLinkInputs::default();
        let stats_interval = Duration::from_secs(capture.stats_interval_seconds.max(1));
        let start_time = Instant::now();
        let mut last_stats = start_time;

        info!("Simulation started ({} pixels per frame)", frame_pixels);

        'run: loop {
            let full = stalled(stats.bus_ticks, capture.stall_every_ticks, capture.stall_for_ticks);
            let inputs = BusInputs { full, empty: false };
            let edges = ctrl.step(link, inputs);

            if let Some(out) = edges.primary {
                link = sensor.tick(out.latch);
            }

            let Some(out) = edges.bus else {
                continue;
            };
            stats.bus_ticks += 1;

            match monitor.tick((inputs, out)) {
                Some(Ok(packet)) => {
                    stats.packets += 1;
                    if packet_tx.send(packet).is_err() {
                        debug!("Packet channel closed, stopping simulation");
                        break 'run;
                    }
                }
                Some(Err(_)) => stats.malformed += 1,
                None => {}
            }

            if capture.max_bus_ticks > 0 && stats.bus_ticks >= capture.max_bus_ticks {
                info!("Reached {} bus ticks", stats.bus_ticks);
                break;
            }

            if stats.bus_ticks % RUNNING_CHECK_TICKS == 0 {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if last_stats.elapsed() >= stats_interval {
                    let status = ctrl.status();
                    info!(
                        "Simulated {:.3} ms: {} bus ticks, {} packets, status {}",
                        ctrl.now_ps() as f64 / 1e9,
                        stats.bus_ticks,
                        stats.packets,
                        hex::encode([status.sequencer, status.packetizer])
                    );
                    last_stats = Instant::now();
                }
            }
        }

        stats.writes_while_full = monitor.writes_while_full();

        info!("Simulation final stats:");
        info!("   Bus ticks: {}", stats.bus_ticks);
        info!("   Primary ticks: {}", ctrl.primary_ticks());
        info!("   Packets: {}", stats.packets);
        info!("   Malformed packets: {}", stats.malformed);
        info!("   Writes while full: {}", stats.writes_while_full);
        info!("   Deserializer overruns: {}", ctrl.deserializer().overruns());
        info!("   Pixel queue high water: {}", ctrl.pixel_queue().high_water());
        info!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

        Ok(stats)
    }

    /// Find the next available frame number by checking existing files
    fn find_next_frame_number(dir: &Path) -> u32 {
        let mut next = 0u32;

        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("raw") {
                    continue;
                }
                if let Ok(number) = extract_frame_number_from_path(&path) {
                    next = next.max(number + 1);
                }
            }
        }

        next
    }

    fn writer_thread(
        capture: CaptureConfig,
        session_dir: PathBuf,
        frame_pixels: usize,
        packet_rx: Receiver<Packet>,
        running: Arc<AtomicBool>,
    ) -> Result<WriterStats> {
        let mut first_number = 0;
        if capture.enable_storage {
            std::fs::create_dir_all(&session_dir)
                .with_context(|| format!("Failed to create capture directory: {}", session_dir.display()))?;
            info!("Created capture directory: {}", session_dir.display());

            first_number = Self::find_next_frame_number(&session_dir);
            if first_number > 0 {
                info!("Found existing frame files, continuing from frame {}", first_number);
            }
        }

        let mut sync_engine = FrameSyncEngine::new()
            .with_expected_pixels(frame_pixels)
            .with_first_number(first_number);
        let mut stats = WriterStats::default();

        info!(
            "Writer thread started (storage: {}, live_output: {})",
            capture.enable_storage, capture.live_output
        );

        while running.load(Ordering::SeqCst) || !packet_rx.is_empty() {
            let packet = match packet_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(packet) => packet,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Packet channel disconnected - simulation has stopped");
                    break;
                }
            };

            let Some(frame) = sync_engine.process_packet(&packet) else {
                continue;
            };

            if capture.live_output {
                output_live_frame(&frame)?;
            }

            if capture.enable_storage {
                match frame.to_file(&session_dir) {
                    Ok(path) => info!(
                        "Completed frame file: {} ({} packets, {:.1} KB)",
                        path.display(),
                        frame.packets,
                        frame.payload.len() as f64 / 1024.0
                    ),
                    Err(e) => {
                        error!("Failed to write frame {:08X}: {}", frame.number, e);
                        stats.file_write_errors += 1;
                    }
                }
            }

            stats.frames_written += 1;
            if capture.max_frames > 0 && stats.frames_written >= capture.max_frames {
                info!("Captured {} frames, stopping", stats.frames_written);
                running.store(false, Ordering::SeqCst);
                break;
            }
        }

        let pending = sync_engine.current_buffer();
        if !pending.is_empty() {
            warn!("Incomplete frame at shutdown: {} bytes ({:?})", pending.len(), sync_engine.state());
        }

        stats.sync = sync_engine.stats();
        info!("Writer final stats:");
        info!("   Packets: {}", stats.sync.packets);
        info!("   Packets dropped before sync: {}", stats.sync.packets_dropped);
        info!("   Frames completed: {}", stats.sync.frames_completed);
        info!("   Frames written: {}", stats.frames_written);
        info!("   Sync errors: {}", stats.sync.sync_errors);
        info!("   Size errors: {}", stats.sync.size_errors);
        info!("   File write errors: {}", stats.file_write_errors);

        Ok(stats)
    }
}

/// `full` is asserted for the first `stall_for` ticks of every `every` ticks
fn stalled(tick: u64, every: u64, stall_for: u64) -> bool {
    every > 0 && tick % every < stall_for
}

/// One JSON line per frame on stdout
fn output_live_frame(frame: &Frame) -> Result<()> {
    use std::io::{self, Write};

    let head = &frame.payload[..frame.payload.len().min(16)];
    let line = serde_json::json!({
        "frame_number": frame.number,
        "fid": frame.fid as u8,
        "packets": frame.packets,
        "num_pixels": frame.num_pixels(),
        "head": hex::encode(head),
    });

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateware::PixelSourceKind;

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::new();
        config.controller.bus.pattern_frame_pixels = 1024;
        config.capture.output_directory = dir.to_string_lossy().into_owned();
        config.capture.max_frames = 2;
        config.capture.max_bus_ticks = 2_000_000;
        config
    }

    #[test]
    fn test_stall_schedule() {
        assert!(!stalled(5, 0, 3));
        assert!(stalled(0, 10, 3));
        assert!(stalled(12, 10, 3));
        assert!(!stalled(13, 10, 3));
    }

    #[test]
    fn test_pattern_session_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.capture.stall_every_ticks = 100;
        config.capture.stall_for_ticks = 30;

        let mut session = CaptureSession::new(config);
        let summary = session.start().unwrap();

        assert_eq!(summary.frames_written, 2);
        assert_eq!(summary.sync.sync_errors, 0);
        assert_eq!(summary.sync.size_errors, 0);

        let first = Frame::from_file(session.session_dir().join("00000000.raw")).unwrap();
        assert_eq!(first.num_pixels(), 1024);
        assert_eq!(&first.pixels()[..3], &[0x7F00u16, 0x7F01, 0x7F02]);
        assert!(session.session_dir().join("00000001.raw").exists());
    }

    #[test]
    fn test_sensor_session_counts_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.controller.bus.source = PixelSourceKind::Sensor;
        config.capture.max_frames = 1;
        config.capture.enable_storage = false;

        let mut session = CaptureSession::new(config);
        let summary = session.start().unwrap();

        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.sync.size_errors, 0);
        assert!(!session.session_dir().exists());
    }
}
