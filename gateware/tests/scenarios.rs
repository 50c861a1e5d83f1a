extern crate gateware;

use gateware::{
    decode, BusInputs, BusMonitor, BusOutputs, Controller, ControllerConfig, FixedClock, Frame, Packet,
    PixelSourceKind, SensorLinkInputs, SyntheticSensor, Tick,
};
use gateware::sequencer::SequencerState;

const PRIMARY_HZ: u64 = 50_000_000;

fn controller(config: ControllerConfig) -> Controller<FixedClock> {
    let mut ctrl = Controller::new(config, FixedClock { hz: PRIMARY_HZ }).unwrap();
    // release the primary domain so the bus domain can follow
    ctrl.tick_primary(SensorLinkInputs::default());
    ctrl.tick_primary(SensorLinkInputs::default());
    ctrl
}

// Bus-only run against a full/not-full schedule.
fn run_bus<F: FnMut(u64) -> bool>(ctrl: &mut Controller<FixedClock>, ticks: u64, mut full: F) -> Vec<(BusInputs, BusOutputs)> {
    (0..ticks)
        .map(|t| {
            let inputs = BusInputs { full: full(t), empty: false };
            (inputs, ctrl.tick_bus(inputs))
        })
        .collect()
}

fn packets(monitor: &mut BusMonitor, stream: Vec<(BusInputs, BusOutputs)>) -> Vec<Packet> {
    decode(monitor, stream.into_iter()).collect::<Result<_, _>>().unwrap()
}

#[test]
fn round_trip_window() {
    let mut ctrl = controller(ControllerConfig::new());
    let mut monitor = BusMonitor::new(1024, 0x02);

    let stream = run_bus(&mut ctrl, 4086 + 10 + 256 * 4086, |t| !(4086..4096).contains(&t));

    let strobes: Vec<u64> = stream
        .iter()
        .enumerate()
        .filter(|(_, (_, out))| out.write_strobe())
        .map(|(t, _)| t as u64)
        .collect();
    assert!(strobes.iter().all(|t| (4086..4096).contains(t)));

    assert!(packets(&mut monitor, stream).is_empty());
    assert_eq!(monitor.pending(), &[0x02, 0x80, 0x00, 0x7F, 0x01]);
    assert_eq!(monitor.writes_while_full(), 0);
}

#[test]
fn small_packet_window() {
    let mut config = ControllerConfig::new();
    config.bus.max_packet_bytes = 10;
    let mut ctrl = controller(config);
    let mut monitor = BusMonitor::new(1024, 0x02);

    // reset edge, INIT and one HOLD tick, then the window
    let stream = run_bus(&mut ctrl, 200, |t| !(3..25).contains(&t));
    let pktends = stream.iter().filter(|(_, out)| out.packet_end()).count();
    let packets = packets(&mut monitor, stream);

    assert_eq!(pktends, 1);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].wire_len(), 10);
    assert!(monitor.pending().is_empty());
}

#[test]
fn eof_once_per_frame_and_fid_toggles() {
    let mut config = ControllerConfig::new();
    config.bus.pattern_frame_pixels = 1500;
    let mut ctrl = controller(config);
    let mut monitor = BusMonitor::new(1024, 0x02);

    let packets = packets(&mut monitor, run_bus(&mut ctrl, 60_000, |_| false));
    assert!(packets.iter().all(|p| p.wire_len() <= 1024 && p.header.tag == 0x02));

    let mut frames = Vec::new();
    let mut current = Vec::new();
    for packet in packets {
        let eof = packet.header.eof;
        current.push(packet);
        if eof {
            frames.push(std::mem::take(&mut current));
        }
    }
    assert!(frames.len() >= 4);

    for (n, packets) in frames.iter().enumerate() {
        let frame = Frame::from_packets(n as u32, packets).unwrap();
        assert_eq!(frame.fid, n % 2 == 1);
        assert_eq!(frame.num_pixels(), 1500);
        // 510 pixels per full packet, so EOF rides on the third
        assert_eq!(frame.packets, 3);
        let expected: Vec<u16> = (0..1500u32).map(|i| 0x7F00 | (i & 0xFF) as u16).collect();
        assert_eq!(frame.pixels(), expected);
    }
}

#[test]
fn no_strobe_while_full_under_random_stalls() {
    let mut config = ControllerConfig::new();
    config.bus.pattern_frame_pixels = 2048;
    config.bus.max_packet_bytes = 512;
    let mut ctrl = controller(config);
    let mut monitor = BusMonitor::new(512, 0x02);

    let mut lcg: u32 = 0xC0FF_EE11;
    let stream = run_bus(&mut ctrl, 300_000, |_| {
        lcg = lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (lcg >> 28) < 6
    });

    let strobes_while_full = stream.iter().filter(|(i, o)| i.full && o.write_strobe()).count();
    assert_eq!(strobes_while_full, 0);

    let packets = packets(&mut monitor, stream);
    assert!(packets.len() > 50);
    assert_eq!(monitor.writes_while_full(), 0);

    // frame-id alternates 0/1/0/1 across EOF packets
    let fids: Vec<bool> = packets.iter().filter(|p| p.header.eof).map(|p| p.header.fid).collect();
    assert!(fids.len() > 2);
    assert!(fids.windows(2).all(|w| w[0] != w[1]));
}

#[test]
fn sensor_frame_end_to_end() {
    let mut config = ControllerConfig::new();
    config.bus.source = PixelSourceKind::Sensor;
    let pixels = config.frame_pixels();
    let mut ctrl = Controller::new(config, FixedClock { hz: PRIMARY_HZ }).unwrap();
    let mut sensor = SyntheticSensor::new(pixels);
    let mut monitor = BusMonitor::new(1024, 0x02);

    let mut link = SensorLinkInputs::default();
    let mut packets = Vec::new();
    for _ in 0..400_000 {
        let edges = ctrl.step(link, BusInputs::default());
        if let Some(out) = edges.primary {
            link = sensor.tick(out.latch);
        }
        if let Some(out) = edges.bus {
            if let Some(packet) = monitor.tick((BusInputs::default(), out)) {
                let packet = packet.unwrap();
                let eof = packet.header.eof;
                packets.push(packet);
                if eof {
                    break;
                }
            }
        }
    }

    let frame = Frame::from_packets(0, &packets).unwrap();
    assert_eq!(frame.num_pixels(), pixels as usize);
    assert_eq!(frame.pixels(), (0..pixels as u16).collect::<Vec<_>>());
    assert_eq!(ctrl.deserializer().overruns(), 0);
    // the last line has been read, the next INIT is still ahead
    assert_eq!(ctrl.sequencer().state(), SequencerState::InterFrame);
}
