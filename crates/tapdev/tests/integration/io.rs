//! Packets crossing the kernel boundary.

use std::net::UdpSocket;
use std::time::Duration;

use tapdev::packet::proto;
use tapdev::{Error, IfConfig, Mode, Packet, Result, State, TapDevice};

use crate::common::{unique_name, wait_readable};

/// Read packets until one carries `marker`, skipping router solicitations
/// and other background traffic.
fn read_until(dev: &TapDevice, marker: &[u8]) -> Option<Packet> {
    for _ in 0..32 {
        if !wait_readable(dev, Duration::from_secs(2)) {
            return None;
        }
        let packet = dev.read_packet(None).ok()?;
        if packet.payload.windows(marker.len()).any(|w| w == marker) {
            return Some(packet);
        }
    }
    None
}

fn send_udp(to: &str, payload: &[u8]) {
    let sock = UdpSocket::bind("0.0.0.0:0").expect("bind");
    sock.send_to(payload, to).expect("send_to");
}

#[test]
fn test_tap_write_frame() -> Result<()> {
    require_root!();

    let dev = TapDevice::builder()
        .name(unique_name("tdw"))
        .mode(Mode::Tap)
        .open()?;
    dev.up()?;

    // Broadcast Ethernet frame carrying a zero-filled IPv4 ethertype payload.
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.resize(60, 0);

    assert_eq!(dev.write(&frame)?, frame.len());

    Ok(())
}

#[test]
fn test_tap_end_to_end() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder()
        .name(unique_name("tde"))
        .mode(Mode::Tap)
        .packet_info(false)
        .open()?;
    dev.up()?;
    dev.ifconfig(&IfConfig::new().mtu(1300))?;
    assert_eq!(dev.get_mtu()?, 1300);

    // The kernel refuses TAP frames shorter than an Ethernet header.
    match dev.write(b"0000") {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidInput),
        other => panic!("unexpected result: {other:?}"),
    }

    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    frame.extend_from_slice(b"0000");
    frame.resize(60, 0);
    assert_eq!(dev.write(&frame)?, frame.len());

    dev.close();
    assert!(matches!(
        dev.write(&frame),
        Err(Error::InvalidState {
            op: "write",
            state: State::Closed
        })
    ));

    Ok(())
}

#[test]
fn test_tun_read_ipv4() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder()
        .name(unique_name("tdn"))
        .mode(Mode::Tun)
        .open()?;
    dev.ifconfig(&IfConfig::new().address_str("10.215.0.1/24")?.up(true))?;

    send_udp("10.215.0.2:9", b"tapdev-marker-1");

    let packet = read_until(&dev, b"tapdev-marker-1").expect("udp packet on tun");
    assert!(packet.info.is_none());
    assert_eq!(packet.payload[0] >> 4, 4);

    Ok(())
}

#[test]
fn test_tun_read_with_packet_info() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder()
        .name(unique_name("tdq"))
        .mode(Mode::Tun)
        .packet_info(true)
        .open()?;
    dev.ifconfig(&IfConfig::new().address_str("10.216.0.1/24")?.up(true))?;

    send_udp("10.216.0.2:9", b"tapdev-marker-2");

    let packet = read_until(&dev, b"tapdev-marker-2").expect("udp packet on tun");
    let info = packet.info.expect("header present");
    assert_eq!(info.proto(), proto::IPV4);
    assert!(!info.is_truncated());
    // Header is stripped from the payload.
    assert_eq!(packet.payload[0] >> 4, 4);

    Ok(())
}

#[test]
fn test_tun_read_size_truncates() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder()
        .name(unique_name("tdz"))
        .mode(Mode::Tun)
        .open()?;
    dev.ifconfig(&IfConfig::new().address_str("10.217.0.1/24")?.up(true))?;

    send_udp("10.217.0.2:9", &[0xab; 200]);

    assert!(wait_readable(&dev, Duration::from_secs(2)));
    let payload = dev.read(Some(20))?;
    assert!(payload.len() <= 20);

    Ok(())
}
