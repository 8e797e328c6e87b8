//! Interface configuration against real devices.

use std::net::Ipv4Addr;

use tapdev::{Error, IfConfig, Mode, Result, TapDevice};

use crate::common::unique_name;

#[test]
fn test_mtu_roundtrip() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder().name(unique_name("tdm")).open()?;

    dev.set_mtu(1300)?;
    assert_eq!(dev.get_mtu()?, 1300);
    assert_eq!(dev.read_size(), 1300);

    Ok(())
}

#[test]
fn test_invalid_mtu_rejected() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder().name(unique_name("tdm")).open()?;
    let before = dev.get_mtu()?;

    for mtu in [0, -1, 65536] {
        let err = dev.set_mtu(mtu).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "mtu {mtu}: {err:?}");
    }
    assert_eq!(dev.get_mtu()?, before);

    Ok(())
}

#[test]
fn test_up_down() -> Result<()> {
    require_root!();

    let dev = TapDevice::builder().name(unique_name("tdu")).open()?;
    assert!(!dev.is_up()?);

    dev.up()?;
    assert!(dev.is_up()?);
    // Idempotent.
    dev.up()?;
    assert!(dev.is_up()?);

    dev.down()?;
    assert!(!dev.is_up()?);

    Ok(())
}

#[test]
fn test_address_and_netmask() -> Result<()> {
    require_root!();

    let dev = TapDevice::builder()
        .name(unique_name("tda"))
        .mode(Mode::Tap)
        .open()?;
    assert_eq!(dev.address()?, None);

    dev.set_address(Ipv4Addr::new(10, 213, 0, 1))?;
    dev.set_netmask(Ipv4Addr::new(255, 255, 255, 0))?;
    dev.set_broadcast(Ipv4Addr::new(10, 213, 0, 255))?;

    assert_eq!(dev.address()?, Some(Ipv4Addr::new(10, 213, 0, 1)));
    assert_eq!(dev.netmask()?, Some(Ipv4Addr::new(255, 255, 255, 0)));
    assert_eq!(dev.broadcast()?, Some(Ipv4Addr::new(10, 213, 0, 255)));

    Ok(())
}

#[test]
fn test_hw_address_on_tap() -> Result<()> {
    require_root!();

    let dev = TapDevice::builder()
        .name(unique_name("tdh"))
        .mode(Mode::Tap)
        .open()?;

    let mac = [0x02, 0x00, 0x5e, 0x10, 0x20, 0x30];
    dev.set_hw_address(mac)?;
    assert_eq!(dev.hw_address()?, mac);

    Ok(())
}

#[test]
fn test_ifconfig_applies_everything() -> Result<()> {
    require_root!();

    let mut dev = TapDevice::builder()
        .name(unique_name("tdi"))
        .mode(Mode::Tap)
        .open()?;

    dev.ifconfig(
        &IfConfig::new()
            .address_str("10.214.0.1/24")?
            .mtu(1400)
            .hw_address_str("02:00:5e:00:00:01")?
            .up(true),
    )?;

    let info = dev.interface_info()?;
    assert_eq!(info.name, dev.name());
    assert!(info.up);
    assert_eq!(info.mtu, 1400);
    assert_eq!(info.address, Some(Ipv4Addr::new(10, 214, 0, 1)));
    assert_eq!(info.netmask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    assert_eq!(info.hw_address, [0x02, 0x00, 0x5e, 0x00, 0x00, 0x01]);
    assert_eq!(dev.read_size(), 1400);

    Ok(())
}
