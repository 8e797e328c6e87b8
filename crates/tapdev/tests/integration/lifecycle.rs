//! Device creation, naming and teardown.

use tapdev::{Error, Mode, Result, State, TapDevice, list_devices};

use crate::common::{interface_exists, unique_name};

#[test]
fn test_named_tap_appears_in_kernel() -> Result<()> {
    require_root!();

    let name = unique_name("tdt");
    let dev = TapDevice::builder().name(&name).mode(Mode::Tap).open()?;

    assert_eq!(dev.name(), name);
    assert_eq!(dev.state(), State::Open);
    assert!(interface_exists(&name));

    let info = list_devices()?
        .into_iter()
        .find(|d| d.name == name)
        .expect("device should be listed");
    assert_eq!(info.mode, Mode::Tap);
    assert!(!info.packet_info());

    Ok(())
}

#[test]
fn test_kernel_assigned_name() -> Result<()> {
    require_root!();

    let dev = TapDevice::open_with(None, Mode::Tun, false)?;
    assert!(dev.name().starts_with("tun"), "got {}", dev.name());
    assert!(interface_exists(dev.name()));

    Ok(())
}

#[test]
fn test_name_template() -> Result<()> {
    require_root!();

    let dev = TapDevice::builder().name("tdtpl%d").open()?;
    assert!(dev.name().starts_with("tdtpl"));
    assert!(!dev.name().contains('%'));

    Ok(())
}

#[test]
fn test_packet_info_flag_reported() -> Result<()> {
    require_root!();

    let name = unique_name("tdp");
    let dev = TapDevice::open_with(Some(&name), Mode::Tun, true)?;
    assert!(dev.packet_info());

    let info = list_devices()?
        .into_iter()
        .find(|d| d.name == name)
        .expect("device should be listed");
    assert_eq!(info.mode, Mode::Tun);
    assert!(info.packet_info());

    Ok(())
}

#[test]
fn test_close_removes_interface() -> Result<()> {
    require_root!();

    let name = unique_name("tdc");
    let mut dev = TapDevice::builder().name(&name).open()?;
    assert!(interface_exists(&name));

    dev.close();
    assert!(!dev.is_open());
    assert!(!interface_exists(&name));

    // Closing twice is harmless.
    dev.close();
    assert!(matches!(
        dev.read(None),
        Err(Error::InvalidState { state: State::Closed, .. })
    ));

    Ok(())
}

#[test]
fn test_reopen_after_close() -> Result<()> {
    require_root!();

    let name = unique_name("tdr");
    let mut dev = TapDevice::builder().name(&name).build();
    assert_eq!(dev.state(), State::Closed);

    dev.open()?;
    dev.close();
    dev.open()?;
    assert!(interface_exists(&name));

    Ok(())
}

#[test]
fn test_drop_removes_interface() -> Result<()> {
    require_root!();

    let name = unique_name("tdd");
    {
        let _dev = TapDevice::builder().name(&name).open()?;
        assert!(interface_exists(&name));
    }
    assert!(!interface_exists(&name));

    Ok(())
}

#[test]
fn test_busy_name_fails() -> Result<()> {
    require_root!();

    let name = unique_name("tdb");
    let _first = TapDevice::builder().name(&name).open()?;

    let err = TapDevice::builder().name(&name).open().unwrap_err();
    assert!(matches!(err, Error::DeviceCreation { .. }), "got {err:?}");

    Ok(())
}

#[test]
fn test_scoped_closes_on_success_and_error() -> Result<()> {
    require_root!();

    let name = unique_name("tds");
    let seen = TapDevice::builder().name(&name).scoped(|dev| {
        assert!(interface_exists(dev.name()));
        Ok::<_, Error>(dev.name().to_string())
    })?;
    assert_eq!(seen, name);
    assert!(!interface_exists(&name));

    let result: Result<()> = TapDevice::builder().name(&name).scoped(|dev| {
        dev.set_mtu(0)?;
        Ok(())
    });
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(!interface_exists(&name));

    Ok(())
}
