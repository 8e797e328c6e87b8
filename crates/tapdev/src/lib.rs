//! Linux TUN/TAP device handle.
//!
//! This crate opens a kernel-managed virtual network interface, configures
//! it, and exchanges packets through it.
//!
//! # Overview
//!
//! TUN devices operate at Layer 3 (IP) and TAP devices operate at Layer 2
//! (Ethernet). A [`TapDevice`] owns exactly one descriptor on the clone
//! device `/dev/net/tun` and is either open or closed:
//!
//! - Opening issues `TUNSETIFF` with the requested name, the mode and,
//!   unless packet information is wanted, `IFF_NO_PI`.
//! - Configuration (`up`, `down`, `set_mtu`, addresses, `ifconfig`) goes
//!   through an [`InterfaceControl`] capability, by default ioctls on a
//!   throwaway socket ([`SocketControl`]).
//! - Reads and writes frame the 4-byte [`PacketInfo`] header when packet
//!   information is enabled.
//! - [`TapDevice::file_descriptor`] lends the descriptor for poll/epoll.
//!
//! Dropping a device closes it.
//!
//! # Example
//!
//! ```ignore
//! use tapdev::{IfConfig, Mode, TapDevice};
//!
//! let mut tap = TapDevice::builder()
//!     .name("tap%d")
//!     .mode(Mode::Tap)
//!     .open()?;
//!
//! println!("Created device: {}", tap.name());
//!
//! tap.ifconfig(
//!     &IfConfig::new()
//!         .address_str("10.0.0.1/24")?
//!         .mtu(1400)
//!         .up(true),
//! )?;
//!
//! let frame = tap.read(None)?;
//! tap.write(&frame)?;
//! ```
//!
//! # Async Support
//!
//! Enable the `async` feature for async read/write operations:
//!
//! ```ignore
//! use tapdev::{AsyncTapDevice, TapDevice};
//!
//! let tun = AsyncTapDevice::new(TapDevice::builder().name("tun%d").open()?)?;
//!
//! let packet = tun.read(None).await?;
//! tun.write(&packet).await?;
//! ```

mod control;
mod device;
mod error;
mod ifconfig;
pub mod packet;
mod sys;

#[cfg(feature = "async")]
mod async_device;

pub use control::{Configurator, IFF_UP, InterfaceControl, MAX_MTU, SocketControl, validate_mtu};
pub use device::{
    DEFAULT_MTU, DeviceConfig, DeviceInfo, Mode, TapDevice, TapDeviceBuilder, list_devices,
    validate_name,
};
pub use error::{Error, Result, State};
pub use ifconfig::{
    IfConfig, InterfaceInfo, format_mac, parse_address, parse_ipv4, parse_mac, prefix_to_netmask,
};
pub use packet::{Packet, PacketInfo};

#[cfg(feature = "async")]
pub use async_device::AsyncTapDevice;

/// The path to the TUN device.
pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";
