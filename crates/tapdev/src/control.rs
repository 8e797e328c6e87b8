//! Interface configuration.
//!
//! [`InterfaceControl`] is the capability the device uses to query and
//! change interface state: flags, MTU, IPv4 address slots and hardware
//! address. [`SocketControl`] implements it with ioctls on a throwaway
//! `AF_INET` socket. [`Configurator`] layers validation, error context and
//! logging on top and is what [`TapDevice`](crate::TapDevice) delegates to.

use std::io;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::{Error, Result};
use crate::ifconfig::{IfConfig, InterfaceInfo};
use crate::sys::{self, AddrSlot};

/// Largest MTU accepted by [`Configurator::set_mtu`].
pub const MAX_MTU: i32 = 65535;

/// Interface is administratively up.
pub const IFF_UP: i16 = libc::IFF_UP as i16;

/// Kernel-facing interface operations, addressed by interface name.
///
/// Every call goes to the kernel; implementations must not cache.
pub trait InterfaceControl: Send + Sync {
    /// Read the interface flags (`IFF_*`).
    fn flags(&self, name: &str) -> io::Result<i16>;
    /// Replace the interface flags.
    fn set_flags(&self, name: &str, flags: i16) -> io::Result<()>;
    /// Read the MTU.
    fn mtu(&self, name: &str) -> io::Result<i32>;
    /// Set the MTU.
    fn set_mtu(&self, name: &str, mtu: i32) -> io::Result<()>;
    /// Read the IPv4 address, `None` if unassigned.
    fn address(&self, name: &str) -> io::Result<Option<Ipv4Addr>>;
    /// Assign the IPv4 address.
    fn set_address(&self, name: &str, addr: Ipv4Addr) -> io::Result<()>;
    /// Read the IPv4 netmask, `None` if unassigned.
    fn netmask(&self, name: &str) -> io::Result<Option<Ipv4Addr>>;
    /// Assign the IPv4 netmask.
    fn set_netmask(&self, name: &str, mask: Ipv4Addr) -> io::Result<()>;
    /// Read the IPv4 broadcast address, `None` if unassigned.
    fn broadcast(&self, name: &str) -> io::Result<Option<Ipv4Addr>>;
    /// Assign the IPv4 broadcast address.
    fn set_broadcast(&self, name: &str, addr: Ipv4Addr) -> io::Result<()>;
    /// Read the hardware (MAC) address.
    fn hw_address(&self, name: &str) -> io::Result<[u8; 6]>;
    /// Set the hardware (MAC) address. Only meaningful for TAP devices.
    fn set_hw_address(&self, name: &str, mac: [u8; 6]) -> io::Result<()>;
}

/// [`InterfaceControl`] backed by `SIOC*` ioctls.
///
/// Each call opens and closes its own socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketControl;

impl InterfaceControl for SocketControl {
    fn flags(&self, name: &str) -> io::Result<i16> {
        sys::get_flags(name)
    }

    fn set_flags(&self, name: &str, flags: i16) -> io::Result<()> {
        sys::set_flags(name, flags)
    }

    fn mtu(&self, name: &str) -> io::Result<i32> {
        sys::get_mtu(name)
    }

    fn set_mtu(&self, name: &str, mtu: i32) -> io::Result<()> {
        sys::set_mtu(name, mtu)
    }

    fn address(&self, name: &str) -> io::Result<Option<Ipv4Addr>> {
        sys::get_ipv4(name, AddrSlot::Address)
    }

    fn set_address(&self, name: &str, addr: Ipv4Addr) -> io::Result<()> {
        sys::set_ipv4(name, AddrSlot::Address, addr)
    }

    fn netmask(&self, name: &str) -> io::Result<Option<Ipv4Addr>> {
        sys::get_ipv4(name, AddrSlot::Netmask)
    }

    fn set_netmask(&self, name: &str, mask: Ipv4Addr) -> io::Result<()> {
        sys::set_ipv4(name, AddrSlot::Netmask, mask)
    }

    fn broadcast(&self, name: &str) -> io::Result<Option<Ipv4Addr>> {
        sys::get_ipv4(name, AddrSlot::Broadcast)
    }

    fn set_broadcast(&self, name: &str, addr: Ipv4Addr) -> io::Result<()> {
        sys::set_ipv4(name, AddrSlot::Broadcast, addr)
    }

    fn hw_address(&self, name: &str) -> io::Result<[u8; 6]> {
        sys::get_hw_address(name)
    }

    fn set_hw_address(&self, name: &str, mac: [u8; 6]) -> io::Result<()> {
        sys::set_hw_address(name, mac)
    }
}

/// Validate an MTU before it reaches the kernel.
pub fn validate_mtu(mtu: i32) -> Result<()> {
    if !(1..=MAX_MTU).contains(&mtu) {
        return Err(Error::invalid_argument(format!(
            "mtu {mtu} out of range (1..={MAX_MTU})"
        )));
    }
    Ok(())
}

/// Configuration operations for one named interface.
///
/// ```ignore
/// use tapdev::{Configurator, SocketControl};
///
/// let cfg = Configurator::new(&SocketControl, "eth0");
/// println!("mtu {}", cfg.get_mtu()?);
/// ```
pub struct Configurator<'a> {
    control: &'a dyn InterfaceControl,
    name: &'a str,
}

impl<'a> Configurator<'a> {
    /// Create a configurator for `name`.
    pub fn new(control: &'a dyn InterfaceControl, name: &'a str) -> Self {
        Self { control, name }
    }

    /// The interface this configurator addresses.
    pub fn name(&self) -> &str {
        self.name
    }

    fn err(&self, op: &'static str) -> impl FnOnce(io::Error) -> Error + '_ {
        move |source| Error::configuration(op, self.name, source)
    }

    /// Bring the interface up.
    pub fn up(&self) -> Result<()> {
        self.set_up(true, "up")
    }

    /// Bring the interface down.
    pub fn down(&self) -> Result<()> {
        self.set_up(false, "down")
    }

    fn set_up(&self, up: bool, op: &'static str) -> Result<()> {
        let flags = self.control.flags(self.name).map_err(self.err(op))?;
        let flags = if up { flags | IFF_UP } else { flags & !IFF_UP };
        self.control
            .set_flags(self.name, flags)
            .map_err(self.err(op))?;
        debug!(interface = self.name, up, "set administrative state");
        Ok(())
    }

    /// Check whether `IFF_UP` is set.
    pub fn is_up(&self) -> Result<bool> {
        let flags = self.control.flags(self.name).map_err(self.err("flags"))?;
        Ok(flags & IFF_UP != 0)
    }

    /// Set the MTU. Values outside `1..=MAX_MTU` are rejected locally.
    pub fn set_mtu(&self, mtu: i32) -> Result<()> {
        validate_mtu(mtu)?;
        self.control
            .set_mtu(self.name, mtu)
            .map_err(self.err("set_mtu"))?;
        debug!(interface = self.name, mtu, "set MTU");
        Ok(())
    }

    /// Read the current MTU from the kernel.
    pub fn get_mtu(&self) -> Result<i32> {
        self.control.mtu(self.name).map_err(self.err("get_mtu"))
    }

    /// Assign the IPv4 address.
    pub fn set_address(&self, addr: Ipv4Addr) -> Result<()> {
        self.control
            .set_address(self.name, addr)
            .map_err(self.err("set_address"))?;
        debug!(interface = self.name, %addr, "set address");
        Ok(())
    }

    /// Read the IPv4 address.
    pub fn address(&self) -> Result<Option<Ipv4Addr>> {
        self.control
            .address(self.name)
            .map_err(self.err("address"))
    }

    /// Assign the IPv4 netmask.
    pub fn set_netmask(&self, mask: Ipv4Addr) -> Result<()> {
        self.control
            .set_netmask(self.name, mask)
            .map_err(self.err("set_netmask"))?;
        debug!(interface = self.name, %mask, "set netmask");
        Ok(())
    }

    /// Read the IPv4 netmask.
    pub fn netmask(&self) -> Result<Option<Ipv4Addr>> {
        self.control
            .netmask(self.name)
            .map_err(self.err("netmask"))
    }

    /// Assign the IPv4 broadcast address.
    pub fn set_broadcast(&self, addr: Ipv4Addr) -> Result<()> {
        self.control
            .set_broadcast(self.name, addr)
            .map_err(self.err("set_broadcast"))?;
        debug!(interface = self.name, %addr, "set broadcast");
        Ok(())
    }

    /// Read the IPv4 broadcast address.
    pub fn broadcast(&self) -> Result<Option<Ipv4Addr>> {
        self.control
            .broadcast(self.name)
            .map_err(self.err("broadcast"))
    }

    /// Set the hardware address.
    pub fn set_hw_address(&self, mac: [u8; 6]) -> Result<()> {
        self.control
            .set_hw_address(self.name, mac)
            .map_err(self.err("set_hw_address"))?;
        debug!(interface = self.name, mac = %crate::ifconfig::format_mac(&mac), "set hardware address");
        Ok(())
    }

    /// Read the hardware address.
    pub fn hw_address(&self) -> Result<[u8; 6]> {
        self.control
            .hw_address(self.name)
            .map_err(self.err("hw_address"))
    }

    /// Apply every field present in `config`.
    ///
    /// Order: address, netmask, broadcast, mtu, hw address, up/down. The
    /// first failure stops the sequence and is returned; steps that already
    /// succeeded stay applied.
    pub fn apply(&self, config: &IfConfig) -> Result<()> {
        // A bad MTU is rejected before any step runs.
        if let Some(mtu) = config.mtu {
            validate_mtu(mtu)?;
        }

        if let Some(addr) = config.address {
            self.set_address(addr)?;
        }
        if let Some(mask) = config.netmask {
            self.set_netmask(mask)?;
        }
        if let Some(addr) = config.broadcast {
            self.set_broadcast(addr)?;
        }
        if let Some(mtu) = config.mtu {
            self.set_mtu(mtu)?;
        }
        if let Some(mac) = config.hw_address {
            self.set_hw_address(mac)?;
        }
        match config.up {
            Some(true) => self.up()?,
            Some(false) => self.down()?,
            None => {}
        }
        Ok(())
    }

    /// Read a fresh snapshot of the interface.
    pub fn info(&self) -> Result<InterfaceInfo> {
        let flags = self.control.flags(self.name).map_err(self.err("flags"))?;
        Ok(InterfaceInfo {
            name: self.name.to_string(),
            flags,
            up: flags & IFF_UP != 0,
            mtu: self.get_mtu()?,
            address: self.address()?,
            netmask: self.netmask()?,
            broadcast: self.broadcast()?,
            hw_address: self.hw_address()?,
        })
    }
}
