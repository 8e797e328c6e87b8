//! Interface configuration values and parsing helpers.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// A set of interface settings to apply in one call.
///
/// Every field is optional; only the ones present are pushed to the kernel.
/// See [`Configurator::apply`](crate::Configurator::apply) for the order.
///
/// # Example
///
/// ```ignore
/// let config = IfConfig::new()
///     .address_str("10.0.0.1/24")?
///     .mtu(1400)
///     .up(true);
/// device.ifconfig(&config)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct IfConfig {
    /// IPv4 address.
    pub address: Option<Ipv4Addr>,
    /// IPv4 netmask.
    pub netmask: Option<Ipv4Addr>,
    /// IPv4 broadcast address.
    pub broadcast: Option<Ipv4Addr>,
    /// Link MTU.
    pub mtu: Option<i32>,
    /// Hardware (MAC) address.
    pub hw_address: Option<[u8; 6]>,
    /// Administrative state: `Some(true)` brings the link up, `Some(false)` down.
    pub up: Option<bool>,
}

impl IfConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the IPv4 address.
    pub fn address(mut self, addr: Ipv4Addr) -> Self {
        self.address = Some(addr);
        self
    }

    /// Set the address from `a.b.c.d` or `a.b.c.d/len`.
    ///
    /// A prefix length also sets the netmask unless one is already set.
    pub fn address_str(mut self, s: &str) -> Result<Self> {
        let (addr, mask) = parse_address(s)?;
        self.address = Some(addr);
        if self.netmask.is_none() {
            self.netmask = mask;
        }
        Ok(self)
    }

    /// Set the IPv4 netmask.
    pub fn netmask(mut self, mask: Ipv4Addr) -> Self {
        self.netmask = Some(mask);
        self
    }

    /// Set the IPv4 broadcast address.
    pub fn broadcast(mut self, addr: Ipv4Addr) -> Self {
        self.broadcast = Some(addr);
        self
    }

    /// Set the MTU.
    pub fn mtu(mut self, mtu: i32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Set the hardware address.
    pub fn hw_address(mut self, mac: [u8; 6]) -> Self {
        self.hw_address = Some(mac);
        self
    }

    /// Set the hardware address from `aa:bb:cc:dd:ee:ff`.
    pub fn hw_address_str(self, s: &str) -> Result<Self> {
        Ok(self.hw_address(parse_mac(s)?))
    }

    /// Bring the link up (`true`) or down (`false`).
    pub fn up(mut self, up: bool) -> Self {
        self.up = Some(up);
        self
    }

    /// Check whether nothing would be applied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Snapshot of an interface as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Interface name.
    pub name: String,
    /// Raw `IFF_*` flags.
    pub flags: i16,
    /// `IFF_UP` is set.
    pub up: bool,
    /// Current MTU.
    pub mtu: i32,
    /// IPv4 address.
    pub address: Option<Ipv4Addr>,
    /// IPv4 netmask.
    pub netmask: Option<Ipv4Addr>,
    /// IPv4 broadcast address.
    pub broadcast: Option<Ipv4Addr>,
    /// Hardware address.
    pub hw_address: [u8; 6],
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: <{}> mtu {}",
            self.name,
            if self.up { "UP" } else { "DOWN" },
            self.mtu
        )?;
        write!(f, "\n    link/ether {}", format_mac(&self.hw_address))?;
        if let Some(addr) = self.address {
            write!(f, "\n    inet {addr}")?;
            if let Some(mask) = self.netmask {
                write!(f, " netmask {mask}")?;
            }
            if let Some(brd) = self.broadcast {
                write!(f, " brd {brd}")?;
            }
        }
        Ok(())
    }
}

/// Parse `a.b.c.d` or `a.b.c.d/len`, returning the address and the netmask
/// implied by the prefix length, if any.
pub fn parse_address(s: &str) -> Result<(Ipv4Addr, Option<Ipv4Addr>)> {
    let (addr_str, prefix) = match s.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (s, None),
    };

    let addr: Ipv4Addr = addr_str
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid IPv4 address: {s}")))?;

    let mask = match prefix {
        Some(p) => {
            let len: u8 = p
                .parse()
                .map_err(|_| Error::invalid_argument(format!("invalid prefix length: {p}")))?;
            Some(prefix_to_netmask(len).ok_or_else(|| {
                Error::invalid_argument(format!("prefix length {len} exceeds 32"))
            })?)
        }
        None => None,
    };

    Ok((addr, mask))
}

/// Parse a plain IPv4 address.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    s.parse()
        .map_err(|_| Error::invalid_argument(format!("invalid IPv4 address: {s}")))
}

/// Convert a prefix length to a netmask.
pub fn prefix_to_netmask(len: u8) -> Option<Ipv4Addr> {
    match len {
        0 => Some(Ipv4Addr::UNSPECIFIED),
        1..=32 => Some(Ipv4Addr::from(u32::MAX << (32 - len))),
        _ => None,
    }
}

/// Parse a MAC address from string.
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(Error::invalid_argument(format!("invalid MAC address: {s}")));
    }

    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || part.len() > 2 {
            return Err(Error::invalid_argument(format!("invalid MAC address: {s}")));
        }
        mac[i] = u8::from_str_radix(part, 16)
            .map_err(|_| Error::invalid_argument(format!("invalid MAC address: {s}")))?;
    }

    Ok(mac)
}

/// Format a MAC address.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
