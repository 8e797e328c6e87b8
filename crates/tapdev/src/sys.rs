//! Raw ioctl plumbing.
//!
//! Everything that knows about request numbers and the `ifreq` layout lives
//! here. The rest of the crate talks to the kernel through the named
//! operations in [`crate::control`] and [`create_device`].

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

// TUN/TAP ioctl (from linux/if_tun.h)
const TUNSETIFF: libc::c_ulong = 0x400454ca;

// Socket ioctls (from linux/sockios.h)
const SIOCGIFFLAGS: libc::c_ulong = 0x8913;
const SIOCSIFFLAGS: libc::c_ulong = 0x8914;
const SIOCGIFADDR: libc::c_ulong = 0x8915;
const SIOCSIFADDR: libc::c_ulong = 0x8916;
const SIOCGIFBRDADDR: libc::c_ulong = 0x8919;
const SIOCSIFBRDADDR: libc::c_ulong = 0x891a;
const SIOCGIFNETMASK: libc::c_ulong = 0x891b;
const SIOCSIFNETMASK: libc::c_ulong = 0x891c;
const SIOCGIFMTU: libc::c_ulong = 0x8921;
const SIOCSIFMTU: libc::c_ulong = 0x8922;
const SIOCSIFHWADDR: libc::c_ulong = 0x8924;
const SIOCGIFHWADDR: libc::c_ulong = 0x8927;

/// TUN device (Layer 3).
pub(crate) const IFF_TUN: libc::c_short = 0x0001;
/// TAP device (Layer 2).
pub(crate) const IFF_TAP: libc::c_short = 0x0002;
/// No protocol information.
pub(crate) const IFF_NO_PI: libc::c_short = 0x1000;

const ARPHRD_ETHER: libc::sa_family_t = 1;

/// Which IPv4 slot of an interface a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddrSlot {
    Address,
    Netmask,
    Broadcast,
}

impl AddrSlot {
    fn get_request(self) -> libc::c_ulong {
        match self {
            AddrSlot::Address => SIOCGIFADDR,
            AddrSlot::Netmask => SIOCGIFNETMASK,
            AddrSlot::Broadcast => SIOCGIFBRDADDR,
        }
    }

    fn set_request(self) -> libc::c_ulong {
        match self {
            AddrSlot::Address => SIOCSIFADDR,
            AddrSlot::Netmask => SIOCSIFNETMASK,
            AddrSlot::Broadcast => SIOCSIFBRDADDR,
        }
    }
}

/// Build a zeroed `ifreq` addressed to `name`.
pub(crate) fn ifreq(name: &str) -> io::Result<libc::ifreq> {
    let bytes = name.as_bytes();
    if bytes.len() > libc::IFNAMSIZ - 1 || bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid interface name: {name:?}"),
        ));
    }

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok(ifr)
}

/// Read the NUL-terminated name back out of an `ifreq`.
pub(crate) fn ifreq_name(ifr: &libc::ifreq) -> String {
    let bytes: Vec<u8> = ifr
        .ifr_name
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn ioctl(fd: BorrowedFd<'_>, request: libc::c_ulong, ifr: &mut libc::ifreq) -> io::Result<()> {
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, ifr as *mut libc::ifreq) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Issue `TUNSETIFF` on an open clone device and return the name the
/// kernel settled on.
pub(crate) fn create_device(
    fd: BorrowedFd<'_>,
    name: Option<&str>,
    flags: libc::c_short,
) -> io::Result<String> {
    let mut ifr = ifreq(name.unwrap_or(""))?;
    ifr.ifr_ifru.ifru_flags = flags;
    ioctl(fd, TUNSETIFF, &mut ifr)?;
    Ok(ifreq_name(&ifr))
}

/// Open a throwaway socket for interface requests.
fn control_socket() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Run one interface request on a fresh control socket.
fn with_ifreq<T>(
    name: &str,
    request: libc::c_ulong,
    fill: impl FnOnce(&mut libc::ifreq),
    extract: impl FnOnce(&libc::ifreq) -> T,
) -> io::Result<T> {
    let sock = control_socket()?;
    let mut ifr = ifreq(name)?;
    fill(&mut ifr);
    ioctl(sock.as_fd(), request, &mut ifr)?;
    Ok(extract(&ifr))
}

pub(crate) fn get_flags(name: &str) -> io::Result<libc::c_short> {
    with_ifreq(name, SIOCGIFFLAGS, |_| {}, |ifr| unsafe {
        ifr.ifr_ifru.ifru_flags
    })
}

pub(crate) fn set_flags(name: &str, flags: libc::c_short) -> io::Result<()> {
    with_ifreq(
        name,
        SIOCSIFFLAGS,
        |ifr| ifr.ifr_ifru.ifru_flags = flags,
        |_| (),
    )
}

pub(crate) fn get_mtu(name: &str) -> io::Result<i32> {
    with_ifreq(name, SIOCGIFMTU, |_| {}, |ifr| unsafe { ifr.ifr_ifru.ifru_mtu })
}

pub(crate) fn set_mtu(name: &str, mtu: i32) -> io::Result<()> {
    with_ifreq(name, SIOCSIFMTU, |ifr| ifr.ifr_ifru.ifru_mtu = mtu, |_| ())
}

/// Read an IPv4 slot. An interface with nothing assigned yields `None`.
pub(crate) fn get_ipv4(name: &str, slot: AddrSlot) -> io::Result<Option<Ipv4Addr>> {
    match with_ifreq(name, slot.get_request(), |_| {}, |ifr| unsafe {
        read_sockaddr_in(&ifr.ifr_ifru.ifru_addr)
    }) {
        Ok(addr) => Ok(addr),
        Err(e) if e.raw_os_error() == Some(libc::EADDRNOTAVAIL) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn set_ipv4(name: &str, slot: AddrSlot, addr: Ipv4Addr) -> io::Result<()> {
    with_ifreq(
        name,
        slot.set_request(),
        |ifr| write_sockaddr_in(unsafe { &mut ifr.ifr_ifru.ifru_addr }, addr),
        |_| (),
    )
}

pub(crate) fn get_hw_address(name: &str) -> io::Result<[u8; 6]> {
    with_ifreq(name, SIOCGIFHWADDR, |_| {}, |ifr| {
        let data = unsafe { ifr.ifr_ifru.ifru_hwaddr.sa_data };
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(data.iter()) {
            *dst = *src as u8;
        }
        mac
    })
}

pub(crate) fn set_hw_address(name: &str, mac: [u8; 6]) -> io::Result<()> {
    with_ifreq(
        name,
        SIOCSIFHWADDR,
        |ifr| {
            let mut hwaddr: libc::sockaddr = unsafe { std::mem::zeroed() };
            hwaddr.sa_family = ARPHRD_ETHER;
            for (dst, src) in hwaddr.sa_data.iter_mut().zip(mac) {
                *dst = src as libc::c_char;
            }
            ifr.ifr_ifru.ifru_hwaddr = hwaddr;
        },
        |_| (),
    )
}

fn write_sockaddr_in(dst: &mut libc::sockaddr, addr: Ipv4Addr) {
    let sin = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: 0,
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.octets()),
        },
        sin_zero: [0; 8],
    };
    // sockaddr and sockaddr_in are both 16 bytes
    unsafe {
        std::ptr::write_unaligned(dst as *mut libc::sockaddr as *mut libc::sockaddr_in, sin);
    }
}

fn read_sockaddr_in(src: &libc::sockaddr) -> Option<Ipv4Addr> {
    if src.sa_family != libc::AF_INET as libc::sa_family_t {
        return None;
    }
    let sin = unsafe {
        std::ptr::read_unaligned(src as *const libc::sockaddr as *const libc::sockaddr_in)
    };
    Some(Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()))
}

/// Toggle `O_NONBLOCK` on a descriptor.
pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>, nonblocking: bool) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
