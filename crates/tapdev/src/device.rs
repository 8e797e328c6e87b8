//! TUN/TAP device implementation.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::TUN_DEVICE_PATH;
use crate::control::{Configurator, InterfaceControl, MAX_MTU, SocketControl, validate_mtu};
use crate::error::{Error, Result, State};
use crate::ifconfig::{IfConfig, InterfaceInfo};
use crate::packet::{self, ETH_HLEN, Packet, PacketInfo};
use crate::sys;

/// Default MTU, used as the read size until [`TapDevice::set_mtu`] changes it.
pub const DEFAULT_MTU: usize = 1500;

/// Which kind of frames the interface carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mode {
    /// Bare IPv4/IPv6 packets, no link-layer header.
    #[default]
    Tun,
    /// Whole Ethernet frames.
    Tap,
}

impl Mode {
    /// `IFF_TUN` or `IFF_TAP` for the `TUNSETIFF` request.
    fn flag(&self) -> libc::c_short {
        match self {
            Mode::Tun => sys::IFF_TUN,
            Mode::Tap => sys::IFF_TAP,
        }
    }

    /// Lowercase label, as used in config files and `tapctl` output.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Tun => "tun",
            Mode::Tap => "tap",
        }
    }

    /// Bytes of link-layer framing in front of each packet.
    fn link_header_len(&self) -> usize {
        match self {
            Mode::Tun => 0,
            Mode::Tap => ETH_HLEN,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validate a requested interface name against the kernel's rules.
///
/// Names may be empty (the kernel picks one) or contain a `%d` template.
/// `.` and `..` are refused, as are `/`, `:`, NUL and whitespace.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > libc::IFNAMSIZ - 1 {
        return Err(Error::invalid_argument(format!(
            "device name too long: {name} ({} > {} bytes)",
            name.len(),
            libc::IFNAMSIZ - 1
        )));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_argument(format!(
            "device name is reserved: {name:?}"
        )));
    }

    if name
        .chars()
        .any(|c| matches!(c, '/' | ':' | '\0') || c.is_whitespace())
    {
        return Err(Error::invalid_argument(format!(
            "device name contains invalid characters: {name:?}"
        )));
    }

    Ok(())
}

/// Check the configured default read size.
fn validate_read_size(mtu: usize) -> Result<()> {
    let mtu = i32::try_from(mtu).map_err(|_| {
        Error::invalid_argument(format!("mtu {mtu} out of range (1..={MAX_MTU})"))
    })?;
    validate_mtu(mtu)
}

/// Settings used to open a device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Requested interface name; `None` lets the kernel assign one.
    pub name: Option<String>,
    /// TUN or TAP.
    pub mode: Mode,
    /// Keep the 4-byte packet information header (no `IFF_NO_PI`).
    pub packet_info: bool,
    /// Payload size of a default read.
    pub mtu: usize,
    /// Clone device node.
    pub path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: None,
            mode: Mode::Tun,
            packet_info: false,
            mtu: DEFAULT_MTU,
            path: PathBuf::from(TUN_DEVICE_PATH),
        }
    }
}

impl DeviceConfig {
    fn flags(&self) -> libc::c_short {
        let mut flags = self.mode.flag();
        if !self.packet_info {
            flags |= sys::IFF_NO_PI;
        }
        flags
    }

    fn requested_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Builder for creating TUN/TAP devices.
pub struct TapDeviceBuilder {
    config: DeviceConfig,
    control: Box<dyn InterfaceControl>,
}

impl TapDeviceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: DeviceConfig::default(),
            control: Box::new(SocketControl),
        }
    }

    /// Set the device name.
    ///
    /// If not specified, the kernel will assign a name (tun0, tap0, etc.).
    /// A name containing `%d` is a template the kernel fills in.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set the device mode (TUN or TAP).
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Keep the packet information header on every frame.
    pub fn packet_info(mut self, enabled: bool) -> Self {
        self.config.packet_info = enabled;
        self
    }

    /// Set the payload size of a default read.
    ///
    /// Checked against `1..=MAX_MTU` when the device is opened.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Set the clone device node (default `/dev/net/tun`).
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Replace the interface control used for configuration calls.
    pub fn control(mut self, control: impl InterfaceControl + 'static) -> Self {
        self.control = Box::new(control);
        self
    }

    /// Build a closed device.
    pub fn build(self) -> TapDevice {
        TapDevice::new(self.config).with_boxed_control(self.control)
    }

    /// Create the TUN/TAP device.
    pub fn open(self) -> Result<TapDevice> {
        let mut device = self.build();
        device.open()?;
        Ok(device)
    }

    /// Open the device, run `f` with it, then close it.
    ///
    /// The device is closed on every path out of `f`, including errors.
    pub fn scoped<T, E, F>(self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut TapDevice) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut device = self.open()?;
        let result = f(&mut device);
        device.close();
        result
    }
}

impl Default for TapDeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A TUN/TAP device.
///
/// The handle is either open (it owns a descriptor) or closed. Every
/// configuration and I/O method fails with [`Error::InvalidState`] on a
/// closed handle. [`close`](Self::close) on a closed handle does nothing,
/// and dropping an open handle closes it.
///
/// # Example
///
/// ```ignore
/// use tapdev::{IfConfig, Mode, TapDevice};
///
/// let mut tap = TapDevice::builder().name("tap%d").mode(Mode::Tap).open()?;
/// tap.up()?;
/// tap.ifconfig(&IfConfig::new().mtu(1300))?;
/// assert_eq!(tap.write(b"0000")?, 4);
/// tap.close();
/// ```
pub struct TapDevice {
    file: Option<File>,
    config: DeviceConfig,
    name: String,
    mtu: usize,
    control: Box<dyn InterfaceControl>,
}

impl TapDevice {
    /// Create a new builder.
    pub fn builder() -> TapDeviceBuilder {
        TapDeviceBuilder::new()
    }

    /// Create a closed device from `config`.
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            file: None,
            name: config.name.clone().unwrap_or_default(),
            mtu: config.mtu,
            config,
            control: Box::new(SocketControl),
        }
    }

    /// Open a device in one call.
    pub fn open_with(name: Option<&str>, mode: Mode, packet_info: bool) -> Result<Self> {
        let mut builder = Self::builder().mode(mode).packet_info(packet_info);
        if let Some(name) = name {
            builder = builder.name(name);
        }
        builder.open()
    }

    /// Adopt a descriptor that already refers to a TUN/TAP queue.
    ///
    /// `config.name` must be the interface the descriptor is attached to;
    /// configuration calls address that name.
    pub fn from_fd(fd: OwnedFd, config: DeviceConfig) -> Self {
        let mut device = Self::new(config);
        device.file = Some(File::from(fd));
        device
    }

    /// Replace the interface control used for configuration calls.
    pub fn with_control(self, control: impl InterfaceControl + 'static) -> Self {
        self.with_boxed_control(Box::new(control))
    }

    fn with_boxed_control(mut self, control: Box<dyn InterfaceControl>) -> Self {
        self.control = control;
        self
    }

    /// Open the clone device and create (or attach to) the interface.
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::InvalidState {
                op: "open",
                state: State::Open,
            });
        }

        let requested = self.config.requested_name();
        if let Some(name) = requested {
            validate_name(name)?;
        }
        validate_read_size(self.config.mtu)?;

        let path = &self.config.path;
        let creation_error = |source| Error::DeviceCreation {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(creation_error)?;

        let name = sys::create_device(file.as_fd(), requested, self.config.flags())
            .map_err(creation_error)?;

        debug!(
            interface = %name,
            mode = %self.config.mode,
            packet_info = self.config.packet_info,
            fd = file.as_raw_fd(),
            "opened device"
        );

        self.name = name;
        self.file = Some(file);
        Ok(())
    }

    /// Release the descriptor. Does nothing if the device is already closed.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            debug!(interface = %self.name, fd = file.as_raw_fd(), "closing device");
            drop(file);
        }
    }

    /// Check if the device is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        if self.is_open() {
            State::Open
        } else {
            State::Closed
        }
    }

    /// Get the device name.
    ///
    /// After a successful open this is the name the kernel confirmed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device mode.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Check if frames carry the packet information header.
    pub fn packet_info(&self) -> bool {
        self.config.packet_info
    }

    /// Get the clone device path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Payload size of a default read.
    pub fn read_size(&self) -> usize {
        self.mtu
    }

    fn file(&self, op: &'static str) -> Result<&File> {
        self.file.as_ref().ok_or(Error::InvalidState {
            op,
            state: State::Closed,
        })
    }

    fn io_file(&self) -> io::Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is closed"))
    }

    /// Borrow the descriptor, e.g. to register it with poll/epoll.
    ///
    /// Ownership stays with the device.
    pub fn file_descriptor(&self) -> Result<BorrowedFd<'_>> {
        Ok(self.file("borrow descriptor")?.as_fd())
    }

    /// Get the raw file descriptor.
    pub fn raw_fd(&self) -> Result<RawFd> {
        Ok(self.file("borrow descriptor")?.as_raw_fd())
    }

    /// Toggle `O_NONBLOCK` on the descriptor.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        sys::set_nonblocking(self.file("set_nonblocking")?.as_fd(), nonblocking)?;
        Ok(())
    }

    // Configuration

    fn configurator(&self, op: &'static str) -> Result<Configurator<'_>> {
        self.file(op)?;
        Ok(Configurator::new(self.control.as_ref(), &self.name))
    }

    /// Bring the interface up.
    pub fn up(&self) -> Result<()> {
        self.configurator("up")?.up()
    }

    /// Bring the interface down.
    pub fn down(&self) -> Result<()> {
        self.configurator("down")?.down()
    }

    /// Check whether the interface is administratively up.
    pub fn is_up(&self) -> Result<bool> {
        self.configurator("is_up")?.is_up()
    }

    /// Set the MTU. Subsequent default reads use it as their payload size.
    pub fn set_mtu(&mut self, mtu: i32) -> Result<()> {
        self.configurator("set_mtu")?.set_mtu(mtu)?;
        self.mtu = mtu as usize;
        Ok(())
    }

    /// Read the MTU from the kernel.
    pub fn get_mtu(&self) -> Result<i32> {
        self.configurator("get_mtu")?.get_mtu()
    }

    /// Assign the IPv4 address.
    pub fn set_address(&self, addr: Ipv4Addr) -> Result<()> {
        self.configurator("set_address")?.set_address(addr)
    }

    /// Read the IPv4 address.
    pub fn address(&self) -> Result<Option<Ipv4Addr>> {
        self.configurator("address")?.address()
    }

    /// Assign the IPv4 netmask.
    pub fn set_netmask(&self, mask: Ipv4Addr) -> Result<()> {
        self.configurator("set_netmask")?.set_netmask(mask)
    }

    /// Read the IPv4 netmask.
    pub fn netmask(&self) -> Result<Option<Ipv4Addr>> {
        self.configurator("netmask")?.netmask()
    }

    /// Assign the IPv4 broadcast address.
    pub fn set_broadcast(&self, addr: Ipv4Addr) -> Result<()> {
        self.configurator("set_broadcast")?.set_broadcast(addr)
    }

    /// Read the IPv4 broadcast address.
    pub fn broadcast(&self) -> Result<Option<Ipv4Addr>> {
        self.configurator("broadcast")?.broadcast()
    }

    /// Set the hardware address (TAP only).
    pub fn set_hw_address(&self, mac: [u8; 6]) -> Result<()> {
        self.configurator("set_hw_address")?.set_hw_address(mac)
    }

    /// Read the hardware address.
    pub fn hw_address(&self) -> Result<[u8; 6]> {
        self.configurator("hw_address")?.hw_address()
    }

    /// Apply several settings at once.
    ///
    /// See [`Configurator::apply`] for ordering and failure behaviour. If the
    /// MTU step ran, default reads pick up the new size even when a later
    /// step fails.
    pub fn ifconfig(&mut self, config: &IfConfig) -> Result<()> {
        let result = self.configurator("ifconfig")?.apply(config);
        if let Some(mtu) = config.mtu
            && (result.is_ok() || self.get_mtu().ok() == Some(mtu))
        {
            self.mtu = mtu as usize;
        }
        result
    }

    /// Read a fresh snapshot of the interface.
    pub fn interface_info(&self) -> Result<InterfaceInfo> {
        self.configurator("interface_info")?.info()
    }

    // Packet I/O

    fn default_read_size(&self) -> usize {
        self.mtu + self.config.mode.link_header_len()
    }

    /// Resolve the payload cap of one read. Zero would hand the kernel an
    /// empty buffer and drop the packet.
    pub(crate) fn read_len(&self, size: Option<usize>) -> Result<usize> {
        match size {
            Some(0) => Err(Error::invalid_argument("read size must be at least 1")),
            Some(n) => Ok(n),
            None if self.mtu == 0 => Err(Error::invalid_argument(
                "default read size is 0; set an mtu of at least 1",
            )),
            None => Ok(self.default_read_size()),
        }
    }

    pub(crate) fn recv_packet(&self, size: usize) -> io::Result<Packet> {
        let packet = packet::read_frame(self.io_file()?, size, self.config.packet_info)?;
        trace!(interface = %self.name, len = packet.len(), "read packet");
        Ok(packet)
    }

    pub(crate) fn send_packet(&self, info: Option<PacketInfo>, payload: &[u8]) -> io::Result<usize> {
        let info = if self.config.packet_info {
            Some(info.unwrap_or_default())
        } else {
            None
        };
        let n = packet::write_frame(self.io_file()?, info.as_ref(), payload)?;
        trace!(interface = %self.name, len = n, "wrote packet");
        Ok(n)
    }

    /// Read one packet and return its payload.
    ///
    /// `size` caps the payload; `None` reads up to the MTU (plus the
    /// Ethernet header in TAP mode); a cap of zero is `InvalidArgument`.
    /// In packet-information mode the header is stripped and discarded; use
    /// [`read_packet`](Self::read_packet) to keep it. An empty result means
    /// end of stream.
    pub fn read(&self, size: Option<usize>) -> Result<Bytes> {
        Ok(self.read_packet(size)?.payload)
    }

    /// Read one packet, keeping the packet information header if present.
    pub fn read_packet(&self, size: Option<usize>) -> Result<Packet> {
        self.file("read")?;
        let size = self.read_len(size)?;
        Ok(self.recv_packet(size)?)
    }

    /// Write one packet.
    ///
    /// In packet-information mode a zeroed header is prepended. Returns the
    /// number of payload bytes written; the header is not counted.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        self.file("write")?;
        Ok(self.send_packet(None, payload)?)
    }

    /// Write one packet with an explicit header.
    ///
    /// The header is ignored when packet information is disabled.
    pub fn write_with_info(&self, info: PacketInfo, payload: &[u8]) -> Result<usize> {
        self.file("write")?;
        Ok(self.send_packet(Some(info), payload)?)
    }
}

impl Drop for TapDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TapDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapDevice")
            .field("name", &self.name)
            .field("mode", &self.config.mode)
            .field("packet_info", &self.config.packet_info)
            .field("mtu", &self.mtu)
            .field("fd", &self.file.as_ref().map(|f| f.as_raw_fd()))
            .finish()
    }
}

impl Read for &TapDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.io_file()?;
        if !self.config.packet_info {
            return file.read(buf);
        }

        let mut hdr = [0u8; PacketInfo::SIZE];
        let n = file.read_vectored(&mut [io::IoSliceMut::new(&mut hdr), io::IoSliceMut::new(buf)])?;
        match n {
            0 => Ok(0),
            n if n < PacketInfo::SIZE => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "short packet information header",
            )),
            n => Ok(n - PacketInfo::SIZE),
        }
    }
}

impl Read for TapDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut &*self, buf)
    }
}

impl Write for &TapDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_packet(None, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for TapDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Enumerate TUN/TAP interfaces on this host.
///
/// An interface qualifies when `/sys/class/net/<name>/tun_flags` exists; its
/// hexadecimal value gives the mode and the `IFF_NO_PI` bit. The result is
/// sorted by name and is empty when sysfs is not mounted.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    let dir = match std::fs::read_dir("/sys/class/net") {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(devices),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        let tun_flags_path = entry.path().join("tun_flags");
        let Ok(flags_str) = std::fs::read_to_string(&tun_flags_path) else {
            continue;
        };

        // e.g. "0x1002"
        let flags_str = flags_str.trim();
        let flags = u32::from_str_radix(flags_str.trim_start_matches("0x"), 16).unwrap_or(0);

        let mode = if flags & (sys::IFF_TUN as u32) != 0 {
            Mode::Tun
        } else if flags & (sys::IFF_TAP as u32) != 0 {
            Mode::Tap
        } else {
            continue;
        };

        devices.push(DeviceInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            mode,
            flags,
        });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Information about an existing TUN/TAP device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name.
    pub name: String,
    /// Device mode.
    pub mode: Mode,
    /// Raw `tun_flags`.
    pub flags: u32,
}

impl DeviceInfo {
    /// Check if frames carry the packet information header.
    pub fn packet_info(&self) -> bool {
        self.flags & (sys::IFF_NO_PI as u32) == 0
    }
}
