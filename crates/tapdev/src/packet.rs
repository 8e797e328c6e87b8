//! Packet-information framing.
//!
//! Unless a device is opened with `IFF_NO_PI`, the kernel prefixes every
//! frame read from it with a 4-byte header and expects the same header on
//! every frame written to it:
//!
//! ```text
//! 0               2               4
//! +-------+-------+-------+-------+--------------
//! |     flags     |     proto     |  payload ...
//! +-------+-------+-------+-------+--------------
//! ```
//!
//! Both fields are big-endian. `proto` carries an ethertype such as
//! [`proto::IPV4`].

use std::io::{self, IoSlice, Read, Write};

use bytes::{Bytes, BytesMut};
use zerocopy::byteorder::network_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Ethertype values used in [`PacketInfo::proto`].
pub mod proto {
    /// IPv4 (`ETH_P_IP`).
    pub const IPV4: u16 = 0x0800;
    /// ARP (`ETH_P_ARP`).
    pub const ARP: u16 = 0x0806;
    /// IPv6 (`ETH_P_IPV6`).
    pub const IPV6: u16 = 0x86DD;
}

/// Set by the kernel when the frame did not fit the read buffer.
pub const TUN_PKT_STRIP: u16 = 0x0001;

/// Ethernet header length, added to the default read size in TAP mode.
pub const ETH_HLEN: usize = 14;

/// Packet information header (struct tun_pi).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct PacketInfo {
    flags: U16,
    proto: U16,
}

impl PacketInfo {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a header with the given flags and protocol.
    pub fn new(flags: u16, proto: u16) -> Self {
        Self {
            flags: U16::new(flags),
            proto: U16::new(proto),
        }
    }

    /// Create a header whose protocol is taken from the IP version nibble
    /// of `payload`. Anything that isn't IPv4 or IPv6 gets protocol 0.
    pub fn for_payload(payload: &[u8]) -> Self {
        let proto = match payload.first().map(|b| b >> 4) {
            Some(4) => proto::IPV4,
            Some(6) => proto::IPV6,
            _ => 0,
        };
        Self::new(0, proto)
    }

    /// Get the flags.
    pub fn flags(&self) -> u16 {
        self.flags.get()
    }

    /// Get the protocol.
    pub fn proto(&self) -> u16 {
        self.proto.get()
    }

    /// Check if the kernel truncated the frame.
    pub fn is_truncated(&self) -> bool {
        self.flags() & TUN_PKT_STRIP != 0
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Self::read_from_prefix(data).map(|(hdr, _)| hdr).ok()
    }
}

/// A frame read from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Header stripped from the frame, present in packet-information mode.
    pub info: Option<PacketInfo>,
    /// The packet itself.
    pub payload: Bytes,
}

impl Packet {
    /// Length of the payload.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty (end of stream).
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Buffer size needed to receive a frame carrying up to `payload` bytes.
pub(crate) fn frame_capacity(payload: usize, packet_info: bool) -> usize {
    if packet_info {
        payload + PacketInfo::SIZE
    } else {
        payload
    }
}

/// Split a received frame into header and payload.
pub(crate) fn deframe(mut frame: Bytes, packet_info: bool) -> io::Result<Packet> {
    if !packet_info || frame.is_empty() {
        return Ok(Packet {
            info: None,
            payload: frame,
        });
    }

    let info = PacketInfo::from_bytes(&frame).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame of {} bytes is shorter than the packet information header",
                frame.len()
            ),
        )
    })?;
    let payload = frame.split_off(PacketInfo::SIZE);
    Ok(Packet {
        info: Some(info),
        payload,
    })
}

/// Receive one frame of at most `payload` bytes (plus header).
pub(crate) fn read_frame<R: Read>(
    mut reader: R,
    payload: usize,
    packet_info: bool,
) -> io::Result<Packet> {
    let mut buf = BytesMut::zeroed(frame_capacity(payload, packet_info));
    let n = reader.read(&mut buf)?;
    buf.truncate(n);
    deframe(buf.freeze(), packet_info)
}

/// Send one frame. Returns the payload bytes accepted, excluding the header.
pub(crate) fn write_frame<W: Write>(
    mut writer: W,
    info: Option<&PacketInfo>,
    payload: &[u8],
) -> io::Result<usize> {
    match info {
        None => writer.write(payload),
        Some(info) => {
            // One vectored write keeps header and payload in a single frame.
            let n = writer.write_vectored(&[IoSlice::new(info.as_bytes()), IoSlice::new(payload)])?;
            Ok(n.saturating_sub(PacketInfo::SIZE))
        }
    }
}
