//! Async packet I/O on top of tokio's reactor.

use std::os::fd::{AsRawFd, RawFd};

use bytes::Bytes;
use tokio::io::unix::AsyncFd;

use crate::device::TapDevice;
use crate::error::{Error, Result, State};
use crate::packet::{Packet, PacketInfo};

/// An open device, guaranteed to hold a descriptor for as long as it is
/// registered with the reactor.
struct Registered(TapDevice);

impl AsRawFd for Registered {
    fn as_raw_fd(&self) -> RawFd {
        // Only constructed from open devices, and never closed while wrapped.
        self.0.raw_fd().unwrap_or(-1)
    }
}

/// A [`TapDevice`] driven by tokio.
///
/// The descriptor is switched to non-blocking mode and registered with the
/// runtime. Framing is identical to the blocking API.
///
/// ```ignore
/// let dev = TapDevice::builder().name("tun%d").open()?;
/// let dev = AsyncTapDevice::new(dev)?;
/// let packet = dev.read(None).await?;
/// dev.write(&packet).await?;
/// ```
pub struct AsyncTapDevice {
    inner: AsyncFd<Registered>,
}

impl AsyncTapDevice {
    /// Register an open device with the current tokio runtime.
    pub fn new(device: TapDevice) -> Result<Self> {
        if !device.is_open() {
            return Err(Error::InvalidState {
                op: "register with runtime",
                state: State::Closed,
            });
        }
        device.set_nonblocking(true)?;
        Ok(Self {
            inner: AsyncFd::new(Registered(device))?,
        })
    }

    /// Borrow the device, e.g. for configuration calls.
    pub fn get_ref(&self) -> &TapDevice {
        &self.inner.get_ref().0
    }

    /// Deregister and return the device in blocking mode.
    pub fn into_inner(self) -> Result<TapDevice> {
        let device = self.inner.into_inner().0;
        device.set_nonblocking(false)?;
        Ok(device)
    }

    /// Read one packet, keeping the packet information header if present.
    pub async fn read_packet(&self, size: Option<usize>) -> Result<Packet> {
        let size = self.get_ref().read_len(size)?;
        loop {
            let mut guard = self.inner.readable().await?;

            match guard.try_io(|inner| inner.get_ref().0.recv_packet(size)) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Read one packet and return its payload.
    pub async fn read(&self, size: Option<usize>) -> Result<Bytes> {
        Ok(self.read_packet(size).await?.payload)
    }

    /// Write one packet. Returns the payload bytes written.
    pub async fn write(&self, payload: &[u8]) -> Result<usize> {
        self.send(None, payload).await
    }

    /// Write one packet with an explicit header.
    pub async fn write_with_info(&self, info: PacketInfo, payload: &[u8]) -> Result<usize> {
        self.send(Some(info), payload).await
    }

    async fn send(&self, info: Option<PacketInfo>, payload: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.inner.writable().await?;

            match guard.try_io(|inner| inner.get_ref().0.send_packet(info, payload)) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }
}

impl std::fmt::Debug for AsyncTapDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AsyncTapDevice").field(self.get_ref()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceConfig, Mode};
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixDatagram;

    fn pair(packet_info: bool) -> (AsyncTapDevice, UnixDatagram) {
        let (dev_end, peer) = UnixDatagram::pair().unwrap();
        let config = DeviceConfig {
            name: Some("tun5".to_string()),
            mode: Mode::Tun,
            packet_info,
            ..Default::default()
        };
        let device = TapDevice::from_fd(OwnedFd::from(dev_end), config);
        (AsyncTapDevice::new(device).unwrap(), peer)
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let (dev, peer) = pair(true);

        assert_eq!(dev.write(b"\x45ping").await.unwrap(), 5);
        let mut buf = [0u8; 32];
        let n = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\0\0\0\0\x45ping");

        peer.send(&[0x00, 0x00, 0x08, 0x00, 0x45, b'p', b'o', b'n', b'g'])
            .unwrap();
        let packet = dev.read_packet(None).await.unwrap();
        assert_eq!(packet.info.unwrap().proto(), crate::packet::proto::IPV4);
        assert_eq!(&packet.payload[..], b"\x45pong");
    }

    #[tokio::test]
    async fn test_async_read_waits_for_data() {
        let (dev, peer) = pair(false);

        let sender = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            peer.send(b"late").unwrap();
            peer
        });

        assert_eq!(&dev.read(None).await.unwrap()[..], b"late");
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_read_size_rejected() {
        let (dev, peer) = pair(false);
        peer.send(b"kept").unwrap();

        assert!(matches!(
            dev.read(Some(0)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(&dev.read(None).await.unwrap()[..], b"kept");
    }

    #[tokio::test]
    async fn test_rejects_closed_device() {
        let device = TapDevice::new(DeviceConfig::default());
        assert!(matches!(
            AsyncTapDevice::new(device),
            Err(Error::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_into_inner_restores_blocking() {
        let (dev, peer) = pair(false);
        let device = dev.into_inner().unwrap();
        assert!(device.is_open());

        peer.send(b"sync").unwrap();
        assert_eq!(&device.read(None).unwrap()[..], b"sync");
    }
}
