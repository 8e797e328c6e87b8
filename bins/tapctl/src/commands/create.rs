//! tapctl create command implementation.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tapdev::{AsyncTapDevice, IfConfig, Mode, Packet, TapDevice};

/// Bytes of each packet shown in the summary line.
const PREVIEW_LEN: usize = 16;

#[derive(Args)]
pub struct CreateCmd {
    /// Interface name or template (e.g. tap%d). The kernel picks one if omitted.
    #[arg(long)]
    name: Option<String>,

    /// Create a TAP (Ethernet) device.
    #[arg(long, conflicts_with = "tun")]
    tap: bool,

    /// Create a TUN (IP) device. This is the default.
    #[arg(long)]
    tun: bool,

    /// Keep the 4-byte packet information header on every frame.
    #[arg(long)]
    pi: bool,

    /// IPv4 address, optionally with a prefix length (10.0.0.1/24).
    #[arg(long)]
    address: Option<String>,

    /// IPv4 netmask.
    #[arg(long)]
    netmask: Option<String>,

    /// IPv4 broadcast address.
    #[arg(long)]
    broadcast: Option<String>,

    /// Set MTU.
    #[arg(long)]
    mtu: Option<i32>,

    /// Set MAC address.
    #[arg(long)]
    hwaddr: Option<String>,

    /// Bring interface up.
    #[arg(long)]
    up: bool,

    /// Load interface settings from a JSON file. Flags override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exit after this many packets.
    #[arg(long)]
    count: Option<u64>,

    /// Write every packet back to the device.
    #[arg(long)]
    echo: bool,
}

impl CreateCmd {
    pub async fn run(self) -> anyhow::Result<()> {
        let ifconfig = self.ifconfig()?;
        let mode = if self.tap && !self.tun {
            Mode::Tap
        } else {
            Mode::Tun
        };

        let mut builder = TapDevice::builder().mode(mode).packet_info(self.pi);
        if let Some(name) = &self.name {
            builder = builder.name(name);
        }
        let mut device = builder.open()?;

        if !ifconfig.is_empty() {
            device
                .ifconfig(&ifconfig)
                .with_context(|| format!("configuring {}", device.name()))?;
        }
        println!("{}", device.name());

        if self.count == Some(0) {
            return Ok(());
        }

        let device = AsyncTapDevice::new(device)?;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut seen = 0u64;
        loop {
            let packet = tokio::select! {
                _ = &mut ctrl_c => break,
                packet = device.read_packet(None) => packet?,
            };
            if packet.is_empty() {
                break;
            }

            println!("{}", summarize(&packet));

            if self.echo {
                match packet.info {
                    Some(info) => device.write_with_info(info, &packet.payload).await?,
                    None => device.write(&packet.payload).await?,
                };
            }

            seen += 1;
            if self.count.is_some_and(|count| seen >= count) {
                break;
            }
        }

        tracing::info!(device = %device.get_ref().name(), packets = seen, "done");
        Ok(())
    }

    fn ifconfig(&self) -> anyhow::Result<IfConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => IfConfig::new(),
        };

        if let Some(addr) = &self.address {
            let (addr, mask) = tapdev::parse_address(addr)?;
            config = config.address(addr);
            if let Some(mask) = mask {
                config = config.netmask(mask);
            }
        }
        if let Some(mask) = &self.netmask {
            config = config.netmask(tapdev::parse_ipv4(mask)?);
        }
        if let Some(brd) = &self.broadcast {
            config = config.broadcast(tapdev::parse_ipv4(brd)?);
        }
        if let Some(mtu) = self.mtu {
            config = config.mtu(mtu);
        }
        if let Some(mac) = &self.hwaddr {
            config = config.hw_address_str(mac)?;
        }
        if self.up {
            config = config.up(true);
        }
        Ok(config)
    }
}

/// One line per packet: length, header protocol and the leading bytes.
fn summarize(packet: &Packet) -> String {
    let mut line = format!("{:>5} bytes", packet.len());
    if let Some(info) = &packet.info {
        let _ = write!(line, " proto 0x{:04x}", info.proto());
        if info.is_truncated() {
            line.push_str(" truncated");
        }
    }
    line.push(' ');
    for byte in packet.payload.iter().take(PREVIEW_LEN) {
        let _ = write!(line, " {byte:02x}");
    }
    if packet.len() > PREVIEW_LEN {
        line.push_str(" ...");
    }
    line
}
