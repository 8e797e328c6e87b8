//! tapctl show command implementation.

use clap::Args;
use serde_json::json;
use tapdev::{Configurator, InterfaceInfo, SocketControl, format_mac};

#[derive(Args)]
pub struct ShowCmd {
    /// Interface name.
    dev: String,
}

impl ShowCmd {
    pub fn run(self, json: bool) -> anyhow::Result<()> {
        tapdev::validate_name(&self.dev)?;
        let info = Configurator::new(&SocketControl, &self.dev).info()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&info_to_json(&info))?);
        } else {
            println!("{info}");
        }
        Ok(())
    }
}

pub(crate) fn info_to_json(info: &InterfaceInfo) -> serde_json::Value {
    json!({
        "ifname": info.name,
        "flags": format!("0x{:x}", info.flags),
        "operstate": if info.up { "UP" } else { "DOWN" },
        "mtu": info.mtu,
        "address": format_mac(&info.hw_address),
        "local": info.address.map(|a| a.to_string()),
        "netmask": info.netmask.map(|a| a.to_string()),
        "broadcast": info.broadcast.map(|a| a.to_string()),
    })
}
