//! tapctl list command implementation.

use clap::Args;
use serde_json::json;

#[derive(Args)]
pub struct ListCmd {}

impl ListCmd {
    pub fn run(self, json: bool) -> anyhow::Result<()> {
        let devices = tapdev::list_devices()?;

        if json {
            let value: Vec<_> = devices
                .iter()
                .map(|d| {
                    json!({
                        "ifname": d.name,
                        "mode": d.mode.name(),
                        "pi": d.packet_info(),
                        "flags": format!("0x{:x}", d.flags),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        for d in &devices {
            if d.packet_info() {
                println!("{}: {} pi", d.name, d.mode);
            } else {
                println!("{}: {}", d.name, d.mode);
            }
        }
        Ok(())
    }
}
