//! Modules command: list modules, their sections and exports.

use anyhow::Result;
use owo_colors::OwoColorize;
use pcx_core::Config;

use crate::connect::{Target, open_session};

pub fn run(config: Config, target: &Target, sections: bool, exports: bool) -> Result<()> {
    let (mut session, _shutdown) = open_session(config, target)?;

    let catalogue = session.catalogue();
    if let Some(at) = catalogue.refreshed_at() {
        println!("{} modules (refreshed {})", catalogue.len(), at.format("%H:%M:%S"));
    }
    for module in catalogue.modules() {
        println!(
            "0x{:016X}  {:>10X}  {}",
            module.base,
            module.size,
            module.name.bold()
        );
        if sections {
            for section in &module.sections {
                println!(
                    "    {:<8} 0x{:016X}  {:>8X}",
                    section.name, section.base, section.size
                );
            }
        }
    }

    if exports {
        println!();
        println!("{} exports", session.exports().len());
        for (address, name) in session.exports().iter() {
            println!("0x{:016X}  {}", address, name);
        }
    }

    session.detach();
    Ok(())
}
