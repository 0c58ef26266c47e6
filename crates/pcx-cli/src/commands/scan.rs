//! Scan command: search a module for an IDA signature or byte pattern.

use anyhow::Result;
use pcx_core::Config;
use pcx_core::pattern::string_to_signature;

use crate::connect::{Target, open_session};

pub fn run(
    config: Config,
    target: &Target,
    module: &str,
    pattern: &str,
    text: bool,
    remote: bool,
) -> Result<()> {
    let (mut session, _shutdown) = open_session(config, target)?;
    let pattern = if text {
        string_to_signature(pattern)
    } else {
        pattern.to_string()
    };

    let matches = if remote {
        session.scan_remote(module, &pattern)?.into_iter().collect()
    } else {
        session.scan(module, &pattern)?
    };

    if matches.is_empty() {
        println!("No matches in {}", module);
    } else {
        println!("{} match(es) in {}:", matches.len(), module);
        for address in &matches {
            let rva = session.format_rva(*address).unwrap_or_default();
            println!("  0x{:X}  {}", address, rva);
        }
    }

    session.detach();
    Ok(())
}
