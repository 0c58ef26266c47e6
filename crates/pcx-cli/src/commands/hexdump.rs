//! Hexdump command implementation.
//!
//! # Output Format
//!
//! ```text
//! 0x000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use anyhow::Result;
use pcx_core::{Config, ReadMemory};

use crate::connect::{Target, open_session};

const BYTES_PER_LINE: usize = 16;

/// Format `bytes` as hexdump lines, offsets relative to the first byte.
pub fn format_hexdump(bytes: &[u8], ascii: bool) -> Vec<String> {
    bytes
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("0x{:03X}: ", i * BYTES_PER_LINE);

            for j in 0..BYTES_PER_LINE {
                if j == 8 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }

            if ascii {
                line.push_str(" |");
                for byte in chunk {
                    if (0x20..0x7F).contains(byte) {
                        line.push(*byte as char);
                    } else {
                        line.push('.');
                    }
                }
                line.push_str(&" ".repeat(BYTES_PER_LINE - chunk.len()));
                line.push('|');
            }
            line
        })
        .collect()
}

/// Run the hexdump command
pub fn run(config: Config, target: &Target, address: &str, size: usize, ascii: bool) -> Result<()> {
    let (mut session, _shutdown) = open_session(config, target)?;
    let address = session.resolve_address(address)?;
    let bytes = session.memory().read_span(address, size)?;

    let location = session
        .format_rva(address)
        .unwrap_or_else(|| format!("0x{:X}", address));
    println!("Hexdump at {} ({} bytes):", location, bytes.len());
    println!();
    for line in format_hexdump(&bytes, ascii) {
        println!("{}", line);
    }

    session.detach();
    Ok(())
}
