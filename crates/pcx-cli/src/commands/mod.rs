//! CLI command implementations.

pub mod dump;
pub mod export;
pub mod hexdump;
pub mod modules;
pub mod scan;
pub mod watch;

use anyhow::{Context, Result, bail};
use pcx_core::{FieldKind, PointerWidth, Region, Session};
use tracing::warn;

/// Split an `INDEX:VALUE` argument.
pub fn parse_index_arg(arg: &str) -> Result<(usize, &str)> {
    let (index, value) = arg
        .split_once(':')
        .with_context(|| format!("Expected INDEX:VALUE, got '{}'", arg))?;
    let index = index
        .trim()
        .parse()
        .with_context(|| format!("Invalid field index in '{}'", arg))?;
    Ok((index, value.trim()))
}

/// Grow or shrink `region` to `fields` entries and apply `INDEX:KIND` overrides.
pub fn shape_region(
    region: &mut Region,
    width: PointerWidth,
    fields: Option<usize>,
    types: &[String],
) -> Result<()> {
    if let Some(fields) = fields {
        if fields == 0 {
            bail!("A region needs at least one field");
        }
        while region.len() > fields {
            if !region.resize(-8) {
                warn!("Region cannot shrink below {} fields", region.len());
                break;
            }
        }
        while region.len() < fields {
            region.resize(width.size() as i64);
        }
    }

    for arg in types {
        let (index, kind) = parse_index_arg(arg)?;
        let kind: FieldKind = kind
            .parse()
            .with_context(|| format!("Unknown field kind '{}'", kind))?;
        if index >= region.len() {
            bail!(
                "Field index {} out of range ({} fields)",
                index,
                region.len()
            );
        }
        region.change_type(index, kind, false);
    }
    Ok(())
}

/// Point the selected region at `address` and shape it.
pub fn prepare_region(
    session: &mut Session,
    address: &str,
    fields: Option<usize>,
    types: &[String],
) -> Result<usize> {
    let address = session.resolve_address(address)?;
    let width = session.width();
    let index = session.selected_index();
    let region = session
        .selected_region_mut()
        .context("No region available")?;
    region.set_address(address);
    shape_region(region, width, fields, types)?;
    Ok(index)
}
