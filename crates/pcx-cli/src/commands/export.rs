//! Export command: print a region as a C++ class declaration.

use anyhow::{Context, Result, bail};
use pcx_core::Config;

use super::{parse_index_arg, prepare_region};
use crate::connect::{Target, open_session};

pub fn run(
    config: Config,
    target: &Target,
    address: &str,
    class: &str,
    fields: Option<usize>,
    types: &[String],
    names: &[String],
) -> Result<()> {
    let (mut session, _shutdown) = open_session(config, target)?;
    let index = prepare_region(&mut session, address, fields, types)?;

    let region = session.region_mut(index).context("Region disappeared")?;
    region.name = class.to_string();
    for arg in names {
        let (field, name) = parse_index_arg(arg)?;
        if field >= region.len() {
            bail!("Field index {} out of range ({} fields)", field, region.len());
        }
        region.rename(field, name);
    }

    let definition = session
        .export_region(index)
        .context("Region disappeared")?;
    println!("{}", definition);

    session.detach();
    Ok(())
}
