//! Dump command: read a region once and print its decoded fields.

use anyhow::{Context, Result, bail};
use pcx_core::Config;

use super::prepare_region;
use crate::connect::{Target, open_session};
use crate::render::{self, PointerMemo};

pub fn run(
    config: Config,
    target: &Target,
    address: &str,
    fields: Option<usize>,
    types: &[String],
    json: bool,
) -> Result<()> {
    let (mut session, _shutdown) = open_session(config, target)?;
    let index = prepare_region(&mut session, address, fields, types)?;

    session.publish_sync_targets();
    let report = session.sync_loop().tick();
    if session.apply_snapshots() == 0 {
        bail!(
            "Could not read {} ({} of {} targets failed)",
            address,
            report.failed,
            report.targets
        );
    }

    let region = session.region(index).context("Region disappeared")?;
    let mut memo = PointerMemo::new(session.config().read_ttl());
    if json {
        let rows = render::rows(&session, region, &mut memo);
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        render::print_region(&session, region, &mut memo);
    }

    session.detach();
    Ok(())
}
