//! Watch command: keep a region synced and redraw it until interrupted.

use std::io::stdout;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use pcx_core::Config;
use tracing::{info, warn};

use super::prepare_region;
use crate::connect::{Target, open_session};
use crate::render::{self, PointerMemo};

pub fn run(
    config: Config,
    target: &Target,
    address: &str,
    fields: Option<usize>,
    types: &[String],
    refresh_ms: u64,
) -> Result<()> {
    let interval = config.sync_interval();
    let (mut session, shutdown) = open_session(config, target)?;
    let index = prepare_region(&mut session, address, fields, types)?;

    session.publish_sync_targets();
    let handle = session.sync_loop().spawn(interval, shutdown.clone())?;
    let refresh = Duration::from_millis(refresh_ms.max(16));
    let mut memo = PointerMemo::new(session.config().read_ttl());

    while !shutdown.is_shutdown() {
        let stale = session.memory().cleanup_stale();
        if stale > 0 {
            warn!("Dropped {} stale requests", stale);
        }
        if !session.memory().is_connected() {
            warn!("Agent disconnected");
            break;
        }

        session.publish_sync_targets();
        session.apply_snapshots();

        if let Some(region) = session.region(index) {
            execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
            render::print_region(&session, region, &mut memo);
        }

        if shutdown.wait(refresh) {
            break;
        }
    }

    shutdown.trigger();
    handle
        .join()
        .map_err(|_| anyhow!("Sync thread panicked"))?;
    session.detach();
    info!("Watch stopped");
    Ok(())
}
