//! Terminal rendering of regions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use owo_colors::OwoColorize;
use pcx_core::{FieldKind, FieldValue, PointerDescription, Region, Session};
use serde::Serialize;

/// Kind label padded and painted in the kind's table color.
pub fn kind_label(kind: FieldKind) -> String {
    let (r, g, b) = kind.info().color;
    format!("{:<10}", kind.label()).truecolor(r, g, b).to_string()
}

/// One decoded field, as printed or serialized.
#[derive(Debug, Serialize)]
pub struct Row {
    pub offset: usize,
    pub address: u64,
    pub kind: FieldKind,
    pub name: String,
    pub locked: bool,
    pub value: Option<FieldValue>,
    pub pointer: Option<PointerDescription>,
}

/// Pointer descriptions kept for one read TTL so a redraw does not
/// re-query every pointer field.
pub struct PointerMemo {
    ttl: Duration,
    entries: HashMap<u64, (PointerDescription, Instant)>,
}

impl PointerMemo {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn describe(&mut self, session: &Session, value: u64) -> PointerDescription {
        self.describe_at(value, Instant::now(), |v| session.describe_pointer(v))
    }

    fn describe_at(
        &mut self,
        value: u64,
        now: Instant,
        resolve: impl FnOnce(u64) -> PointerDescription,
    ) -> PointerDescription {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < ttl);
        self.entries
            .entry(value)
            .or_insert_with(|| (resolve(value), now))
            .0
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode `region` and annotate pointer-width hex fields.
pub fn rows(session: &Session, region: &Region, memo: &mut PointerMemo) -> Vec<Row> {
    let pointer_kind = FieldKind::pointer_hex(session.width());
    region
        .values()
        .map(|(offset, field, value)| {
            let pointer = value
                .as_ref()
                .filter(|_| field.kind == pointer_kind)
                .and_then(FieldValue::as_pointer)
                .map(|v| memo.describe(session, v))
                .filter(PointerDescription::is_pointer);
            Row {
                offset,
                address: region.address() + offset as u64,
                kind: field.kind,
                name: field.name().to_string(),
                locked: field.is_locked(),
                value,
                pointer,
            }
        })
        .collect()
}

fn header(session: &Session, region: &Region) -> String {
    let location = session
        .format_rva(region.address())
        .unwrap_or_else(|| format!("{:#x}", region.address()));
    format!(
        "{} @ {} ({} bytes, {} fields)",
        region.name.bold(),
        location,
        region.size(),
        region.len()
    )
}

/// Print `region` as a table.
pub fn print_region(session: &Session, region: &Region, memo: &mut PointerMemo) {
    println!("{}", header(session, region));
    for row in rows(session, region, memo) {
        let lock = if row.locked { "*" } else { " " };
        let value = row
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "??".to_string());
        let pointer = row
            .pointer
            .as_ref()
            .map(|p| format!("  {}", p.to_string().red()))
            .unwrap_or_default();
        println!(
            "{:04X}{} {:#014x}  {} {:<20} {}{}",
            row.offset,
            lock,
            row.address,
            kind_label(row.kind),
            row.name,
            value,
            pointer
        );
    }
}
