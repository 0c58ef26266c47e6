use tracing::{debug, info};

use super::{CompiledPattern, PatternInfo, compile, to_ida_signature};
use crate::error::Result;
use crate::memory::{Module, ReadMemory, RemoteMemory};

/// Longest run of literal bytes, as `(offset, bytes)`.
fn find_best_anchor<'a>(bytes: &'a [u8], literal: &[bool]) -> (usize, &'a [u8]) {
    let mut best = (0, 0);
    let mut run_start = 0;
    let mut run_len = 0;

    for (i, &is_literal) in literal.iter().enumerate() {
        if is_literal {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len > best.1 {
                best = (run_start, run_len);
            }
        } else {
            run_len = 0;
        }
    }

    let (start, len) = best;
    (start, &bytes[start..start + len])
}

#[inline]
fn matches_at(window: &[u8], bytes: &[u8], literal: &[bool]) -> bool {
    window
        .iter()
        .zip(bytes)
        .zip(literal)
        .all(|((w, b), &is_literal)| !is_literal || w == b)
}

/// Addresses (`base + offset`) of every match in `data`, ascending.
pub fn scan_buffer(data: &[u8], base: u64, pattern: &CompiledPattern) -> Vec<u64> {
    let len = pattern.len();
    if len == 0 || data.len() < len || pattern.bytes.len() != len {
        return Vec::new();
    }

    let literal = pattern.literal_flags();
    let (anchor_offset, anchor) = find_best_anchor(&pattern.bytes, &literal);

    if anchor.is_empty() {
        return (0..=data.len() - len).map(|i| base + i as u64).collect();
    }

    // Step one byte past each anchor hit so overlapping matches are kept
    let finder = memchr::memmem::Finder::new(anchor);
    let mut matches = Vec::new();
    let mut pos = 0;
    while let Some(found) = finder.find(&data[pos..]) {
        let hit = pos + found;
        pos = hit + 1;
        let Some(start) = hit.checked_sub(anchor_offset) else {
            continue;
        };
        if start + len <= data.len() && matches_at(&data[start..start + len], &pattern.bytes, &literal) {
            matches.push(base + start as u64);
        }
    }
    matches
}

/// Read `module` once and scan it locally.
pub fn scan<R: ReadMemory + ?Sized>(
    reader: &R,
    module: &Module,
    info: &PatternInfo,
) -> Result<Vec<u64>> {
    let compiled = compile(info)?;
    let data = reader.read_span(module.base, module.size as usize)?;
    let matches = scan_buffer(&data, module.base, &compiled);
    info!(
        "{} in {}: {} match(es)",
        info.kind,
        module.name,
        matches.len()
    );
    Ok(matches)
}

/// Let the agent scan `module`; only the first match is reported.
pub fn scan_remote(memory: &RemoteMemory, module: &Module, info: &PatternInfo) -> Result<Option<u64>> {
    let compiled = compile(info)?;
    let signature = to_ida_signature(&compiled);
    debug!("Remote scan of {} for '{}'", module.name, signature);
    memory.find_pattern(module.base, module.size, &signature)
}
