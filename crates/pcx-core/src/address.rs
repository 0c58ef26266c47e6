//! Operator address expressions.
//!
//! `game.exe + 0x1A0`, `kernel32.dll!CreateFileW`, `7FF6A000 - 10`: terms are
//! joined with `+`/`-` and evaluated left to right with wrapping arithmetic.

use crate::error::{Error, Result};
use crate::memory::{ExportMap, ModuleCatalogue, parse_hex};

const MODULE_SUFFIXES: [&str; 2] = [".dll", ".exe"];

fn resolve_term(term: &str, catalogue: &ModuleCatalogue, exports: &ExportMap) -> Result<u64> {
    if term.is_empty() {
        return Err(Error::InvalidAddress("empty term".to_string()));
    }

    if let Some((module, symbol)) = term.split_once('!') {
        return exports
            .resolve(module.trim(), symbol.trim())
            .ok_or_else(|| Error::InvalidAddress(format!("unknown export '{}'", term)));
    }

    let lower = term.to_ascii_lowercase();
    if MODULE_SUFFIXES.iter().any(|suffix| lower.contains(suffix)) {
        return catalogue
            .find(term)
            .map(|module| module.base)
            .ok_or_else(|| Error::ModuleNotFound(term.to_string()));
    }

    parse_hex(term).ok_or_else(|| Error::InvalidAddress(format!("'{}' is not a hex value", term)))
}

/// Evaluate an address expression against the module catalogue and exports.
pub fn parse_address(expression: &str, catalogue: &ModuleCatalogue, exports: &ExportMap) -> Result<u64> {
    let mut total = 0u64;
    let mut op = '+';
    let mut term_start = 0;

    for (i, c) in expression.char_indices().chain([(expression.len(), '+')]) {
        if c != '+' && c != '-' {
            continue;
        }
        let value = resolve_term(expression[term_start..i].trim(), catalogue, exports)?;
        total = match op {
            '-' => total.wrapping_sub(value),
            _ => total.wrapping_add(value),
        };
        op = c;
        term_start = i + 1;
    }

    Ok(total)
}
