//! Signature detection, compilation and scanning.
//!
//! Two notations are accepted: IDA-style signatures (`48 8B ?? 05`) and
//! escaped byte patterns (`\x48\x8B\x?\x05`). Both compile to the same
//! bytes + mask form.

mod scan;

use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::error::{Error, Result};

pub use scan::{scan, scan_buffer, scan_remote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
pub enum PatternKind {
    #[strum(serialize = "IDA Signature")]
    IdaSignature,
    #[strum(serialize = "Byte Pattern")]
    BytePattern,
}

/// A pattern with its detected notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternInfo {
    pub kind: PatternKind,
    /// Trimmed input; IDA signatures are re-joined with single spaces
    pub pattern: String,
}

/// Pattern bytes with an `x` (match) / `?` (wildcard) mask per byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPattern {
    pub bytes: Vec<u8>,
    pub mask: String,
}

impl CompiledPattern {
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    fn push_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
        self.mask.push('x');
    }

    fn push_wildcard(&mut self) {
        self.bytes.push(0);
        self.mask.push('?');
    }

    /// Per-byte literal flags, `true` where the byte must match.
    pub fn literal_flags(&self) -> Vec<bool> {
        self.mask.bytes().map(|m| m == b'x').collect()
    }
}

fn is_wildcard_token(token: &str) -> bool {
    token == "?" || token == "??"
}

fn is_hex_pair(token: &str) -> bool {
    token.len() == 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Work out which notation `input` is written in.
pub fn detect(input: &str) -> Option<PatternInfo> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens
        .iter()
        .all(|token| is_hex_pair(token) || is_wildcard_token(token))
    {
        return Some(PatternInfo {
            kind: PatternKind::IdaSignature,
            pattern: tokens.join(" "),
        });
    }

    if trimmed.contains("\\x") {
        return Some(PatternInfo {
            kind: PatternKind::BytePattern,
            pattern: trimmed.to_string(),
        });
    }

    None
}

fn parse_hex_byte(text: &str) -> Result<u8> {
    u8::from_str_radix(text, 16)
        .map_err(|e| Error::InvalidPattern(format!("Invalid byte '{}': {}", text, e)))
}

fn compile_ida(pattern: &str, out: &mut CompiledPattern) -> Result<()> {
    for token in pattern.split_whitespace() {
        if is_wildcard_token(token) {
            out.push_wildcard();
        } else if is_hex_pair(token) {
            out.push_byte(parse_hex_byte(token)?);
        } else {
            return Err(Error::InvalidPattern(format!(
                "Invalid signature token '{}'",
                token
            )));
        }
    }
    Ok(())
}

fn compile_bytes(pattern: &str, out: &mut CompiledPattern) -> Result<()> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'x') => {
                i += 2;
                if bytes.get(i) == Some(&b'?') {
                    out.push_wildcard();
                    while bytes.get(i) == Some(&b'?') {
                        i += 1;
                    }
                } else {
                    let digits = pattern.get(i..i + 2).ok_or_else(|| {
                        Error::InvalidPattern(format!("Truncated escape at offset {}", i - 2))
                    })?;
                    out.push_byte(parse_hex_byte(digits)?);
                    i += 2;
                }
            }
            b'?' => {
                out.push_wildcard();
                while bytes.get(i) == Some(&b'?') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Compile a detected pattern into bytes and mask.
pub fn compile(info: &PatternInfo) -> Result<CompiledPattern> {
    let mut compiled = CompiledPattern {
        bytes: Vec::new(),
        mask: String::new(),
    };
    match info.kind {
        PatternKind::IdaSignature => compile_ida(&info.pattern, &mut compiled)?,
        PatternKind::BytePattern => compile_bytes(&info.pattern, &mut compiled)?,
    }

    if compiled.is_empty() {
        return Err(Error::InvalidPattern("Pattern is empty".to_string()));
    }
    Ok(compiled)
}

/// Detect and compile in one step.
pub fn parse(input: &str) -> Result<CompiledPattern> {
    let info = detect(input)
        .ok_or_else(|| Error::InvalidPattern(format!("Unrecognized pattern '{}'", input.trim())))?;
    compile(&info)
}

/// Render as an IDA signature (`48 8B ?? ??`).
pub fn to_ida_signature(compiled: &CompiledPattern) -> String {
    compiled
        .bytes
        .iter()
        .zip(compiled.mask.bytes())
        .map(|(byte, mask)| match mask {
            b'x' => format!("{:02X}", byte),
            _ => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape literal text as a `\xHH` byte pattern.
pub fn string_to_signature(text: &str) -> String {
    text.bytes().map(|b| format!("\\x{:02X}", b)).collect()
}
