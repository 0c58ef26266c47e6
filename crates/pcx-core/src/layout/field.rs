use serde::Serialize;

use super::kind::FieldKind;

/// Longest field name kept, in bytes
pub const MAX_NAME_LEN: usize = 63;

/// One typed slot of a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    name: String,
    pub kind: FieldKind,
    pub selected: bool,
    /// Byte offset this field is pinned to, if any
    pub offset_lock: Option<u32>,
}

impl Field {
    /// Unnamed, unlocked field.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            name: String::new(),
            kind,
            selected: false,
            offset_lock: None,
        }
    }

    pub fn named(kind: FieldKind, name: &str) -> Self {
        let mut field = Self::new(kind);
        field.set_name(name);
        field
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }

    /// Set the name, truncated to [`MAX_NAME_LEN`] bytes on a char boundary.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(MAX_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = name[..end].to_string();
    }

    pub fn byte_size(&self) -> usize {
        self.kind.size()
    }

    pub fn is_locked(&self) -> bool {
        self.offset_lock.is_some()
    }

    /// Unnamed hex fields are padding.
    pub fn is_padding(&self) -> bool {
        self.kind.is_hex() && !self.has_name()
    }
}
