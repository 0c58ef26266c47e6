use tracing::debug;

use super::field::Field;
use super::kind::{FieldKind, hex_chunks};
use super::value::FieldValue;
use crate::memory::PointerWidth;

/// A reconstructed structure: an ordered list of fields over a byte buffer.
///
/// The backing buffer always has the same length as the summed field sizes
/// once a mutation returns.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    address: u64,
    fields: Vec<Field>,
    buffer: Vec<u8>,
    var_counter: u32,
}

impl Region {
    /// Region of `count` pointer-width hex fields.
    pub fn new(name: impl Into<String>, count: usize, width: PointerWidth) -> Self {
        let fields = vec![Field::new(FieldKind::pointer_hex(width)); count];
        Self::from_fields(name, fields)
    }

    pub fn from_fields(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let mut region = Self {
            name: name.into(),
            address: 0,
            fields,
            buffer: Vec::new(),
            var_counter: 0,
        };
        region.fit_buffer();
        region
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn set_address(&mut self, address: u64) {
        if self.address != address {
            debug!("{} -> {:#x}", self.name, address);
        }
        self.address = address;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Current byte size (length of the backing buffer).
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    fn computed_size(&self) -> usize {
        self.fields.iter().map(Field::byte_size).sum()
    }

    /// Prefix-sum offset of the field at `index`.
    pub fn offset_of(&self, index: usize) -> usize {
        self.fields[..index.min(self.fields.len())]
            .iter()
            .map(Field::byte_size)
            .sum()
    }

    /// Offsets of every field, in order.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|field| {
                let current = offset;
                offset += field.byte_size();
                current
            })
            .collect()
    }

    fn fit_buffer(&mut self) {
        let size = self.computed_size();
        self.buffer.resize(size, 0);
    }

    /// Grow by `delta` bytes of hex padding, or drop the last field when
    /// `delta == -8`. Any other change is rejected.
    pub fn resize(&mut self, delta: i64) -> bool {
        let new_size = self.size() as i64 + delta;
        if new_size < 1 {
            return false;
        }

        if delta > 0 {
            self.fields
                .extend(hex_chunks(delta as usize).into_iter().map(Field::new));
            self.normalize();
            self.buffer.fill(0);
            true
        } else if delta == -8 {
            if self.fields.pop().is_none() {
                return false;
            }
            self.normalize();
            true
        } else {
            false
        }
    }

    /// Replace the kind of the field at `index`, keeping the region size
    /// stable where possible. Returns the number of backfill fields inserted
    /// after it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn change_type(&mut self, index: usize, kind: FieldKind, select_new: bool) -> usize {
        assert!(
            index < self.fields.len(),
            "field index {index} out of range ({} fields)",
            self.fields.len()
        );

        let offset = self.offset_of(index);
        let old = self.fields[index].clone();
        let old_size = old.byte_size();
        let new_size = kind.size();

        let mut replacement = Field::new(kind).with_selected(select_new);
        if old.has_name() || old.is_locked() {
            replacement.offset_lock = Some(old.offset_lock.unwrap_or(offset as u32));
        }
        if !kind.is_hex() {
            if old.has_name() {
                replacement.set_name(old.name());
            } else {
                replacement.set_name(&format!("Var_{}", self.var_counter));
                self.var_counter += 1;
            }
        }
        self.fields[index] = replacement;

        let mut blocked = false;
        let backfill = if new_size < old_size {
            old_size - new_size
        } else {
            // Absorb following padding until the new field is covered. A
            // named or locked neighbour is kept and pushed back instead;
            // whatever is still missing at the end of the region grows it.
            let mut needed = new_size - old_size;
            let mut overshoot = 0;
            while needed > 0 && index + 1 < self.fields.len() {
                let next = &self.fields[index + 1];
                if !next.is_padding() || next.is_locked() {
                    blocked = true;
                    break;
                }
                let absorbed = self.fields.remove(index + 1).byte_size();
                if absorbed >= needed {
                    overshoot = absorbed - needed;
                    needed = 0;
                } else {
                    needed -= absorbed;
                }
            }
            overshoot
        };

        let chunks = hex_chunks(backfill);
        let inserted = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.fields
                .insert(index + 1 + i, Field::new(chunk).with_selected(select_new));
        }
        if blocked {
            self.normalize();
        } else {
            self.fit_buffer();
        }
        inserted
    }

    /// Retype every selected field, locking each at its current offset first.
    pub fn change_type_selected(&mut self, kind: FieldKind) {
        let mut offset = 0usize;
        let mut i = 0;
        while i < self.fields.len() {
            if self.fields[i].selected {
                self.fields[i].offset_lock = Some(offset as u32);
                let inserted = self.change_type(i, kind, true);
                i += inserted;
                offset = self.offset_of(i + 1);
            } else {
                offset += self.fields[i].byte_size();
            }
            i += 1;
        }
        self.normalize();
    }

    /// Insert padding in front of locked fields that sit past the running
    /// offset and re-anchor locks that an earlier field has grown over.
    pub fn normalize(&mut self) {
        let mut normalized = Vec::with_capacity(self.fields.len());
        let mut offset = 0usize;

        for mut field in self.fields.drain(..) {
            if let Some(lock) = field.offset_lock {
                let lock = lock as usize;
                if lock > offset {
                    for chunk in hex_chunks(lock - offset) {
                        offset += chunk.size();
                        normalized.push(Field::new(chunk));
                    }
                } else if lock < offset {
                    field.offset_lock = Some(offset as u32);
                }
            }
            offset += field.byte_size();
            normalized.push(field);
        }

        self.fields = normalized;
        self.fit_buffer();
    }

    /// Rename a field. A non-empty name pins the field at its current offset.
    pub fn rename(&mut self, index: usize, name: &str) -> bool {
        let offset = self.offset_of(index);
        let Some(field) = self.fields.get_mut(index) else {
            return false;
        };
        field.set_name(name);
        if field.has_name() {
            field.offset_lock = Some(offset as u32);
        }
        true
    }

    /// Pin a typed field at its current offset.
    pub fn lock(&mut self, index: usize) -> bool {
        let offset = self.offset_of(index);
        match self.fields.get_mut(index) {
            Some(field) if !field.kind.is_hex() => {
                field.offset_lock = Some(offset as u32);
                self.normalize();
                true
            }
            _ => false,
        }
    }

    pub fn unlock(&mut self, index: usize) -> bool {
        match self.fields.get_mut(index) {
            Some(field) if !field.kind.is_hex() => {
                field.offset_lock = None;
                true
            }
            _ => false,
        }
    }

    /// Select only the field at `index`.
    pub fn select(&mut self, index: usize) {
        for (i, field) in self.fields.iter_mut().enumerate() {
            field.selected = i == index;
        }
    }

    pub fn toggle_select(&mut self, index: usize) {
        if let Some(field) = self.fields.get_mut(index) {
            field.selected = !field.selected;
        }
    }

    /// Extend the selection from the lowest selected field to `index`.
    pub fn select_range(&mut self, index: usize) {
        if index >= self.fields.len() {
            return;
        }
        let start = self
            .fields
            .iter()
            .position(|field| field.selected)
            .unwrap_or(index);
        let (low, high) = if start > index {
            (index, start)
        } else {
            (start, index)
        };
        for field in &mut self.fields[low..=high] {
            field.selected = true;
        }
    }

    pub fn clear_selection(&mut self) {
        for field in &mut self.fields {
            field.selected = false;
        }
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(i, field)| field.selected.then_some(i))
            .collect()
    }

    /// Remove all selected fields. Returns how many were removed.
    pub fn delete_selected(&mut self) -> usize {
        let before = self.fields.len();
        self.fields.retain(|field| !field.selected);
        let removed = before - self.fields.len();
        if removed > 0 {
            self.normalize();
        }
        removed
    }

    /// Copy a snapshot into the backing buffer if it matches the current size.
    pub fn apply_snapshot(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.buffer.len() {
            return false;
        }
        self.buffer.copy_from_slice(bytes);
        true
    }

    /// `(offset, field, decoded value)` for every field.
    pub fn values(&self) -> impl Iterator<Item = (usize, &Field, Option<FieldValue>)> + '_ {
        self.offsets()
            .into_iter()
            .zip(self.fields.iter())
            .map(|(offset, field)| {
                let value = self
                    .buffer
                    .get(offset..)
                    .and_then(|bytes| field.kind.decode(bytes));
                (offset, field, value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn kinds(region: &Region) -> Vec<FieldKind> {
        region.fields().iter().map(|f| f.kind).collect()
    }

    fn hex64_region(count: usize) -> Region {
        Region::new("Test", count, PointerWidth::X64)
    }

    #[test]
    fn test_new_region_sizes() {
        let region = hex64_region(50);
        assert_eq!(region.len(), 50);
        assert_eq!(region.size(), 400);
        assert_eq!(region.bytes().len(), 400);

        let region = Region::new("Test", 15, PointerWidth::X32);
        assert_eq!(region.size(), 60);
        assert!(region.fields().iter().all(|f| f.kind == FieldKind::Hex32));
    }

    #[test]
    fn test_resize_grow_appends_greedy_chunks() {
        let mut region = hex64_region(2);
        assert!(region.resize(13));
        assert_eq!(region.size(), 29);
        assert_eq!(
            &kinds(&region)[2..],
            &[FieldKind::Hex64, FieldKind::Hex32, FieldKind::Hex8]
        );
    }

    #[test]
    fn test_resize_grow_by_twelve() {
        let mut region = hex64_region(2);
        assert!(region.resize(12));
        assert_eq!(&kinds(&region)[2..], &[FieldKind::Hex64, FieldKind::Hex32]);
        assert_eq!(region.size(), 28);
    }

    #[test]
    fn test_resize_growth_zeroes_buffer() {
        let mut region = hex64_region(1);
        assert!(region.apply_snapshot(&[0xAA; 8]));
        assert!(region.resize(8));
        assert!(region.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_resize_shrink_removes_last_field_only() {
        let mut region = hex64_region(3);
        region.change_type(2, FieldKind::Int32, false);
        assert_eq!(region.size(), 24);

        assert!(region.resize(-8));
        assert_eq!(region.size(), 20);
        assert_eq!(
            kinds(&region),
            vec![FieldKind::Hex64, FieldKind::Hex64, FieldKind::Int32]
        );
    }

    #[test]
    fn test_resize_rejects_other_deltas() {
        let mut region = hex64_region(2);
        assert!(!region.resize(-4));
        assert!(!region.resize(-16));
        assert!(!region.resize(0));
        assert_eq!(region.size(), 16);

        let mut tiny = Region::new("Tiny", 1, PointerWidth::X32);
        assert!(!tiny.resize(-8));
        assert_eq!(tiny.len(), 1);
    }

    #[test]
    fn test_change_type_smaller_backfills() {
        let mut region = hex64_region(4);
        let inserted = region.change_type(0, FieldKind::Int16, false);
        assert_eq!(inserted, 2);
        assert_eq!(region.size(), 32);
        assert_eq!(
            &kinds(&region)[..3],
            &[FieldKind::Int16, FieldKind::Hex32, FieldKind::Hex16]
        );
        assert_eq!(region.fields()[0].name(), "Var_0");
        assert!(!region.fields()[0].is_locked());
    }

    #[test]
    fn test_change_type_larger_absorbs_following() {
        let mut region = hex64_region(4);
        let inserted = region.change_type(0, FieldKind::Vector3, false);
        assert_eq!(inserted, 1);
        assert_eq!(region.size(), 32);
        assert_eq!(
            kinds(&region),
            vec![
                FieldKind::Vector3,
                FieldKind::Hex32,
                FieldKind::Hex64,
                FieldKind::Hex64
            ]
        );
    }

    #[test]
    fn test_change_type_preserves_size_inside_region() {
        let mut region = hex64_region(25);
        for (index, kind) in [
            (0, FieldKind::Matrix3x3),
            (3, FieldKind::Bool),
            (5, FieldKind::Utf16),
            (1, FieldKind::Vector2d),
            (0, FieldKind::Hex8),
        ] {
            region.change_type(index, kind, false);
            assert_eq!(region.size(), 200, "after {kind}");
        }
    }

    #[test]
    fn test_change_type_larger_keeps_named_neighbour() {
        let mut region = hex64_region(4);
        region.change_type(1, FieldKind::Int32, false);
        assert!(region.rename(1, "health"));
        assert_eq!(region.fields()[1].offset_lock, Some(8));

        let inserted = region.change_type(0, FieldKind::Vector4, false);
        assert_eq!(inserted, 0);
        assert_eq!(
            kinds(&region),
            vec![
                FieldKind::Vector4,
                FieldKind::Int32,
                FieldKind::Hex32,
                FieldKind::Hex64,
                FieldKind::Hex64
            ]
        );
        let health = &region.fields()[1];
        assert_eq!(health.name(), "health");
        assert_eq!(health.offset_lock, Some(16));
        assert_eq!(region.size(), 40);
        assert_eq!(region.bytes().len(), 40);
    }

    #[test]
    fn test_change_type_larger_keeps_named_hex_neighbour() {
        let mut region = Region::from_fields(
            "Test",
            vec![
                Field::new(FieldKind::Hex32),
                Field::named(FieldKind::Hex32, "flags"),
                Field::new(FieldKind::Hex64),
            ],
        );
        region.change_type(0, FieldKind::Double, false);
        assert_eq!(
            kinds(&region),
            vec![FieldKind::Double, FieldKind::Hex32, FieldKind::Hex64]
        );
        assert_eq!(region.fields()[1].name(), "flags");
        assert_eq!(region.offsets()[1], 8);
    }

    #[test]
    fn test_change_type_preserves_size_for_every_kind_pair() {
        for from in FieldKind::iter() {
            for to in FieldKind::iter() {
                let mut region = hex64_region(20);
                region.change_type(1, from, false);
                assert_eq!(region.size(), 160, "{from}");
                region.change_type(1, to, false);
                assert_eq!(region.size(), 160, "{from} -> {to}");
                assert_eq!(region.bytes().len(), 160);
                assert_eq!(region.fields()[1].kind, to);
            }
        }
    }

    #[test]
    fn test_change_type_at_end_grows() {
        let mut region = hex64_region(2);
        let inserted = region.change_type(1, FieldKind::Matrix4x4, false);
        assert_eq!(inserted, 0);
        assert_eq!(region.size(), 72);
        assert_eq!(region.bytes().len(), 72);
    }

    #[test]
    fn test_change_type_keeps_name_and_lock() {
        let mut region = hex64_region(4);
        assert!(region.rename(1, "health"));
        assert_eq!(region.fields()[1].offset_lock, Some(8));

        region.change_type(1, FieldKind::Float, false);
        let field = &region.fields()[1];
        assert_eq!(field.name(), "health");
        assert_eq!(field.offset_lock, Some(8));

        // back to hex drops the name but keeps the lock
        region.change_type(1, FieldKind::Hex32, false);
        let field = &region.fields()[1];
        assert!(!field.has_name());
        assert_eq!(field.offset_lock, Some(8));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_change_type_out_of_range_panics() {
        let mut region = hex64_region(2);
        region.change_type(5, FieldKind::Int32, false);
    }

    #[test]
    fn test_change_type_selected_uses_running_offset() {
        let mut region = hex64_region(4);
        region.select(0);
        region.toggle_select(2);
        region.change_type_selected(FieldKind::Int32);

        assert_eq!(region.size(), 32);
        assert_eq!(
            kinds(&region),
            vec![
                FieldKind::Int32,
                FieldKind::Hex32,
                FieldKind::Hex64,
                FieldKind::Int32,
                FieldKind::Hex32,
                FieldKind::Hex64
            ]
        );
        assert_eq!(region.fields()[0].offset_lock, Some(0));
        assert_eq!(region.fields()[3].offset_lock, Some(16));
        assert_eq!(region.fields()[3].name(), "Var_1");
        assert_eq!(region.selected_indices(), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_normalize_pads_to_lock() {
        let mut field = Field::named(FieldKind::Int32, "id");
        field.offset_lock = Some(13);
        let mut region = Region::from_fields("Test", vec![field]);

        assert_eq!(
            kinds(&region)[..],
            [FieldKind::Int32],
            "construction does not normalize"
        );
        region.normalize();
        assert_eq!(
            kinds(&region),
            vec![
                FieldKind::Hex64,
                FieldKind::Hex32,
                FieldKind::Hex8,
                FieldKind::Int32
            ]
        );
        assert_eq!(region.size(), 17);
        assert_eq!(region.offsets()[3], 13);
    }

    #[test]
    fn test_normalize_reanchors_overrun_lock() {
        let mut field = Field::named(FieldKind::Int32, "id");
        field.offset_lock = Some(4);
        let mut region = Region::from_fields("Test", vec![Field::new(FieldKind::Hex64), field]);
        region.normalize();
        assert_eq!(region.len(), 2);
        assert_eq!(region.fields()[1].offset_lock, Some(8));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut region = hex64_region(6);
        region.rename(2, "a");
        region.select(0);
        region.change_type_selected(FieldKind::Vector4d);
        region.normalize();
        let once = region.fields().to_vec();
        region.normalize();
        assert_eq!(region.fields(), &once[..]);

        for (offset, field) in region.offsets().into_iter().zip(region.fields()) {
            if let Some(lock) = field.offset_lock {
                assert_eq!(lock as usize, offset);
            }
        }
    }

    fn locked(kind: FieldKind, lock: u32) -> Field {
        let mut field = Field::named(kind, "f");
        field.offset_lock = Some(lock);
        field
    }

    #[test]
    fn test_normalize_layouts_settle() {
        let layouts = vec![
            vec![locked(FieldKind::Int32, 13)],
            vec![
                Field::new(FieldKind::Hex64),
                locked(FieldKind::Int32, 4),
                locked(FieldKind::Float, 20),
            ],
            vec![
                locked(FieldKind::Double, 0),
                locked(FieldKind::Vector3, 8),
                locked(FieldKind::Bool, 30),
                Field::new(FieldKind::Hex16),
            ],
            vec![locked(FieldKind::Utf8, 2), locked(FieldKind::Int16, 10)],
            vec![
                locked(FieldKind::Int64, 8),
                locked(FieldKind::Int64, 8),
                Field::new(FieldKind::Hex8),
            ],
            Vec::new(),
        ];

        for fields in layouts {
            let mut region = Region::from_fields("Test", fields);
            region.normalize();

            let total: usize = region.fields().iter().map(Field::byte_size).sum();
            assert_eq!(region.bytes().len(), total);

            let mut seen = std::collections::HashSet::new();
            for (offset, field) in region.offsets().into_iter().zip(region.fields()) {
                if let Some(lock) = field.offset_lock {
                    assert_eq!(lock as usize, offset);
                    assert!(seen.insert(lock), "duplicate lock {lock}");
                }
            }

            let once = region.fields().to_vec();
            region.normalize();
            assert_eq!(region.fields(), &once[..]);
        }
    }

    #[test]
    fn test_lock_only_typed_fields() {
        let mut region = hex64_region(2);
        assert!(!region.lock(0));
        region.change_type(1, FieldKind::Double, false);
        assert!(region.lock(1));
        assert_eq!(region.fields()[1].offset_lock, Some(8));
        assert!(region.unlock(1));
        assert!(!region.fields()[1].is_locked());
        assert!(!region.lock(9));
    }

    #[test]
    fn test_selection() {
        let mut region = hex64_region(5);
        region.select(3);
        region.select_range(1);
        assert_eq!(region.selected_indices(), vec![1, 2, 3]);

        region.select(1);
        region.select_range(3);
        assert_eq!(region.selected_indices(), vec![1, 2, 3]);

        region.toggle_select(2);
        assert_eq!(region.selected_indices(), vec![1, 3]);

        region.clear_selection();
        region.select_range(4);
        assert_eq!(region.selected_indices(), vec![4]);
    }

    #[test]
    fn test_delete_selected() {
        let mut region = hex64_region(4);
        region.select(1);
        region.toggle_select(2);
        assert_eq!(region.delete_selected(), 2);
        assert_eq!(region.len(), 2);
        assert_eq!(region.size(), 16);
        assert_eq!(region.delete_selected(), 0);
    }

    #[test]
    fn test_apply_snapshot_requires_exact_length() {
        let mut region = hex64_region(2);
        assert!(!region.apply_snapshot(&[1; 8]));
        assert!(!region.apply_snapshot(&[1; 24]));
        assert!(region.apply_snapshot(&[1; 16]));
        assert!(region.bytes().iter().all(|&b| b == 1));
    }

    #[test]
    fn test_values_decode_buffer() {
        let mut region = Region::from_fields(
            "Test",
            vec![Field::new(FieldKind::Int32), Field::new(FieldKind::Float)],
        );
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-7i32).to_le_bytes());
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        assert!(region.apply_snapshot(&bytes));

        let values: Vec<_> = region.values().map(|(o, _, v)| (o, v)).collect();
        assert_eq!(
            values,
            vec![
                (0, Some(FieldValue::Int(-7))),
                (4, Some(FieldValue::Float(0.5)))
            ]
        );
    }

    #[test]
    fn test_set_address() {
        let mut region = hex64_region(1);
        region.set_address(0x1000);
        assert_eq!(region.address(), 0x1000);
    }
}
