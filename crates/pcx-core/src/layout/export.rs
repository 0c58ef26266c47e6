use std::fmt::Write;

use super::region::Region;

impl Region {
    /// Render the region as a C++ class declaration.
    ///
    /// Runs of unnamed hex fields collapse into one `BYTE pad_XXXX[n]`
    /// member; a named hex field becomes a byte array of its size.
    pub fn export_definition(&mut self) -> String {
        self.normalize();

        let mut out = format!("class {} {{\npublic:", self.name);
        let mut pad: Option<(usize, usize)> = None;

        for (offset, field) in self.offsets().into_iter().zip(self.fields()) {
            if field.is_padding() {
                let (start, len) = pad.unwrap_or((offset, 0));
                pad = Some((start, len + field.byte_size()));
                continue;
            }
            if let Some((start, len)) = pad.take() {
                let _ = write!(out, "\n\tBYTE pad_{start:04X}[{len}];");
            }

            let info = field.kind.info();
            let token = info.code_type.unwrap_or("BYTE");
            let name = if field.has_name() {
                field.name().to_string()
            } else {
                format!("var_{offset:04X}")
            };
            if field.kind.is_hex() {
                let _ = write!(out, "\n\tBYTE {name}[{}];", field.byte_size());
                continue;
            }
            match info.array_len {
                Some(len) => {
                    let _ = write!(out, "\n\t{token} {name}[{len}];");
                }
                None => {
                    let _ = write!(out, "\n\t{token} {name};");
                }
            }
        }

        if let Some((start, len)) = pad {
            let _ = write!(out, "\n\tBYTE pad_{start:04X}[{len}];");
        }
        out.push_str("\n};");
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::layout::{Field, FieldKind, Region};
    use crate::memory::PointerWidth;

    #[test]
    fn test_export_all_padding() {
        let mut region = Region::new("Empty", 2, PointerWidth::X64);
        assert_eq!(
            region.export_definition(),
            "class Empty {\npublic:\n\tBYTE pad_0000[16];\n};"
        );
    }

    #[test]
    fn test_export_mixed_members() {
        let mut region = Region::new("Player", 4, PointerWidth::X64);
        region.change_type(1, FieldKind::Int32, false);
        region.rename(1, "health");
        region.change_type(3, FieldKind::Float, false);

        let expected = "class Player {\npublic:\
            \n\tBYTE pad_0000[8];\
            \n\tint health;\
            \n\tBYTE pad_000C[4];\
            \n\tfloat Var_1;\
            \n\tBYTE pad_0014[12];\
            \n};";
        assert_eq!(region.export_definition(), expected);
    }

    #[test]
    fn test_export_text_and_unnamed() {
        let mut region = Region::from_fields(
            "Text",
            vec![
                Field::new(FieldKind::Double),
                Field::named(FieldKind::Utf16, "title"),
                Field::new(FieldKind::Utf8),
            ],
        );
        let expected = "class Text {\npublic:\
            \n\tdouble var_0000;\
            \n\twchar_t title[32];\
            \n\tchar var_0048[64];\
            \n};";
        assert_eq!(region.export_definition(), expected);
    }

    #[test]
    fn test_export_named_hex_field() {
        let mut region = Region::from_fields(
            "Flags",
            vec![
                Field::new(FieldKind::Hex32),
                Field::named(FieldKind::Hex32, "flags"),
                Field::new(FieldKind::Hex64),
            ],
        );
        let expected = "class Flags {\npublic:\
            \n\tBYTE pad_0000[4];\
            \n\tBYTE flags[4];\
            \n\tBYTE pad_0008[8];\
            \n};";
        assert_eq!(region.export_definition(), expected);
    }

    #[test]
    fn test_export_empty_region() {
        let mut region = Region::from_fields("Nothing", Vec::new());
        assert_eq!(region.export_definition(), "class Nothing {\npublic:\n};");
    }
}
