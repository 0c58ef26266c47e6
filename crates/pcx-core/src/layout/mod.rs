//! Typed field model for reconstructed structures.

mod export;
mod field;
mod kind;
mod region;
mod value;

pub use field::{Field, MAX_NAME_LEN};
pub use kind::{FieldKind, KindInfo, TEXT_BYTES, hex_chunks};
pub use region::Region;
pub use value::FieldValue;
