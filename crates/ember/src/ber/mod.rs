//! Basic Encoding Rules primitives used by the Glow codec.

mod reader;
mod tag;
mod writer;

pub use reader::BerReader;
pub use tag::{Tag, TagClass};
pub use writer::BerWriter;

/// Deepest nesting of constructed values or tree elements accepted on decode.
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("invalid length encoding")]
    InvalidLength,
    #[error("expected {expected}, found {found}")]
    UnexpectedTag { expected: Tag, found: Tag },
    #[error("unimplemented type {0}")]
    UnimplementedType(Tag),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid {0} value")]
    InvalidValue(&'static str),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("{0} trailing bytes after message")]
    TrailingData(usize),
}
