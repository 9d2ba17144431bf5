// crates/kryon-core/src/lib.rs
pub mod reader;
pub mod property;
pub mod element;
pub mod style;
pub mod resource;
pub mod krb;
pub mod writer;
pub mod template;
pub mod tree;

pub use reader::*;
pub use property::*;
pub use element::*;
pub use style::*;
pub use resource::*;
pub use krb::*;
pub use writer::*;
pub use template::*;
pub use tree::*;

#[derive(Debug, thiserror::Error)]
pub enum KryonError {
    #[error("invalid magic number {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("section offsets exceed the declared file bounds")]
    CorruptOffsets,

    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("seek target {target} is outside the {len}-byte buffer")]
    OutOfBounds { target: usize, len: usize },

    #[error("string length prefix at offset {0} runs past the end of the data")]
    BadStringLength(usize),

    #[error("unknown resource format 0x{0:02X}")]
    UnknownResourceFormat(u8),

    #[error("{kind} index {index} out of range (limit {limit})")]
    OutOfRangeIndex {
        kind: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("child offset {offset} of element {parent} resolves to no element header")]
    LinkFailure { parent: usize, offset: u32 },

    #[error("component not found: {0}")]
    MissingComponent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KryonError>;
