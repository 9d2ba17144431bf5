// crates/kryon-core/src/style.rs
use crate::Property;

/// A named style block. Properties keep declaration order because the
/// cascade applies them in file order; a map would lose that.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// 1-based; elements reference styles by this ID, 0 meaning "none".
    pub id: u8,
    pub name_index: u8,
    pub properties: Vec<Property>,
}
