// crates/kryon-layout/src/flex.rs
use kryon_core::{
    LAYOUT_ABSOLUTE_BIT, LAYOUT_ALIGNMENT_MASK, LAYOUT_ALIGNMENT_SHIFT, LAYOUT_DIRECTION_MASK,
    LAYOUT_GROW_BIT, LAYOUT_WRAP_BIT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutFlags {
    pub direction: LayoutDirection,
    pub alignment: LayoutAlignment,
    /// Reserved: parsed but single-line layout is always produced.
    pub wrap: bool,
    pub grow: bool,
    pub absolute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutDirection {
    Row,
    Column,
    RowReverse,
    ColumnReverse,
}

impl LayoutDirection {
    pub fn is_row(&self) -> bool {
        matches!(self, LayoutDirection::Row | LayoutDirection::RowReverse)
    }

    pub fn is_reversed(&self) -> bool {
        matches!(
            self,
            LayoutDirection::RowReverse | LayoutDirection::ColumnReverse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutAlignment {
    Start,
    Center,
    End,
    SpaceBetween,
}

impl LayoutFlags {
    pub fn from_bits(bits: u8) -> Self {
        let direction = match bits & LAYOUT_DIRECTION_MASK {
            0x00 => LayoutDirection::Row,
            0x01 => LayoutDirection::Column,
            0x02 => LayoutDirection::RowReverse,
            _ => LayoutDirection::ColumnReverse,
        };

        let alignment = match (bits >> LAYOUT_ALIGNMENT_SHIFT) & LAYOUT_ALIGNMENT_MASK {
            0x00 => LayoutAlignment::Start,
            0x01 => LayoutAlignment::Center,
            0x02 => LayoutAlignment::End,
            _ => LayoutAlignment::SpaceBetween,
        };

        Self {
            direction,
            alignment,
            wrap: bits & LAYOUT_WRAP_BIT != 0,
            grow: bits & LAYOUT_GROW_BIT != 0,
            absolute: bits & LAYOUT_ABSOLUTE_BIT != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_field() {
        let flags = LayoutFlags::from_bits(0x01 | (0x03 << 2) | 0x20 | 0x40);
        assert_eq!(flags.direction, LayoutDirection::Column);
        assert_eq!(flags.alignment, LayoutAlignment::SpaceBetween);
        assert!(!flags.wrap);
        assert!(flags.grow);
        assert!(flags.absolute);
    }

    #[test]
    fn alignment_value_three_is_space_between() {
        let flags = LayoutFlags::from_bits(0x03 << 2);
        assert_eq!(flags.alignment, LayoutAlignment::SpaceBetween);
    }
}
