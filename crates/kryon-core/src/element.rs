// crates/kryon-core/src/element.rs
use crate::{CustomProperty, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    App,
    Container,
    Text,
    Image,
    Button,
    Input,
    Custom(u8),
}

impl ElementType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => ElementType::App,
            0x01 => ElementType::Container,
            0x02 => ElementType::Text,
            0x03 => ElementType::Image,
            0x10 => ElementType::Button,
            0x11 => ElementType::Input,
            other => ElementType::Custom(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ElementType::App => 0x00,
            ElementType::Container => 0x01,
            ElementType::Text => 0x02,
            ElementType::Image => 0x03,
            ElementType::Button => 0x10,
            ElementType::Input => 0x11,
            ElementType::Custom(code) => *code,
        }
    }

    /// Element kinds whose intrinsic size comes from their text content.
    pub fn is_text_like(&self) -> bool {
        matches!(self, ElementType::Text | ElementType::Button | ElementType::Input)
    }
}

/// Layout byte decomposition. Bits 0-1 direction, bits 2-3 main-axis
/// alignment, bit 4 wrap (reserved), bit 5 grow, bit 6 absolute.
pub const LAYOUT_DIRECTION_MASK: u8 = 0x03;
pub const LAYOUT_ALIGNMENT_SHIFT: u8 = 2;
pub const LAYOUT_ALIGNMENT_MASK: u8 = 0x03;
pub const LAYOUT_WRAP_BIT: u8 = 0x10;
pub const LAYOUT_GROW_BIT: u8 = 0x20;
pub const LAYOUT_ABSOLUTE_BIT: u8 = 0x40;

/// The fixed 17-byte element header as stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementHeader {
    pub element_type: ElementType,
    /// String-table index of the element's ID, 0 = anonymous.
    pub id_index: u8,
    pub pos_x: u16,
    pub pos_y: u16,
    pub width: u16,
    pub height: u16,
    pub layout: u8,
    /// 1-based style reference, 0 = none.
    pub style_id: u8,
}

pub const ELEMENT_HEADER_SIZE: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Click,
    Press,
    Release,
    Hover,
    Focus,
    Blur,
    Change,
    Submit,
    Other(u8),
}

impl EventType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => EventType::Click,
            0x02 => EventType::Press,
            0x03 => EventType::Release,
            0x04 => EventType::Hover,
            0x05 => EventType::Focus,
            0x06 => EventType::Blur,
            0x07 => EventType::Change,
            0x08 => EventType::Submit,
            other => EventType::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            EventType::Click => 0x01,
            EventType::Press => 0x02,
            EventType::Release => 0x03,
            EventType::Hover => 0x04,
            EventType::Focus => 0x05,
            EventType::Blur => 0x06,
            EventType::Change => 0x07,
            EventType::Submit => 0x08,
            EventType::Other(code) => *code,
        }
    }
}

/// An event binding: event kind plus the string-table index of the handler
/// name it dispatches to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventBinding {
    pub event_type: EventType,
    pub handler_index: u8,
}

/// A reference into the animation section. The animation section itself is
/// preserved but never executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationRef {
    pub animation_index: u8,
    pub trigger: u8,
}

/// A fully decoded element: fixed header plus the variable tail, in wire
/// order. Child references stay as raw relative offsets; the tree builder
/// resolves them against the per-element offset side array.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub header: ElementHeader,
    pub properties: Vec<Property>,
    pub custom_properties: Vec<CustomProperty>,
    pub events: Vec<EventBinding>,
    pub animations: Vec<AnimationRef>,
    pub child_offsets: Vec<u16>,
}

impl Element {
    pub fn new(element_type: ElementType) -> Self {
        Self {
            header: ElementHeader {
                element_type,
                id_index: 0,
                pos_x: 0,
                pos_y: 0,
                width: 0,
                height: 0,
                layout: 0,
                style_id: 0,
            },
            properties: Vec::new(),
            custom_properties: Vec::new(),
            events: Vec::new(),
            animations: Vec::new(),
            child_offsets: Vec::new(),
        }
    }

    /// Total encoded size of this element: header plus tail.
    pub fn encoded_size(&self) -> usize {
        let properties: usize = self
            .properties
            .iter()
            .map(|p| 3 + p.value.encoded_size())
            .sum();
        let custom: usize = self
            .custom_properties
            .iter()
            .map(|p| 3 + p.value.encoded_size())
            .sum();
        ELEMENT_HEADER_SIZE
            + properties
            + custom
            + self.events.len() * 2
            + self.animations.len() * 2
            + self.child_offsets.len() * 2
    }
}
