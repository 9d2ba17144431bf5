// crates/kryon-core/src/krb.rs
use crate::{
    color_from_rgba8, AnimationRef, ByteReader, CustomProperty, Element, ElementHeader,
    ElementType, EventBinding, EventType, KryonError, Property, PropertyId, PropertyValue,
    ResourceEntry, ResourcePayload, ResourceType, Result, Style, TemplateStore, ValueType,
    ELEMENT_HEADER_SIZE, RESOURCE_FORMAT_EXTERNAL, RESOURCE_FORMAT_INLINE,
};
use bitflags::bitflags;
use tracing::warn;

pub const KRB_MAGIC: &[u8; 4] = b"KRB1";
pub const KRB_VERSION_MAJOR: u8 = 1;
pub const KRB_VERSION_MINOR: u8 = 0;
pub const KRB_HEADER_SIZE: usize = 42;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u16 {
        const HAS_STYLES     = 1 << 0;
        const HAS_ANIMATIONS = 1 << 1;
        const HAS_RESOURCES  = 1 << 2;
        /// Reserved; no compressed files exist yet.
        const COMPRESSED     = 1 << 3;
        const FIXED_POINT    = 1 << 4;
        const EXTENDED_COLOR = 1 << 5;
        const HAS_APP        = 1 << 6;
    }
}

/// The fixed 42-byte file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrbHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: HeaderFlags,
    pub element_count: u16,
    pub style_count: u16,
    pub animation_count: u16,
    pub string_count: u16,
    pub resource_count: u16,
    pub element_offset: u32,
    pub style_offset: u32,
    pub animation_offset: u32,
    pub string_offset: u32,
    pub resource_offset: u32,
    pub total_size: u32,
}

/// A parsed KRB file. Immutable once loaded; the tree builder and layout
/// engine only ever read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub header: KrbHeader,
    pub strings: Vec<String>,
    pub resources: Vec<ResourceEntry>,
    pub styles: Vec<Style>,
    pub elements: Vec<Element>,
    /// Absolute file offset of each element's header, index-aligned with
    /// `elements`. Child references resolve against this side array.
    pub element_offsets: Vec<u32>,
    pub templates: TemplateStore,
}

impl Document {
    /// Resolves a string-table index, treating 0 as "unset".
    pub fn string(&self, index: u8) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Looks a style up by its 1-based ID.
    pub fn style_by_id(&self, style_id: u8) -> Option<&Style> {
        if style_id == 0 {
            return None;
        }
        self.styles.iter().find(|s| s.id == style_id)
    }

    pub fn resource(&self, index: u8) -> Option<&ResourceEntry> {
        self.resources.get(index as usize)
    }
}

/// Table bounds shared by element-stream and template-substream decoding;
/// string/style/resource indices inside a template resolve against the same
/// file-wide tables.
#[derive(Debug, Clone, Copy)]
pub struct TableLimits {
    pub string_count: usize,
    pub style_count: usize,
    pub resource_count: usize,
}

impl TableLimits {
    fn of_header(header: &KrbHeader) -> Self {
        Self {
            string_count: header.string_count as usize,
            style_count: header.style_count as usize,
            resource_count: header.resource_count as usize,
        }
    }

    pub fn of_document(doc: &Document) -> Self {
        Self::of_header(&doc.header)
    }
}

/// A decoded element substream: the elements in stream order plus each
/// element's offset relative to the substream start.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStream {
    pub elements: Vec<Element>,
    pub offsets: Vec<u32>,
}

pub fn parse(data: &[u8]) -> Result<Document> {
    let header = parse_header(data)?;

    let strings = parse_string_table(data, &header)?;
    let limits = TableLimits::of_header(&header);

    let resources = if header.flags.contains(HeaderFlags::HAS_RESOURCES) {
        parse_resource_table(data, &header, &limits)?
    } else {
        Vec::new()
    };

    let styles = if header.flags.contains(HeaderFlags::HAS_STYLES) {
        parse_style_table(data, &header, &limits)?
    } else {
        Vec::new()
    };

    if header.flags.contains(HeaderFlags::HAS_ANIMATIONS) && header.animation_count > 0 {
        // Defined but never executed; the section is skipped wholesale.
        warn!(
            count = header.animation_count,
            "animation section present and ignored"
        );
    }

    let mut reader = ByteReader::new(data);
    reader.seek(header.element_offset as usize)?;
    let mut elements = Vec::with_capacity(header.element_count as usize);
    let mut element_offsets = Vec::with_capacity(header.element_count as usize);
    for _ in 0..header.element_count {
        element_offsets.push(reader.tell() as u32);
        elements.push(parse_element(&mut reader, &limits)?);
    }

    if header.flags.contains(HeaderFlags::HAS_APP) {
        match elements.first() {
            Some(first) if first.header.element_type == ElementType::App => {}
            Some(first) => warn!(
                actual = ?first.header.element_type,
                "HAS_APP is set but element 0 is not an App element"
            ),
            None => warn!("HAS_APP is set but the file has no elements"),
        }
    }

    let templates = TemplateStore::from_resources(&resources, &strings);

    Ok(Document {
        header,
        strings,
        resources,
        styles,
        elements,
        element_offsets,
        templates,
    })
}

pub fn load_krb_file(path: &str) -> Result<Document> {
    let data = std::fs::read(path)?;
    parse(&data)
}

fn parse_header(data: &[u8]) -> Result<KrbHeader> {
    let mut reader = ByteReader::new(data);

    let magic_bytes = reader.read_bytes(4)?;
    let mut magic = [0u8; 4];
    magic.copy_from_slice(magic_bytes);
    if &magic != KRB_MAGIC {
        return Err(KryonError::BadMagic(magic));
    }

    let version = reader.read_u16_le()?;
    let version_major = (version & 0xFF) as u8;
    let version_minor = (version >> 8) as u8;
    if version_major != KRB_VERSION_MAJOR {
        warn!(
            "KRB version mismatch (found {}.{}, supported {}.{}); attempting to read anyway",
            version_major, version_minor, KRB_VERSION_MAJOR, KRB_VERSION_MINOR
        );
    }

    let flags = HeaderFlags::from_bits_retain(reader.read_u16_le()?);
    let element_count = reader.read_u16_le()?;
    let style_count = reader.read_u16_le()?;
    let animation_count = reader.read_u16_le()?;
    let string_count = reader.read_u16_le()?;
    let resource_count = reader.read_u16_le()?;
    let element_offset = reader.read_u32_le()?;
    let style_offset = reader.read_u32_le()?;
    let animation_offset = reader.read_u32_le()?;
    let string_offset = reader.read_u32_le()?;
    let resource_offset = reader.read_u32_le()?;
    let total_size = reader.read_u32_le()?;

    let header = KrbHeader {
        version_major,
        version_minor,
        flags,
        element_count,
        style_count,
        animation_count,
        string_count,
        resource_count,
        element_offset,
        style_offset,
        animation_offset,
        string_offset,
        resource_offset,
        total_size,
    };

    validate_offsets(&header, data.len())?;
    Ok(header)
}

fn validate_offsets(header: &KrbHeader, buffer_len: usize) -> Result<()> {
    if (header.total_size as usize) < KRB_HEADER_SIZE {
        return Err(KryonError::CorruptOffsets);
    }

    let bound = buffer_len.min(header.total_size as usize);
    let sections = [
        (header.element_offset, header.element_count > 0),
        (
            header.style_offset,
            header.flags.contains(HeaderFlags::HAS_STYLES),
        ),
        (
            header.resource_offset,
            header.flags.contains(HeaderFlags::HAS_RESOURCES),
        ),
        (header.string_offset, true),
    ];
    for (offset, required) in sections {
        if !required {
            continue;
        }
        let offset = offset as usize;
        if offset < KRB_HEADER_SIZE || offset >= bound {
            return Err(KryonError::CorruptOffsets);
        }
    }
    Ok(())
}

fn parse_string_table(data: &[u8], header: &KrbHeader) -> Result<Vec<String>> {
    let mut reader = ByteReader::new(data);
    reader.seek(header.string_offset as usize)?;

    let stored_count = reader.read_u16_le()?;
    if stored_count != header.string_count {
        warn!(
            header = header.string_count,
            section = stored_count,
            "string count disagreement; trusting the header"
        );
    }

    let mut strings = Vec::with_capacity(header.string_count as usize);
    for _ in 0..header.string_count {
        strings.push(reader.read_length_prefixed_string()?);
    }
    Ok(strings)
}

fn parse_resource_table(
    data: &[u8],
    header: &KrbHeader,
    limits: &TableLimits,
) -> Result<Vec<ResourceEntry>> {
    let mut reader = ByteReader::new(data);
    reader.seek(header.resource_offset as usize)?;

    let stored_count = reader.read_u16_le()?;
    if stored_count != header.resource_count {
        warn!(
            header = header.resource_count,
            section = stored_count,
            "resource count disagreement; trusting the header"
        );
    }

    let mut resources = Vec::with_capacity(header.resource_count as usize);
    for _ in 0..header.resource_count {
        let resource_type = ResourceType::from_code(reader.read_u8()?);
        let name_index = reader.read_u8()?;
        check_string_index(name_index, limits)?;
        let format = reader.read_u8()?;
        let payload = match format {
            RESOURCE_FORMAT_EXTERNAL => {
                let path_index = reader.read_u8()?;
                check_string_index(path_index, limits)?;
                ResourcePayload::External { path_index }
            }
            RESOURCE_FORMAT_INLINE => {
                let size = reader.read_u16_le()? as usize;
                ResourcePayload::Inline {
                    data: reader.read_bytes(size)?.to_vec(),
                }
            }
            other => return Err(KryonError::UnknownResourceFormat(other)),
        };
        resources.push(ResourceEntry {
            resource_type,
            name_index,
            payload,
        });
    }
    Ok(resources)
}

fn parse_style_table(data: &[u8], header: &KrbHeader, limits: &TableLimits) -> Result<Vec<Style>> {
    let mut reader = ByteReader::new(data);
    reader.seek(header.style_offset as usize)?;

    let mut styles = Vec::with_capacity(header.style_count as usize);
    for _ in 0..header.style_count {
        let id = reader.read_u8()?;
        let name_index = reader.read_u8()?;
        check_string_index(name_index, limits)?;
        let property_count = reader.read_u8()?;

        let mut properties = Vec::with_capacity(property_count as usize);
        for _ in 0..property_count {
            properties.push(parse_standard_property(&mut reader, limits)?);
        }
        styles.push(Style {
            id,
            name_index,
            properties,
        });
    }
    Ok(styles)
}

/// Decodes a raw element substream (a component template, or any detached
/// element run). Elements are read back to back until the bytes are
/// exhausted; offsets are relative to the substream start.
pub fn parse_element_substream(bytes: &[u8], limits: &TableLimits) -> Result<ElementStream> {
    let mut reader = ByteReader::new(bytes);
    let mut elements = Vec::new();
    let mut offsets = Vec::new();
    while reader.remaining() >= ELEMENT_HEADER_SIZE {
        offsets.push(reader.tell() as u32);
        elements.push(parse_element(&mut reader, limits)?);
    }
    if reader.remaining() > 0 {
        warn!(
            trailing = reader.remaining(),
            "element substream has trailing bytes shorter than a header"
        );
    }
    Ok(ElementStream { elements, offsets })
}

fn parse_element(reader: &mut ByteReader<'_>, limits: &TableLimits) -> Result<Element> {
    let element_type = ElementType::from_code(reader.read_u8()?);
    let id_index = reader.read_u8()?;
    check_string_index(id_index, limits)?;
    let pos_x = reader.read_u16_le()?;
    let pos_y = reader.read_u16_le()?;
    let width = reader.read_u16_le()?;
    let height = reader.read_u16_le()?;
    let layout = reader.read_u8()?;
    let style_id = reader.read_u8()?;
    if style_id as usize > limits.style_count {
        return Err(KryonError::OutOfRangeIndex {
            kind: "style",
            index: style_id as usize,
            limit: limits.style_count,
        });
    }
    let property_count = reader.read_u8()?;
    let child_count = reader.read_u8()?;
    let event_count = reader.read_u8()?;
    let animation_count = reader.read_u8()?;
    let custom_prop_count = reader.read_u8()?;

    let mut properties = Vec::with_capacity(property_count as usize);
    for _ in 0..property_count {
        properties.push(parse_standard_property(reader, limits)?);
    }

    let mut custom_properties = Vec::with_capacity(custom_prop_count as usize);
    for _ in 0..custom_prop_count {
        let key_index = reader.read_u8()?;
        check_string_index(key_index, limits)?;
        let value_type = reader.read_u8()?;
        let size = reader.read_u8()?;
        let value = parse_property_value(reader, value_type, size, limits)?;
        custom_properties.push(CustomProperty { key_index, value });
    }

    let mut events = Vec::with_capacity(event_count as usize);
    for _ in 0..event_count {
        let event_type = EventType::from_code(reader.read_u8()?);
        let handler_index = reader.read_u8()?;
        check_string_index(handler_index, limits)?;
        events.push(EventBinding {
            event_type,
            handler_index,
        });
    }

    let mut animations = Vec::with_capacity(animation_count as usize);
    for _ in 0..animation_count {
        animations.push(AnimationRef {
            animation_index: reader.read_u8()?,
            trigger: reader.read_u8()?,
        });
    }

    let mut child_offsets = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        child_offsets.push(reader.read_u16_le()?);
    }

    Ok(Element {
        header: ElementHeader {
            element_type,
            id_index,
            pos_x,
            pos_y,
            width,
            height,
            layout,
            style_id,
        },
        properties,
        custom_properties,
        events,
        animations,
        child_offsets,
    })
}

fn parse_standard_property(reader: &mut ByteReader<'_>, limits: &TableLimits) -> Result<Property> {
    let id = PropertyId::from_code(reader.read_u8()?);
    let value_type = reader.read_u8()?;
    let size = reader.read_u8()?;
    let value = parse_property_value(reader, value_type, size, limits)?;
    Ok(Property { id, value })
}

/// Narrows simple value types eagerly; compound and mis-sized payloads are
/// kept as tagged raw bytes so nothing is lost on re-encode.
fn parse_property_value(
    reader: &mut ByteReader<'_>,
    value_type: u8,
    size: u8,
    limits: &TableLimits,
) -> Result<PropertyValue> {
    let vt = ValueType::from_code(value_type);
    let size = size as usize;
    Ok(match (vt, size) {
        (ValueType::None, 0) => PropertyValue::None,
        (ValueType::Byte, 1) => PropertyValue::Byte(reader.read_u8()?),
        (ValueType::Short, 2) => PropertyValue::Short(reader.read_u16_le()?),
        (ValueType::Color, 4) => {
            let bytes = reader.read_bytes(4)?;
            PropertyValue::Color(color_from_rgba8([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        (ValueType::StringIndex, 1) => {
            let index = reader.read_u8()?;
            check_string_index(index, limits)?;
            PropertyValue::StringIndex(index)
        }
        (ValueType::ResourceIndex, 1) => {
            let index = reader.read_u8()?;
            // 0 is "unset", mirroring string indices.
            if index != 0 && index as usize >= limits.resource_count {
                return Err(KryonError::OutOfRangeIndex {
                    kind: "resource",
                    index: index as usize,
                    limit: limits.resource_count,
                });
            }
            PropertyValue::ResourceIndex(index)
        }
        (ValueType::Percentage, 2) => {
            PropertyValue::Percentage(reader.read_u16_le()? as f32 / 256.0)
        }
        (ValueType::Enum, 1) => PropertyValue::Enum(reader.read_u8()?),
        (value_type, size) => {
            if !matches!(
                value_type,
                ValueType::Rect
                    | ValueType::EdgeInsets
                    | ValueType::Vector
                    | ValueType::Custom
                    | ValueType::Color
                    | ValueType::Other(_)
            ) {
                warn!(?value_type, size, "unexpected payload size; keeping raw bytes");
            }
            PropertyValue::Raw {
                value_type,
                bytes: reader.read_bytes(size)?.to_vec(),
            }
        }
    })
}

fn check_string_index(index: u8, limits: &TableLimits) -> Result<()> {
    // 0 always means "unset" and is legal even in a string-less file.
    if index != 0 && index as usize >= limits.string_count {
        return Err(KryonError::OutOfRangeIndex {
            kind: "string",
            index: index as usize,
            limit: limits.string_count,
        });
    }
    Ok(())
}
