// crates/kryon-core/src/writer.rs
use crate::{
    color_to_rgba8, parse, Document, Element, ElementType, HeaderFlags, KrbHeader, Property,
    PropertyValue, ResourceEntry, ResourcePayload, ResourceType, Result, Style, KRB_HEADER_SIZE,
    KRB_MAGIC, KRB_VERSION_MAJOR, KRB_VERSION_MINOR, RESOURCE_FORMAT_EXTERNAL,
    RESOURCE_FORMAT_INLINE,
};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::warn;

/// Serializes a document back to a bit-exact KRB byte stream. Section order
/// is string table, element stream, style table, resource table; offsets and
/// counts are recomputed from the document's content. The animation section
/// is never re-emitted (it is preserved-but-ignored on read).
pub fn serialize(doc: &Document) -> Result<Vec<u8>> {
    let string_size: usize = 2 + doc
        .strings
        .iter()
        .map(|s| 1 + s.len().min(u8::MAX as usize))
        .sum::<usize>();
    let element_size: usize = doc.elements.iter().map(Element::encoded_size).sum();
    let style_size: usize = doc
        .styles
        .iter()
        .map(|s| {
            3 + s
                .properties
                .iter()
                .map(|p| 3 + p.value.encoded_size())
                .sum::<usize>()
        })
        .sum();
    let resource_size: usize = 2 + doc
        .resources
        .iter()
        .map(ResourceEntry::encoded_size)
        .sum::<usize>();

    let string_offset = KRB_HEADER_SIZE;
    let element_offset = string_offset + string_size;
    let style_offset = element_offset + element_size;
    let resource_offset = style_offset + style_size;
    let total_size = if doc.resources.is_empty() {
        resource_offset
    } else {
        resource_offset + resource_size
    };

    let mut flags = doc.header.flags;
    flags.set(HeaderFlags::HAS_STYLES, !doc.styles.is_empty());
    flags.set(HeaderFlags::HAS_RESOURCES, !doc.resources.is_empty());
    flags.set(HeaderFlags::HAS_ANIMATIONS, false);

    let mut out = Vec::with_capacity(total_size);
    out.extend_from_slice(KRB_MAGIC);
    let version = ((doc.header.version_minor as u16) << 8) | doc.header.version_major as u16;
    out.write_u16::<LittleEndian>(version)?;
    out.write_u16::<LittleEndian>(flags.bits())?;
    out.write_u16::<LittleEndian>(doc.elements.len() as u16)?;
    out.write_u16::<LittleEndian>(doc.styles.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?; // animation count
    out.write_u16::<LittleEndian>(doc.strings.len() as u16)?;
    out.write_u16::<LittleEndian>(doc.resources.len() as u16)?;
    out.write_u32::<LittleEndian>(element_offset as u32)?;
    out.write_u32::<LittleEndian>(if doc.styles.is_empty() {
        0
    } else {
        style_offset as u32
    })?;
    out.write_u32::<LittleEndian>(0)?; // animation section offset
    out.write_u32::<LittleEndian>(string_offset as u32)?;
    out.write_u32::<LittleEndian>(if doc.resources.is_empty() {
        0
    } else {
        resource_offset as u32
    })?;
    out.write_u32::<LittleEndian>(total_size as u32)?;

    write_string_table(&mut out, &doc.strings)?;
    for element in &doc.elements {
        write_element(&mut out, element)?;
    }
    for style in &doc.styles {
        write_style(&mut out, style)?;
    }
    if !doc.resources.is_empty() {
        write_resource_table(&mut out, &doc.resources)?;
    }

    debug_assert_eq!(out.len(), total_size);
    Ok(out)
}

fn write_string_table(out: &mut Vec<u8>, strings: &[String]) -> std::io::Result<()> {
    out.write_u16::<LittleEndian>(strings.len() as u16)?;
    for s in strings {
        let bytes = if s.len() > u8::MAX as usize {
            warn!(len = s.len(), "string exceeds the 255-byte prefix; truncating");
            let mut end = u8::MAX as usize;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            &s.as_bytes()[..end]
        } else {
            s.as_bytes()
        };
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, element: &Element) -> std::io::Result<()> {
    let h = &element.header;
    out.push(h.element_type.code());
    out.push(h.id_index);
    out.write_u16::<LittleEndian>(h.pos_x)?;
    out.write_u16::<LittleEndian>(h.pos_y)?;
    out.write_u16::<LittleEndian>(h.width)?;
    out.write_u16::<LittleEndian>(h.height)?;
    out.push(h.layout);
    out.push(h.style_id);
    out.push(element.properties.len() as u8);
    out.push(element.child_offsets.len() as u8);
    out.push(element.events.len() as u8);
    out.push(element.animations.len() as u8);
    out.push(element.custom_properties.len() as u8);

    for property in &element.properties {
        write_property(out, property)?;
    }
    for custom in &element.custom_properties {
        out.push(custom.key_index);
        write_value(out, &custom.value)?;
    }
    for event in &element.events {
        out.push(event.event_type.code());
        out.push(event.handler_index);
    }
    for animation in &element.animations {
        out.push(animation.animation_index);
        out.push(animation.trigger);
    }
    for offset in &element.child_offsets {
        out.write_u16::<LittleEndian>(*offset)?;
    }
    Ok(())
}

fn write_style(out: &mut Vec<u8>, style: &Style) -> std::io::Result<()> {
    out.push(style.id);
    out.push(style.name_index);
    out.push(style.properties.len() as u8);
    for property in &style.properties {
        write_property(out, property)?;
    }
    Ok(())
}

fn write_resource_table(out: &mut Vec<u8>, resources: &[ResourceEntry]) -> std::io::Result<()> {
    out.write_u16::<LittleEndian>(resources.len() as u16)?;
    for entry in resources {
        out.push(entry.resource_type.code());
        out.push(entry.name_index);
        match &entry.payload {
            ResourcePayload::External { path_index } => {
                out.push(RESOURCE_FORMAT_EXTERNAL);
                out.push(*path_index);
            }
            ResourcePayload::Inline { data } => {
                out.push(RESOURCE_FORMAT_INLINE);
                out.write_u16::<LittleEndian>(data.len() as u16)?;
                out.extend_from_slice(data);
            }
        }
    }
    Ok(())
}

fn write_property(out: &mut Vec<u8>, property: &Property) -> std::io::Result<()> {
    out.push(property.id.code());
    write_value(out, &property.value)
}

fn write_value(out: &mut Vec<u8>, value: &PropertyValue) -> std::io::Result<()> {
    out.push(value.value_type().code());
    out.push(value.encoded_size() as u8);
    match value {
        PropertyValue::None => {}
        PropertyValue::Byte(b) | PropertyValue::Enum(b) => out.push(*b),
        PropertyValue::StringIndex(i) | PropertyValue::ResourceIndex(i) => out.push(*i),
        PropertyValue::Short(s) => out.write_u16::<LittleEndian>(*s)?,
        PropertyValue::Percentage(fraction) => {
            out.write_u16::<LittleEndian>((fraction * 256.0).round() as u16)?
        }
        PropertyValue::Color(color) => out.extend_from_slice(&color_to_rgba8(*color)),
        PropertyValue::Raw { bytes, .. } => out.extend_from_slice(bytes),
    }
    Ok(())
}

/// Byte offset of each element within a back-to-back element stream.
pub fn element_stream_offsets(elements: &[Element]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(elements.len());
    let mut cursor = 0u32;
    for element in elements {
        offsets.push(cursor);
        cursor += element.encoded_size() as u32;
    }
    offsets
}

/// Fills in each linked parent's relative child offsets, then encodes the
/// elements as one substream. Used for building component templates and by
/// `DocumentBuilder`.
pub fn encode_element_substream(
    mut elements: Vec<Element>,
    links: &[(usize, usize)],
) -> Result<Vec<u8>> {
    // Reserve the child slots first; element sizes depend on the slot count,
    // not on the offset values.
    for element in &mut elements {
        element.child_offsets.clear();
    }
    for (parent, _) in links {
        elements[*parent].child_offsets.push(0);
    }

    let offsets = element_stream_offsets(&elements);
    let mut slot = vec![0usize; elements.len()];
    for (parent, child) in links {
        let relative = (offsets[*child] - offsets[*parent]) as u16;
        elements[*parent].child_offsets[slot[*parent]] = relative;
        slot[*parent] += 1;
    }

    let mut out = Vec::new();
    for element in &elements {
        write_element(&mut out, element)?;
    }
    Ok(out)
}

/// Assembles a well-formed KRB file from parts, computing child references,
/// table indices, and section offsets. `build` returns the canonical parsed
/// form, so a builder-made document always compares equal to a re-parse of
/// its own serialization.
pub struct DocumentBuilder {
    strings: Vec<String>,
    styles: Vec<Style>,
    resources: Vec<ResourceEntry>,
    elements: Vec<Element>,
    links: Vec<(usize, usize)>,
    flags: HeaderFlags,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            // index 0 means "unset" for both tables, so each reserves a
            // sentinel slot and real entries start at 1
            strings: vec![String::new()],
            styles: Vec::new(),
            resources: vec![ResourceEntry {
                resource_type: ResourceType::Other(0),
                name_index: 0,
                payload: ResourcePayload::Inline { data: Vec::new() },
            }],
            elements: Vec::new(),
            links: Vec::new(),
            flags: HeaderFlags::empty(),
        }
    }

    pub fn add_string(&mut self, value: &str) -> u8 {
        if let Some(existing) = self.strings.iter().position(|s| s == value) {
            return existing as u8;
        }
        self.strings.push(value.to_string());
        (self.strings.len() - 1) as u8
    }

    /// Adds a style and returns its 1-based ID.
    pub fn add_style(&mut self, name: &str, properties: Vec<Property>) -> u8 {
        let name_index = self.add_string(name);
        let id = (self.styles.len() + 1) as u8;
        self.styles.push(Style {
            id,
            name_index,
            properties,
        });
        id
    }

    /// Adds a resource and returns its table index, starting at 1; index 0
    /// stays the "unset" sentinel.
    pub fn add_resource(
        &mut self,
        resource_type: ResourceType,
        name: &str,
        payload: ResourcePayload,
    ) -> u8 {
        let name_index = self.add_string(name);
        self.resources.push(ResourceEntry {
            resource_type,
            name_index,
            payload,
        });
        (self.resources.len() - 1) as u8
    }

    /// Registers a component definition whose template is a raw element
    /// substream (see `encode_element_substream`).
    pub fn add_component(&mut self, name: &str, template: Vec<u8>) -> u8 {
        self.add_resource(
            ResourceType::Component,
            name,
            ResourcePayload::Inline { data: template },
        )
    }

    pub fn add_element(&mut self, element: Element) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    pub fn link(&mut self, parent: usize, child: usize) {
        self.links.push((parent, child));
    }

    pub fn set_flags(&mut self, flags: HeaderFlags) {
        self.flags |= flags;
    }

    pub fn build_bytes(mut self) -> Result<Vec<u8>> {
        if self
            .elements
            .first()
            .is_some_and(|e| e.header.element_type == ElementType::App)
        {
            self.flags |= HeaderFlags::HAS_APP;
        }
        let element_bytes =
            encode_element_substream(std::mem::take(&mut self.elements), &self.links)?;

        // Decode the substream back so the document carries elements with
        // their child offsets filled in, then serialize the file once.
        let limits = crate::TableLimits {
            string_count: self.strings.len(),
            style_count: self.styles.len(),
            resource_count: self.resources.len(),
        };
        let stream = crate::parse_element_substream(&element_bytes, &limits)?;

        let doc = Document {
            header: KrbHeader {
                version_major: KRB_VERSION_MAJOR,
                version_minor: KRB_VERSION_MINOR,
                flags: self.flags,
                element_count: 0,
                style_count: 0,
                animation_count: 0,
                string_count: 0,
                resource_count: 0,
                element_offset: 0,
                style_offset: 0,
                animation_offset: 0,
                string_offset: 0,
                resource_offset: 0,
                total_size: 0,
            },
            strings: self.strings,
            resources: self.resources,
            styles: self.styles,
            elements: stream.elements,
            element_offsets: stream.offsets,
            templates: crate::TemplateStore::default(),
        };
        serialize(&doc)
    }

    pub fn build(self) -> Result<Document> {
        parse(&self.build_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CustomProperty, PropertyId};
    use glam::Vec4;

    fn sample_document() -> Document {
        let mut builder = DocumentBuilder::new();
        let title = builder.add_string("hello");
        let root = builder.add_element({
            let mut e = Element::new(ElementType::App);
            e.header.width = 640;
            e.header.height = 480;
            e.properties.push(Property {
                id: PropertyId::BackgroundColor,
                value: PropertyValue::Color(Vec4::new(0.0, 0.5, 1.0, 1.0)),
            });
            e
        });
        let child = builder.add_element({
            let mut e = Element::new(ElementType::Text);
            e.properties.push(Property {
                id: PropertyId::TextContent,
                value: PropertyValue::StringIndex(title),
            });
            e.properties.push(Property {
                id: PropertyId::FontSize,
                value: PropertyValue::Short(18),
            });
            e.custom_properties.push(CustomProperty {
                key_index: title,
                value: PropertyValue::Percentage(0.5),
            });
            e
        });
        builder.link(root, child);
        builder.build().unwrap()
    }

    #[test]
    fn serialize_then_parse_is_identity() {
        let doc = sample_document();
        let bytes = serialize(&doc).unwrap();
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed, doc);
        // and the encoding itself is stable
        assert_eq!(serialize(&reparsed).unwrap(), bytes);
    }

    #[test]
    fn child_refs_match_child_count_and_resolve() {
        let doc = sample_document();
        assert_eq!(doc.elements[0].child_offsets.len(), 1);
        let parent_offset = doc.element_offsets[0];
        let child_offset = parent_offset + doc.elements[0].child_offsets[0] as u32;
        assert_eq!(child_offset, doc.element_offsets[1]);
    }

    #[test]
    fn builder_sets_app_flag_from_first_element() {
        let doc = sample_document();
        assert!(doc.header.flags.contains(HeaderFlags::HAS_APP));
        assert_eq!(doc.header.element_count, 2);
        assert_eq!(doc.header.string_count, 2);
    }

    #[test]
    fn property_order_is_preserved() {
        let doc = sample_document();
        let ids: Vec<_> = doc.elements[1].properties.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![PropertyId::TextContent, PropertyId::FontSize]);
    }

    #[test]
    fn resource_table_reserves_the_unset_sentinel() {
        let mut builder = DocumentBuilder::new();
        let logo = builder.add_resource(
            ResourceType::Image,
            "logo",
            ResourcePayload::Inline { data: vec![1, 2] },
        );
        // index 0 means "unset", so the first real resource must stay
        // reachable from a ResourceIndex value
        assert_eq!(logo, 1);
        builder.add_element(Element::new(ElementType::App));
        let doc = builder.build().unwrap();
        assert_eq!(doc.resources.len(), 2);
        assert_eq!(
            doc.resource(logo).map(|entry| &entry.payload),
            Some(&ResourcePayload::Inline { data: vec![1, 2] })
        );
    }
}
