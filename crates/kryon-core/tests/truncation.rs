// crates/kryon-core/tests/truncation.rs
//
// Length-safety: cutting a valid file at any byte offset must produce a
// clean decode error (or a well-defined partial load), never a panic or an
// out-of-bounds read.

use glam::Vec4;
use kryon_core::{
    encode_element_substream, parse, serialize, CustomProperty, DocumentBuilder, Element,
    ElementType, EventBinding, EventType, Property, PropertyId, PropertyValue, ResourcePayload,
    ResourceType,
};

fn rich_document_bytes() -> Vec<u8> {
    let mut builder = DocumentBuilder::new();

    let style = builder.add_style(
        "panel",
        vec![
            Property {
                id: PropertyId::BackgroundColor,
                value: PropertyValue::Color(Vec4::new(0.2, 0.2, 0.2, 1.0)),
            },
            Property {
                id: PropertyId::Padding,
                value: PropertyValue::Byte(8),
            },
        ],
    );

    let logo = builder.add_resource(
        ResourceType::Image,
        "logo",
        ResourcePayload::Inline {
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        },
    );
    let slot_index = builder.add_string("content");
    let mut slot = Element::new(ElementType::Container);
    slot.header.id_index = slot_index;
    let template =
        encode_element_substream(vec![Element::new(ElementType::Container), slot], &[(0, 1)])
            .unwrap();
    builder.add_component("TabBar", template);

    let mut app = Element::new(ElementType::App);
    app.header.width = 640;
    app.header.height = 480;
    app.header.style_id = style;
    let root = builder.add_element(app);

    let handler = builder.add_string("on_click");
    let label = builder.add_string("Press me");
    let mut button = Element::new(ElementType::Button);
    button.header.width = 120;
    button.header.height = 40;
    button.properties.push(Property {
        id: PropertyId::TextContent,
        value: PropertyValue::StringIndex(label),
    });
    button.events.push(EventBinding {
        event_type: EventType::Click,
        handler_index: handler,
    });
    let button = builder.add_element(button);

    let component_key = builder.add_string("_componentName");
    let tab_bar = builder.add_string("TabBar");
    let mut instance = Element::new(ElementType::Custom(0x80));
    instance.custom_properties.push(CustomProperty {
        key_index: component_key,
        value: PropertyValue::StringIndex(tab_bar),
    });
    let instance = builder.add_element(instance);

    let mut image = Element::new(ElementType::Image);
    image.properties.push(Property {
        id: PropertyId::ImageSource,
        value: PropertyValue::ResourceIndex(logo),
    });
    let image = builder.add_element(image);

    builder.link(root, button);
    builder.link(root, instance);
    builder.link(root, image);
    builder.build_bytes().unwrap()
}

#[test]
fn every_truncation_point_fails_cleanly() {
    let bytes = rich_document_bytes();
    assert!(parse(&bytes).is_ok());

    for cut in 0..bytes.len() {
        // any outcome but a panic is acceptable; a partial load must still
        // be a coherent document
        if let Ok(doc) = parse(&bytes[..cut]) {
            assert!(doc.elements.len() <= doc.header.element_count as usize);
        }
    }
}

#[test]
fn full_round_trip_of_the_rich_document() {
    let bytes = rich_document_bytes();
    let doc = parse(&bytes).unwrap();
    let rewritten = serialize(&doc).unwrap();
    assert_eq!(rewritten, bytes);
    assert_eq!(parse(&rewritten).unwrap(), doc);
}

#[test]
fn truncating_inside_the_element_stream_reports_eof() {
    let bytes = rich_document_bytes();
    let doc = parse(&bytes).unwrap();
    // cut in the middle of the first element's header
    let cut = doc.header.element_offset as usize + 5;
    assert!(parse(&bytes[..cut]).is_err());
}
