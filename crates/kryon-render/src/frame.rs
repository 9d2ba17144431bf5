// crates/kryon-render/src/frame.rs
use crate::{RenderBackend, RenderResult};
use glam::{Vec2, Vec4};
use kryon_core::{NodeId, OverflowMode, RenderNode, RenderTree, TextAlignment, Visibility};

const DEFAULT_TEXT_COLOR: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// Walks the laid-out tree front to back, emitting backend draw calls.
/// Hidden subtrees are skipped entirely; overflow-hidden containers clip
/// their children with a scissor around the content box.
pub fn render_frame<B: RenderBackend>(
    backend: &mut B,
    tree: &RenderTree,
    clear_color: Vec4,
    scale: f32,
) -> RenderResult<()> {
    backend.begin_frame(clear_color)?;
    for &root in &tree.roots {
        draw_node(backend, tree, root, scale)?;
    }
    backend.end_frame()
}

fn draw_node<B: RenderBackend>(
    backend: &mut B,
    tree: &RenderTree,
    id: NodeId,
    scale: f32,
) -> RenderResult<()> {
    let node = tree.node(id);
    if node.effective_visibility() != Visibility::Visible {
        return Ok(());
    }

    draw_chrome(backend, node);
    if let Some(texture) = node.texture {
        let (origin, size) = node.content_box(scale);
        backend.draw_texture(texture, origin, size);
    }
    if !node.text.is_empty() {
        draw_text(backend, node, scale);
    }

    let clip = node.overflow == OverflowMode::Hidden;
    if clip {
        let (origin, size) = node.content_box(scale);
        backend.push_scissor(origin, size);
    }

    // Stable sort keeps stream order for equal z-indices.
    let mut children = node.children.clone();
    children.sort_by_key(|&child| tree.node(child).z_index);
    for child in children {
        draw_node(backend, tree, child, scale)?;
    }

    if clip {
        backend.pop_scissor();
    }
    Ok(())
}

fn draw_chrome<B: RenderBackend>(backend: &mut B, node: &RenderNode) {
    let mut background = node.background_color;
    background.w *= node.opacity;
    if background.w > 0.0 {
        backend.draw_rect(node.layout_position, node.layout_size, background);
    }

    let Some(mut border_color) = node.border_color else {
        return;
    };
    border_color.w *= node.opacity;
    let widths = node.border_widths;
    if border_color.w <= 0.0 || widths.is_zero() {
        return;
    }

    let position = node.layout_position;
    let size = node.layout_size;
    if widths.top > 0.0 {
        backend.draw_rect(position, Vec2::new(size.x, widths.top), border_color);
    }
    if widths.bottom > 0.0 {
        backend.draw_rect(
            Vec2::new(position.x, position.y + size.y - widths.bottom),
            Vec2::new(size.x, widths.bottom),
            border_color,
        );
    }
    if widths.left > 0.0 {
        backend.draw_rect(position, Vec2::new(widths.left, size.y), border_color);
    }
    if widths.right > 0.0 {
        backend.draw_rect(
            Vec2::new(position.x + size.x - widths.right, position.y),
            Vec2::new(widths.right, size.y),
            border_color,
        );
    }
}

fn draw_text<B: RenderBackend>(backend: &mut B, node: &RenderNode, scale: f32) {
    let mut color = node.foreground_color.unwrap_or(DEFAULT_TEXT_COLOR);
    color.w *= node.opacity;
    if color.w <= 0.0 {
        return;
    }

    let font_size = node.effective_font_size() * scale;
    let (origin, size) = node.content_box(scale);
    let measured = backend.measure_text(&node.text, font_size);
    let position = match node.effective_text_alignment() {
        TextAlignment::Start | TextAlignment::Justify => {
            Vec2::new(origin.x, origin.y + (size.y - measured.y).max(0.0) / 2.0)
        }
        TextAlignment::Center => Vec2::new(
            origin.x + (size.x - measured.x).max(0.0) / 2.0,
            origin.y + (size.y - measured.y).max(0.0) / 2.0,
        ),
        TextAlignment::End => Vec2::new(
            origin.x + (size.x - measured.x).max(0.0),
            origin.y + (size.y - measured.y).max(0.0) / 2.0,
        ),
    };
    backend.draw_text(&node.text, position, font_size, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DrawCall, HeadlessBackend, WindowConfig};
    use kryon_core::{
        build_render_tree, DocumentBuilder, Element, ElementType, Property, PropertyId,
        PropertyValue,
    };
    use kryon_layout::{LayoutEngine, MonospaceTextMeasure};

    #[test]
    fn minimal_app_fills_the_viewport() {
        // App { window_width: 640; window_height: 480; background: #102030FF }
        let mut builder = DocumentBuilder::new();
        let mut app = Element::new(ElementType::App);
        app.properties.push(Property {
            id: PropertyId::WindowWidth,
            value: PropertyValue::Short(640),
        });
        app.properties.push(Property {
            id: PropertyId::WindowHeight,
            value: PropertyValue::Short(480),
        });
        app.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::new(
                16.0 / 255.0,
                32.0 / 255.0,
                48.0 / 255.0,
                1.0,
            )),
        });
        builder.add_element(app);
        let doc = builder.build().unwrap();
        assert_eq!(doc.elements.len(), 1);

        let mut tree = build_render_tree(&doc);
        let mut engine = LayoutEngine::new();
        engine.compute(
            &mut tree,
            Vec2::new(640.0, 480.0),
            &MonospaceTextMeasure::default(),
        );

        let mut backend = HeadlessBackend::initialize(&WindowConfig {
            width: 640.0,
            height: 480.0,
            ..WindowConfig::default()
        })
        .unwrap();
        render_frame(&mut backend, &tree, Vec4::ZERO, 1.0).unwrap();

        assert_eq!(
            backend.calls,
            vec![DrawCall::Rect {
                position: Vec2::ZERO,
                size: Vec2::new(640.0, 480.0),
                color: Vec4::new(16.0 / 255.0, 32.0 / 255.0, 48.0 / 255.0, 1.0),
            }]
        );
    }

    #[test]
    fn hidden_subtrees_emit_nothing() {
        let mut builder = DocumentBuilder::new();
        let mut app = Element::new(ElementType::App);
        app.header.width = 100;
        app.header.height = 100;
        let root = builder.add_element(app);
        let mut hidden = Element::new(ElementType::Container);
        hidden.header.width = 50;
        hidden.header.height = 50;
        hidden.properties.push(Property {
            id: PropertyId::Visibility,
            value: PropertyValue::Enum(1),
        });
        hidden.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::ONE),
        });
        let hidden = builder.add_element(hidden);
        builder.link(root, hidden);
        let doc = builder.build().unwrap();

        let mut tree = build_render_tree(&doc);
        let mut engine = LayoutEngine::new();
        engine.compute(
            &mut tree,
            Vec2::new(100.0, 100.0),
            &MonospaceTextMeasure::default(),
        );

        let mut backend = HeadlessBackend::initialize(&WindowConfig::default()).unwrap();
        render_frame(&mut backend, &tree, Vec4::ZERO, 1.0).unwrap();
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn overflow_hidden_wraps_children_in_a_scissor() {
        let mut builder = DocumentBuilder::new();
        let mut app = Element::new(ElementType::App);
        app.header.width = 100;
        app.header.height = 100;
        app.properties.push(Property {
            id: PropertyId::Overflow,
            value: PropertyValue::Enum(1),
        });
        let root = builder.add_element(app);
        let mut child = Element::new(ElementType::Container);
        child.header.width = 500;
        child.header.height = 500;
        child.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::ONE),
        });
        let child = builder.add_element(child);
        builder.link(root, child);
        let doc = builder.build().unwrap();

        let mut tree = build_render_tree(&doc);
        let mut engine = LayoutEngine::new();
        engine.compute(
            &mut tree,
            Vec2::new(100.0, 100.0),
            &MonospaceTextMeasure::default(),
        );

        let mut backend = HeadlessBackend::initialize(&WindowConfig::default()).unwrap();
        render_frame(&mut backend, &tree, Vec4::ZERO, 1.0).unwrap();

        assert!(matches!(backend.calls.first(), Some(DrawCall::PushScissor { .. })));
        assert!(matches!(backend.calls.last(), Some(DrawCall::PopScissor)));
    }
}
