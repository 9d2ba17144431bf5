// crates/kryon-runtime/src/lib.rs

use anyhow::Result;
use glam::{Vec2, Vec4};
use kryon_core::{
    build_render_tree, Document, ElementType, EventType, NodeId, PropertyId, PropertyValue,
    RenderTree,
};
use kryon_layout::LayoutEngine;
use kryon_render::{
    render_frame, BackendTextMeasure, InputEvent, PointerButton, RenderBackend, WindowConfig,
};
use tracing::{debug, info, warn};

pub mod components;
pub mod event_system;

pub use components::*;
pub use event_system::*;

/// How many consecutive backend failures end the loop.
const MAX_FRAME_ERRORS: u32 = 3;

/// Window parameters read off the App element: header size first, then the
/// App-scoped properties on top.
pub fn window_config(doc: &Document) -> WindowConfig {
    let mut config = WindowConfig::default();
    let Some(app) = doc
        .elements
        .first()
        .filter(|e| e.header.element_type == ElementType::App)
    else {
        return config;
    };

    if app.header.width > 0 {
        config.width = app.header.width as f32;
    }
    if app.header.height > 0 {
        config.height = app.header.height as f32;
    }

    for property in &app.properties {
        match (property.id, &property.value) {
            (PropertyId::WindowWidth, value) => {
                if let Some(width) = value.as_float() {
                    config.width = width;
                }
            }
            (PropertyId::WindowHeight, value) => {
                if let Some(height) = value.as_float() {
                    config.height = height;
                }
            }
            (PropertyId::WindowTitle, PropertyValue::StringIndex(index)) => {
                if let Some(title) = doc.string(*index) {
                    config.title = title.to_string();
                }
            }
            (PropertyId::Resizable, PropertyValue::Byte(b)) => {
                config.resizable = *b != 0;
            }
            (PropertyId::ScaleFactor, PropertyValue::Percentage(fraction)) => {
                if *fraction > 0.0 {
                    config.scale_factor = *fraction;
                }
            }
            (PropertyId::ScaleFactor, PropertyValue::Byte(b)) => {
                if *b > 0 {
                    config.scale_factor = *b as f32;
                }
            }
            (PropertyId::BackgroundColor, PropertyValue::Color(color)) => {
                config.clear_color = *color;
            }
            _ => {}
        }
    }
    config
}

/// The application driver: owns the document, the render tree, the layout
/// engine, and the backend. Each frame is the same deterministic sequence:
/// poll events, dispatch handlers, apply queued mutations, layout, custom
/// component pass, draw.
pub struct KryonApp<B: RenderBackend> {
    document: Document,
    tree: RenderTree,
    layout_engine: LayoutEngine,
    backend: B,
    components: ComponentRegistry,
    events: EventSystem,

    viewport: Vec2,
    clear_color: Vec4,
    needs_layout: bool,
    pointer_down_on: Option<NodeId>,
    frame_count: u64,
}

impl<B: RenderBackend> KryonApp<B> {
    pub fn new(document: Document, backend: B) -> Result<Self> {
        let config = window_config(&document);
        let tree = build_render_tree(&document);
        info!(
            elements = document.elements.len(),
            nodes = tree.len(),
            roots = tree.roots.len(),
            "render tree built"
        );

        let viewport = backend.viewport_size();
        let mut app = Self {
            document,
            tree,
            layout_engine: LayoutEngine::with_scale(config.scale_factor),
            backend,
            components: ComponentRegistry::with_builtins(),
            events: EventSystem::new(),
            viewport,
            clear_color: config.clear_color,
            needs_layout: false,
            pointer_down_on: None,
            frame_count: 0,
        };
        app.load_textures();
        app.update_layout();
        Ok(app)
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn events_mut(&mut self) -> &mut EventSystem {
        &mut self.events
    }

    pub fn components_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.components
    }

    /// Texture acquisition is a dedicated pre-frame step; nothing inside
    /// the frame sequence blocks on resource IO.
    fn load_textures(&mut self) {
        for id in 0..self.tree.len() {
            let Some(resource_index) = self.tree.node(id).resource else {
                continue;
            };
            if self.tree.node(id).texture.is_some() {
                continue;
            }
            let Some(entry) = self.document.resource(resource_index) else {
                warn!(resource_index, "image references a missing resource");
                continue;
            };
            match self.backend.load_texture(entry, &self.document.strings) {
                Ok(handle) => {
                    self.tree.node_mut(id).texture = Some(handle);
                }
                Err(error) => {
                    warn!(resource_index, %error, "texture load failed; using placeholder");
                }
            }
        }
    }

    fn update_layout(&mut self) {
        let measure = BackendTextMeasure(&self.backend);
        self.layout_engine
            .compute(&mut self.tree, self.viewport, &measure);

        // Custom components adjust placed frames, then their subtrees get a
        // local re-layout against the new boxes.
        let dirty = self
            .components
            .run_pass(&mut self.tree, self.layout_engine.scale());
        for id in dirty {
            self.layout_engine
                .relayout_subtree(&mut self.tree, id, &measure);
        }
    }

    pub fn update(&mut self) -> Result<()> {
        for event in self.backend.poll_events() {
            self.handle_input(event);
        }
        if self.events.apply_queued(&mut self.tree) {
            self.needs_layout = true;
        }
        if self.needs_layout {
            self.update_layout();
            self.needs_layout = false;
        }
        Ok(())
    }

    pub fn render(&mut self) -> Result<()> {
        render_frame(
            &mut self.backend,
            &self.tree,
            self.clear_color,
            self.layout_engine.scale(),
        )?;
        self.frame_count += 1;
        Ok(())
    }

    /// Blocks until the backend reports shutdown. A failed frame is
    /// reported and skipped; repeated failures terminate the loop.
    pub fn run(&mut self) -> Result<()> {
        let mut consecutive_errors = 0u32;
        while !self.backend.should_close() {
            self.update()?;
            match self.render() {
                Ok(()) => consecutive_errors = 0,
                Err(error) => {
                    warn!(%error, "frame skipped");
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_FRAME_ERRORS {
                        return Err(error.context("backend failed repeatedly"));
                    }
                }
            }
        }
        info!(frames = self.frame_count, "shutting down");
        Ok(())
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown { position, button } => {
                if button == PointerButton::Primary {
                    self.pointer_down_on = self.hit_test(position);
                }
            }
            InputEvent::PointerUp { position, button } => {
                if button != PointerButton::Primary {
                    return;
                }
                if let Some(target) = self.hit_test(position) {
                    if Some(target) == self.pointer_down_on {
                        self.dispatch_click(target);
                    }
                }
                self.pointer_down_on = None;
            }
            InputEvent::Resize { size } => {
                self.viewport = size;
                self.needs_layout = true;
            }
            InputEvent::PointerMove { .. }
            | InputEvent::KeyDown { .. }
            | InputEvent::CloseRequested => {}
        }
    }

    fn dispatch_click(&mut self, node: NodeId) {
        let handler = self
            .tree
            .node(node)
            .event_handlers
            .iter()
            .find(|(event_type, _)| *event_type == EventType::Click)
            .map(|(_, name)| name.clone());
        if let Some(name) = handler {
            debug!(node, handler = %name, "click");
            self.events.dispatch(&name, node);
        }
    }

    /// Rectangular hit test in draw order; the topmost (last drawn) hit
    /// wins.
    fn hit_test(&self, position: Vec2) -> Option<NodeId> {
        let mut hit = None;
        for id in self.tree.walk() {
            let node = self.tree.node(id);
            if !node.is_visible() {
                continue;
            }
            let min = node.layout_position;
            let max = min + node.layout_size;
            if position.x >= min.x && position.x < max.x && position.y >= min.y && position.y < max.y
            {
                hit = Some(id);
            }
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kryon_core::{
        encode_element_substream, CustomProperty, DocumentBuilder, Element, Property,
        COMPONENT_NAME_KEY, SLOT_ID,
    };
    use kryon_render::HeadlessBackend;
    use std::cell::Cell;
    use std::rc::Rc;

    fn headless(config: &WindowConfig) -> HeadlessBackend {
        HeadlessBackend::initialize(config).unwrap()
    }

    /// S5: `<TabBar position="bottom"> <Button text="A"/> </TabBar>` in a
    /// 360x480 App.
    #[test]
    fn tab_bar_docks_bottom_and_resizes_its_sibling() {
        let mut builder = DocumentBuilder::new();

        // template: Container(h=50) > Container#content
        let slot_index = builder.add_string(SLOT_ID);
        let mut template_root = Element::new(ElementType::Container);
        template_root.header.height = 50;
        let mut slot = Element::new(ElementType::Container);
        slot.header.id_index = slot_index;
        let template =
            encode_element_substream(vec![template_root, slot], &[(0, 1)]).unwrap();
        builder.add_component("TabBar", template);

        let mut app = Element::new(ElementType::App);
        app.header.width = 360;
        app.header.height = 480;
        app.header.layout = 0x01; // column
        let app = builder.add_element(app);

        let body = builder.add_element(Element::new(ElementType::Container));

        let component_key = builder.add_string(COMPONENT_NAME_KEY);
        let tab_bar_name = builder.add_string("TabBar");
        let position_key = builder.add_string("position");
        let bottom = builder.add_string("bottom");
        let mut instance = Element::new(ElementType::Custom(0x80));
        instance.custom_properties.push(CustomProperty {
            key_index: component_key,
            value: PropertyValue::StringIndex(tab_bar_name),
        });
        instance.custom_properties.push(CustomProperty {
            key_index: position_key,
            value: PropertyValue::StringIndex(bottom),
        });
        let instance = builder.add_element(instance);

        let label = builder.add_string("A");
        let mut button = Element::new(ElementType::Button);
        button.header.width = 80;
        button.header.height = 30;
        button.properties.push(Property {
            id: PropertyId::TextContent,
            value: PropertyValue::StringIndex(label),
        });
        let button = builder.add_element(button);

        builder.link(app, body);
        builder.link(app, instance);
        builder.link(instance, button);
        let doc = builder.build().unwrap();

        let config = window_config(&doc);
        assert_eq!((config.width, config.height), (360.0, 480.0));

        let app = KryonApp::new(doc, headless(&config)).unwrap();
        let tree = app.tree();

        let bar = tree.node(instance);
        assert_eq!(bar.layout_size, Vec2::new(360.0, 50.0));
        assert_eq!(bar.layout_position, Vec2::new(0.0, 430.0));

        let body_node = tree.node(body);
        assert_eq!(body_node.layout_size.y, 430.0);
        assert_eq!(body_node.layout_position.y, 0.0);

        // the button landed in the slot under the bar
        let slot_node = bar.children[0];
        assert_eq!(tree.node(slot_node).source_name, SLOT_ID);
        assert_eq!(tree.node(slot_node).children.len(), 1);
        let slotted = tree.node(slot_node).children[0];
        assert_eq!(tree.node(slotted).element_type, ElementType::Button);
        assert_eq!(tree.node(slotted).text, "A");
    }

    #[test]
    fn click_resolves_through_hit_test_and_registry() {
        let mut builder = DocumentBuilder::new();
        let mut app = Element::new(ElementType::App);
        app.header.width = 200;
        app.header.height = 100;
        let app_index = builder.add_element(app);

        let handler_name = builder.add_string("press_me");
        let mut button = Element::new(ElementType::Button);
        button.header.width = 100;
        button.header.height = 40;
        button.events.push(kryon_core::EventBinding {
            event_type: EventType::Click,
            handler_index: handler_name,
        });
        let button = builder.add_element(button);
        builder.link(app_index, button);
        let doc = builder.build().unwrap();

        let config = window_config(&doc);
        let mut app = KryonApp::new(doc, headless(&config)).unwrap();

        let clicks = Rc::new(Cell::new(0));
        let seen = clicks.clone();
        app.events_mut().register(
            "press_me",
            Box::new(move |_node, _queue| seen.set(seen.get() + 1)),
        );

        let inside = Vec2::new(50.0, 20.0);
        app.handle_input(InputEvent::PointerDown {
            position: inside,
            button: PointerButton::Primary,
        });
        app.handle_input(InputEvent::PointerUp {
            position: inside,
            button: PointerButton::Primary,
        });
        assert_eq!(clicks.get(), 1);

        // press inside, release outside: no click
        app.handle_input(InputEvent::PointerDown {
            position: inside,
            button: PointerButton::Primary,
        });
        app.handle_input(InputEvent::PointerUp {
            position: Vec2::new(199.0, 99.0),
            button: PointerButton::Primary,
        });
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn queued_mutations_apply_before_the_next_layout() {
        let mut builder = DocumentBuilder::new();
        let mut app = Element::new(ElementType::App);
        app.header.width = 200;
        app.header.height = 100;
        let app_index = builder.add_element(app);

        let handler_name = builder.add_string("toggle");
        let label = builder.add_string("old");
        let mut text = Element::new(ElementType::Text);
        text.properties.push(Property {
            id: PropertyId::TextContent,
            value: PropertyValue::StringIndex(label),
        });
        text.events.push(kryon_core::EventBinding {
            event_type: EventType::Click,
            handler_index: handler_name,
        });
        let text = builder.add_element(text);
        builder.link(app_index, text);
        let doc = builder.build().unwrap();

        let config = window_config(&doc);
        let mut app = KryonApp::new(doc, headless(&config)).unwrap();
        app.events_mut().register(
            "toggle",
            Box::new(|node, queue| {
                queue.push(UiMutation::SetText {
                    node,
                    text: "new".to_string(),
                });
            }),
        );

        let on_text = Vec2::new(5.0, 5.0);
        app.handle_input(InputEvent::PointerDown {
            position: on_text,
            button: PointerButton::Primary,
        });
        app.handle_input(InputEvent::PointerUp {
            position: on_text,
            button: PointerButton::Primary,
        });
        // handler only queued; the tree is untouched until update()
        assert_eq!(app.tree().node(text).text, "old");
        app.update().unwrap();
        assert_eq!(app.tree().node(text).text, "new");
    }

    #[test]
    fn image_resource_loads_a_texture_and_sizes_intrinsically() {
        let mut builder = DocumentBuilder::new();
        let logo = builder.add_resource(
            kryon_core::ResourceType::Image,
            "logo",
            kryon_core::ResourcePayload::Inline {
                data: vec![0u8; 16],
            },
        );

        let mut app = Element::new(ElementType::App);
        app.header.width = 200;
        app.header.height = 200;
        let app_index = builder.add_element(app);

        let mut image = Element::new(ElementType::Image);
        image.properties.push(Property {
            id: PropertyId::ImageSource,
            value: PropertyValue::ResourceIndex(logo),
        });
        let image = builder.add_element(image);
        builder.link(app_index, image);
        let doc = builder.build().unwrap();

        let config = window_config(&doc);
        let mut app = KryonApp::new(doc, headless(&config)).unwrap();

        let node = app.tree().node(image);
        assert_eq!(node.resource, Some(logo));
        let texture = node
            .texture
            .expect("texture acquired in the pre-frame load step");
        // the headless backend derives a 4x4 texture from 16 inline bytes,
        // and the image takes that size intrinsically
        assert_eq!(texture.size, Vec2::new(4.0, 4.0));
        assert_eq!(node.layout_size, Vec2::new(4.0, 4.0));

        app.render().unwrap();
        assert!(app.backend().calls.iter().any(|call| matches!(
            call,
            kryon_render::DrawCall::Texture { id, .. } if *id == texture.id
        )));
    }

    #[test]
    fn resize_recomputes_root_geometry() {
        let mut builder = DocumentBuilder::new();
        builder.add_element(Element::new(ElementType::App));
        let doc = builder.build().unwrap();

        let mut app = KryonApp::new(doc, headless(&WindowConfig::default())).unwrap();
        assert_eq!(app.tree().node(0).layout_size, Vec2::new(800.0, 600.0));

        app.handle_input(InputEvent::Resize {
            size: Vec2::new(400.0, 300.0),
        });
        app.update().unwrap();
        assert_eq!(app.tree().node(0).layout_size, Vec2::new(400.0, 300.0));
    }
}
