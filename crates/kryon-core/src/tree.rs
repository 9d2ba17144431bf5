// crates/kryon-core/src/tree.rs
use crate::{
    parse_element_substream, Document, EdgeInsets, Element, ElementType, EventType, PropertyId,
    PropertyValue, TableLimits, ValueType,
};
use glam::{Vec2, Vec4};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

pub type NodeId = usize;

/// Custom-property key that marks an element as a component instance.
pub const COMPONENT_NAME_KEY: &str = "_componentName";
/// Element ID that receives usage-site children inside a template.
pub const SLOT_ID: &str = "content";

const MAX_EXPANSION_DEPTH: usize = 32;

pub const DEFAULT_FONT_SIZE: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    Collapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Light,
    Normal,
    Bold,
    Heavy,
}

impl FontWeight {
    pub fn from_value(value: u16) -> Self {
        match value {
            0..=349 => FontWeight::Light,
            350..=549 => FontWeight::Normal,
            550..=799 => FontWeight::Bold,
            _ => FontWeight::Heavy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlignment {
    Start,
    Center,
    End,
    Justify,
}

impl TextAlignment {
    fn from_value(value: u8) -> Self {
        match value {
            1 => TextAlignment::Center,
            2 => TextAlignment::End,
            3 => TextAlignment::Justify,
            _ => TextAlignment::Start,
        }
    }
}

/// A size constraint as authored: absolute pixels or a fraction of the
/// parent's content box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Pixels(f32),
    Fraction(f32),
}

impl Dimension {
    pub fn resolve(&self, reference: f32, scale: f32) -> f32 {
        match self {
            Dimension::Pixels(px) => px * scale,
            Dimension::Fraction(fraction) => fraction * reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Unmeasured,
    Measured,
    Placed,
}

/// A component-instance parameter after string resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomValue {
    Text(String),
    Number(f32),
}

impl CustomValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CustomValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f32> {
        match self {
            CustomValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// An opaque backend texture binding plus its pixel dimensions, acquired
/// during the pre-frame load step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRef {
    pub id: u32,
    pub size: Vec2,
}

/// An element plus its resolved visual and geometric state. Lives in the
/// tree's arena; `parent` is a weak index, `children` are owned indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub element_type: ElementType,
    /// The element's ID string, kept for diagnostics and slot matching.
    pub source_name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,

    // Header identity
    /// Authored offset; additive for flow children, origin for absolute ones.
    pub position: Vec2,
    /// Authored size; zero means "auto" on that axis.
    pub declared_size: Vec2,
    pub layout: u8,
    pub style_id: u8,

    // Resolved visual state
    pub background_color: Vec4,
    pub foreground_color: Option<Vec4>,
    pub border_color: Option<Vec4>,
    pub border_widths: EdgeInsets,
    pub border_radius: f32,
    pub padding: EdgeInsets,
    pub margin: EdgeInsets,
    pub opacity: f32,
    pub z_index: i16,
    pub gap: f32,
    pub overflow: OverflowMode,
    pub min_width: Option<Dimension>,
    pub min_height: Option<Dimension>,
    pub max_width: Option<Dimension>,
    pub max_height: Option<Dimension>,

    // Inheritable properties stay unset until the inheritance pass fills
    // them from the parent; defaults apply at the point of use.
    pub font_size: Option<f32>,
    pub font_weight: Option<FontWeight>,
    pub text_alignment: Option<TextAlignment>,
    pub visibility: Option<Visibility>,

    pub text: String,
    pub resource: Option<u8>,
    pub texture: Option<TextureRef>,

    pub event_handlers: Vec<(EventType, String)>,
    pub component_name: Option<String>,
    pub custom_params: HashMap<String, CustomValue>,

    // Computed geometry, owned by the layout engine between frames.
    pub layout_position: Vec2,
    pub layout_size: Vec2,
    pub layout_state: LayoutState,
}

impl Default for RenderNode {
    fn default() -> Self {
        Self {
            element_type: ElementType::Container,
            source_name: String::new(),
            parent: None,
            children: Vec::new(),
            position: Vec2::ZERO,
            declared_size: Vec2::ZERO,
            layout: 0,
            style_id: 0,
            background_color: Vec4::ZERO,
            foreground_color: None,
            border_color: None,
            border_widths: EdgeInsets::ZERO,
            border_radius: 0.0,
            padding: EdgeInsets::ZERO,
            margin: EdgeInsets::ZERO,
            opacity: 1.0,
            z_index: 0,
            gap: 0.0,
            overflow: OverflowMode::Visible,
            min_width: None,
            min_height: None,
            max_width: None,
            max_height: None,
            font_size: None,
            font_weight: None,
            text_alignment: None,
            visibility: None,
            text: String::new(),
            resource: None,
            texture: None,
            event_handlers: Vec::new(),
            component_name: None,
            custom_params: HashMap::new(),
            layout_position: Vec2::ZERO,
            layout_size: Vec2::ZERO,
            layout_state: LayoutState::Unmeasured,
        }
    }
}

impl RenderNode {
    pub fn effective_font_size(&self) -> f32 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn effective_text_alignment(&self) -> TextAlignment {
        self.text_alignment.unwrap_or(TextAlignment::Start)
    }

    pub fn effective_visibility(&self) -> Visibility {
        self.visibility.unwrap_or(Visibility::Visible)
    }

    pub fn is_visible(&self) -> bool {
        self.effective_visibility() == Visibility::Visible
    }

    /// Whether the node paints anything on its own (used for the collapsed
    /// size fallback).
    pub fn has_visible_chrome(&self) -> bool {
        self.background_color.w > 0.0
            || (!self.border_widths.is_zero()
                && self.border_color.map(|c| c.w > 0.0).unwrap_or(false))
    }

    /// Interior origin and size after subtracting borders and padding, in
    /// output pixels. `scale` is the global scale factor.
    pub fn content_box(&self, scale: f32) -> (Vec2, Vec2) {
        let borders = self.border_widths.scaled(scale);
        let padding = self.padding.scaled(scale);
        let origin = self.layout_position
            + Vec2::new(borders.left + padding.left, borders.top + padding.top);
        let size = Vec2::new(
            (self.layout_size.x - borders.horizontal() - padding.horizontal()).max(0.0),
            (self.layout_size.y - borders.vertical() - padding.vertical()).max(0.0),
        );
        (origin, size)
    }
}

/// The render-node arena. Indices are stable for the document's lifetime;
/// component expansion only ever appends.
#[derive(Debug, Default)]
pub struct RenderTree {
    pub nodes: Vec<RenderNode>,
    pub roots: Vec<NodeId>,
}

impl RenderTree {
    pub fn node(&self, id: NodeId) -> &RenderNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut RenderNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order walk of a subtree, root included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.nodes[current].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Pre-order walk over every attached node.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            out.extend(self.descendants(root));
        }
        out
    }
}

/// Builds the render tree: offset linking, component expansion, slotting,
/// cascade, and inheritance. Degrades broken subtrees instead of failing
/// the whole load.
pub fn build_render_tree(doc: &Document) -> RenderTree {
    let limits = TableLimits::of_document(doc);
    let mut builder = TreeBuilder {
        doc,
        nodes: Vec::with_capacity(doc.elements.len()),
        dead: Vec::with_capacity(doc.elements.len()),
        depth: 0,
    };
    let stream_roots = builder.add_stream(&doc.elements, &doc.element_offsets, &limits);
    builder.finish(stream_roots)
}

struct TreeBuilder<'a> {
    doc: &'a Document,
    nodes: Vec<RenderNode>,
    dead: Vec<bool>,
    depth: usize,
}

struct DeferredInstance {
    node: NodeId,
    element: Element,
    usage_children: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    /// Decodes one element stream into the arena: creates nodes, links
    /// parents to children by resolved file offsets, and expands component
    /// instances. Returns the stream's root node IDs in stream order.
    fn add_stream(
        &mut self,
        elements: &[Element],
        offsets: &[u32],
        limits: &TableLimits,
    ) -> Vec<NodeId> {
        let base = self.nodes.len();
        for element in elements {
            let node = self.resolve_node(element);
            self.nodes.push(node);
            self.dead.push(false);
        }

        let offset_map: HashMap<u32, usize> = offsets
            .iter()
            .enumerate()
            .map(|(local, &offset)| (offset, local))
            .collect();

        // Resolve child references before attaching anything, so a failed
        // link can take its whole subtree down.
        let mut resolved: Vec<Vec<usize>> = Vec::with_capacity(elements.len());
        let mut referenced = vec![false; elements.len()];
        for (local, element) in elements.iter().enumerate() {
            let mut children = Vec::with_capacity(element.child_offsets.len());
            let mut failed = false;
            for &relative in &element.child_offsets {
                let target = offsets[local] + relative as u32;
                match offset_map.get(&target) {
                    Some(&child) if child != local && !referenced[child] => {
                        children.push(child);
                        referenced[child] = true;
                    }
                    Some(&child) => {
                        // Children always sit at higher offsets than their
                        // parent, so the only degenerate references are
                        // self-links and double claims.
                        warn!(
                            parent = local,
                            child, "element claimed twice or self-referenced; ignoring reference"
                        );
                    }
                    None => {
                        warn!(
                            parent = local,
                            offset = target,
                            "child reference resolves to no element; dropping subtree"
                        );
                        failed = true;
                    }
                }
            }
            if failed {
                self.dead[base + local] = true;
            }
            resolved.push(children);
        }

        // A dead parent drags every reachable descendant down with it.
        for local in 0..elements.len() {
            if self.dead[base + local] {
                self.mark_resolved_subtree_dead(base, local, &resolved);
            }
        }

        // Attach. Component instances keep their usage-site children on a
        // side list until their template is expanded.
        let mut deferred = Vec::new();
        for (local, element) in elements.iter().enumerate() {
            let id = base + local;
            if self.dead[id] {
                continue;
            }
            let children: Vec<NodeId> = resolved[local]
                .iter()
                .map(|&c| base + c)
                .filter(|&c| !self.dead[c])
                .collect();
            if self.nodes[id].component_name.is_some() {
                deferred.push(DeferredInstance {
                    node: id,
                    element: element.clone(),
                    usage_children: children,
                });
            } else {
                for &child in &children {
                    self.nodes[child].parent = Some(id);
                }
                self.nodes[id].children = children;
            }
        }

        for instance in deferred {
            self.expand_instance(instance, limits);
        }

        (0..elements.len())
            .filter(|&local| !referenced[local] && !self.dead[base + local])
            .map(|local| base + local)
            .collect()
    }

    fn mark_resolved_subtree_dead(&mut self, base: usize, local: usize, resolved: &[Vec<usize>]) {
        let mut stack = vec![local];
        while let Some(current) = stack.pop() {
            self.dead[base + current] = true;
            stack.extend(resolved[current].iter().copied());
        }
    }

    fn mark_subtree_dead(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.dead[current] = true;
            stack.extend(self.nodes[current].children.iter().copied());
        }
    }

    /// Expands one component instance in place: decodes its template as a
    /// fresh substream, grafts the first template root's state onto the
    /// instance node, re-applies the instance's own style and properties,
    /// and slots the usage-site children.
    fn expand_instance(&mut self, instance: DeferredInstance, limits: &TableLimits) {
        let id = instance.node;
        let name = self.nodes[id]
            .component_name
            .clone()
            .unwrap_or_default();

        if self.depth >= MAX_EXPANSION_DEPTH {
            warn!(component = %name, "component expansion too deep; dropping instance");
            self.drop_instance(id, &instance.usage_children);
            return;
        }

        let Some(template) = self.doc.templates.find_definition(&name) else {
            warn!(component = %name, "component not found; dropping instance");
            self.drop_instance(id, &instance.usage_children);
            return;
        };
        let template = template.to_vec();

        let stream = match parse_element_substream(&template, limits) {
            Ok(stream) => stream,
            Err(error) => {
                warn!(component = %name, %error, "template failed to decode; dropping instance");
                self.drop_instance(id, &instance.usage_children);
                return;
            }
        };

        self.depth += 1;
        let template_roots = self.add_stream(&stream.elements, &stream.offsets, limits);
        self.depth -= 1;

        let Some(&template_root) = template_roots.first() else {
            warn!(component = %name, "template has no root element; dropping instance");
            self.drop_instance(id, &instance.usage_children);
            return;
        };

        // The first template root becomes the instance's visible root. The
        // instance's header identity wins wherever it is actually set (zero
        // means "unset" throughout the format), and its style and direct
        // properties are re-applied on top of the template root's state.
        let mut merged = self.nodes[template_root].clone();
        merged.parent = self.nodes[id].parent;
        if !self.nodes[id].source_name.is_empty() {
            merged.source_name = self.nodes[id].source_name.clone();
        }
        if self.nodes[id].position != Vec2::ZERO {
            merged.position = self.nodes[id].position;
        }
        if self.nodes[id].declared_size.x != 0.0 {
            merged.declared_size.x = self.nodes[id].declared_size.x;
        }
        if self.nodes[id].declared_size.y != 0.0 {
            merged.declared_size.y = self.nodes[id].declared_size.y;
        }
        if instance.element.header.layout != 0 {
            merged.layout = instance.element.header.layout;
        }
        if instance.element.header.style_id != 0 {
            merged.style_id = instance.element.header.style_id;
        }

        self.apply_style_chain(&mut merged, instance.element.header.style_id);
        for property in &instance.element.properties {
            self.apply_property(&mut merged, property.id, &property.value);
        }
        for custom in &instance.element.custom_properties {
            let Some(key) = self.doc.string(custom.key_index) else {
                continue;
            };
            if key == COMPONENT_NAME_KEY {
                continue;
            }
            if let Some(value) = self.convert_custom_value(&custom.value) {
                merged.custom_params.insert(key.to_string(), value);
            }
        }
        for binding in &instance.element.events {
            if let Some(handler) = self.doc.string(binding.handler_index) {
                merged
                    .event_handlers
                    .push((binding.event_type, handler.to_string()));
            }
        }
        merged.component_name = Some(name.clone());

        let grafted_children = merged.children.clone();
        self.nodes[id] = merged;
        for &child in &grafted_children {
            self.nodes[child].parent = Some(id);
        }
        self.dead[template_root] = true;

        // Extra template roots hang off the instance root.
        for &extra in template_roots.iter().skip(1) {
            trace!(component = %name, "template has additional roots; attaching to instance");
            self.nodes[extra].parent = Some(id);
            self.nodes[id].children.push(extra);
        }

        self.slot_children(id, &name, &instance.usage_children);
    }

    /// Breadth-first search of the expanded template for the reserved slot
    /// ID; usage-site children land there, or on the instance root when the
    /// template defines no slot.
    fn slot_children(&mut self, instance: NodeId, name: &str, usage_children: &[NodeId]) {
        if usage_children.is_empty() {
            return;
        }
        let mut slot = None;
        let mut queue = std::collections::VecDeque::from([instance]);
        while let Some(current) = queue.pop_front() {
            if current != instance && self.nodes[current].source_name == SLOT_ID {
                slot = Some(current);
                break;
            }
            queue.extend(self.nodes[current].children.iter().copied());
        }
        let target = slot.unwrap_or_else(|| {
            debug!(
                component = %name,
                "template defines no '{}' slot; attaching children to its root", SLOT_ID
            );
            instance
        });
        for &child in usage_children {
            self.nodes[child].parent = Some(target);
            self.nodes[target].children.push(child);
        }
    }

    fn drop_instance(&mut self, id: NodeId, usage_children: &[NodeId]) {
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|&c| c != id);
        }
        self.mark_subtree_dead(id);
        for &child in usage_children {
            self.mark_subtree_dead(child);
        }
    }

    /// The styling cascade for one element: base defaults, named style
    /// properties in declaration order, then direct properties.
    fn resolve_node(&self, element: &Element) -> RenderNode {
        let header = &element.header;
        let mut node = RenderNode {
            element_type: header.element_type,
            source_name: self
                .doc
                .string(header.id_index)
                .unwrap_or_default()
                .to_string(),
            position: Vec2::new(header.pos_x as f32, header.pos_y as f32),
            declared_size: Vec2::new(header.width as f32, header.height as f32),
            layout: header.layout,
            style_id: header.style_id,
            ..RenderNode::default()
        };

        self.apply_style_chain(&mut node, header.style_id);
        for property in &element.properties {
            self.apply_property(&mut node, property.id, &property.value);
        }

        for custom in &element.custom_properties {
            let Some(key) = self.doc.string(custom.key_index) else {
                warn!(
                    key_index = custom.key_index,
                    "custom property has no key string; skipping"
                );
                continue;
            };
            if key == COMPONENT_NAME_KEY {
                match self.convert_custom_value(&custom.value) {
                    Some(CustomValue::Text(name)) if !name.is_empty() => {
                        node.component_name = Some(name);
                    }
                    _ => warn!("{} must carry a string value", COMPONENT_NAME_KEY),
                }
                continue;
            }
            if let Some(value) = self.convert_custom_value(&custom.value) {
                node.custom_params.insert(key.to_string(), value);
            }
        }

        for binding in &element.events {
            match self.doc.string(binding.handler_index) {
                Some(handler) => node
                    .event_handlers
                    .push((binding.event_type, handler.to_string())),
                None => warn!(
                    event = ?binding.event_type,
                    "event binding has no handler name; skipping"
                ),
            }
        }

        node
    }

    fn apply_style_chain(&self, node: &mut RenderNode, style_id: u8) {
        if style_id == 0 {
            return;
        }
        let Some(style) = self.doc.style_by_id(style_id) else {
            warn!(style_id, "element references a missing style");
            return;
        };
        for property in &style.properties {
            self.apply_property(node, property.id, &property.value);
        }
    }

    fn apply_property(&self, node: &mut RenderNode, id: PropertyId, value: &PropertyValue) {
        match id {
            PropertyId::BackgroundColor => {
                if let Some(color) = value.as_color() {
                    node.background_color = color;
                } else {
                    warn!("background color must be a 4-byte RGBA value");
                }
            }
            PropertyId::ForegroundColor => {
                if let Some(color) = value.as_color() {
                    node.foreground_color = Some(color);
                } else {
                    warn!("foreground color must be a 4-byte RGBA value");
                }
            }
            PropertyId::BorderColor => {
                if let Some(color) = value.as_color() {
                    node.border_color = Some(color);
                } else {
                    warn!("border color must be a 4-byte RGBA value");
                }
            }
            PropertyId::BorderWidth => {
                if let Some(insets) = self.edge_insets_of(value) {
                    node.border_widths = insets;
                } else {
                    warn!("border width must be 1 uniform byte or 4 per-edge bytes");
                }
            }
            PropertyId::BorderRadius => {
                if let Some(radius) = value.as_float() {
                    node.border_radius = radius;
                }
            }
            PropertyId::Padding => {
                if let Some(insets) = self.edge_insets_of(value) {
                    node.padding = insets;
                } else {
                    warn!("padding must be 1 uniform byte or 4 per-edge bytes");
                }
            }
            PropertyId::Margin => {
                if let Some(insets) = self.edge_insets_of(value) {
                    node.margin = insets;
                } else {
                    warn!("margin must be 1 uniform byte or 4 per-edge bytes");
                }
            }
            PropertyId::TextContent => {
                if let PropertyValue::StringIndex(index) = value {
                    match self.doc.string(*index) {
                        Some(text) => node.text = text.to_string(),
                        None => node.text.clear(),
                    }
                }
            }
            PropertyId::FontSize => {
                if let Some(size) = value.as_float() {
                    if size > 0.0 {
                        node.font_size = Some(size);
                    }
                }
            }
            PropertyId::FontWeight => {
                if let PropertyValue::Short(weight) = value {
                    node.font_weight = Some(FontWeight::from_value(*weight));
                }
            }
            PropertyId::TextAlignment => match value {
                PropertyValue::Enum(v) | PropertyValue::Byte(v) => {
                    node.text_alignment = Some(TextAlignment::from_value(*v));
                }
                _ => {}
            },
            PropertyId::ImageSource => {
                if let PropertyValue::ResourceIndex(index) = value {
                    node.resource = (*index != 0).then_some(*index);
                }
            }
            PropertyId::Opacity => match value {
                PropertyValue::Byte(b) => node.opacity = *b as f32 / 255.0,
                PropertyValue::Percentage(fraction) => node.opacity = fraction.clamp(0.0, 1.0),
                _ => {}
            },
            PropertyId::ZIndex => {
                if let PropertyValue::Short(z) = value {
                    node.z_index = *z as i16;
                }
            }
            PropertyId::Visibility => match value {
                PropertyValue::Enum(v) | PropertyValue::Byte(v) => {
                    node.visibility = Some(match v {
                        1 => Visibility::Hidden,
                        2 => Visibility::Collapse,
                        _ => Visibility::Visible,
                    });
                }
                _ => {}
            },
            PropertyId::Gap => {
                if let Some(gap) = value.as_float() {
                    node.gap = gap.max(0.0);
                }
            }
            PropertyId::MinWidth => node.min_width = self.dimension_of(value),
            PropertyId::MinHeight => node.min_height = self.dimension_of(value),
            PropertyId::MaxWidth => node.max_width = self.dimension_of(value),
            PropertyId::MaxHeight => node.max_height = self.dimension_of(value),
            PropertyId::Overflow => match value {
                PropertyValue::Enum(v) | PropertyValue::Byte(v) => {
                    node.overflow = if *v == 0 {
                        OverflowMode::Visible
                    } else {
                        OverflowMode::Hidden
                    };
                }
                _ => {}
            },
            PropertyId::LayoutFlags => {
                if let PropertyValue::Byte(bits) = value {
                    node.layout = *bits;
                }
            }
            PropertyId::CustomData => {
                trace!("opaque custom data blob carried without interpretation");
            }
            PropertyId::WindowWidth
            | PropertyId::WindowHeight
            | PropertyId::WindowTitle
            | PropertyId::Resizable
            | PropertyId::KeepAspect
            | PropertyId::ScaleFactor
            | PropertyId::Icon
            | PropertyId::Version
            | PropertyId::Author => {
                // App-scoped; the runtime reads these from the document when
                // it assembles the window configuration.
            }
            PropertyId::Unknown(code) => {
                trace!(code, "unknown property id ignored");
            }
        }
    }

    fn edge_insets_of(&self, value: &PropertyValue) -> Option<EdgeInsets> {
        match value {
            PropertyValue::Byte(b) => Some(EdgeInsets::uniform(*b as f32)),
            PropertyValue::Raw {
                value_type: ValueType::EdgeInsets,
                bytes,
            } => EdgeInsets::from_bytes(bytes),
            _ => None,
        }
    }

    fn dimension_of(&self, value: &PropertyValue) -> Option<Dimension> {
        match value {
            PropertyValue::Byte(b) => Some(Dimension::Pixels(*b as f32)),
            PropertyValue::Short(s) => Some(Dimension::Pixels(*s as f32)),
            PropertyValue::Percentage(fraction) => Some(Dimension::Fraction(*fraction)),
            _ => None,
        }
    }

    fn convert_custom_value(&self, value: &PropertyValue) -> Option<CustomValue> {
        match value {
            PropertyValue::StringIndex(index) => Some(CustomValue::Text(
                self.doc.string(*index).unwrap_or_default().to_string(),
            )),
            PropertyValue::Byte(b) => Some(CustomValue::Number(*b as f32)),
            PropertyValue::Short(s) => Some(CustomValue::Number(*s as f32)),
            PropertyValue::Enum(e) => Some(CustomValue::Number(*e as f32)),
            PropertyValue::Percentage(fraction) => Some(CustomValue::Number(*fraction)),
            _ => None,
        }
    }

    /// Step F: selective inheritance, pre-order. Exactly five properties
    /// flow down: foreground color, font size, font weight, text alignment,
    /// and visibility.
    fn inherit(&mut self, roots: &[NodeId]) {
        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(parent) = self.nodes[id].parent {
                let (foreground, font_size, font_weight, alignment, visibility) = {
                    let p = &self.nodes[parent];
                    (
                        p.foreground_color,
                        p.font_size,
                        p.font_weight,
                        p.text_alignment,
                        p.visibility,
                    )
                };
                let node = &mut self.nodes[id];
                if node.foreground_color.is_none() {
                    node.foreground_color = foreground;
                }
                if node.font_size.is_none() {
                    node.font_size = font_size;
                }
                if node.font_weight.is_none() {
                    node.font_weight = font_weight;
                }
                if node.text_alignment.is_none() {
                    node.text_alignment = alignment;
                }
                if node.visibility.is_none() {
                    node.visibility = visibility;
                }
            }
            let node = &self.nodes[id];
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    fn finish(mut self, stream_roots: Vec<NodeId>) -> RenderTree {
        let roots: Vec<NodeId> = stream_roots
            .into_iter()
            .filter(|&id| !self.dead[id])
            .collect();
        if roots.is_empty() && !self.nodes.is_empty() {
            warn!("document produced no root elements");
        }
        self.inherit(&roots);
        RenderTree {
            nodes: self.nodes,
            roots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode_element_substream, serialize, CustomProperty, DocumentBuilder, Property,
    };

    fn app_element(width: u16, height: u16) -> Element {
        let mut e = Element::new(ElementType::App);
        e.header.width = width;
        e.header.height = height;
        e
    }

    fn text_element(builder: &mut DocumentBuilder, text: &str) -> Element {
        let index = builder.add_string(text);
        let mut e = Element::new(ElementType::Text);
        e.properties.push(Property {
            id: PropertyId::TextContent,
            value: PropertyValue::StringIndex(index),
        });
        e
    }

    #[test]
    fn links_children_by_relative_offset() {
        let mut builder = DocumentBuilder::new();
        let root = builder.add_element(app_element(640, 480));
        let a = builder.add_element(Element::new(ElementType::Container));
        let b = builder.add_element(Element::new(ElementType::Button));
        builder.link(root, a);
        builder.link(a, b);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        assert_eq!(tree.roots, vec![0]);
        assert_eq!(tree.node(0).children, vec![1]);
        assert_eq!(tree.node(1).children, vec![2]);
        assert_eq!(tree.node(2).parent, Some(1));
        assert_eq!(tree.node(1).parent, Some(0));
    }

    #[test]
    fn broken_child_reference_drops_only_that_subtree() {
        let mut builder = DocumentBuilder::new();
        let root = builder.add_element(app_element(640, 480));
        let good = builder.add_element(Element::new(ElementType::Container));
        let bad = builder.add_element(Element::new(ElementType::Container));
        let orphaned = builder.add_element(Element::new(ElementType::Button));
        builder.link(root, good);
        builder.link(root, bad);
        builder.link(bad, orphaned);
        let mut doc = builder.build().unwrap();

        // Corrupt the second child reference so it points between headers.
        doc.elements[2].child_offsets[0] += 3;
        let doc = crate::parse(&serialize(&doc).unwrap()).unwrap();

        let tree = build_render_tree(&doc);
        // root keeps its intact child; the element with the broken
        // reference is gone from the linked tree
        assert_eq!(tree.node(0).children, vec![1]);
        assert!(tree.node(2).parent.is_none());
        assert!(!tree.walk().contains(&2));
        // the would-be grandchild ends up unreferenced, so it surfaces as
        // an extra root rather than vanishing silently
        assert_eq!(tree.roots, vec![0, 3]);
    }

    #[test]
    fn cascade_applies_style_then_direct_properties() {
        let mut builder = DocumentBuilder::new();
        let style = builder.add_style(
            "panel",
            vec![
                Property {
                    id: PropertyId::BackgroundColor,
                    value: PropertyValue::Color(Vec4::new(1.0, 0.0, 0.0, 1.0)),
                },
                Property {
                    id: PropertyId::FontSize,
                    value: PropertyValue::Short(20),
                },
            ],
        );
        let mut element = app_element(100, 100);
        element.header.style_id = style;
        element.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::new(0.0, 1.0, 0.0, 1.0)),
        });
        builder.add_element(element);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        let node = tree.node(0);
        // direct property wins over the style
        assert_eq!(node.background_color, Vec4::new(0.0, 1.0, 0.0, 1.0));
        // style property without a direct override sticks
        assert_eq!(node.font_size, Some(20.0));
    }

    #[test]
    fn inheritance_covers_exactly_the_selected_properties() {
        let mut builder = DocumentBuilder::new();
        let mut root = app_element(200, 200);
        root.properties.push(Property {
            id: PropertyId::ForegroundColor,
            value: PropertyValue::Color(Vec4::ONE),
        });
        root.properties.push(Property {
            id: PropertyId::FontSize,
            value: PropertyValue::Short(22),
        });
        root.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::new(0.5, 0.5, 0.5, 1.0)),
        });
        let root = builder.add_element(root);
        let plain_element = text_element(&mut builder, "hi");
        let plain = builder.add_element(plain_element);
        let mut styled = text_element(&mut builder, "yo");
        styled.properties.push(Property {
            id: PropertyId::ForegroundColor,
            value: PropertyValue::Color(Vec4::new(1.0, 0.0, 0.0, 1.0)),
        });
        let styled = builder.add_element(styled);
        builder.link(root, plain);
        builder.link(root, styled);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        assert_eq!(tree.node(1).foreground_color, Some(Vec4::ONE));
        assert_eq!(tree.node(1).font_size, Some(22.0));
        // a set value is never overwritten by inheritance
        assert_eq!(
            tree.node(2).foreground_color,
            Some(Vec4::new(1.0, 0.0, 0.0, 1.0))
        );
        // background is not inheritable
        assert_eq!(tree.node(1).background_color, Vec4::ZERO);
    }

    fn tab_bar_template(builder: &mut DocumentBuilder) -> Vec<u8> {
        // Container { id: none } > Container { id: "content" }
        let mut root = Element::new(ElementType::Container);
        root.header.height = 50;
        let mut slot = Element::new(ElementType::Container);
        slot.header.id_index = builder.add_string(SLOT_ID);
        encode_element_substream(vec![root, slot], &[(0, 1)]).unwrap()
    }

    #[test]
    fn component_expansion_slots_usage_children() {
        let mut builder = DocumentBuilder::new();
        let template = tab_bar_template(&mut builder);
        builder.add_component("TabBar", template);

        let root = builder.add_element(app_element(360, 480));
        let component_key = builder.add_string(COMPONENT_NAME_KEY);
        let component_value = builder.add_string("TabBar");
        let position_key = builder.add_string("position");
        let position_value = builder.add_string("bottom");
        let mut instance = Element::new(ElementType::Custom(0x80));
        instance.custom_properties.push(CustomProperty {
            key_index: component_key,
            value: PropertyValue::StringIndex(component_value),
        });
        instance.custom_properties.push(CustomProperty {
            key_index: position_key,
            value: PropertyValue::StringIndex(position_value),
        });
        let instance = builder.add_element(instance);
        let button = builder.add_element({
            let mut e = Element::new(ElementType::Button);
            e.header.width = 80;
            e.header.height = 30;
            e
        });
        builder.link(root, instance);
        builder.link(instance, button);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        let instance_node = tree.node(instance);
        // the instance took the template root's shape
        assert_eq!(instance_node.element_type, ElementType::Container);
        assert_eq!(instance_node.component_name.as_deref(), Some("TabBar"));
        assert_eq!(
            instance_node.custom_params.get("position"),
            Some(&CustomValue::Text("bottom".to_string()))
        );

        // the usage-site button was slotted under the "content" element
        let slot = instance_node.children[0];
        assert_eq!(tree.node(slot).source_name, SLOT_ID);
        assert_eq!(tree.node(slot).children.len(), 1);
        let slotted = tree.node(slot).children[0];
        assert_eq!(tree.node(slotted).element_type, ElementType::Button);
        assert_eq!(tree.node(slotted).parent, Some(slot));
    }

    #[test]
    fn missing_component_drops_instance_but_not_siblings() {
        let mut builder = DocumentBuilder::new();
        let root = builder.add_element(app_element(100, 100));
        let component_key = builder.add_string(COMPONENT_NAME_KEY);
        let ghost = builder.add_string("Ghost");
        let mut instance = Element::new(ElementType::Custom(0x80));
        instance.custom_properties.push(CustomProperty {
            key_index: component_key,
            value: PropertyValue::StringIndex(ghost),
        });
        let instance = builder.add_element(instance);
        let sibling = builder.add_element(Element::new(ElementType::Container));
        builder.link(root, instance);
        builder.link(root, sibling);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        let walk = tree.walk();
        assert!(walk.contains(&sibling));
        assert!(!walk.contains(&instance));
    }

    #[test]
    fn instance_header_and_properties_override_template_root() {
        let mut builder = DocumentBuilder::new();
        let mut template_root = Element::new(ElementType::Container);
        template_root.header.height = 50;
        template_root.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::new(0.1, 0.1, 0.1, 1.0)),
        });
        let template = encode_element_substream(vec![template_root], &[]).unwrap();
        builder.add_component("Badge", template);

        let root = builder.add_element(app_element(100, 100));
        let component_key = builder.add_string(COMPONENT_NAME_KEY);
        let badge = builder.add_string("Badge");
        let mut instance = Element::new(ElementType::Custom(0x80));
        instance.header.width = 77;
        instance.custom_properties.push(CustomProperty {
            key_index: component_key,
            value: PropertyValue::StringIndex(badge),
        });
        instance.properties.push(Property {
            id: PropertyId::BackgroundColor,
            value: PropertyValue::Color(Vec4::new(0.9, 0.0, 0.0, 1.0)),
        });
        let instance = builder.add_element(instance);
        builder.link(root, instance);
        let doc = builder.build().unwrap();

        let tree = build_render_tree(&doc);
        let node = tree.node(instance);
        // the set instance width wins; the unset height keeps the
        // template root's intrinsic 50
        assert_eq!(node.declared_size, Vec2::new(77.0, 50.0));
        // instance direct property overrides the template's background
        assert_eq!(node.background_color, Vec4::new(0.9, 0.0, 0.0, 1.0));
    }
}
