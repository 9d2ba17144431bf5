// crates/kryon-layout/src/engine.rs
use crate::{LayoutAlignment, LayoutFlags, TextMeasure};
use glam::Vec2;
use kryon_core::{LayoutState, NodeId, RenderTree, Visibility};
use tracing::trace;

/// Where a measured size came from. Stretch and grow only ever touch sizes
/// that were defaulted, never explicit or intrinsic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeSource {
    Explicit,
    Intrinsic,
    Default,
}

/// Two-pass flex-style layout: a measurement preamble resolves each node's
/// size against the space its parent offers, then placement walks parent
/// before children, distributing grow space and aligning along both axes.
/// Strictly single-threaded; geometry lands directly on the render nodes.
pub struct LayoutEngine {
    scale: f32,
    sources: Vec<(SizeSource, SizeSource)>,
    available: Vec<Vec2>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::with_scale(1.0)
    }

    pub fn with_scale(scale: f32) -> Self {
        Self {
            scale: if scale > 0.0 { scale } else { 1.0 },
            sources: Vec::new(),
            available: Vec::new(),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        if scale > 0.0 {
            self.scale = scale;
        }
    }

    /// Full pass over the tree. Roots without explicit dimensions inherit
    /// the viewport.
    pub fn compute(&mut self, tree: &mut RenderTree, viewport: Vec2, text: &dyn TextMeasure) {
        self.sources = vec![(SizeSource::Default, SizeSource::Default); tree.len()];
        self.available = vec![viewport; tree.len()];
        for node in tree.nodes.iter_mut() {
            node.layout_state = LayoutState::Unmeasured;
        }

        let roots = tree.roots.clone();
        for root in roots {
            self.measure(tree, root, viewport, text);
            let origin = tree.node(root).position * self.scale;
            tree.node_mut(root).layout_position = origin;
            self.place(tree, root, text);
        }
    }

    /// Re-lays out one subtree against the node's current box. The node's
    /// own geometry is taken as-is; only its descendants move. Used by the
    /// custom-component pass after it adjusts a frame.
    pub fn relayout_subtree(&mut self, tree: &mut RenderTree, id: NodeId, text: &dyn TextMeasure) {
        if self.sources.len() != tree.len() {
            self.sources
                .resize(tree.len(), (SizeSource::Default, SizeSource::Default));
            self.available.resize(tree.len(), Vec2::ZERO);
        }
        tree.node_mut(id).layout_state = LayoutState::Measured;
        self.place(tree, id, text);
    }

    /// The measurement preamble: explicit header sizes win, text and images
    /// size to their content, containers default to the space offered.
    fn measure(&mut self, tree: &mut RenderTree, id: NodeId, offered: Vec2, text: &dyn TextMeasure) {
        self.available[id] = offered;

        let node = tree.node(id);
        let padding = node.padding.scaled(self.scale);
        let font_size = node.effective_font_size() * self.scale;

        let (mut width, width_source) = if node.declared_size.x > 0.0 {
            (node.declared_size.x * self.scale, SizeSource::Explicit)
        } else if node.element_type.is_text_like() && !node.text.is_empty() {
            let measured = text.measure_text(&node.text, font_size);
            (measured.x + padding.horizontal(), SizeSource::Intrinsic)
        } else if let Some(texture) = node.texture {
            (
                texture.size.x * self.scale + padding.horizontal(),
                SizeSource::Intrinsic,
            )
        } else {
            (offered.x, SizeSource::Default)
        };

        let (mut height, height_source) = if node.declared_size.y > 0.0 {
            (node.declared_size.y * self.scale, SizeSource::Explicit)
        } else if node.element_type.is_text_like() && !node.text.is_empty() {
            (font_size + padding.vertical(), SizeSource::Intrinsic)
        } else if let Some(texture) = node.texture {
            (
                texture.size.y * self.scale + padding.vertical(),
                SizeSource::Intrinsic,
            )
        } else {
            (offered.y, SizeSource::Default)
        };

        if let Some(max) = node.max_width {
            width = width.min(max.resolve(offered.x, self.scale));
        }
        if let Some(max) = node.max_height {
            height = height.min(max.resolve(offered.y, self.scale));
        }

        self.sources[id] = (width_source, height_source);
        let node = tree.node_mut(id);
        node.layout_size = Vec2::new(width.max(0.0), height.max(0.0));
        node.layout_state = LayoutState::Measured;
    }

    /// The positioning finale for one container: measures the children
    /// against the content box, distributes grow space, aligns both axes,
    /// then recurses and applies the trailing adjustments (hug, min/max,
    /// collapsed-size fallback).
    fn place(&mut self, tree: &mut RenderTree, id: NodeId, text: &dyn TextMeasure) {
        let flags = LayoutFlags::from_bits(tree.node(id).layout);
        let (content_origin, content_size) = tree.node(id).content_box(self.scale);
        let children = tree.node(id).children.clone();

        let mut flow = Vec::new();
        let mut absolute = Vec::new();
        let mut live = Vec::new();
        for &child in &children {
            // Collapsed children leave the layout entirely; hidden ones
            // keep their box and are merely skipped at draw time.
            if tree.node(child).effective_visibility() == Visibility::Collapse {
                let node = tree.node_mut(child);
                node.layout_size = Vec2::ZERO;
                node.layout_state = LayoutState::Placed;
                continue;
            }
            live.push(child);
            if LayoutFlags::from_bits(tree.node(child).layout).absolute {
                absolute.push(child);
            } else {
                flow.push(child);
            }
        }
        let children = live;

        for &child in &children {
            self.measure(tree, child, content_size, text);
        }

        // Absolute children anchor to the parent's outer corner.
        let parent_origin = tree.node(id).layout_position;
        for &child in &absolute {
            let offset = tree.node(child).position * self.scale;
            tree.node_mut(child).layout_position = parent_origin + offset;
        }

        if !flow.is_empty() {
            self.place_flow_children(tree, id, &flow, flags, content_origin, content_size);
        }

        for &child in &children {
            self.place(tree, child, text);
        }

        self.hug_content(tree, id, &flow, flags, content_origin);
        self.clamp_min_max(tree, id);
        self.apply_collapsed_fallback(tree, id);
        tree.node_mut(id).layout_state = LayoutState::Placed;
    }

    fn place_flow_children(
        &mut self,
        tree: &mut RenderTree,
        parent: NodeId,
        flow: &[NodeId],
        flags: LayoutFlags,
        content_origin: Vec2,
        content_size: Vec2,
    ) {
        let row = flags.direction.is_row();
        let main_avail = if row { content_size.x } else { content_size.y };
        let cross_avail = if row { content_size.y } else { content_size.x };
        let gap = tree.node(parent).gap * self.scale;

        // Grow children restart from their explicit main size (or zero);
        // their defaulted measurement would otherwise swallow the container.
        let mut main_sizes = Vec::with_capacity(flow.len());
        let mut grow_slots = Vec::new();
        for (index, &child) in flow.iter().enumerate() {
            let child_flags = LayoutFlags::from_bits(tree.node(child).layout);
            let main = if child_flags.grow {
                grow_slots.push(index);
                let declared = if row {
                    tree.node(child).declared_size.x
                } else {
                    tree.node(child).declared_size.y
                };
                if declared > 0.0 {
                    declared * self.scale
                } else {
                    0.0
                }
            } else {
                let size = tree.node(child).layout_size;
                if row {
                    size.x
                } else {
                    size.y
                }
            };
            main_sizes.push(main);
        }

        let gaps_total = gap * (flow.len().saturating_sub(1)) as f32;
        let used_main: f32 = main_sizes.iter().sum::<f32>() + gaps_total;
        let leftover = main_avail - used_main;

        if !grow_slots.is_empty() && leftover > 0.0 {
            // Whole-pixel shares; the remainder goes to the first grow child.
            let share = (leftover / grow_slots.len() as f32).floor();
            let remainder = leftover - share * (grow_slots.len() as f32 - 1.0);
            for (position, &index) in grow_slots.iter().enumerate() {
                main_sizes[index] += if position == 0 { remainder } else { share };
            }
        } else if !grow_slots.is_empty() {
            trace!(parent, leftover, "no space to grow into; overflow allowed");
        }

        // Write the resolved main sizes back, and stretch defaulted cross
        // sizes to fill the container.
        for (index, &child) in flow.iter().enumerate() {
            let (width_source, height_source) = self.sources[child];
            let node = tree.node_mut(child);
            if row {
                node.layout_size.x = main_sizes[index];
                if height_source == SizeSource::Default {
                    node.layout_size.y = cross_avail;
                }
            } else {
                node.layout_size.y = main_sizes[index];
                if width_source == SizeSource::Default {
                    node.layout_size.x = cross_avail;
                }
            }
        }

        let used_main: f32 = main_sizes.iter().sum::<f32>() + gaps_total;
        let mut spacing = gap;
        let mut cursor = match flags.alignment {
            LayoutAlignment::Start => 0.0,
            LayoutAlignment::Center => (main_avail - used_main) / 2.0,
            LayoutAlignment::End => main_avail - used_main,
            LayoutAlignment::SpaceBetween => {
                if flow.len() > 1 {
                    let surplus = (main_avail - used_main).max(0.0);
                    spacing = gap + surplus / (flow.len() - 1) as f32;
                }
                0.0
            }
        };

        // Reversed directions iterate the stored order backwards with the
        // same start offset.
        let order: Vec<usize> = if flags.direction.is_reversed() {
            (0..flow.len()).rev().collect()
        } else {
            (0..flow.len()).collect()
        };

        for index in order {
            let child = flow[index];
            let (width_source, height_source) = self.sources[child];
            let node = tree.node(child);
            let cross_size = if row {
                node.layout_size.y
            } else {
                node.layout_size.x
            };
            let cross_source = if row { height_source } else { width_source };
            let cross = if cross_source == SizeSource::Default {
                0.0
            } else {
                cross_offset(cross_size, cross_avail, flags.alignment)
            };

            // Header positions are additive offsets for flow children.
            let authored = node.position * self.scale;
            let position = if row {
                content_origin + Vec2::new(cursor, cross)
            } else {
                content_origin + Vec2::new(cross, cursor)
            } + authored;

            tree.node_mut(child).layout_position = position;
            cursor += main_sizes[index] + spacing;
        }
    }

    /// A non-root, non-grow, non-absolute container without an explicit
    /// size hugs its flow children after they are placed.
    fn hug_content(
        &mut self,
        tree: &mut RenderTree,
        id: NodeId,
        flow: &[NodeId],
        flags: LayoutFlags,
        content_origin: Vec2,
    ) {
        if flow.is_empty()
            || tree.node(id).parent.is_none()
            || flags.grow
            || flags.absolute
        {
            return;
        }

        let node = tree.node(id);
        let borders = node.border_widths.scaled(self.scale);
        let padding = node.padding.scaled(self.scale);
        let (width_source, height_source) = self.sources[id];

        let mut extent = Vec2::ZERO;
        for &child in flow {
            let child_node = tree.node(child);
            let end = child_node.layout_position + child_node.layout_size - content_origin;
            extent = extent.max(end);
        }

        let node = tree.node_mut(id);
        if width_source != SizeSource::Explicit {
            let hugged = extent.x + padding.horizontal() + borders.horizontal();
            if hugged < node.layout_size.x {
                node.layout_size.x = hugged;
            }
        }
        if height_source != SizeSource::Explicit {
            let hugged = extent.y + padding.vertical() + borders.vertical();
            if hugged < node.layout_size.y {
                node.layout_size.y = hugged;
            }
        }
    }

    /// Min/max constraints clamp last, with percentages resolved against
    /// the space the parent offered this node.
    fn clamp_min_max(&self, tree: &mut RenderTree, id: NodeId) {
        let reference = self.available[id];
        let node = tree.node_mut(id);
        if let Some(min) = node.min_width {
            node.layout_size.x = node.layout_size.x.max(min.resolve(reference.x, self.scale));
        }
        if let Some(min) = node.min_height {
            node.layout_size.y = node.layout_size.y.max(min.resolve(reference.y, self.scale));
        }
        if let Some(max) = node.max_width {
            node.layout_size.x = node.layout_size.x.min(max.resolve(reference.x, self.scale));
        }
        if let Some(max) = node.max_height {
            node.layout_size.y = node.layout_size.y.min(max.resolve(reference.y, self.scale));
        }
    }

    /// A collapsed node that still paints something gets a minimum visible
    /// size on the collapsed axis.
    fn apply_collapsed_fallback(&self, tree: &mut RenderTree, id: NodeId) {
        let node = tree.node(id);
        if !node.has_visible_chrome() {
            return;
        }
        let borders = node.border_widths.scaled(self.scale);
        let padding = node.padding.scaled(self.scale);
        let minimum = (node.effective_font_size() * self.scale)
            .max(padding.horizontal() + borders.horizontal())
            .max(padding.vertical() + borders.vertical())
            .max(self.scale);

        let node = tree.node_mut(id);
        if node.layout_size.x == 0.0 {
            node.layout_size.x = minimum;
        }
        if node.layout_size.y == 0.0 {
            node.layout_size.y = minimum;
        }
    }
}

fn cross_offset(size: f32, available: f32, alignment: LayoutAlignment) -> f32 {
    match alignment {
        LayoutAlignment::Start | LayoutAlignment::SpaceBetween => 0.0,
        LayoutAlignment::Center => (available - size) / 2.0,
        LayoutAlignment::End => available - size,
    }
}
