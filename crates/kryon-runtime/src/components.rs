// crates/kryon-runtime/src/components.rs
use glam::Vec2;
use kryon_core::{LayoutState, NodeId, RenderTree, LAYOUT_ABSOLUTE_BIT};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Height a TabBar falls back to when neither its usage site nor its
/// template declared one.
const DEFAULT_TAB_BAR_HEIGHT: f32 = 50.0;

/// A post-layout adjustment for one recognized component. Runs on `Placed`
/// nodes, may move and resize the node and its siblings, and names the
/// subtrees whose children must be laid out again against their new boxes.
/// Adjusters read the tree only; the decoded document is never touched.
pub trait ComponentAdjuster {
    fn adjust(&self, tree: &mut RenderTree, node: NodeId, scale: f32) -> Vec<NodeId>;
}

/// Registry of adjusters keyed by component name. Registration is
/// append-only during initialization.
pub struct ComponentRegistry {
    adjusters: HashMap<String, Box<dyn ComponentAdjuster>>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            adjusters: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("TabBar", Box::new(TabBarAdjuster));
        registry
    }

    pub fn register(&mut self, name: &str, adjuster: Box<dyn ComponentAdjuster>) {
        self.adjusters.insert(name.to_string(), adjuster);
    }

    /// One pass over the placed tree; returns the subtree roots that need a
    /// local re-layout.
    pub fn run_pass(&self, tree: &mut RenderTree, scale: f32) -> Vec<NodeId> {
        let mut dirty = Vec::new();
        for id in tree.walk() {
            if tree.node(id).layout_state != LayoutState::Placed {
                continue;
            }
            let Some(name) = tree.node(id).component_name.clone() else {
                continue;
            };
            let Some(adjuster) = self.adjusters.get(&name) else {
                trace!(component = %name, "no adjuster registered");
                continue;
            };
            debug!(component = %name, node = id, "running component adjuster");
            let touched = adjuster.adjust(tree, id, scale);
            for &node in &touched {
                tree.node_mut(node).layout_state = LayoutState::Measured;
            }
            dirty.extend(touched);
        }
        dirty
    }
}

/// Docks the bar to the top or bottom edge of its parent's content box
/// (per its `position` parameter), stretches it across the full width, and
/// gives the reclaimed space to the single nearest non-TabBar flow sibling.
pub struct TabBarAdjuster;

impl ComponentAdjuster for TabBarAdjuster {
    fn adjust(&self, tree: &mut RenderTree, node: NodeId, scale: f32) -> Vec<NodeId> {
        let Some(parent) = tree.node(node).parent else {
            return Vec::new();
        };
        let (content_origin, content_size) = tree.node(parent).content_box(scale);

        let dock = tree
            .node(node)
            .custom_params
            .get("position")
            .and_then(|v| v.as_text())
            .unwrap_or("bottom")
            .to_string();

        let mut height = tree.node(node).layout_size.y;
        if height <= 0.0 {
            height = DEFAULT_TAB_BAR_HEIGHT * scale;
        }
        let height = height.min(content_size.y);

        let bar_y = if dock == "top" {
            content_origin.y
        } else {
            content_origin.y + content_size.y - height
        };

        {
            let bar = tree.node_mut(node);
            bar.layout_size = Vec2::new(content_size.x, height);
            bar.layout_position = Vec2::new(content_origin.x, bar_y);
        }

        let Some(sibling) = nearest_flow_sibling(tree, parent, node) else {
            return vec![node];
        };

        {
            let body = tree.node_mut(sibling);
            body.layout_size.y = (content_size.y - height).max(0.0);
            body.layout_position.y = if dock == "top" {
                content_origin.y + height
            } else {
                content_origin.y
            };
        }

        vec![sibling, node]
    }
}

/// The single nearest non-TabBar flow sibling: preceding first, then
/// following.
fn nearest_flow_sibling(tree: &RenderTree, parent: NodeId, node: NodeId) -> Option<NodeId> {
    let siblings = &tree.node(parent).children;
    let index = siblings.iter().position(|&c| c == node)?;

    let eligible = |id: NodeId| {
        let candidate = tree.node(id);
        candidate.component_name.as_deref() != Some("TabBar")
            && candidate.layout & LAYOUT_ABSOLUTE_BIT == 0
    };

    siblings[..index]
        .iter()
        .rev()
        .copied()
        .find(|&id| eligible(id))
        .or_else(|| siblings[index + 1..].iter().copied().find(|&id| eligible(id)))
}
