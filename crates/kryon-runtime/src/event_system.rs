// crates/kryon-runtime/src/event_system.rs
use glam::Vec4;
use kryon_core::{NodeId, RenderTree, Visibility};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A deferred change to the tree. Event handlers queue these instead of
/// touching geometry, so a handler can never trigger a recursive layout;
/// the queue drains right before the next layout pass.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMutation {
    SetText { node: NodeId, text: String },
    SetVisibility { node: NodeId, visibility: Visibility },
    SetBackground { node: NodeId, color: Vec4 },
}

pub type EventHandler = Box<dyn FnMut(NodeId, &mut Vec<UiMutation>)>;

/// Name-keyed callback dispatch. Registration is append-only during
/// initialization; lookups during a frame are read-only. An unknown
/// handler name warns once and is silent afterwards.
#[derive(Default)]
pub struct EventSystem {
    handlers: HashMap<String, EventHandler>,
    missing_warned: HashSet<String>,
    queue: Vec<UiMutation>,
}

impl EventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: EventHandler) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            warn!(name, "event handler registered twice; keeping the newer one");
        }
    }

    pub fn dispatch(&mut self, name: &str, node: NodeId) {
        match self.handlers.get_mut(name) {
            Some(handler) => {
                debug!(name, node, "dispatching event handler");
                handler(node, &mut self.queue);
            }
            None => {
                if self.missing_warned.insert(name.to_string()) {
                    warn!(name, "no handler registered for event callback");
                }
            }
        }
    }

    /// Applies every queued mutation. Returns true when anything changed,
    /// which schedules a fresh layout pass.
    pub fn apply_queued(&mut self, tree: &mut RenderTree) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        for mutation in self.queue.drain(..) {
            match mutation {
                UiMutation::SetText { node, text } => {
                    tree.node_mut(node).text = text;
                }
                UiMutation::SetVisibility { node, visibility } => {
                    tree.node_mut(node).visibility = Some(visibility);
                }
                UiMutation::SetBackground { node, color } => {
                    tree.node_mut(node).background_color = color;
                }
            }
        }
        true
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kryon_core::{RenderNode, RenderTree};
    use std::cell::Cell;
    use std::rc::Rc;

    fn one_node_tree() -> RenderTree {
        RenderTree {
            nodes: vec![RenderNode::default()],
            roots: vec![0],
        }
    }

    #[test]
    fn dispatch_runs_the_registered_handler() {
        let mut events = EventSystem::new();
        let fired = Rc::new(Cell::new(0));
        let seen = fired.clone();
        events.register(
            "on_click",
            Box::new(move |node, queue| {
                seen.set(seen.get() + 1);
                queue.push(UiMutation::SetText {
                    node,
                    text: "clicked".to_string(),
                });
            }),
        );

        events.dispatch("on_click", 0);
        assert_eq!(fired.get(), 1);
        assert_eq!(events.pending(), 1);

        let mut tree = one_node_tree();
        assert!(events.apply_queued(&mut tree));
        assert_eq!(tree.node(0).text, "clicked");
        assert_eq!(events.pending(), 0);
    }

    #[test]
    fn unknown_handlers_are_silent_after_the_first_warning() {
        let mut events = EventSystem::new();
        events.dispatch("missing", 0);
        events.dispatch("missing", 0);
        assert_eq!(events.pending(), 0);
    }
}
