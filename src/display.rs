use indextree::{Arena, NodeId as ArenaId};

use crate::id::NodeId;
use crate::tree::TreeStore;

/// Handle of a node in the display tree.
pub type DisplayId = ArenaId;

/// View state of a display node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// Never expanded. The data node may or may not have children.
    Unrevealed,
    /// Children are visible.
    Expanded,
    /// Children exist but are hidden.
    Collapsed,
}

#[derive(Debug, Clone)]
pub struct DisplayNode {
    pub data_id: NodeId,
    pub expansion: Expansion,
}

/// A node as the renderer walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleNode {
    pub display: DisplayId,
    pub data_id: NodeId,
    pub depth: usize,
    pub expansion: Expansion,
}

/// UI-facing mirror of part of the [`TreeStore`].
///
/// Display nodes are never removed. Collapsing only flips the state, so the
/// arena children of a collapsed node are exactly the children it had when
/// expanded.
pub struct DisplayTree {
    arena: Arena<DisplayNode>,
    root: DisplayId,
}

impl DisplayTree {
    /// Create a tree holding only the root display node.
    pub fn new(root_data: NodeId) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DisplayNode {
            data_id: root_data,
            expansion: Expansion::Unrevealed,
        });
        Self { arena, root }
    }

    pub fn root(&self) -> DisplayId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn node(&self, id: DisplayId) -> Option<&DisplayNode> {
        self.arena.get(id).map(|n| n.get())
    }

    pub fn data_id(&self, id: DisplayId) -> Option<NodeId> {
        self.node(id).map(|n| n.data_id)
    }

    pub fn state(&self, id: DisplayId) -> Option<Expansion> {
        self.node(id).map(|n| n.expansion)
    }

    /// Children currently shown (empty unless expanded).
    pub fn visible_children(&self, id: DisplayId) -> Vec<DisplayId> {
        match self.state(id) {
            Some(Expansion::Expanded) => id.children(&self.arena).collect(),
            _ => Vec::new(),
        }
    }

    /// Children hidden by a collapse (empty unless collapsed).
    pub fn collapsed_children(&self, id: DisplayId) -> Vec<DisplayId> {
        match self.state(id) {
            Some(Expansion::Collapsed) => id.children(&self.arena).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the renderer should mark this node as holding hidden children.
    pub fn has_hidden_children(&self, id: DisplayId) -> bool {
        self.state(id) == Some(Expansion::Collapsed)
    }

    /// Create one level of display children from the store and mark the node
    /// expanded. Only valid from `Unrevealed` with resolved data.
    pub fn materialize(&mut self, id: DisplayId, store: &TreeStore) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.expansion != Expansion::Unrevealed {
            return false;
        }
        let Some(children) = store.children(node.data_id) else {
            return false;
        };

        for &child in children {
            let child_id = self.arena.new_node(DisplayNode {
                data_id: child,
                expansion: Expansion::Unrevealed,
            });
            id.append(child_id, &mut self.arena);
        }
        self.set_state(id, Expansion::Expanded);
        true
    }

    /// Hide the children of an expanded node.
    pub fn collapse(&mut self, id: DisplayId) -> bool {
        self.transition(id, Expansion::Expanded, Expansion::Collapsed)
    }

    /// Show the children of a collapsed node again.
    pub fn uncollapse(&mut self, id: DisplayId) -> bool {
        self.transition(id, Expansion::Collapsed, Expansion::Expanded)
    }

    /// Materialize up to `depth` levels below `id` from already-known data.
    /// Nodes whose children are undiscovered stay unrevealed.
    pub fn expand_known(&mut self, id: DisplayId, depth: usize, store: &TreeStore) {
        let mut level = vec![id];
        for _ in 0..depth {
            let mut next = Vec::new();
            for node in level {
                if self.state(node) == Some(Expansion::Unrevealed) {
                    self.materialize(node, store);
                }
                next.extend(self.visible_children(node));
            }
            if next.is_empty() {
                break;
            }
            level = next;
        }
    }

    /// Pre-order walk of everything currently on screen.
    pub fn visible_nodes(&self) -> Vec<VisibleNode> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            out.push(VisibleNode {
                display: id,
                data_id: node.data_id,
                depth,
                expansion: node.expansion,
            });
            for child in self.visible_children(id).into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }

    fn transition(&mut self, id: DisplayId, from: Expansion, to: Expansion) -> bool {
        if self.state(id) != Some(from) {
            return false;
        }
        self.set_state(id, to);
        true
    }

    fn set_state(&mut self, id: DisplayId, expansion: Expansion) {
        if let Some(node) = self.arena.get_mut(id) {
            node.get_mut().expansion = expansion;
        }
    }
}
