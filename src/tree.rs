use crate::error::FragmentError;
use crate::id::NodeId;
use crate::wire::{InitialPayload, SubtreeFragment};
use serde_json::Value;
use std::collections::BTreeSet;

/// Presentational data for one node, handed to the renderer as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presentation {
    pub label: String,
    pub tooltip: Option<String>,
    /// Opaque style record, never interpreted here.
    pub style: Option<Value>,
    pub shape: Option<Value>,
    /// Style of the edge from this node's parent.
    pub link_style: Option<Value>,
}

impl Presentation {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Build from one row of the parallel wire columns. JSON `null` counts as absent.
    pub(crate) fn from_columns(
        text: &str,
        tooltip: Option<&String>,
        style: Option<&Value>,
        shape: Option<&Value>,
        link_style: Option<&Value>,
    ) -> Self {
        let blob = |v: Option<&Value>| v.filter(|v| !v.is_null()).cloned();
        Self {
            label: text.to_string(),
            tooltip: tooltip.cloned(),
            style: blob(style),
            shape: blob(shape),
            link_style: blob(link_style),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NodeRecord {
    /// `Some` once the child list is known; `Some(vec![])` is a true leaf.
    children: Option<Vec<NodeId>>,
    presentation: Option<Presentation>,
}

/// Largest number of id slots a store will grow to.
pub const MAX_NODES: usize = 1 << 20;

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub introduced: usize,
    pub newly_resolved: usize,
    pub frontier_added: usize,
}

impl MergeSummary {
    pub fn is_noop(&self) -> bool {
        self.newly_resolved == 0 && self.frontier_added == 0
    }
}

/// All node data known to one visualization session.
///
/// Indexed densely by [`NodeId`]. A node is either resolved (its child list
/// is installed) or in the frontier; once resolved it never returns to the
/// frontier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStore {
    nodes: Vec<NodeRecord>,
    frontier: BTreeSet<NodeId>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from the data delivered at page load.
    pub fn from_payload(payload: &InitialPayload) -> Result<Self, FragmentError> {
        let decoded = payload.decode()?;
        let mut store = Self {
            nodes: Vec::with_capacity(decoded.len()),
            frontier: BTreeSet::new(),
        };
        for (i, node) in decoded.into_iter().enumerate() {
            if node.children.is_none() {
                store.frontier.insert(NodeId::new(i as u32));
            }
            store.nodes.push(NodeRecord {
                children: node.children,
                presentation: Some(node.presentation),
            });
        }
        Ok(store)
    }

    /// Number of id slots (one past the highest known id).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the node has presentation data and can be rendered.
    pub fn contains(&self, id: NodeId) -> bool {
        self.presentation(id).is_some()
    }

    pub fn presentation(&self, id: NodeId) -> Option<&Presentation> {
        self.nodes.get(id.index())?.presentation.as_ref()
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.presentation(id).map(|p| p.label.as_str())
    }

    /// Known children, or `None` while the node's children are undiscovered.
    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id.index())?.children.as_deref()
    }

    pub fn is_resolved(&self, id: NodeId) -> bool {
        self.children(id).is_some()
    }

    pub fn is_frontier(&self, id: NodeId) -> bool {
        self.frontier.contains(&id)
    }

    pub fn frontier(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frontier.iter().copied()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Install a fetched fragment.
    ///
    /// Everything is validated before the first write, so a rejected fragment
    /// leaves the store untouched. Merging the same fragment again is a no-op.
    pub fn merge(&mut self, fragment: &SubtreeFragment) -> Result<MergeSummary, FragmentError> {
        let root = fragment.root;
        if !self.contains(root) {
            return Err(FragmentError::UnrenderableRoot(root));
        }
        if let Some(existing) = self.children(root) {
            if existing != fragment.root_children.as_slice() {
                return Err(FragmentError::ConflictingChildren(root));
            }
        }

        if let Some(node) = fragment.nodes.iter().find(|n| n.id.index() >= MAX_NODES) {
            return Err(FragmentError::IdOutOfRange {
                id: node.id,
                limit: MAX_NODES,
            });
        }

        let highest = fragment.nodes.iter().map(|n| n.id.index()).max().unwrap_or(0);
        if highest >= self.nodes.len() {
            self.nodes.resize_with(highest + 1, NodeRecord::default);
        }

        let mut summary = MergeSummary {
            introduced: fragment.nodes.len(),
            ..MergeSummary::default()
        };

        if self.resolve(root, fragment.root_children.clone()) {
            summary.newly_resolved += 1;
        }

        for node in &fragment.nodes {
            self.nodes[node.id.index()].presentation = Some(node.presentation.clone());
            if self.is_resolved(node.id) {
                continue;
            }
            match &node.children {
                Some(children) => {
                    if self.resolve(node.id, children.clone()) {
                        summary.newly_resolved += 1;
                    }
                }
                None => {
                    if self.frontier.insert(node.id) {
                        summary.frontier_added += 1;
                    }
                }
            }
        }

        tracing::debug!(
            root = %root,
            introduced = summary.introduced,
            resolved = summary.newly_resolved,
            frontier = self.frontier.len(),
            "merged fragment"
        );
        Ok(summary)
    }

    /// Returns false if the node was already resolved.
    fn resolve(&mut self, id: NodeId, children: Vec<NodeId>) -> bool {
        self.frontier.remove(&id);
        let record = &mut self.nodes[id.index()];
        if record.children.is_some() {
            return false;
        }
        record.children = Some(children);
        true
    }
}
