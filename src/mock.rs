//! In-memory fetcher for demos and tests.

use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::thread;
use std::time::Duration;

use crate::error::FetchError;
use crate::fetch::SubtreeFetcher;
use crate::id::NodeId;
use crate::tree::Presentation;
use crate::wire::{encode_id, InitialPayload, WireFragment};

#[derive(Debug, Clone)]
struct SourceNode {
    children: Vec<NodeId>,
    presentation: Presentation,
}

/// The complete tree a [`MockFetcher`] serves from.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    nodes: Vec<SourceNode>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no parent yet.
    pub fn add_node(&mut self, label: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(SourceNode {
            children: Vec::new(),
            presentation: Presentation::new(label),
        });
        id
    }

    /// Add a node as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, label: impl Into<String>) -> NodeId {
        let id = self.add_node(label);
        self.link(parent, id);
        id
    }

    /// Make an existing node a child of `parent` (allows shared subtrees).
    /// Unknown ids on either side are ignored.
    pub fn link(&mut self, parent: NodeId, child: NodeId) {
        if child.index() >= self.nodes.len() {
            return;
        }
        if let Some(node) = self.nodes.get_mut(parent.index()) {
            node.children.push(child);
        }
    }

    pub fn set_presentation(&mut self, id: NodeId, presentation: Presentation) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.presentation = presentation;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id.index()).map(|n| n.children.as_slice())
    }

    /// Uniform tree with `branching` children per node, `depth` levels below
    /// the root. Ids are assigned breadth-first, labels are dotted paths.
    pub fn generate(branching: usize, depth: usize) -> Self {
        let mut tree = Self::new();
        let root = tree.add_node("root");
        let mut level = vec![(root, String::new())];
        for _ in 0..depth {
            let mut next = Vec::new();
            for (parent, path) in level {
                for i in 1..=branching {
                    let child_path = if path.is_empty() {
                        i.to_string()
                    } else {
                        format!("{path}.{i}")
                    };
                    let child = tree.add_child(parent, format!("node {child_path}"));
                    next.push((child, child_path));
                }
            }
            level = next;
        }
        tree
    }

    /// Page-load payload covering `levels` resolved levels below `root`.
    ///
    /// Positions up to the highest reached id are all filled; nodes outside
    /// the resolved region are sent unexpanded unless they are leaves.
    pub fn initial_payload(&self, root: NodeId, levels: usize) -> InitialPayload {
        let mut resolved = HashSet::new();
        let mut highest = root.index();
        let mut level = vec![root];
        for _ in 0..levels {
            let mut next = Vec::new();
            for id in level {
                if !resolved.insert(id) {
                    continue;
                }
                for &child in self.children(id).unwrap_or_default() {
                    highest = highest.max(child.index());
                    next.push(child);
                }
            }
            level = next;
        }

        let mut payload = InitialPayload::default();
        for (i, node) in self.nodes.iter().enumerate().take(highest + 1) {
            let id = NodeId::new(i as u32);
            if resolved.contains(&id) || node.children.is_empty() {
                payload
                    .children
                    .push(Some(node.children.iter().map(|&c| encode_id(c)).collect()));
            } else {
                payload.children.push(None);
                payload.unexpanded_children.push(encode_id(id));
            }
            push_presentation(
                &mut payload.text,
                &mut payload.tooltip,
                &mut payload.style,
                &mut payload.shape,
                &mut payload.link_style,
                &node.presentation,
            );
        }
        payload
    }

    /// Fragment for `root` carrying `prefetch_depth` levels of descendants.
    pub fn fragment(&self, root: NodeId, prefetch_depth: usize) -> Option<WireFragment> {
        let root_children = self.children(root)?;
        let mut wire = WireFragment {
            root_id: encode_id(root),
            root_children: root_children.iter().map(|&c| encode_id(c)).collect(),
            ..WireFragment::default()
        };

        let mut introduced: HashSet<NodeId> = root_children.iter().copied().collect();
        let mut queue: VecDeque<(NodeId, usize)> =
            root_children.iter().map(|&c| (c, 1)).collect();

        while let Some((id, depth)) = queue.pop_front() {
            let node = &self.nodes[id.index()];
            let fresh = !node.children.iter().any(|c| *c == root || introduced.contains(c));
            if node.children.is_empty() {
                wire.children.push(Vec::new());
            } else if depth < prefetch_depth.max(1) && fresh {
                wire.children
                    .push(node.children.iter().map(|&c| encode_id(c)).collect());
                for &child in &node.children {
                    introduced.insert(child);
                    queue.push_back((child, depth + 1));
                }
            } else {
                wire.children.push(Vec::new());
                wire.unexpanded_children.push(encode_id(id));
            }
            push_presentation(
                &mut wire.text,
                &mut wire.tooltip,
                &mut wire.style,
                &mut wire.shape,
                &mut wire.link_style,
                &node.presentation,
            );
        }
        Some(wire)
    }
}

fn push_presentation(
    text: &mut Vec<String>,
    tooltip: &mut Vec<String>,
    style: &mut Vec<serde_json::Value>,
    shape: &mut Vec<serde_json::Value>,
    link_style: &mut Vec<serde_json::Value>,
    p: &Presentation,
) {
    let blob = |v: &Option<serde_json::Value>| v.clone().unwrap_or(serde_json::Value::Null);
    text.push(p.label.clone());
    tooltip.push(p.tooltip.clone().unwrap_or_else(|| p.label.clone()));
    style.push(blob(&p.style));
    shape.push(blob(&p.shape));
    link_style.push(blob(&p.link_style));
}

/// Serves fragments from a [`SourceTree`], with knobs for tests.
pub struct MockFetcher {
    source: SourceTree,
    prefetch_depth: usize,
    latency: Duration,
    calls: DashMap<NodeId, usize>,
    failures: DashMap<NodeId, FetchError>,
}

impl MockFetcher {
    pub fn new(source: SourceTree) -> Self {
        Self {
            source,
            prefetch_depth: 2,
            latency: Duration::ZERO,
            calls: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    /// Levels of descendants included in each fragment (minimum 1).
    pub fn with_prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth.max(1);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn source(&self) -> &SourceTree {
        &self.source
    }

    /// Make the next fetch of `id` fail with `error`. Later fetches succeed.
    pub fn fail_next(&self, id: NodeId, error: FetchError) {
        self.failures.insert(id, error);
    }

    pub fn fetch_count(&self, id: NodeId) -> usize {
        self.calls.get(&id).map(|c| *c).unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }
}

impl SubtreeFetcher for MockFetcher {
    fn fetch(&self, id: NodeId) -> Result<WireFragment, FetchError> {
        *self.calls.entry(id).or_insert(0) += 1;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if let Some((_, error)) = self.failures.remove(&id) {
            return Err(error);
        }
        self.source
            .fragment(id, self.prefetch_depth)
            .ok_or(FetchError::Status(404))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_assigns_breadth_first_ids() {
        let tree = SourceTree::generate(2, 2);
        assert_eq!(tree.len(), 7);
        assert_eq!(
            tree.children(NodeId::new(0)),
            Some(&[NodeId::new(1), NodeId::new(2)][..])
        );
        assert_eq!(
            tree.children(NodeId::new(2)),
            Some(&[NodeId::new(5), NodeId::new(6)][..])
        );
    }

    #[test]
    fn test_fragment_prefetches_two_levels() {
        let tree = SourceTree::generate(2, 3);
        let wire = tree.fragment(NodeId::new(0), 2).expect("root exists");
        let decoded = wire.decode().expect("mock fragments are well formed");

        // two children resolved, four grandchildren unexpanded
        assert_eq!(decoded.nodes.len(), 6);
        assert!(decoded.nodes[..2].iter().all(|n| n.children.is_some()));
        assert!(decoded.nodes[2..].iter().all(|n| n.children.is_none()));
    }

    #[test]
    fn test_fragment_marks_leaves_resolved() {
        let tree = SourceTree::generate(3, 1);
        let decoded = tree
            .fragment(NodeId::new(0), 2)
            .expect("root exists")
            .decode()
            .expect("decodes");
        assert!(decoded.nodes.iter().all(|n| n.children == Some(Vec::new())));
    }

    #[test]
    fn test_shared_child_is_not_introduced_twice() {
        let mut tree = SourceTree::new();
        let root = tree.add_node("root");
        let a = tree.add_child(root, "a");
        let b = tree.add_child(root, "b");
        let shared = tree.add_child(a, "shared");
        tree.link(b, shared);

        let decoded = tree
            .fragment(root, 3)
            .expect("root exists")
            .decode()
            .expect("shared children must not break decoding");
        let b_node = decoded.nodes.iter().find(|n| n.id == b).expect("b introduced");
        assert_eq!(b_node.children, None);
    }

    #[test]
    fn test_link_ignores_unknown_child() {
        let mut tree = SourceTree::new();
        let root = tree.add_node("root");
        tree.add_child(root, "a");
        tree.link(root, NodeId::new(40));

        assert_eq!(tree.children(root), Some(&[NodeId::new(1)][..]));
        assert!(tree.fragment(root, 2).is_some());
    }

    #[test]
    fn test_initial_payload_resolves_requested_levels() {
        let tree = SourceTree::generate(2, 3);
        let payload = tree.initial_payload(NodeId::new(0), 1);
        assert_eq!(payload.text.len(), 3);
        assert_eq!(payload.children[0], Some(vec![2, 3]));
        assert_eq!(payload.unexpanded_children, vec![2, 3]);
        assert!(payload.decode().is_ok());
    }

    #[test]
    fn test_fail_next_only_fails_once() {
        let fetcher = MockFetcher::new(SourceTree::generate(2, 2));
        let root = NodeId::new(0);
        fetcher.fail_next(root, FetchError::Timeout);

        assert_eq!(fetcher.fetch(root), Err(FetchError::Timeout));
        assert!(fetcher.fetch(root).is_ok());
        assert_eq!(fetcher.fetch_count(root), 2);
        assert_eq!(fetcher.total_fetches(), 2);
    }

    #[test]
    fn test_unknown_node_is_not_found() {
        let fetcher = MockFetcher::new(SourceTree::generate(1, 1));
        assert_eq!(fetcher.fetch(NodeId::new(99)), Err(FetchError::Status(404)));
    }
}
