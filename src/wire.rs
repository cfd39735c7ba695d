//! Wire formats: fetch responses and the initial payload.
//!
//! Every node id *value* on the wire is 1-based. Array positions in the
//! initial payload are plain 0-based indices. [`encode_id`] and [`decode_id`]
//! are the only places the offset is applied.

use crate::error::FragmentError;
use crate::id::NodeId;
use crate::tree::Presentation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Value of the first node id on the wire.
pub const WIRE_ID_BASE: u32 = 1;

/// Encode an internal id for the wire (request path, response ids).
pub fn encode_id(id: NodeId) -> u32 {
    id.get() + WIRE_ID_BASE
}

/// Decode a wire id. `0` has no internal counterpart.
pub fn decode_id(raw: u32) -> Result<NodeId, FragmentError> {
    raw.checked_sub(WIRE_ID_BASE)
        .map(NodeId::new)
        .ok_or(FragmentError::ZeroWireId)
}

fn decode_ids(raw: &[u32]) -> Result<Vec<NodeId>, FragmentError> {
    raw.iter().map(|&r| decode_id(r)).collect()
}

/// Response body of a subtree fetch, exactly as the server sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireFragment {
    pub root_id: u32,
    pub root_children: Vec<u32>,
    #[serde(default)]
    pub children: Vec<Vec<u32>>,
    #[serde(default)]
    pub unexpanded_children: Vec<u32>,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tooltip: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_style: Vec<Value>,
}

/// A newly introduced node carried by a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentNode {
    pub id: NodeId,
    /// `None` when the node is still unexpanded (joins the frontier).
    pub children: Option<Vec<NodeId>>,
    pub presentation: Presentation,
}

/// A decoded fragment using internal ids only.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeFragment {
    pub root: NodeId,
    pub root_children: Vec<NodeId>,
    /// Introduced nodes in breadth-first order, starting with `root_children`.
    pub nodes: Vec<FragmentNode>,
}

impl WireFragment {
    /// Validate the shape and convert to internal ids.
    ///
    /// The introduced list starts as `root_children`; `children[k]` describes
    /// the `k`-th introduced node and its entries are appended in order.
    pub fn decode(&self) -> Result<SubtreeFragment, FragmentError> {
        let root = decode_id(self.root_id)?;
        let root_children = decode_ids(&self.root_children)?;

        let mut introduced = Vec::with_capacity(self.text.len());
        let mut seen = HashSet::new();
        let mut introduce = |id: NodeId, introduced: &mut Vec<NodeId>| {
            if id == root {
                return Err(FragmentError::RootInOwnSubtree(root));
            }
            if !seen.insert(id) {
                return Err(FragmentError::DuplicateNode(id));
            }
            introduced.push(id);
            Ok(())
        };

        for &id in &root_children {
            introduce(id, &mut introduced)?;
        }

        let mut child_lists = Vec::with_capacity(self.children.len());
        let mut k = 0;
        while k < introduced.len() {
            let raw = self
                .children
                .get(k)
                .ok_or(FragmentError::LengthMismatch {
                    field: "children",
                    expected: introduced.len(),
                    actual: self.children.len(),
                })?;
            let list = decode_ids(raw)?;
            for &child in &list {
                introduce(child, &mut introduced)?;
            }
            child_lists.push(list);
            k += 1;
        }

        let n = introduced.len();
        check_len("children", n, self.children.len())?;
        check_len("text", n, self.text.len())?;
        check_optional_len("tooltip", n, self.tooltip.len())?;
        check_optional_len("style", n, self.style.len())?;
        check_optional_len("shape", n, self.shape.len())?;
        check_optional_len("link_style", n, self.link_style.len())?;

        let unexpanded: HashSet<NodeId> = decode_ids(&self.unexpanded_children)?
            .into_iter()
            .collect();
        for &id in &unexpanded {
            if !seen.contains(&id) {
                return Err(FragmentError::UnknownUnexpanded(id));
            }
        }

        let mut nodes = Vec::with_capacity(n);
        for (k, (id, list)) in introduced.into_iter().zip(child_lists).enumerate() {
            let children = if unexpanded.contains(&id) {
                if !list.is_empty() {
                    return Err(FragmentError::UnexpandedWithChildren(id));
                }
                None
            } else {
                Some(list)
            };
            nodes.push(FragmentNode {
                id,
                children,
                presentation: Presentation::from_columns(
                    &self.text[k],
                    self.tooltip.get(k),
                    self.style.get(k),
                    self.shape.get(k),
                    self.link_style.get(k),
                ),
            });
        }

        Ok(SubtreeFragment {
            root,
            root_children,
            nodes,
        })
    }
}

/// Data embedded with the page at session start.
///
/// Position `i` of every array describes internal node `i`; child references
/// are wire ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialPayload {
    #[serde(default)]
    pub children: Vec<Option<Vec<u32>>>,
    pub text: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tooltip: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_style: Vec<Value>,
    #[serde(default)]
    pub unexpanded_children: Vec<u32>,
}

/// One decoded initial payload entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadNode {
    pub children: Option<Vec<NodeId>>,
    pub presentation: Presentation,
}

impl InitialPayload {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Validate and convert. Entry `i` of the result is node `i`.
    pub fn decode(&self) -> Result<Vec<PayloadNode>, FragmentError> {
        let n = self.text.len();
        check_len("children", n, self.children.len())?;
        check_optional_len("tooltip", n, self.tooltip.len())?;
        check_optional_len("style", n, self.style.len())?;
        check_optional_len("shape", n, self.shape.len())?;
        check_optional_len("link_style", n, self.link_style.len())?;

        let unexpanded: HashSet<NodeId> = decode_ids(&self.unexpanded_children)?
            .into_iter()
            .collect();
        for &id in &unexpanded {
            if id.index() >= n {
                return Err(FragmentError::UnknownUnexpanded(id));
            }
        }

        let mut nodes = Vec::with_capacity(n);
        for (i, raw) in self.children.iter().enumerate() {
            let id = NodeId::new(i as u32);
            let list = decode_ids(raw.as_deref().unwrap_or_default())?;
            if let Some(&dangling) = list.iter().find(|c| c.index() >= n) {
                return Err(FragmentError::UnknownChild(dangling));
            }
            let children = if unexpanded.contains(&id) {
                if !list.is_empty() {
                    return Err(FragmentError::UnexpandedWithChildren(id));
                }
                None
            } else {
                Some(list)
            };
            nodes.push(PayloadNode {
                children,
                presentation: Presentation::from_columns(
                    &self.text[i],
                    self.tooltip.get(i),
                    self.style.get(i),
                    self.shape.get(i),
                    self.link_style.get(i),
                ),
            });
        }
        Ok(nodes)
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<(), FragmentError> {
    if expected == actual {
        Ok(())
    } else {
        Err(FragmentError::LengthMismatch {
            field,
            expected,
            actual,
        })
    }
}

fn check_optional_len(
    field: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), FragmentError> {
    if actual == 0 {
        Ok(())
    } else {
        check_len(field, expected, actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(value: Value) -> WireFragment {
        serde_json::from_value(value).expect("valid wire fragment")
    }

    #[test]
    fn test_id_offset_is_applied_once() {
        assert_eq!(encode_id(NodeId::new(0)), 1);
        assert_eq!(decode_id(1), Ok(NodeId::new(0)));
        assert_eq!(decode_id(encode_id(NodeId::new(41))), Ok(NodeId::new(41)));
        assert_eq!(decode_id(0), Err(FragmentError::ZeroWireId));
    }

    #[test]
    fn test_decode_two_level_fragment() {
        // root 1 -> [2, 3]; 2 -> [4]; 3 unexpanded; 4 leaf
        let wire = fragment(json!({
            "root_id": 1,
            "root_children": [2, 3],
            "children": [[4], [], []],
            "unexpanded_children": [3],
            "text": ["b", "c", "d"],
        }));
        let decoded = wire.decode().expect("decodes");
        assert_eq!(decoded.root, NodeId::new(0));
        assert_eq!(decoded.root_children, vec![NodeId::new(1), NodeId::new(2)]);

        let ids: Vec<_> = decoded.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]);
        assert_eq!(decoded.nodes[0].children, Some(vec![NodeId::new(3)]));
        assert_eq!(decoded.nodes[1].children, None);
        assert_eq!(decoded.nodes[2].children, Some(vec![]));
        assert_eq!(decoded.nodes[2].presentation.label, "d");
    }

    #[test]
    fn test_text_length_mismatch_is_rejected() {
        let wire = fragment(json!({
            "root_id": 1,
            "root_children": [2, 3],
            "children": [[], []],
            "text": ["only one"],
        }));
        assert_eq!(
            wire.decode(),
            Err(FragmentError::LengthMismatch {
                field: "text",
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_short_children_is_rejected() {
        let wire = fragment(json!({
            "root_id": 1,
            "root_children": [2, 3],
            "children": [[]],
            "text": ["a", "b"],
        }));
        assert!(matches!(
            wire.decode(),
            Err(FragmentError::LengthMismatch { field: "children", .. })
        ));
    }

    #[test]
    fn test_optional_columns_may_be_absent_but_not_partial() {
        let ok = fragment(json!({
            "root_id": 1,
            "root_children": [2],
            "children": [[]],
            "text": ["a"],
            "style": [],
        }));
        assert!(ok.decode().is_ok());

        let partial = fragment(json!({
            "root_id": 1,
            "root_children": [2, 3],
            "children": [[], []],
            "text": ["a", "b"],
            "tooltip": ["only a"],
        }));
        assert!(matches!(
            partial.decode(),
            Err(FragmentError::LengthMismatch { field: "tooltip", .. })
        ));
    }

    #[test]
    fn test_duplicate_and_cyclic_ids_are_rejected() {
        let duplicate = fragment(json!({
            "root_id": 1,
            "root_children": [2, 2],
            "children": [[], []],
            "text": ["a", "a"],
        }));
        assert_eq!(duplicate.decode(), Err(FragmentError::DuplicateNode(NodeId::new(1))));

        let cyclic = fragment(json!({
            "root_id": 1,
            "root_children": [2],
            "children": [[1]],
            "text": ["a", "root"],
        }));
        assert_eq!(cyclic.decode(), Err(FragmentError::RootInOwnSubtree(NodeId::new(0))));
    }

    #[test]
    fn test_unexpanded_must_be_introduced() {
        let wire = fragment(json!({
            "root_id": 1,
            "root_children": [2],
            "children": [[]],
            "unexpanded_children": [9],
            "text": ["a"],
        }));
        assert_eq!(wire.decode(), Err(FragmentError::UnknownUnexpanded(NodeId::new(8))));
    }

    #[test]
    fn test_initial_payload_decodes_one_based_children() {
        let payload = InitialPayload::from_json(
            r#"{
                "children": [[2, 3], null, null],
                "text": ["root", "a", "b"],
                "unexpanded_children": [2, 3]
            }"#,
        )
        .expect("parses");
        let nodes = payload.decode().expect("decodes");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].children, Some(vec![NodeId::new(1), NodeId::new(2)]));
        assert_eq!(nodes[1].children, None);
        assert_eq!(nodes[2].presentation.label, "b");
    }

    #[test]
    fn test_initial_payload_rejects_dangling_child() {
        let payload = InitialPayload {
            children: vec![Some(vec![5])],
            text: vec!["root".to_string()],
            ..InitialPayload::default()
        };
        assert_eq!(payload.decode(), Err(FragmentError::UnknownChild(NodeId::new(4))));
    }
}
