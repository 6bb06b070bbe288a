//! Component C: the prefix tree.
//!
//! Nodes are stored in an arena (`Vec<Node>`) and referenced by stable
//! index rather than through pointer cycles, so upward pruning is plain
//! index arithmetic instead of `Rc`/`Weak` juggling.

use std::collections::{BTreeMap, BTreeSet};

use super::error::EngineError;
use super::record::EventRecord;

pub type NodeId = usize;
pub const ROOT: NodeId = 0;

/// A node at depth `d` represents the prefix of length `d` built by
/// concatenating edge labels from the root. `annotations` maps
/// case_id -> the duration originally recorded at this depth for that
/// case (I2: only ever a subset of `cases`).
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub sequence: String,
    pub parent: Option<NodeId>,
    /// Children in insertion order — preserved for deterministic traversal.
    pub children: Vec<NodeId>,
    pub cases: BTreeSet<String>,
    pub annotations: BTreeMap<String, f64>,
}

impl Node {
    pub fn depth(&self) -> usize {
        distance::tokenize(&self.sequence).len()
    }
}

// depth() only needs token counting; pull in the tokenizer without a full import cycle.
use super::distance;

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    pub sequences: BTreeSet<String>,
}

impl Tree {
    fn root_node() -> Node {
        Node {
            name: "Root".to_string(),
            sequence: String::new(),
            parent: None,
            children: Vec::new(),
            cases: BTreeSet::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Pre-order traversal, root excluded, children visited in insertion
    /// order — the order the pruning loop (§4.3) relies on.
    pub fn preorder_non_root(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[ROOT].children.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    fn find_child(&self, parent: NodeId, activity: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name == activity)
    }

    /// Adds a child under `parent` with the given activity name and
    /// canonical sequence, returning its id. Caller guarantees no
    /// existing sibling shares the name (I4).
    fn add_child(&mut self, parent: NodeId, activity: &str, sequence: String) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: activity.to_string(),
            sequence,
            parent: Some(parent),
            children: Vec::new(),
            cases: BTreeSet::new(),
            annotations: BTreeMap::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Reattaches `case` along `sequence`, descending through existing
    /// children only (no node is ever created by this path). Returns the
    /// path of node ids traversed, in order, for callers that need to
    /// write annotations afterwards (§4.4 synthetic replacement).
    pub fn attach_case_along(&mut self, case: &str, sequence: &str) -> Result<Vec<NodeId>, EngineError> {
        self.nodes[ROOT].cases.insert(case.to_string());
        let mut current = ROOT;
        let mut path = Vec::new();
        for activity in distance::tokenize(sequence) {
            let child = self.find_child(current, activity).ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "sequence '{sequence}' references activity '{activity}' with no matching child"
                ))
            })?;
            self.nodes[child].cases.insert(case.to_string());
            path.push(child);
            current = child;
        }
        Ok(path)
    }

    /// Upward prune starting at `start` (§4.3). Subtracts `cutout` from
    /// `start` and every strict ancestor up to (but excluding) the root;
    /// detaches any node left with zero cases from its parent. Root's
    /// `cases` is never touched here — by construction it only ever
    /// grows, mirroring the reference engine's full-membership set.
    pub fn upward_prune(&mut self, start: NodeId, cutout: &BTreeSet<String>) {
        self.sequences.remove(&self.nodes[start].sequence);

        let mut current = start;
        loop {
            if current == ROOT {
                break;
            }
            for c in cutout {
                self.nodes[current].cases.remove(c);
            }
            let parent = self.nodes[current].parent.expect("non-root node has a parent");
            if self.nodes[current].cases.is_empty() {
                self.nodes[parent].children.retain(|&c| c != current);
            }
            current = parent;
        }
    }

    /// Builds the tree from a flat event table in input order (§4.1).
    ///
    /// Returns the tree, the per-activity duration table (all durations
    /// ever observed, order of first appearance), the case->sequence map,
    /// and the case->holder map.
    #[allow(clippy::type_complexity)]
    pub fn build(
        events: &[EventRecord],
    ) -> Result<
        (
            Tree,
            std::collections::HashMap<String, Vec<f64>>,
            std::collections::HashMap<String, String>,
            std::collections::HashMap<String, String>,
        ),
        EngineError,
    > {
        let mut tree = Tree {
            nodes: vec![Self::root_node()],
            sequences: BTreeSet::new(),
        };
        let mut activity_durations: std::collections::HashMap<String, Vec<f64>> =
            std::collections::HashMap::new();
        let mut case_to_sequence: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        let mut case_to_holder: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        let mut finished_cases: BTreeSet<String> = BTreeSet::new();

        let mut current = ROOT;
        let mut current_case = String::new();
        let mut sequence = String::new();
        let mut have_case = false;

        for event in events {
            if !event.duration.is_finite() || event.duration < 0.0 {
                return Err(EngineError::MalformedInput(format!(
                    "non-finite or negative duration for case '{}'",
                    event.case_id
                )));
            }

            if event.case_id != current_case {
                if have_case {
                    case_to_sequence.insert(current_case.clone(), sequence.clone());
                    tree.sequences.insert(sequence.clone());
                    finished_cases.insert(current_case.clone());
                }
                if finished_cases.contains(&event.case_id) {
                    return Err(EngineError::MalformedInput(format!(
                        "events for case '{}' are not contiguous in input order",
                        event.case_id
                    )));
                }
                current = ROOT;
                current_case = event.case_id.clone();
                tree.nodes[ROOT].cases.insert(current_case.clone());
                sequence = String::new();
                have_case = true;

                if let Some(holder) = &event.holder_id {
                    case_to_holder.insert(current_case.clone(), holder.clone());
                }
            }

            sequence.push('@');
            sequence.push_str(&event.activity);

            let child = match tree.find_child(current, &event.activity) {
                Some(c) => c,
                None => tree.add_child(current, &event.activity, sequence.clone()),
            };
            current = child;
            tree.nodes[current].cases.insert(current_case.clone());
            tree.nodes[current].annotations.insert(current_case.clone(), event.duration);

            activity_durations
                .entry(event.activity.clone())
                .or_default()
                .push(event.duration);
        }

        if have_case {
            case_to_sequence.insert(current_case.clone(), sequence.clone());
            tree.sequences.insert(sequence);
        }

        Ok((tree, activity_durations, case_to_sequence, case_to_holder))
    }
}
