//! Component G: event-log emission (§4.5).
//!
//! Emission is a pure read over the tree: it produces one record per
//! `(case, node)` pair and never mutates the tree, the case->sequence
//! map, or any memoized statistic — the normality-test memo is reset at
//! the start so repeated emissions agree.

use std::collections::HashMap;

use rand::Rng;

use super::closeness::ActivityMemo;
use super::dp::synthesize_duration;
use super::record::EmittedEvent;
use super::tree::Tree;

/// Produces the sanitized output table, sorted by Case ID then Event_Nr.
pub fn emit(
    tree: &Tree,
    activity_durations: &HashMap<String, Vec<f64>>,
    case_to_holder: &HashMap<String, String>,
    rng: &mut impl Rng,
) -> Vec<EmittedEvent> {
    let mut memo = ActivityMemo::default();
    let mut out = Vec::new();

    for idx in tree.preorder_non_root() {
        let node = tree.node(idx);
        let event_nr = node.depth();
        for case in &node.cases {
            let duration = match node.annotations.get(case) {
                Some(&d) => d,
                None => synthesize_duration(&node.name, activity_durations, &mut memo, rng),
            };
            out.push(EmittedEvent {
                activity: node.name.clone(),
                case_id: case.clone(),
                duration,
                event_nr,
                holder_id: case_to_holder.get(case).cloned(),
            });
        }
    }

    out.sort_by(|a, b| a.case_id.cmp(&b.case_id).then(a.event_nr.cmp(&b.event_nr)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::EventRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn emits_sorted_by_case_then_event_nr() {
        let events = vec![
            EventRecord::new("c1", "A", 1.0),
            EventRecord::new("c1", "B", 2.0),
            EventRecord::new("c2", "A", 3.0),
        ];
        let (tree, activity_durations, _case_to_sequence, case_to_holder) =
            Tree::build(&events).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let rows = emit(&tree, &activity_durations, &case_to_holder, &mut rng);

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| (r.case_id.as_str(), r.event_nr)).collect::<Vec<_>>(),
            vec![("c1", 1), ("c1", 2), ("c2", 1)]
        );
        assert_eq!(rows[0].activity, "A");
        assert_eq!(rows[0].duration, 1.0);
    }

    #[test]
    fn missing_annotation_synthesizes_a_duration() {
        let events = vec![EventRecord::new("c1", "A", 5.0), EventRecord::new("c2", "A", 7.0)];
        let (mut tree, activity_durations, _cs, case_to_holder) = Tree::build(&events).unwrap();
        // Drop c1's annotation to force synthesis, case stays attached to the node.
        let node_id = tree.preorder_non_root()[0];
        tree.node_mut(node_id).annotations.remove("c1");

        let mut rng = StdRng::seed_from_u64(2);
        let rows = emit(&tree, &activity_durations, &case_to_holder, &mut rng);
        let c1_row = rows.iter().find(|r| r.case_id == "c1").unwrap();
        assert!(c1_row.duration.is_finite());
    }
}
