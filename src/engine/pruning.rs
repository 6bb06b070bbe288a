//! Component E: the pruning and redistribution loop (§4.3).

use std::collections::BTreeSet;

use super::closeness::{self, ActivityMemo, ClosenessMode};
use super::distance::DistanceTable;
use super::error::EngineError;
use super::tree::Tree;
use std::collections::HashMap;

/// One pre-order pass: removes a single violator's cases (sequential
/// pruning mode) and returns the cut-out set, or the empty set if the
/// traversal completed with no violation.
fn tree_pruning(
    tree: &mut Tree,
    activity_durations: &HashMap<String, Vec<f64>>,
    activity_max_diff: &HashMap<String, f64>,
    k: u32,
    t: f64,
    mode: ClosenessMode,
    memo: &mut ActivityMemo,
) -> BTreeSet<String> {
    let order = tree.preorder_non_root();
    for idx in order {
        let node = tree.node(idx);
        let k_violation = closeness::violates_k_anonymity(node, k);
        let t_violation = if k_violation {
            false
        } else {
            let d_all = activity_durations.get(&node.name).map(Vec::as_slice).unwrap_or(&[]);
            let max_diff = activity_max_diff.get(&node.name).copied().unwrap_or(0.0);
            closeness::violates_t_closeness(node, d_all, max_diff, t, mode, memo)
        };

        if k_violation || t_violation {
            let cutout: BTreeSet<String> = tree.node(idx).cases.clone();
            tree.upward_prune(idx, &cutout);
            return cutout;
        }
    }
    BTreeSet::new()
}

/// Redistributes cut-out cases onto the nearest surviving sequence by
/// edit distance (§4.3 "Redistribution"). Returns the distance
/// accumulated by this batch.
fn redistribute(
    tree: &mut Tree,
    case_to_sequence: &mut HashMap<String, String>,
    distance_table: &DistanceTable,
    cutout: &BTreeSet<String>,
) -> Result<u64, EngineError> {
    let mut surviving: Vec<String> = tree.sequences.iter().cloned().collect();
    surviving.sort();

    let mut accumulated = 0u64;
    for case in cutout {
        if surviving.is_empty() {
            // Nothing left to reattach onto: the log has been pruned to
            // nothing (spec §7 "empty-result"). Leave the case unplaced.
            continue;
        }
        let original = case_to_sequence.get(case).cloned().unwrap_or_default();

        let mut best: Option<(&String, usize)> = None;
        for candidate in &surviving {
            let d = distance_table.get(&original, candidate).ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "surviving sequence '{candidate}' missing from the distance table"
                ))
            })?;
            if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                best = Some((candidate, d));
            }
        }
        let (best_seq, best_distance) = best.expect("surviving is non-empty");
        accumulated += best_distance as u64;

        tree.attach_case_along(case, best_seq)?;
        case_to_sequence.insert(case.clone(), best_seq.clone());
    }
    Ok(accumulated)
}

/// Runs the full pruning + redistribution loop to a fixed point,
/// enforcing k-anonymity and t-closeness. Returns the set of cases that
/// were redistributed, and the accumulated edit-distance scalar.
pub fn run(
    tree: &mut Tree,
    activity_durations: &HashMap<String, Vec<f64>>,
    activity_max_diff: &HashMap<String, f64>,
    case_to_sequence: &mut HashMap<String, String>,
    distance_table: &DistanceTable,
    k: u32,
    t: f64,
    mode: ClosenessMode,
) -> Result<(BTreeSet<String>, u64), EngineError> {
    let mut memo = ActivityMemo::default();
    let mut cut_out_cases: BTreeSet<String> = BTreeSet::new();
    let mut total_distance = 0u64;

    loop {
        let cutout = tree_pruning(tree, activity_durations, activity_max_diff, k, t, mode, &mut memo);
        if cutout.is_empty() {
            break;
        }
        total_distance += redistribute(tree, case_to_sequence, distance_table, &cutout)?;
        cut_out_cases.extend(cutout);
    }

    debug_assert!(
        tree.preorder_non_root().iter().all(|&id| {
            let node = tree.node(id);
            let parent = node.parent.expect("non-root node has a parent");
            node.cases.is_subset(&tree.node(parent).cases)
        }),
        "I1 violated post-pruning"
    );

    Ok((cut_out_cases, total_distance))
}
