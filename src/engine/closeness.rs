//! Component D: the closeness checker — decides whether a node violates
//! k-anonymity or t-closeness.

use std::collections::HashMap;

use super::stats::{dagostino_k2_pvalue, wasserstein_distance};
use super::tree::Node;

/// t-closeness evaluation strategy (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosenessMode {
    /// Wasserstein distance normalised by the activity's max-difference.
    StandardWasserstein,
    /// Quantile-bucket probability-mass-ratio test.
    Stochastic,
}

/// Per-activity memoized state used by the stochastic t-closeness check
/// and by synthetic-duration generation (§4.4). Cleared at the start of
/// each emission / DP invocation, per spec §9's "global state" note.
#[derive(Debug, Default)]
pub struct ActivityMemo {
    /// Whether the global duration distribution for an activity is constant.
    pub is_constant: HashMap<String, bool>,
    /// D'Agostino K² p-value for an activity's global duration distribution.
    pub normality_p: HashMap<String, f64>,
}

impl ActivityMemo {
    pub fn clear(&mut self) {
        self.is_constant.clear();
        self.normality_p.clear();
    }

    fn is_constant(&mut self, activity: &str, d_all: &[f64]) -> bool {
        *self.is_constant.entry(activity.to_string()).or_insert_with(|| {
            let min = d_all.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = d_all.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            min == max
        })
    }
}

/// Derives bucket upper bounds from `round(t + 1)` quantiles of `d_all`.
fn bucket_limits(t: f64, d_all_sorted: &[f64]) -> Vec<f64> {
    let num_buckets = (t + 1.0).round() as usize;
    if num_buckets <= 1 || d_all_sorted.is_empty() {
        return Vec::new();
    }
    let divider = (d_all_sorted.len() as f64 / num_buckets as f64).round() as usize;
    (1..num_buckets)
        .map(|i| {
            let idx = (i * divider).min(d_all_sorted.len() - 1);
            d_all_sorted[idx]
        })
        .collect()
}

/// Max probability-mass-ratio contribution across buckets (spec §4.2
/// stochastic mode).
fn stochastic_distance(d_all_sorted: &[f64], d_eq_sorted: &[f64], buckets: &[f64]) -> f64 {
    let mut all_idx = 0usize;
    let mut eq_idx = 0usize;
    let mut max_distance = 0.0f64;

    for &bound in buckets {
        let last_all = all_idx;
        let last_eq = eq_idx;
        while all_idx < d_all_sorted.len() && d_all_sorted[all_idx] < bound {
            all_idx += 1;
        }
        while eq_idx < d_eq_sorted.len() && d_eq_sorted[eq_idx] < bound {
            eq_idx += 1;
        }
        let p_all = (all_idx - last_all) as f64 / d_all_sorted.len() as f64;
        let p_eq = (eq_idx - last_eq) as f64 / d_eq_sorted.len() as f64;

        let contribution = if p_all == 0.0 && p_eq == 0.0 {
            0.0
        } else if p_all == 0.0 || p_eq == 0.0 {
            f64::INFINITY
        } else {
            (p_eq / p_all).max(p_all / p_eq)
        };
        max_distance = max_distance.max(contribution);
    }
    max_distance
}

/// k-violation: the node's surviving case count falls below `k`.
pub fn violates_k_anonymity(node: &Node, k: u32) -> bool {
    (node.cases.len() as u32) < k
}

/// t-violation per spec §4.2. `d_all` is the activity's full duration
/// list; only cases still present in the node *and* still carrying an
/// original annotation contribute to the equivalence class.
pub fn violates_t_closeness(
    node: &Node,
    d_all: &[f64],
    max_difference: f64,
    t: f64,
    mode: ClosenessMode,
    memo: &mut ActivityMemo,
) -> bool {
    let d_eq: Vec<f64> = node
        .cases
        .iter()
        .filter_map(|c| node.annotations.get(c).copied())
        .collect();

    if d_eq.is_empty() {
        return false;
    }
    if max_difference == 0.0 {
        return false;
    }

    match mode {
        ClosenessMode::StandardWasserstein => {
            (wasserstein_distance(d_all, &d_eq) / max_difference) >= t
        }
        ClosenessMode::Stochastic => {
            if memo.is_constant(&node.name, d_all) {
                return false;
            }
            let mut d_all_sorted = d_all.to_vec();
            d_all_sorted.sort_by(f64::total_cmp);
            let mut d_eq_sorted = d_eq;
            d_eq_sorted.sort_by(f64::total_cmp);
            let buckets = bucket_limits(t, &d_all_sorted);
            if buckets.is_empty() {
                return false;
            }
            stochastic_distance(&d_all_sorted, &d_eq_sorted, &buckets) > t
        }
    }
}

/// D'Agostino K² p-value for an activity, memoized. Requires >= 8
/// samples per spec §4.4; callers check sample size before relying on
/// this to decide normal-vs-uniform sampling.
pub fn normality_p_value(activity: &str, d_all: &[f64], memo: &mut ActivityMemo) -> f64 {
    *memo
        .normality_p
        .entry(activity.to_string())
        .or_insert_with(|| dagostino_k2_pvalue(d_all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn node_with(cases: &[&str], annotations: &[(&str, f64)], name: &str) -> Node {
        Node {
            name: name.to_string(),
            sequence: format!("@{name}"),
            parent: Some(0),
            children: Vec::new(),
            cases: cases.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            annotations: annotations
                .iter()
                .map(|(c, d)| (c.to_string(), *d))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn k_violation_when_fewer_cases_than_k() {
        let node = node_with(&["c1", "c2"], &[], "A");
        assert!(violates_k_anonymity(&node, 3));
        assert!(!violates_k_anonymity(&node, 2));
    }

    #[test]
    fn t_closeness_not_violated_when_equivalence_class_empty() {
        let node = node_with(&["c1"], &[], "A");
        let mut memo = ActivityMemo::default();
        assert!(!violates_t_closeness(&node, &[1.0, 2.0], 1.0, 0.1, ClosenessMode::StandardWasserstein, &mut memo));
    }

    #[test]
    fn t_closeness_not_violated_when_max_difference_zero() {
        let node = node_with(&["c1"], &[("c1", 5.0)], "A");
        let mut memo = ActivityMemo::default();
        assert!(!violates_t_closeness(&node, &[5.0, 5.0], 0.0, 0.0, ClosenessMode::StandardWasserstein, &mut memo));
    }

    #[test]
    fn stochastic_mode_constant_distribution_never_violates() {
        let node = node_with(&["c1"], &[("c1", 7.0)], "A");
        let mut memo = ActivityMemo::default();
        let d_all = vec![7.0; 10];
        // max_difference is artificially non-zero here so the test exercises
        // the stochastic is-constant short-circuit rather than the earlier one.
        assert!(!violates_t_closeness(&node, &d_all, 1.0, 0.01, ClosenessMode::Stochastic, &mut memo));
    }
}
