//! Component F: the differential-privacy overlay (§4.4).
//!
//! Enabled only when epsilon > 0 and at least one previous log is
//! provided. Detects cross-log linkage via activity-only fingerprints,
//! removes at-risk cases with Laplace-noised counts, and replaces them
//! with synthetic cases drawn from the sanitized distribution.

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;

use super::closeness::ActivityMemo;
use super::distance;
use super::error::EngineError;
use super::record::EventRecord;
use super::stats::{sample_laplace_floor, sample_normal_clamped};
use super::tree::Tree;

/// Builds the activity-only fingerprint set of previously released
/// traces. Each activity token has any `:suffix` stripped before joining
/// with `-` — supporting logs whose activities were already annotated by
/// a prior sanitization round.
pub fn previous_log_fingerprints(previous_logs: &[Vec<EventRecord>]) -> BTreeSet<String> {
    // Only Case ID and Activity are read from previous logs (spec §6);
    // durations are never inspected, so sequences are reconstructed
    // directly rather than by building a full prefix tree.
    let mut fingerprints = BTreeSet::new();
    for log in previous_logs {
        let mut sequences: BTreeSet<String> = BTreeSet::new();
        let mut current_case: Option<&str> = None;
        let mut sequence = String::new();
        for event in log {
            if current_case != Some(event.case_id.as_str()) {
                if current_case.is_some() && !sequence.is_empty() {
                    sequences.insert(std::mem::take(&mut sequence));
                }
                current_case = Some(event.case_id.as_str());
            }
            sequence.push('@');
            sequence.push_str(&event.activity);
        }
        if !sequence.is_empty() {
            sequences.insert(sequence);
        }
        for seq in &sequences {
            fingerprints.insert(fingerprint(seq, true));
        }
    }
    fingerprints
}

/// Activity-only fingerprint of one canonical sequence. `strip_suffix`
/// controls the `:suffix` stripping applied to previous-log activities;
/// the current log's own sequences are never stripped (spec §9's
/// documented — intentionally preserved — asymmetry).
fn fingerprint(sequence: &str, strip_suffix: bool) -> String {
    distance::tokenize(sequence)
        .into_iter()
        .map(|tok| if strip_suffix { tok.split(':').next().unwrap_or(tok) } else { tok })
        .collect::<Vec<_>>()
        .join("-")
}

fn is_at_risk(sequence: &str, previous_fingerprints: &BTreeSet<String>) -> bool {
    let fp = fingerprint(sequence, false);
    previous_fingerprints.iter().any(|prev| fp == *prev || fp.contains(prev.as_str()) || prev.contains(fp.as_str()))
}

/// Runs the DP overlay in place, returning the number of cases removed
/// and replaced by synthetic ones. The tree and case->sequence map are
/// mutated directly, matching the pruning loop's style.
#[allow(clippy::too_many_arguments)]
pub fn apply(
    tree: &mut Tree,
    case_to_sequence: &mut HashMap<String, String>,
    activity_durations: &HashMap<String, Vec<f64>>,
    epsilon: f64,
    previous_logs: &[Vec<EventRecord>],
    rng: &mut impl Rng,
) -> Result<usize, EngineError> {
    if epsilon <= 0.0 || previous_logs.is_empty() {
        return Ok(0);
    }

    let previous_fingerprints = previous_log_fingerprints(previous_logs);

    let at_risk_sequences: Vec<String> = tree
        .sequences
        .iter()
        .filter(|seq| is_at_risk(seq, &previous_fingerprints))
        .cloned()
        .collect();

    let mut removed: Vec<String> = Vec::new();
    for sequence in &at_risk_sequences {
        let cases_with_sequence: Vec<String> = case_to_sequence
            .iter()
            .filter(|(_, s)| *s == sequence)
            .map(|(c, _)| c.clone())
            .collect();
        let n = cases_with_sequence.len();
        if n == 0 {
            continue;
        }

        let noise = sample_laplace_floor(rng, epsilon);
        let noisy_n = (n as i64 + noise).max(0) as usize;
        let to_remove = if noisy_n < n { (n - noisy_n).min(n) } else { 0 };
        if to_remove == 0 {
            continue;
        }

        let mut sorted_cases = cases_with_sequence;
        sorted_cases.sort();
        let chosen_idx = rand::seq::index::sample(rng, sorted_cases.len(), to_remove);
        for i in chosen_idx.iter() {
            removed.push(sorted_cases[i].clone());
        }
    }

    // Removal: strip the case from every non-root node it still occupies.
    for case in &removed {
        for idx in tree.preorder_non_root() {
            let node = tree.node_mut(idx);
            node.cases.remove(case);
            node.annotations.remove(case);
        }
    }

    // Synthetic replacement: reattach each removed case along a sequence
    // sampled from the (current) surviving sequences, with freshly
    // synthesized durations.
    let mut memo = ActivityMemo::default();
    let surviving: Vec<String> = tree.sequences.iter().cloned().collect();
    for case in &removed {
        if surviving.is_empty() {
            continue;
        }
        let chosen = surviving.choose(rng).expect("surviving is non-empty").clone();
        let path = tree.attach_case_along(case, &chosen)?;
        case_to_sequence.insert(case.clone(), chosen.clone());

        // One synthetic draw per activity occurrence in the sequence; when
        // an activity name repeats along the path, path uniqueness is not
        // assumed, so every occurrence targets the first matching node —
        // a later occurrence's draw simply overwrites an earlier one.
        for activity in distance::tokenize(&chosen) {
            let duration = synthesize_duration(activity, activity_durations, &mut memo, rng);
            if let Some(&target) = path.iter().find(|&&n| tree.node(n).name == activity) {
                tree.node_mut(target).annotations.insert(case.clone(), duration);
            }
        }
    }

    Ok(removed.len())
}

/// Draws a synthetic duration for `activity` per §4.4: Normal(mean,
/// stdev) when the activity has >= 8 samples and fails the normality
/// test at alpha = 0.05 (memoized once per activity); otherwise a
/// uniform draw from the observed values. Clamped to zero, rounded to
/// the nearest integer.
pub fn synthesize_duration(
    activity: &str,
    activity_durations: &HashMap<String, Vec<f64>>,
    memo: &mut ActivityMemo,
    rng: &mut impl Rng,
) -> f64 {
    const ALPHA: f64 = 0.05;
    let Some(data) = activity_durations.get(activity) else {
        return 0.0;
    };

    let raw = if data.len() >= 8 {
        let p = super::closeness::normality_p_value(activity, data, memo);
        if p <= ALPHA {
            let mean = data.iter().sum::<f64>() / data.len() as f64;
            let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
            sample_normal_clamped(rng, mean, variance.sqrt())
        } else {
            *data.choose(rng).expect("non-empty, len >= 8")
        }
    } else {
        *data.choose(rng).expect("non-empty by construction")
    };

    raw.max(0.0).round()
}
