//! The sanitization engine: ties the prefix tree, closeness checker,
//! pruning/redistribution loop, differential-privacy overlay and
//! emission together behind one entry point.

pub mod closeness;
pub mod distance;
pub mod dp;
pub mod emit;
pub mod error;
pub mod pruning;
pub mod record;
pub mod stats;
pub mod tree;

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;

pub use closeness::ClosenessMode;
pub use error::EngineError;
pub use record::{EmittedEvent, EventRecord};

use distance::DistanceTable;
use tree::Tree;

/// A running instance of the engine over one input log.
///
/// Built once from a flat event table; `sanitize` may be invoked at most
/// once per instance (the pruning loop mutates the tree in place).
pub struct Engine {
    tree: Tree,
    activity_durations: HashMap<String, Vec<f64>>,
    activity_max_diff: HashMap<String, f64>,
    case_to_sequence: HashMap<String, String>,
    case_to_holder: HashMap<String, String>,
    rng: StdRng,
}

/// Outcome of one `sanitize` call: the original case_ids that were
/// redistributed during pruning, and the accumulated edit-distance scalar.
#[derive(Debug, Clone, Default)]
pub struct SanitizeReport {
    pub redistributed_cases: BTreeSet<String>,
    pub accumulated_distance: u64,
    pub dp_removed_cases: usize,
}

impl Engine {
    /// Builds the engine from a flat event table (§4.1). `seed` fixes the
    /// RNG driving redistribution ties, DP sampling, and synthetic
    /// duration draws — same seed and input yield the same output (P7).
    pub fn build(events: &[EventRecord], seed: u64) -> Result<Self, EngineError> {
        let (tree, activity_durations, case_to_sequence, case_to_holder) = Tree::build(events)?;
        let activity_max_diff = activity_durations
            .iter()
            .map(|(activity, data)| {
                let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                (activity.clone(), if data.len() <= 1 { 0.0 } else { max - min })
            })
            .collect();

        Ok(Self {
            tree,
            activity_durations,
            activity_max_diff,
            case_to_sequence,
            case_to_holder,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Runs pruning/redistribution to a k-anonymity/t-closeness fixed
    /// point, then (if `epsilon` is `Some`) applies the differential-privacy
    /// overlay against `previous_logs` (§6 "Engine call").
    pub fn sanitize(
        &mut self,
        k: u32,
        t: f64,
        mode: ClosenessMode,
        dp: Option<(f64, f64)>,
        previous_logs: &[Vec<EventRecord>],
    ) -> Result<SanitizeReport, EngineError> {
        if k < 1 {
            return Err(EngineError::InvalidParameter("k must be >= 1".to_string()));
        }
        if !(t.is_finite() && t >= 0.0) {
            return Err(EngineError::InvalidParameter("t must be >= 0".to_string()));
        }
        if let Some((epsilon, _delta)) = dp {
            if epsilon <= 0.0 {
                return Err(EngineError::InvalidParameter("epsilon must be > 0 when dp is enabled".to_string()));
            }
        }

        let distance_table = DistanceTable::build(&self.tree.sequences);
        let (redistributed_cases, accumulated_distance) = pruning::run(
            &mut self.tree,
            &self.activity_durations,
            &self.activity_max_diff,
            &mut self.case_to_sequence,
            &distance_table,
            k,
            t,
            mode,
        )?;

        let mut dp_removed_cases = 0;
        if let Some((epsilon, _delta)) = dp {
            dp_removed_cases = dp::apply(
                &mut self.tree,
                &mut self.case_to_sequence,
                &self.activity_durations,
                epsilon,
                previous_logs,
                &mut self.rng,
            )?;
        }

        Ok(SanitizeReport { redistributed_cases, accumulated_distance, dp_removed_cases })
    }

    /// Produces the sanitized output table (§4.5). Pure read: does not
    /// mutate engine state beyond the transient normality-test memo.
    pub fn emit(&mut self) -> Vec<EmittedEvent> {
        emit::emit(&self.tree, &self.activity_durations, &self.case_to_holder, &mut self.rng)
    }
}
