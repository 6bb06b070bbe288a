//! Multi-holder coordinator interface (§4.8).
//!
//! Grounded in the teacher's two-organization protocol
//! (`organization_communication::communicate`, which drives one exchange
//! between `PrivateKeyOrganization`/`PublicKeyOrganization` and reports
//! progress per phase) and the original prototype's
//! `MPCCoordinator`/`MPCParticipant` (per-participant `Participant_ID`
//! tagging, split-by-tag result distribution). Socket framing and
//! per-contributor encryption are a transport concern external to the
//! engine and are represented here only as the `Transport` trait a real
//! implementation would satisfy — this module implements the engine-facing
//! half of the contract only.

use std::collections::HashMap;

use crate::engine::{ClosenessMode, EmittedEvent, Engine, EngineError, EventRecord};

/// What a real transport must provide: receipt of each contributor's
/// already-decrypted, already-tagged table, and delivery of each
/// contributor's partition of the sanitized result. Framing (4-byte
/// big-endian length header) and per-contributor authenticated encryption
/// are implemented by the transport, not by the engine.
pub trait Transport {
    fn receive_holder_table(&mut self, holder_id: &str) -> Result<Vec<EventRecord>, EngineError>;
    fn send_holder_partition(&mut self, holder_id: &str, rows: Vec<EmittedEvent>) -> Result<(), EngineError>;
}

/// Runs one coordinator round: concatenates every holder's table (already
/// tagged with `Holder_ID`), invokes the engine once, and splits the
/// sanitized output back out by `Holder_ID`.
pub fn sanitize_for_holders(
    holder_tables: Vec<(String, Vec<EventRecord>)>,
    seed: u64,
    k: u32,
    t: f64,
    mode: ClosenessMode,
    dp: Option<(f64, f64)>,
    previous_logs: &[Vec<EventRecord>],
) -> Result<HashMap<String, Vec<EmittedEvent>>, EngineError> {
    let mut combined = Vec::new();
    for (holder_id, events) in &holder_tables {
        for event in events {
            let mut tagged = event.clone();
            tagged.holder_id = Some(holder_id.clone());
            combined.push(tagged);
        }
    }

    let mut engine = Engine::build(&combined, seed)?;
    engine.sanitize(k, t, mode, dp, previous_logs)?;
    let sanitized = engine.emit();

    let mut partitions: HashMap<String, Vec<EmittedEvent>> = holder_tables
        .iter()
        .map(|(holder_id, _)| (holder_id.clone(), Vec::new()))
        .collect();
    for row in sanitized {
        if let Some(holder_id) = &row.holder_id {
            partitions.entry(holder_id.clone()).or_default().push(row);
        }
    }
    Ok(partitions)
}
