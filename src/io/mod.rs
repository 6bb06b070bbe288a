//! Ambient tabular I/O: semicolon-delimited CSV ingestion/emission (§4.6)
//! and the multi-holder coordinator interface (§4.8).

pub mod csv;
pub mod coordinator;
