//! Tripwire — BLAKE3 value fingerprints and the decision trace.

pub mod hasher;
pub mod tracelog;
