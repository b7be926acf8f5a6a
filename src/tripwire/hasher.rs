//! CF-005: BLAKE3 fingerprints for namespace values.
//!
//! A value's fingerprint is the BLAKE3 hash of its canonical JSON encoding,
//! streamed straight into the hasher.

use crate::core::error::FlowError;
use crate::core::namespace::Namespace;
use crate::core::types::Fingerprint;
use serde::Serialize;

/// Fingerprint a value. Fails when the value has no JSON encoding
/// (e.g. a map with non-string keys).
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint, String> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, value).map_err(|e| format!("{}", e))?;
    Ok(Fingerprint::from_hash(hasher.finalize()))
}

/// Fingerprint a variable in the namespace. `Ok(None)` when unbound.
pub fn fingerprint_of<N: Namespace + ?Sized>(
    ns: &N,
    name: &str,
) -> Result<Option<Fingerprint>, FlowError> {
    match ns.get(name) {
        None => Ok(None),
        Some(value) => fingerprint(value)
            .map(Some)
            .map_err(|reason| FlowError::Unfingerprintable {
                variable: name.to_string(),
                reason,
            }),
    }
}
