// ABOUTME: Deterministic integrity hash over the facts of a grant
// ABOUTME: Recomputable from stored fields at any later audit

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Compute the consent text hash for an artifact.
///
/// The canonical input is `fiduciary|principal|sorted version ids|granted_at`.
/// Version IDs are sorted so the hash is independent of selection order, and
/// the timestamp is rendered at microsecond precision so a value read back
/// from storage hashes identically to the value that was written.
pub fn consent_text_hash(
    fiduciary_id: &str,
    principal_id: &str,
    purpose_version_ids: &[String],
    granted_at: DateTime<Utc>,
) -> String {
    let mut ids = purpose_version_ids.to_vec();
    ids.sort();

    let canonical = format!(
        "{}|{}|{}|{}",
        fiduciary_id,
        principal_id,
        ids.join(","),
        granted_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
