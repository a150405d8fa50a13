// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Fingerprinting and staleness tracking
//!
//! Computes content fingerprints of stage inputs, outputs and parameters,
//! and compares them with the run record to decide which stages are stale.

pub mod hash;
mod params;
mod record;
mod tracker;

pub use hash::ContentHasher;
pub use params::ParamsFile;
pub use record::{LockfileStore, RecordStore, RunRecord, StageRecord};
pub use tracker::{FingerprintTracker, StaleReason, Staleness};

use serde::{Deserialize, Serialize};

/// Hex-encoded BLAKE3 digest of a file, directory or parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a hex digest
    pub fn new(hex: String) -> Self {
        Self(hex)
    }

    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the digest, for display.
    ///
    /// Digests come from a hand-editable lock file, so anything that is not
    /// eight bytes of ASCII up front is shown whole.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
