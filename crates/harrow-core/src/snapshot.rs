//! Ledger persistence boundary.
//!
//! A [`LedgerSnapshot`] captures the bucket table, the full event sequence,
//! and the derived reuse/boundary tables. Re-importing a snapshot
//! reconstructs the ledger such that re-exporting yields a byte-for-byte
//! identical document: the containers are ordered and the derived tables
//! are recomputed deterministically from the same event log.

use crate::ledger::{AllocationEvent, Bucket, BucketLedger, Result, ReuseStats};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Persisted form of a [`BucketLedger`] and its derived tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Bucket table keyed by bucket index.
    pub buckets: BTreeMap<u32, Bucket>,
    /// Full event sequence in insertion order.
    pub events: Vec<AllocationEvent>,
    /// Reuse statistics per distinct size, derived from `events`.
    pub reuse_patterns: BTreeMap<u64, ReuseStats>,
    /// Bucket boundary list, derived from `events`.
    pub boundaries: Vec<(u64, u64)>,
}

impl BucketLedger {
    /// Exports the ledger state and derived tables.
    pub fn export_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            buckets: self.buckets().clone(),
            events: self.events().to_vec(),
            reuse_patterns: self.detect_reuse_patterns(),
            boundaries: self.infer_bucket_boundaries(),
        }
    }

    /// Reconstructs a ledger from a snapshot.
    ///
    /// The derived tables are not trusted; they are recomputed on the next
    /// export from the imported event log.
    pub fn import_snapshot(snapshot: LedgerSnapshot) -> Self {
        BucketLedger::from_parts(snapshot.events, snapshot.buckets)
    }

    /// Serializes the exported snapshot to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_snapshot())?)
    }

    /// Reconstructs a ledger from a JSON snapshot string.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Json`] if the document cannot be decoded.
    pub fn from_json(input: &str) -> Result<Self> {
        let snapshot: LedgerSnapshot = serde_json::from_str(input)?;
        Ok(Self::import_snapshot(snapshot))
    }

    /// Writes the exported snapshot to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file cannot be written.
    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        info!(
            "Exported {} events to {}",
            self.events().len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Reads a ledger from a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file cannot be read, or
    /// [`LedgerError::Json`] if it cannot be decoded.
    pub fn read_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::{AllocationEvent, BucketLedger};

    fn sample_ledger() -> BucketLedger {
        let mut ledger = BucketLedger::new();
        ledger
            .record(AllocationEvent::alloc(0x20).at(0x1000).in_bucket(0))
            .unwrap();
        ledger
            .record(AllocationEvent::alloc(0x20).at(0x1020).in_bucket(0))
            .unwrap();
        ledger
            .record(AllocationEvent::free(0x20).at(0x1000).in_bucket(0))
            .unwrap();
        ledger
            .record(AllocationEvent::alloc(0x20).at(0x1000).in_bucket(0))
            .unwrap();
        ledger
            .record(AllocationEvent::alloc(0x40).at(0x4000).in_bucket(2).of_type("TypedArray"))
            .unwrap();
        ledger
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let ledger = sample_ledger();
        let exported = ledger.to_json().unwrap();
        let reimported = BucketLedger::from_json(&exported).unwrap();
        let re_exported = reimported.to_json().unwrap();
        assert_eq!(exported, re_exported);
    }

    #[test]
    fn import_restores_buckets_and_events() {
        let ledger = sample_ledger();
        let reimported = BucketLedger::from_json(&ledger.to_json().unwrap()).unwrap();
        assert_eq!(reimported.events(), ledger.events());
        assert_eq!(reimported.buckets(), ledger.buckets());
    }

    #[test]
    fn file_round_trip() {
        let ledger = sample_ledger();
        let path = std::env::temp_dir().join("harrow-snapshot-test.json");
        ledger.write_json_file(&path).unwrap();
        let reimported = BucketLedger::read_json_file(&path).unwrap();
        assert_eq!(reimported.events(), ledger.events());
        std::fs::remove_file(&path).ok();
    }
}
