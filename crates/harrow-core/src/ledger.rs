//! Allocation-event ledger and bucket model.
//!
//! This module ingests an ordered log of allocation and free events observed
//! from a size-segregated slab/bucket allocator and derives a model of the
//! allocator's behavior: per-bucket free/used address sets, alignment and
//! slot-size inference, size-class boundaries, and temporal address-reuse
//! statistics.
//!
//! The event log is append-only and insertion order is the only ordering;
//! no timestamp-based re-sorting is performed.

use itertools::{Itertools, MinMaxResult};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Alignment values the modeled allocator rounds slot sizes to.
pub const ALIGNMENTS: [u64; 4] = [8, 16, 32, 64];

/// Upper bound on the number of size clusters used for bucket boundaries.
const MAX_BUCKET_CLUSTERS: usize = 10;

/// Iteration cap for the boundary clustering loop.
const MAX_CLUSTER_ROUNDS: usize = 32;

/// Errors that can occur while recording or ingesting events.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A record in an ingestion batch lacks a required field.
    #[error("event record is missing required field `{0}`")]
    MissingField(&'static str),
    /// The event's allocation size is zero.
    #[error("allocation size must be positive")]
    InvalidSize,
    /// A record could not be decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Reading or writing a snapshot file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Whether an event allocates or frees memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Memory was requested from the allocator.
    Alloc,
    /// Memory was returned to the allocator.
    Free,
}

/// A single allocation or deallocation event.
///
/// Immutable once recorded. The optional fields carry whatever the
/// observation tooling was able to capture; only `kind` and `size` are
/// required at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    /// Observation time in seconds. Defaults to 0 when the tooling did not
    /// capture timestamps.
    #[serde(default)]
    pub timestamp: f64,
    /// Allocation or free.
    pub kind: EventKind,
    /// Requested size in bytes.
    pub size: u64,
    /// Slot address, when observed.
    #[serde(default)]
    pub address: Option<u64>,
    /// Allocator bucket the event was served from, when observed.
    #[serde(default)]
    pub bucket_index: Option<u32>,
    /// Runtime type of the object involved, when known.
    #[serde(default)]
    pub object_type: Option<String>,
}

impl AllocationEvent {
    /// Creates an allocation event of the given size.
    pub fn alloc(size: u64) -> Self {
        Self {
            timestamp: 0.0,
            kind: EventKind::Alloc,
            size,
            address: None,
            bucket_index: None,
            object_type: None,
        }
    }

    /// Creates a free event of the given size.
    pub fn free(size: u64) -> Self {
        Self {
            kind: EventKind::Free,
            ..Self::alloc(size)
        }
    }

    /// Sets the slot address.
    pub fn at(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    /// Sets the bucket index.
    pub fn in_bucket(mut self, index: u32) -> Self {
        self.bucket_index = Some(index);
        self
    }

    /// Sets the object type.
    pub fn of_type(mut self, object_type: &str) -> Self {
        self.object_type = Some(object_type.to_string());
        self
    }
}

/// A size class of the modeled allocator.
///
/// Created lazily on the first event naming its bucket index and mutated in
/// place afterwards; buckets are never deleted. An address belongs to exactly
/// one of `free_addresses`/`used_addresses` at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Requested size the bucket serves.
    pub size_class: u64,
    /// Inferred alignment of the bucket's slots.
    pub alignment: u64,
    /// Actual reserved size per slot after alignment rounding.
    pub slot_size: u64,
    /// Addresses currently on the freelist.
    pub free_addresses: BTreeSet<u64>,
    /// Addresses currently handed out.
    pub used_addresses: BTreeSet<u64>,
}

impl Bucket {
    /// Creates an empty bucket for a size class.
    pub fn new(size_class: u64) -> Self {
        Self {
            size_class,
            alignment: infer_alignment(size_class),
            slot_size: infer_slot_size(size_class),
            free_addresses: BTreeSet::new(),
            used_addresses: BTreeSet::new(),
        }
    }
}

/// Address-reuse statistics for one allocation size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReuseStats {
    /// Fraction of allocations that landed on a previously seen address.
    pub reuse_frequency: f64,
    /// Number of distinct addresses observed.
    pub unique_addresses: u64,
    /// Total addressed allocations observed.
    pub total_allocations: u64,
}

/// A free event paired with the first later allocation reusing its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuseMatch {
    /// Index of the free event in the log.
    pub free_index: usize,
    /// Index of the matching later alloc event.
    pub alloc_index: usize,
}

/// Per-size event statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatistics {
    /// Number of events observed for the size.
    pub events: u64,
    /// Inferred alignment.
    pub alignment: u64,
    /// Inferred slot size.
    pub slot_size: u64,
}

/// Free/used slot counts of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOccupancy {
    /// Slots currently on the freelist.
    pub free: usize,
    /// Slots currently handed out.
    pub used: usize,
}

/// Read-only occupancy view of the bucket table.
///
/// Consumed by presentation layers; carries no references back into the
/// ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    /// Time the snapshot was taken, in the log's time base.
    pub timestamp: f64,
    /// Occupancy per bucket index.
    pub bucket_states: BTreeMap<u32, BucketOccupancy>,
    /// Total free slots across all buckets.
    pub total_free: usize,
    /// Total used slots across all buckets.
    pub total_used: usize,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Records accepted into the log.
    pub accepted: usize,
    /// Records rejected by per-record validation.
    pub rejected: usize,
}

/// Infers the slot alignment for a requested size.
///
/// Canonical policy: the largest value in [`ALIGNMENTS`] that evenly divides
/// `size`, falling back to 8 when none divides.
pub fn infer_alignment(size: u64) -> u64 {
    ALIGNMENTS
        .iter()
        .rev()
        .copied()
        .find(|alignment| size % alignment == 0)
        .unwrap_or(8)
}

/// Infers the actual reserved slot size for a requested size.
///
/// Rounds `size` up to the next multiple of [`infer_alignment`].
pub fn infer_slot_size(size: u64) -> u64 {
    let alignment = infer_alignment(size);
    size.div_ceil(alignment) * alignment
}

/// Models allocator behavior from an ordered log of allocation/free events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketLedger {
    events: Vec<AllocationEvent>,
    buckets: BTreeMap<u32, Bucket>,
}

impl BucketLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger from already-validated parts.
    ///
    /// Used by the snapshot import boundary.
    pub(crate) fn from_parts(events: Vec<AllocationEvent>, buckets: BTreeMap<u32, Bucket>) -> Self {
        Self { events, buckets }
    }

    /// Returns the event log in insertion order.
    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    /// Returns the bucket table keyed by bucket index.
    pub fn buckets(&self) -> &BTreeMap<u32, Bucket> {
        &self.buckets
    }

    /// Appends an event to the log and updates the bucket model.
    ///
    /// An alloc event moves its address from the bucket's freelist to the
    /// used set, inserting it if previously unseen; a free event moves a
    /// known used address back to the freelist. Free events for unknown
    /// addresses leave the bucket unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSize`] if the event's size is zero.
    pub fn record(&mut self, event: AllocationEvent) -> Result<()> {
        if event.size == 0 {
            return Err(LedgerError::InvalidSize);
        }
        if let Some(index) = event.bucket_index {
            self.update_bucket(index, &event);
        }
        self.events.push(event);
        Ok(())
    }

    fn update_bucket(&mut self, index: u32, event: &AllocationEvent) {
        let bucket = self
            .buckets
            .entry(index)
            .or_insert_with(|| Bucket::new(event.size));
        let Some(address) = event.address else {
            return;
        };
        match event.kind {
            EventKind::Alloc => {
                bucket.free_addresses.remove(&address);
                bucket.used_addresses.insert(address);
            }
            EventKind::Free => {
                if bucket.used_addresses.remove(&address) {
                    bucket.free_addresses.insert(address);
                }
            }
        }
    }

    /// Ingests a JSON array of event records.
    ///
    /// Records missing the required `size` or `kind` fields, or failing
    /// per-record validation, are rejected individually; the rest of the
    /// batch is still ingested.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Json`] if `input` is not a JSON array.
    pub fn ingest_json(&mut self, input: &str) -> Result<IngestReport> {
        let records: Vec<serde_json::Value> = serde_json::from_str(input)?;
        let mut report = IngestReport::default();
        for (i, record) in records.into_iter().enumerate() {
            match self.ingest_record(record) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    warn!("Rejecting event record {}: {}", i, e);
                    report.rejected += 1;
                }
            }
        }
        Ok(report)
    }

    fn ingest_record(&mut self, record: serde_json::Value) -> Result<()> {
        for field in ["size", "kind"] {
            if record.get(field).is_none() {
                return Err(LedgerError::MissingField(field));
            }
        }
        let event: AllocationEvent = serde_json::from_value(record)?;
        self.record(event)
    }

    /// Partitions the distinct observed sizes into bucket boundaries.
    ///
    /// Runs a 1-D distance-based clustering over the sorted distinct sizes
    /// with at most ten clusters and returns each cluster's `(min, max)`
    /// range, sorted ascending. The clustering is approximate and
    /// independent of event order.
    pub fn infer_bucket_boundaries(&self) -> Vec<(u64, u64)> {
        let sizes: Vec<u64> = self
            .events
            .iter()
            .map(|event| event.size)
            .unique()
            .sorted()
            .collect();
        cluster_sizes(&sizes, MAX_BUCKET_CLUSTERS)
    }

    /// Computes address-reuse frequencies per distinct allocation size.
    ///
    /// For each size, considers the alloc events carrying an address and
    /// reports `(total - unique) / total`. Sizes with fewer than two
    /// addressed allocations are skipped.
    pub fn detect_reuse_patterns(&self) -> BTreeMap<u64, ReuseStats> {
        let mut addresses_by_size: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for event in &self.events {
            if event.kind != EventKind::Alloc {
                continue;
            }
            if let Some(address) = event.address {
                addresses_by_size.entry(event.size).or_default().push(address);
            }
        }

        let mut patterns = BTreeMap::new();
        for (size, addresses) in addresses_by_size {
            if addresses.len() < 2 {
                continue;
            }
            let total = addresses.len() as u64;
            let unique = addresses.iter().unique().count() as u64;
            patterns.insert(
                size,
                ReuseStats {
                    reuse_frequency: (total - unique) as f64 / total as f64,
                    unique_addresses: unique,
                    total_allocations: total,
                },
            );
        }
        patterns
    }

    /// Pairs each free event with the first later allocation reusing its
    /// address, grouped by the freed size.
    ///
    /// The scan is greedy: first match wins and no globally optimal
    /// assignment is attempted. A later allocation can therefore satisfy
    /// several earlier frees of the same address. This is a deliberate
    /// approximation of temporal reuse.
    pub fn match_reuse_chronology(&self) -> BTreeMap<u64, Vec<ReuseMatch>> {
        let mut matches: BTreeMap<u64, Vec<ReuseMatch>> = BTreeMap::new();
        for (free_index, event) in self.events.iter().enumerate() {
            if event.kind != EventKind::Free {
                continue;
            }
            let Some(address) = event.address else {
                continue;
            };
            let hit = self
                .events
                .iter()
                .enumerate()
                .skip(free_index + 1)
                .find(|(_, later)| {
                    later.kind == EventKind::Alloc && later.address == Some(address)
                });
            if let Some((alloc_index, _)) = hit {
                matches.entry(event.size).or_default().push(ReuseMatch {
                    free_index,
                    alloc_index,
                });
            }
        }
        matches
    }

    /// Takes a read-only occupancy snapshot of the bucket table.
    pub fn occupancy_snapshot(&self, timestamp: f64) -> OccupancySnapshot {
        let bucket_states: BTreeMap<u32, BucketOccupancy> = self
            .buckets
            .iter()
            .map(|(index, bucket)| {
                (
                    *index,
                    BucketOccupancy {
                        free: bucket.free_addresses.len(),
                        used: bucket.used_addresses.len(),
                    },
                )
            })
            .collect();
        let total_free = bucket_states.values().map(|state| state.free).sum();
        let total_used = bucket_states.values().map(|state| state.used).sum();
        OccupancySnapshot {
            timestamp,
            bucket_states,
            total_free,
            total_used,
        }
    }

    /// Returns per-size event counts with inferred alignment and slot size.
    pub fn slot_statistics(&self) -> BTreeMap<u64, SlotStatistics> {
        let mut stats: BTreeMap<u64, SlotStatistics> = BTreeMap::new();
        for event in &self.events {
            stats
                .entry(event.size)
                .or_insert_with(|| SlotStatistics {
                    events: 0,
                    alignment: infer_alignment(event.size),
                    slot_size: infer_slot_size(event.size),
                })
                .events += 1;
        }
        stats
    }
}

/// 1-D k-means over sorted distinct sizes.
///
/// Initial centroids are spread evenly over the input, which makes the
/// result deterministic. Convergence is capped at `MAX_CLUSTER_ROUNDS`.
fn cluster_sizes(sizes: &[u64], max_clusters: usize) -> Vec<(u64, u64)> {
    if sizes.is_empty() {
        return vec![];
    }
    let k = max_clusters.min(sizes.len());
    let mut centroids: Vec<f64> = if k == 1 {
        vec![sizes[0] as f64]
    } else {
        (0..k)
            .map(|i| sizes[i * (sizes.len() - 1) / (k - 1)] as f64)
            .collect()
    };

    let mut assignment = vec![0usize; sizes.len()];
    for _ in 0..MAX_CLUSTER_ROUNDS {
        let mut changed = false;
        for (i, &size) in sizes.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da = (size as f64 - **a).abs();
                    let db = (size as f64 - **b).abs();
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(cluster, _)| cluster)
                .unwrap_or(0);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<u64> = sizes
                .iter()
                .zip(&assignment)
                .filter(|(_, c)| **c == cluster)
                .map(|(size, _)| *size)
                .collect();
            if !members.is_empty() {
                *centroid = members.iter().sum::<u64>() as f64 / members.len() as f64;
            }
        }
        if !changed {
            break;
        }
    }

    let mut boundaries: Vec<(u64, u64)> = (0..k)
        .filter_map(|cluster| {
            let members = sizes
                .iter()
                .zip(&assignment)
                .filter(|(_, c)| **c == cluster)
                .map(|(size, _)| *size);
            match members.minmax() {
                MinMaxResult::NoElements => None,
                MinMaxResult::OneElement(size) => Some((size, size)),
                MinMaxResult::MinMax(min, max) => Some((min, max)),
            }
        })
        .collect();
    boundaries.sort_unstable();
    boundaries
}
