//! # Harrow Core
//!
//! `harrow-core` is the foundational library for the Harrow heap-grooming
//! analysis toolkit. It models the behavior of a size-segregated
//! slab/bucket allocator from an observed sequence of allocation/free
//! events, classifies candidate target objects by exploitation risk, and
//! synthesizes ordered allocation/deallocation plans intended to place an
//! attacker-influenced object at a chosen location relative to a victim.
//!
//! ## Architecture Overview
//!
//! Four components own the analysis, each with exclusive state mutated only
//! through its own operations:
//!
//! - [`ledger::BucketLedger`] - Ingests allocation/free events, infers
//!   alignment and slot sizes, clusters sizes into bucket boundaries, and
//!   detects temporal address reuse.
//!
//! - [`registry::ObjectRegistry`] - Holds metadata for known target object
//!   types, classifies them by risk, and builds candidate overwrite chains
//!   toward a byte budget.
//!
//! - [`analysis::ScenarioAnalyzer`] - Scores registry objects against a bug
//!   scenario and synthesizes bug-kind-specific allocate/free sequences.
//!
//! - [`strategy::StrategyComposer`] - Assembles complete grooming
//!   strategies (allocation steps, deallocation steps, trigger condition,
//!   rendered description) for a target size and type.
//!
//! ## Boundaries
//!
//! - [`snapshot`] persists and restores ledger state with a byte-for-byte
//!   round-trip guarantee.
//! - [`spray`] carries the configuration consumed by external code-emission
//!   collaborators; this crate never generates runtime script text.
//! - [`util::Rng`] is the injectable, seedable random source behind every
//!   randomized count, delay, and trigger magnitude.
//!
//! All analysis is single-threaded, offline computation over in-memory
//! structures; files are touched only at the explicit snapshot and
//! ingestion boundaries.

#![warn(missing_docs)]

pub mod analysis;
pub mod ledger;
pub mod registry;
pub mod snapshot;
pub mod spray;
pub mod strategy;
pub mod util;

pub use crate::analysis::{
    AnalysisError, AnalysisReport, BugKind, BugScenario, ScenarioAnalyzer,
};
pub use crate::ledger::{AllocationEvent, BucketLedger, EventKind, LedgerError};
pub use crate::registry::{ObjectClass, ObjectMetadata, ObjectRegistry, OverwriteChain};
pub use crate::snapshot::LedgerSnapshot;
pub use crate::spray::{ObjectKind, SprayConfig, SprayEmitter};
pub use crate::strategy::{GroomingStrategy, StrategyComposer, TriggerKind};
