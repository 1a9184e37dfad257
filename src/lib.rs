//! # Harrow
//!
//! Harrow is a toolkit for analyzing heap-grooming opportunities against
//! size-segregated slab/bucket allocators. It models allocator behavior
//! from an observed event log, classifies candidate target objects by
//! exploitation risk, and synthesizes ordered allocation/deallocation
//! plans ("grooming strategies") for a target size and type.
//!
//! Harrow produces a reasoned model and ordered sequence of operations
//! only; it does not execute, inject, or verify anything against a live
//! process.
//!
//! ## Modules
//!
//! - `ledger`: Ingests allocation/free events and models allocator buckets,
//!   alignment, and address reuse.
//! - `registry`: Catalogs target object types and builds overwrite chains.
//! - `analysis`: Scores bug scenarios and synthesizes grooming sequences.
//! - `strategy`: Composes complete grooming strategies with triggers.
//! - `snapshot`: Persists and restores ledger state.
//! - `spray`: Configuration boundary for code-emission collaborators.
//! - `util`: Seedable random source shared by the randomized components.
//!
//! ## Quickstart
//!
//! ```
//! use harrow::{
//!     AllocationEvent, BucketLedger, BugKind, BugScenario, ObjectRegistry,
//!     ScenarioAnalyzer, StrategyComposer,
//! };
//! use harrow::util::Rng;
//!
//! let mut ledger = BucketLedger::new();
//! ledger
//!     .record(AllocationEvent::alloc(0x20).at(0x1000).in_bucket(0))
//!     .unwrap();
//!
//! let registry = ObjectRegistry::with_common_objects();
//! let mut analyzer = ScenarioAnalyzer::new(Rng::from_seed(0x41));
//! let scenario = BugScenario::new(BugKind::UseAfterFree, 0x40, 0x0, 0x40);
//! let report = analyzer.analyze(&registry, &scenario);
//! assert!(report.exploitability.overall_score > 0.0);
//!
//! let mut composer = StrategyComposer::new(Rng::from_seed(0x42));
//! let strategy = composer.generate(0x40, "TypedArray", None);
//! assert!(!strategy.description.is_empty());
//! ```

pub use harrow_core::{analysis, ledger, registry, snapshot, spray, strategy, util};

pub use harrow_core::{
    AllocationEvent, AnalysisError, AnalysisReport, BucketLedger, BugKind, BugScenario,
    EventKind, GroomingStrategy, LedgerError, LedgerSnapshot, ObjectClass, ObjectKind,
    ObjectMetadata, ObjectRegistry, OverwriteChain, ScenarioAnalyzer, SprayConfig,
    SprayEmitter, StrategyComposer, TriggerKind,
};
