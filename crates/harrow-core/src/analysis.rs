//! Bug-scenario analysis: exploitability scoring and grooming-sequence
//! synthesis.
//!
//! Given a bug scenario and the object registry, this module ranks
//! candidate target objects by a bounded `[0, 1]` exploitability score and
//! synthesizes a bug-kind-specific sequence of allocate/free operations per
//! candidate. Finding no candidate is a normal outcome, reported as a
//! zero-score result rather than an error.

use crate::registry::{ObjectMetadata, ObjectRegistry};
use crate::util::Rng;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Object name used for filler allocations in synthesized sequences.
const FILLER_OBJECT: &str = "array";

/// Bounds for randomized filler-spray counts.
const FILLER_COUNT_BOUNDS: (u64, u64) = (10, 20);

/// Minimum score a candidate must exceed to be reported.
const SCORE_CUTOFF: f64 = 0.5;

/// Errors for unsupported request shapes.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A bug kind outside the known enumeration was requested.
    #[error("unsupported bug kind `{0}`")]
    UnsupportedBugKind(String),
    /// An object kind outside the known enumeration was requested.
    #[error("unsupported object kind `{0}`")]
    UnsupportedObjectKind(String),
    /// A strategy without allocation steps cannot seed a spray.
    #[error("strategy has no allocation steps")]
    EmptyStrategy,
}

/// Kinds of heap bugs the analyzer reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugKind {
    /// Linear out-of-bounds write past an allocation.
    Overflow,
    /// Access through a dangling pointer after free.
    UseAfterFree,
    /// The same allocation freed twice.
    DoubleFree,
    /// Bulk allocation to control heap contents.
    HeapSpray,
}

impl FromStr for BugKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overflow" => Ok(BugKind::Overflow),
            "use_after_free" => Ok(BugKind::UseAfterFree),
            "double_free" => Ok(BugKind::DoubleFree),
            "heap_spray" => Ok(BugKind::HeapSpray),
            other => Err(AnalysisError::UnsupportedBugKind(other.to_string())),
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BugKind::Overflow => "overflow",
            BugKind::UseAfterFree => "use_after_free",
            BugKind::DoubleFree => "double_free",
            BugKind::HeapSpray => "heap_spray",
        };
        write!(f, "{}", name)
    }
}

/// A concrete bug scenario to analyze. Transient input, not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugScenario {
    /// The bug kind.
    pub kind: BugKind,
    /// Size of the buggy allocation.
    pub size: u64,
    /// Offset of the corrupting write relative to the allocation.
    pub offset: u64,
    /// Number of bytes the bug can overwrite.
    pub overwrite_size: u64,
    /// Name of the object the bug occurs in, if known.
    pub target_object: String,
    /// Free-form scenario constraints.
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
}

impl BugScenario {
    /// Creates a scenario with no constraints.
    pub fn new(kind: BugKind, size: u64, offset: u64, overwrite_size: u64) -> Self {
        Self {
            kind,
            size,
            offset,
            overwrite_size,
            target_object: String::new(),
            constraints: BTreeMap::new(),
        }
    }
}

/// Whether a sequence step allocates or frees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOp {
    /// Allocate `count` objects.
    Allocate,
    /// Free `count` objects.
    Free,
}

/// One operation in a grooming sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Allocate or free.
    pub op: SequenceOp,
    /// Object type the step operates on.
    pub object: String,
    /// Number of objects.
    pub count: u32,
    /// Allocation size; absent for free steps.
    pub size: Option<u64>,
}

impl SequenceStep {
    fn allocate(object: &str, count: u32, size: u64) -> Self {
        Self {
            op: SequenceOp::Allocate,
            object: object.to_string(),
            count,
            size: Some(size),
        }
    }

    fn free(object: &str, count: u32) -> Self {
        Self {
            op: SequenceOp::Free,
            object: object.to_string(),
            count,
            size: None,
        }
    }
}

/// Ordered allocate/free operations targeting one candidate object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroomingSequence {
    /// Name of the candidate the sequence grooms for.
    pub target: String,
    /// Operations in execution order.
    pub steps: Vec<SequenceStep>,
}

/// A candidate target object with its exploitability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// The candidate's registry metadata.
    pub metadata: ObjectMetadata,
    /// Exploitability score in `[0, 1]`.
    pub score: f64,
}

/// Summary judgment of a scenario's exploitability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploitabilityReport {
    /// The top candidate's score, or 0 when no candidate qualifies.
    pub overall_score: f64,
    /// Textual notes on the top candidate's useful properties.
    pub factors: Vec<String>,
    /// Fixed per-bug-kind advisory text.
    pub recommendations: Vec<String>,
}

/// Full result of analyzing a bug scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Qualifying candidates, best first.
    pub candidates: Vec<ScoredCandidate>,
    /// One synthesized sequence per candidate, in candidate order.
    pub sequences: Vec<GroomingSequence>,
    /// Exploitability summary.
    pub exploitability: ExploitabilityReport,
}

/// Scores an object against a scenario.
///
/// Four additive, independent factors summing to at most 1.0:
/// size match (0.3 equal / 0.2 strictly smaller), dangerous-field density
/// (0.1 per field, capped at 0.3), vtable presence (0.2), and metadata
/// clearance (0.2 when the runtime metadata ends before the write offset).
pub fn exploitability_score(object: &ObjectMetadata, scenario: &BugScenario) -> f64 {
    let mut score = 0.0;

    if object.size == scenario.overwrite_size {
        score += 0.3;
    } else if object.size < scenario.overwrite_size {
        score += 0.2;
    }

    score += (object.dangerous_fields.len() as f64 * 0.1).min(0.3);

    if object.vtable_offset.is_some() {
        score += 0.2;
    }

    if object.metadata_size <= scenario.offset {
        score += 0.2;
    }

    score
}

/// Ranks candidate objects and synthesizes grooming sequences for a bug
/// scenario.
///
/// Owns the injected random source; the registry is only queried.
#[derive(Debug)]
pub struct ScenarioAnalyzer {
    rng: Rng,
    history: Vec<BugScenario>,
}

impl ScenarioAnalyzer {
    /// Creates an analyzer with an injected random source.
    pub fn new(rng: Rng) -> Self {
        Self {
            rng,
            history: vec![],
        }
    }

    /// Scenarios analyzed so far, in request order.
    pub fn scenario_history(&self) -> &[BugScenario] {
        &self.history
    }

    /// Filters and ranks registry objects for a scenario.
    ///
    /// An object qualifies when it fits the overwrite budget, the corrupting
    /// write lands aligned for the object, and it declares at least one
    /// dangerous field. Candidates scoring at most 0.5 are discarded; the
    /// rest are sorted by score descending, stable in registration order.
    pub fn find_candidates(
        &self,
        registry: &ObjectRegistry,
        scenario: &BugScenario,
    ) -> Vec<ScoredCandidate> {
        let mut candidates: Vec<ScoredCandidate> = registry
            .iter()
            .filter(|object| object.size <= scenario.overwrite_size)
            .filter(|object| {
                object.alignment > 0 && (scenario.offset + object.size) % object.alignment == 0
            })
            .filter(|object| !object.dangerous_fields.is_empty())
            .map(|object| ScoredCandidate {
                metadata: object.clone(),
                score: exploitability_score(object, scenario),
            })
            .filter(|candidate| candidate.score > SCORE_CUTOFF)
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!(
            "{} candidate(s) qualified for {} scenario",
            candidates.len(),
            scenario.kind
        );
        candidates
    }

    /// Synthesizes the grooming sequence for one candidate.
    ///
    /// The step structure is fixed per bug kind; only the filler count is
    /// drawn from the injected random source.
    pub fn synthesize_sequence(
        &mut self,
        target: &ObjectMetadata,
        scenario: &BugScenario,
    ) -> GroomingSequence {
        let (lo, hi) = FILLER_COUNT_BOUNDS;
        let steps = match scenario.kind {
            BugKind::UseAfterFree => {
                let filler_count = self.rng.draw(lo..=hi) as u32;
                vec![
                    SequenceStep::allocate(&target.name, 1, target.size),
                    SequenceStep::allocate(FILLER_OBJECT, filler_count, target.size),
                    SequenceStep::free(&target.name, 1),
                    SequenceStep::allocate(FILLER_OBJECT, 1, target.size),
                ]
            }
            BugKind::Overflow => vec![
                SequenceStep::allocate(&target.name, 1, target.size),
                SequenceStep::allocate(FILLER_OBJECT, 1, scenario.overwrite_size),
            ],
            BugKind::DoubleFree => vec![
                SequenceStep::allocate(&target.name, 1, target.size),
                SequenceStep::free(&target.name, 1),
                SequenceStep::allocate(FILLER_OBJECT, 1, target.size),
                SequenceStep::free(&target.name, 1),
            ],
            BugKind::HeapSpray => {
                let filler_count = self.rng.draw(lo..=hi) as u32;
                vec![SequenceStep::allocate(
                    FILLER_OBJECT,
                    filler_count,
                    target.size,
                )]
            }
        };
        GroomingSequence {
            target: target.name.clone(),
            steps,
        }
    }

    /// Analyzes a bug scenario against the registry.
    ///
    /// Returns the qualifying candidates, one synthesized sequence per
    /// candidate, and an exploitability summary. An empty candidate set is
    /// a normal outcome: the summary carries a zero score and a single
    /// explanatory factor.
    pub fn analyze(&mut self, registry: &ObjectRegistry, scenario: &BugScenario) -> AnalysisReport {
        self.history.push(scenario.clone());

        let candidates = self.find_candidates(registry, scenario);
        let sequences = candidates
            .iter()
            .map(|candidate| {
                let metadata = candidate.metadata.clone();
                self.synthesize_sequence(&metadata, scenario)
            })
            .collect();
        let exploitability = self.judge(&candidates, scenario);
        info!(
            "Scenario {} scored {:.2} with {} candidate(s)",
            scenario.kind,
            exploitability.overall_score,
            candidates.len()
        );

        AnalysisReport {
            candidates,
            sequences,
            exploitability,
        }
    }

    fn judge(
        &self,
        candidates: &[ScoredCandidate],
        scenario: &BugScenario,
    ) -> ExploitabilityReport {
        let Some(best) = candidates.first() else {
            return ExploitabilityReport {
                overall_score: 0.0,
                factors: vec!["No suitable target objects found".to_string()],
                recommendations: vec![],
            };
        };

        let mut factors = vec![];
        if best.metadata.vtable_offset.is_some() {
            factors.push("Vtable manipulation possible".to_string());
        }
        if !best.metadata.dangerous_fields.is_empty() {
            factors.push(format!(
                "Found {} dangerous fields",
                best.metadata.dangerous_fields.len()
            ));
        }

        let recommendations = vec![match scenario.kind {
            BugKind::UseAfterFree => {
                "Consider using heap spraying to increase reliability".to_string()
            }
            BugKind::Overflow => "Ensure proper alignment of target objects".to_string(),
            BugKind::DoubleFree => {
                "Keep allocation order stable between the two frees".to_string()
            }
            BugKind::HeapSpray => {
                "Use a recognizable fill pattern to identify sprayed objects".to_string()
            }
        }];

        ExploitabilityReport {
            overall_score: best.score,
            factors,
            recommendations,
        }
    }
}
