//! Grooming-strategy composition.
//!
//! A [`GroomingStrategy`] is an ordered plan of allocation and deallocation
//! steps plus a trigger condition, intended to place an attacker-influenced
//! object at a chosen spot in the modeled heap. The composer fills the
//! plan's randomized counts and delays from the injected random source and
//! renders a fixed-form description of every step.

use crate::analysis::AnalysisError;
use crate::ledger::infer_alignment;
use crate::spray::{ObjectKind, SprayConfig};
use crate::util::Rng;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Object name used for filler sprays.
const FILLER_OBJECT: &str = "array";

/// Target types that require waiting for a garbage-collection pass.
const GC_TRIGGER_TYPES: [&str; 2] = ["ArrayBuffer", "TypedArray"];

/// Target types that take effect immediately.
const IMMEDIATE_TYPES: [&str; 2] = ["JSFunction", "JSObject"];

/// Bounds for the bulk filler spray count.
const SPRAY_COUNT_BOUNDS: (u64, u64) = (50, 100);

/// Bounds for secondary filler and deallocation batch counts.
const BATCH_COUNT_BOUNDS: (u64, u64) = (20, 40);

/// Bounds for deallocation delays in milliseconds.
const DELAY_MS_BOUNDS: (u64, u64) = (100, 500);

/// Bounds for GC trigger magnitudes in milliseconds.
const GC_TRIGGER_MS_BOUNDS: (u64, u64) = (1000, 3000);

/// Bounds for timeout trigger magnitudes in milliseconds.
const TIMEOUT_MS_BOUNDS: (u64, u64) = (500, 2000);

/// How a grooming strategy is set off once the heap is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fire as soon as the steps complete.
    Immediate,
    /// Wait for a garbage-collection pass.
    GcTrigger,
    /// Fire after a fixed delay.
    Timeout,
    /// Caller-supplied trigger code.
    Custom,
}

/// Trigger condition for a grooming strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCondition {
    /// The trigger kind.
    pub kind: TriggerKind,
    /// Magnitude in milliseconds, for timed triggers.
    pub value: Option<u64>,
    /// Trigger code, for custom triggers.
    pub custom_code: Option<String>,
}

/// One allocation step of a grooming strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStep {
    /// Allocation size in bytes.
    pub size: u64,
    /// Number of allocations.
    pub count: u32,
    /// Object type to allocate.
    pub object_type: String,
    /// Byte pattern to fill the allocations with.
    pub fill_pattern: Option<String>,
    /// Delay before the step in milliseconds.
    pub delay_ms: u64,
}

/// One deallocation step of a grooming strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocationStep {
    /// Object type to free.
    pub object_type: String,
    /// Number of objects to free.
    pub count: u32,
    /// Delay before the step in milliseconds.
    pub delay_ms: u64,
}

/// A complete grooming plan: ordered steps, a trigger, and a rendered
/// description. Built fresh per request and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroomingStrategy {
    /// Allocation steps in execution order.
    pub allocation_steps: Vec<AllocationStep>,
    /// Deallocation steps in execution order.
    pub deallocation_steps: Vec<DeallocationStep>,
    /// Trigger condition.
    pub trigger: TriggerCondition,
    /// Human-readable rendering of every step and the trigger.
    pub description: String,
}

impl GroomingStrategy {
    /// Derives the spray configuration for the strategy's bulk spray step.
    ///
    /// The configuration is what the code-emission layer consumes; this
    /// crate only supplies the values.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::EmptyStrategy`] if there are no allocation
    /// steps, or [`AnalysisError::UnsupportedObjectKind`] if the spray
    /// step's object type is outside the known enumeration.
    pub fn spray_config(&self) -> Result<SprayConfig, AnalysisError> {
        let step = self
            .allocation_steps
            .first()
            .ok_or(AnalysisError::EmptyStrategy)?;
        Ok(SprayConfig {
            target_size: step.size,
            count: step.count,
            kind: step.object_type.parse::<ObjectKind>()?,
            fill_pattern: step.fill_pattern.clone(),
            alignment: infer_alignment(step.size),
        })
    }
}

/// Composes grooming strategies and keeps a store of named patterns.
#[derive(Debug)]
pub struct StrategyComposer {
    rng: Rng,
    known_patterns: BTreeMap<String, Vec<GroomingStrategy>>,
}

impl StrategyComposer {
    /// Creates a composer with an injected random source.
    pub fn new(rng: Rng) -> Self {
        Self {
            rng,
            known_patterns: BTreeMap::new(),
        }
    }

    /// Generates a grooming strategy for a target object.
    ///
    /// The plan sprays filler objects at the target size to plug freelist
    /// holes, optionally adds a secondary filler covering the excess when
    /// the overwrite budget exceeds the target size, allocates the target
    /// itself, then frees the filler batch and the target with randomized
    /// delays. The trigger is chosen by a fixed type lookup.
    pub fn generate(
        &mut self,
        target_size: u64,
        target_type: &str,
        overwrite_size: Option<u64>,
    ) -> GroomingStrategy {
        let allocation_steps = self.allocation_steps(target_size, target_type, overwrite_size);
        let deallocation_steps = self.deallocation_steps(target_type);
        let trigger = self.trigger_condition(target_type);
        let description = describe(&allocation_steps, &deallocation_steps, &trigger);
        debug!(
            "Composed strategy for {} at size 0x{:x}",
            target_type, target_size
        );
        GroomingStrategy {
            allocation_steps,
            deallocation_steps,
            trigger,
            description,
        }
    }

    fn allocation_steps(
        &mut self,
        target_size: u64,
        target_type: &str,
        overwrite_size: Option<u64>,
    ) -> Vec<AllocationStep> {
        let (spray_lo, spray_hi) = SPRAY_COUNT_BOUNDS;
        let mut steps = vec![AllocationStep {
            size: target_size,
            count: self.rng.draw(spray_lo..=spray_hi) as u32,
            object_type: FILLER_OBJECT.to_string(),
            fill_pattern: Some("0x41".to_string()),
            delay_ms: 0,
        }];

        if let Some(overwrite_size) = overwrite_size {
            if overwrite_size > target_size {
                let (batch_lo, batch_hi) = BATCH_COUNT_BOUNDS;
                steps.push(AllocationStep {
                    size: overwrite_size - target_size,
                    count: self.rng.draw(batch_lo..=batch_hi) as u32,
                    object_type: FILLER_OBJECT.to_string(),
                    fill_pattern: Some("0x42".to_string()),
                    delay_ms: 0,
                });
            }
        }

        steps.push(AllocationStep {
            size: target_size,
            count: 1,
            object_type: target_type.to_string(),
            fill_pattern: Some("0x43".to_string()),
            delay_ms: 0,
        });
        steps
    }

    fn deallocation_steps(&mut self, target_type: &str) -> Vec<DeallocationStep> {
        let (batch_lo, batch_hi) = BATCH_COUNT_BOUNDS;
        let (delay_lo, delay_hi) = DELAY_MS_BOUNDS;
        vec![
            DeallocationStep {
                object_type: FILLER_OBJECT.to_string(),
                count: self.rng.draw(batch_lo..=batch_hi) as u32,
                delay_ms: self.rng.draw(delay_lo..=delay_hi),
            },
            DeallocationStep {
                object_type: target_type.to_string(),
                count: 1,
                delay_ms: self.rng.draw(delay_lo..=delay_hi),
            },
        ]
    }

    fn trigger_condition(&mut self, target_type: &str) -> TriggerCondition {
        if GC_TRIGGER_TYPES.contains(&target_type) {
            let (lo, hi) = GC_TRIGGER_MS_BOUNDS;
            return TriggerCondition {
                kind: TriggerKind::GcTrigger,
                value: Some(self.rng.draw(lo..=hi)),
                custom_code: None,
            };
        }
        if IMMEDIATE_TYPES.contains(&target_type) {
            return TriggerCondition {
                kind: TriggerKind::Immediate,
                value: None,
                custom_code: None,
            };
        }
        let (lo, hi) = TIMEOUT_MS_BOUNDS;
        TriggerCondition {
            kind: TriggerKind::Timeout,
            value: Some(self.rng.draw(lo..=hi)),
            custom_code: None,
        }
    }

    /// Registers a strategy under a pattern name for later retrieval.
    pub fn register_pattern(&mut self, name: &str, strategy: GroomingStrategy) {
        self.known_patterns
            .entry(name.to_string())
            .or_default()
            .push(strategy);
    }

    /// Returns registered strategies whose allocation steps include the
    /// given size, across all pattern names.
    pub fn patterns_for_size(&self, size: u64) -> Vec<&GroomingStrategy> {
        self.known_patterns
            .values()
            .flatten()
            .filter(|strategy| {
                strategy
                    .allocation_steps
                    .iter()
                    .any(|step| step.size == size)
            })
            .collect()
    }
}

/// Renders the fixed-form description of a strategy.
fn describe(
    allocation_steps: &[AllocationStep],
    deallocation_steps: &[DeallocationStep],
    trigger: &TriggerCondition,
) -> String {
    let mut out = String::new();
    out.push_str("Allocation Steps:\n");
    for step in allocation_steps {
        let _ = writeln!(
            out,
            "- Allocate {} {}(s) of size {}",
            step.count, step.object_type, step.size
        );
    }
    out.push_str("\nDeallocation Steps:\n");
    for step in deallocation_steps {
        let _ = writeln!(out, "- Deallocate {} {}(s)", step.count, step.object_type);
    }
    out.push_str("\nTrigger:\n");
    let line = match trigger.kind {
        TriggerKind::Immediate => "- Immediate trigger".to_string(),
        TriggerKind::GcTrigger => {
            format!("- GC trigger after {}ms", trigger.value.unwrap_or(0))
        }
        TriggerKind::Timeout => {
            format!("- Timeout trigger after {}ms", trigger.value.unwrap_or(0))
        }
        TriggerKind::Custom => "- Custom trigger".to_string(),
    };
    out.push_str(&line);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> StrategyComposer {
        StrategyComposer::new(Rng::from_seed(0xbeef))
    }

    #[test]
    fn strategy_shape_without_overwrite() {
        let strategy = composer().generate(0x20, "TypedArray", None);

        assert_eq!(strategy.allocation_steps.len(), 2);
        let spray = &strategy.allocation_steps[0];
        assert_eq!(spray.object_type, "array");
        assert!((50..=100).contains(&(spray.count as u64)));
        assert_eq!(spray.fill_pattern.as_deref(), Some("0x41"));

        let target = &strategy.allocation_steps[1];
        assert_eq!(target.object_type, "TypedArray");
        assert_eq!(target.count, 1);
        assert_eq!(target.size, 0x20);

        assert_eq!(strategy.deallocation_steps.len(), 2);
        assert_eq!(strategy.deallocation_steps[1].count, 1);
        for step in &strategy.deallocation_steps {
            assert!((100..=500).contains(&step.delay_ms));
        }
    }

    #[test]
    fn excess_overwrite_adds_secondary_filler() {
        let strategy = composer().generate(0x20, "Uint8Array", Some(0x60));
        assert_eq!(strategy.allocation_steps.len(), 3);
        let secondary = &strategy.allocation_steps[1];
        assert_eq!(secondary.size, 0x40);
        assert_eq!(secondary.fill_pattern.as_deref(), Some("0x42"));
        assert!((20..=40).contains(&(secondary.count as u64)));
    }

    #[test]
    fn overwrite_no_larger_than_target_adds_nothing() {
        let strategy = composer().generate(0x40, "Uint8Array", Some(0x40));
        assert_eq!(strategy.allocation_steps.len(), 2);
    }

    #[test]
    fn gc_types_get_gc_trigger_in_bounds() {
        for target_type in ["ArrayBuffer", "TypedArray"] {
            let strategy = composer().generate(0x20, target_type, None);
            assert_eq!(strategy.trigger.kind, TriggerKind::GcTrigger);
            let value = strategy.trigger.value.unwrap();
            assert!((1000..=3000).contains(&value));
        }
    }

    #[test]
    fn function_types_trigger_immediately() {
        for target_type in ["JSFunction", "JSObject"] {
            let strategy = composer().generate(0x30, target_type, None);
            assert_eq!(strategy.trigger.kind, TriggerKind::Immediate);
            assert_eq!(strategy.trigger.value, None);
        }
    }

    #[test]
    fn other_types_default_to_timeout() {
        let strategy = composer().generate(0x30, "DataView", None);
        assert_eq!(strategy.trigger.kind, TriggerKind::Timeout);
        let value = strategy.trigger.value.unwrap();
        assert!((500..=2000).contains(&value));
    }

    #[test]
    fn description_enumerates_every_step() {
        let strategy = composer().generate(0x20, "ArrayBuffer", Some(0x60));
        for step in &strategy.allocation_steps {
            assert!(strategy.description.contains(&format!(
                "- Allocate {} {}(s) of size {}",
                step.count, step.object_type, step.size
            )));
        }
        for step in &strategy.deallocation_steps {
            assert!(strategy
                .description
                .contains(&format!("- Deallocate {} {}(s)", step.count, step.object_type)));
        }
        assert!(strategy.description.contains("GC trigger after"));
    }

    #[test]
    fn same_seed_reproduces_the_strategy() {
        let a = StrategyComposer::new(Rng::from_seed(7)).generate(0x20, "ArrayBuffer", Some(0x40));
        let b = StrategyComposer::new(Rng::from_seed(7)).generate(0x20, "ArrayBuffer", Some(0x40));
        assert_eq!(a, b);
    }

    #[test]
    fn pattern_store_retrieval_by_size() {
        let mut composer = composer();
        let strategy = composer.generate(0x20, "ArrayBuffer", None);
        composer.register_pattern("buffer-groom", strategy);
        let other = composer.generate(0x80, "DataView", None);
        composer.register_pattern("big-groom", other);

        assert_eq!(composer.patterns_for_size(0x20).len(), 1);
        assert_eq!(composer.patterns_for_size(0x80).len(), 1);
        assert!(composer.patterns_for_size(0x1000).is_empty());
    }
}
