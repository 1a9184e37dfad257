//! Spray configuration boundary.
//!
//! The core never generates target-runtime script text. It only supplies a
//! [`SprayConfig`] describing what to spray; a code-emission collaborator
//! implements [`SprayEmitter`] to turn the configuration into script text
//! for its runtime.

use crate::analysis::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of objects a spray can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Numeric array spray.
    Array,
    /// Plain object spray with shaped properties.
    Object,
    /// String spray.
    #[serde(rename = "string")]
    StringData,
}

impl FromStr for ObjectKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "array" => Ok(ObjectKind::Array),
            "object" => Ok(ObjectKind::Object),
            "string" => Ok(ObjectKind::StringData),
            other => Err(AnalysisError::UnsupportedObjectKind(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Array => "array",
            ObjectKind::Object => "object",
            ObjectKind::StringData => "string",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for one heap-spray operation.
///
/// Everything the emission layer needs: what to allocate, how many, how to
/// fill it, and how the allocator will align it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprayConfig {
    /// Size of each sprayed allocation in bytes.
    pub target_size: u64,
    /// Number of allocations.
    pub count: u32,
    /// Kind of object to spray.
    pub kind: ObjectKind,
    /// Byte pattern to fill allocations with.
    pub fill_pattern: Option<String>,
    /// Slot alignment the allocator will apply.
    pub alignment: u64,
}

/// Seam for code-emission collaborators.
///
/// Implementors turn a [`SprayConfig`] into runtime script text. The core
/// never constructs or depends on the emitted text.
pub trait SprayEmitter {
    /// Emits spray code for a configuration.
    fn emit(&self, config: &SprayConfig) -> String;
}
