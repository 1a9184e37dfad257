//! Object registry and overwrite-chain construction.
//!
//! The registry holds metadata for known target object types, classifies
//! them by exploitation risk, and builds candidate overwrite chains: ordered
//! sets of objects whose combined size reaches a requested overwrite budget.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sizes commonly occupied by pointer-rich, security-relevant objects.
const DANGEROUS_SIZES: [u64; 7] = [0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];

/// Sizes typically holding inert data, safe to clobber.
const HARMLESS_SIZES: [u64; 4] = [0x10, 0x18, 0x28, 0x38];

/// Exploitation-risk classification of a target object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    /// Overwriting this object gives the attacker control.
    Dangerous,
    /// Overwriting this object has no useful effect.
    Harmless,
    /// Suitable for filling holes of its size class.
    SprayCandidate,
    /// Not yet classified.
    Unknown,
}

/// Metadata describing a known target object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Unique name; re-registration replaces by name.
    pub name: String,
    /// Object size in bytes.
    pub size: u64,
    /// Required alignment of the object.
    pub alignment: u64,
    /// Risk classification.
    pub class: ObjectClass,
    /// Names of fields whose corruption is useful, in layout order.
    pub dangerous_fields: Vec<String>,
    /// Offset of the vtable pointer, if the object carries one.
    pub vtable_offset: Option<u64>,
    /// Bytes of allocator/runtime metadata preceding attacker-relevant data.
    pub metadata_size: u64,
}

impl ObjectMetadata {
    /// Creates metadata with no dangerous fields or vtable.
    pub fn new(name: &str, size: u64, alignment: u64, class: ObjectClass) -> Self {
        Self {
            name: name.to_string(),
            size,
            alignment,
            class,
            dangerous_fields: vec![],
            vtable_offset: None,
            metadata_size: 0,
        }
    }

    /// Sets the dangerous field names.
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.dangerous_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Sets the vtable offset.
    pub fn with_vtable(mut self, offset: u64) -> Self {
        self.vtable_offset = Some(offset);
        self
    }

    /// Sets the metadata size.
    pub fn with_metadata_size(mut self, metadata_size: u64) -> Self {
        self.metadata_size = metadata_size;
        self
    }
}

/// Ordered set of objects whose combined size reaches an overwrite budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteChain {
    /// Object names in overwrite order; the first entry is the anchor.
    pub links: Vec<String>,
    /// Cumulative size of all links in bytes.
    pub total_size: u64,
}

/// Catalog of known target object types.
///
/// Registration order is observable: chain building and spray-candidate
/// queries walk the registry in the order objects were first registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectRegistry {
    objects: Vec<ObjectMetadata>,
    known_vtables: BTreeSet<u64>,
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-seeded with well-known script-engine objects.
    pub fn with_common_objects() -> Self {
        let mut registry = Self::new();
        registry.register(
            ObjectMetadata::new("ArrayBuffer", 0x20, 8, ObjectClass::Dangerous)
                .with_fields(&["data", "length"])
                .with_vtable(0x8),
        );
        registry.register(
            ObjectMetadata::new("JSFunction", 0x30, 8, ObjectClass::Dangerous)
                .with_fields(&["code", "scope"])
                .with_vtable(0x0),
        );
        registry.register(
            ObjectMetadata::new("TypedArray", 0x40, 8, ObjectClass::Dangerous)
                .with_fields(&["buffer", "length"])
                .with_vtable(0x8),
        );
        registry
    }

    /// Registers an object type, replacing any previous entry of the same
    /// name in place (the original registration position is kept).
    pub fn register(&mut self, metadata: ObjectMetadata) {
        match self.objects.iter_mut().find(|o| o.name == metadata.name) {
            Some(slot) => *slot = metadata,
            None => self.objects.push(metadata),
        }
    }

    /// Looks up an object type by name.
    pub fn get(&self, name: &str) -> Option<&ObjectMetadata> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Iterates over registered object types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectMetadata> {
        self.objects.iter()
    }

    /// Number of registered object types.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Classifies an object by size and vtable presence.
    ///
    /// Rule precedence is fixed and total: a vtable always makes the object
    /// dangerous; otherwise the size is checked against the dangerous and
    /// harmless size sets in that order; anything left is a spray candidate.
    pub fn classify(&self, size: u64, has_vtable: bool) -> ObjectClass {
        if has_vtable {
            return ObjectClass::Dangerous;
        }
        if DANGEROUS_SIZES.contains(&size) {
            return ObjectClass::Dangerous;
        }
        if HARMLESS_SIZES.contains(&size) {
            return ObjectClass::Harmless;
        }
        ObjectClass::SprayCandidate
    }

    /// Builds an overwrite chain anchored at a registered object.
    ///
    /// Starting from the anchor, repeatedly appends the first registered
    /// non-harmless object that still fits the remaining budget. Each object
    /// may appear in the chain at most once, which bounds the search by the
    /// registry size and keeps a repeatedly-fitting object from looping
    /// forever. Returns `None` if the anchor is unknown or harmless, or if
    /// the cumulative size never reaches `overwrite_size`.
    pub fn build_overwrite_chain(
        &self,
        anchor_name: &str,
        overwrite_size: u64,
    ) -> Option<OverwriteChain> {
        let anchor = self.get(anchor_name)?;
        if anchor.class == ObjectClass::Harmless {
            return None;
        }

        let mut links = vec![anchor.name.clone()];
        let mut total = anchor.size;
        while total < overwrite_size {
            let next = self.objects.iter().find(|o| {
                o.class != ObjectClass::Harmless
                    && !links.iter().any(|link| link == &o.name)
                    && total + o.size <= overwrite_size
            });
            match next {
                Some(object) => {
                    links.push(object.name.clone());
                    total += object.size;
                }
                None => break,
            }
        }

        if total < overwrite_size {
            debug!(
                "Chain from {} stalled at {} of {} bytes",
                anchor_name, total, overwrite_size
            );
            return None;
        }
        Some(OverwriteChain {
            links,
            total_size: total,
        })
    }

    /// Builds overwrite chains for every registered object that fits the
    /// target size, collecting the chains that close the budget.
    pub fn analyze_overwrite_chains(
        &self,
        target_size: u64,
        overwrite_size: u64,
    ) -> Vec<OverwriteChain> {
        self.objects
            .iter()
            .filter(|o| o.size <= target_size)
            .filter_map(|o| self.build_overwrite_chain(&o.name, overwrite_size))
            .collect()
    }

    /// Returns spray-candidate objects of exactly the target size, in
    /// registration order.
    pub fn spray_candidates(&self, target_size: u64) -> Vec<&ObjectMetadata> {
        self.objects
            .iter()
            .filter(|o| o.size == target_size && o.class == ObjectClass::SprayCandidate)
            .collect()
    }

    /// Records a known vtable address.
    pub fn register_vtable(&mut self, address: u64) {
        self.known_vtables.insert(address);
    }

    /// Whether an address is a known vtable.
    pub fn is_known_vtable(&self, address: u64) -> bool {
        self.known_vtables.contains(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_precedence() {
        let registry = ObjectRegistry::new();
        assert_eq!(registry.classify(0x20, false), ObjectClass::Dangerous);
        assert_eq!(registry.classify(0x10, false), ObjectClass::Harmless);
        assert_eq!(registry.classify(0x24, false), ObjectClass::SprayCandidate);
        assert_eq!(registry.classify(0x10, true), ObjectClass::Dangerous);
        assert_eq!(registry.classify(0x9999, true), ObjectClass::Dangerous);
    }

    #[test]
    fn register_replaces_in_place() {
        let mut registry = ObjectRegistry::new();
        registry.register(ObjectMetadata::new("A", 0x20, 8, ObjectClass::Dangerous));
        registry.register(ObjectMetadata::new("B", 0x30, 8, ObjectClass::Dangerous));
        registry.register(ObjectMetadata::new("A", 0x40, 16, ObjectClass::Unknown));

        let names: Vec<&str> = registry.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(registry.get("A").unwrap().size, 0x40);
        assert_eq!(registry.get("A").unwrap().class, ObjectClass::Unknown);
    }

    #[test]
    fn chain_fails_for_harmless_anchor() {
        let mut registry = ObjectRegistry::new();
        registry.register(ObjectMetadata::new("pad", 0x10, 8, ObjectClass::Harmless));
        assert!(registry.build_overwrite_chain("pad", 0x40).is_none());
    }

    #[test]
    fn chain_fails_for_unknown_anchor() {
        let registry = ObjectRegistry::new();
        assert!(registry.build_overwrite_chain("ghost", 0x40).is_none());
    }

    #[test]
    fn chain_terminates_when_budget_is_unreachable() {
        // Lone 0x20 anchor can never close a 0x40 budget: each object may
        // appear only once, so the search must give up rather than loop.
        let mut registry = ObjectRegistry::new();
        registry.register(
            ObjectMetadata::new("ArrayBuffer", 0x20, 8, ObjectClass::Dangerous)
                .with_fields(&["data"]),
        );
        assert!(registry.build_overwrite_chain("ArrayBuffer", 0x40).is_none());
    }

    #[test]
    fn chain_reaches_budget_over_multiple_links() {
        let mut registry = ObjectRegistry::new();
        registry.register(ObjectMetadata::new("A", 0x20, 8, ObjectClass::Dangerous));
        registry.register(ObjectMetadata::new("pad", 0x18, 8, ObjectClass::Harmless));
        registry.register(ObjectMetadata::new("B", 0x20, 8, ObjectClass::SprayCandidate));
        let chain = registry.build_overwrite_chain("A", 0x40).unwrap();
        assert_eq!(chain.links, vec!["A", "B"]);
        assert_eq!(chain.total_size, 0x40);
    }

    #[test]
    fn chain_skips_harmless_links() {
        let mut registry = ObjectRegistry::new();
        registry.register(ObjectMetadata::new("A", 0x20, 8, ObjectClass::Dangerous));
        registry.register(ObjectMetadata::new("pad", 0x20, 8, ObjectClass::Harmless));
        registry.register(ObjectMetadata::new("B", 0x20, 8, ObjectClass::Dangerous));
        let chain = registry.build_overwrite_chain("A", 0x40).unwrap();
        assert!(!chain.links.contains(&"pad".to_string()));
    }

    #[test]
    fn spray_candidates_match_size_and_class() {
        let mut registry = ObjectRegistry::new();
        registry.register(ObjectMetadata::new("a", 0x24, 8, ObjectClass::SprayCandidate));
        registry.register(ObjectMetadata::new("b", 0x24, 8, ObjectClass::Dangerous));
        registry.register(ObjectMetadata::new("c", 0x24, 8, ObjectClass::SprayCandidate));
        registry.register(ObjectMetadata::new("d", 0x28, 8, ObjectClass::SprayCandidate));

        let names: Vec<&str> = registry
            .spray_candidates(0x24)
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn known_vtables() {
        let mut registry = ObjectRegistry::new();
        registry.register_vtable(0x7fff_0000);
        assert!(registry.is_known_vtable(0x7fff_0000));
        assert!(!registry.is_known_vtable(0x7fff_0008));
    }
}
