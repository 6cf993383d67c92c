//! Relation extraction: the links one object declares, read structurally from its payload.

#![forbid(unsafe_code)]

use serde_json::Value;
use smallvec::SmallVec;
use strata_core::{Flavor, ObjectRef};

/// `metadata.ownerReferences` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerLink {
    pub uid: Option<String>,
    pub owner: ObjectRef,
    pub controller: bool,
}

/// Links declared by one object.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    /// Objects that own this one (edges point owner -> this).
    pub owners: SmallVec<[OwnerLink; 2]>,
    /// Objects this one references (edges point this -> target).
    pub references: Vec<ObjectRef>,
    /// Relation fields that were present but unusable.
    pub skipped: Vec<String>,
}

const SINGLE_REF: &str = "resourceRef";
const PLURAL_REF: &str = "resourceRefs";
const COMPOSITION_MARKERS: [&str; 4] = ["compositionRef", "compositionSelector", "composedTemplate", "composition"];

/// Places where composite fields live: `spec` and `spec.crossplane`.
fn spec_scopes(raw: &Value) -> impl Iterator<Item = &Value> {
    let spec = raw.get("spec");
    let xp = spec.and_then(|s| s.get("crossplane"));
    spec.into_iter().chain(xp)
}

/// Extract ownership and reference links. Never fails; bad entries land in `skipped`.
pub fn extract(raw: &Value) -> Relations {
    let mut rel = Relations::default();

    match raw.get("metadata").and_then(|m| m.get("ownerReferences")) {
        None | Some(Value::Null) => {}
        Some(Value::Array(owners)) => {
            for (i, o) in owners.iter().enumerate() {
                match ObjectRef::from_value(o) {
                    Some(owner) => rel.owners.push(OwnerLink {
                        uid: o.get("uid").and_then(|x| x.as_str()).filter(|s| !s.is_empty()).map(|s| s.to_string()),
                        owner,
                        controller: o.get("controller").and_then(|x| x.as_bool()).unwrap_or(false),
                    }),
                    None => rel.skipped.push(format!("metadata.ownerReferences[{}] lacks kind or name", i)),
                }
            }
        }
        Some(_) => rel.skipped.push("metadata.ownerReferences is not a list".into()),
    }

    for scope in spec_scopes(raw) {
        match scope.get(SINGLE_REF) {
            None | Some(Value::Null) => {}
            Some(v) => match ObjectRef::from_value(v) {
                Some(r) => rel.references.push(r),
                None => rel.skipped.push(format!("{} lacks kind or name", SINGLE_REF)),
            },
        }
        match scope.get(PLURAL_REF) {
            None | Some(Value::Null) => {}
            Some(Value::Array(refs)) => {
                for (i, v) in refs.iter().enumerate() {
                    match ObjectRef::from_value(v) {
                        Some(r) => rel.references.push(r),
                        None => rel.skipped.push(format!("{}[{}] lacks kind or name", PLURAL_REF, i)),
                    }
                }
            }
            Some(_) => rel.skipped.push(format!("{} is not a list", PLURAL_REF)),
        }
    }
    rel
}

/// Non-empty plural reference array, if any.
pub fn reference_array(raw: &Value) -> Option<&Vec<Value>> {
    spec_scopes(raw)
        .filter_map(|s| s.get(PLURAL_REF).and_then(|r| r.as_array()))
        .find(|a| !a.is_empty())
}

pub fn has_composition_marker(raw: &Value) -> bool {
    spec_scopes(raw).any(|s| COMPOSITION_MARKERS.iter().any(|k| matches!(s.get(*k), Some(v) if !v.is_null())))
}

/// Structural composition markers: a non-empty reference array or a composition field.
pub fn is_composite(raw: &Value) -> bool {
    reference_array(raw).is_some() || has_composition_marker(raw)
}

pub fn flavor(raw: &Value) -> Flavor {
    if reference_array(raw).is_some() {
        Flavor::Composite
    } else if raw.get("spec").and_then(|s| s.get("forProvider")).is_some() {
        Flavor::Managed
    } else {
        Flavor::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owners_and_plural_refs() {
        let raw = json!({
            "kind": "XNetwork",
            "metadata": {
                "name": "net",
                "ownerReferences": [
                    { "apiVersion": "example.org/v1", "kind": "Network", "name": "claim", "uid": "u-claim", "controller": true },
                    { "apiVersion": "v1", "name": "broken" }
                ]
            },
            "spec": {
                "crossplane": { "resourceRefs": [
                    { "apiVersion": "ec2.aws.upbound.io/v1beta1", "kind": "VPC", "name": "vpc-1" },
                    { "apiVersion": "ec2.aws.upbound.io/v1beta1", "kind": "Subnet", "name": "subnet-1", "namespace": "ns" }
                ]}
            }
        });
        let rel = extract(&raw);
        assert_eq!(rel.owners.len(), 1);
        assert_eq!(rel.owners[0].uid.as_deref(), Some("u-claim"));
        assert!(rel.owners[0].controller);
        assert_eq!(rel.references.len(), 2);
        assert_eq!(rel.references[1].namespace.as_deref(), Some("ns"));
        assert_eq!(rel.skipped.len(), 1);
        assert!(is_composite(&raw));
        assert_eq!(flavor(&raw), Flavor::Composite);
    }

    #[test]
    fn single_ref_on_claim() {
        let raw = json!({
            "kind": "Network",
            "metadata": { "name": "claim" },
            "spec": { "resourceRef": { "apiVersion": "example.org/v1", "kind": "XNetwork", "name": "net" } }
        });
        let rel = extract(&raw);
        assert_eq!(rel.references.len(), 1);
        assert_eq!(rel.references[0].kind, "XNetwork");
        // a single ref alone is not a composition marker
        assert!(!is_composite(&raw));
    }

    #[test]
    fn malformed_fields_are_skipped_not_fatal() {
        let raw = json!({
            "kind": "X",
            "metadata": { "name": "x", "ownerReferences": "oops" },
            "spec": { "resourceRefs": { "kind": "Y" }, "resourceRef": { "kind": "Y" } }
        });
        let rel = extract(&raw);
        assert!(rel.owners.is_empty());
        assert!(rel.references.is_empty());
        assert_eq!(rel.skipped.len(), 3);
    }

    #[test]
    fn composition_markers_and_flavors() {
        assert!(is_composite(&json!({ "spec": { "compositionSelector": { "matchLabels": {} } } })));
        assert!(is_composite(&json!({ "spec": { "crossplane": { "compositionRef": { "name": "c" } } } })));
        assert!(!is_composite(&json!({ "spec": { "resourceRefs": [] } })));
        assert_eq!(flavor(&json!({ "spec": { "forProvider": {} } })), Flavor::Managed);
        assert_eq!(flavor(&json!({ "data": {} })), Flavor::Plain);
    }
}
