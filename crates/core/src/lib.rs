//! Strata core types shared by the graph engine, the fetch cache and frontends.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod status;

pub use error::GraphError;
pub use status::{Condition, ConditionStatus, Conditions};

pub mod prelude {
    pub use super::{
        Category, Edge, EdgeId, EdgeKind, Flavor, GraphError, Node, NodeId, ObjectRef, Resource,
    };
    pub use super::status::{Condition, ConditionStatus, Conditions};
}

/// Annotation carrying the client-side apply payload; noisy and never useful for display.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Split an `apiVersion` into `(group, version)`. The legacy core group is empty.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    }
}

/// Group name as shown to users: the legacy core group renders as `core`.
pub fn display_group(api_version: &str) -> &str {
    match split_api_version(api_version).0 {
        "" => "core",
        g => g,
    }
}

/// Reference to an object by kind/apiVersion/name[/namespace].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Parse a reference entry (`{apiVersion, kind, name, namespace?}`) as found in
    /// `resourceRef`/`resourceRefs`. Returns `None` when kind or name is missing.
    pub fn from_value(v: &serde_json::Value) -> Option<Self> {
        let kind = v.get("kind").and_then(|x| x.as_str()).filter(|s| !s.is_empty())?;
        let name = v.get("name").and_then(|x| x.as_str()).filter(|s| !s.is_empty())?;
        let api_version = v.get("apiVersion").and_then(|x| x.as_str()).unwrap_or("");
        let namespace = v
            .get("namespace")
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        Some(Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace,
        })
    }

    pub fn group(&self) -> &str { split_api_version(&self.api_version).0 }
    pub fn version(&self) -> &str { split_api_version(&self.api_version).1 }

    /// `group/version/Kind`, or `version/Kind` for the core group.
    pub fn gvk_key(&self) -> String {
        if self.group().is_empty() {
            format!("{}/{}", self.version(), self.kind)
        } else {
            format!("{}/{}/{}", self.group(), self.version(), self.kind)
        }
    }

    /// Same reference with `namespace` filled in when it was absent.
    pub fn in_namespace(mut self, namespace: Option<&str>) -> Self {
        if self.namespace.is_none() {
            self.namespace = namespace.map(|s| s.to_string());
        }
        self
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.gvk_key(), ns, self.name),
            None => write!(f, "{} {}", self.gvk_key(), self.name),
        }
    }
}

/// Stable node identity within a render session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    /// Deterministic composite used when the server did not assign a uid.
    pub fn composite(kind: &str, group: &str, namespace: Option<&str>, name: &str) -> Self {
        Self(format!("{}/{}/{}/{}", kind, group, namespace.unwrap_or(""), name))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self { Self(s) }
}

/// One fetched object: identity and header fields plus the opaque raw payload.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: NodeId,
    pub uid: Option<String>,
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub raw: Arc<serde_json::Value>,
}

impl Resource {
    /// Shape a raw object. Kind and name are required; everything else is optional.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, GraphError> {
        let meta = raw.get("metadata");
        let kind = raw
            .get("kind")
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GraphError::MalformedObject("missing kind".into()))?
            .to_string();
        let name = meta
            .and_then(|m| m.get("name"))
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GraphError::MalformedObject(format!("{} without metadata.name", kind)))?
            .to_string();
        let api_version = raw.get("apiVersion").and_then(|x| x.as_str()).unwrap_or("").to_string();
        let namespace = meta
            .and_then(|m| m.get("namespace"))
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let uid = meta
            .and_then(|m| m.get("uid"))
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let id = match &uid {
            Some(u) => NodeId::new(u.clone()),
            None => NodeId::composite(&kind, split_api_version(&api_version).0, namespace.as_deref(), &name),
        };
        Ok(Self { id, uid, api_version, kind, name, namespace, raw: Arc::new(raw) })
    }

    pub fn group(&self) -> &str { split_api_version(&self.api_version).0 }

    /// Reference addressing this object.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    /// True when `r` names this object. Group and namespace only constrain the match
    /// when the reference carries them.
    pub fn matches_ref(&self, r: &ObjectRef) -> bool {
        if !self.kind.eq_ignore_ascii_case(&r.kind) || self.name != r.name {
            return false;
        }
        if !r.api_version.is_empty() && self.group() != r.group() {
            return false;
        }
        match (&r.namespace, &self.namespace) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        }
    }

    pub fn created_at(&self) -> Option<&str> {
        self.raw
            .get("metadata")
            .and_then(|m| m.get("creationTimestamp"))
            .and_then(|x| x.as_str())
    }

    /// Creation time in unix seconds, when present and valid RFC 3339.
    pub fn creation_ts(&self) -> Option<i64> {
        self.created_at()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp())
    }

    /// Copy of the payload without `managedFields` and the last-applied annotation.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut v = (*self.raw).clone();
        strip_noise(&mut v);
        v
    }
}

/// Remove `metadata.managedFields` and the last-applied annotation in place.
pub fn strip_noise(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
        if let Some(annos) = meta.get_mut("annotations").and_then(|a| a.as_object_mut()) {
            annos.remove(LAST_APPLIED_ANNOTATION);
        }
    }
}

/// Structural role of a node in the hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Root,
    Intermediate,
    Leaf,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Root => "Root",
            Category::Intermediate => "Intermediate",
            Category::Leaf => "Leaf",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// What kind of object a node is, independent of where it sits in the tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Declares resource refs (a composite).
    Composite,
    /// Carries `spec.forProvider` (a managed resource).
    Managed,
    /// Anything else.
    Plain,
}

/// Projection of one resource inside a built graph.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: String,
    pub api_version: String,
    pub group: String,
    pub name: String,
    pub namespace: Option<String>,
    pub created_at: Option<String>,
    /// Unix seconds parsed from `created_at`.
    pub creation_ts: Option<i64>,
    pub conditions: Conditions,
    pub category: Category,
    pub flavor: Flavor,
    pub depth: u32,
    pub parent_id: Option<NodeId>,
    #[serde(skip)]
    pub raw: Arc<serde_json::Value>,
}

impl Node {
    pub fn synced(&self) -> bool { self.conditions.is_true("Synced") }
    pub fn ready(&self) -> bool { self.conditions.is_true("Ready") }
}

/// Deterministic edge identity derived from its endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn between(source: &NodeId, target: &NodeId) -> Self {
        Self(format!("{}->{}", source, target))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Ownership,
    Reference,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self { id: EdgeId::between(&source, &target), source, target, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_split() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(split_api_version("ec2.aws.upbound.io/v1beta1"), ("ec2.aws.upbound.io", "v1beta1"));
        assert_eq!(display_group("v1"), "core");
        assert_eq!(display_group("apps/v1"), "apps");
    }

    #[test]
    fn id_falls_back_to_composite() {
        let r = Resource::from_value(serde_json::json!({
            "apiVersion": "example.org/v1",
            "kind": "Bucket",
            "metadata": { "name": "b1", "namespace": "team-a" }
        }))
        .unwrap();
        assert_eq!(r.id.as_str(), "Bucket/example.org/team-a/b1");
        // Same input, same id
        let again = Resource::from_value((*r.raw).clone()).unwrap();
        assert_eq!(r.id, again.id);
    }

    #[test]
    fn uid_wins_over_composite() {
        let r = Resource::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm", "uid": "1234" }
        }))
        .unwrap();
        assert_eq!(r.id.as_str(), "1234");
    }

    #[test]
    fn malformed_objects_are_rejected() {
        let err = Resource::from_value(serde_json::json!({ "metadata": { "name": "x" } })).unwrap_err();
        assert!(matches!(err, GraphError::MalformedObject(_)));
        let err = Resource::from_value(serde_json::json!({ "kind": "Pod", "metadata": {} })).unwrap_err();
        assert!(matches!(err, GraphError::MalformedObject(_)));
    }

    #[test]
    fn ref_matching_respects_optional_fields() {
        let r = Resource::from_value(serde_json::json!({
            "apiVersion": "s3.aws.upbound.io/v1beta1",
            "kind": "Bucket",
            "metadata": { "name": "logs", "namespace": "prod" }
        }))
        .unwrap();
        let mut q = ObjectRef { api_version: String::new(), kind: "bucket".into(), name: "logs".into(), namespace: None };
        assert!(r.matches_ref(&q));
        q.api_version = "s3.aws.upbound.io/v1".into();
        assert!(r.matches_ref(&q), "version is not part of identity");
        q.api_version = "other.io/v1".into();
        assert!(!r.matches_ref(&q));
        q.api_version.clear();
        q.namespace = Some("dev".into());
        assert!(!r.matches_ref(&q));
    }

    #[test]
    fn sanitize_strips_noise() {
        let r = Resource::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cm",
                "managedFields": [{}],
                "annotations": { LAST_APPLIED_ANNOTATION: "{}", "keep": "me" }
            }
        }))
        .unwrap();
        let clean = r.sanitized();
        assert!(clean["metadata"].get("managedFields").is_none());
        assert!(clean["metadata"]["annotations"].get(LAST_APPLIED_ANNOTATION).is_none());
        assert_eq!(clean["metadata"]["annotations"]["keep"], "me");
        // raw payload untouched
        assert!(r.raw["metadata"].get("managedFields").is_some());
    }
}
