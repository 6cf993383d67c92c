//! Where the initial objects come from: a cluster anchor or a local file.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::Value;
use strata_graph::AnchorHint;
use strata_store::{ExpandAllReport, MemoryAccessor, Session};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// GVK key of the anchor, e.g. "example.org/v1alpha1/Network" or "v1/ConfigMap"
    pub gvk: Option<String>,
    /// Anchor object name
    pub name: Option<String>,
    /// Read objects from a JSON or YAML file instead of the cluster
    #[arg(long = "file", short = 'f')]
    pub file: Option<PathBuf>,
    /// Anchor inside the file as Kind/name (default: every object is a seed)
    #[arg(long = "anchor")]
    pub anchor: Option<String>,
}

/// Parse a file's content: a JSON array, a `List` object with `items`, a single
/// object, or YAML with one object per document.
pub fn parse_objects(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();
    let docs: Vec<Value> = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        vec![serde_json::from_str(text).context("parsing JSON")?]
    } else {
        let mut out = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(text) {
            let v = Value::deserialize(doc).context("parsing YAML document")?;
            if !v.is_null() {
                out.push(v);
            }
        }
        out
    };
    let mut objects = Vec::new();
    for d in docs {
        match d {
            Value::Array(items) => objects.extend(items),
            Value::Object(mut m) if m.get("items").map(|i| i.is_array()).unwrap_or(false) => {
                if let Some(Value::Array(items)) = m.remove("items") {
                    objects.extend(items);
                }
            }
            other => objects.push(other),
        }
    }
    Ok(objects)
}

pub fn load_file(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_objects(&text)
}

fn split_anchor(s: &str) -> Result<(&str, &str)> {
    s.split_once('/').filter(|(k, n)| !k.is_empty() && !n.is_empty()).ok_or_else(|| anyhow!("anchor must be Kind/name, got {}", s))
}

/// Build a session from the source, seed it, and run the expand-all sweep.
pub async fn open(src: &SourceArgs, namespace: Option<&str>) -> Result<(Session, ExpandAllReport)> {
    let session = match (&src.file, &src.gvk, &src.name) {
        (Some(path), _, _) => {
            let objects = load_file(path)?;
            info!(path = %path.display(), objects = objects.len(), "source: file loaded");
            let accessor = Arc::new(MemoryAccessor::new().with_objects(objects.clone()));
            match &src.anchor {
                Some(a) => {
                    let (kind, name) = split_anchor(a)?;
                    let hint = AnchorHint::new(kind, name);
                    let seed: Vec<Value> = objects
                        .into_iter()
                        .filter(|o| {
                            strata_core::Resource::from_value(o.clone()).map(|r| hint.matches(&r)).unwrap_or(false)
                        })
                        .take(1)
                        .collect();
                    if seed.is_empty() {
                        return Err(anyhow!("anchor {} not found in {}", a, path.display()));
                    }
                    let mut s = Session::new(accessor, Some(hint));
                    s.seed(seed);
                    s
                }
                None => {
                    let mut s = Session::new(accessor, None);
                    s.seed(objects);
                    s
                }
            }
        }
        (None, Some(gvk), Some(name)) => {
            let kube = Arc::new(strata_kubehub::KubeAccessor::try_default().await?);
            let anchor = kube.fetch_object(gvk, namespace, name).await?;
            let key = strata_kubehub::parse_gvk_key(gvk)?;
            let mut hint = AnchorHint::new(key.kind, name.clone());
            if !key.group.is_empty() {
                hint = hint.with_group(key.group);
            }
            let mut s = Session::new(kube, Some(hint));
            s.seed(vec![anchor]);
            s
        }
        _ => return Err(anyhow!("either --file or <GVK> <NAME> is required")),
    };
    let report = session.expand_all().await?;
    Ok((session, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_and_list() {
        let arr = parse_objects(r#"[{"kind":"A","metadata":{"name":"a"}},{"kind":"B","metadata":{"name":"b"}}]"#).unwrap();
        assert_eq!(arr.len(), 2);
        let list = parse_objects(r#"{"kind":"List","items":[{"kind":"A","metadata":{"name":"a"}}]}"#).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["kind"], "A");
        let single = parse_objects(r#"{"kind":"A","metadata":{"name":"a"}}"#).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn parses_multi_doc_yaml() {
        let text = "kind: A\nmetadata:\n  name: a\n---\nkind: B\nmetadata:\n  name: b\n";
        let docs = parse_objects(text).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["metadata"]["name"], "b");
    }

    #[test]
    fn anchor_syntax() {
        assert_eq!(split_anchor("Network/net").unwrap(), ("Network", "net"));
        assert!(split_anchor("Network").is_err());
        assert!(split_anchor("/net").is_err());
    }
}
