//! Strata kubehub: kube-rs backed object access.
//!
//! Resolves `apiVersion`/`kind` through API discovery (run once per accessor) and
//! reads single objects as `DynamicObject`s.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use kube::{
    api::Api,
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use metrics::{counter, histogram};
use serde_json::Value;
use strata_core::{split_api_version, strip_noise, ObjectRef};
use strata_store::{AccessError, ChildAccessor};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// One served resource kind, any version.
#[derive(Debug, Clone)]
struct Served {
    ar: ApiResource,
    namespaced: bool,
}

/// Parse `v1/Kind` or `group/v1/Kind`.
pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind { group: String::new(), version: version.to_string(), kind: kind.to_string() }),
        [group, version, kind] => Ok(GroupVersionKind { group: (*group).to_string(), version: (*version).to_string(), kind: (*kind).to_string() }),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

pub struct KubeAccessor {
    client: Client,
    served: OnceCell<Vec<Served>>,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self { Self { client, served: OnceCell::new() } }

    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self::new(client))
    }

    async fn served(&self) -> Result<&[Served]> {
        let list = self
            .served
            .get_or_try_init(|| async {
                let t0 = Instant::now();
                let discovery = Discovery::new(self.client.clone()).run().await.context("running api discovery")?;
                let mut out = Vec::new();
                for group in discovery.groups() {
                    for ver in group.versions() {
                        for (ar, caps) in group.versioned_resources(ver) {
                            out.push(Served { ar, namespaced: matches!(caps.scope, Scope::Namespaced) });
                        }
                    }
                }
                info!(kinds = out.len(), took_ms = %t0.elapsed().as_millis(), "kubehub: discovery done");
                Ok::<_, anyhow::Error>(out)
            })
            .await?;
        Ok(list.as_slice())
    }

    /// Served resource for group/kind; an empty version accepts the first served one.
    async fn find_api_resource(&self, group: &str, version: &str, kind: &str) -> Result<(ApiResource, bool)> {
        self.served()
            .await?
            .iter()
            .find(|s| s.ar.group == group && s.ar.kind == kind && (version.is_empty() || s.ar.version == version))
            .map(|s| (s.ar.clone(), s.namespaced))
            .ok_or_else(|| anyhow!("GVK not found: {}/{}/{}", group, version, kind))
    }

    fn api_for(&self, ar: &ApiResource, namespaced: bool, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        if !namespaced {
            return Ok(Api::all_with(self.client.clone(), ar));
        }
        match namespace {
            Some(ns) => Ok(Api::namespaced_with(self.client.clone(), ns, ar)),
            None => Err(anyhow!("namespace required for namespaced kind {}", ar.kind)),
        }
    }

    /// Read one object, noise stripped. `Ok(None)` when the server has no such object.
    pub async fn get(&self, target: &ObjectRef) -> Result<Option<Value>> {
        let t0 = Instant::now();
        let (group, version) = split_api_version(&target.api_version);
        let (ar, namespaced) = self.find_api_resource(group, version, &target.kind).await?;
        let api = self.api_for(&ar, namespaced, target.namespace.as_deref())?;
        let obj = api.get_opt(&target.name).await.with_context(|| format!("getting {}", target))?;
        counter!("kube_get_total", 1u64);
        histogram!("kube_get_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match obj {
            Some(o) => {
                let mut raw = serde_json::to_value(&o).context("serializing DynamicObject")?;
                strip_noise(&mut raw);
                debug!(%target, took_ms = %t0.elapsed().as_millis(), "kubehub: got object");
                Ok(Some(raw))
            }
            None => Ok(None),
        }
    }

    /// Read the anchor object addressed by a gvk key (`group/v1/Kind` or `v1/Kind`).
    pub async fn fetch_object(&self, gvk_key: &str, namespace: Option<&str>, name: &str) -> Result<Value> {
        let gvk = parse_gvk_key(gvk_key)?;
        let api_version = if gvk.group.is_empty() { gvk.version.clone() } else { format!("{}/{}", gvk.group, gvk.version) };
        let target = ObjectRef {
            api_version,
            kind: gvk.kind,
            name: name.to_string(),
            namespace: namespace.map(|s| s.to_string()),
        };
        self.get(&target).await?.ok_or_else(|| anyhow!("not found: {}", target))
    }
}

fn access_error(e: anyhow::Error) -> AccessError {
    match e.downcast_ref::<kube::Error>() {
        Some(kube::Error::Api(ae)) if ae.code == 403 => AccessError::Forbidden(ae.message.clone()),
        _ if e.to_string().starts_with("namespace required") => AccessError::Validation(e.to_string()),
        _ => AccessError::Internal(format!("{:#}", e)),
    }
}

#[async_trait::async_trait]
impl ChildAccessor for KubeAccessor {
    async fn resolve(&self, target: &ObjectRef) -> Result<Option<Value>, AccessError> {
        self.get(target).await.map_err(access_error)
    }
}
