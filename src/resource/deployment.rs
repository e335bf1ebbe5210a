use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use crate::resource::filter::label_selector;
use crate::resource::{extract_version, ExcludeSet, Finder, FinderError, ResourceQuery};
use crate::types::{Resource, ResourceKind, UNVERSIONED};

const LIST_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadPage {
    pub items: Vec<Workload>,
    pub continue_token: Option<String>,
}

/// The calls [`DeploymentFinder`] needs from the Kubernetes API server.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// `Ok(None)` when the deployment does not exist.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Workload>>;

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
        token: Option<&str>,
    ) -> Result<WorkloadPage>;
}

pub struct DeploymentFinder<A> {
    api: A,
}

impl<A: WorkloadApi> DeploymentFinder<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn list_all(&self, namespace: &str, selector: &str) -> Result<Vec<Workload>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .api
                .list_deployments(namespace, selector, token.as_deref())
                .await?;
            out.extend(page.items);
            match page.continue_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<A: WorkloadApi> Finder for DeploymentFinder<A> {
    async fn find_by_name(
        &self,
        query: &ResourceQuery,
        names: &[String],
    ) -> Result<Vec<Resource>, FinderError> {
        let mut out = Vec::new();
        for name in names {
            let workload = self
                .api
                .get_deployment(&query.namespace, name)
                .await
                .map_err(|source| FinderError::Lookup {
                    kind: ResourceKind::Deployment,
                    name: name.clone(),
                    source,
                })?;
            let Some(workload) = workload else {
                debug!("deployment {name} not found, skipping");
                continue;
            };
            out.push(Resource::new(ResourceKind::Deployment, name).with_version(workload_version(&workload)));
        }
        Ok(out)
    }

    async fn find_by_filter(
        &self,
        query: &ResourceQuery,
        excluded: &ExcludeSet,
    ) -> Result<Vec<Resource>, FinderError> {
        let selector = label_selector(&query.tags);
        debug!("listing deployments with selector `{selector}`");
        let workloads = self
            .list_all(&query.namespace, &selector)
            .await
            .map_err(|source| FinderError::Enumerate {
                kind: ResourceKind::Deployment,
                source,
            })?;

        Ok(workloads
            .iter()
            .filter(|w| {
                let skip = excluded.is_excluded(&w.name);
                if skip {
                    debug!("deployment {} excluded", w.name);
                }
                !skip
            })
            .map(|w| Resource::new(ResourceKind::Deployment, &w.name).with_version(workload_version(w)))
            .collect())
    }
}

/// Version of the container named after the workload, else of its first container.
fn workload_version(workload: &Workload) -> String {
    workload
        .containers
        .iter()
        .find(|c| c.name == workload.name)
        .or_else(|| workload.containers.first())
        .and_then(|c| c.image.as_deref())
        .map(extract_version)
        .unwrap_or_else(|| UNVERSIONED.to_string())
}

fn workload_from(deployment: &Deployment) -> Workload {
    let containers = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| {
            pod.containers
                .iter()
                .map(|c| Container {
                    name: c.name.clone(),
                    image: c.image.clone(),
                })
                .collect()
        })
        .unwrap_or_default();
    Workload {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        containers,
    }
}

/// [`WorkloadApi`] backed by a kube client.
pub struct KubeWorkloadApi {
    client: Client,
}

impl KubeWorkloadApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        if namespace.is_empty() {
            Api::default_namespaced(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl WorkloadApi for KubeWorkloadApi {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Workload>> {
        let found = self
            .deployments(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("get deployment {name}"))?;
        Ok(found.as_ref().map(workload_from))
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
        token: Option<&str>,
    ) -> Result<WorkloadPage> {
        let mut params = ListParams::default().labels(selector).limit(LIST_PAGE_SIZE);
        if let Some(token) = token {
            params = params.continue_token(token);
        }
        let list = self
            .deployments(namespace)
            .list(&params)
            .await
            .with_context(|| format!("list deployments matching `{selector}`"))?;
        Ok(WorkloadPage {
            items: list.items.iter().map(workload_from).collect(),
            continue_token: list.metadata.continue_,
        })
    }
}
