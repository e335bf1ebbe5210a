//! Environment sessions: credentials scoped to one environment, able to build
//! the finders that run against it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_eks::types::Cluster;
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::Environment;
use crate::resource::deployment::{DeploymentFinder, KubeWorkloadApi};
use crate::resource::lambda::{AwsFunctionApi, LambdaFinder};
use crate::resource::{Finder, FinderError};
use crate::types::ResourceKind;

pub const DEFAULT_REGION: &str = "us-east-1";

const SESSION_NAME: &str = "drifter";
const KUBE_USER: &str = "drifter";
const KUBE_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Acquires per-environment credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn assume(&self, env: &Environment) -> Result<Arc<dyn Session>>;
}

/// Credentials scoped to a single environment.
#[async_trait]
pub trait Session: Send + Sync {
    async fn finder(&self, kind: ResourceKind) -> Result<Box<dyn Finder>, FinderError>;
}

/// Assumes each environment's IAM role on top of the ambient AWS credentials.
pub struct AwsConnector {
    base: SdkConfig,
    default_region: String,
}

impl AwsConnector {
    pub async fn load(default_region: &str) -> Self {
        let region = RegionProviderChain::default_provider()
            .or_else(Region::new(default_region.to_string()));
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self {
            base,
            default_region: default_region.to_string(),
        }
    }
}

#[async_trait]
impl Connector for AwsConnector {
    #[instrument(skip_all, fields(env = %env.name))]
    async fn assume(&self, env: &Environment) -> Result<Arc<dyn Session>> {
        if env.role.trim().is_empty() {
            return Err(anyhow!("environment {} has no role to assume", env.name));
        }
        let region = Region::new(env.region_or(&self.default_region).to_string());
        debug!("assuming role {} in {}", env.role, region);

        let provider = AssumeRoleProvider::builder(env.role.clone())
            .session_name(SESSION_NAME)
            .region(region.clone())
            .configure(&self.base)
            .build()
            .await;
        resolve_credentials(&provider, &env.role).await?;
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(provider)
            .load()
            .await;

        Ok(Arc::new(AwsSession {
            env: env.clone(),
            config,
        }))
    }
}

pub struct AwsSession {
    env: Environment,
    config: SdkConfig,
}

#[async_trait]
impl Session for AwsSession {
    async fn finder(&self, kind: ResourceKind) -> Result<Box<dyn Finder>, FinderError> {
        match kind {
            ResourceKind::Lambda => Ok(Box::new(LambdaFinder::new(AwsFunctionApi::new(
                &self.config,
            )))),
            ResourceKind::Deployment => {
                let client = cluster_client(&self.config, &self.env)
                    .await
                    .map_err(|source| FinderError::Client { kind, source })?;
                Ok(Box::new(DeploymentFinder::new(KubeWorkloadApi::new(client))))
            }
        }
    }
}

/// Forces one STS round-trip so a denied role fails here rather than on the
/// first provider call.
async fn resolve_credentials(provider: &impl ProvideCredentials, role: &str) -> Result<()> {
    provider
        .provide_credentials()
        .await
        .with_context(|| format!("AssumeRole {role}"))?;
    Ok(())
}

/// Builds a kube client for the environment's EKS cluster.
///
/// The endpoint and CA come from `DescribeCluster`; authentication goes through
/// the `aws eks get-token` exec plugin under the environment's role.
#[instrument(skip_all, fields(cluster = %env.cluster_name))]
async fn cluster_client(config: &SdkConfig, env: &Environment) -> Result<kube::Client> {
    let eks = aws_sdk_eks::Client::new(config);
    let described = eks
        .describe_cluster()
        .name(&env.cluster_name)
        .send()
        .await
        .with_context(|| format!("DescribeCluster {}", env.cluster_name))?;
    let cluster = described
        .cluster()
        .ok_or_else(|| anyhow!("cluster {} not returned by EKS", env.cluster_name))?;
    let (endpoint, ca) = cluster_endpoint(cluster, &env.cluster_name)?;
    debug!("connecting to {endpoint}");

    let region = config
        .region()
        .map(|r| r.to_string())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let kubeconfig = Kubeconfig::from_yaml(&eks_kubeconfig(env, endpoint, ca, &region)?)
        .context("failed building kubeconfig")?;
    let mut kube_config =
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("failed loading kubeconfig")?;
    kube_config.read_timeout = Some(KUBE_API_TIMEOUT);
    Ok(kube::Client::try_from(kube_config)?)
}

/// The API server endpoint and base64 CA bundle of a described cluster.
fn cluster_endpoint<'a>(cluster: &'a Cluster, name: &str) -> Result<(&'a str, &'a str)> {
    let endpoint = cluster
        .endpoint()
        .ok_or_else(|| anyhow!("cluster {name} has no endpoint"))?;
    let ca = cluster
        .certificate_authority()
        .and_then(|ca| ca.data())
        .filter(|data| !data.is_empty())
        .ok_or_else(|| anyhow!("cluster {name} has no certificate authority"))?;
    Ok((endpoint, ca))
}

fn eks_kubeconfig(env: &Environment, endpoint: &str, ca: &str, region: &str) -> Result<String> {
    let cluster = json!({ "server": endpoint, "certificate-authority-data": ca });
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": env.cluster_name, "cluster": cluster }],
        "users": [{
            "name": KUBE_USER,
            "user": {
                "exec": {
                    "apiVersion": "client.authentication.k8s.io/v1beta1",
                    "command": "aws",
                    "args": [
                        "eks", "get-token",
                        "--cluster-name", env.cluster_name,
                        "--region", region,
                        "--role-arn", env.role,
                    ],
                }
            }
        }],
        "contexts": [{
            "name": env.cluster_name,
            "context": { "cluster": env.cluster_name, "user": KUBE_USER }
        }],
        "current-context": env.cluster_name,
    });
    Ok(serde_json::to_string(&doc)?)
}
