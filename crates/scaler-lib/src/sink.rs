//! Scaling sink boundary: Kubernetes Deployment patching and dry-run

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use std::sync::Mutex;
use tracing::info;

/// Resizes the scaled workload
///
/// Implementations must be idempotent: setting the current count again is a no-op.
#[async_trait]
pub trait ScalingSink: Send + Sync {
    async fn set_replicas(&self, target: u32) -> Result<()>;
}

/// Patches `spec.replicas` of a Deployment
pub struct KubeScaler {
    deployments: Api<Deployment>,
    name: String,
}

impl KubeScaler {
    /// Connect with in-cluster or kubeconfig credentials
    pub async fn connect(namespace: &str, name: &str) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        Ok(Self::new(client, namespace, name))
    }

    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            deployments: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ScalingSink for KubeScaler {
    async fn set_replicas(&self, target: u32) -> Result<()> {
        let patch = json!({
            "spec": {
                "replicas": target
            }
        });
        self.deployments
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to scale deployment {} to {}", self.name, target))?;

        info!(deployment = %self.name, replicas = target, "Deployment scaled");
        Ok(())
    }
}

/// Logs resizes without applying them
#[derive(Debug, Default)]
pub struct DryRunSink {
    last_target: Mutex<Option<u32>>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent target that would have been applied
    pub fn last_target(&self) -> Option<u32> {
        self.last_target.lock().ok().and_then(|guard| *guard)
    }
}

#[async_trait]
impl ScalingSink for DryRunSink {
    async fn set_replicas(&self, target: u32) -> Result<()> {
        info!(replicas = target, dry_run = true, "Would scale deployment");
        if let Ok(mut guard) = self.last_target.lock() {
            *guard = Some(target);
        }
        Ok(())
    }
}
