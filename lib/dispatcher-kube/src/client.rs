//! Kubernetes client construction

use anyhow::Context;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

/// KubeClient wraps the Kubernetes client used by the endpoint watchers
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Connect to the cluster.
    ///
    /// Uses the in-cluster service account when `KUBERNETES_SERVICE_HOST` is
    /// set, otherwise `kubeconfig`, otherwise the default kubeconfig lookup.
    pub async fn connect(kubeconfig: Option<&Path>) -> anyhow::Result<Self> {
        let client = if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some() {
            info!("Using in-cluster Kubernetes configuration");
            let config = Config::incluster().context("failed to load in-cluster config")?;
            Client::try_from(config)?
        } else if let Some(path) = kubeconfig {
            info!("Using kubeconfig {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubecfg {}", path.display()))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to parse kubecfg")?;
            Client::try_from(config)?
        } else {
            Client::try_default().await?
        };

        Ok(Self { client })
    }

    /// Get a clone of the Kubernetes client
    pub fn clone_client(&self) -> Client {
        self.client.clone()
    }
}
