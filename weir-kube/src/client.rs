//! Kubernetes client construction.

use std::path::Path;

use kube::Client;
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use tracing::info;

use crate::error::KubeError;

/// Connect to the cluster.
///
/// `in_cluster` uses the pod's service account; otherwise an explicit
/// `kubeconfig` is read, falling back to the usual inference (`KUBECONFIG`,
/// `~/.kube/config`, then in-cluster).
pub async fn connect(in_cluster: bool, kubeconfig: Option<&Path>) -> Result<Client, KubeError> {
    let config = if in_cluster {
        info!("Using in-cluster Kubernetes configuration");
        Config::incluster()?
    } else if let Some(path) = kubeconfig {
        info!(path = %path.display(), "Using kubeconfig");
        let kubeconfig = Kubeconfig::read_from(path)?;
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
    } else {
        Config::infer().await?
    };
    Ok(Client::try_from(config)?)
}
