use async_trait::async_trait;
use k8s_openapi::api::core::v1::ReplicationController;
use kube::api::DynamicObject;
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::resources::{DeploymentConfig, ImageStream};
use crate::step::Error;

mod utils;
pub use utils::{group_version_kind, perform_dynamic_create, perform_get, perform_replace};

/// Cluster operations the steps rely on.
///
/// Gets return `Ok(None)` when the object does not exist; every other
/// failure is an `Err`. An implementation is bound to one API endpoint and
/// one credential.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_deployment_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentConfig>, Error>;

    async fn get_replication_controller(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ReplicationController>, Error>;

    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, Error>;

    /// Full replace of the stream; no optimistic-lock retry.
    async fn update_image_stream(&self, stream: &ImageStream) -> Result<ImageStream, Error>;

    /// Creates `resource` in `namespace` with this client's credential.
    async fn create(&self, namespace: &str, resource: &DynamicObject) -> Result<(), Error>;
}

pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_deployment_config(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentConfig>, Error> {
        perform_get(self.client.clone(), name, namespace).await
    }

    async fn get_replication_controller(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ReplicationController>, Error> {
        perform_get(self.client.clone(), name, namespace).await
    }

    async fn get_image_stream(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ImageStream>, Error> {
        perform_get(self.client.clone(), name, namespace).await
    }

    async fn update_image_stream(&self, stream: &ImageStream) -> Result<ImageStream, Error> {
        perform_replace(self.client.clone(), stream).await
    }

    async fn create(&self, namespace: &str, resource: &DynamicObject) -> Result<(), Error> {
        perform_dynamic_create(self.client.clone(), namespace, resource).await?;
        Ok(())
    }
}
