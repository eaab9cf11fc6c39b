use std::fmt::Debug;

use kube::api::{ApiResource, DynamicObject, GroupVersionKind, PostParams};
use kube::core::ResourceExt;
use kube::discovery::{self, Scope};
use kube::{Api, Client, Resource};
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::step::Error;

/// Fetches `name` from `namespace`; a 404 from the API server is `Ok(None)`.
pub async fn perform_get<T>(client: Client, name: &str, namespace: &str) -> Result<Option<T>, Error>
where
    T: Clone + DeserializeOwned + Debug + Serialize + ResourceExt,
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(value) => Ok(Some(value)),
        Err(kube::Error::Api(error_response)) if error_response.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replaces the whole object, as last written by whoever holds it.
pub async fn perform_replace<T>(client: Client, value: &T) -> Result<T, Error>
where
    T: Clone + DeserializeOwned + Debug + Serialize + ResourceExt,
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = NamespaceResourceScope>,
{
    let namespace = value.namespace().unwrap_or_else(|| "default".into());
    let api: Api<T> = Api::namespaced(client, &namespace);
    let result = api
        .replace(&value.name_any(), &PostParams::default(), value)
        .await?;
    Ok(result)
}

/// Creates an object of any kind the API server serves.
///
/// The kind is resolved through discovery. Namespaced kinds land in
/// `namespace` regardless of the namespace the object names.
pub async fn perform_dynamic_create(
    client: Client,
    namespace: &str,
    value: &DynamicObject,
) -> Result<DynamicObject, Error> {
    let gvk = group_version_kind(value)?;
    let (resource, capabilities): (ApiResource, _) = discovery::pinned_kind(&client, &gvk).await?;

    let mut object = value.clone();
    let api: Api<DynamicObject> = match capabilities.scope {
        Scope::Namespaced => {
            object.metadata.namespace = Some(namespace.to_string());
            Api::namespaced_with(client, namespace, &resource)
        }
        Scope::Cluster => {
            object.metadata.namespace = None;
            Api::all_with(client, &resource)
        }
    };

    let result = api.create(&PostParams::default(), &object).await?;
    Ok(result)
}

pub fn group_version_kind(value: &DynamicObject) -> Result<GroupVersionKind, Error> {
    let types = value.types.as_ref().ok_or_else(|| {
        Error::InvalidResource(format!("{} has no apiVersion/kind", value.name_any()))
    })?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}
