use serde_json::json;
use tracing::info;

use crate::cluster::ClusterClient;
use crate::create::create_resources;
use crate::step::Error;

/// Minimal image stream document: a name, an empty spec and no repository.
pub fn image_stream_shell(name: &str) -> String {
    json!({
        "kind": "ImageStream",
        "apiVersion": "image.openshift.io/v1",
        "metadata": {
            "name": name,
            "creationTimestamp": null
        },
        "spec": {},
        "status": {
            "dockerImageRepository": ""
        }
    })
    .to_string()
}

/// Creates an empty image stream `name` in `namespace`.
///
/// `client` must carry the destination namespace's credential. This is a
/// plain create: an existing stream makes it fail.
pub async fn ensure_stream(
    client: &dyn ClusterClient,
    name: &str,
    namespace: &str,
) -> Result<bool, Error> {
    info!(stream = name, namespace, "creating image stream");
    create_resources(client, namespace, &image_stream_shell(name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use crate::create::tests::api_error;
    use kube::core::ResourceExt;

    #[test]
    fn shell_is_a_bare_image_stream() {
        let shell: serde_json::Value = serde_json::from_str(&image_stream_shell("prod")).unwrap();
        assert_eq!(shell["kind"], "ImageStream");
        assert_eq!(shell["metadata"]["name"], "prod");
        assert_eq!(shell["spec"], json!({}));
        assert!(shell["metadata"].get("namespace").is_none());
    }

    #[tokio::test]
    async fn creates_in_the_destination_namespace() {
        let mut client = MockClusterClient::new();
        client
            .expect_create()
            .withf(|namespace, object| {
                namespace == "prod"
                    && object.name_any() == "stable"
                    && object.types.as_ref().map(|t| t.kind.as_str()) == Some("ImageStream")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(ensure_stream(&client, "stable", "prod").await.unwrap());
    }

    #[tokio::test]
    async fn existing_stream_is_a_failed_create() {
        let mut client = MockClusterClient::new();
        client
            .expect_create()
            .times(1)
            .returning(|_, _| Err(api_error(409, "AlreadyExists")));

        assert!(!ensure_stream(&client, "stable", "prod").await.unwrap());
    }
}
