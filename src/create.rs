use kube::api::DynamicObject;
use kube::core::ResourceExt;
use serde_json::Value;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::overrides::{keys, Overrides};
use crate::step::{Error, StepConfig};

pub const DISPLAY_NAME: &str = "Create OpenShift Resource(s)";

#[derive(Clone, Debug, Default)]
pub struct CreateResourceConfig {
    pub step: StepConfig,
    /// JSON or YAML document; a `List` creates each of its items.
    pub jsonyaml: String,
}

impl CreateResourceConfig {
    pub async fn run(&self, overrides: &Overrides) -> Result<bool, Error> {
        let namespace = self.step.namespace(overrides);
        let payload = overrides.resolve(keys::JSON_YAML, &self.jsonyaml);
        info!(
            namespace,
            "Starting \"{}\" in the project \"{}\".", DISPLAY_NAME, namespace
        );

        let client = self.step.connect(overrides).await?;
        create_resources(&client, namespace, payload).await
    }
}

/// Splits `payload` into the objects it describes.
pub fn parse_resources(payload: &str) -> Result<Vec<DynamicObject>, Error> {
    // YAML is a superset of JSON, one parser covers both.
    let document: Value = serde_yaml::from_str(payload)?;

    let documents = match document.get("kind").and_then(Value::as_str) {
        Some("List") => match document.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(Error::InvalidResource("List items must be an array".into())),
        },
        _ => vec![document],
    };

    documents
        .into_iter()
        .map(|value| {
            let object: DynamicObject = serde_json::from_value(value)?;
            match &object.types {
                Some(types) if !types.api_version.is_empty() && !types.kind.is_empty() => {}
                _ => {
                    return Err(Error::InvalidResource(
                        "resource is missing apiVersion or kind".into(),
                    ))
                }
            }
            if object.metadata.name.as_deref().unwrap_or_default().is_empty() {
                return Err(Error::InvalidResource("resource is missing metadata.name".into()));
            }
            Ok(object)
        })
        .collect()
}

/// Creates every object of `payload` in `namespace`.
///
/// Returns `Ok(false)` when the API server rejected any of them; the rest
/// are still attempted. Requests that never got an answer are returned as
/// errors.
pub async fn create_resources(
    client: &dyn ClusterClient,
    namespace: &str,
    payload: &str,
) -> Result<bool, Error> {
    let objects = parse_resources(payload)?;

    let mut failed = 0;
    for object in &objects {
        let kind = object.types.as_ref().map_or("", |t| t.kind.as_str());
        match client.create(namespace, object).await {
            Ok(()) => info!(kind, name = %object.name_any(), namespace, "created"),
            Err(e) if e.is_api_response() => {
                failed += 1;
                warn!(kind, name = %object.name_any(), namespace, error = %e, "create failed");
            }
            Err(e) => return Err(e),
        }
    }

    if failed == 0 {
        info!(
            "Exiting \"{}\" successfully; {} resource(s) created.",
            DISPLAY_NAME,
            objects.len()
        );
        Ok(true)
    } else {
        warn!(
            "Exiting \"{}\" unsuccessfully; {} of {} resource(s) could not be created.",
            DISPLAY_NAME,
            failed,
            objects.len()
        );
        Ok(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use kube::core::ErrorResponse;

    pub(crate) fn api_error(code: u16, reason: &str) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: format!("{} failed", reason),
            reason: reason.into(),
            code,
        }))
    }

    const LIST: &str = r#"
kind: List
apiVersion: v1
items:
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: settings
    data:
      mode: prod
  - apiVersion: image.openshift.io/v1
    kind: ImageStream
    metadata:
      name: prod
"#;

    #[test]
    fn parses_json_and_yaml_lists() {
        let objects = parse_resources(LIST).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name_any(), "settings");
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "ImageStream");

        let single = parse_resources(
            r#"{"apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"}}"#,
        )
        .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name_any(), "web");
    }

    #[test]
    fn rejects_incomplete_resources() {
        assert!(matches!(
            parse_resources(r#"{"kind": "Service", "metadata": {"name": "web"}}"#),
            Err(_)
        ));
        assert!(matches!(
            parse_resources(r#"{"apiVersion": "v1", "kind": "Service", "metadata": {}}"#),
            Err(Error::InvalidResource(_))
        ));
        assert!(parse_resources("kind: [").is_err());
    }

    #[tokio::test]
    async fn creates_each_item_in_the_target_namespace() {
        let mut client = MockClusterClient::new();
        client
            .expect_create()
            .withf(|namespace, _| namespace == "prod")
            .times(2)
            .returning(|_, _| Ok(()));

        assert!(create_resources(&client, "prod", LIST).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_item_fails_the_step_but_not_the_rest() {
        let mut client = MockClusterClient::new();
        client
            .expect_create()
            .withf(|_, object| object.name_any() == "settings")
            .times(1)
            .returning(|_, _| Err(api_error(409, "AlreadyExists")));
        client
            .expect_create()
            .withf(|_, object| object.name_any() == "prod")
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(!create_resources(&client, "prod", LIST).await.unwrap());
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let mut client = MockClusterClient::new();
        client
            .expect_create()
            .times(1)
            .returning(|_, _| Err(Error::InvalidResource("connection reset".into())));

        assert!(create_resources(&client, "prod", LIST).await.is_err());
    }
}
