use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ObjectReference, ReplicationController};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Annotation OpenShift sets on a deployment's replication controller to
/// report the rollout phase (New, Pending, Running, Complete, Failed).
pub const DEPLOYMENT_PHASE_ANNOTATION: &str = "openshift.io/deployment.phase";

/// Tag target kind that pins an image stream tag to one image by digest.
pub const IMAGE_STREAM_IMAGE: &str = "ImageStreamImage";

const DIGEST_PREFIX: &str = "sha256:";

#[derive(CustomResource, Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[kube(group = "apps.openshift.io", version = "v1", kind = "DeploymentConfig")]
#[kube(namespaced, schema = "disabled")]
#[kube(status = "DeploymentConfigStatus")]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    #[serde(default)]
    pub replicas: i32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigStatus {
    #[serde(default)]
    pub latest_version: i64,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
}

impl DeploymentConfig {
    pub fn latest_version(&self) -> i64 {
        self.status.as_ref().map_or(0, |s| s.latest_version)
    }

    pub fn desired_replicas(&self) -> i32 {
        self.spec.replicas
    }

    /// Name of the replication controller OpenShift creates for the latest
    /// version of this deployment.
    pub fn latest_controller_name(&self) -> String {
        controller_name(&self.name_any(), self.latest_version())
    }
}

pub fn controller_name(deployment: &str, version: i64) -> String {
    format!("{}-{}", deployment, version)
}

/// The parts of a replication controller a rollout check looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerRecord {
    pub name: String,
    pub current_replicas: i32,
    pub desired_replicas: i32,
    pub phase: String,
}

impl From<&ReplicationController> for ControllerRecord {
    fn from(rc: &ReplicationController) -> Self {
        ControllerRecord {
            name: rc.name_any(),
            current_replicas: rc.status.as_ref().map_or(0, |s| s.replicas),
            // Kubernetes defaults an unset replica count to one.
            desired_replicas: rc.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            phase: rc
                .annotations()
                .get(DEPLOYMENT_PHASE_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for ControllerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} (phase {:?}, {}/{} replicas)",
            self.name, self.phase, self.current_replicas, self.desired_replicas
        )
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[kube(group = "image.openshift.io", version = "v1", kind = "ImageStream")]
#[kube(namespaced, schema = "disabled")]
#[kube(status = "ImageStreamStatus")]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagReference>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamStatus {
    #[serde(default)]
    pub docker_image_repository: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<NamedTagEventList>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamedTagEventList {
    pub tag: String,
    #[serde(default)]
    pub items: Vec<TagEvent>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub docker_image_reference: String,
}

impl ImageStream {
    /// Image id (`sha256:<hex>`) the tag currently resolves to. The newest
    /// event of the tag's history comes first.
    pub fn image_id(&self, tag: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .tags
            .iter()
            .find(|t| t.tag == tag)?
            .items
            .first()
            .map(|event| event.image.as_str())
            .filter(|image| !image.is_empty())
    }

    /// Points `tag` at `from_name` of kind `from_kind` in `from_namespace`,
    /// replacing any existing entry for the tag.
    pub fn add_tag(&mut self, tag: &str, from_kind: &str, from_name: &str, from_namespace: &str) {
        let from = ObjectReference {
            kind: Some(from_kind.to_string()),
            name: Some(from_name.to_string()),
            namespace: Some(from_namespace.to_string()),
            ..Default::default()
        };

        match self.spec.tags.iter_mut().find(|t| t.name == tag) {
            Some(existing) => existing.from = Some(from),
            None => self.spec.tags.push(TagReference {
                name: tag.to_string(),
                from: Some(from),
                ..Default::default()
            }),
        }
    }

    pub fn tag_source(&self, tag: &str) -> Option<&ObjectReference> {
        self.spec.tags.iter().find(|t| t.name == tag)?.from.as_ref()
    }
}

/// Strips the `sha256:` prefix of an image id. Ids without it are kept whole.
pub fn digest(image_id: &str) -> &str {
    image_id.strip_prefix(DIGEST_PREFIX).unwrap_or(image_id)
}

/// `<stream>@<digest>`, the name of an image inside a stream.
pub fn stream_image_name(stream: &str, image_id: &str) -> String {
    format!("{}@{}", stream, digest(image_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ReplicationControllerSpec, ReplicationControllerStatus};
    use kube::core::ObjectMeta;
    use serde_json::json;

    const HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn stream_json() -> Value {
        json!({
            "apiVersion": "image.openshift.io/v1",
            "kind": "ImageStream",
            "metadata": {"name": "test", "namespace": "dev", "resourceVersion": "42"},
            "spec": {
                "lookupPolicy": {"local": false},
                "tags": [{
                    "name": "latest",
                    "importPolicy": {},
                    "referencePolicy": {"type": "Source"}
                }]
            },
            "status": {
                "dockerImageRepository": "image-registry.openshift-image-registry.svc:5000/dev/test",
                "tags": [{
                    "tag": "latest",
                    "items": [
                        {"image": format!("sha256:{}", HEX), "dockerImageReference": "x", "created": "2024-01-02T00:00:00Z", "generation": 2},
                        {"image": "sha256:older", "dockerImageReference": "y", "created": "2024-01-01T00:00:00Z", "generation": 1}
                    ]
                }, {
                    "tag": "empty",
                    "items": []
                }]
            }
        })
    }

    #[test]
    fn resolves_newest_image_for_tag() {
        let stream: ImageStream = serde_json::from_value(stream_json()).unwrap();
        assert_eq!(stream.image_id("latest"), Some(format!("sha256:{}", HEX).as_str()));
        assert_eq!(stream.image_id("empty"), None);
        assert_eq!(stream.image_id("missing"), None);
    }

    #[test]
    fn digest_strips_exactly_the_prefix() {
        let image_id = format!("sha256:{}", HEX);
        assert_eq!(digest(&image_id), HEX);
        assert_eq!(digest(&image_id).len(), 64);
        assert_eq!(stream_image_name("test", &image_id), format!("test@{}", HEX));
        assert_eq!(digest("abc"), "abc");
    }

    #[test]
    fn add_tag_replaces_existing_entry_and_keeps_unknown_fields() {
        let mut stream: ImageStream = serde_json::from_value(stream_json()).unwrap();
        stream.add_tag("latest", IMAGE_STREAM_IMAGE, "other@abc", "dev");
        stream.add_tag("stable", IMAGE_STREAM_IMAGE, "test@def", "dev");

        assert_eq!(stream.spec.tags.len(), 2);
        let latest = stream.tag_source("latest").unwrap();
        assert_eq!(latest.name.as_deref(), Some("other@abc"));

        let rendered = serde_json::to_value(&stream).unwrap();
        assert_eq!(rendered["spec"]["lookupPolicy"], json!({"local": false}));
        assert_eq!(rendered["spec"]["tags"][0]["referencePolicy"], json!({"type": "Source"}));
        assert_eq!(rendered["spec"]["tags"][1]["from"]["kind"], json!("ImageStreamImage"));
        assert_eq!(rendered["metadata"]["resourceVersion"], json!("42"));
    }

    #[test]
    fn deployment_config_names_latest_controller() {
        let dc: DeploymentConfig = serde_json::from_value(json!({
            "apiVersion": "apps.openshift.io/v1",
            "kind": "DeploymentConfig",
            "metadata": {"name": "myapp", "namespace": "dev"},
            "spec": {"replicas": 2, "selector": {"app": "myapp"}},
            "status": {"latestVersion": 3}
        }))
        .unwrap();

        assert_eq!(dc.latest_version(), 3);
        assert_eq!(dc.desired_replicas(), 2);
        assert_eq!(dc.latest_controller_name(), "myapp-3");
    }

    #[test]
    fn controller_record_reads_counts_and_phase() {
        let mut annotations = BTreeMap::new();
        annotations.insert(DEPLOYMENT_PHASE_ANNOTATION.to_string(), "Running".to_string());
        let rc = ReplicationController {
            metadata: ObjectMeta {
                name: Some("myapp-3".into()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(ReplicationControllerSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            status: Some(ReplicationControllerStatus {
                replicas: 1,
                ..Default::default()
            }),
        };

        let record = ControllerRecord::from(&rc);
        assert_eq!(record.name, "myapp-3");
        assert_eq!(record.current_replicas, 1);
        assert_eq!(record.desired_replicas, 2);
        assert_eq!(record.phase, "Running");
    }

    #[test]
    fn controller_record_defaults_when_unset() {
        let rc = ReplicationController {
            metadata: ObjectMeta {
                name: Some("myapp-1".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let record = ControllerRecord::from(&rc);
        assert_eq!(record.current_replicas, 0);
        assert_eq!(record.desired_replicas, 1);
        assert_eq!(record.phase, "");
    }
}
