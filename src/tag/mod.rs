//! Promotes an image by pointing a destination tag at the image a source tag
//! currently resolves to.

use secrecy::SecretString;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::overrides::{keys, Overrides};
use crate::resources::{stream_image_name, IMAGE_STREAM_IMAGE};
use crate::step::{bearer_token, connect, Error, StepConfig};

mod ensure;
pub use ensure::{ensure_stream, image_stream_shell};

pub const DISPLAY_NAME: &str = "Tag OpenShift Image";

#[derive(Clone, Debug, Default)]
pub struct TagImageConfig {
    pub step: StepConfig,
    pub test_stream: String,
    pub test_tag: String,
    pub prod_stream: String,
    pub prod_tag: String,
    /// Empty means the source namespace.
    pub destination_namespace: String,
    pub destination_auth_token: String,
}

/// A tag of an image stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub stream: String,
    pub tag: String,
    pub namespace: String,
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.stream, self.tag)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromotionRequest {
    pub source: ImageRef,
    pub destination: ImageRef,
    pub verbose: bool,
}

/// How a promotion ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Promotion {
    Tagged {
        destination: ImageRef,
        reference: String,
    },
    SourceMissing,
    SourceTagUnresolved,
    DestinationNotCreated,
    DestinationMissing,
}

impl Promotion {
    pub fn succeeded(&self) -> bool {
        matches!(self, Promotion::Tagged { .. })
    }
}

impl TagImageConfig {
    pub fn resolve(&self, overrides: &Overrides) -> PromotionRequest {
        let namespace = self.step.namespace(overrides);
        let destination_namespace =
            overrides.resolve(keys::DESTINATION_NAMESPACE, &self.destination_namespace);
        let destination_namespace = if destination_namespace.trim().is_empty() {
            namespace
        } else {
            destination_namespace
        };

        PromotionRequest {
            source: ImageRef {
                stream: overrides.resolve(keys::TEST_STREAM, &self.test_stream).to_string(),
                tag: overrides.resolve(keys::TEST_TAG, &self.test_tag).to_string(),
                namespace: namespace.to_string(),
            },
            destination: ImageRef {
                stream: overrides.resolve(keys::PROD_STREAM, &self.prod_stream).to_string(),
                tag: overrides.resolve(keys::PROD_TAG, &self.prod_tag).to_string(),
                namespace: destination_namespace.to_string(),
            },
            verbose: self.step.verbose(overrides),
        }
    }

    pub fn destination_auth_token(&self, overrides: &Overrides) -> Option<SecretString> {
        bearer_token(overrides.resolve(keys::DESTINATION_AUTH_TOKEN, &self.destination_auth_token))
    }

    pub async fn run(&self, overrides: &Overrides) -> Result<bool, Error> {
        let request = self.resolve(overrides);
        info!(
            "Starting \"{}\" from {} to {}.",
            DISPLAY_NAME, request.source, request.destination
        );

        let client = self.step.connect(overrides).await?;
        let destination_client = connect(
            self.step.api_url(overrides),
            self.destination_auth_token(overrides),
        )
        .await?;

        let promotion = promote(&client, &destination_client, &request).await?;
        Ok(promotion.succeeded())
    }
}

/// Tags the image behind `request.source` as `request.destination`.
///
/// Streams are read and written through `client`. A destination stream
/// missing from another namespace is created once through
/// `destination_client`, which holds that namespace's credential, and then
/// read again. When both namespaces are the same the source stream object
/// itself receives the tag.
pub async fn promote(
    client: &dyn ClusterClient,
    destination_client: &dyn ClusterClient,
    request: &PromotionRequest,
) -> Result<Promotion, Error> {
    let source = &request.source;
    let destination = &request.destination;
    let chatty = request.verbose;

    let Some(source_stream) = client.get_image_stream(&source.stream, &source.namespace).await?
    else {
        warn!(
            "Exiting \"{}\" unsuccessfully; could not retrieve image stream \"{}\" in project \"{}\".",
            DISPLAY_NAME, source.stream, source.namespace
        );
        return Ok(Promotion::SourceMissing);
    };

    let Some(image_id) = source_stream.image_id(&source.tag) else {
        warn!(
            "Exiting \"{}\" unsuccessfully; tag \"{}\" of image stream \"{}\" does not resolve to an image.",
            DISPLAY_NAME, source.tag, source.stream
        );
        return Ok(Promotion::SourceTagUnresolved);
    };
    let reference = stream_image_name(&source.stream, image_id);
    if chatty {
        info!(reference = %reference, "source image");
    }

    let mut target = if destination.namespace == source.namespace {
        source_stream
    } else {
        match client
            .get_image_stream(&destination.stream, &destination.namespace)
            .await?
        {
            Some(stream) => stream,
            None => {
                let created =
                    ensure_stream(destination_client, &destination.stream, &destination.namespace)
                        .await?;
                if !created {
                    warn!(
                        "Exiting \"{}\" unsuccessfully; could not create image stream \"{}\" in project \"{}\".",
                        DISPLAY_NAME, destination.stream, destination.namespace
                    );
                    return Ok(Promotion::DestinationNotCreated);
                }

                match client
                    .get_image_stream(&destination.stream, &destination.namespace)
                    .await?
                {
                    Some(stream) => stream,
                    None => {
                        warn!(
                            "Exiting \"{}\" unsuccessfully; could not retrieve image stream \"{}\" in project \"{}\".",
                            DISPLAY_NAME, destination.stream, destination.namespace
                        );
                        return Ok(Promotion::DestinationMissing);
                    }
                }
            }
        }
    };

    target.add_tag(
        &destination.tag,
        IMAGE_STREAM_IMAGE,
        &reference,
        &source.namespace,
    );
    if chatty {
        info!(stream = %serde_json::to_string(&target)?, "updated image stream");
    }
    client.update_image_stream(&target).await?;

    info!(
        "Exiting \"{}\" successfully; {} now references {}.",
        DISPLAY_NAME, destination, reference
    );
    Ok(Promotion::Tagged {
        destination: destination.clone(),
        reference,
    })
}
