//! Pipeline steps that verify OpenShift rollouts and promote images.
//!
//! - [`verify`] waits for the latest rollout of a deployment config.
//! - [`tag`] points a tag of one image stream at the image behind another,
//!   creating the destination stream when it is missing.
//! - [`create`] creates arbitrary resources from a JSON or YAML payload.
//!
//! Every step takes its typed configuration plus an [`Overrides`] map that
//! shadows configured values for one invocation.

pub mod cluster;
pub mod create;
pub mod overrides;
pub mod resources;
pub mod step;
pub mod tag;
pub mod verify;

pub use cluster::{ClusterClient, KubeClusterClient};
pub use overrides::Overrides;
pub use step::{Error, StepConfig};
