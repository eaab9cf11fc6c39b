//! Waits for the latest rollout of a deployment config to finish.
//!
//! Each tick re-reads the deployment config, looks up the replication
//! controller of its latest version and classifies it. The loop ends on a
//! declared failure, on convergence, or when the wait budget runs out.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::overrides::{keys, Overrides};
use crate::resources::ControllerRecord;
use crate::step::{Error, StepConfig};

mod state;
pub use state::{classify, RolloutState};

pub const DISPLAY_NAME: &str = "Verify OpenShift Deployment";

/// Host-wide default wait budget.
pub const DEFAULT_WAIT_MS: u64 = 180_000;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default)]
pub struct VerifyDeploymentConfig {
    pub step: StepConfig,
    pub deployment_config: String,
    pub replica_count: String,
    pub verify_replica_count: bool,
}

/// Replica count a rollout has to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedReplicas {
    /// No count check: the controller only has to reach its own desired count.
    Unchecked,
    /// Count declared by the deployment config when it is first read.
    FromDeployment,
    Explicit(i32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyRequest {
    pub deployment: String,
    pub namespace: String,
    pub expected: ExpectedReplicas,
    pub verbose: bool,
}

/// How a verification ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    Scaled {
        controller: String,
        replicas: Option<i32>,
    },
    Failed {
        controller: String,
        phase: String,
    },
    TimedOut {
        last: Option<ControllerRecord>,
    },
    MissingDeployment,
}

impl Verification {
    pub fn succeeded(&self) -> bool {
        matches!(self, Verification::Scaled { .. })
    }
}

impl VerifyDeploymentConfig {
    pub fn resolve(&self, overrides: &Overrides) -> Result<VerifyRequest, Error> {
        let check_count =
            overrides.resolve_flag(keys::VERIFY_REPLICA_COUNT, self.verify_replica_count);
        let count = overrides
            .resolve(keys::REPLICA_COUNT, &self.replica_count)
            .trim();

        let expected = if !check_count {
            ExpectedReplicas::Unchecked
        } else if count.is_empty() {
            ExpectedReplicas::FromDeployment
        } else {
            match count.parse::<i32>() {
                Ok(n) if n >= 0 => ExpectedReplicas::Explicit(n),
                _ => return Err(Error::InvalidReplicaCount(count.to_string())),
            }
        };

        Ok(VerifyRequest {
            deployment: overrides
                .resolve(keys::DEPLOYMENT_CONFIG, &self.deployment_config)
                .to_string(),
            namespace: self.step.namespace(overrides).to_string(),
            expected,
            verbose: self.step.verbose(overrides),
        })
    }

    pub async fn run(
        &self,
        overrides: &Overrides,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        let request = self.resolve(overrides)?;
        info!(
            "Starting \"{}\" with deployment config \"{}\" from the project \"{}\".",
            DISPLAY_NAME, request.deployment, request.namespace
        );

        let client = self.step.connect(overrides).await?;
        let verification = verify(&client, &request, wait, cancel).await?;
        Ok(verification.succeeded())
    }
}

/// Polls until the latest rollout of `request.deployment` is scaled, has
/// failed, or `wait` has elapsed.
///
/// A missing deployment config ends the wait on the first tick. Client errors
/// abort the wait and are returned as they are.
pub async fn verify(
    client: &dyn ClusterClient,
    request: &VerifyRequest,
    wait: Duration,
    cancel: &CancellationToken,
) -> Result<Verification, Error> {
    let deployment = request.deployment.as_str();
    let namespace = request.namespace.as_str();
    let chatty = request.verbose;

    match request.expected {
        ExpectedReplicas::Unchecked => info!(
            deployment,
            "Waiting on the latest deployment for \"{}\" to complete ...", deployment
        ),
        ExpectedReplicas::FromDeployment => info!(
            deployment,
            "Waiting on the latest deployment for \"{}\" to complete and scale to the count of its config ...",
            deployment
        ),
        ExpectedReplicas::Explicit(count) => info!(
            deployment,
            "Waiting on the latest deployment for \"{}\" to complete and scale to \"{}\" replica(s) ...",
            deployment,
            count
        ),
    }
    if chatty {
        info!(wait_ms = wait.as_millis() as u64, "verification wait");
    }

    let deadline = Instant::now() + wait;
    // Read at most once so a configured count cannot drift mid-poll.
    let mut target = match request.expected {
        ExpectedReplicas::Explicit(count) => Some(count),
        _ => None,
    };
    let mut last: Option<(ControllerRecord, RolloutState)> = None;

    while Instant::now() < deadline {
        let Some(dc) = client.get_deployment_config(deployment, namespace).await? else {
            warn!(
                deployment,
                namespace,
                "Exiting \"{}\" unsuccessfully; could not find deployment config \"{}\" in project \"{}\".",
                DISPLAY_NAME,
                deployment,
                namespace
            );
            return Ok(Verification::MissingDeployment);
        };

        if request.expected == ExpectedReplicas::FromDeployment && target.is_none() {
            target = Some(dc.desired_replicas());
        }
        if chatty {
            info!(deployment, version = dc.latest_version(), "latest version");
        }

        let controller = dc.latest_controller_name();
        if let Some(rc) = client.get_replication_controller(&controller, namespace).await? {
            let record = ControllerRecord::from(&rc);
            let state = classify(&record, target.unwrap_or(record.desired_replicas));

            if chatty {
                info!(
                    controller = %record.name,
                    current = record.current_replicas,
                    desired = record.desired_replicas,
                    target = ?target,
                    phase = %record.phase,
                    "current replication controller"
                );
            }
            let changed = last
                .as_ref()
                .map_or(true, |(r, s)| r.name != record.name || *s != state);
            if changed {
                info!(controller = %record.name, %state, "Deployment \"{}\" is {}.", record, state);
            }

            match state {
                RolloutState::Failed => {
                    warn!(
                        controller = %record.name,
                        "Exiting \"{}\" unsuccessfully; deployment \"{}\" has completed with status: [{}].",
                        DISPLAY_NAME,
                        record.name,
                        record.phase
                    );
                    return Ok(Verification::Failed {
                        controller: record.name,
                        phase: record.phase,
                    });
                }
                RolloutState::Scaled => {
                    match target {
                        Some(count) if request.expected != ExpectedReplicas::Unchecked => info!(
                            controller = %record.name,
                            "Exiting \"{}\" successfully; deployment \"{}\" has completed with {} replica(s).",
                            DISPLAY_NAME,
                            record.name,
                            count
                        ),
                        _ => info!(
                            controller = %record.name,
                            "Exiting \"{}\" successfully; deployment \"{}\" has completed, replica count not checked.",
                            DISPLAY_NAME,
                            record.name
                        ),
                    }
                    return Ok(Verification::Scaled {
                        controller: record.name,
                        replicas: target.filter(|_| request.expected != ExpectedReplicas::Unchecked),
                    });
                }
                RolloutState::Progressing => last = Some((record, state)),
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleep(POLL_INTERVAL) => {}
        }
    }

    let last = last.map(|(record, _)| record);
    let controller = last.as_ref().map_or("<none>", |r| r.name.as_str());
    match request.expected {
        ExpectedReplicas::Unchecked => warn!(
            controller,
            "Exiting \"{}\" unsuccessfully; deployment \"{}\" did not complete within {:?}, last phase: [{}].",
            DISPLAY_NAME,
            controller,
            wait,
            last.as_ref().map_or("", |r| r.phase.as_str())
        ),
        _ => warn!(
            controller,
            "Exiting \"{}\" unsuccessfully; deployment \"{}\" did not reach \"{}\" replica(s) within {:?}.",
            DISPLAY_NAME,
            controller,
            target.map_or_else(|| "?".to_string(), |c| c.to_string()),
            wait
        ),
    }
    Ok(Verification::TimedOut { last })
}
