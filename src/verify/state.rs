use crate::resources::ControllerRecord;

/// Coarse health of one rollout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutState {
    /// The controller declared the rollout failed. Terminal.
    Failed,
    Progressing,
    /// Current and desired replicas both match the target.
    Scaled,
}

impl std::fmt::Display for RolloutState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = match self {
            RolloutState::Failed => "Failed",
            RolloutState::Progressing => "Progressing",
            RolloutState::Scaled => "Scaled",
        };
        write!(f, "{}", state)
    }
}

/// Classifies `record` against `target` replicas.
///
/// A declared "Failed" phase wins over any replica count.
pub fn classify(record: &ControllerRecord, target: i32) -> RolloutState {
    if record.phase.eq_ignore_ascii_case("Failed") {
        return RolloutState::Failed;
    }

    if record.current_replicas == target && record.desired_replicas == target {
        RolloutState::Scaled
    } else {
        RolloutState::Progressing
    }
}
