use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Per-artifact packaging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Idle,
    Resolving,
    Validating,
    ManifestWritten,
    Installing,
    Pruning,
    RunningScripts,
    Copying,
    Done,
    Failed,
    Cancelled,
}

impl ArtifactState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Validating => "validating",
            Self::ManifestWritten => "manifest_written",
            Self::Installing => "installing",
            Self::Pruning => "pruning",
            Self::RunningScripts => "running_scripts",
            Self::Copying => "copying",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: ArtifactState, to: ArtifactState) -> Result<(), CoreError> {
    use ArtifactState::{
        Cancelled, Copying, Done, Failed, Idle, Installing, ManifestWritten, Pruning, Resolving,
        RunningScripts, Validating,
    };

    let valid = matches!(
        (from, to),
        (Idle, Resolving | Done)
            | (Resolving, Validating)
            | (Validating, ManifestWritten | Done)
            | (ManifestWritten, Installing)
            | (Installing, Pruning)
            | (Pruning, RunningScripts | Copying | Done)
            | (RunningScripts, Copying | Done)
            | (Copying, Done)
    ) || (!from.is_terminal() && matches!(to, Failed | Cancelled));

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ArtifactState::*;

    #[test]
    fn happy_path_transitions() {
        let path = [
            Idle,
            Resolving,
            Validating,
            ManifestWritten,
            Installing,
            Pruning,
            RunningScripts,
            Copying,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn optional_steps_can_be_skipped() {
        assert!(validate_transition(Idle, Done).is_ok());
        assert!(validate_transition(Validating, Done).is_ok());
        assert!(validate_transition(Pruning, Copying).is_ok());
        assert!(validate_transition(Pruning, Done).is_ok());
        assert!(validate_transition(RunningScripts, Done).is_ok());
    }

    #[test]
    fn failure_and_cancellation_from_any_active_state() {
        for state in [Idle, Resolving, Validating, ManifestWritten, Installing, Pruning, RunningScripts, Copying] {
            assert!(validate_transition(state, Failed).is_ok());
            assert!(validate_transition(state, Cancelled).is_ok());
        }
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Idle, Installing).is_err());
        assert!(validate_transition(ManifestWritten, Pruning).is_err());
        assert!(validate_transition(Installing, RunningScripts).is_err());
        assert!(validate_transition(Copying, Installing).is_err());
        assert!(validate_transition(Done, Failed).is_err());
        assert!(validate_transition(Failed, Resolving).is_err());
        assert!(validate_transition(Cancelled, Done).is_err());
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = validate_transition(Done, Installing).unwrap_err();
        assert_eq!(err.to_string(), "invalid state transition: done -> installing");
    }
}
