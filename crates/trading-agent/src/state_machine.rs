use decision_core::EngineError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Completed,
    Failed,
    /// Absorbing: only a process restart leaves it
    KillSwitchActive,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Completed => "completed",
            EngineState::Failed => "failed",
            EngineState::KillSwitchActive => "kill_switch_active",
        };
        f.write_str(s)
    }
}

/// Round lifecycle: `Idle -> Running -> {Completed, Failed} -> Idle`, with
/// `KillSwitchActive` reachable from anywhere.
#[derive(Debug)]
pub struct RoundStateMachine {
    state: EngineState,
    current_round: Option<Uuid>,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundStateMachine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            current_round: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Round currently in flight, if any
    pub fn current_round(&self) -> Option<Uuid> {
        self.current_round
    }

    pub fn begin(&mut self, round_id: Uuid) -> Result<(), EngineError> {
        self.transition(EngineState::Running)?;
        self.current_round = Some(round_id);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), EngineError> {
        self.transition(EngineState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), EngineError> {
        self.transition(EngineState::Failed)
    }

    /// Back to idle after a finished round
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.transition(EngineState::Idle)?;
        self.current_round = None;
        Ok(())
    }

    pub fn engage_kill_switch(&mut self) {
        self.state = EngineState::KillSwitchActive;
    }

    fn transition(&mut self, to: EngineState) -> Result<(), EngineError> {
        use EngineState::*;
        let allowed = matches!(
            (self.state, to),
            (Idle, Running) | (Running, Completed) | (Running, Failed) | (Completed, Idle) | (Failed, Idle)
        );
        if !allowed {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        tracing::debug!("Engine state {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_lifecycle() {
        let mut sm = RoundStateMachine::new();
        let id = Uuid::new_v4();
        sm.begin(id).unwrap();
        assert_eq!(sm.current_round(), Some(id));
        sm.complete().unwrap();
        sm.reset().unwrap();
        assert_eq!(sm.state(), EngineState::Idle);
        assert_eq!(sm.current_round(), None);

        sm.begin(Uuid::new_v4()).unwrap();
        sm.fail().unwrap();
        sm.reset().unwrap();
    }

    #[test]
    fn test_only_one_round_in_flight() {
        let mut sm = RoundStateMachine::new();
        sm.begin(Uuid::new_v4()).unwrap();
        let err = sm.begin(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(sm.reset().is_err());
    }

    #[test]
    fn test_kill_switch_is_absorbing() {
        let mut sm = RoundStateMachine::new();
        sm.begin(Uuid::new_v4()).unwrap();
        sm.engage_kill_switch();
        assert_eq!(sm.state(), EngineState::KillSwitchActive);
        assert!(sm.reset().is_err());
        assert!(sm.begin(Uuid::new_v4()).is_err());
    }
}
