//! Failover state machine (spec §4.13): `idle -> freeze_writes -> precheck ->
//! promoting -> verification -> completed`, with `failed` reachable from any
//! in-progress state and `rollback_pending -> rolled_back` reachable once
//! promotion has begun.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    Idle,
    FreezeWrites,
    Precheck,
    Promoting,
    Verification,
    Completed,
    Failed,
    RollbackPending,
    RolledBack,
}

impl FailoverState {
    pub fn as_str(self) -> &'static str {
        match self {
            FailoverState::Idle => "idle",
            FailoverState::FreezeWrites => "freeze_writes",
            FailoverState::Precheck => "precheck",
            FailoverState::Promoting => "promoting",
            FailoverState::Verification => "verification",
            FailoverState::Completed => "completed",
            FailoverState::Failed => "failed",
            FailoverState::RollbackPending => "rollback_pending",
            FailoverState::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "idle" => FailoverState::Idle,
            "freeze_writes" => FailoverState::FreezeWrites,
            "precheck" => FailoverState::Precheck,
            "promoting" => FailoverState::Promoting,
            "verification" => FailoverState::Verification,
            "completed" => FailoverState::Completed,
            "failed" => FailoverState::Failed,
            "rollback_pending" => FailoverState::RollbackPending,
            "rolled_back" => FailoverState::RolledBack,
            _ => return None,
        })
    }

    /// A failover run holds its single-flight lock in every state except the
    /// two it can end in.
    pub fn is_terminal(self) -> bool {
        matches!(self, FailoverState::Completed | FailoverState::RolledBack)
    }

    /// Whether mutating (non-ops) request paths should be frozen while a run
    /// is in this state — true for every state but `idle`.
    pub fn freezes_writes(self) -> bool {
        !matches!(self, FailoverState::Idle)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: FailoverState) -> bool {
        use FailoverState::*;
        match (self, next) {
            (Idle, FreezeWrites) => true,
            (FreezeWrites, Precheck) => true,
            (Precheck, Promoting) => true,
            (Promoting, Verification) => true,
            (Verification, Completed) => true,
            (FreezeWrites | Precheck | Promoting | Verification, Failed) => true,
            (Promoting | Verification, RollbackPending) => true,
            (RollbackPending, RolledBack) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FailoverState::*;

    #[test]
    fn happy_path_transitions_are_legal_in_order() {
        let path = [Idle, FreezeWrites, Precheck, Promoting, Verification, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn cannot_skip_states() {
        assert!(!Idle.can_transition_to(Promoting));
        assert!(!FreezeWrites.can_transition_to(Completed));
    }

    #[test]
    fn rollback_only_reachable_after_promotion_has_begun() {
        assert!(!Idle.can_transition_to(RollbackPending));
        assert!(!Precheck.can_transition_to(RollbackPending));
        assert!(Promoting.can_transition_to(RollbackPending));
        assert!(Verification.can_transition_to(RollbackPending));
        assert!(RollbackPending.can_transition_to(RolledBack));
    }

    #[test]
    fn terminal_states_accept_no_further_transition() {
        assert!(!Completed.can_transition_to(Idle));
        assert!(!RolledBack.can_transition_to(Idle));
    }
}
