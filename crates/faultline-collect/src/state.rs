use faultline_core::CollectionState;

use crate::CollectError;

/// Guards one catastrophe's lifecycle; every transition is logged and
/// anything outside `Pending → FetchingPool → Classifying → terminal` is
/// rejected.
#[derive(Debug, Clone)]
pub struct StateTracker {
    catastrophe_id: String,
    state: CollectionState,
}

impl StateTracker {
    pub fn new(catastrophe_id: impl Into<String>) -> Self {
        Self {
            catastrophe_id: catastrophe_id.into(),
            state: CollectionState::Pending,
        }
    }

    pub fn state(&self) -> CollectionState {
        self.state
    }

    pub fn advance(&mut self, next: CollectionState) -> Result<(), CollectError> {
        if !self.state.can_transition_to(next) {
            return Err(CollectError::IllegalTransition {
                catastrophe: self.catastrophe_id.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::info!(
            catastrophe = %self.catastrophe_id,
            from = %self.state,
            to = %next,
            "collection state changed"
        );
        self.state = next;
        Ok(())
    }
}
