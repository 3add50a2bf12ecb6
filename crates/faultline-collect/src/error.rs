use faultline_core::CollectionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("illegal state transition for {catastrophe}: {from} -> {to}")]
    IllegalTransition {
        catastrophe: String,
        from: CollectionState,
        to: CollectionState,
    },
}
