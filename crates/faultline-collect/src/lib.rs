//! Stratified collection of safe samples around documented catastrophes.

pub mod cli;
mod collector;
mod error;
mod pool;
mod run;
mod state;
mod verify;

pub use collector::{CatastropheOutcome, Collector, CollectorSettings};
pub use error::CollectError;
pub use pool::{PoolCandidate, RandomPool, repository_key};
pub use run::{RunOutcome, run_collection};
pub use state::StateTracker;
pub use verify::{Verification, VerifyStatus, verification_summary, verify_records};
