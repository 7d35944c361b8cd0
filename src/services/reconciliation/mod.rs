pub mod matcher;
pub mod merge;
pub mod reconciler;

pub use matcher::{CandidatePair, MatcherService, ReconciliationCandidate};
pub use merge::MergeOutcome;
pub use reconciler::{ReconcileOutcome, ReconcilerService};
