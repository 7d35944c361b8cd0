pub mod translator;

pub use translator::{RefundOutcome, RefundService};
