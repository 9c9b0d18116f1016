pub mod generator;
pub mod rules;
pub mod sweep;

pub use generator::{GeneratorSettings, TripGenerator};
pub use rules::{RuleOutcome, RuleService};
pub use sweep::{DailySweep, SweepSummary};
