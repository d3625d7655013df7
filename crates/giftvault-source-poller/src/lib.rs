//! giftvault-source-poller: periodic reconciliation against the
//! "list owned gifts" operation. Catches gifts the realtime stream missed.

pub mod poller;
pub mod reconcile;
pub mod schedule;

pub use poller::{CycleReport, PollerConfig, PollerStatus, ReconciliationPoller, SkipReason};
pub use reconcile::{ReconcileSummary, reconcile_gifts};
pub use schedule::{FailureVerdict, PollPhase, PollSchedule, TickDecision};
