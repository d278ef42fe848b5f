//! Services for the outbound dialer.

pub mod control;
pub mod correlator;
pub mod recording;
pub mod state;
pub mod summary;

pub use control::router;
pub use correlator::Correlator;
pub use recording::RecordingManager;
pub use state::{Call, CallStore, LegTimeline};
pub use summary::{compute_summary, CallSummary, SummaryStore};
