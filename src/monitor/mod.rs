//! Change detection: periodic scans, snapshot diffs and alerts.

pub mod diff;
pub mod scan;
pub mod supervisor;
pub mod types;

pub use diff::{detect_changes, edit_distance, generate_alerts, is_price_decrease, similarity};
pub use scan::{ScanEngine, DEFAULT_SCAN_SELECTORS};
pub use supervisor::MonitoringSupervisor;
pub use types::*;
