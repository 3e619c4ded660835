pub mod actions;
pub mod browser;
pub mod core;
pub mod errors;
pub mod monitor;
pub mod testing;
pub mod types;

pub use actions::{
    ActionExecutor, ActionResult, Condition, ConditionEvaluator, ConditionType, SequenceResult,
    WebAction, WebCondition,
};
pub use browser::{ChromePageSurface, HtmlPageSurface};
pub use crate::core::{BrowserConfig, Config, ExecutorConfig, MonitoringConfig, PageElement, PageSurface};
pub use errors::{AgentError, Result};
pub use monitor::{
    Alert, AlertSeverity, AlertType, Change, ChangeDetectionResult, ChangeType, MonitoringSession,
    MonitoringSupervisor, ScanConfig, ScanEngine, ScanResult, StructuredDataResult,
};
pub use types::*;
