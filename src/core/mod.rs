pub mod config;
pub mod surface;

pub use config::{BrowserConfig, Config, ExecutorConfig, MonitoringConfig, Viewport};
pub use surface::{PageElement, PageSurface};
