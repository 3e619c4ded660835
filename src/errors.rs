use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Page surface fault: {0}")]
    SurfaceFault(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid action: {0}")]
    ValidationFailure(String),

    #[error("Monitoring tick failed: {0}")]
    TickFailure(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

// headless_chrome reports everything as anyhow::Error
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::AnyhowError(err.to_string())
    }
}

impl AgentError {
    pub fn surface<E: std::fmt::Display>(err: E) -> Self {
        AgentError::SurfaceFault(err.to_string())
    }

    /// Faults raised by the page surface rather than by the caller's input.
    pub fn is_surface_fault(&self) -> bool {
        matches!(
            self,
            AgentError::NavigationFailed(_)
                | AgentError::JavaScriptFailed(_)
                | AgentError::ScreenshotFailed(_)
                | AgentError::SurfaceFault(_)
                | AgentError::AnyhowError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_not_found_message_names_the_selector() {
        let err = AgentError::ElementNotFound("#buy".to_string());
        assert_eq!(err.to_string(), "Element not found: #buy");
    }

    #[test]
    fn classifies_surface_faults() {
        assert!(AgentError::surface("socket closed").is_surface_fault());
        assert!(AgentError::from(anyhow::anyhow!("tab crashed")).is_surface_fault());
        assert!(!AgentError::ValidationFailure("empty selector".into()).is_surface_fault());
        assert!(!AgentError::Timeout("page load".into()).is_surface_fault());
    }
}
