use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Outcome of a page surface navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    pub success: bool,
    pub final_url: String,
    pub status_code: Option<u16>,
    pub load_time_ms: u64,
    pub error: Option<String>,
}

impl NavigationResult {
    pub fn loaded(final_url: impl Into<String>, load_time_ms: u64) -> Self {
        Self {
            success: true,
            final_url: final_url.into(),
            status_code: None,
            load_time_ms,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>, load_time_ms: u64) -> Self {
        Self {
            success: false,
            final_url: url.into(),
            status_code: None,
            load_time_ms,
            error: Some(error.into()),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedForm {
    pub selector: String,
    pub action: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedLink {
    pub selector: String,
    pub href: Option<String>,
    pub text: Option<String>,
    pub is_external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedButton {
    pub selector: String,
    pub text: Option<String>,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedInput {
    pub selector: String,
    pub input_type: String,
    pub name: Option<String>,
    pub required: bool,
}

/// Quick status snapshot of the current page.
///
/// The structural lists stay empty here; use `ExtractData` or the scan engine
/// for element-level detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebState {
    pub url: String,
    pub title: String,
    pub ready_state: String,
    pub forms: Vec<DetectedForm>,
    pub links: Vec<DetectedLink>,
    pub buttons: Vec<DetectedButton>,
    pub inputs: Vec<DetectedInput>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl WebState {
    pub fn new(url: String, title: String, ready_state: String) -> Self {
        Self {
            url,
            title,
            ready_state,
            forms: Vec::new(),
            links: Vec::new(),
            buttons: Vec::new(),
            inputs: Vec::new(),
            timestamp: chrono::Utc::now(),
        }
    }
}
