use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single step against a page surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebAction {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
        #[serde(default = "default_true")]
        clear: bool,
        #[serde(default)]
        press_enter: bool,
    },
    Navigate {
        url: String,
    },
    Scroll {
        direction: ScrollDirection,
        amount: i32,
    },
    /// Dispatches a change event on a file input. No file is attached.
    Upload {
        selector: String,
        file_path: String,
        #[serde(default)]
        file_type: String,
    },
    Select {
        selector: String,
        option: String,
        #[serde(default)]
        by_value: bool,
    },
    Wait {
        condition: Condition,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
    },
    /// Field name to CSS selector
    ExtractData {
        selectors: BTreeMap<String, String>,
    },
    ExecuteScript {
        script: String,
        #[serde(default)]
        return_value: bool,
    },
    TakeScreenshot {
        #[serde(default)]
        full_page: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_wait_timeout_ms() -> u64 {
    10000
}

impl WebAction {
    pub fn click(selector: impl Into<String>) -> Self {
        WebAction::Click {
            selector: selector.into(),
        }
    }

    pub fn type_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        WebAction::Type {
            selector: selector.into(),
            text: text.into(),
            clear: true,
            press_enter: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        WebAction::Navigate { url: url.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WebAction::Click { .. } => "click",
            WebAction::Type { .. } => "type",
            WebAction::Navigate { .. } => "navigate",
            WebAction::Scroll { .. } => "scroll",
            WebAction::Upload { .. } => "upload",
            WebAction::Select { .. } => "select",
            WebAction::Wait { .. } => "wait",
            WebAction::ExtractData { .. } => "extract_data",
            WebAction::ExecuteScript { .. } => "execute_script",
            WebAction::TakeScreenshot { .. } => "take_screenshot",
        }
    }

    /// The selector the action targets, for actions that resolve one element.
    pub fn target_selector(&self) -> Option<&str> {
        match self {
            WebAction::Click { selector }
            | WebAction::Type { selector, .. }
            | WebAction::Upload { selector, .. }
            | WebAction::Select { selector, .. } => Some(selector),
            WebAction::Navigate { .. }
            | WebAction::Scroll { .. }
            | WebAction::Wait { .. }
            | WebAction::ExtractData { .. }
            | WebAction::ExecuteScript { .. }
            | WebAction::TakeScreenshot { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// `(dx, dy)` for `window.scrollBy`
    pub fn offsets(self, amount: i32) -> (i32, i32) {
        match self {
            ScrollDirection::Up => (0, -amount),
            ScrollDirection::Down => (0, amount),
            ScrollDirection::Left => (-amount, 0),
            ScrollDirection::Right => (amount, 0),
        }
    }
}

/// Caller-facing wait condition; mapped onto a `WebCondition` before polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub expected_value: Option<String>,
}

impl Condition {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            selector: None,
            expected_value: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_expected_value(mut self, value: impl Into<String>) -> Self {
        self.expected_value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    ElementExists,
    ElementVisible,
    ElementClickable,
    PageLoaded,
    UrlContains,
    TextPresent,
    FormFieldFilled,
}

/// Result of an action execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(
        default,
        with = "screenshot_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub screenshot: Option<Vec<u8>>,
}

impl ActionResult {
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = time_ms;
        self
    }
}

/// Report for an ordered run of actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceResult {
    pub overall_success: bool,
    pub completed_actions: usize,
    pub total_actions: usize,
    pub results: Vec<ActionResult>,
    pub total_execution_time_ms: u64,
    pub failed_at: Option<usize>,
}

mod screenshot_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
