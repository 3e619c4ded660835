use crate::errors::Result;
use crate::types::{ElementRect, NavigationResult};
use async_trait::async_trait;
use serde_json::Value;

/// A script-controllable page: the only way the engines touch a browser.
///
/// Implementations are free to block inside these calls; the engines treat
/// every call as a suspension point.
#[async_trait]
pub trait PageSurface: Send + Sync {
    type Element: PageElement;

    /// Navigate to a URL. A page that loads with an error is reported through
    /// `NavigationResult::success`, not as `Err`.
    async fn navigate_to(&self, url: &str) -> Result<NavigationResult>;

    /// First element matching a CSS selector, if any
    async fn find_element(&self, selector: &str) -> Result<Option<Self::Element>>;

    /// All elements matching a CSS selector, in document order
    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Execute JavaScript and return its value (`Value::Null` for undefined)
    async fn execute_script(&self, script: &str) -> Result<Value>;

    async fn capture_screenshot(&self) -> Result<Vec<u8>>;

    /// Serialized HTML of the current document
    async fn page_content(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    async fn page_title(&self) -> Result<String>;
}

/// Handle to one element on a page surface.
#[async_trait]
pub trait PageElement: Send + Sync {
    async fn click(&self) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn text(&self) -> Result<String>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn is_visible(&self) -> Result<bool>;

    async fn is_enabled(&self) -> Result<bool>;

    async fn tag_name(&self) -> Result<String>;

    async fn rect(&self) -> Result<ElementRect>;
}

/// Renders a script value the way a loosely-typed caller would compare it:
/// strings verbatim, everything else as JSON.
pub fn script_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Quote a string as a JavaScript literal for embedding in generated scripts.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
