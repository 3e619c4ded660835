use crate::actions::base::{ActionResult, Condition, ScrollDirection, SequenceResult, WebAction};
use crate::actions::conditions::{ConditionEvaluator, WebCondition};
use crate::core::surface::{js_string, script_value_text};
use crate::core::{ExecutorConfig, PageElement, PageSurface};
use crate::errors::{AgentError, Result};
use crate::types::WebState;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs `WebAction`s against a page surface.
///
/// Nothing here returns an error to the caller: every surface fault ends up
/// in the `error` field of an `ActionResult`.
pub struct ActionExecutor<S: PageSurface> {
    surface: Arc<S>,
    config: ExecutorConfig,
}

impl<S: PageSurface> ActionExecutor<S> {
    pub fn new(surface: Arc<S>) -> Self {
        Self::with_config(surface, ExecutorConfig::default())
    }

    pub fn with_config(surface: Arc<S>, config: ExecutorConfig) -> Self {
        Self { surface, config }
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub async fn execute_action(&self, action: &WebAction) -> ActionResult {
        let start_time = Instant::now();
        debug!("Executing {} action", action.name());

        let result = match Self::validate(action) {
            Ok(()) => self.dispatch(action).await,
            Err(e) => Err(e),
        };

        let elapsed = start_time.elapsed().as_millis() as u64;
        match result {
            // Navigation reports its own load time
            Ok(result) if result.execution_time_ms > 0 => result,
            Ok(result) => result.with_execution_time(elapsed),
            Err(e) => {
                if e.is_surface_fault() {
                    warn!("{} action hit a surface fault: {}", action.name(), e);
                } else {
                    debug!("{} action failed: {}", action.name(), e);
                }
                ActionResult::failure(e.to_string()).with_execution_time(elapsed)
            }
        }
    }

    /// Run actions one after another, stopping at the first failure.
    pub async fn execute_sequence(&self, actions: &[WebAction]) -> SequenceResult {
        let start_time = Instant::now();
        let mut results = Vec::with_capacity(actions.len());
        let mut failed_at = None;

        for (index, action) in actions.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.settle_delay()).await;
            }

            debug!("Sequence step {}/{}: {}", index + 1, actions.len(), action.name());
            let result = self.execute_action(action).await;
            let success = result.success;
            results.push(result);

            if !success {
                warn!("Sequence halted at step {} ({})", index, action.name());
                failed_at = Some(index);
                break;
            }
        }

        SequenceResult {
            overall_success: failed_at.is_none(),
            completed_actions: results.iter().filter(|r| r.success).count(),
            total_actions: actions.len(),
            results,
            total_execution_time_ms: start_time.elapsed().as_millis() as u64,
            failed_at,
        }
    }

    /// Poll until the condition holds or `timeout` elapses.
    pub async fn wait_for_condition(&self, condition: &WebCondition, timeout: Duration) -> bool {
        let start_time = Instant::now();

        loop {
            if ConditionEvaluator::evaluate(self.surface.as_ref(), condition).await {
                return true;
            }
            if start_time.elapsed() >= timeout {
                debug!("Condition {:?} not met within {:?}", condition, timeout);
                return false;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Retry with linear backoff. Never runs the action more than `max_attempts` times.
    pub async fn retry_action(&self, action: &WebAction, max_attempts: u32) -> ActionResult {
        let mut last_result = None;

        for attempt in 1..=max_attempts {
            let result = self.execute_action(action).await;
            if result.success {
                if attempt > 1 {
                    info!("{} action succeeded on attempt {}", action.name(), attempt);
                }
                return result;
            }

            warn!(
                "{} action failed (attempt {}/{}): {}",
                action.name(),
                attempt,
                max_attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
            last_result = Some(result);

            if attempt < max_attempts {
                tokio::time::sleep(self.config.backoff_for(attempt)).await;
            }
        }

        last_result.unwrap_or_else(|| ActionResult::failure("All retry attempts failed"))
    }

    pub async fn capture_state(&self) -> WebState {
        let url = self.surface.current_url().await.unwrap_or_else(|e| {
            warn!("Could not read current URL: {}", e);
            String::new()
        });
        let title = self.surface.page_title().await.unwrap_or_default();
        let ready_state = match self.surface.execute_script("document.readyState").await {
            Ok(Value::String(state)) => state,
            Ok(_) | Err(_) => "unknown".to_string(),
        };

        WebState::new(url, title, ready_state)
    }

    pub async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn validate(action: &WebAction) -> Result<()> {
        if let Some(selector) = action.target_selector() {
            if selector.trim().is_empty() {
                return Err(AgentError::ValidationFailure(format!(
                    "{} requires a selector",
                    action.name()
                )));
            }
        }

        match action {
            WebAction::Navigate { url } => url::Url::parse(url)
                .map(|_| ())
                .map_err(|e| AgentError::ValidationFailure(format!("bad URL '{}': {}", url, e))),
            WebAction::ExtractData { selectors } => {
                match selectors.iter().find(|(_, selector)| selector.trim().is_empty()) {
                    Some((field, _)) => Err(AgentError::ValidationFailure(format!(
                        "field '{}' has an empty selector",
                        field
                    ))),
                    None => Ok(()),
                }
            }
            WebAction::ExecuteScript { script, .. } if script.trim().is_empty() => Err(
                AgentError::ValidationFailure("script must not be empty".to_string()),
            ),
            WebAction::Click { .. }
            | WebAction::Type { .. }
            | WebAction::Scroll { .. }
            | WebAction::Upload { .. }
            | WebAction::Select { .. }
            | WebAction::Wait { .. }
            | WebAction::ExecuteScript { .. }
            | WebAction::TakeScreenshot { .. } => Ok(()),
        }
    }

    async fn dispatch(&self, action: &WebAction) -> Result<ActionResult> {
        match action {
            WebAction::Click { selector } => self.click(selector).await,
            WebAction::Type {
                selector,
                text,
                clear,
                press_enter,
            } => self.type_text(selector, text, *clear, *press_enter).await,
            WebAction::Navigate { url } => self.navigate(url).await,
            WebAction::Scroll { direction, amount } => self.scroll(*direction, *amount).await,
            WebAction::Upload {
                selector,
                file_path,
                ..
            } => self.upload(selector, file_path).await,
            WebAction::Select {
                selector,
                option,
                by_value,
            } => self.select(selector, option, *by_value).await,
            WebAction::Wait {
                condition,
                timeout_ms,
            } => Ok(self.wait(condition, *timeout_ms).await),
            WebAction::ExtractData { selectors } => self.extract_data(selectors).await,
            WebAction::ExecuteScript {
                script,
                return_value,
            } => {
                let value = self.surface.execute_script(script).await?;
                if *return_value {
                    Ok(ActionResult::success(value))
                } else {
                    Ok(ActionResult::success("Script executed"))
                }
            }
            WebAction::TakeScreenshot { .. } => {
                let bytes = self.surface.capture_screenshot().await?;
                Ok(ActionResult::success("Screenshot captured").with_screenshot(bytes))
            }
        }
    }

    async fn require_element(&self, selector: &str) -> Result<S::Element> {
        self.surface
            .find_element(selector)
            .await?
            .ok_or_else(|| AgentError::ElementNotFound(selector.to_string()))
    }

    async fn click(&self, selector: &str) -> Result<ActionResult> {
        let element = self.require_element(selector).await?;
        element.click().await?;
        Ok(ActionResult::success("Element clicked successfully"))
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        clear: bool,
        press_enter: bool,
    ) -> Result<ActionResult> {
        let element = self.require_element(selector).await?;
        if clear {
            element.clear().await?;
        }
        element.type_text(text).await?;
        if press_enter {
            element.type_text("\n").await?;
        }
        Ok(ActionResult::success(text))
    }

    async fn navigate(&self, url: &str) -> Result<ActionResult> {
        let navigation = self.surface.navigate_to(url).await?;
        info!(
            "Navigated to {} (success: {}, {}ms)",
            navigation.final_url, navigation.success, navigation.load_time_ms
        );

        Ok(ActionResult {
            success: navigation.success,
            data: Some(Value::String(navigation.final_url)),
            error: navigation.error,
            execution_time_ms: navigation.load_time_ms,
            screenshot: None,
        })
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> Result<ActionResult> {
        let (dx, dy) = direction.offsets(amount);
        self.surface
            .execute_script(&format!("window.scrollBy({}, {});", dx, dy))
            .await?;
        Ok(ActionResult::success(format!(
            "Scrolled {:?} by {}",
            direction, amount
        )))
    }

    async fn upload(&self, selector: &str, file_path: &str) -> Result<ActionResult> {
        self.require_element(selector).await?;

        // Simulated only: the surface has no file-injection capability.
        let script = format!(
            r#"
            (function() {{
                const element = document.querySelector({});
                if (element && element.type === 'file') {{
                    element.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return true;
                }}
                return false;
            }})()
        "#,
            js_string(selector)
        );
        self.surface.execute_script(&script).await?;

        Ok(ActionResult::success(format!(
            "File upload initiated: {}",
            file_path
        )))
    }

    async fn select(&self, selector: &str, option: &str, by_value: bool) -> Result<ActionResult> {
        self.require_element(selector).await?;

        let script = format!(
            r#"
            (function() {{
                const element = document.querySelector({});
                if (!element || element.tagName !== 'SELECT') return false;
                const wanted = {};
                const match = Array.from(element.options).find(o => {});
                if (!match) return false;
                element.value = match.value;
                element.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
        "#,
            js_string(selector),
            js_string(option),
            if by_value {
                "o.value === wanted"
            } else {
                "o.text.trim() === wanted"
            }
        );

        let selected = self.surface.execute_script(&script).await?;
        if script_value_text(&selected) == "false" {
            return Ok(ActionResult::failure(format!(
                "Option '{}' not available in {}",
                option, selector
            )));
        }

        Ok(ActionResult::success(format!("Selected option: {}", option)))
    }

    async fn wait(&self, condition: &Condition, timeout_ms: u64) -> ActionResult {
        let web_condition = WebCondition::from(condition);
        if self
            .wait_for_condition(&web_condition, Duration::from_millis(timeout_ms))
            .await
        {
            ActionResult::success("Condition met")
        } else {
            ActionResult {
                success: false,
                data: Some(Value::String("Condition timeout".to_string())),
                error: Some(
                    AgentError::Timeout(format!(
                        "{:?} not met within {}ms",
                        condition.condition_type, timeout_ms
                    ))
                    .to_string(),
                ),
                ..Default::default()
            }
        }
    }

    async fn extract_data(&self, selectors: &BTreeMap<String, String>) -> Result<ActionResult> {
        let mut extracted = Map::new();

        for (field, selector) in selectors {
            let text = match self.surface.find_element(selector).await? {
                Some(element) => element.text().await?,
                None => String::new(),
            };
            extracted.insert(field.clone(), json!(text));
        }

        Ok(ActionResult::success(Value::Object(extracted)))
    }
}
