use crate::actions::base::{Condition, ConditionType};
use crate::core::surface::{js_string, script_value_text};
use crate::core::{PageElement, PageSurface};
use crate::errors::Result;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const PAGE_LOADED_SCRIPT: &str = "document.readyState === 'complete'";

/// Predicates the executor can poll for.
#[derive(Debug, Clone, PartialEq)]
pub enum WebCondition {
    ElementExists(String),
    ElementVisible(String),
    ElementClickable(String),
    TextPresent(String),
    UrlContains(String),
    PageLoaded { timeout: Duration },
    CustomScript { script: String, expected: Value },
}

impl WebCondition {
    pub fn page_loaded() -> Self {
        WebCondition::PageLoaded {
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Condition> for WebCondition {
    fn from(condition: &Condition) -> Self {
        let selector = || condition.selector.clone().unwrap_or_else(|| "body".to_string());
        let expected = || condition.expected_value.clone().unwrap_or_default();

        match condition.condition_type {
            ConditionType::ElementExists => WebCondition::ElementExists(selector()),
            ConditionType::ElementVisible => WebCondition::ElementVisible(selector()),
            ConditionType::ElementClickable => WebCondition::ElementClickable(selector()),
            ConditionType::PageLoaded => WebCondition::page_loaded(),
            ConditionType::UrlContains => WebCondition::UrlContains(expected()),
            ConditionType::TextPresent => WebCondition::TextPresent(expected()),
            ConditionType::FormFieldFilled => WebCondition::CustomScript {
                script: format!(
                    "(function() {{ const el = document.querySelector({}); return !!el && el.value !== ''; }})()",
                    js_string(&selector())
                ),
                expected: Value::Bool(true),
            },
        }
    }
}

/// Stateless, single-shot condition checks against a page surface.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluate once. Any surface fault reads as "not satisfied".
    pub async fn evaluate<S: PageSurface>(surface: &S, condition: &WebCondition) -> bool {
        match Self::check(surface, condition).await {
            Ok(satisfied) => satisfied,
            Err(e) => {
                debug!("Condition {:?} not satisfied: {}", condition, e);
                false
            }
        }
    }

    async fn check<S: PageSurface>(surface: &S, condition: &WebCondition) -> Result<bool> {
        match condition {
            WebCondition::ElementExists(selector) => {
                Ok(surface.find_element(selector).await?.is_some())
            }
            WebCondition::ElementVisible(selector) => match surface.find_element(selector).await? {
                Some(element) => element.is_visible().await,
                None => Ok(false),
            },
            WebCondition::ElementClickable(selector) => {
                match surface.find_element(selector).await? {
                    Some(element) => Ok(element.is_visible().await? && element.is_enabled().await?),
                    None => Ok(false),
                }
            }
            WebCondition::TextPresent(text) => {
                let content = surface.page_content().await?;
                Ok(content.to_lowercase().contains(&text.to_lowercase()))
            }
            WebCondition::UrlContains(part) => {
                let url = surface.current_url().await?;
                Ok(url.to_lowercase().contains(&part.to_lowercase()))
            }
            WebCondition::PageLoaded { .. } => {
                let value = surface.execute_script(PAGE_LOADED_SCRIPT).await?;
                Ok(script_value_text(&value) == "true")
            }
            WebCondition::CustomScript { script, expected } => {
                let value = surface.execute_script(script).await?;
                Ok(&value == expected)
            }
        }
    }
}
