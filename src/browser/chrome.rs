use crate::core::surface::{js_string, script_value_text};
use crate::core::{BrowserConfig, PageElement, PageSurface};
use crate::errors::{AgentError, Result};
use crate::types::{ElementRect, NavigationResult};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Page surface backed by a single headless Chrome tab.
///
/// Tab calls block the calling task until they finish or hit the tab's
/// default timeout (`navigation_timeout_ms`).
pub struct ChromePageSurface {
    // Dropping the browser closes the tab
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePageSurface {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if config.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| AgentError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| AgentError::LaunchFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AgentError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(config.navigation_timeout_ms));

        info!("Launched Chrome (headless: {})", config.headless);
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn evaluate(tab: &Tab, script: &str) -> Result<Value> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| AgentError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    fn match_count(&self, selector: &str) -> Result<usize> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        let count = Self::evaluate(&self.tab, &script)?;
        Ok(count.as_u64().unwrap_or(0) as usize)
    }
}

#[async_trait]
impl PageSurface for ChromePageSurface {
    type Element = ChromeElement;

    async fn navigate_to(&self, url: &str) -> Result<NavigationResult> {
        let start_time = Instant::now();

        let navigated = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated());
        let load_time_ms = start_time.elapsed().as_millis() as u64;

        match navigated {
            Ok(_) => {
                let final_url = self.tab.get_url();
                debug!("Loaded {} in {}ms", final_url, load_time_ms);
                Ok(NavigationResult::loaded(final_url, load_time_ms))
            }
            Err(e) => Ok(NavigationResult::failed(url, e.to_string(), load_time_ms)),
        }
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Self::Element>> {
        Ok(self.find_elements(selector).await?.into_iter().next())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>> {
        let count = self.match_count(selector)?;
        Ok((0..count)
            .map(|index| ChromeElement {
                tab: self.tab.clone(),
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        Self::evaluate(&self.tab, script)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| AgentError::ScreenshotFailed(e.to_string()))
    }

    async fn page_content(&self) -> Result<String> {
        let html = Self::evaluate(&self.tab, "document.documentElement.outerHTML")?;
        Ok(script_value_text(&html))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn page_title(&self) -> Result<String> {
        let title = Self::evaluate(&self.tab, "document.title")?;
        Ok(script_value_text(&title))
    }
}

/// The `index`-th match of `selector`, re-resolved on every call.
pub struct ChromeElement {
    tab: Arc<Tab>,
    selector: String,
    index: usize,
}

impl ChromeElement {
    /// Run `body` with `el` bound to this element; a vanished element is `ElementNotFound`.
    fn with_element(&self, body: &str) -> Result<Value> {
        let script = format!(
            r#"
            (function() {{
                const el = document.querySelectorAll({})[{}];
                if (!el) return JSON.stringify({{ missing: true }});
                return JSON.stringify({{ value: (function(el) {{ {} }})(el) }});
            }})()
        "#,
            js_string(&self.selector),
            self.index,
            body
        );

        // Objects do not come back by value, so the wrapper returns JSON text
        let raw = ChromePageSurface::evaluate(&self.tab, &script)?;
        let result: Value = serde_json::from_str(&script_value_text(&raw))?;
        if result.get("missing").and_then(Value::as_bool) == Some(true) {
            return Err(AgentError::ElementNotFound(format!(
                "{} [{}]",
                self.selector, self.index
            )));
        }
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageElement for ChromeElement {
    async fn click(&self) -> Result<()> {
        self.with_element("el.click(); return true;")?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.with_element(&format!(
            r#"
                el.focus();
                el.value = (el.value || '') + {};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            "#,
            js_string(text)
        ))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.with_element(
            r#"
                el.value = '';
                el.dispatchEvent(new Event('input', { bubbles: true }));
                el.dispatchEvent(new Event('change', { bubbles: true }));
                return true;
            "#,
        )?;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        let text = self.with_element("return (el.innerText || el.textContent || '').trim();")?;
        Ok(script_value_text(&text))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        let value = self.with_element(&format!("return el.getAttribute({});", js_string(name)))?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_visible(&self) -> Result<bool> {
        let visible = self.with_element(
            r#"
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return rect.width > 0 &&
                       rect.height > 0 &&
                       style.visibility !== 'hidden' &&
                       style.display !== 'none' &&
                       parseFloat(style.opacity) > 0;
            "#,
        )?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool> {
        let enabled = self.with_element("return !el.disabled;")?;
        Ok(enabled.as_bool().unwrap_or(true))
    }

    async fn tag_name(&self) -> Result<String> {
        let tag = self.with_element("return el.tagName.toLowerCase();")?;
        Ok(script_value_text(&tag))
    }

    async fn rect(&self) -> Result<ElementRect> {
        let rect = self.with_element(
            "const r = el.getBoundingClientRect(); return { x: r.x, y: r.y, width: r.width, height: r.height };",
        )?;
        Ok(serde_json::from_value(rect)?)
    }
}
