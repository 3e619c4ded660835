//! Test doubles and builders shared by unit and integration tests.

use crate::core::PageSurface;
use crate::errors::{AgentError, Result};
use crate::monitor::{ScanPerformance, ScanResult, ScannedElement};
use crate::types::{ElementRect, NavigationResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a surface and injects faults into it.
///
/// `failing_navigations(n)` makes the first `n` navigations return an error;
/// `failing_all_reads()` makes every non-navigation call fail.
pub struct FlakySurface<S> {
    inner: S,
    navigation_failures: AtomicUsize,
    fail_reads: bool,
    navigate_calls: AtomicUsize,
}

impl<S: PageSurface> FlakySurface<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            navigation_failures: AtomicUsize::new(0),
            fail_reads: false,
            navigate_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_navigations(self, count: usize) -> Self {
        self.navigation_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_all_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Navigations attempted through this wrapper, including injected failures
    pub fn navigate_calls(&self) -> usize {
        self.navigate_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn read_guard(&self) -> Result<()> {
        if self.fail_reads {
            Err(AgentError::surface("injected fault"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: PageSurface> PageSurface for FlakySurface<S> {
    type Element = S::Element;

    async fn navigate_to(&self, url: &str) -> Result<NavigationResult> {
        self.navigate_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.navigation_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.navigation_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AgentError::SurfaceFault(format!(
                "injected navigation fault for {}",
                url
            )));
        }
        self.inner.navigate_to(url).await
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Self::Element>> {
        self.read_guard()?;
        self.inner.find_element(selector).await
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>> {
        self.read_guard()?;
        self.inner.find_elements(selector).await
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        self.read_guard()?;
        self.inner.execute_script(script).await
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        self.read_guard()?;
        self.inner.capture_screenshot().await
    }

    async fn page_content(&self) -> Result<String> {
        self.read_guard()?;
        self.inner.page_content().await
    }

    async fn current_url(&self) -> Result<String> {
        self.read_guard()?;
        self.inner.current_url().await
    }

    async fn page_title(&self) -> Result<String> {
        self.read_guard()?;
        self.inner.page_title().await
    }
}

pub struct TestHelper;

impl TestHelper {
    /// A successful scan holding one element per `(selector, text)` pair, in order.
    pub fn scan_of(url: &str, elements: &[(&str, &str)]) -> ScanResult {
        let elements: Vec<ScannedElement> = elements
            .iter()
            .map(|(selector, text)| Self::element(selector, Some(text)))
            .collect();

        ScanResult {
            url: url.to_string(),
            timestamp: chrono::Utc::now(),
            success: true,
            performance: ScanPerformance {
                scan_duration_ms: 0,
                elements_scanned: elements.len(),
                changes_detected: 0,
            },
            elements,
            error: None,
        }
    }

    pub fn element(selector: &str, text: Option<&str>) -> ScannedElement {
        ScannedElement {
            selector: selector.to_string(),
            tag_name: "div".to_string(),
            text: text.map(str::to_string),
            attributes: HashMap::new(),
            is_visible: true,
            bounds: ElementRect::default(),
        }
    }

    pub fn count_elements_by_selector(scan: &ScanResult, selector: &str) -> usize {
        scan.elements
            .iter()
            .filter(|e| e.selector == selector)
            .count()
    }

    pub fn find_elements_with_text<'a>(scan: &'a ScanResult, text: &str) -> Vec<&'a ScannedElement> {
        scan.elements
            .iter()
            .filter(|e| {
                e.text
                    .as_ref()
                    .map(|t| t.to_lowercase().contains(&text.to_lowercase()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// A page with `count` elements of class `item` and the given price text.
    pub fn listing_page(count: usize, price: &str) -> String {
        let items: String = (0..count)
            .map(|i| format!("<li class=\"item\">Item {}</li>", i + 1))
            .collect();
        format!(
            "<html><head><title>Listing</title></head><body><ul>{}</ul><span class=\"price\">{}</span></body></html>",
            items, price
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::HtmlPageSurface;
    use tokio_test::{assert_err, assert_ok};

    const URL: &str = "https://shop.test/";

    async fn loaded_surface() -> HtmlPageSurface {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, &TestHelper::listing_page(2, "$4")).await;
        surface
    }

    #[tokio::test]
    async fn test_navigation_faults_run_out() {
        let flaky = FlakySurface::new(loaded_surface().await).failing_navigations(2);

        assert_err!(flaky.navigate_to(URL).await);
        assert_err!(flaky.navigate_to(URL).await);
        assert!(assert_ok!(flaky.navigate_to(URL).await).success);
        assert_eq!(flaky.navigate_calls(), 3);
        assert_eq!(flaky.inner().navigation_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_reads_leave_navigation_alone() {
        let flaky = FlakySurface::new(loaded_surface().await).failing_all_reads();

        assert!(flaky.navigate_to(URL).await.unwrap().success);
        let err = flaky.find_elements(".item").await.err().unwrap();
        assert!(err.to_string().contains("injected fault"));
        assert_err!(flaky.page_title().await);
    }

    #[test]
    fn test_scan_helpers() {
        let scan = TestHelper::scan_of(URL, &[(".item", "Red lamp"), (".item", "Blue"), ("h1", "Lamps")]);

        assert_eq!(TestHelper::count_elements_by_selector(&scan, ".item"), 2);
        assert_eq!(TestHelper::find_elements_with_text(&scan, "LAMP").len(), 2);
        assert_eq!(scan.performance.elements_scanned, 3);
    }
}
