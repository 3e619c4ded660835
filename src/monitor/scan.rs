use super::types::{
    DataSchema, ExtractedValue, ScanConfig, ScanPerformance, ScanResult, ScannedElement,
    SchemaField, StructuredDataResult,
};
use crate::core::{PageElement, PageSurface};
use crate::errors::{AgentError, Result};
use chrono::Utc;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Scanned when a `ScanConfig` names no selectors.
pub const DEFAULT_SCAN_SELECTORS: &[&str] = &[
    "h1",
    "h2",
    "h3",
    "p",
    "a",
    "button",
    "input",
    "form",
    ".price",
    ".availability",
];

/// Attributes copied into every `ScannedElement`
const CAPTURED_ATTRIBUTES: &[&str] = &["class", "id"];

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]").expect("static pattern"))
}

/// Schema field name for a selector: every non-alphanumeric becomes `_`.
pub fn field_name(selector: &str) -> String {
    field_name_pattern().replace_all(selector, "_").into_owned()
}

/// Takes structural snapshots of pages.
///
/// The surface has a single current page, so every scan holds `page_lock`
/// from navigation until the last element is read.
pub struct ScanEngine<S: PageSurface> {
    surface: Arc<S>,
    page_lock: Mutex<()>,
}

impl<S: PageSurface> ScanEngine<S> {
    pub fn new(surface: Arc<S>) -> Self {
        Self {
            surface,
            page_lock: Mutex::new(()),
        }
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    /// Navigate to `url` and snapshot every element matching the configured
    /// selectors. Faults and timeouts come back as `success == false`.
    ///
    /// The timeout is only checked when the surface yields. A blocking surface
    /// such as `ChromePageSurface` is bounded by its tab's default timeout
    /// instead.
    pub async fn scan_page(&self, url: &str, config: &ScanConfig) -> ScanResult {
        let _page = self.page_lock.lock().await;
        let start_time = Instant::now();

        let outcome = tokio::time::timeout(config.timeout(), self.perform_scan(url, config)).await;
        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(mut result)) => {
                result.performance.scan_duration_ms = elapsed_ms;
                debug!(
                    "Scanned {}: {} elements in {}ms",
                    url, result.performance.elements_scanned, elapsed_ms
                );
                result
            }
            Ok(Err(e)) => {
                warn!("Scan of {} failed: {}", url, e);
                ScanResult::failed(url, e.to_string(), elapsed_ms)
            }
            Err(_) => {
                let e = AgentError::Timeout(format!("scan of {} after {}ms", url, config.timeout_ms));
                warn!("{}", e);
                ScanResult::failed(url, e.to_string(), elapsed_ms)
            }
        }
    }

    async fn perform_scan(&self, url: &str, config: &ScanConfig) -> Result<ScanResult> {
        let navigation = self.surface.navigate_to(url).await?;
        if !navigation.success {
            let error = navigation
                .error
                .unwrap_or_else(|| format!("Navigation to {} failed", url));
            return Ok(ScanResult::failed(url, error, navigation.load_time_ms));
        }

        let selectors: Vec<&str> = if config.selectors.is_empty() {
            DEFAULT_SCAN_SELECTORS.to_vec()
        } else {
            config.selectors.iter().map(String::as_str).collect()
        };

        let mut elements = Vec::new();
        for selector in selectors {
            for element in self.surface.find_elements(selector).await? {
                elements.push(Self::capture(selector, &element).await?);
            }
        }

        Ok(ScanResult {
            url: url.to_string(),
            timestamp: Utc::now(),
            success: true,
            performance: ScanPerformance {
                scan_duration_ms: 0,
                elements_scanned: elements.len(),
                changes_detected: 0,
            },
            elements,
            error: None,
        })
    }

    async fn capture(selector: &str, element: &S::Element) -> Result<ScannedElement> {
        let mut attributes = HashMap::new();
        for name in CAPTURED_ATTRIBUTES {
            if let Some(value) = element.attribute(name).await? {
                attributes.insert(name.to_string(), value);
            }
        }

        Ok(ScannedElement {
            selector: selector.to_string(),
            tag_name: element.tag_name().await?,
            text: Some(element.text().await?),
            attributes,
            is_visible: element.is_visible().await?,
            bounds: element.rect().await?,
        })
    }

    /// Pull the non-blank texts of each selector from `url`.
    ///
    /// One text yields a scalar field, several a list; selectors with no
    /// text are left out of both the data and the schema.
    pub async fn extract_structured_data(
        &self,
        url: &str,
        selectors: &[String],
    ) -> StructuredDataResult {
        let _page = self.page_lock.lock().await;

        match self.perform_extraction(url, selectors).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Extraction from {} failed: {}", url, e);
                StructuredDataResult::empty(url)
            }
        }
    }

    async fn perform_extraction(
        &self,
        url: &str,
        selectors: &[String],
    ) -> Result<StructuredDataResult> {
        let navigation = self.surface.navigate_to(url).await?;
        if !navigation.success {
            return Ok(StructuredDataResult::empty(url));
        }

        let mut data = BTreeMap::new();
        let mut fields = Vec::new();

        for selector in selectors {
            let mut values = Vec::new();
            for element in self.surface.find_elements(selector).await? {
                let text = element.text().await?;
                if !text.trim().is_empty() {
                    values.push(text);
                }
            }

            let (value, field_type) = match values.len() {
                0 => continue,
                1 => (ExtractedValue::Single(values.remove(0)), "string"),
                _ => (ExtractedValue::List(values), "array"),
            };

            data.insert(selector.clone(), value);
            fields.push(SchemaField {
                name: field_name(selector),
                field_type: field_type.to_string(),
                selector: selector.clone(),
                required: false,
            });
        }

        let confidence = if data.is_empty() { 0.0 } else { 0.8 };
        let schema = (!fields.is_empty()).then(|| DataSchema::extracted(fields));

        Ok(StructuredDataResult {
            url: url.to_string(),
            timestamp: Utc::now(),
            success: true,
            data,
            schema,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::HtmlPageSurface;
    use crate::testing::{FlakySurface, TestHelper};

    const URL: &str = "https://shop.test/item";

    async fn engine_with(html: &str) -> ScanEngine<HtmlPageSurface> {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, html).await;
        ScanEngine::new(Arc::new(surface))
    }

    #[test]
    fn field_names_replace_non_alphanumerics() {
        assert_eq!(field_name(".price > span"), "_price___span");
        assert_eq!(field_name("h1"), "h1");
    }

    #[tokio::test]
    async fn scans_configured_selectors_in_match_order() {
        let engine = engine_with(&TestHelper::listing_page(3, "$10.00")).await;
        let result = engine
            .scan_page(URL, &ScanConfig::with_selectors([".item", ".price"]))
            .await;

        assert!(result.success);
        assert_eq!(result.performance.elements_scanned, 4);
        assert_eq!(TestHelper::count_elements_by_selector(&result, ".item"), 3);
        assert_eq!(TestHelper::count_elements_by_selector(&result, ".price"), 1);
        assert_eq!(TestHelper::find_elements_with_text(&result, "item 2").len(), 1);
        let texts: Vec<_> = result
            .elements
            .iter()
            .map(|e| e.text.clone().unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["Item 1", "Item 2", "Item 3", "$10.00"]);
        assert_eq!(result.elements[0].tag_name, "li");
        assert_eq!(result.elements[0].attributes.get("class").map(String::as_str), Some("item"));
    }

    #[tokio::test]
    async fn empty_config_uses_default_selectors() {
        let engine = engine_with(
            "<html><body><h1>Deal</h1><p>Body</p><span class=\"availability\">In stock</span></body></html>",
        )
        .await;
        let result = engine.scan_page(URL, &ScanConfig::default()).await;

        let selectors: Vec<_> = result.elements.iter().map(|e| e.selector.as_str()).collect();
        assert_eq!(selectors, vec!["h1", "p", ".availability"]);
    }

    #[tokio::test]
    async fn failed_navigation_yields_unsuccessful_scan() {
        let engine = engine_with("<html></html>").await;
        let result = engine
            .scan_page("https://shop.test/missing", &ScanConfig::default())
            .await;

        assert!(!result.success);
        assert!(result.elements.is_empty());
        assert!(result.error.unwrap().contains("No document registered"));
    }

    #[tokio::test]
    async fn surface_faults_are_absorbed() {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, "<html><body><h1>x</h1></body></html>").await;
        let engine = ScanEngine::new(Arc::new(FlakySurface::new(surface).failing_navigations(1)));

        let first = engine.scan_page(URL, &ScanConfig::default()).await;
        assert!(!first.success);
        assert!(first.error.unwrap().contains("injected"));

        assert!(engine.scan_page(URL, &ScanConfig::default()).await.success);
    }

    #[tokio::test]
    async fn extraction_builds_scalar_and_list_fields() {
        let engine = engine_with(
            r#"<html><body>
                <h1>Lamp</h1>
                <li class="tag">desk</li><li class="tag">  </li><li class="tag">led</li>
            </body></html>"#,
        )
        .await;
        let selectors = vec!["h1".to_string(), ".tag".to_string(), ".missing".to_string()];
        let result = engine.extract_structured_data(URL, &selectors).await;

        assert!(result.success);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.data["h1"], ExtractedValue::Single("Lamp".to_string()));
        assert_eq!(
            result.data[".tag"],
            ExtractedValue::List(vec!["desk".to_string(), "led".to_string()])
        );
        assert!(!result.data.contains_key(".missing"));

        let schema = result.schema.unwrap();
        assert_eq!(schema.schema_type, "extracted_data");
        assert_eq!(schema.version, "1.0");
        assert_eq!(schema.fields[1].name, "_tag");
        assert_eq!(schema.fields[1].field_type, "array");
    }

    #[tokio::test]
    async fn extraction_without_matches_has_zero_confidence() {
        let engine = engine_with("<html><body></body></html>").await;
        let result = engine
            .extract_structured_data(URL, &[".price".to_string()])
            .await;
        assert!(result.success);
        assert_eq!(result.confidence, 0.0);
        assert!(result.schema.is_none());

        let failed = engine
            .extract_structured_data("https://shop.test/gone", &[".price".to_string()])
            .await;
        assert!(!failed.success);
        assert!(failed.data.is_empty());
    }
}
