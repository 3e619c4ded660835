use crate::core::{PageElement, PageSurface};
use crate::errors::{AgentError, Result};
use crate::types::{ElementRect, NavigationResult};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Something an `HtmlPageSurface` element was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Click(String),
    Type(String, String),
    Clear(String),
}

/// Offline page surface over registered HTML documents.
///
/// Navigation loads a copy of the registered document, so replacing a page
/// with `add_page` shows up on the next navigation. Scripts are not
/// evaluated; they return whatever `set_script_result` registered (or null).
#[derive(Clone, Default)]
pub struct HtmlPageSurface {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pages: RwLock<HashMap<String, String>>,
    current: RwLock<Option<LoadedPage>>,
    script_results: RwLock<HashMap<String, Value>>,
    executed_scripts: RwLock<Vec<String>>,
    interactions: Arc<RwLock<Vec<Interaction>>>,
    screenshot: RwLock<Vec<u8>>,
    navigations: AtomicUsize,
}

struct LoadedPage {
    url: String,
    document: String,
}

impl HtmlPageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the document served for `url`.
    pub async fn add_page(&self, url: &str, html: &str) {
        self.inner
            .pages
            .write()
            .await
            .insert(url.to_string(), html.to_string());
    }

    pub async fn remove_page(&self, url: &str) {
        self.inner.pages.write().await.remove(url);
    }

    pub async fn set_script_result(&self, script: &str, value: Value) {
        self.inner
            .script_results
            .write()
            .await
            .insert(script.to_string(), value);
    }

    pub async fn set_screenshot(&self, bytes: Vec<u8>) {
        *self.inner.screenshot.write().await = bytes;
    }

    pub async fn interactions(&self) -> Vec<Interaction> {
        self.inner.interactions.read().await.clone()
    }

    pub async fn executed_scripts(&self) -> Vec<String> {
        self.inner.executed_scripts.read().await.clone()
    }

    /// Navigations attempted, successful or not
    pub fn navigation_count(&self) -> usize {
        self.inner.navigations.load(Ordering::SeqCst)
    }

    async fn current_document(&self) -> Result<String> {
        self.inner
            .current
            .read()
            .await
            .as_ref()
            .map(|page| page.document.clone())
            .ok_or_else(|| AgentError::SurfaceFault("no page loaded".to_string()))
    }

    async fn select(&self, selector: &str) -> Result<Vec<HtmlElement>> {
        let document = self.current_document().await?;
        let snapshots = select_snapshots(&document, selector)?;

        Ok(snapshots
            .into_iter()
            .map(|snapshot| HtmlElement {
                selector: selector.to_string(),
                snapshot,
                interactions: self.inner.interactions.clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
struct ElementSnapshot {
    tag_name: String,
    text: String,
    attributes: HashMap<String, String>,
}

// Html is !Send, so parsing stays inside this synchronous helper.
fn select_snapshots(document: &str, selector: &str) -> Result<Vec<ElementSnapshot>> {
    let parsed = Selector::parse(selector)
        .map_err(|e| AgentError::InvalidSelector(format!("{}: {:?}", selector, e)))?;
    let html = Html::parse_document(document);

    Ok(html
        .select(&parsed)
        .map(|element| ElementSnapshot {
            tag_name: element.value().name().to_string(),
            text: element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
            attributes: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
        .collect())
}

#[async_trait]
impl PageSurface for HtmlPageSurface {
    type Element = HtmlElement;

    async fn navigate_to(&self, url: &str) -> Result<NavigationResult> {
        self.inner.navigations.fetch_add(1, Ordering::SeqCst);

        let document = self.inner.pages.read().await.get(url).cloned();
        let Some(document) = document else {
            return Ok(NavigationResult::failed(
                url,
                format!("No document registered for {}", url),
                0,
            )
            .with_status(404));
        };

        *self.inner.current.write().await = Some(LoadedPage {
            url: url.to_string(),
            document,
        });
        Ok(NavigationResult::loaded(url, 0).with_status(200))
    }

    async fn find_element(&self, selector: &str) -> Result<Option<Self::Element>> {
        Ok(self.select(selector).await?.into_iter().next())
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<Self::Element>> {
        self.select(selector).await
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        self.inner
            .executed_scripts
            .write()
            .await
            .push(script.to_string());

        Ok(self
            .inner
            .script_results
            .read()
            .await
            .get(script)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.inner.screenshot.read().await.clone())
    }

    async fn page_content(&self) -> Result<String> {
        self.current_document().await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .inner
            .current
            .read()
            .await
            .as_ref()
            .map(|page| page.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn page_title(&self) -> Result<String> {
        let document = self.current_document().await?;
        Ok(select_snapshots(&document, "title")?
            .into_iter()
            .next()
            .map(|title| title.text)
            .unwrap_or_default())
    }
}

/// Element of an `HtmlPageSurface`, captured when it was found.
pub struct HtmlElement {
    selector: String,
    snapshot: ElementSnapshot,
    interactions: Arc<RwLock<Vec<Interaction>>>,
}

#[async_trait]
impl PageElement for HtmlElement {
    async fn click(&self) -> Result<()> {
        self.interactions
            .write()
            .await
            .push(Interaction::Click(self.selector.clone()));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.interactions
            .write()
            .await
            .push(Interaction::Type(self.selector.clone(), text.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.interactions
            .write()
            .await
            .push(Interaction::Clear(self.selector.clone()));
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        Ok(self.snapshot.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        Ok(self.snapshot.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> Result<bool> {
        let hidden = self.snapshot.attributes.contains_key("hidden");
        let display_none = self
            .snapshot
            .attributes
            .get("style")
            .map(|style| style.replace(' ', "").contains("display:none"))
            .unwrap_or(false);
        Ok(!hidden && !display_none)
    }

    async fn is_enabled(&self) -> Result<bool> {
        Ok(!self.snapshot.attributes.contains_key("disabled"))
    }

    async fn tag_name(&self) -> Result<String> {
        Ok(self.snapshot.tag_name.clone())
    }

    async fn rect(&self) -> Result<ElementRect> {
        Ok(ElementRect::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://news.test/";
    const PAGE: &str = r#"
        <html><head><title> Front Page </title></head><body>
            <h2 class="headline">First   story</h2>
            <h2 class="headline" style="display: none">Second story</h2>
            <a href="/more">More</a>
        </body></html>"#;

    #[tokio::test]
    async fn finds_elements_in_document_order() {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, PAGE).await;
        assert!(surface.navigate_to(URL).await.unwrap().success);

        let headlines = surface.find_elements(".headline").await.unwrap();
        assert_eq!(headlines.len(), 2);
        assert_eq!(headlines[0].text().await.unwrap(), "First story");
        assert!(headlines[0].is_visible().await.unwrap());
        assert!(!headlines[1].is_visible().await.unwrap());
        assert_eq!(headlines[0].tag_name().await.unwrap(), "h2");

        let link = surface.find_element("a").await.unwrap().unwrap();
        assert_eq!(link.attribute("href").await.unwrap().as_deref(), Some("/more"));
        assert_eq!(surface.page_title().await.unwrap(), "Front Page");
    }

    #[tokio::test]
    async fn unknown_url_fails_navigation_without_moving() {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, PAGE).await;
        surface.navigate_to(URL).await.unwrap();

        let result = surface.navigate_to("https://news.test/404").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(surface.current_url().await.unwrap(), URL);
        assert_eq!(surface.navigation_count(), 2);
    }

    #[tokio::test]
    async fn replaced_pages_show_up_on_next_navigation() {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, PAGE).await;
        surface.navigate_to(URL).await.unwrap();

        surface.add_page(URL, "<html><body><h2 class=\"headline\">Update</h2></body></html>").await;
        assert_eq!(surface.find_elements(".headline").await.unwrap().len(), 2);

        surface.navigate_to(URL).await.unwrap();
        let headlines = surface.find_elements(".headline").await.unwrap();
        assert_eq!(headlines.len(), 1);
        assert_eq!(headlines[0].text().await.unwrap(), "Update");
    }

    #[tokio::test]
    async fn reads_before_navigation_are_faults() {
        let surface = HtmlPageSurface::new();
        assert!(surface.find_element("a").await.is_err());
        assert_eq!(surface.current_url().await.unwrap(), "about:blank");
    }

    #[tokio::test]
    async fn invalid_selector_is_reported() {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, PAGE).await;
        surface.navigate_to(URL).await.unwrap();
        assert!(matches!(
            surface.find_elements("h2[").await,
            Err(AgentError::InvalidSelector(_))
        ));
    }
}
