use crate::core::MonitoringConfig;
use crate::types::ElementRect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// What a single scan looks at. Empty `selectors` means the default set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(default = "default_scan_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_scan_timeout_ms() -> u64 {
    30000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            selectors: Vec::new(),
            timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl ScanConfig {
    pub fn with_selectors<I, T>(selectors: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl From<&MonitoringConfig> for ScanConfig {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            selectors: config.monitor_selectors.clone(),
            timeout_ms: config.timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedElement {
    /// The selector this element was matched by, not a unique path
    pub selector: String,
    pub tag_name: String,
    pub text: Option<String>,
    pub attributes: HashMap<String, String>,
    pub is_visible: bool,
    pub bounds: ElementRect,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanPerformance {
    pub scan_duration_ms: u64,
    pub elements_scanned: usize,
    pub changes_detected: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub elements: Vec<ScannedElement>,
    pub performance: ScanPerformance,
    pub error: Option<String>,
}

impl ScanResult {
    pub fn failed(url: impl Into<String>, error: impl Into<String>, scan_duration_ms: u64) -> Self {
        Self {
            url: url.into(),
            timestamp: Utc::now(),
            success: false,
            elements: Vec::new(),
            performance: ScanPerformance {
                scan_duration_ms,
                ..ScanPerformance::default()
            },
            error: Some(error.into()),
        }
    }

    /// Elements grouped by selector, with selectors in first-seen order.
    pub fn grouped(&self) -> (Vec<&str>, HashMap<&str, Vec<&ScannedElement>>) {
        let mut order = Vec::new();
        let mut groups: HashMap<&str, Vec<&ScannedElement>> = HashMap::new();

        for element in &self.elements {
            let key = element.selector.as_str();
            groups
                .entry(key)
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(element);
        }

        (order, groups)
    }
}

/// A field value pulled out by `extract_structured_data`: one text or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedValue {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub selector: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub fields: Vec<SchemaField>,
    pub version: String,
}

impl DataSchema {
    pub fn extracted(fields: Vec<SchemaField>) -> Self {
        Self {
            schema_type: "extracted_data".to_string(),
            fields,
            version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDataResult {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Keyed by the selector the values came from
    pub data: BTreeMap<String, ExtractedValue>,
    pub schema: Option<DataSchema>,
    pub confidence: f64,
}

impl StructuredDataResult {
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timestamp: Utc::now(),
            success: false,
            data: BTreeMap::new(),
            schema: None,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    ContentChanged,
    ElementAdded,
    ElementRemoved,
    AttributeChanged,
    StyleChanged,
    StructureChanged,
    PriceChanged,
    AvailabilityChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub selector: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// In [0, 1]; higher means the values differ more
    pub confidence: f64,
}

impl Change {
    pub fn new(
        change_type: ChangeType,
        selector: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            change_type,
            selector: selector.into(),
            old_value,
            new_value,
            timestamp: Utc::now(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ContentChange,
    PriceDrop,
    AvailabilityChange,
    NewContent,
    ErrorDetected,
    ThresholdExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type,
            severity,
            title: title.into(),
            description: description.into(),
            url: url.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One item of a monitoring stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetectionResult {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<Change>,
    pub alerts: Vec<Alert>,
    pub confidence: f64,
}

impl ChangeDetectionResult {
    /// The first item of every stream: no changes, full confidence.
    pub fn baseline(url: impl Into<String>) -> Self {
        Self::from_changes(url, Vec::new(), Vec::new())
    }

    /// Confidence is the mean change confidence, 1.0 for no changes.
    pub fn from_changes(url: impl Into<String>, changes: Vec<Change>, alerts: Vec<Alert>) -> Self {
        let confidence = if changes.is_empty() {
            1.0
        } else {
            changes.iter().map(|c| c.confidence).sum::<f64>() / changes.len() as f64
        };

        Self {
            url: url.into(),
            timestamp: Utc::now(),
            changes,
            alerts,
            confidence,
        }
    }

    /// A failed tick, reported as a single ERROR_DETECTED alert.
    pub fn error(url: impl Into<String>, message: impl AsRef<str>) -> Self {
        let url = url.into();
        let alert = Alert::new(
            AlertType::ErrorDetected,
            AlertSeverity::Medium,
            "Monitoring Error",
            format!("Error during monitoring: {}", message.as_ref()),
            url.clone(),
        );

        Self {
            url,
            timestamp: Utc::now(),
            changes: Vec::new(),
            alerts: vec![alert],
            confidence: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.alerts
            .iter()
            .any(|a| a.alert_type == AlertType::ErrorDetected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub id: String,
    pub url: String,
    pub config: MonitoringConfig,
    pub start_time: DateTime<Utc>,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub state: SessionState,
    pub total_scans: u64,
    pub changes_detected: u64,
    pub alerts_generated: u64,
    pub failed_scans: u64,
}

impl MonitoringSession {
    pub fn new(url: impl Into<String>, config: MonitoringConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            config,
            start_time: Utc::now(),
            last_scan_time: None,
            is_active: true,
            state: SessionState::Starting,
            total_scans: 0,
            changes_detected: 0,
            alerts_generated: 0,
            failed_scans: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHelper;

    #[test]
    fn grouping_keeps_first_seen_selector_order() {
        let scan = TestHelper::scan_of(
            "https://shop.test/",
            &[(".price", "$1"), ("h1", "Title"), (".price", "$2")],
        );
        let (order, groups) = scan.grouped();

        assert_eq!(order, vec![".price", "h1"]);
        assert_eq!(groups[".price"].len(), 2);
        assert_eq!(groups[".price"][1].text.as_deref(), Some("$2"));
    }

    #[test]
    fn detection_confidence_is_the_mean() {
        let changes = vec![
            Change::new(ChangeType::ContentChanged, "p", None, None, 0.2),
            Change::new(ChangeType::ContentChanged, "p", None, None, 0.6),
        ];
        let result = ChangeDetectionResult::from_changes("u", changes, Vec::new());
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(ChangeDetectionResult::baseline("u").confidence, 1.0);
    }

    #[test]
    fn error_result_carries_one_medium_alert() {
        let result = ChangeDetectionResult::error("https://shop.test/", "boom");
        assert!(result.is_error());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.alerts[0].severity, AlertSeverity::Medium);
        assert!(result.alerts[0].description.contains("boom"));
    }

    #[test]
    fn change_confidence_is_clamped() {
        assert_eq!(Change::new(ChangeType::PriceChanged, "p", None, None, 1.7).confidence, 1.0);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
    }

    #[test]
    fn scan_config_follows_monitoring_config() {
        let monitoring = MonitoringConfig {
            monitor_selectors: vec![".price".to_string()],
            timeout_ms: 500,
            ..MonitoringConfig::default()
        };
        let scan = ScanConfig::from(&monitoring);
        assert_eq!(scan.selectors, vec![".price"]);
        assert_eq!(scan.timeout(), Duration::from_millis(500));
    }
}
