use super::types::{Alert, AlertSeverity, AlertType, Change, ChangeType, ScanResult, ScannedElement};
use crate::core::MonitoringConfig;
use regex::Regex;
use std::sync::OnceLock;

/// Confidence given to element count changes
const COUNT_CHANGE_CONFIDENCE: f64 = 0.9;

/// Compare two snapshots of the same page.
///
/// Selectors are visited in the current scan's order, then any selector that
/// only the previous scan had. Ignored selectors are skipped entirely.
pub fn detect_changes(
    previous: &ScanResult,
    current: &ScanResult,
    config: &MonitoringConfig,
) -> Vec<Change> {
    let (previous_order, previous_groups) = previous.grouped();
    let (current_order, current_groups) = current.grouped();

    let mut selectors = current_order;
    for selector in previous_order {
        if !current_groups.contains_key(selector) {
            selectors.push(selector);
        }
    }

    let mut changes = Vec::new();
    for selector in selectors {
        if config.ignore_selectors.iter().any(|s| s == selector) {
            continue;
        }

        let before: &[&ScannedElement] = previous_groups
            .get(selector)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let after: &[&ScannedElement] = current_groups
            .get(selector)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if before.len() != after.len() {
            let change_type = if after.len() > before.len() {
                ChangeType::ElementAdded
            } else {
                ChangeType::ElementRemoved
            };
            changes.push(Change::new(
                change_type,
                selector,
                Some(before.len().to_string()),
                Some(after.len().to_string()),
                COUNT_CHANGE_CONFIDENCE,
            ));
        }

        for (old, new) in before.iter().zip(after.iter()) {
            if old.text == new.text {
                continue;
            }
            changes.push(Change::new(
                classify(selector),
                selector,
                old.text.clone(),
                new.text.clone(),
                change_confidence(old.text.as_deref(), new.text.as_deref()),
            ));
        }
    }

    changes
}

fn classify(selector: &str) -> ChangeType {
    let selector = selector.to_lowercase();
    if selector.contains("price") {
        ChangeType::PriceChanged
    } else if selector.contains("availability") || selector.contains("stock") {
        ChangeType::AvailabilityChanged
    } else {
        ChangeType::ContentChanged
    }
}

/// How different two values are, in [0, 1]. A missing side scores 0.5.
pub fn change_confidence(old: Option<&str>, new: Option<&str>) -> f64 {
    match (old, new) {
        (Some(old), Some(new)) => (1.0 - similarity(old, new)).clamp(0.0, 1.0),
        _ => 0.5,
    }
}

/// `(max_len - edit_distance) / max_len` over characters; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    (longest - edit_distance(a, b)) as f64 / longest as f64
}

/// Levenshtein distance with unit costs, over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Derive alerts from changes. Nothing is produced unless `alert_on_change`.
///
/// Count changes produce no alert.
pub fn generate_alerts(changes: &[Change], config: &MonitoringConfig, url: &str) -> Vec<Alert> {
    if !config.alert_on_change {
        return Vec::new();
    }

    changes
        .iter()
        .filter_map(|change| alert_for(change, url))
        .collect()
}

fn alert_for(change: &Change, url: &str) -> Option<Alert> {
    let old = change.old_value.as_deref().unwrap_or("");
    let new = change.new_value.as_deref().unwrap_or("");

    match change.change_type {
        ChangeType::PriceChanged => {
            let severity = if is_price_decrease(change.old_value.as_deref(), change.new_value.as_deref()) {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            Some(Alert::new(
                AlertType::PriceDrop,
                severity,
                "Price Change Detected",
                format!("Price changed from {} to {}", old, new),
                url,
            ))
        }
        ChangeType::AvailabilityChanged => Some(Alert::new(
            AlertType::AvailabilityChange,
            AlertSeverity::High,
            "Availability Change",
            format!("Availability changed from {} to {}", old, new),
            url,
        )),
        ChangeType::ContentChanged => Some(Alert::new(
            AlertType::ContentChange,
            AlertSeverity::Low,
            "Content Updated",
            format!("Content changed in {}", change.selector),
            url,
        )),
        ChangeType::ElementAdded
        | ChangeType::ElementRemoved
        | ChangeType::AttributeChanged
        | ChangeType::StyleChanged
        | ChangeType::StructureChanged => None,
    }
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("static pattern"))
}

/// Leading number of a price text, with thousands separators removed.
pub fn extract_numeric_value(text: &str) -> Option<f64> {
    let text = text.replace(',', "");
    price_pattern()
        .find(&text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// True only when both values parse and the new one is lower.
pub fn is_price_decrease(old: Option<&str>, new: Option<&str>) -> bool {
    match (old.and_then(extract_numeric_value), new.and_then(extract_numeric_value)) {
        (Some(old), Some(new)) => new < old,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHelper;

    const URL: &str = "https://shop.test/item";

    fn config() -> MonitoringConfig {
        MonitoringConfig::default()
    }

    #[test]
    fn identical_scans_have_no_changes() {
        let scan = TestHelper::scan_of(URL, &[("h1", "Lamp"), (".price", "$10.00"), ("p", "")]);
        assert!(detect_changes(&scan, &scan.clone(), &config()).is_empty());
    }

    #[test]
    fn kitten_sitting() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("naïve", "naive"), 1);
        assert_eq!(similarity("", ""), 1.0);
        assert!((similarity("kitten", "sitting") - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn empty_texts_produce_no_change() {
        let before = TestHelper::scan_of(URL, &[("p", "")]);
        let after = TestHelper::scan_of(URL, &[("p", "")]);
        assert!(detect_changes(&before, &after, &config()).is_empty());
    }

    #[test]
    fn price_drop_is_high_severity() {
        let before = TestHelper::scan_of(URL, &[(".price", "$10.00")]);
        let after = TestHelper::scan_of(URL, &[(".price", "$8.00")]);

        let changes = detect_changes(&before, &after, &config());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::PriceChanged);
        assert_eq!(changes[0].old_value.as_deref(), Some("$10.00"));

        let alerts = generate_alerts(&changes, &config(), URL);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PriceDrop);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[0].url, URL);
    }

    #[test]
    fn price_increase_is_medium_severity() {
        let before = TestHelper::scan_of(URL, &[("#Price", "$1,200")]);
        let after = TestHelper::scan_of(URL, &[("#Price", "$1,350")]);

        let changes = detect_changes(&before, &after, &config());
        let alerts = generate_alerts(&changes, &config(), URL);
        assert_eq!(changes[0].change_type, ChangeType::PriceChanged);
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
    }

    #[test]
    fn count_growth_is_one_added_change_without_alert() {
        let before = TestHelper::scan_of(URL, &[(".item", "a"), (".item", "b"), (".item", "c")]);
        let after = TestHelper::scan_of(
            URL,
            &[(".item", "a"), (".item", "b"), (".item", "c"), (".item", "d"), (".item", "e")],
        );

        let changes = detect_changes(&before, &after, &config());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::ElementAdded);
        assert_eq!(changes[0].old_value.as_deref(), Some("3"));
        assert_eq!(changes[0].new_value.as_deref(), Some("5"));
        assert_eq!(changes[0].confidence, 0.9);
        assert!(generate_alerts(&changes, &config(), URL).is_empty());
    }

    #[test]
    fn selector_disappearing_is_a_removal() {
        let before = TestHelper::scan_of(URL, &[("h1", "Lamp"), (".badge", "Sale")]);
        let after = TestHelper::scan_of(URL, &[("h1", "Lamp")]);

        let changes = detect_changes(&before, &after, &config());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::ElementRemoved);
        assert_eq!(changes[0].new_value.as_deref(), Some("0"));
    }

    #[test]
    fn ignored_selectors_never_appear() {
        let config = MonitoringConfig {
            ignore_selectors: vec![".clock".to_string()],
            ..config()
        };
        let before = TestHelper::scan_of(URL, &[(".clock", "10:00"), ("h1", "A")]);
        let after = TestHelper::scan_of(URL, &[(".clock", "10:01"), (".clock", "x"), ("h1", "B")]);

        let changes = detect_changes(&before, &after, &config);
        assert!(changes.iter().all(|c| c.selector != ".clock"));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn stock_and_availability_classify_together() {
        let before = TestHelper::scan_of(URL, &[("#STOCK-level", "In stock"), (".availability", "Yes")]);
        let after = TestHelper::scan_of(URL, &[("#STOCK-level", "Sold out"), (".availability", "No")]);

        let changes = detect_changes(&before, &after, &config());
        assert!(changes
            .iter()
            .all(|c| c.change_type == ChangeType::AvailabilityChanged));

        let alerts = generate_alerts(&changes, &config(), URL);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.severity == AlertSeverity::High));
    }

    #[test]
    fn confidences_stay_in_unit_range() {
        let before = TestHelper::scan_of(URL, &[("p", "abc"), ("p", "same"), ("h2", "x")]);
        let mut after = TestHelper::scan_of(URL, &[("p", "xyz123"), ("p", "sane")]);
        after.elements.push(TestHelper::element("h2", None));

        let changes = detect_changes(&before, &after, &config());
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
        assert_eq!(changes[2].confidence, 0.5);
    }

    #[test]
    fn alerts_respect_alert_on_change() {
        let before = TestHelper::scan_of(URL, &[("h1", "A")]);
        let after = TestHelper::scan_of(URL, &[("h1", "B")]);
        let changes = detect_changes(&before, &after, &config());

        let quiet = MonitoringConfig {
            alert_on_change: false,
            ..config()
        };
        assert!(generate_alerts(&changes, &quiet, URL).is_empty());
        assert_eq!(
            generate_alerts(&changes, &config(), URL)[0].severity,
            AlertSeverity::Low
        );
    }

    #[test]
    fn unparsable_prices_never_decrease() {
        assert!(!is_price_decrease(Some("call us"), Some("$5")));
        assert!(!is_price_decrease(Some("$5"), None));
        assert!(is_price_decrease(Some("USD 1,999.99"), Some("USD 1,499")));
        assert_eq!(extract_numeric_value("€12.50 / month"), Some(12.5));
    }
}
