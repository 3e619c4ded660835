use super::diff::{detect_changes, generate_alerts};
use super::scan::ScanEngine;
use super::types::{
    Change, ChangeDetectionResult, MonitoringSession, ScanConfig, ScanResult, SessionState,
    StructuredDataResult,
};
use crate::core::{MonitoringConfig, PageSurface};
use crate::errors::{AgentError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs one periodic scan loop per monitored URL.
///
/// All session state lives in one registry behind one mutex. Loops only touch
/// the entry whose session id they were started with, so a loop that was
/// stopped or replaced can never write over its successor.
pub struct MonitoringSupervisor<S: PageSurface + 'static> {
    engine: Arc<ScanEngine<S>>,
    registry: Arc<Mutex<Registry>>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    scan_cache: HashMap<String, ScanResult>,
    change_history: HashMap<String, Vec<Change>>,
}

struct SessionEntry {
    session: MonitoringSession,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Registry {
    fn remove(&mut self, url: &str) -> Option<SessionEntry> {
        self.scan_cache.remove(url);
        self.change_history.remove(url);
        self.sessions.remove(url)
    }
}

/// What a loop needs to run one session
struct SessionLoop<S: PageSurface + 'static> {
    engine: Arc<ScanEngine<S>>,
    registry: Arc<Mutex<Registry>>,
    url: String,
    session_id: String,
    config: MonitoringConfig,
    cancel: CancellationToken,
    results: mpsc::Sender<ChangeDetectionResult>,
    receiver_gone: bool,
}

enum Tick {
    Emit(ChangeDetectionResult),
    Quiet,
    Orphaned,
}

impl<S: PageSurface + 'static> MonitoringSupervisor<S> {
    pub fn new(surface: Arc<S>) -> Self {
        Self::with_engine(Arc::new(ScanEngine::new(surface)))
    }

    pub fn with_engine(engine: Arc<ScanEngine<S>>) -> Self {
        Self {
            engine,
            registry: Arc::new(Mutex::new(Registry::default())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> &Arc<ScanEngine<S>> {
        &self.engine
    }

    /// Start watching `url`, replacing any session already running for it.
    ///
    /// The returned stream opens with a baseline result and afterwards only
    /// carries ticks that found changes or failed.
    pub async fn start_monitoring(
        &self,
        url: &str,
        config: MonitoringConfig,
    ) -> Result<mpsc::Receiver<ChangeDetectionResult>> {
        config.validate()?;
        if self.shutdown.is_cancelled() {
            return Err(AgentError::ConfigurationError(
                "monitoring supervisor has been shut down".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let session = MonitoringSession::new(url, config.clone());
        let cancel = self.shutdown.child_token();

        let mut registry = self.registry.lock().await;
        if let Some(previous) = registry.remove(url) {
            info!("Replacing monitoring session {} for {}", previous.session.id, url);
            previous.cancel.cancel();
        }

        let session_loop = SessionLoop {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            url: url.to_string(),
            session_id: session.id.clone(),
            config,
            cancel: cancel.clone(),
            results: tx,
            receiver_gone: false,
        };

        info!("Starting monitoring session {} for {}", session.id, url);
        registry.sessions.insert(
            url.to_string(),
            SessionEntry {
                session,
                cancel,
                task: None,
            },
        );

        // The loop waits on the registry lock held here, so the handle is
        // stored before it can run.
        let task = tokio::spawn(session_loop.run());
        if let Some(entry) = registry.sessions.get_mut(url) {
            entry.task = Some(task);
        }

        Ok(rx)
    }

    /// Stop watching `url`, dropping its session, cached scan and history.
    ///
    /// Returns the final session snapshot, or `None` if `url` was not monitored.
    pub async fn stop_monitoring(&self, url: &str) -> Option<MonitoringSession> {
        let entry = self.registry.lock().await.remove(url)?;
        entry.cancel.cancel();
        if let Some(task) = entry.task {
            if let Err(e) = task.await {
                warn!("Monitoring task for {} ended abnormally: {}", url, e);
            }
        }

        let mut session = entry.session;
        session.is_active = false;
        session.state = SessionState::Stopped;
        info!(
            "Stopped monitoring {} after {} scans ({} failed)",
            url, session.total_scans, session.failed_scans
        );
        Some(session)
    }

    /// Snapshot of every live session, ordered by url.
    pub async fn get_monitoring_status(&self) -> Vec<MonitoringSession> {
        let registry = self.registry.lock().await;
        let mut sessions: Vec<MonitoringSession> = registry
            .sessions
            .values()
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.url.cmp(&b.url));
        sessions
    }

    /// Every change reported for `url` since its session started.
    pub async fn change_history(&self, url: &str) -> Vec<Change> {
        self.registry
            .lock()
            .await
            .change_history
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    /// Stop every session and wait for their loops to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let entries: Vec<(String, SessionEntry)> = {
            let mut registry = self.registry.lock().await;
            registry.scan_cache.clear();
            registry.change_history.clear();
            registry.sessions.drain().collect()
        };

        for (url, entry) in entries {
            if let Some(task) = entry.task {
                if let Err(e) = task.await {
                    warn!("Monitoring task for {} ended abnormally: {}", url, e);
                }
            }
        }
        info!("Monitoring supervisor shut down");
    }

    pub async fn scan_page(&self, url: &str, config: &ScanConfig) -> ScanResult {
        self.engine.scan_page(url, config).await
    }

    pub async fn extract_structured_data(
        &self,
        url: &str,
        selectors: &[String],
    ) -> StructuredDataResult {
        self.engine.extract_structured_data(url, selectors).await
    }
}

impl<S: PageSurface + 'static> Drop for MonitoringSupervisor<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The session for `url`, if it is still the one started as `session_id`.
fn owned_session<'a>(
    sessions: &'a mut HashMap<String, SessionEntry>,
    url: &str,
    session_id: &str,
) -> Option<&'a mut MonitoringSession> {
    sessions
        .get_mut(url)
        .map(|entry| &mut entry.session)
        .filter(|session| session.id == session_id)
}

impl<S: PageSurface + 'static> SessionLoop<S> {
    async fn run(mut self) {
        let scan_config = ScanConfig::from(&self.config);

        let baseline = select! {
            _ = self.cancel.cancelled() => return,
            scan = self.engine.scan_page(&self.url, &scan_config) => scan,
        };
        match self.record_baseline(baseline).await {
            Tick::Emit(result) => self.emit(result).await,
            Tick::Quiet => {}
            Tick::Orphaned => return,
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.scan_interval()) => {}
            }

            let scan = select! {
                _ = self.cancel.cancelled() => break,
                scan = self.engine.scan_page(&self.url, &scan_config) => scan,
            };

            match self.record_tick(scan).await {
                Tick::Emit(result) => self.emit(result).await,
                Tick::Quiet => {}
                Tick::Orphaned => break,
            }
        }

        debug!("Monitoring loop for {} exited", self.url);
    }

    async fn record_baseline(&self, scan: ScanResult) -> Tick {
        let mut guard = self.registry.lock().await;
        let registry = &mut *guard;

        let Some(session) = owned_session(&mut registry.sessions, &self.url, &self.session_id) else {
            return Tick::Orphaned;
        };
        session.state = SessionState::Active;

        if !scan.success {
            session.failed_scans += 1;
            let message = scan.error.unwrap_or_else(|| "baseline scan failed".to_string());
            warn!("Baseline scan of {} failed: {}", self.url, message);
            return Tick::Emit(ChangeDetectionResult::error(&self.url, message));
        }

        session.last_scan_time = Some(scan.timestamp);
        registry.scan_cache.insert(self.url.clone(), scan);
        registry.change_history.insert(self.url.clone(), Vec::new());
        Tick::Emit(ChangeDetectionResult::baseline(&self.url))
    }

    async fn record_tick(&self, mut scan: ScanResult) -> Tick {
        let mut guard = self.registry.lock().await;
        let registry = &mut *guard;

        let Some(session) = owned_session(&mut registry.sessions, &self.url, &self.session_id) else {
            return Tick::Orphaned;
        };

        session.total_scans += 1;
        session.last_scan_time = Some(Utc::now());

        if !scan.success {
            session.failed_scans += 1;
            let e = AgentError::TickFailure(
                scan.error.unwrap_or_else(|| "scan failed".to_string()),
            );
            warn!("Monitoring {}: {}", self.url, e);
            return Tick::Emit(ChangeDetectionResult::error(&self.url, e.to_string()));
        }

        let changes = match registry.scan_cache.get(&self.url) {
            Some(previous) => detect_changes(previous, &scan, &self.config),
            None => Vec::new(),
        };
        let alerts = generate_alerts(&changes, &self.config, &self.url);

        scan.performance.changes_detected = changes.len();
        registry.scan_cache.insert(self.url.clone(), scan);

        if changes.is_empty() {
            return Tick::Quiet;
        }

        session.changes_detected += changes.len() as u64;
        session.alerts_generated += alerts.len() as u64;
        debug!(
            "Monitoring {}: {} changes, {} alerts",
            self.url,
            changes.len(),
            alerts.len()
        );

        registry
            .change_history
            .entry(self.url.clone())
            .or_default()
            .extend(changes.iter().cloned());

        Tick::Emit(ChangeDetectionResult::from_changes(&self.url, changes, alerts))
    }

    /// Waits while the stream is full; a dropped receiver leaves the loop running.
    async fn emit(&mut self, result: ChangeDetectionResult) {
        if self.receiver_gone {
            return;
        }

        let delivered = select! {
            _ = self.cancel.cancelled() => true,
            sent = self.results.send(result) => sent.is_ok(),
        };
        if !delivered {
            debug!("Result receiver for {} dropped; monitoring continues", self.url);
            self.receiver_gone = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::HtmlPageSurface;
    use crate::monitor::{AlertSeverity, ChangeType};
    use crate::testing::TestHelper;
    use std::time::Duration;

    const URL: &str = "https://shop.test/item";

    fn fast_config() -> MonitoringConfig {
        MonitoringConfig {
            scan_interval_ms: 20,
            monitor_selectors: vec![".item".to_string(), ".price".to_string()],
            ..MonitoringConfig::default()
        }
    }

    async fn supervisor_with_page(html: &str) -> (HtmlPageSurface, MonitoringSupervisor<HtmlPageSurface>) {
        let surface = HtmlPageSurface::new();
        surface.add_page(URL, html).await;
        let supervisor = MonitoringSupervisor::new(Arc::new(surface.clone()));
        (surface, supervisor)
    }

    async fn next(rx: &mut mpsc::Receiver<ChangeDetectionResult>) -> ChangeDetectionResult {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a result")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn baseline_comes_first_with_full_confidence() {
        let (_surface, supervisor) = supervisor_with_page(&TestHelper::listing_page(2, "$5")).await;
        let mut rx = supervisor.start_monitoring(URL, fast_config()).await.unwrap();

        let baseline = next(&mut rx).await;
        assert!(baseline.changes.is_empty());
        assert!(baseline.alerts.is_empty());
        assert_eq!(baseline.confidence, 1.0);

        let status = supervisor.get_monitoring_status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].state, SessionState::Active);
        assert_eq!(status[0].total_scans, 0);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn changes_are_streamed_counted_and_recorded() {
        let (surface, supervisor) = supervisor_with_page(&TestHelper::listing_page(3, "$10.00")).await;
        let mut rx = supervisor.start_monitoring(URL, fast_config()).await.unwrap();
        next(&mut rx).await;

        surface.add_page(URL, &TestHelper::listing_page(5, "$8.00")).await;
        let result = next(&mut rx).await;

        let added: Vec<_> = result
            .changes
            .iter()
            .filter(|c| c.change_type == ChangeType::ElementAdded)
            .collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].old_value.as_deref(), Some("3"));
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].severity, AlertSeverity::High);

        let history = supervisor.change_history(URL).await;
        assert_eq!(history.len(), result.changes.len());

        let session = supervisor.stop_monitoring(URL).await.unwrap();
        assert_eq!(session.state, SessionState::Stopped);
        assert_eq!(session.changes_detected, 2);
        assert_eq!(session.alerts_generated, 1);
        assert!(session.total_scans >= 1);
        assert!(supervisor.change_history(URL).await.is_empty());
    }

    #[tokio::test]
    async fn failed_ticks_report_and_continue() {
        let (surface, supervisor) = supervisor_with_page(&TestHelper::listing_page(1, "$3")).await;
        let mut rx = supervisor.start_monitoring(URL, fast_config()).await.unwrap();
        next(&mut rx).await;

        surface.remove_page(URL).await;
        let failure = next(&mut rx).await;
        assert!(failure.is_error());
        assert_eq!(failure.confidence, 0.0);
        assert_eq!(failure.alerts.len(), 1);
        assert_eq!(failure.alerts[0].severity, AlertSeverity::Medium);

        // Failed ticks still count as scans
        assert!(next(&mut rx).await.is_error());
        assert!(next(&mut rx).await.is_error());
        let status = supervisor.get_monitoring_status().await;
        assert!(status[0].failed_scans >= 3);
        assert!(status[0].total_scans >= status[0].failed_scans);
        assert!(status[0].last_scan_time.is_some());

        surface.add_page(URL, &TestHelper::listing_page(1, "$2")).await;
        let recovered = loop {
            let result = next(&mut rx).await;
            if !result.is_error() {
                break result;
            }
        };
        assert_eq!(recovered.changes[0].change_type, ChangeType::PriceChanged);

        let status = supervisor.get_monitoring_status().await;
        assert!(status[0].failed_scans >= 1);
        assert_eq!(status[0].state, SessionState::Active);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stopping_unknown_url_is_a_no_op() {
        let (_surface, supervisor) = supervisor_with_page("<html></html>").await;
        assert!(supervisor.stop_monitoring("https://nowhere.test/").await.is_none());
        assert!(supervisor.get_monitoring_status().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let (_surface, supervisor) = supervisor_with_page("<html></html>").await;
        let config = MonitoringConfig {
            scan_interval_ms: 0,
            ..MonitoringConfig::default()
        };
        assert!(supervisor.start_monitoring(URL, config).await.is_err());
        assert!(supervisor.get_monitoring_status().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_every_stream() {
        let (surface, supervisor) = supervisor_with_page(&TestHelper::listing_page(1, "$1")).await;
        surface.add_page("https://shop.test/other", &TestHelper::listing_page(2, "$2")).await;

        let mut first = supervisor.start_monitoring(URL, fast_config()).await.unwrap();
        let mut second = supervisor
            .start_monitoring("https://shop.test/other", fast_config())
            .await
            .unwrap();
        next(&mut first).await;
        next(&mut second).await;

        supervisor.shutdown().await;
        assert!(supervisor.get_monitoring_status().await.is_empty());
        assert!(first.recv().await.is_none());
        assert!(second.recv().await.is_none());
        assert!(supervisor.start_monitoring(URL, fast_config()).await.is_err());
    }
}
