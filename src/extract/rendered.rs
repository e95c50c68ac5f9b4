//! Rendered manifest extraction.
//!
//! Loads the page in a disposable headless browser, lets its scripts run,
//! and watches the network traffic (its own and that of any out-of-process
//! frames) for the first response whose URL looks like a manifest. This is the only tier that copes with players that
//! compute signed or time-limited URLs client-side, and it costs a full
//! browser process and several seconds per call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Resolver, MANIFEST_MARKER};
use crate::browser::{find_browser, Browser, CdpEvent, LaunchOptions};
use crate::config::RenderConfig;
use crate::fingerprint::chrome_profile;

/// How often the navigation loop re-checks for network idle while no
/// events arrive.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Network-idle heuristic: at most `max_inflight` requests outstanding for
/// a continuous `window`.
#[derive(Debug)]
struct NetworkIdle {
    inflight: HashSet<String>,
    quiet_since: Option<Instant>,
    window: Duration,
    max_inflight: usize,
}

impl NetworkIdle {
    fn new(window: Duration, max_inflight: usize, now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            quiet_since: Some(now),
            window,
            max_inflight,
        }
    }

    fn started(&mut self, request_id: &str, now: Instant) {
        self.inflight.insert(request_id.to_string());
        self.update(now);
    }

    fn finished(&mut self, request_id: &str, now: Instant) {
        self.inflight.remove(request_id);
        self.update(now);
    }

    fn update(&mut self, now: Instant) {
        if self.inflight.len() > self.max_inflight {
            self.quiet_since = None;
        } else if self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.window)
    }
}

/// What the page has done so far.
#[derive(Debug)]
struct PageObserver {
    manifest: Option<String>,
    loaded: bool,
    network: NetworkIdle,
}

impl PageObserver {
    fn new(config: &RenderConfig, now: Instant) -> Self {
        Self {
            manifest: None,
            loaded: false,
            network: NetworkIdle::new(config.idle_window(), config.idle_max_inflight, now),
        }
    }

    fn observe(&mut self, event: &CdpEvent, now: Instant) {
        // Request ids are only unique within one target
        let request_id = event.params["requestId"].as_str().map(|id| {
            format!("{}:{id}", event.session_id.as_deref().unwrap_or_default())
        });
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                // A redirect hop is reported here, never as a response
                self.record_response(&event.params["redirectResponse"]);
                if let Some(id) = request_id {
                    self.network.started(&id, now);
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = request_id {
                    self.network.finished(&id, now);
                }
            }
            "Network.responseReceived" => self.record_response(&event.params["response"]),
            "Page.loadEventFired" => self.loaded = true,
            _ => {}
        }
    }

    fn record_response(&mut self, response: &serde_json::Value) {
        let Some(url) = response["url"].as_str() else {
            return;
        };
        if self.manifest.is_none() && url.contains(MANIFEST_MARKER) {
            debug!(%url, "Manifest response observed");
            self.manifest = Some(url.to_string());
        }
    }

    fn navigation_complete(&self, now: Instant) -> bool {
        self.loaded && self.network.is_idle(now)
    }
}

/// Rendered tier: headless browser network capture.
pub struct RenderedExtractor {
    config: RenderConfig,
}

impl RenderedExtractor {
    #[must_use]
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn launch_options(&self, executable: PathBuf) -> LaunchOptions {
        LaunchOptions {
            executable,
            launch_timeout: self.config.launch_timeout(),
            command_timeout: self.config.command_timeout(),
            viewport: (self.config.viewport_width, self.config.viewport_height),
        }
    }

    /// Launch, capture, and always close.
    async fn capture(&self, page_url: &str) -> Result<Option<String>> {
        let executable = find_browser(self.config.browser.as_deref())?;
        let mut browser = Browser::launch(&self.launch_options(executable)).await?;
        let outcome = self.drive(&mut browser, page_url).await;
        browser.close().await;
        outcome
    }

    async fn drive(&self, browser: &mut Browser, page_url: &str) -> Result<Option<String>> {
        let viewport = (self.config.viewport_width, self.config.viewport_height);

        let mut page = browser.new_page().await?;
        page.enable_events().await?;
        page.apply_stealth(&chrome_profile(), viewport).await?;

        let navigation_timeout = self.config.navigation_timeout();
        let navigation_deadline = Instant::now() + navigation_timeout;
        let mut observer = PageObserver::new(&self.config, Instant::now());

        page.navigate(page_url, navigation_deadline).await?;

        loop {
            let now = Instant::now();
            if observer.navigation_complete(now) {
                break;
            }
            if now >= navigation_deadline {
                bail!("Navigation to {page_url} timed out after {navigation_timeout:?}");
            }
            let wake = (now + IDLE_POLL).min(navigation_deadline);
            if let Some(event) = page.next_event(wake).await? {
                observer.observe(&event, Instant::now());
            }
        }

        debug!(page_url, settle = ?self.config.settle(), "Page loaded, settling");

        let settle_deadline = Instant::now() + self.config.settle();
        while let Some(event) = page.next_event(settle_deadline).await? {
            observer.observe(&event, Instant::now());
        }

        Ok(observer.manifest)
    }
}

#[async_trait]
impl Resolver for RenderedExtractor {
    fn name(&self) -> &'static str {
        "rendered"
    }

    async fn attempt(&self, page_url: &str) -> Option<String> {
        if !self.config.enabled {
            debug!("Rendered tier disabled");
            return None;
        }

        info!(page_url, "Launching headless browser");
        match self.capture(page_url).await {
            Ok(found) => found,
            Err(e) => {
                warn!(page_url, error = %e, "Rendered extraction failed");
                None
            }
        }
    }
}
