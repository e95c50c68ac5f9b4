//! Disposable headless browser driven over the DevTools protocol.
//!
//! Every [`Browser`] is a separate Chromium process with its own throwaway
//! profile directory. The process is killed and the directory removed when
//! the browser is closed, and again as a backstop when it is dropped, so a
//! failed or abandoned attempt cannot leak a browser.

pub mod cdp;
pub mod detect;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub use cdp::{CdpConnection, CdpEvent};
pub use detect::find_browser;

use crate::fingerprint::BrowserProfile;

/// Time allowed for a graceful close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Injected before any page script runs. Hides the usual automation tells.
const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
if (window.navigator.permissions && window.navigator.permissions.query) {
  const query = window.navigator.permissions.query.bind(window.navigator.permissions);
  window.navigator.permissions.query = (p) =>
    p && p.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : query(p);
}
";

/// How to start a browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub executable: PathBuf,
    pub launch_timeout: Duration,
    /// Per-command budget for setup traffic.
    pub command_timeout: Duration,
    pub viewport: (u32, u32),
}

fn launch_args(options: &LaunchOptions, profile_dir: &Path) -> Vec<String> {
    let (width, height) = options.viewport;
    vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--mute-audio".to_string(),
        format!("--window-size={width},{height}"),
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
    ]
}

/// Extract the WebSocket endpoint from Chromium's startup banner.
fn parse_devtools_line(line: &str) -> Option<Url> {
    let endpoint = line.trim().strip_prefix("DevTools listening on ")?;
    Url::parse(endpoint.trim())
        .ok()
        .filter(|url| url.scheme() == "ws")
}

/// Read stderr until the DevTools banner appears, then keep draining it in
/// the background so the browser never blocks on a full pipe.
async fn read_devtools_url(stderr: ChildStderr) -> Result<Url> {
    let mut lines = BufReader::new(stderr).lines();

    while let Some(line) = lines.next_line().await? {
        if let Some(url) = parse_devtools_line(&line) {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "streamtap::browser::stderr", "{line}");
                }
            });
            return Ok(url);
        }
        debug!(target: "streamtap::browser::stderr", "{line}");
    }

    bail!("Browser exited before announcing its DevTools endpoint")
}

/// Owns the OS process and its profile directory.
struct BrowserProcess {
    child: Child,
    profile_dir: PathBuf,
    reaped: bool,
}

impl BrowserProcess {
    async fn shutdown(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill browser process: {e}");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!("Failed to remove {}: {e}", self.profile_dir.display());
        }
        self.reaped = true;
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // kill_on_drop covers the process; the profile directory is ours
        let _ = self.child.start_kill();
        let _ = std::fs::remove_dir_all(&self.profile_dir);
    }
}

/// A running headless browser.
pub struct Browser {
    process: BrowserProcess,
    cdp: CdpConnection,
    command_timeout: Duration,
}

impl Browser {
    /// Start a fresh browser and connect to it.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let profile_dir = std::env::temp_dir().join(format!("streamtap-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&profile_dir)
            .await
            .with_context(|| format!("Failed to create {}", profile_dir.display()))?;

        let spawned = Command::new(&options.executable)
            .args(launch_args(options, &profile_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to start {}", options.executable.display())));
            }
        };

        // From here on the guard cleans up on every early return
        let mut process = BrowserProcess {
            child,
            profile_dir,
            reaped: false,
        };

        let stderr = process
            .child
            .stderr
            .take()
            .context("Browser stderr was not captured")?;

        let ws_url = tokio::time::timeout(options.launch_timeout, read_devtools_url(stderr))
            .await
            .with_context(|| {
                format!("Browser did not start within {:?}", options.launch_timeout)
            })??;

        info!(pid = ?process.child.id(), %ws_url, "Browser launched");

        let cdp = match CdpConnection::connect(ws_url.as_str()).await {
            Ok(cdp) => cdp,
            Err(e) => {
                process.shutdown().await;
                return Err(e);
            }
        };

        Ok(Self {
            process,
            cdp,
            command_timeout: options.command_timeout,
        })
    }

    /// Open a blank page and attach a flattened session to it.
    pub async fn new_page(&mut self) -> Result<Page<'_>> {
        let deadline = Instant::now() + self.command_timeout;

        let target = self
            .cdp
            .call("Target.createTarget", json!({ "url": "about:blank" }), None, deadline)
            .await?;
        let target_id = target["targetId"]
            .as_str()
            .context("Target.createTarget returned no targetId")?
            .to_string();

        let attached = self
            .cdp
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
                deadline,
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .context("Target.attachToTarget returned no sessionId")?
            .to_string();

        debug!(%target_id, %session_id, "Page attached");

        Ok(Page {
            cdp: &mut self.cdp,
            sessions: HashSet::from([session_id.clone()]),
            session_id,
            command_timeout: self.command_timeout,
        })
    }

    /// Ask the browser to exit, then make sure it has.
    pub async fn close(mut self) {
        let _ = self
            .cdp
            .call("Browser.close", json!({}), None, Instant::now() + CLOSE_TIMEOUT)
            .await;
        self.cdp.close().await;
        self.process.shutdown().await;
        info!("Browser closed");
    }
}

/// Auto-attach settings for a session: children (out-of-process iframes,
/// workers) start paused and report over their own flattened session.
fn auto_attach_params() -> Value {
    json!({
        "autoAttach": true,
        "waitForDebuggerOnStart": true,
        "flatten": true,
    })
}

/// A page target attached over a flattened session, together with the
/// child sessions of its out-of-process frames.
pub struct Page<'a> {
    cdp: &'a mut CdpConnection,
    session_id: String,
    sessions: HashSet<String>,
    command_timeout: Duration,
}

impl Page<'_> {
    /// Send a command to this page.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let deadline = Instant::now() + self.command_timeout;
        self.call_until(method, params, deadline).await
    }

    /// Send a command to this page and wait for its answer until `deadline`.
    pub async fn call_until(
        &mut self,
        method: &str,
        params: Value,
        deadline: Instant,
    ) -> Result<Value> {
        self.cdp
            .call(method, params, Some(self.session_id.as_str()), deadline)
            .await
    }

    /// Next event from this page or one of its child frames, or `None`
    /// at `deadline`. Child attachment is handled here and not reported.
    pub async fn next_event(&mut self, deadline: Instant) -> Result<Option<CdpEvent>> {
        loop {
            let Some(event) = self.cdp.next_event(deadline).await? else {
                return Ok(None);
            };
            let known = event
                .session_id
                .as_deref()
                .is_some_and(|id| self.sessions.contains(id));
            if !known {
                continue;
            }

            match event.method.as_str() {
                "Target.attachedToTarget" => self.adopt_child(&event.params).await,
                "Target.detachedFromTarget" => {
                    if let Some(child) = event.params["sessionId"].as_str() {
                        if child != self.session_id {
                            self.sessions.remove(child);
                        }
                    }
                }
                _ => return Ok(Some(event)),
            }
        }
    }

    /// Start observing a freshly attached child target, then let it run.
    async fn adopt_child(&mut self, params: &Value) {
        let Some(child) = params["sessionId"].as_str() else {
            return;
        };
        let kind = params["targetInfo"]["type"].as_str().unwrap_or("unknown");
        debug!(session_id = child, kind, "Child target attached");
        self.sessions.insert(child.to_string());

        let setup = [
            ("Network.enable", json!({})),
            ("Target.setAutoAttach", auto_attach_params()),
            ("Runtime.runIfWaitingForDebugger", json!({})),
        ];
        for (method, args) in setup {
            let deadline = Instant::now() + self.command_timeout;
            if let Err(e) = self.cdp.call(method, args, Some(child), deadline).await {
                debug!(session_id = child, error = %e, "{method} failed on child target");
            }
        }
    }

    /// Enable network and page events, and attach to child frames as they
    /// appear.
    pub async fn enable_events(&mut self) -> Result<()> {
        self.call("Network.enable", json!({})).await?;
        self.call("Page.enable", json!({})).await?;
        self.call("Target.setAutoAttach", auto_attach_params()).await?;
        Ok(())
    }

    /// Apply fingerprint evasions: desktop user agent, fixed viewport and
    /// the stealth script.
    pub async fn apply_stealth(
        &mut self,
        profile: &BrowserProfile,
        viewport: (u32, u32),
    ) -> Result<()> {
        let (width, height) = viewport;
        self.call(
            "Network.setUserAgentOverride",
            json!({
                "userAgent": profile.user_agent,
                "acceptLanguage": profile.accept_language,
            }),
        )
        .await?;
        self.call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
        self.call(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": STEALTH_SCRIPT }),
        )
        .await?;
        Ok(())
    }

    /// Start navigation. The browser answers once the main document's
    /// response has arrived, so this waits until `deadline`. Fails if the
    /// browser rejects the URL outright (DNS failure, refused connection,
    /// invalid scheme).
    pub async fn navigate(&mut self, url: &str, deadline: Instant) -> Result<()> {
        let result = self
            .call_until("Page.navigate", json!({ "url": url }), deadline)
            .await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            bail!("Navigation to {url} failed: {error}");
        }
        Ok(())
    }
}
