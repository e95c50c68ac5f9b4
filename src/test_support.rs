//! Helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::extract::Resolver;

/// Serve `app` on an ephemeral local port and return its base URL.
pub(crate) async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Resolver that returns a fixed answer and counts its invocations.
pub(crate) struct CountingResolver {
    name: &'static str,
    answer: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    pub(crate) fn new(name: &'static str, answer: Option<String>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = Self {
            name,
            answer,
            calls: Arc::clone(&calls),
        };
        (resolver, calls)
    }
}

#[async_trait]
impl Resolver for CountingResolver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn attempt(&self, _page_url: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// How the fake DevTools endpoint behaves after `Page.navigate`.
#[cfg(unix)]
#[derive(Debug, Clone, Default)]
pub(crate) struct DevToolsScript {
    /// Delay before answering `Page.navigate`.
    pub navigate_delay: std::time::Duration,
    /// Answer `Page.navigate` with a protocol error.
    pub navigate_error: bool,
    /// Manifest response reported on the page session.
    pub page_manifest: Option<String>,
    /// Attach an out-of-process iframe whose session reports this manifest
    /// once it is resumed.
    pub frame_manifest: Option<String>,
    /// Send `Page.loadEventFired`.
    pub fire_load: bool,
}

/// A stand-in browser executable: a shell script that records its pid and
/// profile directory, announces a local DevTools endpoint, then idles.
#[cfg(unix)]
pub(crate) struct FakeBrowser {
    pub executable: std::path::PathBuf,
    state_dir: std::path::PathBuf,
}

#[cfg(unix)]
impl FakeBrowser {
    pub(crate) async fn start(script: DevToolsScript) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_devtools(listener, script));

        let state_dir =
            std::env::temp_dir().join(format!("streamtap-fake-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&state_dir).unwrap();
        let state = state_dir.display();
        let executable = state_dir.join("chromium");
        std::fs::write(
            &executable,
            format!(
                "#!/bin/sh\n\
                 for arg in \"$@\"; do\n\
                 case \"$arg\" in --user-data-dir=*) echo \"${{arg#--user-data-dir=}}\" > {state}/profile ;; esac\n\
                 done\n\
                 echo $$ > {state}/pid\n\
                 echo \"DevTools listening on ws://127.0.0.1:{port}/devtools/browser/fake\" >&2\n\
                 exec sleep 30\n"
            ),
        )
        .unwrap();
        std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            executable,
            state_dir,
        }
    }

    fn read_state(&self, name: &str) -> String {
        std::fs::read_to_string(self.state_dir.join(name))
            .unwrap()
            .trim()
            .to_string()
    }

    /// Profile directory the browser was started with.
    pub(crate) fn profile_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(self.read_state("profile"))
    }

    /// Whether the launched process still exists.
    pub(crate) fn is_running(&self) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &self.read_state("pid")])
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

#[cfg(unix)]
impl Drop for FakeBrowser {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.state_dir);
    }
}

#[cfg(unix)]
fn cdp_event(method: &str, params: serde_json::Value, session_id: &str) -> serde_json::Value {
    serde_json::json!({ "method": method, "params": params, "sessionId": session_id })
}

#[cfg(unix)]
fn manifest_response(url: &str, session_id: &str) -> serde_json::Value {
    cdp_event(
        "Network.responseReceived",
        serde_json::json!({ "requestId": "m", "response": { "url": url, "status": 200 } }),
        session_id,
    )
}

/// Answer one DevTools client according to `script`.
#[cfg(unix)]
async fn serve_devtools(listener: tokio::net::TcpListener, script: DevToolsScript) {
    use futures::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message;

    let Ok((tcp, _)) = listener.accept().await else {
        return;
    };
    let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: serde_json::Value = serde_json::from_str(&text).unwrap();
        let id = request["id"].clone();
        let session = request["sessionId"].as_str().unwrap_or_default().to_string();
        let ok = |result: serde_json::Value| json!({ "id": id, "result": result });

        let mut outgoing = Vec::new();
        let mut closing = false;
        match request["method"].as_str().unwrap_or_default() {
            "Target.createTarget" => outgoing.push(ok(json!({ "targetId": "T" }))),
            "Target.attachToTarget" => outgoing.push(ok(json!({ "sessionId": "S" }))),
            "Page.navigate" => {
                tokio::time::sleep(script.navigate_delay).await;
                if script.navigate_error {
                    outgoing.push(json!({
                        "id": id,
                        "error": { "code": -32000, "message": "Cannot navigate to invalid URL" }
                    }));
                } else {
                    outgoing.push(ok(json!({ "frameId": "F" })));
                    if script.frame_manifest.is_some() {
                        outgoing.push(cdp_event(
                            "Target.attachedToTarget",
                            json!({
                                "sessionId": "C",
                                "targetInfo": { "targetId": "I", "type": "iframe" },
                                "waitingForDebugger": true
                            }),
                            "S",
                        ));
                    }
                    if let Some(url) = &script.page_manifest {
                        outgoing.push(manifest_response(url, "S"));
                    }
                    if script.fire_load {
                        outgoing.push(cdp_event("Page.loadEventFired", json!({}), "S"));
                    }
                }
            }
            "Runtime.runIfWaitingForDebugger" => {
                outgoing.push(ok(json!({})));
                if let (Some(url), "C") = (&script.frame_manifest, session.as_str()) {
                    outgoing.push(manifest_response(url, "C"));
                }
            }
            "Browser.close" => {
                outgoing.push(ok(json!({})));
                closing = true;
            }
            _ => outgoing.push(ok(json!({}))),
        }

        for message in outgoing {
            if ws.send(Message::Text(message.to_string())).await.is_err() {
                return;
            }
        }
        if closing {
            return;
        }
    }
}
