//! Chrome DevTools Protocol client over a local WebSocket.
//!
//! Commands carry auto-incrementing ids and are correlated with their
//! responses by id. Events that arrive while a command is waiting are
//! queued, so nothing the page emits between two commands is lost.

use std::collections::VecDeque;

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// An unsolicited protocol event (`Network.responseReceived`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug)]
enum Incoming {
    Response {
        id: u64,
        result: std::result::Result<Value, Value>,
    },
    Event(CdpEvent),
}

fn parse_incoming(text: &str) -> Result<Incoming> {
    let message: Value = serde_json::from_str(text).context("Invalid JSON from DevTools")?;

    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        let result = match message.get("error") {
            Some(error) => Err(error.clone()),
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Ok(Incoming::Response { id, result });
    }

    if message.get("method").is_some() {
        let event = serde_json::from_value(message).context("Malformed DevTools event")?;
        return Ok(Incoming::Event(event));
    }

    bail!("DevTools message is neither a response nor an event: {text}")
}

/// Connection to a browser's DevTools endpoint.
pub struct CdpConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    events: VecDeque<CdpEvent>,
}

impl CdpConnection {
    /// Connect to a `ws://127.0.0.1:<port>/devtools/browser/<id>` endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, response) = connect_async(ws_url)
            .await
            .with_context(|| format!("DevTools connection to {ws_url} failed"))?;
        debug!("DevTools connected: {:?}", response.status());

        Ok(Self {
            stream,
            next_id: 0,
            events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its result until `deadline`.
    ///
    /// `session_id` routes the command to an attached target; `None`
    /// addresses the browser itself.
    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        deadline: Instant,
    ) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;

        let mut request = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session_id) = session_id {
            request["sessionId"] = json!(session_id);
        }

        self.stream
            .send(Message::Text(request.to_string()))
            .await
            .with_context(|| format!("Failed to send DevTools command '{method}'"))?;

        loop {
            let Ok(text) = tokio::time::timeout_at(deadline, self.recv_text()).await else {
                bail!("Timeout waiting for DevTools response to '{method}'");
            };
            let Some(text) = text? else {
                bail!("DevTools connection closed while waiting for '{method}'");
            };

            match parse_incoming(&text)? {
                Incoming::Response { id: rid, result } if rid == id => {
                    return result.map_err(|e| anyhow!("DevTools error in '{method}': {e}"));
                }
                Incoming::Response { .. } => {}
                Incoming::Event(event) => self.events.push_back(event),
            }
        }
    }

    /// Next event, or `None` once `deadline` passes without one.
    pub async fn next_event(&mut self, deadline: Instant) -> Result<Option<CdpEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }

        loop {
            let Ok(text) = tokio::time::timeout_at(deadline, self.recv_text()).await else {
                return Ok(None);
            };
            let Some(text) = text? else {
                bail!("DevTools connection closed");
            };
            if let Incoming::Event(event) = parse_incoming(&text)? {
                return Ok(Some(event));
            }
        }
    }

    /// Receive the next text frame, answering pings along the way.
    async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Ping(data))) => {
                    let _ = self.stream.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(anyhow::Error::new(e).context("DevTools receive failed"));
                }
            }
        }
    }

    /// Close the WebSocket. Errors are irrelevant at this point.
    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
