//! Shared helpers for HTTP integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use streamtap::{AppState, Resolver, ResolverChain, StreamProxy, StreamResolver, TtlCache};
use tower::ServiceExt;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Application router over the given tiers with default cache and proxy.
pub fn app(resolvers: Vec<Box<dyn Resolver>>) -> (Router, AppState) {
    let resolver = StreamResolver::new(
        TtlCache::default(),
        ResolverChain::new(resolvers),
        StreamProxy::new(Duration::from_secs(5)).unwrap(),
    );
    let state = AppState::new(resolver);
    (streamtap::router(state.clone()), state)
}

/// Issue a GET against the router without a socket.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Percent-encode a page URL for use as the `url` query parameter.
pub fn encode(page_url: &str) -> String {
    url::form_urlencoded::byte_serialize(page_url.as_bytes()).collect()
}

/// Resolver that returns a fixed answer and counts its invocations.
pub struct CountingResolver {
    name: &'static str,
    answer: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    pub fn new(name: &'static str, answer: Option<String>) -> (Self, Arc<AtomicUsize>) {
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
