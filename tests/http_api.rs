//! End-to-end tests for the HTTP interface, driven in-process with
//! `tower::ServiceExt::oneshot` against local upstream servers.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::Html;
use axum::routing::get as route_get;
use axum::Router;
use streamtap::{
    AcceleratedClient, FastExtractor, RenderedExtractor, Resolver, MANIFEST_CONTENT_TYPE,
};
use tokio::sync::Notify;

use common::{app, body_text, encode, get, spawn_upstream, CountingResolver};

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:6.0,\nseg0.ts\n";

async fn cdn() -> String {
    let app = Router::new()
        .route("/hls/live.m3u8", route_get(|| async { PLAYLIST }))
        .route("/hls/gone.m3u8", route_get(|| async { StatusCode::NOT_FOUND }));
    spawn_upstream(app).await
}

// ─── Request validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn missing_url_is_bad_request() {
    let (fast, fast_calls) = CountingResolver::new("fast", None);
    let (router, _) = app(vec![Box::new(fast)]);

    for uri in ["/stream", "/stream?url=", "/resolve"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_text(response).await, "missing ?url= parameter");
    }
    assert_eq!(fast_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_url_goes_through_resolution() {
    let (fast, fast_calls) = CountingResolver::new("fast", None);
    let (rendered, rendered_calls) = CountingResolver::new("rendered", None);
    let (router, _) = app(vec![Box::new(fast), Box::new(rendered)]);

    for page in ["not a url", "file:///etc/passwd"] {
        let response = get(&router, &format!("/stream?url={}", encode(page))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{page}");
        assert!(body_text(response).await.contains("could not resolve stream"));
    }
    assert_eq!(fast_calls.load(Ordering::SeqCst), 2);
    assert_eq!(rendered_calls.load(Ordering::SeqCst), 2);
}

// ─── /stream ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exhausted_tiers_return_500_with_message() {
    let (fast, fast_calls) = CountingResolver::new("fast", None);
    let (rendered, rendered_calls) = CountingResolver::new("rendered", None);
    let (router, _) = app(vec![Box::new(fast), Box::new(rendered)]);

    let page = "https://host.example/embed/42";
    let response = get(&router, &format!("/stream?url={}", encode(page))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.contains("could not resolve stream (.m3u8)"), "{body}");
    assert_eq!(fast_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rendered_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fast_hit_streams_manifest_and_skips_render() {
    let base = cdn().await;
    let (fast, _) = CountingResolver::new("fast", Some(format!("{base}/hls/live.m3u8")));
    let (rendered, rendered_calls) = CountingResolver::new("rendered", None);
    let (router, state) = app(vec![Box::new(fast), Box::new(rendered)]);

    let response = get(&router, &format!("/stream?url={}", encode("https://host/e/1"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], MANIFEST_CONTENT_TYPE);
    assert_eq!(body_text(response).await, PLAYLIST);
    assert_eq!(rendered_calls.load(Ordering::SeqCst), 0);
    assert_eq!(state.resolver.cache().len(), 1);
}

#[tokio::test]
async fn fresh_manifest_failure_is_500() {
    let base = cdn().await;
    let (fast, _) = CountingResolver::new("fast", Some(format!("{base}/hls/gone.m3u8")));
    let (router, _) = app(vec![Box::new(fast)]);

    let response = get(&router, &format!("/stream?url={}", encode("https://host/e/1"))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_ne!(
        response.headers().get(CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(MANIFEST_CONTENT_TYPE.as_bytes())
    );
    assert!(body_text(response).await.starts_with("failed to fetch remote .m3u8"));
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let base = cdn().await;
    let (fast, fast_calls) = CountingResolver::new("fast", Some(format!("{base}/hls/live.m3u8")));
    let (router, _) = app(vec![Box::new(fast)]);
    let uri = format!("/stream?url={}", encode("https://host/e/1"));

    for _ in 0..3 {
        let response = get(&router, &uri).await;
        assert_eq!(body_text(response).await, PLAYLIST);
    }
    assert_eq!(fast_calls.load(Ordering::SeqCst), 1);
}

/// Blocks on pages containing "slow" until released.
struct GatedResolver {
    manifest: String,
    gate: Arc<Notify>,
}

#[async_trait]
impl Resolver for GatedResolver {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn attempt(&self, page_url: &str) -> Option<String> {
        if page_url.contains("slow") {
            self.gate.notified().await;
        }
        Some(self.manifest.clone())
    }
}

#[tokio::test]
async fn distinct_pages_do_not_block_each_other() {
    let base = cdn().await;
    let gate = Arc::new(Notify::new());
    let (router, _) = app(vec![Box::new(GatedResolver {
        manifest: format!("{base}/hls/live.m3u8"),
        gate: Arc::clone(&gate),
    })]);

    let slow = {
        let router = router.clone();
        tokio::spawn(async move {
            get(&router, &format!("/stream?url={}", encode("https://host/slow"))).await
        })
    };

    let quick = tokio::time::timeout(
        Duration::from_secs(5),
        get(&router, &format!("/stream?url={}", encode("https://host/quick"))),
    )
    .await
    .expect("quick page must not wait on the slow one");
    assert_eq!(quick.status(), StatusCode::OK);
    assert!(!slow.is_finished());

    gate.notify_one();
    let slow = slow.await.unwrap();
    assert_eq!(slow.status(), StatusCode::OK);
}

// ─── /resolve and /health ────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_reports_tier_and_health_counts_cache() {
    let (fast, _) = CountingResolver::new("fast", Some("https://cdn/x.m3u8".into()));
    let (router, _) = app(vec![Box::new(fast)]);
    let uri = format!("/resolve?url={}", encode("https://host/e/7"));

    let first: serde_json::Value = serde_json::from_str(&body_text(get(&router, &uri).await).await).unwrap();
    assert_eq!(first["page_url"], "https://host/e/7");
    assert_eq!(first["manifest_url"], "https://cdn/x.m3u8");
    assert_eq!(first["tier"], "fast");

    let second: serde_json::Value = serde_json::from_str(&body_text(get(&router, &uri).await).await).unwrap();
    assert_eq!(second["tier"], "cache");

    let health: serde_json::Value =
        serde_json::from_str(&body_text(get(&router, "/health").await).await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], streamtap::VERSION);
    assert_eq!(health["cached"], 1);
}

// ─── Full stack ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn fast_extractor_resolves_escaped_player_config() {
    let base = cdn().await;
    let manifest = format!("{base}/hls/live.m3u8");
    let escaped = manifest.replace('/', "\\/");
    let page = Router::new().route(
        "/embed/abc",
        route_get(move || {
            let escaped = escaped.clone();
            async move {
                Html(format!(
                    "<html><body><script>jwplayer('p').setup({{\"file\":\"{escaped}\"}});</script></body></html>"
                ))
            }
        }),
    );
    let page_base = spawn_upstream(page).await;

    let fast = FastExtractor::new(AcceleratedClient::new().unwrap(), Duration::from_secs(5));
    let rendered = RenderedExtractor::new(streamtap::config::RenderConfig {
        enabled: false,
        ..Default::default()
    });
    let (router, state) = app(vec![Box::new(fast), Box::new(rendered)]);

    let page_url = format!("{page_base}/embed/abc");
    let response = get(&router, &format!("/stream?url={}", encode(&page_url))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, PLAYLIST);
    assert_eq!(state.resolver.cache().get(&page_url), Some(manifest));
}
