//! Fetch pipeline tests against mock servers

use crate::common::{html_page, mount_page, test_config, FixedRenderer};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use sumi_harvest::model::{
    ExtractionRule, FetchErrorKind, FetchMethod, FetchRequest, MethodPreference, Transform,
};
use sumi_harvest::Engine;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cache_idempotence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html_page("Article", &[]), "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::new(test_config()).unwrap();
    let url = format!("{}/article", server.uri());

    let first = engine.fetch(FetchRequest::new(url.as_str())).await.unwrap();
    // Same canonical URL: tracking parameter, fragment and an extra header
    let second = engine
        .fetch(
            FetchRequest::new(format!("{}/article/?utm_source=feed#top", server.uri()))
                .with_header("X-Trace", "1"),
        )
        .await
        .unwrap();

    assert!(!first.performance.from_cache);
    assert!(second.performance.from_cache);
    assert_eq!(first.raw, second.raw);
    assert_eq!(first.title(), Some("Article"));
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn test_single_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html_page("Slow", &[]), "text/html")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::new(test_config()).unwrap();
    let url = format!("{}/slow", server.uri());

    let fetches = (0..10).map(|_| engine.fetch(FetchRequest::new(url.as_str())));
    let results = futures::future::join_all(fetches).await;

    assert_eq!(results.len(), 10);
    for result in &results {
        let result = result.as_ref().unwrap();
        assert_eq!(result.title(), Some("Slow"));
    }
}

#[tokio::test]
async fn test_fallback_to_rendered_on_network_failure() {
    let renderer = FixedRenderer::new(&html_page("Rendered", &[]));
    let engine = Engine::builder(test_config())
        .renderer(renderer.clone())
        .build()
        .unwrap();

    // Nothing listens on the discard port
    let result = engine
        .fetch(FetchRequest::new("http://127.0.0.1:9/page"))
        .await
        .unwrap();

    assert_eq!(result.method, FetchMethod::Rendered);
    assert_eq!(result.performance.attempts, 2);
    assert_eq!(result.title(), Some("Rendered"));
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 1);

    // The lease is closed once the fetch is done
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(renderer.open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forced_static_without_browser_reports_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = Engine::new(test_config()).unwrap();
    let err = engine
        .fetch(
            FetchRequest::new(format!("{}/down", server.uri()))
                .with_method(MethodPreference::Static)
                .with_retries(1),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, FetchErrorKind::Http { status: 503 });
    assert_eq!(err.attempted, vec![FetchMethod::Static, FetchMethod::Static]);
    assert_eq!(err.attempts, 2);
}

#[tokio::test]
async fn test_validation_fails_fast() {
    let server = MockServer::start().await;
    let engine = Engine::new(test_config()).unwrap();

    let err = engine
        .fetch(FetchRequest::new("ftp://127.0.0.1/file"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Validation);
    assert!(err.attempted.is_empty());

    let err = engine
        .fetch(FetchRequest::new(server.uri()).with_timeout(Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Validation);

    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(engine.stats().completed + engine.stats().failed, 0);
}

#[tokio::test]
async fn test_extraction_default() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/product",
        "<html><body><h1 class=\"name\">Lamp</h1></body></html>".to_string(),
    )
    .await;

    let engine = Engine::new(test_config()).unwrap();
    let result = engine
        .fetch(
            FetchRequest::new(format!("{}/product", server.uri()))
                .with_rule(ExtractionRule::selector("name", ".name"))
                .with_rule(ExtractionRule::selector("price", ".price").required(json!("n/a"))),
        )
        .await
        .unwrap();

    assert_eq!(result.fields["name"], json!("Lamp"));
    assert_eq!(result.fields["price"], json!("n/a"));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].rule, "price");
}

#[tokio::test]
async fn test_rules_rerun_against_cached_raw() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"items":[{"id":1},{"id":2}],"total":2}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::new(test_config()).unwrap();
    let url = format!("{}/data", server.uri());

    let total = engine
        .fetch(
            FetchRequest::new(url.as_str())
                .with_rule(ExtractionRule::path("total", "$.total").transform(Transform::Json)),
        )
        .await
        .unwrap();
    let ids = engine
        .fetch(
            FetchRequest::new(url.as_str())
                .with_rule(
                    ExtractionRule::path("ids", "$.items[*].id")
                        .transform(Transform::Json)
                        .multiple(),
                ),
        )
        .await
        .unwrap();

    assert_eq!(total.fields["total"], json!(2));
    assert!(!total.fields.contains_key("ids"));
    assert!(ids.performance.from_cache);
    assert_eq!(ids.fields["ids"], json!([1, 2]));
}

#[tokio::test]
async fn test_sink_stores_fresh_results_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[])).await;

    let dir = tempfile::tempdir().unwrap();
    let results_path = dir.path().join("out").join("results.jsonl");
    let mut config = test_config();
    config.output.results_path = Some(results_path.clone());

    let engine = Engine::new(config).unwrap();
    engine.fetch(FetchRequest::new(server.uri())).await.unwrap();
    engine.fetch(FetchRequest::new(server.uri())).await.unwrap();
    engine.shutdown().await;

    let written = std::fs::read_to_string(&results_path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 1);
    let stored: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(stored["metadata"]["title"], json!("Home"));
}

#[tokio::test]
async fn test_sniff_memoizes_host_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/shell",
        "<html><body><div id=\"root\"></div></body></html>".to_string(),
    )
    .await;

    let renderer = FixedRenderer::new(&html_page("Hydrated", &[]));
    let mut config = test_config();
    config.engine.sniff = true;
    let engine = Engine::builder(config)
        .renderer(renderer.clone())
        .build()
        .unwrap();

    let result = engine
        .fetch(FetchRequest::new(format!("{}/shell", server.uri())))
        .await
        .unwrap();

    assert_eq!(result.method, FetchMethod::Rendered);
    assert_eq!(result.performance.attempts, 1);
    assert_eq!(result.title(), Some("Hydrated"));
    assert_eq!(renderer.opened.load(Ordering::SeqCst), 1);
}
