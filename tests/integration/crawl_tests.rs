//! Crawl tests against mock sites

use crate::common::{html_page, mount_page, test_config};
use sumi_harvest::model::FetchMethod;
use sumi_harvest::{CrawlConfig, Crawler, Engine};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawler() -> Crawler {
    Crawler::new(Engine::new(test_config()).unwrap())
}

#[tokio::test]
async fn test_docs_site_scenario() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        html_page(
            "Docs",
            &[
                format!("{}/guide", base),
                "/reference".to_string(),
                "faq".to_string(),
            ],
        ),
    )
    .await;
    mount_page(
        &server,
        "/guide",
        html_page("Guide", &["/".to_string(), "/guide/advanced".to_string()]),
    )
    .await;
    mount_page(&server, "/reference", html_page("Reference", &["/guide".to_string()])).await;
    mount_page(&server, "/faq", html_page("FAQ", &[])).await;
    Mock::given(method("GET"))
        .and(path("/guide/advanced"))
        .respond_with(ResponseTemplate::new(200).set_body_string("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let report = crawler()
        .crawl(
            CrawlConfig::new(format!("{}/", base))
                .with_max_depth(1)
                .with_max_pages(10),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 4);
    assert!(report
        .results
        .iter()
        .all(|r| r.method == FetchMethod::Static));
    assert!(report.frontier_exhausted);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.visited, 4);
}

#[tokio::test]
async fn test_max_pages_bounds_results() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..49).map(|i| format!("/p{}", i)).collect();
    mount_page(&server, "/", html_page("Index", &links)).await;
    for i in 0..49 {
        mount_page(&server, &format!("/p{}", i), html_page(&format!("Page {}", i), &[])).await;
    }

    let report = crawler()
        .crawl(CrawlConfig::new(server.uri()).with_max_pages(5))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 5);
    assert_eq!(report.visited, 5);
    assert!(!report.frontier_exhausted);
}

#[tokio::test]
async fn test_same_domain_only() {
    let server = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("elsewhere"))
        .expect(0)
        .mount(&elsewhere)
        .await;

    // Same machine, different host name
    let external = elsewhere.uri().replace("127.0.0.1", "localhost");
    mount_page(
        &server,
        "/",
        html_page("Home", &[format!("{}/x", external), "/inside".to_string()]),
    )
    .await;
    mount_page(&server, "/inside", html_page("Inside", &[])).await;

    let report = crawler()
        .crawl(CrawlConfig::new(server.uri()))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.url.starts_with(&server.uri())));
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        html_page("Home", &["/private/data".to_string(), "/public".to_string()]),
    )
    .await;
    mount_page(&server, "/public", html_page("Public", &[])).await;
    Mock::given(method("GET"))
        .and(path("/private/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let report = crawler()
        .crawl(CrawlConfig::new(server.uri()))
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 2);

    let ignoring = crawler()
        .crawl(CrawlConfig::new(server.uri()).respect_robots(false).exclude("/private"))
        .await
        .unwrap();
    assert_eq!(ignoring.succeeded(), 2);
}

#[tokio::test]
async fn test_include_patterns_and_failures() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page(
            "Home",
            &[
                "/blog/one".to_string(),
                "/blog/missing".to_string(),
                "/shop/cart".to_string(),
            ],
        ),
    )
    .await;
    mount_page(&server, "/blog/one", html_page("One", &[])).await;

    let report = crawler()
        .crawl(CrawlConfig::new(server.uri()).include("/blog/"))
        .await
        .unwrap();

    // The seed is exempt from include patterns; /shop is filtered out
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(report.failures[0].0.ends_with("/blog/missing"));
    assert!(!report.failures.iter().any(|(url, _)| url.contains("/shop")));
}

#[tokio::test]
async fn test_invalid_pattern_is_a_config_error() {
    let result = crawler()
        .crawl(CrawlConfig::new("http://127.0.0.1:9/").exclude("(unclosed"))
        .await;
    assert!(matches!(result, Err(sumi_harvest::HarvestError::Config(_))));
}
