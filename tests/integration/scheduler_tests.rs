//! Concurrency ceiling tests

use crate::common::{html_page, test_config};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::model::FetchRequest;
use sumi_harvest::scheduler::{ProxyRotator, Scheduler};
use sumi_harvest::Engine;
use tokio::time::Instant;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_scheduler_never_exceeds_ceiling() {
    let scheduler = Arc::new(Scheduler::new(
        3,
        Duration::ZERO,
        ProxyRotator::new(Vec::new(), Duration::from_secs(60)),
    ));
    let running = Arc::new(AtomicUsize::new(0));
    let observed_peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let scheduler = Arc::clone(&scheduler);
            let running = Arc::clone(&running);
            let observed_peak = Arc::clone(&observed_peak);
            tokio::spawn(async move {
                let deadline = Instant::now() + Duration::from_secs(10);
                scheduler
                    .run(&format!("host-{}", i), deadline, async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        observed_peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ()>(())
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(matches!(task.await.unwrap(), Ok(Ok(()))));
    }

    assert!(observed_peak.load(Ordering::SeqCst) <= 3);
    let stats = scheduler.stats();
    assert!(stats.peak_active <= 3);
    assert_eq!(stats.completed, 20);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn test_engine_respects_concurrency_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html_page("Page", &[]), "text/html")
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let mut config = test_config();
    config.engine.concurrency = 3;
    let engine = Engine::new(config).unwrap();

    let fetches = (0..20).map(|i| {
        let engine = engine.clone();
        let url = format!("{}/page/{}", server.uri(), i);
        tokio::spawn(async move { engine.fetch(FetchRequest::new(url)).await })
    });
    let results = futures::future::join_all(fetches).await;

    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));
    let stats = engine.stats();
    assert!(stats.peak_active <= 3);
    assert!(stats.peak_active >= 1);
    assert_eq!(stats.completed, 20);
    assert_eq!(server.received_requests().await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_politeness_delay_spaces_same_host_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.engine.politeness_delay_ms = 100;
    let engine = Engine::new(config).unwrap();

    let started = std::time::Instant::now();
    for i in 0..3 {
        engine
            .fetch(FetchRequest::new(format!("{}/{}", server.uri(), i)))
            .await
            .unwrap();
    }

    // Three starts on one host need at least two gaps
    assert!(started.elapsed() >= Duration::from_millis(200));
}
