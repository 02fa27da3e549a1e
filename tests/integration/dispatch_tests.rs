//! Job queue tests with on-disk databases

use crate::common::{html_page, mount_page, test_config};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::Config;
use sumi_harvest::dispatch::{JobQueue, JobStatus, QueueStatus, SqliteJobQueue, WorkerPool};
use sumi_harvest::model::{FetchErrorKind, FetchRequest};
use sumi_harvest::Engine;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn queue_config(dir: &TempDir) -> Config {
    let mut config = test_config();
    config.queue.database_path = dir.path().join("queue.db").display().to_string();
    config.queue.max_attempts = 2;
    config.queue.backoff_base_ms = 0;
    config.queue.poll_interval_ms = 10;
    config.queue.workers = 3;
    config
}

fn open(config: &Config) -> Arc<SqliteJobQueue> {
    Arc::new(
        SqliteJobQueue::open(Path::new(&config.queue.database_path), &config.queue).unwrap(),
    )
}

async fn wait_until_drained(queue: &SqliteJobQueue) -> QueueStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = queue.status().unwrap();
            if status.is_drained() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue did not drain")
}

#[tokio::test]
async fn test_workers_complete_and_exhaust_jobs() {
    let server = MockServer::start().await;
    for i in 0..4 {
        mount_page(&server, &format!("/ok/{}", i), html_page(&format!("Ok {}", i), &[])).await;
    }
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = queue_config(&dir);
    let queue = open(&config);

    let mut ok_ids = Vec::new();
    for i in 0..4 {
        ok_ids.push(
            queue
                .enqueue(&FetchRequest::new(format!("{}/ok/{}", server.uri(), i)))
                .unwrap(),
        );
    }
    let broken = queue
        .enqueue(&FetchRequest::new(format!("{}/broken", server.uri())))
        .unwrap();

    let engine = Engine::new(config.clone()).unwrap();
    let pool = WorkerPool::new(engine, queue.clone(), &config.queue);
    pool.start();
    let status = wait_until_drained(&queue).await;
    pool.shutdown().await;

    assert_eq!(
        status,
        QueueStatus {
            completed: 4,
            failed: 1,
            ..QueueStatus::default()
        }
    );

    for id in ok_ids {
        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.unwrap().title().unwrap().starts_with("Ok"));
    }

    let job = queue.get(broken).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    let error = job.last_error.unwrap();
    assert_eq!(error.kind, FetchErrorKind::QueueExhausted);
    assert!(error.message.contains("gave up after 2"));
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = queue_config(&dir);

    let id = {
        let queue = open(&config);
        queue
            .enqueue(&FetchRequest::new("https://example.test/later").with_retries(3))
            .unwrap()
    };

    let queue = open(&config);
    let job = queue.get(id).unwrap();
    assert_eq!(job.status, JobStatus::Waiting);
    assert_eq!(job.request.retries, Some(3));
    assert_eq!(queue.status().unwrap().waiting, 1);
}

#[tokio::test]
async fn test_stale_claims_are_recovered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = queue_config(&dir);

    let id = {
        let queue = open(&config);
        let id = queue
            .enqueue(&FetchRequest::new("https://example.test/crashy"))
            .unwrap();
        // A worker claims the job and dies before recording anything
        assert_eq!(queue.claim_next().unwrap().unwrap().id, id);
        id
    };

    let queue = open(&config);
    assert_eq!(queue.status().unwrap().active, 1);
    assert_eq!(queue.recover_stale(Duration::ZERO).unwrap(), 1);
    assert_eq!(queue.get(id).unwrap().status, JobStatus::Waiting);
}
