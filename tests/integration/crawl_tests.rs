//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use handbook_crawler::config::Config;
use handbook_crawler::crawler::{run_crawl, run_crawl_with, CrawlStatus};
use handbook_crawler::storage::{GraphStore, SqliteGraphStore};
use handbook_crawler::CrawlError;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with millisecond delays
fn create_test_config(seed_url: &str, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawler.seed_url = seed_url.to_string();
    config.crawler.max_concurrent = 2;
    config.crawler.min_delay = 10;
    config.crawler.max_delay = 20;
    config.crawler.max_retries = 3;
    config.crawler.backoff_base = 10;
    config.crawler.queue_cooldown = 50;
    config.crawler.navigation_timeout = 5000;
    config.user_agent.value = Some("HandbookTestBot/1.0".to_string());
    config.output.database_path = dir
        .path()
        .join("crawl.db")
        .to_string_lossy()
        .to_string();
    config
}

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!(
            "<html><head><title>{}</title></head><body><main>{}</main></body></html>",
            title, body
        ))
}

fn open_store(config: &Config) -> SqliteGraphStore {
    SqliteGraphStore::open(Path::new(&config.output.database_path))
        .expect("Failed to reopen database")
}

#[tokio::test]
async fn test_crawl_follows_links_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .and(header("user-agent", "HandbookTestBot/1.0"))
        .respond_with(html_page(
            "Page A",
            r##"<p>Alpha</p><a href="/a">Self</a><a href="/b">B</a><a href="/a#section">Section</a>"##,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("Page B", r#"<p>Beta</p><a href="/a">Back</a>"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/a", base_url), &temp_dir);

    let report = run_crawl(config.clone()).await.expect("Crawl failed");

    assert_eq!(report.pages, 2);
    assert_eq!(report.links, 1);
    assert_eq!(report.errors, 0);
    assert!(!report.cancelled);

    let store = open_store(&config);
    let page_a = store
        .get_page(&format!("{}/a", base_url))
        .unwrap()
        .expect("Page A should be stored");
    assert_eq!(page_a.content.title, "Page A");
    assert_eq!(page_a.content.blocks[0].content, "Alpha");

    let links = store.outgoing_links(&format!("{}/a", base_url)).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].to, format!("{}/b", base_url));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", r#"<a href="/broken">Broken</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/", base_url), &temp_dir);

    let report = run_crawl(config.clone()).await.expect("Crawl failed");

    assert_eq!(report.pages, 1);
    assert_eq!(report.errors, 3);
    assert_eq!(report.scheduler.failed, 1);

    let store = open_store(&config);
    let errors = store.errors_for(&format!("{}/broken", base_url)).unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.message.contains("500")));
    // The edge is recorded at discovery, before the fetch fails
    assert_eq!(report.links, 1);
}

#[tokio::test]
async fn test_blocked_content_types_are_not_stored() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", r#"<a href="/logo">Logo</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/", base_url), &temp_dir);

    let report = run_crawl(config.clone()).await.expect("Crawl failed");

    assert_eq!(report.pages, 1);
    let store = open_store(&config);
    assert!(store.get_page(&format!("{}/logo", base_url)).unwrap().is_none());
    let errors = store.errors_for(&format!("{}/logo", base_url)).unwrap();
    assert!(errors[0].message.contains("image/png"));
}

#[tokio::test]
async fn test_cross_origin_links_are_not_followed() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            &format!(r#"<a href="{}/elsewhere">Elsewhere</a>"#, other_server.uri()),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(html_page("Other", "<p>nope</p>"))
        .expect(0)
        .mount(&other_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/", mock_server.uri()), &temp_dir);

    let report = run_crawl(config).await.expect("Crawl failed");

    assert_eq!(report.pages, 1);
    assert_eq!(report.links, 0);
}

#[tokio::test]
async fn test_status_tracks_completed_runs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", "<p>Only page</p>"))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/", mock_server.uri()), &temp_dir);
    let status = CrawlStatus::new();

    assert!(status.last_completed().is_none());
    run_crawl_with(config.clone(), &status, CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert!(!status.is_running());
    assert!(status.last_completed().is_some());

    let _held = status.try_begin().unwrap();
    let result = run_crawl_with(config.clone(), &status, CancellationToken::new()).await;
    assert!(matches!(result, Err(CrawlError::AlreadyRunning)));

    // A restarted process sees the stored completion time
    let store = open_store(&config);
    let restored = CrawlStatus::from_store(&store).unwrap();
    let finished = store
        .last_completed_run()
        .unwrap()
        .and_then(|run| run.finished_at);
    assert!(finished.is_some());
    assert_eq!(restored.last_completed(), finished);
}

#[tokio::test]
async fn test_recrawl_overwrites_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("First", "<p>v1</p>"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Second", "<p>v2</p>"))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&format!("{}/", mock_server.uri()), &temp_dir);

    run_crawl(config.clone()).await.expect("First crawl failed");
    let report = run_crawl(config.clone()).await.expect("Second crawl failed");
    assert_eq!(report.pages, 1);

    let store = open_store(&config);
    let page = store
        .get_page(&format!("{}/", mock_server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(page.content.title, "Second");
}
