use crate::{create_test_config, product_page};
use serde_json::json;
use std::time::{Duration, Instant};
use sumi_harvest::crawler::Harvester;
use sumi_harvest::report::HarvestSummary;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_page_harvested_end_to_end() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/widget"))
        .respond_with(html(product_page("Widget")))
        .expect(1)
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let context = harvester
        .harvest_one(&format!("{}/widget", server.uri()))
        .await;

    assert!(context.is_success(), "errors: {:?}", context.errors());
    assert!(context.robots_allowed);

    let result = context.final_result.as_ref().unwrap();
    assert_eq!(result["@type"], "Product");
    assert_eq!(result["name"], "Widget");
    assert_eq!(result["title"], "Widget page");
    assert_eq!(result["_sources"], json!(["json_ld", "metadata"]));

    for stage in ["robots_check", "fetch", "extract", "merge"] {
        assert!(context.stage_times.contains_key(stage), "no timing for {}", stage);
    }
}

#[tokio::test]
async fn test_retry_after_is_honored_before_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(html(product_page("Gadget")))
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let start = Instant::now();
    let context = harvester.harvest_one(&format!("{}/busy", server.uri())).await;

    assert!(context.is_success(), "errors: {:?}", context.errors());
    assert!(start.elapsed() >= Duration::from_secs(1));

    let politeness = harvester.politeness().unwrap();
    let stats = politeness.retry_after().stats("127.0.0.1").unwrap();
    assert_eq!(stats.applications, 1);
    assert_eq!(stats.pending, None);
    assert_eq!(politeness.backoff().retry_count("127.0.0.1"), 0);
}

#[tokio::test]
async fn test_server_errors_back_off_then_succeed() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html(product_page("Sprocket")))
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let context = harvester.harvest_one(&format!("{}/flaky", server.uri())).await;

    assert!(context.is_success(), "errors: {:?}", context.errors());
    let backoff = harvester.politeness().unwrap().backoff();
    let stats = backoff.stats("127.0.0.1").unwrap();
    assert_eq!(stats.applications, 2);
    assert_eq!(stats.current_retry_count, 0);
}

#[tokio::test]
async fn test_robots_disallow_stops_before_fetch() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html(product_page("Secret")))
        .expect(0)
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let context = harvester
        .harvest_one(&format!("{}/private/page", server.uri()))
        .await;

    assert!(context.is_failed());
    assert!(!context.robots_allowed);
    assert_eq!(context.errors()[0].stage, "robots_check");
    assert_eq!(context.errors()[0].message, "URL is disallowed by robots.txt");
    assert!(context.html_content.is_none());
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let context = harvester.harvest_one(&format!("{}/missing", server.uri())).await;

    assert!(context.is_failed());
    assert_eq!(context.retry_count(), 0);
    let messages: Vec<&str> = context.errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["Fetch failed: HTTP 404", "Stage fetch failed"]);
}

#[tokio::test]
async fn test_non_html_content_is_rejected() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4".to_vec())
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&server)
        .await;

    let harvester = Harvester::from_config(create_test_config()).unwrap();
    let context = harvester
        .harvest_one(&format!("{}/report.pdf", server.uri()))
        .await;

    assert!(context.is_failed());
    assert_eq!(
        context.errors()[0].message,
        "Fetch failed: not an HTML page (application/pdf)"
    );
}

#[tokio::test]
async fn test_harvest_many_pages_on_one_site() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(html(product_page(name)))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config();
    config.rate_limit.default_delay = 0.2;
    config.crawler.max_concurrent_pages = 3;
    let harvester = Harvester::from_config(config).unwrap();

    let urls: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|name| format!("{}/{}", server.uri(), name))
        .collect();

    let start = Instant::now();
    let contexts = harvester.harvest(&urls).await;

    // robots.txt plus three pages, all spaced on the same host
    assert!(start.elapsed() >= Duration::from_millis(600));

    let names: Vec<_> = contexts
        .iter()
        .map(|c| c.final_result.as_ref().unwrap()["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);

    let limiter = harvester.politeness().unwrap().rate_limiter();
    let summary = HarvestSummary::from_contexts(&contexts).with_domain_stats(limiter.all_stats());
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.domains.len(), 1);
    assert!(summary.domains[0].1.total_requests >= 4);
}
