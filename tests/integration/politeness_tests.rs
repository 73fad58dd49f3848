use std::io::Write;
use std::time::Duration;
use sumi_harvest::config::load_config;
use sumi_harvest::ratelimit::Pacing;
use sumi_harvest::Politeness;
use tokio::time::Instant;

const CONFIG: &str = r#"
[rate-limit]
default-delay = 1.0
max-delay = 30.0

[rate-limit.domains]
"*.slow.test" = 5.0
"api.slow.test" = 2.0

[backoff]
base-delay = 1.0
max-delay = 8.0
multiplier = 2.0

[retry-after]
max-allowed-delay = 10.0
"#;

fn load_politeness() -> Politeness {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let config = load_config(file.path()).unwrap();
    Politeness::from_config(&config).unwrap()
}

#[test]
fn test_overrides_from_config_file() {
    let politeness = load_politeness();
    let limiter = politeness.rate_limiter();

    assert_eq!(limiter.delay_for("api.slow.test"), Duration::from_secs(2));
    assert_eq!(limiter.delay_for("www.slow.test"), Duration::from_secs(5));
    assert_eq!(limiter.delay_for("other.test"), Duration::from_secs(1));
}

#[tokio::test]
async fn test_full_politeness_cycle() {
    tokio::time::pause();
    let politeness = load_politeness();
    let url = "https://www.slow.test/item";

    // First request is free, the second waits out the 5s spacing
    assert_eq!(politeness.before_request(url).await.unwrap().waited(), Duration::ZERO);
    let start = Instant::now();
    politeness.before_request(url).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_millis(5050), "waited {:?}", elapsed);

    // Two failures back off 1s then 2s
    assert_eq!(politeness.on_failure(url).await.unwrap(), Duration::from_secs(1));
    assert_eq!(politeness.on_failure(url).await.unwrap(), Duration::from_secs(2));
    assert_eq!(politeness.backoff().retry_count("www.slow.test"), 2);

    // An hour-long Retry-After is capped and consumed by the next request
    let recorded = politeness
        .on_rate_limited(url, Some("3600"))
        .await
        .unwrap();
    assert_eq!(recorded, Duration::from_secs(10));
    assert_eq!(
        politeness.before_request(url).await.unwrap(),
        Pacing::RetryAfter(Duration::from_secs(10))
    );

    politeness.on_success(url).unwrap();
    assert_eq!(politeness.backoff().retry_count("www.slow.test"), 0);

    // Other hosts were never slowed down
    assert_eq!(
        politeness
            .before_request("https://other.test/")
            .await
            .unwrap()
            .waited(),
        Duration::ZERO
    );
}
