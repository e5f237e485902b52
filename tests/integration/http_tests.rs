//! Strategies against mock platform and provider servers

use crate::common::languages;
use antenna::config::{FetchConfig, StrategyCredentials};
use antenna::fetcher::{
    build_http_client, DirectStrategy, FailureKind, FetchStrategy, HealthProbe, ProviderStrategy,
    StrategyKind,
};
use antenna::TranscriptSource;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A watch page with one manual English track and one generated German track
fn watch_page() -> String {
    r#"<html><head><title>Video</title></head><body>
    <script>var ytInitialPlayerResponse = {"playabilityStatus":{"status":"OK"},
    "captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
      {"baseUrl":"/api/timedtext?v=v1&lang=de","languageCode":"de","kind":"asr"},
      {"baseUrl":"/api/timedtext?v=v1&lang=en","languageCode":"en"}
    ]}}};</script>
    </body></html>"#
        .to_string()
}

const TIMED_TEXT: &str = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0.0" dur="1.5">Hello &amp;amp; welcome</text>
<text start="1.5" dur="2.0">to the show</text>
</transcript>"#;

fn client() -> reqwest::Client {
    build_http_client(&FetchConfig::default()).unwrap()
}

async fn mount_timed_text(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TIMED_TEXT))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_direct_fetches_preferred_manual_track() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(watch_page()))
        .mount(&server)
        .await;
    mount_timed_text(&server).await;

    let strategy = DirectStrategy::new(client(), &server.uri()).unwrap();
    let transcript = strategy.attempt_fetch("v1", &languages()).await.unwrap();

    assert_eq!(transcript.text, "Hello & welcome\nto the show");
    assert_eq!(transcript.source, TranscriptSource::Manual);
    assert_eq!(transcript.language, "en");
}

#[tokio::test]
async fn test_direct_classifies_platform_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .and(query_param("v", "broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let strategy = DirectStrategy::new(client(), &server.uri()).unwrap();
    let kind = |id: &'static str| {
        let strategy = &strategy;
        async move { strategy.attempt_fetch(id, &languages()).await.unwrap_err().kind }
    };

    assert_eq!(kind("limited").await, FailureKind::TransientBlock);
    assert_eq!(kind("gone").await, FailureKind::ContentAbsent);
    assert_eq!(kind("broken").await, FailureKind::Unknown);
}

#[tokio::test]
async fn test_direct_without_captions_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<script>var ytInitialPlayerResponse = {"playabilityStatus":{"status":"OK"}};</script>"#,
        ))
        .mount(&server)
        .await;

    let strategy = DirectStrategy::new(client(), &server.uri()).unwrap();
    let error = strategy.attempt_fetch("v1", &languages()).await.unwrap_err();
    assert_eq!(error.kind, FailureKind::ContentAbsent);
}

#[tokio::test]
async fn test_scrapeninja_marks_proxy_provenance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(header("X-Apiroad-Key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {"statusCode": 200},
            "body": watch_page(),
        })))
        .mount(&server)
        .await;
    mount_timed_text(&server).await;

    let credentials = StrategyCredentials {
        api_key: Some("secret".to_string()),
        api_key_env: None,
        base_url: Some(server.uri()),
    };
    let strategy =
        ProviderStrategy::new(StrategyKind::ScrapeNinja, client(), &credentials, &server.uri())
            .unwrap();
    assert!(strategy.is_configured());

    let transcript = strategy.attempt_fetch("v1", &languages()).await.unwrap();
    assert_eq!(transcript.source, TranscriptSource::ProxyScraped);
    assert_eq!(transcript.text, "Hello & welcome\nto the show");
}

#[tokio::test]
async fn test_scrapingbee_rate_limit_is_a_block() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/"))
        .and(query_param("api_key", "secret"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let credentials = StrategyCredentials {
        api_key: Some("secret".to_string()),
        api_key_env: None,
        base_url: Some(server.uri()),
    };
    let strategy =
        ProviderStrategy::new(StrategyKind::ScrapingBee, client(), &credentials, &server.uri())
            .unwrap();

    let error = strategy.attempt_fetch("v1", &languages()).await.unwrap_err();
    assert_eq!(error.kind, FailureKind::TransientBlock);
}

fn provider(kind: StrategyKind, server: &MockServer) -> ProviderStrategy {
    let credentials = StrategyCredentials {
        api_key: Some("secret".to_string()),
        api_key_env: None,
        base_url: Some(server.uri()),
    };
    ProviderStrategy::new(kind, client(), &credentials, &server.uri()).unwrap()
}

/// Mounts a Firecrawl scrape endpoint that reports `status_code` for the page
async fn mount_firecrawl(server: &MockServer, status_code: u16, raw_html: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/scrape"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(serde_json::json!({
            "formats": ["rawHtml", "html"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": {
                "rawHtml": raw_html,
                "metadata": {"statusCode": status_code},
            },
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_firecrawl_reads_raw_html() {
    let server = MockServer::start().await;
    mount_firecrawl(&server, 200, &watch_page()).await;
    mount_timed_text(&server).await;

    let strategy = provider(StrategyKind::Firecrawl, &server);
    let transcript = strategy.attempt_fetch("v1", &languages()).await.unwrap();
    assert_eq!(transcript.source, TranscriptSource::ProxyScraped);
    assert_eq!(transcript.text, "Hello & welcome\nto the show");
}

#[tokio::test]
async fn test_firecrawl_classifies_platform_status() {
    let limited = MockServer::start().await;
    mount_firecrawl(&limited, 429, "").await;
    let error = provider(StrategyKind::Firecrawl, &limited)
        .attempt_fetch("v1", &languages())
        .await
        .unwrap_err();
    assert_eq!(error.kind, FailureKind::TransientBlock);

    let gone = MockServer::start().await;
    mount_firecrawl(&gone, 404, "").await;
    let error = provider(StrategyKind::Firecrawl, &gone)
        .attempt_fetch("v1", &languages())
        .await
        .unwrap_err();
    assert_eq!(error.kind, FailureKind::ContentAbsent);
}

#[tokio::test]
async fn test_provider_relaying_captcha_page_is_a_block() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body>Our systems have detected unusual traffic from your computer network.</body></html>",
        ))
        .mount(&server)
        .await;

    let error = provider(StrategyKind::ScrapingBee, &server)
        .attempt_fetch("v1", &languages())
        .await
        .unwrap_err();
    assert_eq!(error.kind, FailureKind::TransientBlock);

    // Firecrawl reporting success for a captcha page is still a block
    let relayed = MockServer::start().await;
    mount_firecrawl(
        &relayed,
        200,
        "<html><body><div class=\"g-recaptcha\"></div></body></html>",
    )
    .await;
    let error = provider(StrategyKind::Firecrawl, &relayed)
        .attempt_fetch("v1", &languages())
        .await
        .unwrap_err();
    assert_eq!(error.kind, FailureKind::TransientBlock);
}

#[tokio::test]
async fn test_probe_reports_block_and_clear() {
    let blocked = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body>Our systems have detected unusual traffic from your computer network.</body></html>",
        ))
        .mount(&blocked)
        .await;

    let probe = HealthProbe::new("jNQXAC9IVRw", languages());
    let cancel = CancellationToken::new();

    let strategy = DirectStrategy::new(client(), &blocked.uri()).unwrap();
    let report = probe.probe_strategy(&strategy, &cancel).await;
    assert!(report.is_blocked);
    assert_eq!(report.strategy, Some("direct"));

    // A missing reference item is not a block
    let missing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&missing)
        .await;

    let strategy = DirectStrategy::new(client(), &missing.uri()).unwrap();
    let report = probe.probe_strategy(&strategy, &cancel).await;
    assert!(!report.is_blocked);
}
