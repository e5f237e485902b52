//! Third-party scraping providers
//!
//! Each provider renders the watch page from its own network and hands back
//! the HTML. Extraction then runs exactly as for direct access, but the
//! transcript is recorded as `proxy-scraped`.

use crate::config::StrategyCredentials;
use crate::fetcher::direct::watch_url;
use crate::fetcher::extract::{fetch_transcript, parse_watch_page};
use crate::fetcher::strategy::{FetchStrategy, StrategyError, StrategyKind, Transcript};
use crate::state::TranscriptSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Milliseconds ScrapingBee waits after load before returning the page
const SCRAPINGBEE_WAIT_MS: u32 = 3000;

/// Default API base URL for a provider
pub fn default_base_url(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::ScrapingBee => "https://app.scrapingbee.com",
        StrategyKind::ScrapeNinja => "https://scrapeninja.apiroad.net",
        StrategyKind::Firecrawl => "https://api.firecrawl.dev",
        StrategyKind::Direct => "",
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeNinjaReply {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    info: Option<ScrapeNinjaInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeNinjaInfo {
    #[serde(default)]
    status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlReply {
    #[serde(default)]
    data: Option<FirecrawlData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlData {
    #[serde(default)]
    raw_html: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    metadata: Option<FirecrawlMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlMetadata {
    #[serde(default)]
    status_code: Option<u16>,
}

/// A scraping provider strategy (ScrapingBee, ScrapeNinja or Firecrawl)
pub struct ProviderStrategy {
    kind: StrategyKind,
    client: Client,
    api_key: Option<String>,
    api_base: Url,
    watch_base: Url,
}

impl ProviderStrategy {
    /// Creates a provider strategy, resolving its API key once
    pub fn new(
        kind: StrategyKind,
        client: Client,
        credentials: &StrategyCredentials,
        watch_base_url: &str,
    ) -> Result<Self, url::ParseError> {
        let api_base = credentials
            .base_url
            .as_deref()
            .unwrap_or_else(|| default_base_url(kind));

        Ok(Self {
            kind,
            client,
            api_key: credentials.resolve_key(),
            api_base: directory_url(api_base)?,
            watch_base: Url::parse(watch_base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StrategyError> {
        self.api_base
            .join(path)
            .map_err(|e| StrategyError::unknown(format!("bad {} endpoint: {}", self.kind, e)))
    }

    /// Asks the provider to render `target` and returns the page HTML
    async fn request_page(&self, api_key: &str, target: &Url) -> Result<String, StrategyError> {
        match self.kind {
            StrategyKind::ScrapingBee => {
                let wait = SCRAPINGBEE_WAIT_MS.to_string();
                let response = self
                    .client
                    .get(self.endpoint("api/v1/")?)
                    .query(&[
                        ("api_key", api_key),
                        ("url", target.as_str()),
                        ("render_js", "true"),
                        ("wait", wait.as_str()),
                        ("country_code", "us"),
                    ])
                    .send()
                    .await
                    .map_err(|e| StrategyError::from_reqwest(&e))?;

                let response = check_provider_status(response)?;
                response
                    .text()
                    .await
                    .map_err(|e| StrategyError::from_reqwest(&e))
            }
            StrategyKind::ScrapeNinja => {
                let response = self
                    .client
                    .post(self.endpoint("scrape")?)
                    .header("X-Apiroad-Key", api_key)
                    .json(&json!({
                        "url": target.as_str(),
                        "geo": "us",
                        "retryNum": 2,
                        "blockImages": true,
                        "blockMedia": true,
                    }))
                    .send()
                    .await
                    .map_err(|e| StrategyError::from_reqwest(&e))?;

                let reply: ScrapeNinjaReply = check_provider_status(response)?
                    .json()
                    .await
                    .map_err(|e| StrategyError::unknown(format!("bad scrapeninja reply: {}", e)))?;

                if let Some(code) = reply.info.and_then(|info| info.status_code) {
                    check_platform_status(code)?;
                }
                Ok(reply.body.unwrap_or_default())
            }
            StrategyKind::Firecrawl => {
                let response = self
                    .client
                    .post(self.endpoint("v1/scrape")?)
                    .bearer_auth(api_key)
                    .json(&json!({
                        "url": target.as_str(),
                        "formats": ["rawHtml", "html"],
                    }))
                    .send()
                    .await
                    .map_err(|e| StrategyError::from_reqwest(&e))?;

                let reply: FirecrawlReply = check_provider_status(response)?
                    .json()
                    .await
                    .map_err(|e| StrategyError::unknown(format!("bad firecrawl reply: {}", e)))?;

                let data = reply
                    .data
                    .ok_or_else(|| StrategyError::unknown("firecrawl reply without data"))?;
                if let Some(code) = data.metadata.and_then(|m| m.status_code) {
                    check_platform_status(code)?;
                }
                Ok(data.raw_html.or(data.html).unwrap_or_default())
            }
            StrategyKind::Direct => Err(StrategyError::unknown("direct is not a provider")),
        }
    }
}

/// Parses `base` so that relative endpoints join below its last segment
///
/// `Url::join` replaces the final segment of a path without a trailing
/// slash, so `https://proxy/firecrawl` would otherwise lose `firecrawl`.
fn directory_url(base: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn check_provider_status(response: reqwest::Response) -> Result<reqwest::Response, StrategyError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(StrategyError::from_status(status, false))
    }
}

/// Classifies the status the platform returned to the provider
fn check_platform_status(code: u16) -> Result<(), StrategyError> {
    match StatusCode::from_u16(code) {
        Ok(status) if !status.is_success() => Err(StrategyError::from_status(status, true)),
        _ => Ok(()),
    }
}

#[async_trait]
impl FetchStrategy for ProviderStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.kind.is_provider() && self.api_key.is_some()
    }

    async fn attempt_fetch(
        &self,
        item_id: &str,
        languages: &[String],
    ) -> Result<Transcript, StrategyError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(StrategyError::unknown(format!("{} has no API key", self.kind)));
        };

        let target = watch_url(&self.watch_base, item_id);
        let html = self.request_page(api_key, &target).await?;
        tracing::debug!(strategy = %self.kind, item_id, bytes = html.len(), "Provider returned page");

        let player = parse_watch_page(&html)?;
        fetch_transcript(
            &self.client,
            &player,
            languages,
            &self.watch_base,
            Some(TranscriptSource::ProxyScraped),
        )
        .await
    }
}
