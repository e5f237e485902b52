//! Direct access to the content platform
//!
//! Fetches the watch page from the platform itself, without a scraping
//! provider in between. This is the cheapest strategy and the one most
//! likely to be blocked.

use crate::fetcher::extract::{fetch_transcript, parse_watch_page};
use crate::fetcher::strategy::{FetchStrategy, StrategyError, StrategyKind, Transcript};
use async_trait::async_trait;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::Client;
use url::Url;

/// Builds the public watch-page URL for an item
pub fn watch_url(base: &Url, item_id: &str) -> Url {
    let mut url = base.clone();
    url.set_path("/watch");
    url.set_query(None);
    url.query_pairs_mut().append_pair("v", item_id);
    url
}

pub struct DirectStrategy {
    client: Client,
    base: Url,
}

impl DirectStrategy {
    pub fn new(client: Client, watch_base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base: Url::parse(watch_base_url)?,
        })
    }
}

#[async_trait]
impl FetchStrategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn attempt_fetch(
        &self,
        item_id: &str,
        languages: &[String],
    ) -> Result<Transcript, StrategyError> {
        let url = watch_url(&self.base, item_id);
        let accept_language = languages.join(",");

        let response = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, accept_language)
            .send()
            .await
            .map_err(|e| StrategyError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::from_status(status, true));
        }

        let html = response
            .text()
            .await
            .map_err(|e| StrategyError::from_reqwest(&e))?;

        let player = parse_watch_page(&html)?;
        fetch_transcript(&self.client, &player, languages, &self.base, None).await
    }
}
