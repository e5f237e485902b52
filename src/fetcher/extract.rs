//! Transcript extraction from platform watch pages
//!
//! Both the direct strategy and the scraping providers end up holding the
//! same watch-page HTML. This module turns that HTML into a transcript:
//!
//! 1. Find the `ytInitialPlayerResponse` JSON in a `<script>` element
//! 2. Classify the playability status
//! 3. Order the caption tracks by language preference
//! 4. Fetch each candidate track in turn and parse its timed text

use crate::fetcher::strategy::{FailureKind, StrategyError, Transcript};
use crate::state::TranscriptSource;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse";

/// Phrases that only appear on bot-check interstitials
const BLOCK_MARKERS: &[&str] = &[
    "unusual traffic from your computer network",
    "www.google.com/recaptcha",
    "g-recaptcha",
    "/sorry/index",
];

/// The subset of the player response the extractor reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default)]
    pub playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    pub captions: Option<Captions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Captions {
    #[serde(rename = "playerCaptionsTracklistRenderer", default)]
    pub tracklist: Option<Tracklist>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracklist {
    #[serde(default)]
    pub caption_tracks: Vec<CaptionTrack>,
}

/// One caption track offered for an item
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// `"asr"` for automatically generated tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    pub fn source(&self) -> TranscriptSource {
        if self.is_generated() {
            TranscriptSource::AutoGenerated
        } else {
            TranscriptSource::Manual
        }
    }
}

impl PlayerResponse {
    /// Classifies a non-OK playability status
    pub fn check_playability(&self) -> Result<(), StrategyError> {
        let Some(playability) = &self.playability_status else {
            return Ok(());
        };

        let reason = playability.reason.clone().unwrap_or_default();
        match playability.status.as_str() {
            "OK" => Ok(()),
            "LOGIN_REQUIRED" if is_bot_check(&reason) => Err(StrategyError::blocked(format!(
                "bot check: {}",
                reason
            ))),
            status => Err(StrategyError::absent(format!(
                "playability {}: {}",
                status, reason
            ))),
        }
    }

    pub fn tracks(&self) -> &[CaptionTrack] {
        self.captions
            .as_ref()
            .and_then(|c| c.tracklist.as_ref())
            .map(|t| t.caption_tracks.as_slice())
            .unwrap_or(&[])
    }
}

fn is_bot_check(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("not a bot") || reason.contains("unusual traffic")
}

/// Returns true if the page is a captcha or rate-limit interstitial
pub fn is_block_page(html: &str) -> bool {
    let lowered = html.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Parses the player response out of a watch page
///
/// A block page is a `TransientBlock`; a page without a parseable player
/// response is `Unknown`.
pub fn parse_watch_page(html: &str) -> Result<PlayerResponse, StrategyError> {
    if html.trim().is_empty() {
        return Err(StrategyError::unknown("empty page"));
    }

    let json = find_player_response_json(html);
    let Some(json) = json else {
        if is_block_page(html) {
            return Err(StrategyError::blocked("captcha or unusual-traffic page"));
        }
        return Err(StrategyError::unknown("player response not found in page"));
    };

    serde_json::from_str(&json)
        .map_err(|e| StrategyError::unknown(format!("unparseable player response: {}", e)))
}

fn find_player_response_json(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("script") {
        for script in document.select(&selector) {
            let body: String = script.text().collect();
            if let Some(json) = extract_assigned_object(&body, PLAYER_RESPONSE_MARKER) {
                return Some(json.to_string());
            }
        }
    }

    // Some provider renderings flatten scripts; fall back to the raw text
    extract_assigned_object(html, PLAYER_RESPONSE_MARKER).map(str::to_string)
}

/// Returns the balanced `{...}` object assigned to `marker` in `source`
///
/// String literals are skipped so braces inside captions or titles do not
/// unbalance the scan.
fn extract_assigned_object<'a>(source: &'a str, marker: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(found) = source[search_from..].find(marker) {
        let after_marker = search_from + found + marker.len();
        search_from = after_marker;

        let rest = source[after_marker..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        if !rest.starts_with('{') {
            continue;
        }
        let start = source.len() - rest.len();

        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, c) in rest.char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&source[start..start + offset + 1]);
                    }
                }
                _ => {}
            }
        }
        return None;
    }
    None
}

/// Orders tracks by preference
///
/// Manual tracks in a preferred language (in the caller's order), then
/// generated tracks in a preferred language, then every remaining track with
/// manual ones first.
pub fn order_tracks<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Vec<&'a CaptionTrack> {
    let mut ordered: Vec<&CaptionTrack> = Vec::with_capacity(tracks.len());
    let mut push = |track: &'a CaptionTrack| {
        if !ordered.iter().any(|t| std::ptr::eq(*t, track)) {
            ordered.push(track);
        }
    };

    for generated in [false, true] {
        for language in languages {
            for track in tracks {
                if track.is_generated() == generated && &track.language_code == language {
                    push(track);
                }
            }
        }
    }
    for generated in [false, true] {
        for track in tracks {
            if track.is_generated() == generated {
                push(track);
            }
        }
    }

    ordered
}

/// Parses timed-text XML into plain text, one segment per line
///
/// Handles both `<text>` (format 1) and `<p>` (format 3) segments. Entities
/// are decoded, including the double-encoded ones the platform emits, and
/// blank segments are dropped.
pub fn parse_timed_text(xml: &str) -> String {
    let document = Html::parse_document(xml);
    let Ok(selector) = Selector::parse("text, p") else {
        return String::new();
    };

    document
        .select(&selector)
        .map(|segment| {
            let raw: String = segment.text().collect();
            decode_entities(&raw)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes the entities left over after one round of HTML parsing
fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Walks the candidate tracks of a player response and returns the first
/// that yields text
///
/// `base` resolves relative track URLs. `provenance` overrides the per-track
/// source for pages obtained through a scraping provider.
pub async fn fetch_transcript(
    client: &Client,
    response: &PlayerResponse,
    languages: &[String],
    base: &Url,
    provenance: Option<TranscriptSource>,
) -> Result<Transcript, StrategyError> {
    response.check_playability()?;

    let tracks = response.tracks();
    if tracks.is_empty() {
        return Err(StrategyError::absent("no captions available"));
    }

    for track in order_tracks(tracks, languages) {
        let url = match base.join(&track.base_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, language = %track.language_code, "Bad track URL");
                continue;
            }
        };

        let reply = client
            .get(url)
            .send()
            .await
            .map_err(|e| StrategyError::from_reqwest(&e))?;

        let status = reply.status();
        if !status.is_success() {
            let error = StrategyError::from_status(status, true);
            if error.kind == FailureKind::TransientBlock {
                return Err(error);
            }
            tracing::debug!(language = %track.language_code, %status, "Track unavailable");
            continue;
        }

        let body = reply
            .text()
            .await
            .map_err(|e| StrategyError::from_reqwest(&e))?;
        let text = parse_timed_text(&body);
        if text.is_empty() {
            tracing::debug!(language = %track.language_code, "Track is empty");
            continue;
        }

        return Ok(Transcript {
            text,
            source: provenance.unwrap_or_else(|| track.source()),
            language: track.language_code.clone(),
        });
    }

    Err(StrategyError::absent("no caption track yielded text"))
}
