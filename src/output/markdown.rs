//! Markdown transcript documents
//!
//! Each transcript becomes `transcripts/NNN-dd-mm-yyyy-<slug>.md` with YAML
//! front matter, an optional TL;DR section and the transcript body.

use crate::output::traits::{OutputResult, RenderContext, Renderer};
use crate::registry::{atomic_write, ItemEntry};
use std::path::PathBuf;

/// Directory under the collection that holds rendered documents
pub const TRANSCRIPTS_DIR: &str = "transcripts";

const MAX_SLUG_CHARS: usize = 80;

/// Renders transcripts as Obsidian-friendly markdown
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for MarkdownRenderer {
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        item: &ItemEntry,
        payload: &str,
        summary: Option<&str>,
    ) -> OutputResult<PathBuf> {
        let relative = PathBuf::from(TRANSCRIPTS_DIR).join(file_name(ctx.index_number, item));
        let document = format_document(ctx, item, payload, summary);

        atomic_write(&ctx.collection_dir.join(&relative), document.as_bytes())?;
        tracing::debug!(item_id = %item.item_id, path = %relative.display(), "Rendered markdown");

        Ok(relative)
    }
}

/// Builds `NNN-dd-mm-yyyy-<slug>.md`
pub fn file_name(index_number: usize, item: &ItemEntry) -> String {
    let title = if item.title.trim().is_empty() {
        item.item_id.as_str()
    } else {
        item.title.as_str()
    };
    let mut slug = slugify(title);
    if slug.is_empty() {
        slug = slugify(&item.item_id);
    }

    format!(
        "{:03}-{}-{}.md",
        index_number,
        item.published_at.format("%d-%m-%Y"),
        slug
    )
}

/// Lowercases `text` and joins its alphanumeric runs with `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.chars().count() > MAX_SLUG_CHARS {
        slug = slug.chars().take(MAX_SLUG_CHARS).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Formats seconds as `h:mm:ss`
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// YAML double-quoted scalar; JSON string syntax is a subset of it
fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.replace('"', "'")))
}

/// Formats the full markdown document for an item
pub fn format_document(
    ctx: &RenderContext<'_>,
    item: &ItemEntry,
    payload: &str,
    summary: Option<&str>,
) -> String {
    let title = if item.title.trim().is_empty() {
        &item.item_id
    } else {
        &item.title
    };

    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("title: {}\n", quoted(title)));
    md.push_str(&format!("collection: {}\n", quoted(ctx.header.label())));
    md.push_str(&format!("item_id: {}\n", quoted(&item.item_id)));
    if let Some(url) = &item.url {
        md.push_str(&format!("url: {}\n", quoted(url)));
    }
    md.push_str(&format!(
        "published_at: {}\n",
        quoted(&item.published_at.to_rfc3339())
    ));
    if let Some(duration) = item.duration_sec {
        md.push_str(&format!("duration: {}\n", quoted(&format_duration(duration))));
    }
    for (key, value) in [
        ("view_count", item.view_count),
        ("like_count", item.like_count),
        ("comment_count", item.comment_count),
    ] {
        if let Some(value) = value {
            md.push_str(&format!("{}: {}\n", key, value));
        }
    }
    if let Some(tags) = &item.tags {
        let tags: Vec<String> = tags.iter().map(|t| quoted(t)).collect();
        md.push_str(&format!("tags: [{}]\n", tags.join(", ")));
    }
    if let Some(source) = item.source {
        md.push_str(&format!("source: {}\n", quoted(source.as_str())));
    }
    if let Some(language) = &item.language {
        md.push_str(&format!("language: {}\n", quoted(language)));
    }
    md.push_str("---\n\n");

    if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
        md.push_str("# TL;DR\n\n");
        md.push_str(summary);
        md.push_str("\n\n");
    }

    md.push_str("# Transcript\n\n");
    let body = payload.trim();
    if body.is_empty() {
        md.push_str("_Transcript unavailable._");
    } else {
        md.push_str(body);
    }
    md.push('\n');

    md
}
