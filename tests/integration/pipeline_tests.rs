//! End-to-end pipeline runs over a temporary vault

use crate::common::{transcript, RecordingSleeper, Scripted};
use antenna::config::OnBlock;
use antenna::discovery::{DescriptorFile, ResolvedCollection};
use antenna::fetcher::{
    FetchChain, HealthProbe, RetryController, RetryPolicy, StrategyError, StrategyKind,
};
use antenna::pipeline::{Pipeline, RunOptions};
use antenna::registry::{apply_status, pending, RegistryStore, StatusUpdate};
use antenna::{AntennaError, Stage, TranscriptSource};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn chain(strategies: Vec<Scripted>) -> FetchChain {
    FetchChain::new(
        strategies
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn antenna::fetcher::FetchStrategy>)
            .collect(),
        RetryController::with_sleeper(
            RetryPolicy::default().without_jitter(),
            Arc::new(RecordingSleeper::default()),
        ),
    )
}

fn collection() -> ResolvedCollection {
    ResolvedCollection {
        collection_id: "UC1".to_string(),
        display_name: Some("Channel".to_string()),
        handle: None,
    }
}

fn write_descriptors(dir: &Path) -> DescriptorFile {
    let path = dir.join("items.json");
    std::fs::write(
        &path,
        r#"[
            {"item_id": "v1", "title": "A", "published_at": "2024-01-01"},
            {"item_id": "v2", "title": "B", "published_at": "2024-02-01"}
        ]"#,
    )
    .unwrap();
    DescriptorFile::new(path)
}

#[tokio::test]
async fn test_discover_fetch_render_and_reload() {
    let vault = tempdir().unwrap();
    let dir = vault.path().join("Channel");

    let blocked = Scripted::always(StrategyKind::ScrapingBee, Err(StrategyError::blocked("HTTP 429")));
    let provider = Scripted::new(
        StrategyKind::ScrapeNinja,
        vec![
            Ok(transcript("hello", TranscriptSource::ProxyScraped)),
            Err(StrategyError::absent("no captions")),
        ],
    );
    let pipeline = Pipeline::new(&dir, RegistryStore::unlocked(), chain(vec![blocked, provider]));

    pipeline.init_collection(&collection()).await.unwrap();
    let report = pipeline
        .discover(&write_descriptors(vault.path()), &[])
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);

    let registry = pipeline.load().unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.items.values().all(|e| e.status == Default::default()));

    let summary = pipeline
        .run(&RunOptions {
            probe: false,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.absent, 1);
    assert_eq!(summary.rendered, 1);

    let registry = pipeline.load().unwrap();
    let v1 = registry.get("v1").unwrap();
    assert!(v1.status.transcript_downloaded);
    assert!(v1.status.markdown_generated);
    assert_eq!(v1.source, Some(TranscriptSource::ProxyScraped));
    assert_eq!(
        v1.path_rendered.as_deref(),
        Some("transcripts/001-01-01-2024-a.md")
    );
    assert!(!registry.get("v2").unwrap().status.transcript_downloaded);

    // A fresh store sees the same logical state
    let reloaded = RegistryStore::unlocked().load(&dir).unwrap();
    assert_eq!(reloaded, registry);
    assert_eq!(pending(&reloaded, Stage::Fetch).len(), 1);

    let doc = std::fs::read_to_string(dir.join("transcripts/001-01-01-2024-a.md")).unwrap();
    assert!(doc.contains("source: \"proxy-scraped\""));
    assert!(doc.ends_with("hello\n"));
}

#[tokio::test]
async fn test_rediscovery_keeps_progress() {
    let vault = tempdir().unwrap();
    let dir = vault.path().join("Channel");
    let pipeline = Pipeline::new(
        &dir,
        RegistryStore::unlocked(),
        chain(vec![Scripted::always(
            StrategyKind::Direct,
            Ok(transcript("hello", TranscriptSource::Manual)),
        )]),
    );
    let descriptors = write_descriptors(vault.path());

    pipeline.init_collection(&collection()).await.unwrap();
    pipeline.discover(&descriptors, &[]).await.unwrap();
    pipeline
        .run(&RunOptions {
            probe: false,
            ..Default::default()
        })
        .await
        .unwrap();

    let report = pipeline.discover(&descriptors, &[]).await.unwrap();
    assert_eq!(report.inserted, 0);

    let registry = pipeline.load().unwrap();
    assert!(registry
        .items
        .values()
        .all(|e| e.status.transcript_downloaded && e.status.markdown_generated));
}

#[tokio::test]
async fn test_blocked_probe_aborts_unless_forced() {
    let vault = tempdir().unwrap();
    let dir = vault.path().join("Channel");
    let direct = Scripted::always(StrategyKind::Direct, Err(StrategyError::blocked("captcha")));
    let calls = direct.counter();

    let pipeline = Pipeline::new(&dir, RegistryStore::unlocked(), chain(vec![direct]))
        .with_probe(HealthProbe::new("ref", vec!["en".to_string()]), OnBlock::Abort);
    pipeline.init_collection(&collection()).await.unwrap();
    pipeline.discover(&write_descriptors(vault.path()), &[]).await.unwrap();

    let result = pipeline.run(&RunOptions::default()).await;
    assert!(matches!(result, Err(AntennaError::Blocked { .. })));
    // Only the probe attempt was made
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let summary = pipeline
        .run(&RunOptions {
            force: true,
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.exhausted, 1);
    assert_eq!(summary.fetched, 0);
}

#[tokio::test]
async fn test_render_stage_recovers_from_raw_payload() {
    let vault = tempdir().unwrap();
    let dir = vault.path().join("Channel");
    let pipeline = Pipeline::new(
        &dir,
        RegistryStore::unlocked(),
        chain(vec![Scripted::always(
            StrategyKind::Direct,
            Ok(transcript("hello", TranscriptSource::Manual)),
        )]),
    );
    pipeline.init_collection(&collection()).await.unwrap();
    pipeline.discover(&write_descriptors(vault.path()), &[]).await.unwrap();
    pipeline
        .run(&RunOptions {
            probe: false,
            ..Default::default()
        })
        .await
        .unwrap();

    // Simulate a crash between download and render
    let mut update = StatusUpdate::new();
    update.markdown_generated = Some(false);
    RegistryStore::unlocked()
        .update(&dir, |registry| {
            apply_status(registry, "v2", update.overriding(), chrono::Utc::now())
        })
        .unwrap();
    assert_eq!(pending(&pipeline.load().unwrap(), Stage::Render).len(), 1);

    let summary = pipeline
        .run(&RunOptions {
            stages: vec![Stage::Render],
            probe: false,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.rendered, 1);
    assert!(pending(&pipeline.load().unwrap(), Stage::Render).is_empty());
}

#[tokio::test]
async fn test_dotted_item_id_does_not_block_later_items() {
    let vault = tempdir().unwrap();
    let dir = vault.path().join("Channel");
    let path = vault.path().join("items.json");
    std::fs::write(
        &path,
        r#"[
            {"item_id": "v.1", "title": "A", "published_at": "2024-01-01"},
            {"item_id": "v2", "title": "B", "published_at": "2024-02-01"}
        ]"#,
    )
    .unwrap();

    let pipeline = Pipeline::new(
        &dir,
        RegistryStore::unlocked(),
        chain(vec![Scripted::always(
            StrategyKind::Direct,
            Ok(transcript("hello", TranscriptSource::Manual)),
        )]),
    );
    pipeline.init_collection(&collection()).await.unwrap();
    pipeline.discover(&DescriptorFile::new(path), &[]).await.unwrap();

    let summary = pipeline
        .run(&RunOptions {
            probe: false,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.store_failed, 0);

    let registry = pipeline.load().unwrap();
    assert!(registry.get("v2").unwrap().status.transcript_downloaded);
    let dotted = registry.get("v.1").unwrap();
    assert!(dotted.status.markdown_generated);
    let raw = dotted.path_raw.as_deref().unwrap();
    assert_eq!(std::fs::read_to_string(dir.join(raw)).unwrap(), "hello");
}
