#![forbid(unsafe_code)]

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{ids, pipeline, started, FakeSource};
use tokio::time::Instant;
use vitrine_core::{ItemId, VitrineError};

#[tokio::test(start_paused = true)]
async fn sliding_window_of_twenty_over_twenty_five_items() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(50)));
    let p = pipeline(source.clone());
    let input = ids(25);
    let t0 = Instant::now();

    let batch = p.run_batch(input.clone()).await;
    assert_eq!(batch.dispatched(), 25);
    assert_eq!(p.gallery().ids(), input);

    let report = batch.wait_loaded().await;
    assert_eq!(report.loaded.len(), 25);
    assert!(report.failed.is_empty());

    let starts = source.starts();
    assert_eq!(starts.len(), 25);
    let first: HashSet<ItemId> = starts[..20].iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(first, input[..20].iter().cloned().collect::<HashSet<_>>());
    for (id, at) in &starts[..20] {
        assert_eq!(*at, t0, "{id} should start immediately");
    }
    for (id, at) in &starts[20..] {
        assert!(*at >= t0 + Duration::from_millis(50), "{id} started before a slot freed");
    }
    assert_eq!(source.peak(), 20);
    assert_eq!(p.limiter().counter().peak(), 20);
    assert_eq!(p.limiter().counter().current(), 0);
}

#[tokio::test(start_paused = true)]
async fn all_placeholders_exist_before_any_load_completes() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(50)));
    let p = Arc::new(pipeline(source.clone()));
    let input = ids(25);

    let runner = {
        let p = p.clone();
        let input = input.clone();
        tokio::spawn(async move { p.run_batch(input).await })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(p.gallery().ids(), input);
    assert_eq!(source.completed(), 0);
    assert!(p.limiter().counter().current() <= 20);

    let report = runner.await.expect("batch task").wait_loaded().await;
    assert_eq!(report.loaded, input);
}

#[tokio::test(start_paused = true)]
async fn never_more_than_the_limit_in_flight() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(7)));
    let p = pipeline(source.clone());
    let report = p.run_batch(ids(97)).await.wait_loaded().await;
    assert_eq!(report.loaded.len(), 97);
    assert!(source.peak() <= 20);
    assert!(p.limiter().counter().peak() <= 20);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_is_item_scoped() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(10)).failing("item03"));
    let (p, _engine) = started(source.clone(), Duration::ZERO);
    let report = p.run_batch(ids(6)).await.wait_loaded().await;

    assert_eq!(report.loaded.len(), 5);
    assert_eq!(report.failed.len(), 1);
    let (id, err) = &report.failed[0];
    assert_eq!(id.as_str(), "item03");
    assert!(err.is_fetch());
    assert_eq!(p.limiter().counter().current(), 0, "failed jobs release their slot");

    let failed = p.record(id).expect("placeholder kept");
    assert!(failed.raw().is_none());
    assert!(failed.actions().is_none());
    assert!(matches!(p.download(id), Err(VitrineError::NotLoaded(_))));
    assert!(p.download(&ItemId::from("item04")).is_ok());
}

#[tokio::test(start_paused = true)]
async fn duplicate_identifiers_get_one_placeholder() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(5)));
    let p = pipeline(source.clone());
    let input: Vec<ItemId> = ["b", "a", "b", "c"].into_iter().map(ItemId::from).collect();
    let batch = p.run_batch(input).await;
    assert_eq!(batch.skipped(), 1);
    assert_eq!(batch.dispatched(), 3);
    batch.wait_loaded().await;
    let order: Vec<String> = p.gallery().ids().iter().map(|i| i.to_string()).collect();
    assert_eq!(order, vec!["b", "a", "c"]);
    assert_eq!(source.starts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn load_all_uses_the_listing() {
    let source = Arc::new(FakeSource::new(Duration::from_millis(5)).with_list(ids(3)));
    let p = pipeline(source.clone());
    let report = p.load_all().await.expect("listing").wait_loaded().await;
    assert_eq!(report.loaded, ids(3));
}

#[tokio::test(start_paused = true)]
async fn panicking_load_is_reported_as_aborted_not_fetch() {
    use bytes::Bytes;
    use vitrine_core::{ItemSource, PipelineConfig, VitrineResult};
    use vitrine_pipeline::{GridLayout, Pipeline, Viewport};

    struct Crashy;
    #[async_trait::async_trait]
    impl ItemSource for Crashy {
        async fn list(&self) -> VitrineResult<Vec<ItemId>> { Ok(Vec::new()) }
        async fn fetch(&self, id: &ItemId) -> VitrineResult<Bytes> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if id.as_str() == "item01" {
                panic!("decoder bug");
            }
            Ok(Bytes::from(id.to_string()))
        }
        async fn attribution(&self, _id: &ItemId) -> VitrineResult<String> { Ok("plent".into()) }
    }

    let p = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(Crashy),
        Arc::new(GridLayout::new(1, 100.0)),
        Viewport::new(300.0),
    );
    let report = p.run_batch(ids(3)).await.wait_loaded().await;
    assert_eq!(report.loaded.len(), 2);
    let (id, err) = &report.failed[0];
    assert_eq!(id.as_str(), "item01");
    assert!(matches!(err, VitrineError::Aborted { .. }));
    assert!(!err.is_fetch());
    assert_eq!(p.limiter().counter().current(), 0);
}
