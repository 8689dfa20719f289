mod common;

use common::{ScriptedFetcher, Source, TOKEN, eventually, harness, harness_with, id, test_config};
use image_ingest::error::AppError;
use image_ingest::pipeline::{Delivery, DispatchOutcome};
use image_ingest::queue::RedeliveryMarker;
use image_ingest::records::RecordStore;
use image_ingest::serving::ServingHandles;

const IMG: &str = "https://example.test/img.jpg";

#[tokio::test]
async fn test_external_dispatch_only_enqueues() {
    let h = harness();
    h.fetcher.respond(IMG, Source::jpeg(16));

    let outcome = h
        .app
        .dispatcher
        .dispatch("42", IMG, Delivery::External)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Scheduled { .. }));
    assert_eq!(h.fetcher.calls(), 0);
    assert!(h.objects.is_empty().await);
}

#[tokio::test]
async fn test_external_dispatch_rejects_bad_input_before_enqueue() {
    let h = harness();

    let err = h
        .app
        .dispatcher
        .dispatch("", IMG, Delivery::External)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = h
        .app
        .dispatcher
        .dispatch("42", "not a url", Delivery::External)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_redelivery_runs_synchronously() {
    let h = harness();
    h.fetcher.respond(IMG, Source::jpeg(16));
    let marker = RedeliveryMarker::verify(Some(TOKEN), &h.app.config.queue).unwrap();

    let outcome = h
        .app
        .dispatcher
        .dispatch("42", IMG, Delivery::Redelivery(marker))
        .await
        .unwrap();

    let DispatchOutcome::Completed { serving_url } = outcome else {
        panic!("expected a completed dispatch");
    };
    assert_eq!(h.fetcher.calls(), 1);
    assert!(h.handles.resolve(&serving_url).await.unwrap().is_some());
}

#[tokio::test]
async fn test_worker_completes_scheduled_ingestion() {
    let h = harness();
    h.fetcher.respond(IMG, Source::jpeg(16));
    let worker = h.app.start_worker().unwrap();
    assert!(h.app.start_worker().is_none());

    h.app
        .dispatcher
        .dispatch("42", IMG, Delivery::External)
        .await
        .unwrap();

    let records = h.records.clone();
    let done = eventually(|| {
        let records = records.clone();
        async move {
            records
                .get_link(&id("42"))
                .await
                .unwrap()
                .is_some_and(|link| link.display_url.is_some())
        }
    })
    .await;
    assert!(done);

    worker.shutdown().await;
}

#[tokio::test]
async fn test_failing_source_is_retried_then_dead_lettered() {
    let h = harness();
    h.fetcher.respond(IMG, Source::Status(500));
    let worker = h.app.start_worker().unwrap();
    let dead_letters = worker.dead_letters();

    h.app
        .dispatcher
        .dispatch("42", IMG, Delivery::External)
        .await
        .unwrap();

    let log = dead_letters.clone();
    assert!(eventually(|| {
        let log = log.clone();
        async move { log.len() == 1 }
    })
    .await);

    // One delivery plus the default two retries.
    assert_eq!(h.fetcher.calls(), 3);
    let letter = &dead_letters.snapshot()[0];
    assert_eq!(letter.task.resource_id, "42");
    assert_eq!(letter.attempts, 3);
    assert!(letter.last_error.contains("500"));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_full_queue_is_an_enqueue_failure() {
    let mut config = test_config();
    config.queue.capacity = 1;
    let h = harness_with(config, ScriptedFetcher::new());

    h.app
        .dispatcher
        .dispatch("41", IMG, Delivery::External)
        .await
        .unwrap();
    let err = h
        .app
        .dispatcher
        .dispatch("42", IMG, Delivery::External)
        .await
        .unwrap_err();

    match err {
        AppError::EnqueueFailed { resource_id, .. } => assert_eq!(resource_id, "42"),
        other => panic!("unexpected error: {other}"),
    }
}
