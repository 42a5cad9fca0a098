//! Integration tests for job tracking
//!
//! Completion events are fed through a channel standing in for the
//! JobRemoved signal stream.

use std::convert::Infallible;
use std::time::Duration;

use futures_lite::stream;
use sysd_client::jobs::spawn_completion_listener;
use sysd_client::{is_success, JobCompletion, JobRegistry};
use tokio::sync::mpsc;

fn job(n: u32) -> String {
    format!("/org/freedesktop/systemd1/job/{}", n)
}

fn completion(n: u32, unit: &str, result: &str) -> JobCompletion {
    JobCompletion {
        id: n,
        job: job(n),
        unit: unit.to_string(),
        result: result.to_string(),
    }
}

/// A signal stream fed from `tx`
fn signal_bus() -> (mpsc::UnboundedSender<JobCompletion>, impl futures_lite::Stream<Item = JobCompletion>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    (tx, events)
}

#[tokio::test]
async fn test_start_unit_done() {
    let registry = JobRegistry::new();
    let (bus, events) = signal_bus();
    let listener = spawn_completion_listener(registry.clone(), events);

    let pending = registry
        .enqueue(async { Ok::<_, Infallible>(job(42)) })
        .await
        .unwrap();
    bus.send(completion(42, "foo.service", "done")).unwrap();

    let result = pending.wait().await.unwrap();
    assert_eq!(result, "done");
    assert!(is_success(&result));

    drop(bus);
    listener.await.unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_interleaved_jobs_from_other_clients() {
    let registry = JobRegistry::new();
    let (bus, events) = signal_bus();
    let _listener = spawn_completion_listener(registry.clone(), events);

    let start = registry
        .enqueue(async { Ok::<_, Infallible>(job(10)) })
        .await
        .unwrap();
    let stop = registry
        .enqueue(async { Ok::<_, Infallible>(job(11)) })
        .await
        .unwrap();

    // Jobs enqueued by someone else show up on the bus too
    bus.send(completion(9, "other.service", "done")).unwrap();
    bus.send(completion(11, "bar.service", "canceled")).unwrap();
    bus.send(completion(12, "other.service", "failed")).unwrap();
    bus.send(completion(10, "foo.service", "dependency")).unwrap();

    assert_eq!(stop.wait().await.unwrap(), "canceled");
    assert_eq!(start.wait().await.unwrap(), "dependency");
}

#[tokio::test]
async fn test_signal_dispatched_before_reply_handled() {
    let registry = JobRegistry::new();
    let (bus, events) = signal_bus();
    let _listener = spawn_completion_listener(registry.clone(), events);

    let pending = registry
        .enqueue(async {
            bus.send(completion(77, "foo.service", "done")).unwrap();
            // Let the listener deliver before the job path is returned
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, Infallible>(job(77))
        })
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pending.wait())
        .await
        .expect("completion was lost")
        .unwrap();
    assert_eq!(result, "done");
}

#[tokio::test]
async fn test_replayed_completion_does_not_resolve_new_job() {
    let registry = JobRegistry::new();
    let (bus, events) = signal_bus();
    let _listener = spawn_completion_listener(registry.clone(), events);

    bus.send(completion(5, "foo.service", "failed")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pending = registry
        .enqueue(async { Ok::<_, Infallible>(job(5)) })
        .await
        .unwrap();
    bus.send(completion(5, "foo.service", "done")).unwrap();

    assert_eq!(pending.wait().await.unwrap(), "done");
}
