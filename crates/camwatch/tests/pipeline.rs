//! End-to-end tests of the worker pipeline with in-memory doubles

mod common;

use camwatch::config::RetryPolicy;
use camwatch::service::{CameraService, ServiceError};
use camwatch::source::SourceError;
use camwatch::worker::{Worker, WorkerError};
use common::{
    identity, synthetic_source, vanishing_source, FixedDetector, FrameIndexDetector, MemoryTopic,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_five_iterations_publish_five_identical_messages() {
    let topic = MemoryTopic::default();
    let (source, _) = synthetic_source(3);
    let detector = FixedDetector::new(&["car", "car", "person"]);
    let mut worker = Worker::new(identity("camera-1", 30), source, detector, topic.clone());

    for _ in 0..5 {
        worker.step().await.unwrap();
    }

    let messages = topic.messages();
    assert_eq!(messages.len(), 5);
    assert!(messages.iter().all(|m| m == &messages[0]));
    assert_eq!(messages[0].0, "cameras/detections");
    assert_eq!(
        topic.payloads()[0],
        json!({
            "camera": "camera-1",
            "coverage_area": [[33.999, -118.5], [34.05, -118.46]],
            "vehicle_counts": {"car": 2, "truck": 0, "bus": 0, "motorcycle": 0, "person": 1}
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_pacing_yields_configured_rate() {
    let topic = MemoryTopic::default();
    let (source, _) = synthetic_source(3);
    let worker = Worker::new(
        identity("camera-1", 30),
        source,
        FixedDetector::new(&[]),
        topic.clone(),
    );

    let result = tokio::time::timeout(Duration::from_secs(1), worker.run()).await;
    assert!(result.is_err(), "worker loop should still be running");

    let published = topic.len();
    assert!(
        (25..=35).contains(&published),
        "expected about 30 messages, got {}",
        published
    );
}

#[tokio::test(start_paused = true)]
async fn test_shared_topic_keeps_per_camera_order() {
    let topic = MemoryTopic::default();
    let cameras = ["camera-1", "camera-2", "camera-3"];

    let mut tasks = Vec::new();
    for (i, camera) in cameras.iter().enumerate() {
        let (source, _) = synthetic_source(3);
        let worker = Worker::new(
            identity(camera, 10 + 5 * i as u32),
            source,
            FrameIndexDetector,
            topic.clone(),
        );
        tasks.push(tokio::spawn(tokio::time::timeout(
            Duration::from_secs(2),
            worker.run(),
        )));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_err());
    }

    let payloads = topic.payloads();
    for camera in cameras {
        let cars: Vec<u64> = payloads
            .iter()
            .filter(|p| p["camera"] == camera)
            .map(|p| p["vehicle_counts"]["car"].as_u64().unwrap())
            .collect();
        assert!(cars.len() > 10, "{} published {} messages", camera, cars.len());

        // Frames loop 0, 1, 2, 0, ... and counts follow them in order
        for (i, count) in cars.iter().enumerate() {
            assert_eq!(*count, (i % 3) as u64 + 1, "{} out of order at {}", camera, i);
        }
    }

    // Workers do interleave on the topic
    let first_cameras: Vec<&serde_json::Value> =
        payloads.iter().take(6).map(|p| &p["camera"]).collect();
    assert!(first_cameras.iter().any(|c| *c != first_cameras[0]));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_source_ends_loop_and_releases_capture() {
    let topic = MemoryTopic::default();
    let policy = RetryPolicy {
        max_attempts: Some(3),
        initial_backoff_ms: 50,
        max_backoff_ms: 200,
    };
    let (source, opens, released) = vanishing_source(policy);
    let worker = Worker::new(
        identity("camera-1", 30),
        source,
        FixedDetector::new(&["car"]),
        topic.clone(),
    );

    let err = worker.run().await.unwrap_err();
    match err {
        WorkerError::Source(SourceError::Unavailable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(opens.load(Ordering::SeqCst), 3);
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(topic.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_stops_worker_and_releases_source() {
    let topic = MemoryTopic::default();
    let (source, released) = synthetic_source(3);
    let worker = Worker::new(
        identity("camera-1", 30),
        source,
        FixedDetector::new(&["person"]),
        topic.clone(),
    );
    let service = CameraService::new("camera-1");
    service.start(worker.run());

    let result = service
        .run_until(std::future::pending::<std::io::Result<()>>(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;

    assert!(result.is_ok());
    assert!(!service.is_running());
    assert!(released.load(Ordering::SeqCst));
    assert_ne!(topic.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dead_worker_loop_is_an_error() {
    let policy = RetryPolicy {
        max_attempts: Some(2),
        initial_backoff_ms: 10,
        max_backoff_ms: 10,
    };
    let (source, _, released) = vanishing_source(policy);
    let worker = Worker::new(
        identity("camera-2", 30),
        source,
        FixedDetector::new(&["car"]),
        MemoryTopic::default(),
    );
    let service = CameraService::new("camera-2");
    service.start(worker.run());

    let result = service
        .run_until(
            std::future::pending::<std::io::Result<()>>(),
            std::future::pending::<()>(),
        )
        .await;

    assert!(matches!(
        result,
        Err(ServiceError::Worker(WorkerError::Source(
            SourceError::Unavailable { .. }
        )))
    ));
    assert!(released.load(Ordering::SeqCst));
}
