//! Admission controller behavior under a manual clock

use chrono::Duration;
use scorewatch::clock::ManualClock;
use scorewatch::config::RateLimitConfig;
use scorewatch::security::{Admission, AdmissionController};
use std::sync::Arc;

fn controller(capacity: f64) -> (AdmissionController, ManualClock) {
    let clock = ManualClock::default();
    let controller = AdmissionController::new(
        RateLimitConfig {
            enabled: true,
            requests_per_minute: capacity,
        },
        Arc::new(clock.clone()),
    );
    (controller, clock)
}

#[tokio::test]
async fn test_burst_of_capacity_plus_one() {
    let (controller, clock) = controller(60.0);

    for _ in 0..60 {
        assert!(controller.admit("203.0.113.5", "/detect").await.is_allowed());
    }
    assert_eq!(
        controller.admit("203.0.113.5", "/detect").await,
        Admission::Denied {
            retry_after_secs: 1.0
        }
    );

    clock.advance(Duration::seconds(1));
    assert!(controller.admit("203.0.113.5", "/detect").await.is_allowed());
}

#[tokio::test]
async fn test_partial_refill_is_not_enough() {
    let (controller, clock) = controller(30.0);
    for _ in 0..30 {
        controller.admit("c", "/detect").await;
    }

    clock.advance(Duration::milliseconds(1500));
    assert!(!controller.admit("c", "/detect").await.is_allowed());

    clock.advance(Duration::milliseconds(500));
    assert!(controller.admit("c", "/detect").await.is_allowed());
}

#[tokio::test]
async fn test_remaining_tokens_reported() {
    let (controller, _) = controller(5.0);
    match controller.admit("c", "/health").await {
        Admission::Allowed { remaining } => assert_eq!(remaining, 4.0),
        other => panic!("unexpected decision: {:?}", other),
    }
    assert_eq!(controller.bucket_status("c", "/health").await, Some((4.0, 5.0)));
}
