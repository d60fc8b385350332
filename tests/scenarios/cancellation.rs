//! Test: cancelling a run at its safe boundaries

use crate::helpers::*;
use std::time::Duration;
use uiflow::core::{ExecutionStatus, FinalState, Point};
use uiflow::execution::ExecutionEvent;

#[tokio::test(start_paused = true)]
async fn test_cancel_during_post_delay() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let json = r#"{
        "Start": {"action": "Click", "target": [1, 1], "post_delay": 5000, "next": ["Next"]},
        "Next": {"action": "PressKey", "key": 3}
    }"#;
    let handle = h.engine.start(h.request(json, "Start")).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert_eq!(result.final_state, FinalState::Cancelled);
    // The click already happened and stays in the trace; Next never runs
    assert_eq!(result.trace.len(), 1);
    assert!(result.trace[0].succeeded());
    assert_eq!(device.inputs(), vec![Call::Click(Point::new(1, 1))]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_releases_controller() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let json = r#"{
        "Wait": {"recognition": "OCR", "expected": "Never", "timeout": 10000, "rate_limit": 1000}
    }"#;
    let handle = h.engine.start(h.request(json, "Wait")).unwrap();
    let run_id = handle.run_id();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.cancel();
    let result = handle.wait().await.unwrap();

    assert_eq!(result.final_state, FinalState::Cancelled);
    assert!(result.trace.is_empty());
    assert_eq!(device.captures(), 2);

    let finished = h.events().into_iter().find_map(|e| match e {
        ExecutionEvent::RunFinished { run_id: id, status, .. } if id == run_id => Some(status),
        _ => None,
    });
    assert_eq!(finished, Some(ExecutionStatus::Cancelled));

    // The lease went away with the run
    assert!(!h.engine.registry().is_busy(&h.controller_id));
    let again = h.engine.start(h.request(json, "Wait")).unwrap();
    again.cancel();
    assert_eq!(again.wait().await.unwrap().final_state, FinalState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_finish_changes_nothing() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let handle = h
        .engine
        .start(h.request(r#"{"Back": {"action": "PressKey", "key": 4}}"#, "Back"))
        .unwrap();
    let token = handle.cancellation_token();
    let result = handle.wait().await.unwrap();
    token.cancel();

    assert_succeeded(&result);
    assert_eq!(device.inputs().len(), 1);
}
