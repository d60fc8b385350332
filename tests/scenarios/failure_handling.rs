//! Test: controller faults, action errors and malformed documents

use crate::helpers::*;
use std::time::Duration;
use uiflow::controller::ControllerError;
use uiflow::core::{
    Action, ActionKind, ActionOutcome, DocumentError, ErrorKind, PipelineGraph, PipelineNode,
    Recognition, Rect,
};
use uiflow::execution::{EngineError, ExecutionEvent, RunRequest};

const OPEN_SETTINGS: &str = r#"{
    "Open": {"recognition": "OCR", "expected": "Settings", "action": "Click"}
}"#;

fn settings_ocr() -> ScreenOcr {
    ScreenOcr::new().with_text(SETTINGS, "Settings", Rect::new(10, 10, 40, 10))
}

#[tokio::test(start_paused = true)]
async fn test_lost_controller_aborts_run() {
    let device = FakeController::android("emulator-5554");
    device.set_lost();
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let result = h.run(OPEN_SETTINGS, "Open").await;

    assert_failed(&result, "Open", ErrorKind::ControllerLost);
    assert_eq!(result.trace.len(), 1);
    assert_eq!(
        result.trace[0].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::ControllerLost)
    );

    // The registry now knows the device is gone
    let err = h.engine.start(h.request(OPEN_SETTINGS, "Open")).err();
    assert!(matches!(
        err,
        Some(EngineError::Controller(ControllerError::Lost { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_capture_consumes_attempt() {
    let device = FakeController::android("emulator-5554");
    device.script([
        Err(ControllerError::rejected("capture", "window minimized")),
        Err(ControllerError::rejected("capture", "window minimized")),
        Ok(SETTINGS),
    ]);
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let result = h.run(OPEN_SETTINGS, "Open").await;

    assert_succeeded(&result);
    assert_eq!(result.trace[0].recognition.attempts(), 3);

    let missed: Vec<ErrorKind> = h
        .events()
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::AttemptMissed { error, .. } => error.as_ref().map(|e| e.kind),
            _ => None,
        })
        .collect();
    assert_eq!(missed, vec![ErrorKind::ControllerRejected; 2]);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_capture_is_cut_off() {
    let device = FakeController::android("emulator-5554");
    device.set_capture_delay(Duration::from_secs(60));
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let started = tokio::time::Instant::now();
    let result = h.run(OPEN_SETTINGS, "Open").await;

    assert_failed(&result, "Open", ErrorKind::NodeTimeout);
    let outcome = &result.trace[0];
    assert_eq!(outcome.recognition.attempts(), 3);
    let message = &outcome.error.as_ref().unwrap().message;
    assert!(message.contains("ControllerUnresponsive"), "{}", message);

    // Three 1s call timeouts plus two backoff waits, nowhere near 60s
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_recognition_is_cut_off() {
    let device = FakeController::android("emulator-5554");
    device.show(SETTINGS);
    let h = Harness::new(device.clone(), settings_ocr().stuck(), test_settings());

    let started = tokio::time::Instant::now();
    let handle = h.engine.start(h.request(OPEN_SETTINGS, "Open")).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(3600), handle.wait())
        .await
        .expect("run should not hang")
        .unwrap();

    assert_failed(&result, "Open", ErrorKind::NodeTimeout);
    assert_eq!(result.trace[0].recognition.attempts(), 3);
    assert_eq!(h.ocr.detections(), 3);
    assert!(started.elapsed() < Duration::from_secs(4));

    let missed: Vec<ErrorKind> = h
        .events()
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::AttemptMissed { error, .. } => error.as_ref().map(|e| e.kind),
            _ => None,
        })
        .collect();
    assert_eq!(missed, vec![ErrorKind::RecognizerBackendError; 3]);

    // The controller is free again
    assert!(!h.engine.registry().is_busy(&h.controller_id));
}

#[tokio::test(start_paused = true)]
async fn test_action_errors_are_not_retried() {
    let device = FakeController::android("emulator-5554");
    device.show(SETTINGS);
    device.set_reject_inputs();
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let json = r#"{
        "Open": {"recognition": "OCR", "expected": "Settings", "action": "Click", "next": ["After"]},
        "After": {}
    }"#;
    let result = h.run(json, "Open").await;

    assert_failed(&result, "Open", ErrorKind::ActionError);
    assert_eq!(result.trace.len(), 1);
    assert_eq!(
        result.trace[0].action,
        ActionOutcome::Failed {
            kind: ActionKind::Click
        }
    );
    assert_eq!(
        result.trace[0].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::ControllerRejected)
    );
    assert_eq!(device.captures(), 1);
    assert_eq!(device.inputs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_unsupported_on_android() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let result = h.run(r#"{"Down": {"action": "Scroll", "dy": -120}}"#, "Down").await;

    assert_failed(&result, "Down", ErrorKind::UnsupportedOnPlatform);
    assert_eq!(
        result.trace[0].action,
        ActionOutcome::Failed {
            kind: ActionKind::Scroll
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_node_scroll_fails_cleanly_on_android() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let node = PipelineNode::new(Recognition::DirectHit, Action::Scroll { dx: 0, dy: -120 });
    let result = h
        .engine
        .run_node(h.controller_id.clone(), "Scroll", node)
        .await
        .unwrap();

    assert_failed(&result, "Scroll", ErrorKind::UnsupportedOnPlatform);
    assert!(device.inputs().is_empty());
    assert!(!h.engine.registry().is_busy(&h.controller_id));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_and_key_combo_on_windows() {
    let window = FakeController::windows("Notepad");
    let h = Harness::new(window.clone(), ScreenOcr::new(), test_settings());

    let json = r#"{
        "Down": {"action": "Scroll", "dy": -120, "next": ["Save"]},
        "Save": {"action": "KeyCombo", "keys": [17, 83]}
    }"#;
    let result = h.run(json, "Down").await;

    assert_succeeded(&result);
    assert_eq!(
        window.inputs(),
        vec![Call::Scroll(0, -120), Call::Combo(vec![17, 83])]
    );
}

#[test]
fn test_dangling_reference_fails_load() {
    let json = r#"{
        "Start": {"next": ["Missing"]}
    }"#;

    let err = PipelineGraph::from_json(json).unwrap_err();
    assert!(matches!(err, DocumentError::DanglingReference { .. }));
    assert_eq!(err.kind(), Some(ErrorKind::DanglingReference));
}

#[test]
fn test_unknown_kinds_fail_load() {
    let err = PipelineGraph::from_json(r#"{"A": {"recognition": "ColorMatch"}}"#).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedNodeKind));

    let err = PipelineGraph::from_json(r#"{"A": {"action": "StartApp"}}"#).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedNodeKind));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_entry_or_controller() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let err = h.engine.start(h.request(OPEN_SETTINGS, "Nope")).err();
    assert!(matches!(err, Some(EngineError::UnknownEntry(_))));

    let graph = PipelineGraph::from_json(OPEN_SETTINGS).unwrap();
    let request = RunRequest::new("android:other", std::sync::Arc::new(graph), "Open");
    let err = h.engine.start(request).err();
    assert!(matches!(
        err,
        Some(EngineError::Controller(ControllerError::NotFound { .. }))
    ));
    assert!(device.calls().is_empty());
}
