//! Test: one run per controller, many controllers at once

use crate::helpers::*;
use std::sync::Arc;
use std::time::Duration;
use uiflow::controller::{ControllerError, ControllerRegistry};
use uiflow::core::{FinalState, PipelineGraph, Point, Rect};
use uiflow::execution::{EngineError, PipelineEngine, RunRequest};
use uiflow::recognition::RecognizerAdapter;

const WAIT_FOREVER: &str = r#"{
    "Wait": {"recognition": "OCR", "expected": "Never", "timeout": 60000, "rate_limit": 1000}
}"#;

#[tokio::test(start_paused = true)]
async fn test_second_run_on_busy_controller_fails_fast() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let first = h.engine.start(h.request(WAIT_FOREVER, "Wait")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = h.engine.start(h.request(WAIT_FOREVER, "Wait"));
    assert!(matches!(
        second.err(),
        Some(EngineError::Controller(ControllerError::Busy { .. }))
    ));
    assert!(h.engine.registry().is_busy(&h.controller_id));

    first.cancel();
    assert_eq!(first.wait().await.unwrap().final_state, FinalState::Cancelled);

    let third = h.engine.start(h.request(WAIT_FOREVER, "Wait")).unwrap();
    third.cancel();
    third.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_runs_on_different_controllers_overlap() {
    let phone = FakeController::android("emulator-5554");
    let desktop = FakeController::windows("Notepad");
    phone.show(HOME);
    desktop.show(SETTINGS);

    let ocr = Arc::new(
        ScreenOcr::new()
            .with_text(HOME, "OK", Rect::new(0, 0, 10, 10))
            .with_text(SETTINGS, "OK", Rect::new(100, 50, 10, 10)),
    );
    let settings = test_settings();
    let registry = Arc::new(ControllerRegistry::new(settings.controller_call_timeout()));
    let phone_id = registry.register(phone.clone()).id;
    let desktop_id = registry.register(desktop.clone()).id;
    let recognizer = Arc::new(RecognizerAdapter::with_backend(ocr.clone(), &settings));
    let engine = PipelineEngine::new(registry, recognizer, settings);

    let graph = Arc::new(
        PipelineGraph::from_json(
            r#"{"Confirm": {"recognition": "OCR", "expected": "OK", "action": "Click", "post_delay": 500}}"#,
        )
        .unwrap(),
    );
    let a = engine
        .start(RunRequest::new(phone_id, graph.clone(), "Confirm"))
        .unwrap();
    let b = engine
        .start(RunRequest::new(desktop_id, graph, "Confirm"))
        .unwrap();

    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(a.wait(), b.wait());
    assert_succeeded(&a.unwrap());
    assert_succeeded(&b.unwrap());

    // Both post delays ran side by side
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(phone.inputs(), vec![Call::Click(Point::new(5, 5))]);
    assert_eq!(desktop.inputs(), vec![Call::Click(Point::new(105, 55))]);

    // One model load serves both controllers
    assert_eq!(ocr.loads(), 1);
    assert_eq!(ocr.detections(), 2);
}
