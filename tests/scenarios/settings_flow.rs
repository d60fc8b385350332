//! Test: open Settings - a DirectHit start node followed by an OCR click

use crate::helpers::*;
use std::time::Duration;
use uiflow::core::{
    Action, ActionOutcome, ErrorKind, Match, PipelineNode, Point, Recognition,
    RecognitionOutcome, Rect, Target,
};
use uiflow::execution::ExecutionEvent;

const SETTINGS_FLOW: &str = r#"{
    "Start": {
        "recognition": "DirectHit",
        "action": "DoNothing",
        "next": ["Click"]
    },
    "Click": {
        "recognition": "OCR",
        "expected": "Settings",
        "action": "Click",
        "next": []
    }
}"#;

fn settings_ocr() -> ScreenOcr {
    ScreenOcr::new()
        .with_text(HOME, "Clock", Rect::new(100, 60, 30, 10))
        .with_text(HOME, "Settings", Rect::new(10, 10, 40, 10))
}

/// Text at x 10..50, y 10..20 is clicked at its centre
#[tokio::test(start_paused = true)]
async fn test_click_matched_text() {
    let device = FakeController::android("emulator-5554");
    device.show(HOME);
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let result = h.run(SETTINGS_FLOW, "Start").await;

    assert_succeeded(&result);
    assert_visited(&result, &["Start", "Click"]);
    assert!(result.trace.iter().all(|o| o.succeeded()));

    let click = &result.trace[1];
    assert_eq!(
        click.recognition,
        RecognitionOutcome::Matched {
            attempts: 1,
            found: Match::text(Rect::new(10, 10, 40, 10), "Settings", 0.9),
        }
    );
    assert_eq!(
        click.action,
        ActionOutcome::Dispatched {
            kind: uiflow::core::ActionKind::Click,
            points: vec![Point::new(30, 15)],
        }
    );

    // Start needs no capture; Click takes exactly one
    assert_eq!(device.captures(), 1);
    assert_eq!(device.inputs(), vec![Call::Click(Point::new(30, 15))]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_text_times_out_at_click() {
    let device = FakeController::android("emulator-5554");
    device.show(BLANK);
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let result = h.run(SETTINGS_FLOW, "Start").await;

    assert_failed(&result, "Click", ErrorKind::NodeTimeout);
    let succeeded: Vec<&str> = result
        .trace
        .iter()
        .filter(|o| o.succeeded())
        .map(|o| o.node.as_str())
        .collect();
    assert_eq!(succeeded, vec!["Start"]);

    // 300ms budget polled every 100ms
    let click = &result.trace[1];
    assert_eq!(click.recognition, RecognitionOutcome::NotMatched { attempts: 3 });
    assert_eq!(click.action, ActionOutcome::Skipped);
    assert_eq!(
        click.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::RecognitionFailed)
    );
    assert_eq!(device.captures(), 3);
    assert!(device.inputs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_text_appearing_late_is_retried() {
    let device = FakeController::android("emulator-5554");
    device.script([Ok(BLANK), Ok(BLANK), Ok(HOME)]);
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let started = tokio::time::Instant::now();
    let result = h.run(SETTINGS_FLOW, "Start").await;

    assert_succeeded(&result);
    assert_eq!(result.trace[1].recognition.attempts(), 3);
    // Two backoff waits between three captures
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(200) && waited < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_direct_hit_never_captures() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let json = r#"{
        "Tap": {"action": "Click", "target": [5, 5], "next": ["Back"]},
        "Back": {"action": "PressKey", "key": 4}
    }"#;
    let started = tokio::time::Instant::now();
    let result = h.run(json, "Tap").await;

    assert_succeeded(&result);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(device.captures(), 0);
    assert_eq!(h.ocr.detections(), 0);
    assert_eq!(h.ocr.loads(), 0);
    assert_eq!(
        device.inputs(),
        vec![
            Call::Click(Point::new(5, 5)),
            Call::Key(4, Duration::from_millis(50)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_the_run() {
    let device = FakeController::android("emulator-5554");
    device.show(HOME);
    let h = Harness::new(device, settings_ocr(), test_settings());

    let result = h.run(SETTINGS_FLOW, "Start").await;
    assert_succeeded(&result);

    let names: Vec<String> = h
        .events()
        .iter()
        .map(|e| match e {
            ExecutionEvent::RunStarted { entry, .. } => format!("started {}", entry),
            ExecutionEvent::NodeEntered { node, .. } => format!("enter {}", node),
            ExecutionEvent::AttemptMissed { node, .. } => format!("miss {}", node),
            ExecutionEvent::NodeMatched { node, .. } => format!("match {}", node),
            ExecutionEvent::ActionDispatched { node, action, .. } => {
                format!("{} {}", action, node)
            }
            ExecutionEvent::NodeExhausted { node, .. } => format!("exhausted {}", node),
            ExecutionEvent::RunFinished { status, .. } => format!("finished {}", status),
        })
        .collect();

    assert_eq!(
        names,
        vec![
            "started Start",
            "enter Start",
            "match Start",
            "DoNothing Start",
            "enter Click",
            "match Click",
            "Click Click",
            "finished Completed",
        ]
    );
    assert!(h
        .events()
        .iter()
        .all(|e| event_run_id(e) == result.run_id));
}

fn event_run_id(event: &ExecutionEvent) -> uuid::Uuid {
    match event {
        ExecutionEvent::RunStarted { run_id, .. }
        | ExecutionEvent::NodeEntered { run_id, .. }
        | ExecutionEvent::AttemptMissed { run_id, .. }
        | ExecutionEvent::NodeMatched { run_id, .. }
        | ExecutionEvent::ActionDispatched { run_id, .. }
        | ExecutionEvent::NodeExhausted { run_id, .. }
        | ExecutionEvent::RunFinished { run_id, .. } => *run_id,
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_single_node() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let node = PipelineNode::new(Recognition::DirectHit, Action::click_at(3, 4));
    let result = h
        .engine
        .run_node(h.controller_id.clone(), "Click", node)
        .await
        .unwrap();

    assert_succeeded(&result);
    assert_eq!(result.pipeline_name, "Click");
    assert_eq!(device.inputs(), vec![Call::Click(Point::new(3, 4))]);
}

#[tokio::test(start_paused = true)]
async fn test_single_node_double_click() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let node = PipelineNode::new(
        Recognition::DirectHit,
        Action::DoubleClick {
            target: Target::Point(Point::new(5, 6)),
            button: 0,
        },
    );
    let result = h
        .engine
        .run_node(h.controller_id.clone(), "DoubleClick", node)
        .await
        .unwrap();

    assert_succeeded(&result);
    assert_eq!(
        device.inputs(),
        vec![Call::Click(Point::new(5, 6)), Call::Click(Point::new(5, 6))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_swipe_is_one_gesture() {
    let device = FakeController::android("emulator-5554");
    device.show(HOME);
    let h = Harness::new(device.clone(), settings_ocr(), test_settings());

    let json = r#"{
        "Open": {
            "recognition": "OCR",
            "expected": "Settings",
            "action": "Swipe",
            "begin": true,
            "end": [30, 90],
            "duration": 400
        }
    }"#;
    let result = h.run(json, "Open").await;

    assert_succeeded(&result);
    assert_eq!(
        device.inputs(),
        vec![Call::Swipe(
            Point::new(30, 15),
            Point::new(30, 90),
            Duration::from_millis(400)
        )]
    );
}
