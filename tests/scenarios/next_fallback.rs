//! Test: next candidates are tried strictly in declared order

use crate::helpers::*;
use uiflow::core::{EngineSettings, ErrorKind, Point, RecognitionOutcome, Rect};

const LOGIN_OR_HOME: &str = r#"{
    "Start": {"next": ["Login", "Home"]},
    "Login": {"recognition": "OCR", "expected": "Sign in", "action": "Click"},
    "Home": {"recognition": "OCR", "expected": "Home", "action": "Click"}
}"#;

#[tokio::test(start_paused = true)]
async fn test_second_candidate_after_first_exhausts() {
    let device = FakeController::android("emulator-5554");
    device.show(HOME);
    let ocr = ScreenOcr::new().with_text(HOME, "Home", Rect::new(0, 80, 20, 20));
    let h = Harness::new(device.clone(), ocr, test_settings());

    let result = h.run(LOGIN_OR_HOME, "Start").await;

    assert_succeeded(&result);
    assert_visited(&result, &["Start", "Login", "Home"]);

    let failed: Vec<_> = result.trace.iter().filter(|o| !o.succeeded()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].node, "Login");
    assert_eq!(
        failed[0].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::RecognitionFailed)
    );
    assert!(result.trace[2].succeeded());

    // Login used its whole budget before Home got a single capture
    assert_eq!(device.captures(), 4);
    assert_eq!(device.inputs(), vec![Call::Click(Point::new(10, 90))]);
}

#[tokio::test(start_paused = true)]
async fn test_first_declared_candidate_wins() {
    let device = FakeController::android("emulator-5554");
    device.show(HOME);
    let ocr = ScreenOcr::new()
        .with_text(HOME, "Home", Rect::new(0, 80, 20, 20))
        .with_text(HOME, "Sign in", Rect::new(50, 50, 40, 10));
    let h = Harness::new(device.clone(), ocr, test_settings());

    let result = h.run(LOGIN_OR_HOME, "Start").await;

    assert_succeeded(&result);
    assert_visited(&result, &["Start", "Login"]);
    assert_eq!(device.inputs(), vec![Call::Click(Point::new(70, 55))]);
}

#[tokio::test(start_paused = true)]
async fn test_all_candidates_exhausted() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let result = h.run(LOGIN_OR_HOME, "Start").await;

    // Attributed to the node whose next list ran out
    assert_failed(&result, "Start", ErrorKind::NoViableNext);
    assert_visited(&result, &["Start", "Login", "Home"]);
    for outcome in &result.trace[1..] {
        assert_eq!(
            outcome.recognition,
            RecognitionOutcome::NotMatched { attempts: 3 }
        );
    }
    assert_eq!(device.captures(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_candidate_budgets_are_per_node() {
    let device = FakeController::android("emulator-5554");
    let h = Harness::new(device.clone(), ScreenOcr::new(), test_settings());

    let json = r#"{
        "Start": {"next": ["Quick", "Slow"]},
        "Quick": {"recognition": "OCR", "expected": "A", "timeout": 100},
        "Slow": {"recognition": "OCR", "expected": "B", "timeout": 500, "rate_limit": 100}
    }"#;
    let result = h.run(json, "Start").await;

    assert_failed(&result, "Start", ErrorKind::NoViableNext);
    assert_eq!(result.trace[1].recognition.attempts(), 1);
    assert_eq!(result.trace[2].recognition.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_click_region_of_earlier_node() {
    let device = FakeController::android("emulator-5554");
    device.show(SETTINGS);
    let ocr = ScreenOcr::new().with_text(SETTINGS, "Wi-Fi", Rect::new(20, 40, 60, 20));
    let h = Harness::new(device.clone(), ocr, test_settings());

    let json = r#"{
        "Find": {"recognition": "OCR", "expected": "Wi-Fi", "next": ["Open"]},
        "Open": {"action": "DoubleClick", "target": "Find"}
    }"#;
    let result = h.run(json, "Find").await;

    assert_succeeded(&result);
    assert_eq!(
        device.inputs(),
        vec![Call::Click(Point::new(50, 50)), Call::Click(Point::new(50, 50))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cycle_stops_at_step_limit() {
    let device = FakeController::android("emulator-5554");
    let settings = EngineSettings {
        max_steps: 10,
        ..test_settings()
    };
    let h = Harness::new(device, ScreenOcr::new(), settings);

    let json = r#"{
        "Ping": {"next": ["Pong"]},
        "Pong": {"next": ["Ping"]}
    }"#;
    let result = h.run(json, "Ping").await;

    assert_failed(&result, "Ping", ErrorKind::StepLimitExceeded);
    assert_eq!(result.trace.len(), 10);
    assert!(result.trace.iter().all(|o| o.succeeded()));
}

#[tokio::test(start_paused = true)]
async fn test_retry_loop_through_named_nodes() {
    let device = FakeController::android("emulator-5554");
    device.script([Ok(BLANK), Ok(BLANK), Ok(HOME)]);
    let ocr = ScreenOcr::new().with_text(HOME, "Home", Rect::new(0, 0, 10, 10));
    let h = Harness::new(device.clone(), ocr, test_settings());

    // Refresh until Home shows up; each visit tries Home once
    let json = r#"{
        "Refresh": {"action": "PressKey", "key": 285, "next": ["Home", "Refresh"]},
        "Home": {"recognition": "OCR", "expected": "Home", "timeout": 0}
    }"#;
    let result = h.run(json, "Refresh").await;

    assert_succeeded(&result);
    assert_visited(
        &result,
        &["Refresh", "Home", "Refresh", "Home", "Refresh", "Home"],
    );
    assert_eq!(device.captures(), 3);
}
