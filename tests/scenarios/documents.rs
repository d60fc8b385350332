//! Test: pipeline documents survive save, load and re-serialization

use crate::helpers::*;
use std::sync::Arc;
use uiflow::core::{Action, ErrorKind, PipelineGraph, Point, Recognition, Rect, Target};
use uiflow::persistence::{DocumentStore, SaveTarget, StoreError};

const RICH: &str = r#"{
    "Start": {"next": ["FindWifi", "Back"], "pre_delay": 100},
    "FindWifi": {
        "recognition": "OCR",
        "expected": ["Wi-?Fi", "WLAN"],
        "use_regex": true,
        "roi": [0, 0, 200, 60],
        "action": "LongPress",
        "duration": 800,
        "next": "Type",
        "timeout": 2000,
        "rate_limit": 250
    },
    "Type": {"action": "InputText", "text": "hunter2", "next": ["Enter"]},
    "Enter": {"action": "KeyCombo", "keys": [113, 66], "post_delay": 300},
    "Back": {"action": "PressKey", "key": 4, "long": true},
    "Icon": {
        "recognition": "TemplateMatch",
        "template": "icons/gear.png",
        "threshold": 0.85,
        "action": "Swipe",
        "begin": "FindWifi",
        "end": [100, 90],
        "duration": 300
    }
}"#;

#[test]
fn test_rich_document_reserializes_to_same_graph() {
    let graph = PipelineGraph::from_json(RICH).unwrap();
    assert_eq!(graph.len(), 6);

    let again = PipelineGraph::from_json(&graph.to_json()).unwrap();
    assert_eq!(again, graph);

    let find = graph.node("FindWifi").unwrap();
    assert_eq!(find.next, vec!["Type".to_string()]);
    assert_eq!(find.timing.timeout, Some(2000));
    match &find.recognition {
        Recognition::Ocr { roi, .. } => assert_eq!(*roi, Some(Rect::new(0, 0, 200, 60))),
        other => panic!("expected OCR recognition, got {:?}", other),
    }

    let icon = graph.node("Icon").unwrap();
    assert!(matches!(
        &icon.action,
        Action::Swipe { begin: Target::Node(n), end: Target::Point(p), duration: 300 }
            if n == "FindWifi" && *p == Point::new(100, 90)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_saved_document_loads_and_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new(dir.path());

    let json = r#"{
        "Open": {"recognition": "OCR", "expected": "Settings", "action": "Click", "next": ["Search"]},
        "Search": {"action": "InputText", "text": "wifi"}
    }"#;
    let path = store
        .save(json, &SaveTarget::Default, Some("Open settings"), true)
        .unwrap();
    assert!(path.starts_with(dir.path()));
    assert_eq!(store.list().unwrap(), vec![path.clone()]);

    let err = store
        .save(json, &SaveTarget::Path(path.clone()), None, false)
        .unwrap_err();
    assert!(matches!(err, StoreError::Exists(_)));

    let graph = store.load(&path).unwrap();
    assert_eq!(graph.default_entry(), Some("Open"));

    let device = FakeController::android("emulator-5554");
    device.show(SETTINGS);
    let ocr = ScreenOcr::new().with_text(SETTINGS, "Settings", Rect::new(10, 10, 40, 10));
    let h = Harness::new(device.clone(), ocr, test_settings());
    let request = uiflow::execution::RunRequest::new(h.controller_id.clone(), Arc::new(graph), "Open");
    let result = h.engine.run(request).await.unwrap();

    assert_succeeded(&result);
    assert_eq!(
        device.inputs(),
        vec![Call::Click(Point::new(30, 15)), Call::Text("wifi".to_string())]
    );
}

#[test]
fn test_store_rejects_bad_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new(dir.path());

    assert!(matches!(
        store.save("[1, 2]", &SaveTarget::Default, None, true),
        Err(StoreError::NotAnObject)
    ));
    assert!(matches!(
        store.save("{}", &SaveTarget::Default, None, true),
        Err(StoreError::Empty)
    ));

    // Shape is fine, so it saves; loading checks node kinds
    let path = store
        .save(r#"{"A": {"action": "Teleport"}}"#, &SaveTarget::Default, Some("odd"), true)
        .unwrap();
    match store.load(&path) {
        Err(StoreError::Document(e)) => assert_eq!(e.kind(), Some(ErrorKind::UnsupportedNodeKind)),
        other => panic!("expected document error, got {:?}", other.map(|g| g.len())),
    }
}
