//! Scripted fakes and assertions for scenario tests
//!
//! A fake controller shows numbered "screens": every capture is a solid
//! image whose pixel value is the screen number. The fake OCR backend reads
//! that number back and returns the text boxes registered for the screen.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uiflow::controller::{Controller, ControllerError, ControllerId, ControllerRegistry, Platform};
use uiflow::core::{
    EngineSettings, ErrorKind, FinalState, PipelineGraph, Point, Rect, RunResult,
};
use uiflow::execution::{ExecutionEvent, PipelineEngine, RunRequest};
use uiflow::recognition::{OcrBackend, RecognitionError, RecognizerAdapter, TextBox};

pub const BLANK: u8 = 0;
pub const HOME: u8 = 1;
pub const SETTINGS: u8 = 2;

pub fn screen(id: u8) -> RgbaImage {
    RgbaImage::from_pixel(200, 100, Rgba([id, id, id, 255]))
}

/// A primitive call received by the fake controller
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Capture,
    Click(Point),
    Swipe(Point, Point, Duration),
    Text(String),
    Key(i32, Duration),
    Combo(Vec<i32>),
    Scroll(i32, i32),
}

/// Controller that replays a capture script and records input
pub struct FakeController {
    platform: Platform,
    name: String,
    current: Mutex<u8>,
    script: Mutex<VecDeque<Result<u8, ControllerError>>>,
    calls: Mutex<Vec<Call>>,
    capture_delay: Mutex<Option<Duration>>,
    lost: AtomicBool,
    reject_inputs: AtomicBool,
}

impl FakeController {
    pub fn new(platform: Platform, name: &str) -> Arc<Self> {
        Arc::new(Self {
            platform,
            name: name.to_string(),
            current: Mutex::new(BLANK),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            capture_delay: Mutex::new(None),
            lost: AtomicBool::new(false),
            reject_inputs: AtomicBool::new(false),
        })
    }

    pub fn android(name: &str) -> Arc<Self> {
        Self::new(Platform::Android, name)
    }

    pub fn windows(name: &str) -> Arc<Self> {
        Self::new(Platform::Windows, name)
    }

    /// Show `id` from now on, once any scripted captures are used up
    pub fn show(&self, id: u8) {
        *self.current.lock().unwrap() = id;
    }

    /// Results for the next captures, in order; the last screen stays shown
    pub fn script<I>(&self, captures: I)
    where
        I: IntoIterator<Item = Result<u8, ControllerError>>,
    {
        self.script.lock().unwrap().extend(captures);
    }

    pub fn set_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    /// Refuse every input primitive, as a minimized window would
    pub fn set_reject_inputs(&self) {
        self.reject_inputs.store(true, Ordering::SeqCst);
    }

    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn captures(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Capture).count()
    }

    /// Every call except captures
    pub fn inputs(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Capture)
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), ControllerError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(ControllerError::lost("device went away"));
        }
        let rejected = call != Call::Capture && self.reject_inputs.load(Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        if rejected {
            return Err(ControllerError::rejected("input", "window is minimized"));
        }
        Ok(())
    }
}

#[async_trait]
impl Controller for FakeController {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&self) -> Result<RgbaImage, ControllerError> {
        self.record(Call::Capture)?;
        let delay = *self.capture_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(id)) => self.show(id),
            Some(Err(e)) => return Err(e),
            None => {}
        }
        Ok(screen(*self.current.lock().unwrap()))
    }

    async fn click(&self, point: Point, _button: u8, _hold: Duration) -> Result<(), ControllerError> {
        self.record(Call::Click(point))
    }

    async fn swipe(&self, begin: Point, end: Point, duration: Duration) -> Result<(), ControllerError> {
        self.record(Call::Swipe(begin, end, duration))
    }

    async fn input_text(&self, text: &str) -> Result<(), ControllerError> {
        self.record(Call::Text(text.to_string()))
    }

    async fn press_key(&self, code: i32, hold: Duration) -> Result<(), ControllerError> {
        self.record(Call::Key(code, hold))
    }

    async fn key_combo(&self, codes: &[i32]) -> Result<(), ControllerError> {
        self.record(Call::Combo(codes.to_vec()))
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), ControllerError> {
        match self.platform {
            Platform::Windows => self.record(Call::Scroll(dx, dy)),
            Platform::Android => Err(ControllerError::Unsupported {
                operation: "scroll",
                platform: self.platform,
            }),
        }
    }
}

/// OCR backend that reads the screen number and returns its text
#[derive(Default)]
pub struct ScreenOcr {
    screens: HashMap<u8, Vec<TextBox>>,
    loads: AtomicUsize,
    detections: AtomicUsize,
    stuck: AtomicBool,
}

impl ScreenOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, screen: u8, text: &str, region: Rect) -> Self {
        self.screens.entry(screen).or_default().push(TextBox {
            text: text.to_string(),
            region,
            score: 0.9,
        });
        self
    }

    /// Every detection hangs forever, as a wedged OCR process would
    pub fn stuck(self) -> Self {
        self.stuck.store(true, Ordering::SeqCst);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for ScreenOcr {
    async fn load(&self) -> Result<(), RecognitionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detect(&self, image: &RgbaImage) -> Result<Vec<TextBox>, RecognitionError> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        if self.stuck.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let id = image.get_pixel(0, 0)[0];
        Ok(self.screens.get(&id).cloned().unwrap_or_default())
    }
}

/// Short timeouts so exhausted nodes give up after a few attempts, and no
/// implicit settle delays so timings only reflect what a node asks for
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        default_timeout_ms: 300,
        default_rate_limit_ms: 100,
        default_pre_delay_ms: 0,
        default_post_delay_ms: 0,
        controller_call_timeout_ms: 1_000,
        recognition_timeout_ms: 1_000,
        ..EngineSettings::default()
    }
}

/// Engine wired to fakes, collecting every emitted event
pub struct Harness {
    pub engine: PipelineEngine,
    pub controller: Arc<FakeController>,
    pub controller_id: ControllerId,
    pub ocr: Arc<ScreenOcr>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub fn new(controller: Arc<FakeController>, ocr: ScreenOcr, settings: EngineSettings) -> Self {
        let registry = Arc::new(ControllerRegistry::new(settings.controller_call_timeout()));
        let handle = registry.register(controller.clone());

        let ocr = Arc::new(ocr);
        let recognizer = Arc::new(RecognizerAdapter::with_backend(ocr.clone(), &settings));
        let engine = PipelineEngine::new(registry, recognizer, settings);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        Self {
            engine,
            controller,
            controller_id: handle.id,
            ocr,
            events,
        }
    }

    pub fn request(&self, json: &str, entry: &str) -> RunRequest {
        let graph = PipelineGraph::from_json(json).expect("test pipeline should load");
        RunRequest::new(self.controller_id.clone(), Arc::new(graph), entry).with_name("scenario")
    }

    pub async fn run(&self, json: &str, entry: &str) -> RunResult {
        self.engine
            .run(self.request(json, entry))
            .await
            .expect("run should start")
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub fn assert_succeeded(result: &RunResult) {
    assert_eq!(
        result.final_state,
        FinalState::Succeeded,
        "run should succeed, trace: {:#?}",
        result.trace
    );
}

/// Assert the run failed with `kind`, attributed to `node`
pub fn assert_failed(result: &RunResult, node: &str, kind: ErrorKind) {
    match &result.final_state {
        FinalState::Failed {
            node: failed,
            kind: actual,
            ..
        } => {
            assert_eq!(failed, node, "failure attributed to wrong node");
            assert_eq!(*actual, kind, "wrong failure kind");
        }
        other => panic!("expected failure at {}, got {:?}", node, other),
    }
}

pub fn assert_visited(result: &RunResult, nodes: &[&str]) {
    assert_eq!(result.visited(), nodes);
}
