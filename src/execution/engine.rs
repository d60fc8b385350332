//! Pipeline engine - starts runs, hands out handles, fans out events

use crate::controller::{ControllerError, ControllerId, ControllerRegistry};
use crate::core::{
    geometry::{Point, Rect},
    node::ActionKind,
    DocumentError, EngineSettings, ErrorKind, ExecutionContext, ExecutionStatus, FinalState,
    OutcomeError, PipelineGraph, PipelineNode, RunResult,
};
use crate::execution::{dispatcher::ActionDispatcher, runner::Runner};
use crate::recognition::Recognizer;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Events emitted while a run progresses
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        controller_id: String,
        entry: String,
    },
    NodeEntered {
        run_id: Uuid,
        node: String,
        max_attempts: u32,
    },
    AttemptMissed {
        run_id: Uuid,
        node: String,
        attempt: u32,
        max_attempts: u32,
        error: Option<OutcomeError>,
    },
    NodeMatched {
        run_id: Uuid,
        node: String,
        attempt: u32,
        region: Option<Rect>,
        text: Option<String>,
    },
    ActionDispatched {
        run_id: Uuid,
        node: String,
        action: ActionKind,
        points: Vec<Point>,
    },
    NodeExhausted {
        run_id: Uuid,
        node: String,
        attempts: u32,
    },
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
        final_state: FinalState,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Registered handlers, shared with every run
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn add(&self, handler: EventHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("Entry node '{0}' does not exist in the pipeline")]
    UnknownEntry(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Run task failed: {0}")]
    Task(String),
}

impl EngineError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Controller(e) => Some(e.kind()),
            EngineError::UnknownEntry(_) => Some(ErrorKind::DanglingReference),
            EngineError::Document(e) => e.kind(),
            EngineError::Task(_) => None,
        }
    }
}

/// A pipeline run to start
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub controller_id: ControllerId,
    pub graph: Arc<PipelineGraph>,
    pub entry: String,
    pub pipeline_name: String,
}

impl RunRequest {
    pub fn new(
        controller_id: impl Into<ControllerId>,
        graph: Arc<PipelineGraph>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            controller_id: controller_id.into(),
            graph,
            entry: entry.into(),
            pipeline_name: "pipeline".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }
}

/// Handle to an in-flight run
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<RunResult>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cancellation; takes effect at the next safe boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish; the controller is released by then
    pub async fn wait(self) -> Result<RunResult, EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Task(e.to_string()))
    }
}

/// Main pipeline execution engine
pub struct PipelineEngine {
    registry: Arc<ControllerRegistry>,
    recognizer: Arc<dyn Recognizer>,
    dispatcher: Arc<ActionDispatcher>,
    settings: Arc<EngineSettings>,
    events: EventBus,
}

impl PipelineEngine {
    pub fn new(
        registry: Arc<ControllerRegistry>,
        recognizer: Arc<dyn Recognizer>,
        settings: EngineSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            registry,
            recognizer,
            dispatcher: Arc::new(ActionDispatcher::new(settings.clone())),
            settings,
            events: EventBus::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(Arc::new(handler));
    }

    /// Start a run in the background
    ///
    /// Fails immediately when the entry is unknown or the controller is
    /// missing, lost or already running a pipeline.
    pub fn start(&self, request: RunRequest) -> Result<RunHandle, EngineError> {
        if !request.graph.contains(&request.entry) {
            return Err(EngineError::UnknownEntry(request.entry));
        }
        let lease = self.registry.acquire(&request.controller_id)?;

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        info!(
            "Starting run {} of '{}' on {} from '{}'",
            run_id, request.pipeline_name, request.controller_id, request.entry
        );

        let context = ExecutionContext::new(
            run_id,
            request.pipeline_name,
            request.controller_id,
            request.entry,
        );
        let runner = Runner {
            graph: request.graph,
            lease,
            recognizer: self.recognizer.clone(),
            dispatcher: self.dispatcher.clone(),
            settings: self.settings.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(runner.run(context));

        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }

    /// Start a run and wait for it
    pub async fn run(&self, request: RunRequest) -> Result<RunResult, EngineError> {
        self.start(request)?.wait().await
    }

    /// Run a single node as its own pipeline
    pub async fn run_node(
        &self,
        controller_id: impl Into<ControllerId>,
        name: &str,
        node: PipelineNode,
    ) -> Result<RunResult, EngineError> {
        let graph = PipelineGraph::from_nodes([(name, node)])?;
        let request =
            RunRequest::new(controller_id, Arc::new(graph), name).with_name(name.to_string());
        self.run(request).await
    }
}
