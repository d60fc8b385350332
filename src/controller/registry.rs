//! Controller registry - connected targets and run exclusivity

use crate::controller::{Capture, ConnectionState, Controller, ControllerError, Platform};
use crate::core::geometry::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Stable identifier of a registered controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id derived from platform and transport name, e.g. `android:emulator-5554`
    pub fn for_target(platform: Platform, name: &str) -> Self {
        Self(format!("{}:{}", platform, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControllerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ControllerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Snapshot of a registered controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerHandle {
    pub id: ControllerId,
    pub platform: Platform,
    pub name: String,
    pub state: ConnectionState,
}

struct Entry {
    id: ControllerId,
    controller: Arc<dyn Controller>,
    connected: AtomicBool,
    run_lock: Arc<Mutex<()>>,
    /// No call reaches the target before this instant
    settle_until: StdMutex<Option<Instant>>,
}

impl Entry {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Controller {} disconnected", self.id);
        }
    }

    fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            id: self.id.clone(),
            platform: self.controller.platform(),
            name: self.controller.name().to_string(),
            state: if self.is_connected() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            },
        }
    }
}

/// Registry of connected controllers
///
/// At most one run holds a controller at a time; see [`ControllerRegistry::acquire`].
pub struct ControllerRegistry {
    entries: RwLock<HashMap<ControllerId, Arc<Entry>>>,
    call_timeout: Duration,
}

impl ControllerRegistry {
    /// Create a registry whose bound controllers time out each call after `call_timeout`
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ControllerId, Arc<Entry>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ControllerId, Arc<Entry>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a controller under an id derived from its platform and name
    pub fn register(&self, controller: Arc<dyn Controller>) -> ControllerHandle {
        let id = ControllerId::for_target(controller.platform(), controller.name());
        self.register_as(id, controller)
    }

    /// Register under an explicit id, replacing any previous registration
    ///
    /// A replaced controller is marked disconnected, so runs still bound to
    /// it fail with `ControllerLost`.
    pub fn register_as(&self, id: ControllerId, controller: Arc<dyn Controller>) -> ControllerHandle {
        let entry = Arc::new(Entry {
            id: id.clone(),
            controller,
            connected: AtomicBool::new(true),
            run_lock: Arc::new(Mutex::new(())),
            settle_until: StdMutex::new(None),
        });
        let handle = entry.handle();

        if let Some(previous) = self.write().insert(id.clone(), entry) {
            warn!("Controller {} re-registered; previous connection dropped", id);
            previous.mark_disconnected();
        }
        info!("Registered {} controller {}", handle.platform, id);
        handle
    }

    /// Mark a controller disconnected and forget it
    pub fn disconnect(&self, id: &ControllerId) -> bool {
        match self.write().remove(id) {
            Some(entry) => {
                entry.mark_disconnected();
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, id: &ControllerId) -> Option<ControllerHandle> {
        self.read().get(id).map(|entry| entry.handle())
    }

    /// All registered controllers, ordered by id
    pub fn handles(&self) -> Vec<ControllerHandle> {
        let mut handles: Vec<_> = self.read().values().map(|e| e.handle()).collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    /// Whether a run currently holds the controller
    pub fn is_busy(&self, id: &ControllerId) -> bool {
        self.read()
            .get(id)
            .map(|entry| entry.run_lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Take exclusive use of a controller for one run
    ///
    /// Never waits: a controller already leased fails with `Busy`.
    pub fn acquire(&self, id: &ControllerId) -> Result<RunLease, ControllerError> {
        let entry = self
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound { id: id.to_string() })?;

        if !entry.is_connected() {
            return Err(ControllerError::lost(format!("{} is disconnected", id)));
        }

        let guard = entry
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| ControllerError::Busy { id: id.to_string() })?;

        debug!("Controller {} leased", id);
        Ok(RunLease {
            controller: BoundController {
                entry,
                call_timeout: self.call_timeout,
            },
            _guard: guard,
        })
    }
}

/// Exclusive use of one controller; dropping it releases the controller
pub struct RunLease {
    controller: BoundController,
    _guard: OwnedMutexGuard<()>,
}

impl RunLease {
    pub fn controller(&self) -> &BoundController {
        &self.controller
    }

    pub fn id(&self) -> &ControllerId {
        self.controller.id()
    }
}

/// A controller as seen by a run
///
/// Every call checks the connection first and is cut off after the
/// registry's call timeout.
#[derive(Clone)]
pub struct BoundController {
    entry: Arc<Entry>,
    call_timeout: Duration,
}

impl BoundController {
    pub fn id(&self) -> &ControllerId {
        &self.entry.id
    }

    pub fn platform(&self) -> Platform {
        self.entry.controller.platform()
    }

    pub fn is_connected(&self) -> bool {
        self.entry.is_connected()
    }

    /// Hold back every later call on this controller until `until`
    ///
    /// The hold lives on the controller, not on the caller's future, so it
    /// still applies when the caller stops waiting early.
    pub fn settle_until(&self, until: Instant) {
        let mut settle = self
            .entry
            .settle_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *settle = Some(settle.map_or(until, |current| current.max(until)));
    }

    /// Drop any pending hold
    pub fn clear_settle(&self) {
        *self
            .entry
            .settle_until
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn settle(&self) {
        let until = *self
            .entry
            .settle_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(until) = until {
            if until > Instant::now() {
                debug!("Controller {} settling until {:?}", self.entry.id, until);
                tokio::time::sleep_until(until).await;
            }
        }
    }

    async fn call<T, F>(&self, operation: &'static str, call: F) -> Result<T, ControllerError>
    where
        F: Future<Output = Result<T, ControllerError>>,
    {
        if !self.entry.is_connected() {
            return Err(ControllerError::lost(format!(
                "{} is disconnected",
                self.entry.id
            )));
        }
        self.settle().await;

        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Controller {} {} timed out after {:?}",
                    self.entry.id, operation, self.call_timeout
                );
                Err(ControllerError::Unresponsive {
                    operation,
                    after: self.call_timeout,
                })
            }
        };

        if let Err(ControllerError::Lost { .. }) = &result {
            self.entry.mark_disconnected();
        }
        result
    }

    pub async fn capture(&self) -> Result<Capture, ControllerError> {
        let image = self.call("capture", self.entry.controller.capture()).await?;
        debug!(
            "Controller {} captured {}x{}",
            self.entry.id,
            image.width(),
            image.height()
        );
        Ok(Arc::new(image))
    }

    pub async fn click(&self, point: Point, button: u8, hold: Duration) -> Result<(), ControllerError> {
        self.call("click", self.entry.controller.click(point, button, hold))
            .await
    }

    pub async fn swipe(&self, begin: Point, end: Point, duration: Duration) -> Result<(), ControllerError> {
        // The gesture itself may legitimately outlast the call timeout
        let limit = self.call_timeout + duration;
        let bound = BoundController {
            entry: self.entry.clone(),
            call_timeout: limit,
        };
        bound
            .call("swipe", self.entry.controller.swipe(begin, end, duration))
            .await
    }

    pub async fn input_text(&self, text: &str) -> Result<(), ControllerError> {
        self.call("input_text", self.entry.controller.input_text(text))
            .await
    }

    pub async fn press_key(&self, code: i32, hold: Duration) -> Result<(), ControllerError> {
        self.call("press_key", self.entry.controller.press_key(code, hold))
            .await
    }

    pub async fn key_combo(&self, codes: &[i32]) -> Result<(), ControllerError> {
        self.call("key_combo", self.entry.controller.key_combo(codes))
            .await
    }

    pub async fn scroll(&self, dx: i32, dy: i32) -> Result<(), ControllerError> {
        self.call("scroll", self.entry.controller.scroll(dx, dy)).await
    }
}
