//! Action dispatcher - turns a node action into controller primitives

use crate::controller::{BoundController, ControllerError};
use crate::core::{
    geometry::{Point, Rect},
    node::{Action, ActionKind, Target},
    EngineSettings, ErrorKind, Match,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("Action targets the matched region but recognition produced none")]
    NoMatchRegion,

    #[error("Target node '{0}' has not matched in this run")]
    UnresolvedTarget(String),
}

impl DispatchError {
    /// Kind that ends the run
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Controller(e) => match e.kind() {
                ErrorKind::ControllerLost => ErrorKind::ControllerLost,
                ErrorKind::UnsupportedOnPlatform => ErrorKind::UnsupportedOnPlatform,
                _ => ErrorKind::ActionError,
            },
            DispatchError::NoMatchRegion | DispatchError::UnresolvedTarget(_) => {
                ErrorKind::ActionError
            }
        }
    }

    /// Underlying kind, recorded on the trace entry
    pub fn cause_kind(&self) -> ErrorKind {
        match self {
            DispatchError::Controller(e) => e.kind(),
            _ => ErrorKind::ActionError,
        }
    }
}

/// What a dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: ActionKind,
    /// Resolved coordinates, in the order they were used
    pub points: Vec<Point>,
    /// Cancellation cut the post-action delay short
    pub interrupted: bool,
}

/// Executes actions against a bound controller
pub struct ActionDispatcher {
    settings: Arc<EngineSettings>,
}

impl ActionDispatcher {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Self { settings }
    }

    /// Resolve a target to a point on the capture
    pub fn resolve(
        &self,
        target: &Target,
        matched: Option<&Match>,
        regions: &HashMap<String, Rect>,
    ) -> Result<Point, DispatchError> {
        match target {
            Target::MatchRegion => matched
                .and_then(Match::center)
                .ok_or(DispatchError::NoMatchRegion),
            Target::Point(point) => Ok(*point),
            Target::Region(rect) => Ok(rect.center()),
            Target::Node(name) => regions
                .get(name)
                .map(Rect::center)
                .ok_or_else(|| DispatchError::UnresolvedTarget(name.clone())),
        }
    }

    /// Dispatch `action`, then wait out `post_delay`
    ///
    /// Primitive calls always run to completion. Only the post-action delay
    /// observes `cancel`. The delay is also placed on the controller itself,
    /// so a caller that drops this future early still cannot reach the
    /// target before it has passed; cancellation lifts it.
    pub async fn dispatch(
        &self,
        controller: &BoundController,
        action: &Action,
        matched: Option<&Match>,
        regions: &HashMap<String, Rect>,
        post_delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        let settings = &self.settings;
        let mut points = Vec::new();

        match action {
            Action::DoNothing => {}
            Action::Click { target, button } => {
                let point = self.resolve(target, matched, regions)?;
                points.push(point);
                controller
                    .click(point, *button, Duration::from_millis(settings.click_hold_ms))
                    .await?;
            }
            Action::DoubleClick { target, button } => {
                let point = self.resolve(target, matched, regions)?;
                points.push(point);
                let hold = Duration::from_millis(settings.click_hold_ms);
                controller.click(point, *button, hold).await?;
                tokio::time::sleep(Duration::from_millis(settings.double_click_interval_ms)).await;
                controller.click(point, *button, hold).await?;
            }
            Action::LongPress {
                target, duration, ..
            } => {
                let point = self.resolve(target, matched, regions)?;
                points.push(point);
                let hold = Duration::from_millis(duration.unwrap_or(settings.long_press_ms));
                controller.swipe(point, point, hold).await?;
            }
            Action::Swipe {
                begin,
                end,
                duration,
            } => {
                let from = self.resolve(begin, matched, regions)?;
                let to = self.resolve(end, matched, regions)?;
                points.extend([from, to]);
                controller
                    .swipe(from, to, Duration::from_millis(*duration))
                    .await?;
            }
            Action::InputText { text } => {
                controller.input_text(text).await?;
            }
            Action::PressKey { key, long } => {
                let hold = if *long {
                    settings.long_key_hold_ms
                } else {
                    settings.key_hold_ms
                };
                controller
                    .press_key(*key, Duration::from_millis(hold))
                    .await?;
            }
            Action::KeyCombo { keys } => {
                controller.key_combo(keys).await?;
            }
            Action::Scroll { dx, dy } => {
                controller.scroll(*dx, *dy).await?;
            }
        }

        if action.kind() != ActionKind::DoNothing {
            info!("Dispatched {} on {} at {:?}", action.kind(), controller.id(), points);
        }

        let mut interrupted = false;
        if !post_delay.is_zero() {
            debug!("Post-action delay {:?}", post_delay);
            let until = Instant::now() + post_delay;
            controller.settle_until(until);
            tokio::select! {
                _ = tokio::time::sleep_until(until) => {}
                _ = cancel.cancelled() => {
                    debug!("Post-action delay interrupted by cancellation");
                    controller.clear_settle();
                    interrupted = true;
                }
            }
        }

        Ok(DispatchReport {
            kind: action.kind(),
            points,
            interrupted,
        })
    }
}
