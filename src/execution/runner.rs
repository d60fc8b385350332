//! Run state machine
//!
//! A run walks the graph one node at a time. Each visited node is
//! recognized against fresh captures until it matches or its retry budget
//! runs out; a match dispatches the node's action and moves on to its `next`
//! candidates, which are tried strictly in declared order.

use crate::controller::{BoundController, RunLease};
use crate::core::{
    ActionOutcome, EngineSettings, ErrorKind, ExecutionContext, FinalState, Match, NodeOutcome,
    OutcomeError, PipelineGraph, PipelineNode, RecognitionOutcome, RunResult, RunState,
};
use crate::execution::{
    dispatcher::ActionDispatcher,
    engine::{EventBus, ExecutionEvent},
    policy::NodePolicy,
};
use crate::recognition::{RecognitionError, Recognizer};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of evaluating one node
enum NodeStep {
    /// Matched and acted
    Advanced,
    /// Budget ran out without a match
    Exhausted { attempts: u32 },
    /// The run is over
    Finished(FinalState),
}

/// Result of a single recognition attempt
enum Attempt {
    Matched(Match),
    Missed(Option<OutcomeError>),
    Fatal(OutcomeError),
    Cancelled,
}

/// Everything one run needs; owns the controller lease for the run's lifetime
pub(crate) struct Runner {
    pub graph: Arc<PipelineGraph>,
    pub lease: RunLease,
    pub recognizer: Arc<dyn Recognizer>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub settings: Arc<EngineSettings>,
    pub cancel: CancellationToken,
    pub events: EventBus,
}

impl Runner {
    fn controller(&self) -> &BoundController {
        self.lease.controller()
    }

    pub async fn run(self, mut ctx: ExecutionContext) -> RunResult {
        self.events.emit(ExecutionEvent::RunStarted {
            run_id: ctx.run_id,
            pipeline_name: ctx.pipeline_name.clone(),
            controller_id: ctx.controller_id.to_string(),
            entry: ctx.entry.clone(),
        });

        let final_state = self.drive(&mut ctx).await;

        let terminal = match &final_state {
            FinalState::Succeeded => RunState::Succeeded,
            FinalState::Cancelled => RunState::Cancelled,
            FinalState::Failed { node, kind, .. } => RunState::Failed {
                node: node.clone(),
                kind: *kind,
            },
        };
        ctx.transition(terminal);

        match &final_state {
            FinalState::Succeeded => info!("Run {} succeeded after {} steps", ctx.run_id, ctx.steps()),
            FinalState::Cancelled => info!("Run {} cancelled", ctx.run_id),
            FinalState::Failed {
                node,
                kind,
                attempt,
                message,
            } => error!(
                "Run {} failed at '{}' (attempt {}): {}: {}",
                ctx.run_id, node, attempt, kind, message
            ),
        }

        let result = ctx.finish(final_state);
        drop(self.lease);

        self.events.emit(ExecutionEvent::RunFinished {
            run_id: result.run_id,
            status: result.status(),
            final_state: result.final_state.clone(),
        });
        result
    }

    async fn drive(&self, ctx: &mut ExecutionContext) -> FinalState {
        let mut candidates = vec![ctx.entry.clone()];
        let mut parent: Option<String> = None;

        loop {
            let mut advanced: Option<String> = None;
            let mut last_attempts = 0;

            for name in &candidates {
                if self.cancel.is_cancelled() {
                    return FinalState::Cancelled;
                }
                if ctx.visit() > self.settings.max_steps {
                    return FinalState::Failed {
                        node: name.clone(),
                        kind: ErrorKind::StepLimitExceeded,
                        attempt: 0,
                        message: format!(
                            "run exceeded {} node visits",
                            self.settings.max_steps
                        ),
                    };
                }

                let Some(node) = self.graph.node(name) else {
                    return FinalState::Failed {
                        node: parent.clone().unwrap_or_else(|| name.clone()),
                        kind: ErrorKind::DanglingReference,
                        attempt: 0,
                        message: format!("node '{}' does not exist", name),
                    };
                };

                if !matches!(ctx.state(), RunState::Pending { .. }) {
                    ctx.transition(RunState::Pending { node: name.clone() });
                }

                match self.evaluate(ctx, name, node).await {
                    NodeStep::Advanced => {
                        advanced = Some(name.clone());
                        break;
                    }
                    NodeStep::Exhausted { attempts } => {
                        last_attempts = attempts;
                    }
                    NodeStep::Finished(state) => return state,
                }
            }

            match advanced {
                Some(name) => {
                    let next = self
                        .graph
                        .node(&name)
                        .map(|n| n.next.clone())
                        .unwrap_or_default();
                    if next.is_empty() {
                        return FinalState::Succeeded;
                    }
                    debug!("Node '{}' advances to candidates {:?}", name, next);
                    candidates = next;
                    parent = Some(name);
                }
                None if candidates.len() == 1 => {
                    return FinalState::Failed {
                        node: candidates[0].clone(),
                        kind: ErrorKind::NodeTimeout,
                        attempt: last_attempts,
                        message: format!(
                            "'{}' did not match within {} attempts",
                            candidates[0], last_attempts
                        ),
                    };
                }
                None => {
                    let node = parent.clone().unwrap_or_else(|| ctx.entry.clone());
                    return FinalState::Failed {
                        message: format!(
                            "none of the next candidates of '{}' matched: {}",
                            node,
                            candidates.join(", ")
                        ),
                        node,
                        kind: ErrorKind::NoViableNext,
                        attempt: last_attempts,
                    };
                }
            }
        }
    }

    /// Recognize `node` until it matches or exhausts, then act on a match
    async fn evaluate(&self, ctx: &mut ExecutionContext, name: &str, node: &PipelineNode) -> NodeStep {
        let policy = NodePolicy::for_node(&node.timing, &self.settings);
        let max_attempts = policy.retry.max_attempts;
        debug!(
            "Entering '{}' ({} attempts every {:?})",
            name, max_attempts, policy.retry.interval
        );
        self.events.emit(ExecutionEvent::NodeEntered {
            run_id: ctx.run_id,
            node: name.to_string(),
            max_attempts,
        });

        let mut attempt = 0;
        let found = loop {
            attempt += 1;
            ctx.record_attempt(name);
            ctx.transition(RunState::Recognizing {
                node: name.to_string(),
                attempt,
            });

            match self.attempt(node).await {
                Attempt::Matched(found) => break found,
                Attempt::Cancelled => return NodeStep::Finished(FinalState::Cancelled),
                Attempt::Fatal(err) => {
                    ctx.push_outcome(NodeOutcome {
                        node: name.to_string(),
                        recognition: RecognitionOutcome::NotMatched { attempts: attempt },
                        action: ActionOutcome::Skipped,
                        timestamp: Utc::now(),
                        error: Some(err.clone()),
                    });
                    return NodeStep::Finished(FinalState::Failed {
                        node: name.to_string(),
                        kind: err.kind,
                        attempt,
                        message: err.message,
                    });
                }
                Attempt::Missed(err) => {
                    debug!("'{}' attempt {}/{} missed", name, attempt, max_attempts);
                    self.events.emit(ExecutionEvent::AttemptMissed {
                        run_id: ctx.run_id,
                        node: name.to_string(),
                        attempt,
                        max_attempts,
                        error: err.clone(),
                    });

                    if !policy.retry.allows_retry(attempt) {
                        return self.exhaust(ctx, name, attempt, err);
                    }
                    if self.wait(policy.retry.interval).await {
                        return NodeStep::Finished(FinalState::Cancelled);
                    }
                }
            }
        };

        info!("'{}' matched on attempt {}", name, attempt);
        if let Some(region) = found.region {
            ctx.remember_region(name, region);
        }
        self.events.emit(ExecutionEvent::NodeMatched {
            run_id: ctx.run_id,
            node: name.to_string(),
            attempt,
            region: found.region,
            text: found.text.clone(),
        });

        ctx.transition(RunState::Acting {
            node: name.to_string(),
        });
        if self.wait(policy.pre_delay).await {
            return NodeStep::Finished(FinalState::Cancelled);
        }

        let dispatched = self
            .dispatcher
            .dispatch(
                self.controller(),
                &node.action,
                Some(&found),
                ctx.regions(),
                policy.post_delay,
                &self.cancel,
            )
            .await;

        let recognition = RecognitionOutcome::Matched { attempts: attempt, found };
        match dispatched {
            Ok(report) => {
                ctx.push_outcome(NodeOutcome {
                    node: name.to_string(),
                    recognition,
                    action: ActionOutcome::Dispatched {
                        kind: report.kind,
                        points: report.points.clone(),
                    },
                    timestamp: Utc::now(),
                    error: None,
                });
                self.events.emit(ExecutionEvent::ActionDispatched {
                    run_id: ctx.run_id,
                    node: name.to_string(),
                    action: report.kind,
                    points: report.points,
                });
                ctx.transition(RunState::Advancing {
                    node: name.to_string(),
                });

                if report.interrupted || self.cancel.is_cancelled() {
                    NodeStep::Finished(FinalState::Cancelled)
                } else {
                    NodeStep::Advanced
                }
            }
            Err(e) => {
                warn!("'{}' action {} failed: {}", name, node.action.kind(), e);
                ctx.push_outcome(NodeOutcome {
                    node: name.to_string(),
                    recognition,
                    action: ActionOutcome::Failed {
                        kind: node.action.kind(),
                    },
                    timestamp: Utc::now(),
                    error: Some(OutcomeError {
                        kind: e.cause_kind(),
                        message: e.to_string(),
                    }),
                });
                NodeStep::Finished(FinalState::Failed {
                    node: name.to_string(),
                    kind: e.kind(),
                    attempt,
                    message: e.to_string(),
                })
            }
        }
    }

    /// One fresh capture and one recognition, abandoned on cancellation
    async fn attempt(&self, node: &PipelineNode) -> Attempt {
        let work = async {
            let capture = if node.recognition.needs_capture() {
                match self.controller().capture().await {
                    Ok(capture) => Some(capture),
                    Err(e) => {
                        let err = OutcomeError {
                            kind: e.kind(),
                            message: e.to_string(),
                        };
                        return if err.kind.is_attempt_scoped() {
                            warn!("Capture failed, counting as a missed attempt: {}", e);
                            Attempt::Missed(Some(err))
                        } else {
                            Attempt::Fatal(err)
                        };
                    }
                }
            } else {
                None
            };

            // Outer bound for any recognizer, model load included
            let limit = self.settings.recognition_timeout() + self.settings.model_load_timeout();
            let recognized =
                tokio::time::timeout(limit, self.recognizer.recognize(&node.recognition, capture))
                    .await
                    .unwrap_or(Err(RecognitionError::TimedOut {
                        operation: "recognition",
                        after: limit,
                    }));

            match recognized {
                Ok(Some(found)) => Attempt::Matched(found),
                Ok(None) => Attempt::Missed(None),
                Err(e) if e.is_attempt_scoped() => {
                    warn!("Recognition failed, counting as a missed attempt: {}", e);
                    Attempt::Missed(Some(OutcomeError {
                        kind: e.kind(),
                        message: e.to_string(),
                    }))
                }
                Err(e) => Attempt::Fatal(OutcomeError {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Attempt::Cancelled,
            attempt = work => attempt,
        }
    }

    /// Record an exhausted node
    fn exhaust(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        attempts: u32,
        last_error: Option<OutcomeError>,
    ) -> NodeStep {
        info!("'{}' exhausted after {} attempts", name, attempts);
        let message = match last_error {
            Some(err) => format!(
                "no match after {} attempts; last attempt: {}: {}",
                attempts, err.kind, err.message
            ),
            None => format!("no match after {} attempts", attempts),
        };
        let error = OutcomeError {
            kind: ErrorKind::RecognitionFailed,
            message,
        };
        ctx.push_outcome(NodeOutcome {
            node: name.to_string(),
            recognition: RecognitionOutcome::NotMatched { attempts },
            action: ActionOutcome::Skipped,
            timestamp: Utc::now(),
            error: Some(error),
        });
        self.events.emit(ExecutionEvent::NodeExhausted {
            run_id: ctx.run_id,
            node: name.to_string(),
            attempts,
        });
        ctx.transition(RunState::Advancing {
            node: name.to_string(),
        });
        NodeStep::Exhausted { attempts }
    }

    /// Sleep for `duration`; true when cancellation cut it short
    async fn wait(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancel.cancelled() => true,
        }
    }
}
