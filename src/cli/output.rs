//! CLI output formatting

use crate::{
    core::{ActionOutcome, ExecutionStatus, FinalState, NodeOutcome, RecognitionOutcome, RunResult},
    execution::ExecutionEvent,
    persistence::RunSummary,
    recognition::TextBox,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "? ");

/// Spinner shown while a run is in flight
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format an execution event for display
pub fn format_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            controller_id,
            entry,
        } => format!(
            "{} Running {} on {} from {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(controller_id).cyan(),
            style(entry).cyan(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::NodeEntered {
            node, max_attempts, ..
        } => format!(
            "{} {} (up to {} attempts)",
            EYES,
            style(node).cyan(),
            style(max_attempts).dim()
        ),
        ExecutionEvent::AttemptMissed {
            node,
            attempt,
            max_attempts,
            error,
            ..
        } => match error {
            Some(error) => format!(
                "{} {} attempt {}/{}: {}",
                WARN,
                style(node).yellow(),
                attempt,
                max_attempts,
                style(&error.message).dim()
            ),
            None => format!(
                "{} {} not found ({}/{})",
                SPINNER,
                style(node).dim(),
                attempt,
                max_attempts
            ),
        },
        ExecutionEvent::NodeMatched {
            node,
            attempt,
            region,
            text,
            ..
        } => {
            let mut line = format!("{} {} matched", CHECK, style(node).green());
            if let Some(region) = region {
                line.push_str(&format!(" at {}", style(region).dim()));
            }
            if let Some(text) = text {
                line.push_str(&format!(" \"{}\"", style(text).dim()));
            }
            if *attempt > 1 {
                line.push_str(&format!(" (attempt {})", attempt));
            }
            line
        }
        ExecutionEvent::ActionDispatched {
            node,
            action,
            points,
            ..
        } => {
            let points: Vec<String> = points.iter().map(|p| p.to_string()).collect();
            if points.is_empty() {
                format!("{} {} {}", INFO, style(node).dim(), style(action).cyan())
            } else {
                format!(
                    "{} {} {} {}",
                    INFO,
                    style(node).dim(),
                    style(action).cyan(),
                    style(points.join(" → ")).dim()
                )
            }
        }
        ExecutionEvent::NodeExhausted { node, attempts, .. } => format!(
            "{} {} gave up after {} attempts",
            CROSS,
            style(node).red(),
            attempts
        ),
        ExecutionEvent::RunFinished {
            run_id,
            status,
            final_state,
        } => {
            let detail = match final_state {
                FinalState::Failed { node, kind, .. } => {
                    format!(" at {} ({})", style(node).bold(), style(kind).red())
                }
                _ => String::new(),
            };
            format!(
                "{} Run ({}) {}{}",
                INFO,
                style(short_id(run_id)).dim(),
                format_status(*status),
                detail
            )
        }
    }
}

/// Format one trace entry
pub fn format_outcome(index: usize, outcome: &NodeOutcome) -> String {
    let icon = if outcome.succeeded() { CHECK } else { CROSS };
    let recognition = match &outcome.recognition {
        RecognitionOutcome::Matched { attempts, found } => match &found.text {
            Some(text) => format!("matched \"{}\" after {}", text, attempts),
            None => format!("matched after {}", attempts),
        },
        RecognitionOutcome::NotMatched { attempts } => format!("no match after {}", attempts),
    };
    let action = match &outcome.action {
        ActionOutcome::Dispatched { kind, .. } => kind.to_string(),
        ActionOutcome::Skipped => "skipped".to_string(),
        ActionOutcome::Failed { kind } => format!("{} failed", kind),
    };

    let mut line = format!(
        "{:>3}. {}{} - {} - {}",
        index + 1,
        icon,
        style(&outcome.node).bold(),
        recognition,
        style(action).cyan()
    );
    if let Some(error) = &outcome.error {
        line.push_str(&format!(" [{}: {}]", style(error.kind).red(), style(&error.message).dim()));
    }
    line
}

/// Format a finished run, trace included
pub fn format_run_result(result: &RunResult) -> String {
    let mut lines = vec![format!(
        "{} {} on {} - {} in {}",
        if result.is_success() { CHECK } else { CROSS },
        style(&result.pipeline_name).bold(),
        style(&result.controller_id).cyan(),
        format_status(result.status()),
        format_duration(result.duration().to_std().unwrap_or_default())
    )];

    if let FinalState::Failed {
        node,
        kind,
        attempt,
        message,
    } = &result.final_state
    {
        lines.push(format!(
            "  {} at {} (attempt {}): {}",
            style(kind).red(),
            style(node).bold(),
            attempt,
            message
        ));
    }

    for (i, outcome) in result.trace.iter().enumerate() {
        lines.push(format!("  {}", format_outcome(i, outcome)));
    }
    lines.join("\n")
}

/// Format a run summary for display
pub fn format_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    let failure = match (&summary.failed_node, summary.error_kind) {
        (Some(node), Some(kind)) => format!(" - {} at {}", style(kind).red(), node),
        _ => String::new(),
    };

    format!(
        "{} {} - {} - {} ({} steps, {}){}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.steps,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        failure
    )
}

/// Format detected text boxes
pub fn format_text_boxes(boxes: &[TextBox]) -> String {
    if boxes.is_empty() {
        return format!("{} No text found", INFO);
    }
    boxes
        .iter()
        .map(|b| {
            format!(
                "  {} {} {}",
                style(b.region).dim(),
                b.text,
                style(format!("({:.0}%)", b.score * 100.0)).dim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
