//! Scenario tests: whole runs against a scripted device

mod helpers;

mod cancellation;
mod concurrency;
mod documents;
mod failure_handling;
mod next_fallback;
mod settings_flow;
