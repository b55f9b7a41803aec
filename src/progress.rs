//! Progress reporting for long-running batch operations.
//!
//! All progress goes to stderr so stdout stays reserved for results and
//! machine-readable output. Human mode is the default on a TTY; JSON mode
//! emits one object per event for wrapping scripts; off for pipes.

use std::io::Write;

/// How progress should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Human,
    Json,
    Off,
}

impl ProgressMode {
    /// Human on a TTY, off otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Human => Box::new(HumanProgress),
            ProgressMode::Json => Box::new(JsonProgress),
            ProgressMode::Off => Box::new(NoProgress),
        }
    }
}

/// Sink for batch progress events.
pub trait ProgressReporter: Send + Sync {
    /// A phase started, with an optional known total.
    fn begin(&self, phase: &str, total: Option<usize>);
    /// `done` items out of the phase's total have been handled.
    fn advance(&self, phase: &str, done: usize);
    /// A phase finished.
    fn finish(&self, phase: &str, done: usize);
}

/// Single-line human-readable progress.
pub struct HumanProgress;

impl ProgressReporter for HumanProgress {
    fn begin(&self, phase: &str, total: Option<usize>) {
        match total {
            Some(total) => eprintln!("{}: 0/{}", phase, total),
            None => eprintln!("{}...", phase),
        }
    }

    fn advance(&self, phase: &str, done: usize) {
        eprint!("\r{}: {}", phase, done);
        let _ = std::io::stderr().flush();
    }

    fn finish(&self, phase: &str, done: usize) {
        eprintln!("\r{}: {} done", phase, done);
    }
}

/// One JSON object per event on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn begin(&self, phase: &str, total: Option<usize>) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "begin", "phase": phase, "total": total})
        );
    }

    fn advance(&self, phase: &str, done: usize) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "advance", "phase": phase, "done": done})
        );
    }

    fn finish(&self, phase: &str, done: usize) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "finish", "phase": phase, "done": done})
        );
    }
}

/// Silent reporter.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn begin(&self, _phase: &str, _total: Option<usize>) {}
    fn advance(&self, _phase: &str, _done: usize) {}
    fn finish(&self, _phase: &str, _done: usize) {}
}
