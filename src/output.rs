// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Diagnostics;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        self.result("success", message);
    }

    /// Print the final line of a cycle that did not commit. Goes to stdout
    /// like `success`; the exit code carries the failure.
    pub fn failure(&self, message: &str) {
        self.result("failure", message);
    }

    fn result(&self, event: &str, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => self.emit(
                &JsonEvent {
                    event,
                    message,
                    duration_secs: self.duration(),
                },
                false,
            ),
        }
    }

    /// Print a non-fatal warning. Shown in every mode.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit(
                &JsonEvent {
                    event: "warning",
                    message,
                    duration_secs: None,
                },
                true,
            ),
        }
    }

    /// Print every warning collected during a cycle.
    pub fn warnings(&self, diagnostics: &Diagnostics) {
        for warning in diagnostics.warnings() {
            self.warning(&warning.message);
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.emit(
                &JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                },
                true,
            ),
        }
    }

    /// Emit a structured payload (JSON mode only).
    pub fn data<T: Serialize>(&self, event: &str, data: &T) {
        if self.mode == OutputMode::Json {
            self.emit(&JsonData { event, data }, false);
        }
    }

    fn emit<T: Serialize>(&self, value: &T, to_stderr: bool) {
        match serde_json::to_string(value) {
            Ok(json) if to_stderr => eprintln!("{json}"),
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!("failed to encode output: {}", e),
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonData<'a, T> {
    event: &'a str,
    data: &'a T,
}
