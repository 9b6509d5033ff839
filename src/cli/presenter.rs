//! CLI presenter for output formatting

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::recording::RecorderState;

/// Presenter for CLI output formatting
pub struct Presenter {
    spinner: Option<ProgressBar>,
}

impl Presenter {
    /// Create a new presenter
    pub fn new() -> Self {
        Self { spinner: None }
    }

    /// Start a spinner with message
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    /// Update spinner message
    pub fn update_spinner(&self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    /// Mark spinner as success and finish
    pub fn spinner_success(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) if !spinner.is_hidden() => {
                spinner.finish_with_message(format!("{} {}", "✓".green(), message));
            }
            _ => self.success(message),
        }
    }

    /// Mark spinner as failed and finish. Falls back to a plain line when
    /// stderr is not a terminal and the spinner is never drawn.
    pub fn spinner_fail(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) if !spinner.is_hidden() => {
                spinner.finish_with_message(format!("{} {}", "✗".red(), message));
            }
            _ => self.error(message),
        }
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        self.println_stderr(format!("{} {}", "ℹ".cyan(), message));
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        self.println_stderr(format!("{} {}", "✓".green(), message));
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        self.println_stderr(format!("{} {}", "⚠".yellow(), message));
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        self.println_stderr(format!("{} {}", "✗".red(), message));
    }

    /// Output text to stdout (paths and values meant for scripts)
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Print a key-value pair (for config list)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }

    /// One line of the `formats` listing
    pub fn format_support(&self, format: &str, supported: bool) {
        let mark = if supported { "✓".green() } else { "✗".red() };
        println!("{} {}", mark, format);
    }

    /// Format recording progress bar
    pub fn format_progress(&self, elapsed_ms: u64, total_ms: u64) -> String {
        let elapsed_secs = elapsed_ms / 1000;
        let total_secs = total_ms / 1000;
        let percent = if total_ms > 0 {
            (elapsed_ms as f64 / total_ms as f64 * 100.0).min(100.0)
        } else {
            0.0
        };

        let bar_width = 20;
        let filled = ((percent / 100.0) * bar_width as f64) as usize;
        let empty = bar_width - filled;

        format!(
            "[{}{}] {:>3}s / {}s",
            "█".repeat(filled).cyan(),
            "░".repeat(empty),
            elapsed_secs,
            total_secs
        )
    }

    /// Update recording progress
    pub fn update_recording_progress(
        &self,
        state: RecorderState,
        elapsed_ms: u64,
        total_ms: u64,
        bytes: usize,
    ) {
        let progress = self.format_progress(elapsed_ms, total_ms);
        let label = match state {
            RecorderState::Paused => "Paused",
            _ => "Recording...",
        };
        self.update_spinner(&format!("{} {} ({} bytes)", label, progress, bytes));
    }

    /// Print above the spinner when one is running
    fn println_stderr(&self, line: String) {
        match self.spinner {
            Some(ref spinner) => spinner.suspend(|| eprintln!("{}", line)),
            None => eprintln!("{}", line),
        }
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}
