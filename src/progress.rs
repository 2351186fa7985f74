//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Transport-agnostic sink for (stage, percent, message) events. The engine
/// emits one event per chunk; delivery beyond this interface is out of scope.
pub trait ProgressSink: Send + Sync {
    fn event(&self, stage: Stage, percent: f64, message: &str);
}

/// Pipeline stages reported through a [`ProgressSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Profile,
    Discovery,
    ExtractA,
    ExtractB,
    ComputeSets,
    Export,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Profile => "profile",
            Stage::Discovery => "discovery",
            Stage::ExtractA => "extract_a",
            Stage::ExtractB => "extract_b",
            Stage::ComputeSets => "compute_sets",
            Stage::Export => "export",
            Stage::Done => "done",
        }
    }
}

/// Sink that drops every event, for headless runs
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _stage: Stage, _percent: f64, _message: &str) {}
}

/// Sink that forwards events to the log
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, stage: Stage, percent: f64, message: &str) {
        log::debug!("[{}] {:.1}% {}", stage.as_str(), percent, message);
    }
}

/// Progress reporter rendering indicatif bars for interactive use
pub struct ProgressReporter {
    bars: Mutex<Bars>,
    show_progress: bool,
}

#[derive(Default)]
struct Bars {
    extract_pb: Option<ProgressBar>,
    export_pb: Option<ProgressBar>,
    estimated_rows: u64,
}

impl ProgressReporter {
    /// Create a reporter for a comparison run
    pub fn new(estimated_rows: u64) -> Self {
        Self {
            bars: Mutex::new(Bars {
                estimated_rows,
                ..Default::default()
            }),
            show_progress: true,
        }
    }

    /// Create a reporter that renders nothing
    pub fn new_minimal() -> Self {
        Self {
            bars: Mutex::new(Bars::default()),
            show_progress: false,
        }
    }

    /// Update estimated rows once the actual count is known
    pub fn update_estimated_rows(&self, new_count: u64) {
        let mut bars = self.bars.lock().unwrap();
        bars.estimated_rows = new_count;
        if let Some(pb) = &bars.extract_pb {
            pb.set_length(new_count);
        }
    }

    fn ensure_extract_pb(&self, bars: &mut Bars, message: &str) {
        if self.show_progress && bars.extract_pb.is_none() {
            bars.extract_pb = Some(create_progress_bar(bars.estimated_rows, message));
        }
    }

    fn ensure_export_pb(&self, bars: &mut Bars) {
        if self.show_progress && bars.export_pb.is_none() {
            bars.export_pb = Some(create_spinner("Exporting rows..."));
        }
    }

    /// Finish and clear any live bars
    pub fn finish_all(&self, message: &str) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(pb) = bars.extract_pb.take() {
            pb.finish_with_message(message.to_string());
        }
        if let Some(pb) = bars.export_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl ProgressSink for ProgressReporter {
    fn event(&self, stage: Stage, percent: f64, message: &str) {
        let mut bars = self.bars.lock().unwrap();
        match stage {
            Stage::ExtractA | Stage::ExtractB => {
                let label = if stage == Stage::ExtractA {
                    "Extracting keys from A"
                } else {
                    "Extracting keys from B"
                };
                self.ensure_extract_pb(&mut bars, label);
                if let Some(pb) = &bars.extract_pb {
                    let position =
                        (percent / 100.0 * bars.estimated_rows as f64).round() as u64;
                    pb.set_position(position.min(bars.estimated_rows));
                    pb.set_message(message.to_string());
                }
            }
            Stage::ComputeSets => {
                if let Some(pb) = bars.extract_pb.take() {
                    pb.finish_with_message(message.to_string());
                }
            }
            Stage::Export => {
                self.ensure_export_pb(&mut bars);
                if let Some(pb) = &bars.export_pb {
                    pb.set_message(message.to_string());
                }
            }
            Stage::Done => {
                if let Some(pb) = bars.extract_pb.take() {
                    pb.finish_and_clear();
                }
                if let Some(pb) = bars.export_pb.take() {
                    pb.finish_with_message(message.to_string());
                }
            }
            Stage::Profile | Stage::Discovery => {}
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Clean up silently if the run aborted mid-stage
        let mut bars = self.bars.lock().unwrap();
        if let Some(pb) = bars.extract_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = bars.export_pb.take() {
            pb.finish_and_clear();
        }
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({per_sec}) {eta} {msg}")
            .expect("Invalid progress template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}
