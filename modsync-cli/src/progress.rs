//! Renders the engine's event stream as terminal progress bars.

use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use modsync::{EventSink, SyncEvent};

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("overall [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({msg})")
        .expect("progress template")
        .progress_chars("=> ")
}

fn file_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:<30} [{bar:30.green/dim}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .expect("progress template")
        .progress_chars("=> ")
}

#[derive(Default)]
struct State {
    overall: Option<ProgressBar>,
    current: Option<(String, ProgressBar)>,
}

/// Event sink drawing one bar per file plus an overall bar.
pub struct ProgressRenderer {
    multi: MultiProgress,
    state: Mutex<State>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Finish and clear any live bars.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, bar)) = state.current.take() {
            bar.finish_and_clear();
        }
        if let Some(bar) = state.overall.take() {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        // Keeps output above the live bars.
        let _ = self.multi.println(line);
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ProgressRenderer {
    fn emit(&self, event: SyncEvent) {
        match event {
            SyncEvent::Plan {
                to_download,
                to_update,
                total,
                total_bytes,
            } => {
                self.println(format!(
                    "{} {} new, {} updated",
                    style("plan:").bold(),
                    to_download,
                    to_update
                ));
                if total > 0 {
                    let mut state = self.state.lock().unwrap();
                    let bar = self.multi.add(ProgressBar::new(total_bytes));
                    bar.set_style(overall_style());
                    bar.set_message(format!("{total} files"));
                    state.overall = Some(bar);
                }
            }
            SyncEvent::Download {
                filename,
                transferred,
                total,
                aggregate,
            } => {
                let mut state = self.state.lock().unwrap();

                let stale = state
                    .current
                    .as_ref()
                    .map(|(name, _)| name != &filename)
                    .unwrap_or(true);
                if stale {
                    if let Some((_, old)) = state.current.take() {
                        old.finish_and_clear();
                    }
                    let bar = self.multi.add(ProgressBar::new(total.unwrap_or(0)));
                    bar.set_style(file_style());
                    bar.set_message(filename.clone());
                    state.current = Some((filename.clone(), bar));
                }

                if let Some((_, bar)) = &state.current {
                    if let Some(total) = total {
                        bar.set_length(total);
                    }
                    bar.set_position(transferred);
                }
                if let Some(bar) = &state.overall {
                    bar.set_position(aggregate.transferred);
                    bar.set_message(format!(
                        "file {}/{}",
                        aggregate.file_index, aggregate.num_files
                    ));
                }
            }
            SyncEvent::Skipped { filename, reason } => {
                self.println(format!(
                    "{} {} ({})",
                    style("skip:").dim(),
                    filename,
                    reason
                ));
            }
            SyncEvent::Error { filename, message } => {
                self.println(format!(
                    "{} {}: {}",
                    style("error:").red().bold(),
                    filename,
                    message
                ));
            }
            SyncEvent::Info { message } => {
                self.println(message);
            }
        }
    }
}
